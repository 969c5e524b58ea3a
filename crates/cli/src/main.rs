mod config;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use policy::{
    Capability, FileSourceLoader, GrantStore, Identity, Origin, Permissions, PolicyParser,
    Subject, Url,
};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "palisade.toml";

#[derive(Parser)]
#[command(name = "palisade")]
#[command(about = "Check policy files and evaluate subjects against them", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse policy files and print the resolved grants
    Check {
        /// Policy files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the policy locations named by the configuration
    Locations,
    /// Evaluate a subject against the configured or given policies
    Eval {
        /// Policy file to load instead of the configured locations
        #[arg(short, long = "policy")]
        policies: Vec<PathBuf>,
        /// Origin of the code being evaluated
        #[arg(short, long)]
        origin: Option<String>,
        /// Asserted identity, as CLASS=NAME
        #[arg(long = "principal")]
        principals: Vec<String>,
        /// Requested capability: KIND [NAME [ACTIONS]]
        #[arg(long, num_args = 1..=3, value_names = ["KIND", "NAME", "ACTIONS"])]
        permission: Option<Vec<String>>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Check { files } => cmd_check(&config, &files),
        Commands::Locations => cmd_locations(&config),
        Commands::Eval {
            policies,
            origin,
            principals,
            permission,
            json,
        } => cmd_eval(
            &config,
            &policies,
            origin.as_deref(),
            &principals,
            permission.as_deref(),
            json,
        ),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default_config()),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn file_locator(path: &Path) -> Result<Url> {
    let absolute = std::path::absolute(path)?;
    Url::from_file_path(&absolute).map_err(|_| Error::InvalidPath {
        path: path.to_path_buf(),
    })
}

fn cmd_check(config: &Config, files: &[PathBuf]) -> Result<()> {
    let sources = Arc::new(FileSourceLoader);
    let parser = PolicyParser::standard(sources.clone());
    let mut failed = 0;

    for file in files {
        let locator = file_locator(file)?;
        match parser.load(&locator, sources.as_ref(), &config.policy) {
            Ok(grants) => {
                println!("{}: {} grants", file.display(), grants.len());
                for grant in &grants {
                    println!("{grant}");
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", file.display());
            }
        }
    }

    println!("{} files checked, {failed} failed", files.len());
    if failed > 0 {
        return Err(Error::CheckFailed {
            failed,
            total: files.len(),
        });
    }
    Ok(())
}

fn cmd_locations(config: &Config) -> Result<()> {
    let locations = config.policy.policy_locations();
    if locations.is_empty() {
        println!("No policy locations configured.");
    }
    for location in locations {
        println!("{location}");
    }
    Ok(())
}

fn parse_principal(arg: &str) -> Result<Identity> {
    match arg.split_once('=') {
        Some((class, name)) if !class.is_empty() => Ok(Identity::new(class, name)),
        _ => Err(Error::InvalidPrincipal(arg.to_string())),
    }
}

fn parse_permission(args: &[String]) -> Capability {
    let field = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
    Capability::new(field(0), field(1), field(2))
}

fn cmd_eval(
    config: &Config,
    policies: &[PathBuf],
    origin: Option<&str>,
    principals: &[String],
    permission: Option<&[String]>,
    json: bool,
) -> Result<()> {
    let locators = if policies.is_empty() {
        config.policy.policy_locations()
    } else {
        policies
            .iter()
            .map(|p| file_locator(p))
            .collect::<Result<Vec<_>>>()?
    };

    debug!(sources = locators.len(), "Refreshing grant store");
    let store = GrantStore::standard(Arc::new(FileSourceLoader));
    store.refresh(&locators, &config.policy)?;

    let mut subject = Subject::new();
    if let Some(origin) = origin {
        subject = subject.with_origin(Origin::parse(origin)?);
    }
    for principal in principals {
        subject = subject.with_identity(parse_principal(principal)?);
    }

    match permission.map(parse_permission) {
        Some(capability) => {
            let granted = store.implies(&subject, &capability);
            if json {
                let out = json!({ "permission": capability, "granted": granted });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}: {}", capability, if granted { "granted" } else { "denied" });
            }
        }
        None => match store.permissions(&subject) {
            Permissions::All => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&json!({ "all": true }))?);
                } else {
                    println!("All capabilities granted.");
                }
            }
            Permissions::Granted(capabilities) => {
                if json {
                    let out = json!({ "all": false, "capabilities": capabilities });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                } else if capabilities.is_empty() {
                    println!("No capabilities granted.");
                } else {
                    for capability in &capabilities {
                        println!("{capability}");
                    }
                }
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_principal() {
        assert_eq!(
            parse_principal("com.acme.Role=admin").unwrap(),
            Identity::new("com.acme.Role", "admin")
        );
        assert_eq!(
            parse_principal("a.B=x=y").unwrap(),
            Identity::new("a.B", "x=y")
        );
        assert!(matches!(
            parse_principal("no-separator"),
            Err(Error::InvalidPrincipal(_))
        ));
        assert!(matches!(
            parse_principal("=name"),
            Err(Error::InvalidPrincipal(_))
        ));
    }

    #[test]
    fn test_parse_permission() {
        let args = vec!["java.io.FilePermission".to_string(), "/tmp/x".to_string()];
        assert_eq!(
            parse_permission(&args),
            Capability::new("java.io.FilePermission", "/tmp/x", "")
        );
    }

    #[test]
    fn test_eval_arguments() {
        let cli = Cli::try_parse_from([
            "palisade",
            "eval",
            "--policy",
            "a.policy",
            "--principal",
            "a.B=c",
            "--permission",
            "java.io.FilePermission",
            "/tmp/x",
            "read",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Eval {
                policies,
                principals,
                permission,
                json,
                ..
            } => {
                assert_eq!(policies, vec![PathBuf::from("a.policy")]);
                assert_eq!(principals, vec!["a.B=c"]);
                assert_eq!(permission.unwrap().len(), 3);
                assert!(json);
            }
            _ => panic!("expected eval"),
        }
    }

    #[test]
    fn test_check_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.policy");
        let bad = dir.path().join("bad.policy");
        std::fs::write(&good, "grant { permission java.lang.RuntimePermission \"x\"; };").unwrap();
        std::fs::write(&bad, "grant { permission").unwrap();

        let config = Config::default_config();
        assert!(cmd_check(&config, &[good.clone()]).is_ok());
        assert!(matches!(
            cmd_check(&config, &[good, bad]),
            Err(Error::CheckFailed { failed: 1, total: 2 })
        ));
    }
}
