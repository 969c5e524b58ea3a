use policy::{
    Capability, Certificate, Config, Evaluation, FileSourceLoader, GrantStore, Identity,
    MemorySourceLoader, Origin, Permissions, Subject, Url,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const FILE: &str = "java.io.FilePermission";
const RUNTIME: &str = "java.lang.RuntimePermission";

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

#[test]
fn test_refresh_from_config_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().display().to_string();

    write(
        dir.path(),
        "keys.toml",
        r#"
[[certificate]]
alias = "duke"
subject = "CN=Duke"
fingerprint = "aa:bb"
"#,
    );
    write(
        dir.path(),
        "base.policy",
        r#"
// Application code signed by duke may read its data.
keystore "keys.toml";

grant signedby "duke", codebase "file:${app.home}/lib/-" {
    permission java.io.FilePermission "${app.home}/data/-", "read";
};

grant principal "duke" {
    permission java.lang.RuntimePermission "${{self}}";
};
"#,
    );
    write(
        dir.path(),
        "extra.policy",
        r#"
grant principal com.acme.Role "admin" {
    permission java.lang.RuntimePermission "shutdown";
};
"#,
    );

    let config = Config::parse(&format!(
        r#"
[security]
"policy.url.1" = "file:${{app.home}}/base.policy"
"policy.url.2" = "file:${{app.home}}/extra.policy"

[properties]
"app.home" = "{home}"
"#
    ))
    .unwrap();
    assert_eq!(config.policy_locations().len(), 2);

    let store = GrantStore::standard(Arc::new(FileSourceLoader));
    store.refresh_from_config(&config).unwrap();
    assert_eq!(store.snapshot().len(), 3);

    let duke_cert = Certificate::x509("CN=Duke", "aa:bb");
    let origin = Origin::parse(&format!("file:{home}/lib/app.jar")).unwrap();
    let signed = Subject::new()
        .with_origin(origin.clone())
        .with_certificate(duke_cert);
    let unsigned = Subject::new().with_origin(origin);

    let read = Capability::new(FILE, format!("{home}/data/report.csv"), "read");
    assert!(store.implies(&signed, &read));
    assert!(!store.implies(&unsigned, &read));

    let duke = Subject::new().with_identity(Identity::new(
        policy::X500_IDENTITY_CLASS,
        "CN=Duke",
    ));
    let self_name = r#"javax.security.auth.x500.X500Principal "CN=Duke""#;
    assert!(store.implies(&duke, &Capability::new(RUNTIME, self_name, "")));

    let admin = Subject::new().with_identity(Identity::new("com.acme.Role", "admin"));
    assert!(store.implies(&admin, &Capability::new(RUNTIME, "shutdown", "")));
    assert!(!store.implies(&duke, &Capability::new(RUNTIME, "shutdown", "")));
}

#[test]
fn test_grammar_example() {
    let locator = Url::parse("memory:/one.policy").unwrap();
    let sources = MemorySourceLoader::new().with(
        locator.clone(),
        r#"grant { permission java.lang.RuntimePermission "X"; }"#,
    );
    let store = GrantStore::standard(Arc::new(sources));
    store.refresh(&[locator], &Config::default()).unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    let capabilities: Vec<&Capability> = snapshot.grants()[0].capabilities().iter().collect();
    assert_eq!(capabilities, vec![&Capability::new(RUNTIME, "X", "")]);
}

#[test]
fn test_grant_with_failing_only_entry_excluded() {
    let locator = Url::parse("memory:/one.policy").unwrap();
    let sources = MemorySourceLoader::new().with(
        locator.clone(),
        r#"grant { permission java.lang.RuntimePermission "${undefined.key}"; }"#,
    );
    let store = GrantStore::standard(Arc::new(sources));
    store.refresh(&[locator], &Config::default()).unwrap();
    assert!(store.snapshot().is_empty());
}

#[test]
fn test_principal_set_matching() {
    let locator = Url::parse("memory:/one.policy").unwrap();
    let sources = MemorySourceLoader::new().with(
        locator.clone(),
        r#"
grant principal com.acme.User "p" { permission java.lang.RuntimePermission "for-p"; };
grant { permission java.lang.RuntimePermission "for-all"; };
"#,
    );
    let store = GrantStore::standard(Arc::new(sources));
    store.refresh(&[locator], &Config::default()).unwrap();

    let p = Identity::new("com.acme.User", "p");
    let q = Identity::new("com.acme.User", "q");
    let for_p = Capability::new(RUNTIME, "for-p", "");
    let for_all = Capability::new(RUNTIME, "for-all", "");

    let both = Subject::new().with_identity(p).with_identity(q.clone());
    let only_q = Subject::new().with_identity(q);
    assert!(store.implies(&both, &for_p));
    assert!(!store.implies(&only_q, &for_p));
    assert!(store.implies(&only_q, &for_all));
    assert!(store.implies(&Subject::new(), &for_all));
}

#[test]
fn test_privileged_grant_short_circuits() {
    let locator = Url::parse("memory:/one.policy").unwrap();
    let sources = MemorySourceLoader::new().with(
        locator.clone(),
        r#"
grant { permission java.lang.RuntimePermission "ordinary"; };
grant codebase "file:/trusted/-" { permission java.security.AllPermission; };
"#,
    );
    let store = GrantStore::standard(Arc::new(sources));
    store.refresh(&[locator], &Config::default()).unwrap();

    let trusted = Subject::new().with_origin(Origin::parse("file:/trusted/a.jar").unwrap());
    assert_eq!(
        store.evaluate(&trusted, None),
        Evaluation::Satisfied(Permissions::All)
    );
    assert_eq!(
        store.evaluate(&trusted, Some(&Capability::new(FILE, "/etc/shadow", "write"))),
        Evaluation::Decision(true)
    );

    let other = Subject::new().with_origin(Origin::parse("file:/other/a.jar").unwrap());
    assert_eq!(
        store.evaluate(&other, Some(&Capability::new(FILE, "/etc/shadow", "write"))),
        Evaluation::Decision(false)
    );
}

#[test]
fn test_capability_serializes_to_json() {
    let value = serde_json::to_value(Capability::new(FILE, "/tmp/-", "read")).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "kind": FILE,
            "name": "/tmp/-",
            "actions": "read",
            "resolution": "resolved",
        })
    );
}
