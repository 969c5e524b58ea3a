//! Turns raw grant clauses into resolved grants.

use crate::capability::{Capability, CapabilityFactory};
use crate::clause::{GrantClause, PermissionClause, PrincipalClause, WILDCARD, quote};
use crate::config::Config;
use crate::expand::{
    ExpansionResolver, NESTED_EXPANSION_PASSES, Properties, PropertyExpander, Segments,
    normalize_separators, resolve_general,
};
use crate::grant::{Grant, Principal};
use crate::identity::{Certificate, IdentityStore};
use crate::origin::Origin;
use crate::{Error, Result};
use tracing::warn;

/// Resolves grant clauses against an identity store, a capability factory
/// and the configuration current at construction.
pub struct GrantResolver<'a> {
    identities: Option<&'a dyn IdentityStore>,
    factory: &'a dyn CapabilityFactory,
    properties: Properties,
    separator: String,
    expand: bool,
}

impl<'a> GrantResolver<'a> {
    pub fn new(
        identities: Option<&'a dyn IdentityStore>,
        factory: &'a dyn CapabilityFactory,
        config: &Config,
    ) -> Self {
        Self {
            identities,
            factory,
            properties: config.expansion_properties(),
            separator: config.path_separator.clone(),
            expand: config.can_expand_properties(),
        }
    }

    fn expander(&self) -> PropertyExpander<'_> {
        PropertyExpander::new(&self.properties)
    }

    /// One simple pass, or the text unchanged when expansion is disabled.
    fn expand(&self, text: &str) -> Result<String> {
        if self.expand {
            self.expander().expand(text)
        } else {
            Ok(text.to_string())
        }
    }

    fn store(&self, what: &str) -> Result<&'a dyn IdentityStore> {
        self.identities
            .ok_or_else(|| Error::SigningInfoUnavailable(what.to_string()))
    }

    /// Resolve one clause.
    ///
    /// A failure in the codebase, signers or principals fails the whole
    /// grant. A failing permission entry is logged and left out. Security
    /// errors always propagate. The result may be void.
    pub fn resolve(&self, clause: &GrantClause) -> Result<Grant> {
        let mut builder = Grant::builder();

        if let Some(codebase) = clause.codebase.as_deref().filter(|c| !c.trim().is_empty()) {
            for origin in self.origins(codebase)? {
                builder = builder.origin(origin);
            }
        }

        if let Some(signers) = &clause.signers {
            let signers = self.expand(signers)?;
            builder = builder.certificates(self.certificates(&signers)?);
        }

        for principal in &clause.principals {
            builder = builder.principal(self.principal(principal)?);
        }

        for entry in &clause.permissions {
            match self.capability(clause, entry) {
                Ok(capability) => builder = builder.capability(capability),
                Err(e) if e.is_security() => return Err(e),
                Err(e) => warn!(entry = %entry, error = %e, "Skipping permission entry"),
            }
        }

        builder.build()
    }

    fn origins(&self, codebase: &str) -> Result<Vec<Origin>> {
        let candidates = if self.expand {
            match self.expand_codebase(codebase) {
                Ok(candidates) => candidates,
                Err(e) if e.is_security() => return Err(e),
                Err(e) => {
                    warn!(codebase, error = %e, "Codebase expansion failed, using it verbatim");
                    vec![codebase.to_string()]
                }
            }
        } else {
            vec![codebase.to_string()]
        };
        candidates.iter().map(|c| Origin::parse(c)).collect()
    }

    /// Multi-value expansion, then the nested simple passes per candidate.
    fn expand_codebase(&self, codebase: &str) -> Result<Vec<String>> {
        let expander = self.expander();
        Segments::parse(codebase, &self.properties, &self.separator)?
            .iter()
            .map(|candidate| {
                expander
                    .expand_repeatedly(&candidate, NESTED_EXPANSION_PASSES)
                    .map(|s| normalize_separators(&s))
            })
            .collect()
    }

    fn certificates(&self, signers: &str) -> Result<Vec<Certificate>> {
        let store = self.store(signers)?;
        signers
            .split(',')
            .map(str::trim)
            .filter(|alias| !alias.is_empty())
            .map(|alias| store.certificate_for(alias))
            .collect()
    }

    fn principal(&self, clause: &PrincipalClause) -> Result<Principal> {
        let name = match clause.name.as_deref() {
            Some(WILDCARD) | None => WILDCARD.to_string(),
            Some(name) => self.expand(name)?,
        };
        match &clause.class {
            Some(class) => Ok(Principal::unresolved(class.as_str(), name)),
            None => Ok(Principal::Resolved(self.store(&name)?.identity_for(&name)?)),
        }
    }

    fn capability(&self, clause: &GrantClause, entry: &PermissionClause) -> Result<Capability> {
        let scoped = PermissionExpander {
            principals: &clause.principals,
            identities: self.identities,
        };
        let name = self.expand(&resolve_general(&entry.name, &scoped)?)?;
        let actions = self.expand(&entry.actions)?;
        let required = match &entry.signers {
            Some(signers) => self.certificates(&self.expand(signers)?)?,
            None => Vec::new(),
        };

        let kind = entry.class.as_str();
        let unresolved = || Capability::unresolved(kind, name.as_str(), actions.as_str(), required.clone());
        let Some(certified) = self.factory.signers(kind) else {
            return Ok(unresolved());
        };
        if !required.iter().all(|c| certified.contains(c)) {
            return Ok(unresolved());
        }
        match self.factory.instantiate(kind, &name, &actions) {
            Err(Error::NoMatchingConstructor(_)) => Ok(unresolved()),
            other => other,
        }
    }
}

/// `${{..}}` resolver scoped to one grant clause.
///
/// `self` yields the description of every principal in the clause;
/// `alias:<id>` yields the identity behind `<id>`.
pub struct PermissionExpander<'a> {
    principals: &'a [PrincipalClause],
    identities: Option<&'a dyn IdentityStore>,
}

impl<'a> PermissionExpander<'a> {
    pub fn new(principals: &'a [PrincipalClause], identities: Option<&'a dyn IdentityStore>) -> Self {
        Self {
            principals,
            identities,
        }
    }

    fn identity(&self, alias: &str) -> Result<String> {
        let store = self
            .identities
            .ok_or_else(|| Error::SigningInfoUnavailable(alias.to_string()))?;
        Ok(store.identity_for(alias)?.to_string())
    }

    fn describe(&self, principal: &PrincipalClause) -> Result<String> {
        let name = principal.name.as_deref().unwrap_or(WILDCARD);
        match principal.class.as_deref() {
            Some(class) if name == WILDCARD => Ok(format!("{class} {WILDCARD}")),
            Some(class) => Ok(format!("{class} {}", quote(name))),
            None => self.identity(name),
        }
    }
}

impl ExpansionResolver for PermissionExpander<'_> {
    fn resolve(&self, protocol: &str, data: Option<&str>) -> Result<String> {
        match protocol {
            "self" => {
                if self.principals.is_empty() {
                    return Err(Error::ExpansionFailed(
                        "self expansion requires principals in the grant".into(),
                    ));
                }
                let descriptions = self
                    .principals
                    .iter()
                    .map(|p| self.describe(p))
                    .collect::<Result<Vec<_>>>()?;
                Ok(descriptions.join(" "))
            }
            "alias" => match data.map(str::trim).filter(|d| !d.is_empty()) {
                Some(alias) => self.identity(alias),
                None => Err(Error::ExpansionFailed("alias expansion requires an alias".into())),
            },
            other => Err(Error::ExpansionFailed(format!(
                "unknown expansion protocol \"{other}\""
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ALL_CAPABILITIES, Arity, CapabilityRegistry};
    use crate::grant::Binding;
    use crate::identity::{Identity, MemoryIdentityStore, X500_IDENTITY_CLASS};
    use crate::reader::parse_clauses;

    const RUNTIME: &str = "java.lang.RuntimePermission";

    struct Fixture {
        store: MemoryIdentityStore,
        registry: CapabilityRegistry,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryIdentityStore::new()
                .with("duke", Certificate::x509("CN=Duke", "01"))
                .with("li", Certificate::x509("CN=Li", "02"))
                .with("pgp", Certificate {
                    kind: "PGP".into(),
                    subject: "li@example.com".into(),
                    fingerprint: String::new(),
                });
            let config = Config::default()
                .with_property("app.home", "/opt/app")
                .with_property("dirs", "/a:/b")
                .with_property("user", "duke");
            Self {
                store,
                registry: CapabilityRegistry::standard(),
                config,
            }
        }

        fn resolve(&self, text: &str) -> Result<Grant> {
            let clauses = parse_clauses(text)?;
            GrantResolver::new(Some(&self.store as &dyn IdentityStore), &self.registry, &self.config)
                .resolve(&clauses.grants[0])
        }
    }

    fn names(grant: &Grant) -> Vec<String> {
        grant.capabilities().iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_single_runtime_capability() {
        let grant = Fixture::new()
            .resolve(r#"grant { permission java.lang.RuntimePermission "X"; }"#)
            .unwrap();
        assert_eq!(grant.binding(), &Binding::Principal);
        assert_eq!(
            grant.capabilities().iter().collect::<Vec<_>>(),
            vec![&Capability::new(RUNTIME, "X", "")]
        );
    }

    #[test]
    fn test_codebase_multi_value() {
        let grant = Fixture::new()
            .resolve(r#"grant codebase "file:${{dirs}}/-" { permission java.lang.RuntimePermission "X"; }"#)
            .unwrap();
        match grant.binding() {
            Binding::Origin { origins, .. } => {
                let rendered: Vec<String> = origins.iter().map(Origin::to_string).collect();
                assert_eq!(rendered, vec!["file:/a/-", "file:/b/-"]);
            }
            other => panic!("unexpected binding {other:?}"),
        }
    }

    #[test]
    fn test_codebase_expansion_failure_uses_literal() {
        let grant = Fixture::new()
            .resolve(r#"grant codebase "file:/x/${missing}" { permission java.lang.RuntimePermission "X"; }"#)
            .unwrap();
        match grant.binding() {
            Binding::Origin { origins, .. } => {
                assert_eq!(
                    origins.iter().map(Origin::to_string).collect::<Vec<_>>(),
                    vec!["file:/x/$%7Bmissing%7D"]
                );
            }
            other => panic!("unexpected binding {other:?}"),
        }
    }

    #[test]
    fn test_malformed_codebase_fails_grant() {
        assert!(matches!(
            Fixture::new().resolve(r#"grant codebase "no-scheme" { permission a.B; }"#),
            Err(Error::InvalidOrigin(_))
        ));
    }

    #[test]
    fn test_empty_codebase_is_absent() {
        let grant = Fixture::new()
            .resolve(r#"grant codebase "" { permission java.lang.RuntimePermission "X"; }"#)
            .unwrap();
        assert_eq!(grant.binding(), &Binding::Principal);
    }

    #[test]
    fn test_signers_resolve_to_certificates() {
        let grant = Fixture::new()
            .resolve(r#"grant signedby "duke, li" { permission java.lang.RuntimePermission "X"; }"#)
            .unwrap();
        match grant.binding() {
            Binding::Certificate(certificates) => assert_eq!(certificates.len(), 2),
            other => panic!("unexpected binding {other:?}"),
        }
    }

    #[test]
    fn test_signers_without_store() {
        let fixture = Fixture::new();
        let clauses = parse_clauses(r#"grant signedby "duke" { permission a.B; }"#).unwrap();
        let resolver = GrantResolver::new(None, &fixture.registry, &fixture.config);
        assert!(matches!(
            resolver.resolve(&clauses.grants[0]),
            Err(Error::SigningInfoUnavailable(_))
        ));
    }

    #[test]
    fn test_principals() {
        let grant = Fixture::new()
            .resolve(r#"grant principal "${user}", principal com.acme.Role "admin" { permission java.lang.RuntimePermission "X"; }"#)
            .unwrap();
        assert!(grant.principals().contains(&Principal::Resolved(Identity::new(
            X500_IDENTITY_CLASS,
            "CN=Duke"
        ))));
        assert!(grant
            .principals()
            .contains(&Principal::unresolved("com.acme.Role", "admin")));
    }

    #[test]
    fn test_principal_alias_must_be_x509() {
        assert!(matches!(
            Fixture::new().resolve(r#"grant principal "pgp" { permission a.B; }"#),
            Err(Error::WrongCertificateType { .. })
        ));
    }

    #[test]
    fn test_self_and_alias_expansion() {
        let grant = Fixture::new()
            .resolve(concat!(
                r#"grant principal com.acme.Role "admin", principal * * {"#,
                r#" permission javax.security.auth.AuthPermission "${{self}}";"#,
                r#" permission javax.security.auth.AuthPermission "${{alias:li}}"; }"#,
            ))
            .unwrap();
        let names = names(&grant);
        assert_eq!(names.len(), 2);
        assert!(names.contains(&r#"com.acme.Role "admin" * *"#.to_string()));
        assert!(names.contains(&r#"javax.security.auth.x500.X500Principal "CN=Li""#.to_string()));
    }

    #[test]
    fn test_self_without_principals_drops_entry() {
        let grant = Fixture::new()
            .resolve(concat!(
                r#"grant { permission javax.security.auth.AuthPermission "${{self}}";"#,
                r#" permission java.lang.RuntimePermission "kept"; }"#,
            ))
            .unwrap();
        assert_eq!(names(&grant), vec!["kept"]);
    }

    #[test]
    fn test_only_entry_failing_leaves_void_grant() {
        let grant = Fixture::new()
            .resolve(r#"grant { permission java.lang.RuntimePermission "${missing}"; }"#)
            .unwrap();
        assert!(grant.is_void());
    }

    #[test]
    fn test_unknown_kind_is_unresolved() {
        let grant = Fixture::new()
            .resolve(r#"grant { permission com.acme.Custom "x", "y" signedby "duke"; }"#)
            .unwrap();
        let capability = grant.capabilities().iter().next().unwrap();
        assert!(!capability.is_resolved());
        assert_eq!(capability.name, "x");
        assert_eq!(capability.actions, "y");
        assert_eq!(capability.signers.len(), 1);
    }

    #[test]
    fn test_uncertified_signers_are_unresolved() {
        let mut fixture = Fixture::new();
        fixture.registry.register(
            "com.acme.Signed",
            &[Arity::One],
            vec![Certificate::x509("CN=Duke", "01")],
        );
        let grant = fixture
            .resolve(concat!(
                r#"grant { permission com.acme.Signed "a" signedby "duke";"#,
                r#" permission com.acme.Signed "b" signedby "duke,li"; }"#,
            ))
            .unwrap();
        let resolved: Vec<(String, bool)> = grant
            .capabilities()
            .iter()
            .map(|c| (c.name.clone(), c.is_resolved()))
            .collect();
        assert_eq!(
            resolved,
            vec![("a".to_string(), true), ("b".to_string(), false)]
        );
    }

    #[test]
    fn test_no_matching_constructor_is_unresolved() {
        let mut fixture = Fixture::new();
        fixture.registry.register("com.acme.NoCtor", &[], Vec::new());
        let grant = fixture
            .resolve(r#"grant { permission com.acme.NoCtor "a"; }"#)
            .unwrap();
        assert!(!grant.capabilities().iter().next().unwrap().is_resolved());
    }

    #[test]
    fn test_privileged_grant() {
        let grant = Fixture::new()
            .resolve(&format!("grant {{ permission {ALL_CAPABILITIES}; }}"))
            .unwrap();
        assert!(grant.is_privileged());
    }

    #[test]
    fn test_expansion_disabled() {
        let mut fixture = Fixture::new();
        fixture.config = fixture
            .config
            .clone()
            .with_security(crate::config::POLICY_EXPAND, "false");
        let grant = fixture
            .resolve(r#"grant { permission java.io.FilePermission "${app.home}/-", "read"; }"#)
            .unwrap();
        assert_eq!(names(&grant), vec!["${app.home}/-"]);
    }

    #[test]
    fn test_permission_expander_protocols() {
        let store = MemoryIdentityStore::new().with("duke", Certificate::x509("CN=Duke", "01"));
        let principals = [PrincipalClause {
            class: None,
            name: Some("duke".into()),
        }];
        let expander = PermissionExpander::new(&principals, Some(&store as &dyn IdentityStore));
        assert_eq!(
            resolve_general("${{self}}", &expander).unwrap(),
            "javax.security.auth.x500.X500Principal \"CN=Duke\""
        );
        assert!(matches!(
            resolve_general("${{alias}}", &expander),
            Err(Error::ExpansionFailed(_))
        ));
        assert!(matches!(
            resolve_general("${{env:HOME}}", &expander),
            Err(Error::ExpansionFailed(_))
        ));
        assert!(matches!(
            resolve_general("${{alias:nobody}}", &expander),
            Err(Error::IdentityNotFound(_))
        ));
    }

    #[test]
    fn test_rendered_clause_resolves_to_equal_grant() {
        let fixture = Fixture::new();
        let text = concat!(
            "grant signedby \"duke, li\", codebase \"file:${{dirs}}/-\",",
            " principal com.acme.Role \"admin\", principal * \"ops\", principal \"li\" {",
            " permission java.io.FilePermission \"${app.home}/data/-\", \"read,write\", signedby \"duke\";",
            " permission java.lang.RuntimePermission \"${{self}}\";",
            " permission com.acme.Custom \"x\"; };",
        );
        let clause = parse_clauses(text).unwrap().grants.remove(0);
        let reparsed = parse_clauses(&clause.to_string()).unwrap().grants.remove(0);
        assert_eq!(reparsed, clause);

        let resolver =
            GrantResolver::new(Some(&fixture.store as &dyn IdentityStore), &fixture.registry, &fixture.config);
        let original = resolver.resolve(&clause).unwrap();
        let again = resolver.resolve(&reparsed).unwrap();
        assert!(!original.is_void());
        assert_eq!(again, original);
        assert_eq!(again.binding(), original.binding());
        assert_eq!(again.principals(), original.principals());
        assert_eq!(again.capabilities(), original.capabilities());
    }
}
