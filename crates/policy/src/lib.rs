//! Grant-based authorization policy engine.
//!
//! This crate loads declarative policy text describing which *grants* of
//! capability apply to which code origins and identities, and answers, at
//! high read concurrency, whether a subject is entitled to a capability.
//!
//! # Overview
//!
//! Policy text flows through a pipeline:
//!
//! 1. **Scanner**: tokenizes source text ([`scan`]).
//! 2. **Clause reader**: assembles raw `grant` and `keystore` clauses
//!    ([`parse_clauses`]).
//! 3. **Expansion**: `${key}` property substitution, `${{protocol:data}}`
//!    substitution ([`resolve_general`]) and multi-value codebase
//!    substitution ([`Segments`]).
//! 4. **Grant resolver**: turns clauses into immutable [`Grant`]s
//!    ([`GrantResolver`]).
//! 5. **Grant store**: publishes a snapshot atomically and evaluates
//!    subjects against it ([`GrantStore`]).
//!
//! # Policy syntax
//!
//! ```text
//! keystore "keys.toml";
//!
//! grant codebase "file:${app.home}/lib/-", signedby "duke" {
//!     permission java.io.FilePermission "${app.home}/data/-", "read,write";
//! };
//!
//! grant principal com.acme.Role "admin" {
//!     permission java.lang.RuntimePermission "shutdown";
//! };
//! ```
//!
//! # Example
//!
//! ```
//! use policy::{Capability, Config, GrantStore, MemorySourceLoader, Origin, Subject, Url};
//! use std::sync::Arc;
//!
//! let locator = Url::parse("memory:/app.policy")?;
//! let sources = MemorySourceLoader::new().with(
//!     locator.clone(),
//!     r#"grant codebase "file:/opt/app/-" {
//!            permission java.io.FilePermission "/var/app/-", "read";
//!        };"#,
//! );
//!
//! let store = GrantStore::standard(Arc::new(sources));
//! store.refresh(&[locator], &Config::default())?;
//!
//! let subject = Subject::new().with_origin(Origin::parse("file:/opt/app/lib/core.jar")?);
//! let read = Capability::new("java.io.FilePermission", "/var/app/log", "read");
//! let write = Capability::new("java.io.FilePermission", "/var/app/log", "write");
//! assert!(store.implies(&subject, &read));
//! assert!(!store.implies(&subject, &write));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Re-exports
//!
//! All public types are re-exported at the crate root:
//!
//! - [`GrantStore`], [`Snapshot`], [`Evaluation`], [`Permissions`]: evaluation
//! - [`Grant`], [`Binding`], [`Principal`], [`Subject`]: the grant model
//! - [`Capability`], [`CapabilityFactory`], [`CapabilityRegistry`]: capabilities
//! - [`IdentityStore`], [`KeystoreLoader`], [`SourceLoader`]: collaborators
//! - [`Config`]: configuration and policy location discovery
//! - [`Error`], [`Result`]: error handling

mod binding;
mod capability;
mod clause;
mod config;
mod error;
mod expand;
mod grant;
mod identity;
mod origin;
mod parser;
mod reader;
mod resolver;
mod scanner;
mod source;
mod store;
mod subject;

pub use binding::{BindingArena, BindingHandle};
pub use capability::{
    ALL_CAPABILITIES, Arity, Capability, CapabilityFactory, CapabilityRegistry, Resolution,
};
pub use clause::{
    GrantClause, KeystoreClause, PermissionClause, PolicyClauses, PrincipalClause, WILDCARD,
};
pub use config::{Config, POLICY_ALLOW_DYNAMIC, POLICY_EXPAND, POLICY_URL_PREFIX};
pub use error::{Error, Result};
pub use expand::{
    ExpansionResolver, NESTED_EXPANSION_PASSES, Properties, PropertyExpander, SegmentIter,
    Segments, resolve_general,
};
pub use grant::{Binding, Grant, GrantBuilder, Principal};
pub use identity::{
    Certificate, DEFAULT_KEYSTORE_TYPE, Identity, IdentityStore, KeystoreLoader,
    MemoryIdentityStore, TomlKeystoreLoader, X500_IDENTITY_CLASS, X509,
};
pub use origin::Origin;
pub use parser::PolicyParser;
pub use reader::{parse_clauses, read};
pub use resolver::{GrantResolver, PermissionExpander};
pub use scanner::{Token, TokenKind, TokenStream, scan};
pub use source::{FileSourceLoader, MemorySourceLoader, SourceLoader};
pub use store::{Evaluation, GrantStore, Permissions, Snapshot};
pub use subject::Subject;
pub use url::Url;
