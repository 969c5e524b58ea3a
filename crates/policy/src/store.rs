//! The published grant snapshot and the evaluator that reads it.
//!
//! Readers load the current [`Snapshot`] once per call and never block.
//! Writers build a complete replacement and swap it in with a single
//! atomic store; refreshes are serialized by a writer lock.

use crate::capability::Capability;
use crate::config::Config;
use crate::grant::{Binding, Grant};
use crate::parser::PolicyParser;
use crate::source::SourceLoader;
use crate::subject::Subject;
use crate::Result;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// An immutable, published set of grants.
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    grants: Vec<Grant>,
}

impl Snapshot {
    /// Starts at 0 for the empty initial snapshot and grows by one per publish.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Capabilities accumulated for a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permissions {
    /// A privileged grant or static capability matched.
    All,
    Granted(BTreeSet<Capability>),
}

impl Permissions {
    pub fn is_all(&self) -> bool {
        matches!(self, Permissions::All)
    }

    pub fn implies(&self, requested: &Capability) -> bool {
        match self {
            Permissions::All => true,
            Permissions::Granted(granted) => granted.iter().any(|c| c.implies(requested)),
        }
    }
}

/// Outcome of [`GrantStore::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// No capability was requested: everything the subject holds.
    Satisfied(Permissions),
    /// Whether the requested capability is held.
    Decision(bool),
}

/// Holds the current snapshot and evaluates subjects against it.
pub struct GrantStore {
    snapshot: ArcSwap<Snapshot>,
    parser: PolicyParser,
    sources: Arc<dyn SourceLoader>,
    writer: Mutex<()>,
}

impl GrantStore {
    /// An empty store.
    pub fn new(parser: PolicyParser, sources: Arc<dyn SourceLoader>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            parser,
            sources,
            writer: Mutex::new(()),
        }
    }

    /// Standard capability kinds, TOML keystores, and `sources` for both
    /// policies and keystores.
    pub fn standard(sources: Arc<dyn SourceLoader>) -> Self {
        Self::new(PolicyParser::standard(Arc::clone(&sources)), sources)
    }

    /// Rebuild the snapshot from `locators`, in order.
    ///
    /// A source that fails to load or parse is logged and skipped. A
    /// security error aborts the refresh and leaves the previous snapshot
    /// in place.
    pub fn refresh(&self, locators: &[Url], config: &Config) -> Result<()> {
        let _writer = self.writer.lock();
        let mut grants = Vec::new();
        let mut seen = HashSet::new();
        for locator in locators {
            match self.parser.load(locator, self.sources.as_ref(), config) {
                Ok(parsed) => {
                    grants.extend(parsed.into_iter().filter(|g| seen.insert(g.clone())));
                }
                Err(e) if e.is_security() => return Err(e),
                Err(e) => warn!(locator = %locator, error = %e, "Skipping policy source"),
            }
        }
        let generation = self.install(grants);
        debug!(
            generation,
            sources = locators.len(),
            grants = self.snapshot.load().len(),
            "Published policy snapshot"
        );
        Ok(())
    }

    /// [`refresh`](Self::refresh) from the locations named by `config`.
    pub fn refresh_from_config(&self, config: &Config) -> Result<()> {
        self.refresh(&config.policy_locations(), config)
    }

    /// Replace the snapshot with programmatically built grants.
    ///
    /// Void grants are dropped and duplicates kept once.
    pub fn publish(&self, grants: impl IntoIterator<Item = Grant>) {
        let _writer = self.writer.lock();
        let mut seen = HashSet::new();
        let grants = grants
            .into_iter()
            .filter(|g| !g.is_void() && seen.insert(g.clone()))
            .collect();
        self.install(grants);
    }

    /// Caller must hold the writer lock.
    fn install(&self, grants: Vec<Grant>) -> u64 {
        let generation = self.snapshot.load().generation + 1;
        self.snapshot.store(Arc::new(Snapshot { generation, grants }));
        generation
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Evaluate `subject` against the current snapshot.
    ///
    /// Without `requested` the result is everything the subject holds. With
    /// it, only capabilities of the requested kind (and unresolved ones)
    /// are gathered and the result is a decision.
    pub fn evaluate(&self, subject: &Subject, requested: Option<&Capability>) -> Evaluation {
        let snapshot = self.snapshot.load();
        let permissions = collect(snapshot.grants(), subject, requested);
        match requested {
            None => Evaluation::Satisfied(permissions),
            Some(capability) => Evaluation::Decision(permissions.implies(capability)),
        }
    }

    pub fn permissions(&self, subject: &Subject) -> Permissions {
        match self.evaluate(subject, None) {
            Evaluation::Satisfied(permissions) => permissions,
            Evaluation::Decision(_) => Permissions::Granted(BTreeSet::new()),
        }
    }

    pub fn implies(&self, subject: &Subject, capability: &Capability) -> bool {
        matches!(
            self.evaluate(subject, Some(capability)),
            Evaluation::Decision(true)
        )
    }

    /// Every snapshot grant matching `subject`, plus a domain-bound grant
    /// for its static capabilities when it carries a domain.
    pub fn grants_for(&self, subject: &Subject) -> Vec<Grant> {
        let snapshot = self.snapshot.load();
        let mut grants: Vec<Grant> = snapshot
            .grants()
            .iter()
            .filter(|g| g.matches(subject))
            .cloned()
            .collect();
        if let Some(domain) = &subject.domain {
            if !subject.static_capabilities.is_empty() {
                grants.push(Grant::new(
                    Binding::Domain(domain.clone()),
                    BTreeSet::new(),
                    subject.static_capabilities.clone(),
                ));
            }
        }
        grants
    }
}

fn relevant(capability: &Capability, requested: Option<&Capability>) -> bool {
    requested.is_none_or(|r| !capability.is_resolved() || capability.kind == r.kind)
}

fn collect(grants: &[Grant], subject: &Subject, requested: Option<&Capability>) -> Permissions {
    let mut granted = BTreeSet::new();
    for grant in grants {
        if !grant.matches(subject) {
            continue;
        }
        if grant.is_privileged() {
            return Permissions::All;
        }
        granted.extend(
            grant
                .capabilities()
                .iter()
                .filter(|c| relevant(c, requested))
                .cloned(),
        );
    }

    if subject.static_capabilities.iter().any(Capability::is_privileged) {
        return Permissions::All;
    }
    granted.extend(
        subject
            .static_capabilities
            .iter()
            .filter(|c| relevant(c, requested))
            .cloned(),
    );
    Permissions::Granted(granted)
}
