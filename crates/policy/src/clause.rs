//! Raw clause records produced by the clause reader.
//!
//! Clauses hold policy text exactly as written; nothing is expanded or
//! looked up until the grant resolver runs. Each record renders back to
//! policy syntax through `Display`.

use std::collections::BTreeSet;
use std::fmt;

/// Wildcard accepted for principal class and name.
pub const WILDCARD: &str = "*";

/// `keystore "url" [, "type"]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeystoreClause {
    pub url: Option<String>,
    pub kind: Option<String>,
}

/// `principal [class] "name"`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrincipalClause {
    pub class: Option<String>,
    pub name: Option<String>,
}

/// `permission class ["name"] [, "actions"] [, signedby "signers"]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionClause {
    pub class: String,
    pub name: String,
    pub actions: String,
    pub signers: Option<String>,
}

impl PermissionClause {
    /// Build an entry; absent name and actions become empty strings.
    pub fn new(
        class: impl Into<String>,
        name: Option<String>,
        actions: Option<String>,
        signers: Option<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.unwrap_or_default(),
            actions: actions.unwrap_or_default(),
            signers,
        }
    }
}

/// `grant [signedby ..] [codebase ..] [principal ..]* { permission ..* }`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantClause {
    pub signers: Option<String>,
    pub codebase: Option<String>,
    pub principals: Vec<PrincipalClause>,
    pub permissions: BTreeSet<PermissionClause>,
}

/// Everything read from one policy source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyClauses {
    pub grants: Vec<GrantClause>,
    pub keystores: Vec<KeystoreClause>,
}

/// Render `value` as a policy string literal.
pub(crate) fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() && (c as u32) < 0o400 => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for KeystoreClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keystore {}", quote(self.url.as_deref().unwrap_or("")))?;
        if let Some(kind) = &self.kind {
            write!(f, ", {}", quote(kind))?;
        }
        f.write_str(";")
    }
}

impl fmt::Display for PrincipalClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("principal ")?;
        let name = self.name.as_deref().unwrap_or(WILDCARD);
        match self.class.as_deref() {
            // A bare `*` in first position reads back as the class.
            None => return f.write_str(&quote(name)),
            Some(WILDCARD) => f.write_str("* ")?,
            Some(class) => write!(f, "{class} ")?,
        }
        match name {
            WILDCARD => f.write_str("*"),
            name => f.write_str(&quote(name)),
        }
    }
}

impl fmt::Display for PermissionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permission {}", self.class)?;
        if !self.name.is_empty() || !self.actions.is_empty() {
            write!(f, " {}", quote(&self.name))?;
        }
        if !self.actions.is_empty() {
            write!(f, ", {}", quote(&self.actions))?;
        }
        if let Some(signers) = &self.signers {
            write!(f, ", signedby {}", quote(signers))?;
        }
        f.write_str(";")
    }
}

impl fmt::Display for GrantClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("grant")?;
        let mut sep = " ";
        if let Some(signers) = &self.signers {
            write!(f, "{sep}signedby {}", quote(signers))?;
            sep = ", ";
        }
        if let Some(codebase) = &self.codebase {
            write!(f, "{sep}codebase {}", quote(codebase))?;
            sep = ", ";
        }
        for principal in &self.principals {
            write!(f, "{sep}{principal}")?;
            sep = ", ";
        }
        f.write_str(" {\n")?;
        for permission in &self.permissions {
            writeln!(f, "    {permission}")?;
        }
        f.write_str("};")
    }
}

impl fmt::Display for PolicyClauses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for keystore in &self.keystores {
            writeln!(f, "{keystore}")?;
        }
        for grant in &self.grants {
            writeln!(f, "{grant}")?;
        }
        Ok(())
    }
}
