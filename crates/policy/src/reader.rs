//! Clause reader: assembles raw clauses from a token stream.

use crate::clause::{
    GrantClause, KeystoreClause, PermissionClause, PolicyClauses, PrincipalClause, WILDCARD,
};
use crate::scanner::{self, Token, TokenStream};
use crate::{Error, Result};
use std::collections::BTreeSet;

const TOP_LEVEL_HINT: &str = "Expected entries are: \"grant\" or \"keystore\"";
const KEYSTORE_HINT: &str = "Expected syntax is: keystore \"url\"[, \"type\"]";
const SIGNEDBY_HINT: &str = "Expected syntax is: signedby \"name1,...,nameN\"";
const CODEBASE_HINT: &str = "Expected syntax is: codebase \"url\"";
const PRINCIPAL_HINT: &str = "Expected syntax is: principal [class_name] \"principal_name\"";
const PERMISSION_HINT: &str = "Expected syntax is: permission permission_class_name [\"target_name\"] [, \"action_list\"] [, signedby \"name1,...,nameN\"]";

/// Scan and read one policy source.
pub fn parse_clauses(text: &str) -> Result<PolicyClauses> {
    let mut tokens = scanner::scan(text)?;
    read(&mut tokens)
}

/// Read every clause from `tokens`.
pub fn read(tokens: &mut TokenStream) -> Result<PolicyClauses> {
    let mut clauses = PolicyClauses::default();
    loop {
        let token = tokens.next_token().clone();
        if token.is_eof() {
            break;
        }
        if token.is_keyword("keystore") {
            clauses.keystores.push(read_keystore_clause(tokens)?);
        } else if token.is_keyword("grant") {
            clauses.grants.push(read_grant_clause(tokens)?);
        } else if token.is_punct(';') {
            continue;
        } else {
            return Err(unexpected(&token, Some(TOP_LEVEL_HINT)));
        }
    }
    Ok(clauses)
}

fn unexpected(token: &Token, hint: Option<&str>) -> Error {
    Error::Syntax {
        line: token.line,
        found: token.to_string(),
        expected: hint.map(str::to_string),
    }
}

/// Consume the next token, which must be a quoted string.
fn expect_quoted(tokens: &mut TokenStream, hint: &str) -> Result<String> {
    let token = tokens.next_token();
    match token.quoted() {
        Some(s) => Ok(s.to_string()),
        None => Err(unexpected(token, Some(hint))),
    }
}

fn read_keystore_clause(tokens: &mut TokenStream) -> Result<KeystoreClause> {
    let url = expect_quoted(tokens, KEYSTORE_HINT)?;
    let mut kind = None;

    let token = tokens.next_token();
    if let Some(s) = token.quoted() {
        kind = Some(s.to_string());
    } else if token.is_punct(',') {
        let token = tokens.next_token();
        match token.quoted() {
            Some(s) => kind = Some(s.to_string()),
            // The comma is dropped; the top level sees what follows it.
            None => tokens.push_back(),
        }
    } else {
        tokens.push_back();
    }

    Ok(KeystoreClause {
        url: Some(url),
        kind,
    })
}

fn read_grant_clause(tokens: &mut TokenStream) -> Result<GrantClause> {
    let mut grant = GrantClause::default();
    loop {
        let token = tokens.next_token().clone();
        if token.is_keyword("signedby") {
            grant.signers = Some(expect_quoted(tokens, SIGNEDBY_HINT)?);
        } else if token.is_keyword("codebase") {
            grant.codebase = Some(expect_quoted(tokens, CODEBASE_HINT)?);
        } else if token.is_keyword("principal") {
            grant.principals.push(read_principal_clause(tokens)?);
        } else if token.word().is_some() {
            return Err(unexpected(&token, None));
        } else if token.is_punct(',') {
            continue;
        } else if token.is_punct('{') {
            grant.permissions = read_permission_entries(tokens)?;
            break;
        } else {
            // A header without a permission list; the top level handles the token.
            tokens.push_back();
            break;
        }
    }
    Ok(grant)
}

fn read_principal_clause(tokens: &mut TokenStream) -> Result<PrincipalClause> {
    let mut class = None;
    let mut token = tokens.next_token().clone();
    if let Some(word) = token.word() {
        class = Some(word.to_string());
        token = tokens.next_token().clone();
    } else if token.is_punct('*') {
        class = Some(WILDCARD.to_string());
        token = tokens.next_token().clone();
    }

    let name = if let Some(s) = token.quoted() {
        s.to_string()
    } else if token.is_punct('*') {
        WILDCARD.to_string()
    } else {
        return Err(unexpected(&token, Some(PRINCIPAL_HINT)));
    };

    Ok(PrincipalClause {
        class,
        name: Some(name),
    })
}

fn read_permission_entries(tokens: &mut TokenStream) -> Result<BTreeSet<PermissionClause>> {
    let mut permissions = BTreeSet::new();
    loop {
        let token = tokens.next_token().clone();
        if token.is_keyword("permission") {
            permissions.insert(read_permission_entry(tokens)?);
        } else if token.is_punct(';') {
            continue;
        } else if token.is_punct('}') {
            break;
        } else {
            let hint = token.word().map(|_| PERMISSION_HINT);
            return Err(unexpected(&token, hint));
        }
    }
    Ok(permissions)
}

/// Reads the remainder of an entry after the `permission` keyword.
fn read_permission_entry(tokens: &mut TokenStream) -> Result<PermissionClause> {
    let token = tokens.next_token().clone();
    let Some(class) = token.word().map(str::to_string) else {
        return Err(unexpected(&token, Some(PERMISSION_HINT)));
    };

    let mut name = None;
    let mut actions = None;
    let mut signers = None;

    let mut token = tokens.next_token().clone();
    if let Some(s) = token.quoted() {
        name = Some(s.to_string());
        token = tokens.next_token().clone();
    }
    if token.is_punct(',') {
        token = tokens.next_token().clone();
    }
    if let Some(s) = token.quoted() {
        actions = Some(s.to_string());
        token = tokens.next_token().clone();
        if token.is_punct(',') {
            token = tokens.next_token().clone();
        }
    }
    if token.is_keyword("signedby") {
        signers = Some(expect_quoted(tokens, SIGNEDBY_HINT)?);
    } else {
        tokens.push_back();
    }

    Ok(PermissionClause::new(class, name, actions, signers))
}
