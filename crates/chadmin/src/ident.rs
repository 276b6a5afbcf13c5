//! Identifier quoting and qualification.

use std::borrow::Cow;

use crate::errors::StatementError;

fn is_plain(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier for use in a statement.
///
/// Plain identifiers are emitted as is, anything else is wrapped in
/// backticks.
pub fn quote_ident<'a>(
    ident: &'a str,
    what: &'static str,
) -> Result<Cow<'a, str>, StatementError> {
    if ident.is_empty() {
        return Err(StatementError::EmptyIdentifier(what));
    }
    if ident.chars().any(char::is_control) {
        return Err(StatementError::MalformedIdentifier(ident.to_string()));
    }
    if is_plain(ident) {
        return Ok(Cow::Borrowed(ident));
    }

    let mut out = String::with_capacity(ident.len() + 2);
    out.push('`');
    for c in ident.chars() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('`');
    Ok(Cow::Owned(out))
}

/// Render `database.name`, or just `name` when no database is given.
///
/// An empty database leaves qualification to the server, which resolves the
/// name against the database selected for the connection.
pub fn resolve(name: &str, database: &str) -> Result<String, StatementError> {
    let name = quote_ident(name, "table name")?;
    if database.is_empty() {
        return Ok(name.into_owned());
    }
    let database = quote_ident(database, "database name")?;
    Ok(format!("{database}.{name}"))
}
