use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ExecutionError;
use crate::statement::Statement;

/// A scalar (or array of scalars) exchanged with the server, either as a
/// bound parameter, a setting value, or a field of a returned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Bool(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Write this value as a ClickHouse literal.
    pub fn write_sql_literal(&self, buf: &mut impl Write) -> fmt::Result {
        match self {
            Value::Null => write!(buf, "NULL"),
            Value::Bool(v) => write!(buf, "{}", u8::from(*v)),
            Value::Int(v) => write!(buf, "{v}"),
            Value::UInt(v) => write!(buf, "{v}"),
            Value::Float(v) => write!(buf, "{v}"),
            Value::String(s) => write!(buf, "{}", quote_string(s)),
            Value::Array(vals) => {
                write!(buf, "[")?;
                for (idx, val) in vals.iter().enumerate() {
                    if idx > 0 {
                        write!(buf, ", ")?;
                    }
                    val.write_sql_literal(buf)?;
                }
                write!(buf, "]")
            }
        }
    }

    pub fn to_sql_literal(&self) -> String {
        let mut buf = String::new();
        // Writing to a String never fails.
        let _ = self.write_sql_literal(&mut buf);
        buf
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

/// One returned row, fields in server declared column order.
pub type Row = Vec<Value>;

/// Named parameters referenced as `{name}` in statement text.
pub type Params = BTreeMap<String, Value>;

/// Quote a string as a single-quoted ClickHouse literal.
pub fn quote_string(s: &str) -> String {
    if !s.contains(['\'', '\\']) {
        return format!("'{s}'");
    }
    let mut out = String::with_capacity(s.len() + 4);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Matches a `{name}` placeholder, or a quoted string or identifier that is
/// copied through unchanged.
fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"'(?:[^'\\]|\\.)*'|`(?:[^`\\]|\\.)*`|\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .expect("placeholder pattern to be valid")
    })
}

/// Substitute `{name}` placeholders with literal renderings of the bound
/// values. Placeholders inside quoted strings and identifiers are left alone.
///
/// Statements without parameters are returned untouched so braces inside
/// user supplied expressions are never rewritten.
pub fn bind_params<'a>(sql: &'a str, params: &Params) -> Result<Cow<'a, str>, ExecutionError> {
    if params.is_empty() {
        return Ok(Cow::Borrowed(sql));
    }

    let mut unbound = None;
    let bound = placeholder_regex().replace_all(sql, |caps: &Captures| {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            return caps[0].to_string();
        };
        match params.get(name) {
            Some(value) => value.to_sql_literal(),
            None => {
                unbound.get_or_insert_with(|| name.to_string());
                caps[0].to_string()
            }
        }
    });

    match unbound {
        Some(name) => Err(ExecutionError::UnboundParameter(name)),
        None => Ok(bound),
    }
}

/// Sends statement text to a ClickHouse server and returns the produced rows.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Execute SQL with `{name}` parameters bound from `params`.
    async fn execute(&self, sql: &str, params: &Params) -> Result<Vec<Row>, ExecutionError>;

    /// Execute a composed statement.
    ///
    /// Transports with a per-query settings channel should override this to
    /// forward [`Statement::transport_settings`].
    async fn execute_statement(&self, statement: &Statement) -> Result<Vec<Row>, ExecutionError> {
        if let Some(settings) = statement.transport_settings() {
            warn!(
                kind = ?statement.kind(),
                num_settings = settings.len(),
                "transport has no per-query settings channel, settings not applied",
            );
        }
        self.execute(&statement.to_string(), &Params::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_escaping() {
        assert_eq!("'eu'", Value::from("eu").to_sql_literal());
        assert_eq!(r"'it\'s'", Value::from("it's").to_sql_literal());
        assert_eq!(r"'a\\b'", Value::from(r"a\b").to_sql_literal());
        assert_eq!("1", Value::Bool(true).to_sql_literal());
        assert_eq!("NULL", Value::Null.to_sql_literal());
        assert_eq!(
            "[1, 'x']",
            Value::Array(vec![Value::UInt(1), Value::from("x")]).to_sql_literal()
        );
    }

    #[test]
    fn bind_replaces_placeholders() {
        let mut params = Params::new();
        params.insert("database".to_string(), "db1".into());
        params.insert("table".to_string(), "t'1".into());

        let sql = bind_params(
            "SELECT 1 FROM system.tables WHERE database = {database} AND name = {table}",
            &params,
        )
        .unwrap();
        assert_eq!(
            r"SELECT 1 FROM system.tables WHERE database = 'db1' AND name = 't\'1'",
            sql
        );
    }

    #[test]
    fn bind_without_params_is_untouched() {
        let sql = "SELECT toYear({column})";
        assert_eq!(sql, bind_params(sql, &Params::new()).unwrap());
    }

    #[test]
    fn bind_unbound_placeholder() {
        let mut params = Params::new();
        params.insert("a".to_string(), Value::UInt(1));
        let err = bind_params("SELECT {a}, {b}", &params).unwrap_err();
        assert!(matches!(err, ExecutionError::UnboundParameter(name) if name == "b"));
    }

    #[test]
    fn bind_skips_quoted_literals() {
        let mut params = Params::new();
        params.insert("name".to_string(), "events".into());

        let sql = bind_params(
            r"SELECT 1 FROM remote('ch2:9000', 'system', 'tables', 'default', 'p{name}w'{x}') WHERE `a{name}` = {name}",
            &params,
        )
        .unwrap();
        assert_eq!(
            r"SELECT 1 FROM remote('ch2:9000', 'system', 'tables', 'default', 'p{name}w'{x}') WHERE `a{name}` = 'events'",
            sql
        );
    }
}
