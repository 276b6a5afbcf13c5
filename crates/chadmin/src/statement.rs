use std::collections::BTreeMap;
use std::fmt;

use crate::executor::Value;

/// Query level settings, ordered by name so rendering is deterministic.
pub type Settings = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateDatabase,
    CreateTable,
    Rename,
    Truncate,
    Alter,
    Insert,
    Use,
}

impl StatementKind {
    /// Whether a trailing `SETTINGS` clause is read as query settings.
    ///
    /// For `CREATE` statements the server would attach a trailing
    /// `SETTINGS` clause to the table or database engine instead.
    pub const fn accepts_settings_clause(&self) -> bool {
        !matches!(
            self,
            StatementKind::CreateDatabase | StatementKind::CreateTable | StatementKind::Use
        )
    }
}

/// A fully composed statement.
///
/// Carries a snapshot of the context settings taken at composition time.
/// Rendering with `Display` produces the final SQL text, including the
/// `SETTINGS` clause when the statement kind accepts one.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    body: String,
    settings: Settings,
}

impl Statement {
    pub(crate) fn new(kind: StatementKind, body: String, settings: Settings) -> Self {
        Statement {
            kind,
            body,
            settings,
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Statement text without any settings clause.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Settings that could not be rendered inline and must be handed to the
    /// transport alongside the text.
    pub fn transport_settings(&self) -> Option<&Settings> {
        if self.settings.is_empty() || self.kind.accepts_settings_clause() {
            None
        } else {
            Some(&self.settings)
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body)?;
        if self.settings.is_empty() || !self.kind.accepts_settings_clause() {
            return Ok(());
        }

        write!(f, " SETTINGS ")?;
        for (idx, (name, value)) in self.settings.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}=")?;
            value.write_sql_literal(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        let mut settings = Settings::new();
        settings.insert("max_threads".to_string(), Value::UInt(4));
        settings.insert("insert_distributed_sync".to_string(), Value::Bool(true));
        settings
    }

    #[test]
    fn inline_settings_sorted() {
        let stmt = Statement::new(
            StatementKind::Insert,
            "INSERT INTO t SELECT * FROM s".to_string(),
            settings(),
        );
        assert_eq!(
            "INSERT INTO t SELECT * FROM s SETTINGS insert_distributed_sync=1, max_threads=4",
            stmt.to_string()
        );
        assert!(stmt.transport_settings().is_none());
    }

    #[test]
    fn create_settings_go_to_transport() {
        let stmt = Statement::new(
            StatementKind::CreateTable,
            "CREATE TABLE t ENGINE = MergeTree ORDER BY key AS s".to_string(),
            settings(),
        );
        assert_eq!(stmt.body(), stmt.to_string());
        assert_eq!(Some(&settings()), stmt.transport_settings());
    }

    #[test]
    fn no_settings_no_clause() {
        let stmt = Statement::new(
            StatementKind::Alter,
            "ALTER TABLE t DROP PARTITION '2024-01-01'".to_string(),
            Settings::new(),
        );
        assert_eq!("ALTER TABLE t DROP PARTITION '2024-01-01'", stmt.to_string());
    }
}
