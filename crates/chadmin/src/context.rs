use tracing::debug;

use crate::errors::StatementError;
use crate::executor::Value;
use crate::ident::quote_ident;
use crate::statement::{Settings, Statement, StatementKind};

/// Session scoped state read by every composer.
///
/// Composers take the context by reference and read it at composition time,
/// so a mutation is visible to the very next statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    active_database: String,
    cluster: Option<String>,
    settings: Settings,
}

impl ExecutionContext {
    pub fn new(active_database: impl Into<String>) -> Self {
        ExecutionContext {
            active_database: active_database.into(),
            cluster: None,
            settings: Settings::new(),
        }
    }

    pub fn active_database(&self) -> &str {
        &self.active_database
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings applied to every composed statement.
    ///
    /// Names must be plain identifiers and values must be scalars. On error
    /// the previous settings are kept.
    pub fn set_settings(&mut self, settings: Settings) -> Result<(), StatementError> {
        for (name, value) in &settings {
            validate_setting(name, value)?;
        }
        debug!(?settings, "set settings");
        self.settings = settings;
        Ok(())
    }

    pub fn skip_settings(&mut self) {
        self.settings.clear();
    }

    /// Run DDL statements `ON CLUSTER` the given cluster.
    pub fn set_on_cluster(&mut self, name: impl Into<String>) -> Result<(), StatementError> {
        let name = name.into();
        quote_ident(&name, "cluster name")?;
        debug!(cluster = %name, "set on cluster");
        self.cluster = Some(name);
        Ok(())
    }

    pub fn skip_on_cluster(&mut self) {
        self.cluster = None;
    }

    pub(crate) fn set_active_database(&mut self, name: impl Into<String>) {
        self.active_database = name.into();
    }

    /// `" ON CLUSTER <name>"` when a cluster is set, otherwise empty.
    pub(crate) fn on_cluster_clause(&self) -> Result<String, StatementError> {
        match &self.cluster {
            Some(name) => Ok(format!(" ON CLUSTER {}", quote_ident(name, "cluster name")?)),
            None => Ok(String::new()),
        }
    }

    /// Wrap composed text into a statement carrying the current settings.
    pub(crate) fn statement(&self, kind: StatementKind, body: String) -> Statement {
        Statement::new(kind, body, self.settings.clone())
    }
}

fn validate_setting(name: &str, value: &Value) -> Result<(), StatementError> {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !plain {
        return Err(StatementError::InvalidSetting {
            name: name.to_string(),
            reason: "setting names must be plain identifiers",
        });
    }
    match value {
        Value::Null | Value::Array(_) => Err(StatementError::InvalidSetting {
            name: name.to_string(),
            reason: "setting values must be scalars",
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_clause() {
        let mut ctx = ExecutionContext::new("default");
        assert_eq!("", ctx.on_cluster_clause().unwrap());

        ctx.set_on_cluster("analytics").unwrap();
        assert_eq!(" ON CLUSTER analytics", ctx.on_cluster_clause().unwrap());

        ctx.skip_on_cluster();
        assert_eq!("", ctx.on_cluster_clause().unwrap());
    }

    #[test]
    fn empty_cluster_rejected() {
        let mut ctx = ExecutionContext::new("default");
        assert!(ctx.set_on_cluster("").is_err());
        assert_eq!(None, ctx.cluster());
    }

    #[test]
    fn settings_validation_keeps_previous() {
        let mut ctx = ExecutionContext::new("default");
        let mut good = Settings::new();
        good.insert("max_threads".to_string(), Value::UInt(8));
        ctx.set_settings(good.clone()).unwrap();

        let mut bad = Settings::new();
        bad.insert("max threads".to_string(), Value::UInt(8));
        assert!(ctx.set_settings(bad).is_err());

        let mut null = Settings::new();
        null.insert("max_threads".to_string(), Value::Null);
        assert!(ctx.set_settings(null).is_err());

        assert_eq!(&good, ctx.settings());
        ctx.skip_settings();
        assert!(ctx.settings().is_empty());
    }

    #[test]
    fn statement_snapshots_settings() {
        let mut ctx = ExecutionContext::new("default");
        let mut settings = Settings::new();
        settings.insert("max_threads".to_string(), Value::UInt(2));
        ctx.set_settings(settings).unwrap();

        let stmt = ctx.statement(StatementKind::Truncate, "TRUNCATE TABLE t".to_string());
        ctx.skip_settings();

        assert_eq!("TRUNCATE TABLE t SETTINGS max_threads=2", stmt.to_string());
    }
}
