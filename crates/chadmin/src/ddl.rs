//! `CREATE`, `RENAME` and `TRUNCATE` statements.

use std::fmt::Write;

use crate::context::ExecutionContext;
use crate::errors::StatementError;
use crate::ident::{quote_ident, resolve};
use crate::models::Table;
use crate::statement::{Statement, StatementKind};

/// Overrides for [`create_table_as`]. Anything left unset is copied from the
/// source table's introspected definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTableOptions {
    pub order_by: Option<Vec<String>>,
    pub partition_by: Option<Vec<String>>,
    pub engine: Option<String>,
}

impl CreateTableOptions {
    pub fn order_by<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = Some(exprs.into_iter().map(Into::into).collect());
        self
    }

    pub fn partition_by<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_by = Some(exprs.into_iter().map(Into::into).collect());
        self
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }
}

/// `CREATE DATABASE <name> [ON CLUSTER <c>] [ENGINE = <engine>]`
pub fn create_database(
    ctx: &ExecutionContext,
    name: &str,
    engine: &str,
) -> Result<Statement, StatementError> {
    let mut sql = format!(
        "CREATE DATABASE {}{}",
        quote_ident(name, "database name")?,
        ctx.on_cluster_clause()?
    );
    if !engine.is_empty() {
        // Writing to a String never fails.
        let _ = write!(sql, " ENGINE = {engine}");
    }
    Ok(ctx.statement(StatementKind::CreateDatabase, sql))
}

/// Render a key list as a single key expression.
///
/// One expression is emitted as is, several are wrapped into a tuple.
fn key_expr(exprs: &[String]) -> Option<String> {
    let exprs: Vec<&str> = exprs
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();
    match exprs.as_slice() {
        [] => None,
        [single] => Some((*single).to_string()),
        many => Some(format!("({})", many.join(", "))),
    }
}

/// Wrap a key as introspected (e.g. `a, b`) so it parses as one expression.
fn introspected_key(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        None
    } else if key.contains(',') && !(key.starts_with('(') && key.ends_with(')')) {
        Some(format!("({key})"))
    } else {
        Some(key.to_string())
    }
}

fn is_merge_tree_family(engine: &str) -> bool {
    engine.trim_start().split('(').next().unwrap_or("").ends_with("MergeTree")
}

/// Clauses `system.tables.engine_full` appends after the engine call.
const ENGINE_FULL_CLAUSES: [&str; 6] = [
    " PARTITION BY ",
    " ORDER BY ",
    " PRIMARY KEY ",
    " SAMPLE BY ",
    " TTL ",
    " SETTINGS ",
];

/// The engine of `table` together with its arguments, e.g.
/// `ReplacingMergeTree(ver)`, cut from `engine_full`.
///
/// Falls back to the bare engine name when `engine_full` is empty.
fn engine_with_args(table: &Table) -> &str {
    let full = table.engine_full.trim();
    if full.is_empty() {
        return table.engine.as_str();
    }

    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    for (idx, ch) in full.char_indices() {
        if in_quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => in_quote = false,
                _ => (),
            }
            continue;
        }
        match ch {
            '\'' => in_quote = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ' ' if depth == 0 => {
                let rest = &full[idx..];
                if ENGINE_FULL_CLAUSES.iter().any(|clause| rest.starts_with(clause)) {
                    return full[..idx].trim_end();
                }
            }
            _ => (),
        }
    }
    full
}

/// Build the storage clause shared by every `CREATE TABLE ... AS`:
/// ` ENGINE = <e>[ ORDER BY <o>][ PARTITION BY <p>]`.
///
/// Values not overridden come from `source`.
pub(crate) fn storage_clause(
    source: &Table,
    options: &CreateTableOptions,
) -> Result<String, StatementError> {
    let engine = match options.engine.as_deref().map(str::trim) {
        Some(engine) if !engine.is_empty() => engine,
        _ => engine_with_args(source),
    };
    if engine.is_empty() {
        return Err(StatementError::EmptyIdentifier("engine"));
    }

    let order_by = match options.order_by.as_deref().and_then(key_expr) {
        Some(order_by) => Some(order_by),
        None => introspected_key(&source.sorting_key),
    };
    let order_by = match order_by {
        Some(order_by) => Some(order_by),
        // MergeTree tables require a sorting key, an empty one is a tuple.
        None if is_merge_tree_family(engine) => Some("tuple()".to_string()),
        None => None,
    };
    let partition_by = match options.partition_by.as_deref().and_then(key_expr) {
        Some(partition_by) => Some(partition_by),
        None => introspected_key(&source.partition_key),
    };

    let mut clause = format!(" ENGINE = {engine}");
    if let Some(order_by) = order_by {
        let _ = write!(clause, " ORDER BY {order_by}");
    }
    if let Some(partition_by) = partition_by {
        let _ = write!(clause, " PARTITION BY {partition_by}");
    }
    Ok(clause)
}

/// `CREATE TABLE <target> [ON CLUSTER <c>] ENGINE = ... AS <source>`
///
/// The new table inherits the current engine, sorting key and partition key
/// of `source` unless overridden.
pub fn create_table_as(
    ctx: &ExecutionContext,
    source: &Table,
    table: &str,
    database: &str,
    options: &CreateTableOptions,
) -> Result<Statement, StatementError> {
    let target = resolve(table, database)?;
    let source_name = resolve(&source.name, &source.database)?;
    let sql = format!(
        "CREATE TABLE {target}{}{} AS {source_name}",
        ctx.on_cluster_clause()?,
        storage_clause(source, options)?,
    );
    Ok(ctx.statement(StatementKind::CreateTable, sql))
}

/// `RENAME TABLE <old> TO <new> [ON CLUSTER <c>]`
pub fn rename_table(
    ctx: &ExecutionContext,
    table: &Table,
    new_name: &str,
    database: &str,
) -> Result<Statement, StatementError> {
    let sql = format!(
        "RENAME TABLE {} TO {}{}",
        resolve(&table.name, &table.database)?,
        resolve(new_name, database)?,
        ctx.on_cluster_clause()?,
    );
    Ok(ctx.statement(StatementKind::Rename, sql))
}

/// `TRUNCATE TABLE <table> [ON CLUSTER <c>]`
pub fn truncate(
    ctx: &ExecutionContext,
    table: &str,
    database: &str,
) -> Result<Statement, StatementError> {
    let sql = format!(
        "TRUNCATE TABLE {}{}",
        resolve(table, database)?,
        ctx.on_cluster_clause()?,
    );
    Ok(ctx.statement(StatementKind::Truncate, sql))
}

/// `USE <database>`
pub fn use_database(ctx: &ExecutionContext, database: &str) -> Result<Statement, StatementError> {
    let sql = format!("USE {}", quote_ident(database, "database name")?);
    Ok(ctx.statement(StatementKind::Use, sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Value;
    use crate::models::test_table;
    use crate::statement::Settings;

    #[test]
    fn create_database_variants() {
        let mut ctx = ExecutionContext::new("default");
        assert_eq!(
            "CREATE DATABASE analytics",
            create_database(&ctx, "analytics", "").unwrap().to_string()
        );

        ctx.set_on_cluster("main").unwrap();
        assert_eq!(
            "CREATE DATABASE analytics ON CLUSTER main ENGINE = Atomic",
            create_database(&ctx, "analytics", "Atomic")
                .unwrap()
                .to_string()
        );
    }

    #[test]
    fn create_database_empty_name() {
        let ctx = ExecutionContext::new("default");
        let err = create_database(&ctx, "", "").unwrap_err();
        assert!(matches!(err, StatementError::EmptyIdentifier(_)));
    }

    #[test]
    fn create_table_inherits_source_structure() {
        let ctx = ExecutionContext::new("default");
        let source = test_table("db1", "events", "MergeTree", "key", "day");

        let stmt = create_table_as(&ctx, &source, "events_copy", "db2", &Default::default()).unwrap();
        assert_eq!(
            "CREATE TABLE db2.events_copy ENGINE = MergeTree ORDER BY key PARTITION BY day AS db1.events",
            stmt.to_string()
        );
    }

    #[test]
    fn create_table_empty_engine_override_inherits() {
        let ctx = ExecutionContext::new("default");
        let source = test_table("db1", "events", "MergeTree", "key", "day");

        let options = CreateTableOptions::default().engine("");
        let stmt = create_table_as(&ctx, &source, "events_copy", "", &options).unwrap();
        assert_eq!(
            "CREATE TABLE events_copy ENGINE = MergeTree ORDER BY key PARTITION BY day AS db1.events",
            stmt.to_string()
        );
    }

    #[test]
    fn create_table_with_overrides() {
        let mut ctx = ExecutionContext::new("default");
        ctx.set_on_cluster("main").unwrap();
        let source = test_table("db2", "events", "MergeTree", "key", "day");

        let options = CreateTableOptions::default()
            .order_by(["day"])
            .partition_by(["key"])
            .engine("AggregatingMergeTree");
        let stmt = create_table_as(&ctx, &source, "events_agg", "db1", &options).unwrap();
        assert_eq!(
            "CREATE TABLE db1.events_agg ON CLUSTER main ENGINE = AggregatingMergeTree ORDER BY day PARTITION BY key AS db2.events",
            stmt.to_string()
        );
    }

    #[test]
    fn create_table_multi_column_keys() {
        let ctx = ExecutionContext::new("default");
        let mut source = test_table("db1", "events", "ReplacingMergeTree", "key, ts", "");
        source.engine_full =
            "ReplacingMergeTree(ver) ORDER BY (key, ts) SETTINGS index_granularity = 8192"
                .to_string();

        let stmt = create_table_as(&ctx, &source, "copy", "db1", &Default::default()).unwrap();
        assert_eq!(
            "CREATE TABLE db1.copy ENGINE = ReplacingMergeTree(ver) ORDER BY (key, ts) AS db1.events",
            stmt.to_string()
        );

        let options = CreateTableOptions::default().partition_by(["toYYYYMM(ts)", "region"]);
        let stmt = create_table_as(&ctx, &source, "copy", "db1", &options).unwrap();
        assert_eq!(
            "CREATE TABLE db1.copy ENGINE = ReplacingMergeTree(ver) ORDER BY (key, ts) PARTITION BY (toYYYYMM(ts), region) AS db1.events",
            stmt.to_string()
        );
    }

    #[test]
    fn create_table_keeps_engine_arguments() {
        let ctx = ExecutionContext::new("default");
        let mut source = test_table("db1", "events", "CollapsingMergeTree", "id", "toYYYYMM(ts)");
        source.engine_full = "CollapsingMergeTree(sign) PARTITION BY toYYYYMM(ts) ORDER BY id TTL ts + toIntervalDay(7) SETTINGS index_granularity = 8192".to_string();

        let stmt = create_table_as(&ctx, &source, "copy", "db1", &Default::default()).unwrap();
        assert_eq!(
            "CREATE TABLE db1.copy ENGINE = CollapsingMergeTree(sign) ORDER BY id PARTITION BY toYYYYMM(ts) AS db1.events",
            stmt.to_string()
        );
    }

    #[test]
    fn engine_arguments_with_quoted_keywords() {
        let mut source = test_table("db1", "events", "ReplicatedMergeTree", "id", "");
        source.engine_full =
            "ReplicatedMergeTree('/tables/ ORDER BY /{shard}', '{replica}') ORDER BY id".to_string();
        assert_eq!(
            "ReplicatedMergeTree('/tables/ ORDER BY /{shard}', '{replica}')",
            engine_with_args(&source)
        );

        let mut source = test_table("db1", "events", "Memory", "", "");
        source.engine_full = "Memory".to_string();
        assert_eq!("Memory", engine_with_args(&source));
    }

    #[test]
    fn create_table_empty_sorting_key() {
        let ctx = ExecutionContext::new("default");
        let merge_tree = test_table("db1", "events", "MergeTree", "", "");
        let stmt = create_table_as(&ctx, &merge_tree, "copy", "", &Default::default()).unwrap();
        assert_eq!(
            "CREATE TABLE copy ENGINE = MergeTree ORDER BY tuple() AS db1.events",
            stmt.to_string()
        );

        let memory = test_table("db1", "buffer", "Memory", "", "");
        let stmt = create_table_as(&ctx, &memory, "copy", "", &Default::default()).unwrap();
        assert_eq!("CREATE TABLE copy ENGINE = Memory AS db1.buffer", stmt.to_string());
    }

    #[test]
    fn create_table_settings_not_inlined() {
        let mut ctx = ExecutionContext::new("default");
        let mut settings = Settings::new();
        settings.insert("max_threads".to_string(), Value::UInt(1));
        ctx.set_settings(settings).unwrap();

        let source = test_table("db1", "events", "MergeTree", "key", "day");
        let stmt = create_table_as(&ctx, &source, "copy", "db1", &Default::default()).unwrap();
        assert!(!stmt.to_string().contains("SETTINGS"));
        assert!(stmt.transport_settings().is_some());
    }

    #[test]
    fn rename_and_truncate() {
        let mut ctx = ExecutionContext::new("default");
        let table = test_table("db1", "events", "MergeTree", "key", "day");

        assert_eq!(
            "RENAME TABLE db1.events TO db2.events_old",
            rename_table(&ctx, &table, "events_old", "db2")
                .unwrap()
                .to_string()
        );
        assert_eq!(
            "TRUNCATE TABLE db1.events",
            truncate(&ctx, "events", "db1").unwrap().to_string()
        );

        ctx.set_on_cluster("main").unwrap();
        assert_eq!(
            "RENAME TABLE db1.events TO events_old ON CLUSTER main",
            rename_table(&ctx, &table, "events_old", "")
                .unwrap()
                .to_string()
        );
        assert_eq!(
            "TRUNCATE TABLE events ON CLUSTER main",
            truncate(&ctx, "events", "").unwrap().to_string()
        );
    }

    #[test]
    fn truncate_empty_name() {
        let ctx = ExecutionContext::new("default");
        assert!(truncate(&ctx, "", "db1").is_err());
    }
}
