//! Queries over ClickHouse system tables.

use tracing::trace;

use crate::endpoint::RemoteSettings;
use crate::errors::{ConfigurationError, ExecutionError};
use crate::executor::{Params, StatementExecutor, Value};
use crate::models::{Column, Database, Disk, FromRow, Partition, Process, Table};

fn select<M: FromRow>(from: &str, rest: &str) -> String {
    let mut sql = format!("SELECT {} FROM {from}", M::COLUMNS.join(", "));
    if !rest.is_empty() {
        sql.push(' ');
        sql.push_str(rest);
    }
    sql
}

pub(crate) fn databases_query() -> String {
    select::<Database>("system.databases", "ORDER BY name")
}

pub(crate) fn database_by_name_query() -> String {
    select::<Database>("system.databases", "WHERE name = {name}")
}

pub(crate) fn tables_by_db_query() -> String {
    select::<Table>("system.tables", "WHERE database = {database} ORDER BY name")
}

pub(crate) fn table_by_name_query() -> String {
    select::<Table>(
        "system.tables",
        "WHERE database = {database} AND name = {name}",
    )
}

pub(crate) fn table_partitions_query() -> String {
    select::<Partition>(
        "system.parts",
        "WHERE database = {database} AND table = {table} AND active \
         GROUP BY database, table, partition, partition_id, active, visible \
         ORDER BY partition",
    )
}

pub(crate) fn disks_query() -> String {
    select::<Disk>("system.disks", "ORDER BY name")
}

pub(crate) fn table_columns_query() -> String {
    select::<Column>(
        "system.columns",
        "WHERE database = {database} AND table = {table} ORDER BY position",
    )
}

pub(crate) fn processes_query() -> String {
    select::<Process>("system.processes", "ORDER BY elapsed DESC")
}

pub(crate) fn process_by_query_id_query() -> String {
    select::<Process>("system.processes", "WHERE query_id = {query_id}")
}

/// Definition of the table addressed by `remote`, read through the remote
/// instance's `system.tables`.
pub(crate) fn remote_table_query(remote: &RemoteSettings) -> Result<String, ConfigurationError> {
    let source = remote.system_table_function("tables")?;
    Ok(select::<Table>(
        &source,
        "WHERE database = {database} AND name = {name}",
    ))
}

/// Build a parameter map from `(name, value)` pairs.
pub(crate) fn params<const N: usize>(pairs: [(&str, &str); N]) -> Params {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::from(value)))
        .collect()
}

/// Run a query and decode every returned row as `M`.
pub(crate) async fn fetch_all<M, E>(
    executor: &E,
    sql: &str,
    params: &Params,
) -> Result<Vec<M>, ExecutionError>
where
    M: FromRow,
    E: StatementExecutor + ?Sized,
{
    let rows = executor.execute(sql, params).await?;
    trace!(model = M::MODEL, num_rows = rows.len(), "fetched rows");
    rows.into_iter().map(M::from_row).collect()
}

/// Run a query expected to return at most one row.
pub(crate) async fn fetch_one<M, E>(
    executor: &E,
    sql: &str,
    params: &Params,
) -> Result<Option<M>, ExecutionError>
where
    M: FromRow,
    E: StatementExecutor + ?Sized,
{
    let mut rows = executor.execute(sql, params).await?;
    if rows.len() > 1 {
        return Err(ExecutionError::UnexpectedRow {
            model: M::MODEL,
            reason: format!("expected at most one row, got {}", rows.len()),
        });
    }
    rows.pop().map(M::from_row).transpose()
}
