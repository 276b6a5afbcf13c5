//! `INSERT ... SELECT` statements moving rows between tables, object storage
//! and remote instances.

use crate::context::ExecutionContext;
use crate::ddl::{CreateTableOptions, storage_clause};
use crate::endpoint::{RemoteSettings, S3Settings};
use crate::errors::{Result, StatementError};
use crate::executor::quote_string;
use crate::ident::resolve;
use crate::models::Table;
use crate::statement::{Statement, StatementKind};

/// `INSERT INTO <to> SELECT * FROM <from>`
///
/// Column order and count are not compared. A mismatch fails on the server.
pub fn insert_from_table(
    ctx: &ExecutionContext,
    from_table: &Table,
    to_table: &Table,
) -> Result<Statement, StatementError> {
    let sql = format!(
        "INSERT INTO {} SELECT * FROM {}",
        resolve(&to_table.name, &to_table.database)?,
        resolve(&from_table.name, &from_table.database)?,
    );
    Ok(ctx.statement(StatementKind::Insert, sql))
}

/// `INSERT INTO FUNCTION s3(...) SELECT * FROM <table>`
///
/// The cluster in the context is not used. `INSERT` has no `ON CLUSTER`
/// form and the export runs on the connected node only.
pub fn insert_table_to_s3(
    ctx: &ExecutionContext,
    table: &Table,
    s3: &S3Settings,
) -> Result<Statement> {
    let args = s3.function_args()?;
    let sql = format!(
        "INSERT INTO FUNCTION s3({args}) SELECT * FROM {}",
        resolve(&table.name, &table.database)?,
    );
    Ok(ctx.statement(StatementKind::Insert, sql))
}

/// `INSERT INTO <table> SELECT <projection> FROM s3(...)`
///
/// Without a projection every column is selected. With a cluster set the
/// read is spread over the cluster through `s3Cluster`.
pub fn insert_from_s3(
    ctx: &ExecutionContext,
    table: &Table,
    s3: &S3Settings,
    projection: Option<&str>,
) -> Result<Statement> {
    let args = s3.function_args()?;
    let source = match ctx.cluster() {
        Some(cluster) => format!("s3Cluster({}, {args})", quote_string(cluster)),
        None => format!("s3({args})"),
    };
    let projection = match projection.map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => "*",
    };
    let sql = format!(
        "INSERT INTO {} SELECT {projection} FROM {source}",
        resolve(&table.name, &table.database)?,
    );
    Ok(ctx.statement(StatementKind::Insert, sql))
}

/// `CREATE TABLE <target> [ON CLUSTER <c>] ENGINE = ... AS remote(...)`
///
/// `remote_table` is the definition read from the remote instance.
pub fn create_table_from_remote(
    ctx: &ExecutionContext,
    remote_table: &Table,
    remote: &RemoteSettings,
    table: &str,
    database: &str,
) -> Result<Statement> {
    let source = remote.table_function()?;
    let sql = format!(
        "CREATE TABLE {}{}{} AS {source}",
        resolve(table, database)?,
        ctx.on_cluster_clause()?,
        storage_clause(remote_table, &CreateTableOptions::default())?,
    );
    Ok(ctx.statement(StatementKind::CreateTable, sql))
}

/// `INSERT INTO <target> SELECT * FROM remote(...)`
pub fn insert_from_remote(
    ctx: &ExecutionContext,
    remote: &RemoteSettings,
    table: &str,
    database: &str,
) -> Result<Statement> {
    let source = remote.table_function()?;
    let sql = format!(
        "INSERT INTO {} SELECT * FROM {source}",
        resolve(table, database)?,
    );
    Ok(ctx.statement(StatementKind::Insert, sql))
}
