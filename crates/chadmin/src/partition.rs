//! `ALTER TABLE ... PARTITION` statements.
//!
//! Partition existence is never checked before composing. A missing
//! partition is reported by the server when the statement runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::errors::StatementError;
use crate::executor::quote_string;
use crate::ident::resolve;
use crate::models::Table;
use crate::statement::{Statement, StatementKind};

/// Identifies one partition of a table. Passed through without validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PartitionKey {
    /// The partition value as shown in `system.parts.partition`, e.g.
    /// `2024-01-01`. Rendered as a string literal.
    Value(String),
    /// The partition id as shown in `system.parts.partition_id`, e.g.
    /// `20240101`. Rendered as `ID '...'`.
    Id(String),
    /// A raw partition expression such as `(2024, 'eu')`, rendered verbatim.
    Expr(String),
}

impl PartitionKey {
    pub fn value(v: impl Into<String>) -> Self {
        PartitionKey::Value(v.into())
    }

    pub fn id(v: impl Into<String>) -> Self {
        PartitionKey::Id(v.into())
    }

    pub fn expr(v: impl Into<String>) -> Self {
        PartitionKey::Expr(v.into())
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        PartitionKey::Value(value.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        PartitionKey::Value(value)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Value(v) => write!(f, "{}", quote_string(v)),
            PartitionKey::Id(v) => write!(f, "ID {}", quote_string(v)),
            PartitionKey::Expr(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOp {
    Move,
    Replace,
    Drop,
    Detach,
    Attach,
}

impl PartitionOp {
    pub const fn keyword(&self) -> &'static str {
        match self {
            PartitionOp::Move => "MOVE",
            PartitionOp::Replace => "REPLACE",
            PartitionOp::Drop => "DROP",
            PartitionOp::Detach => "DETACH",
            PartitionOp::Attach => "ATTACH",
        }
    }
}

fn alter(
    ctx: &ExecutionContext,
    table: &Table,
    action: fmt::Arguments<'_>,
) -> Result<Statement, StatementError> {
    let sql = format!(
        "ALTER TABLE {}{} {action}",
        resolve(&table.name, &table.database)?,
        ctx.on_cluster_clause()?,
    );
    Ok(ctx.statement(StatementKind::Alter, sql))
}

/// `ALTER TABLE <from> MOVE PARTITION <p> TO TABLE <to>`
///
/// Moves every part of the partition out of `from` into `to`.
pub fn move_partition(
    ctx: &ExecutionContext,
    from_table: &Table,
    to_table: &Table,
    partition: &PartitionKey,
) -> Result<Statement, StatementError> {
    let to = resolve(&to_table.name, &to_table.database)?;
    alter(
        ctx,
        from_table,
        format_args!("MOVE PARTITION {partition} TO TABLE {to}"),
    )
}

/// `ALTER TABLE <to> REPLACE PARTITION <p> FROM <from>`
///
/// Replaces the partition in `to` with a copy of the one in `from`. The
/// source is left unchanged.
pub fn replace_partition(
    ctx: &ExecutionContext,
    from_table: &Table,
    to_table: &Table,
    partition: &PartitionKey,
) -> Result<Statement, StatementError> {
    let from = resolve(&from_table.name, &from_table.database)?;
    alter(
        ctx,
        to_table,
        format_args!("REPLACE PARTITION {partition} FROM {from}"),
    )
}

/// `ALTER TABLE <t> {DROP|DETACH|ATTACH} PARTITION <p>`
pub fn single_table_partition_op(
    ctx: &ExecutionContext,
    op: PartitionOp,
    table: &Table,
    partition: &PartitionKey,
) -> Result<Statement, StatementError> {
    debug_assert!(matches!(
        op,
        PartitionOp::Drop | PartitionOp::Detach | PartitionOp::Attach
    ));
    alter(ctx, table, format_args!("{} PARTITION {partition}", op.keyword()))
}

pub fn drop_partition(
    ctx: &ExecutionContext,
    table: &Table,
    partition: &PartitionKey,
) -> Result<Statement, StatementError> {
    single_table_partition_op(ctx, PartitionOp::Drop, table, partition)
}

/// Parts are marked detached, not deleted. [`attach_partition`] restores
/// them.
pub fn detach_partition(
    ctx: &ExecutionContext,
    table: &Table,
    partition: &PartitionKey,
) -> Result<Statement, StatementError> {
    single_table_partition_op(ctx, PartitionOp::Detach, table, partition)
}

pub fn attach_partition(
    ctx: &ExecutionContext,
    table: &Table,
    partition: &PartitionKey,
) -> Result<Statement, StatementError> {
    single_table_partition_op(ctx, PartitionOp::Attach, table, partition)
}
