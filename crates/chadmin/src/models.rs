//! Typed snapshots of ClickHouse system table rows.
//!
//! Values are only constructed by introspection and are never mutated by the
//! composers. A later change to the underlying object does not update a
//! snapshot obtained earlier.

use serde::{Deserialize, Serialize};

use crate::errors::ExecutionError;
use crate::executor::{Row, Value};
use crate::ident::resolve;

/// Decode a model from a row selected with [`FromRow::COLUMNS`].
pub trait FromRow: Sized {
    /// Model name used in error messages.
    const MODEL: &'static str;
    /// Select list producing the fields in decoding order.
    const COLUMNS: &'static [&'static str];

    fn from_row(row: Row) -> Result<Self, ExecutionError>;
}

/// Sequential reader over the fields of one row.
struct RowReader {
    model: &'static str,
    columns: &'static [&'static str],
    fields: std::vec::IntoIter<Value>,
    idx: usize,
}

impl RowReader {
    fn new<M: FromRow>(row: Row) -> Result<Self, ExecutionError> {
        if row.len() != M::COLUMNS.len() {
            return Err(ExecutionError::UnexpectedRow {
                model: M::MODEL,
                reason: format!("expected {} fields, got {}", M::COLUMNS.len(), row.len()),
            });
        }
        Ok(RowReader {
            model: M::MODEL,
            columns: M::COLUMNS,
            fields: row.into_iter(),
            idx: 0,
        })
    }

    fn next(&mut self) -> Result<(Value, &'static str), ExecutionError> {
        let column = self.columns.get(self.idx).copied().unwrap_or("?");
        self.idx += 1;
        match self.fields.next() {
            Some(value) => Ok((value, column)),
            None => Err(ExecutionError::UnexpectedRow {
                model: self.model,
                reason: format!("missing field '{column}'"),
            }),
        }
    }

    fn mismatch(&self, column: &str, expected: &str, got: &Value) -> ExecutionError {
        ExecutionError::UnexpectedRow {
            model: self.model,
            reason: format!("field '{column}' expected {expected}, got {got:?}"),
        }
    }

    fn string(&mut self) -> Result<String, ExecutionError> {
        match self.next()? {
            (Value::String(s), _) => Ok(s),
            (Value::Null, _) => Ok(String::new()),
            (other, column) => Err(self.mismatch(column, "string", &other)),
        }
    }

    fn u64(&mut self) -> Result<u64, ExecutionError> {
        let (value, column) = self.next()?;
        value
            .as_u64()
            .ok_or_else(|| self.mismatch(column, "unsigned integer", &value))
    }

    fn opt_u64(&mut self) -> Result<Option<u64>, ExecutionError> {
        let (value, column) = self.next()?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_u64()
            .map(Some)
            .ok_or_else(|| self.mismatch(column, "unsigned integer", &value))
    }

    fn i64(&mut self) -> Result<i64, ExecutionError> {
        let (value, column) = self.next()?;
        value
            .as_i64()
            .ok_or_else(|| self.mismatch(column, "integer", &value))
    }

    fn f64(&mut self) -> Result<f64, ExecutionError> {
        let (value, column) = self.next()?;
        value
            .as_f64()
            .ok_or_else(|| self.mismatch(column, "float", &value))
    }

    fn flag(&mut self) -> Result<bool, ExecutionError> {
        match self.next()? {
            (Value::Bool(v), _) => Ok(v),
            (value, column) => value
                .as_u64()
                .map(|v| v != 0)
                .ok_or_else(|| self.mismatch(column, "flag", &value)),
        }
    }
}

/// A row of `system.databases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Database {
    pub name: String,
    pub uuid: String,
    pub engine: String,
    pub data_path: String,
    pub metadata_path: String,
    pub engine_full: String,
    pub comment: String,
}

impl FromRow for Database {
    const MODEL: &'static str = "database";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "toString(uuid)",
        "engine",
        "data_path",
        "metadata_path",
        "engine_full",
        "comment",
    ];

    fn from_row(row: Row) -> Result<Self, ExecutionError> {
        let mut r = RowReader::new::<Self>(row)?;
        Ok(Database {
            name: r.string()?,
            uuid: r.string()?,
            engine: r.string()?,
            data_path: r.string()?,
            metadata_path: r.string()?,
            engine_full: r.string()?,
            comment: r.string()?,
        })
    }
}

/// A row of `system.tables`.
///
/// Identity is `(database, name)`. The structural fields reflect the table
/// at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Table {
    pub database: String,
    pub name: String,
    pub uuid: String,
    pub engine: String,
    pub engine_full: String,
    pub create_table_query: String,
    pub as_select: String,
    pub partition_key: String,
    pub sorting_key: String,
    pub primary_key: String,
    pub sampling_key: String,
    pub storage_policy: String,
    pub total_rows: Option<u64>,
    pub total_bytes: Option<u64>,
    pub is_temporary: bool,
    pub comment: String,
}

impl Table {
    /// Fully qualified `database.name`.
    pub fn full_name(&self) -> String {
        match resolve(&self.name, &self.database) {
            Ok(name) => name,
            // Names read from the server are never empty.
            Err(_) => format!("{}.{}", self.database, self.name),
        }
    }
}

impl FromRow for Table {
    const MODEL: &'static str = "table";
    const COLUMNS: &'static [&'static str] = &[
        "database",
        "name",
        "toString(uuid)",
        "engine",
        "engine_full",
        "create_table_query",
        "as_select",
        "partition_key",
        "sorting_key",
        "primary_key",
        "sampling_key",
        "storage_policy",
        "total_rows",
        "total_bytes",
        "is_temporary",
        "comment",
    ];

    fn from_row(row: Row) -> Result<Self, ExecutionError> {
        let mut r = RowReader::new::<Self>(row)?;
        Ok(Table {
            database: r.string()?,
            name: r.string()?,
            uuid: r.string()?,
            engine: r.string()?,
            engine_full: r.string()?,
            create_table_query: r.string()?,
            as_select: r.string()?,
            partition_key: r.string()?,
            sorting_key: r.string()?,
            primary_key: r.string()?,
            sampling_key: r.string()?,
            storage_policy: r.string()?,
            total_rows: r.opt_u64()?,
            total_bytes: r.opt_u64()?,
            is_temporary: r.flag()?,
            comment: r.string()?,
        })
    }
}

/// Aggregated parts of one partition from `system.parts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Partition {
    pub database: String,
    pub table: String,
    pub partition: String,
    pub partition_id: String,
    pub active: bool,
    pub visible: bool,
    pub rows: u64,
    pub data_uncompressed_bytes: u64,
    pub data_compressed_bytes: u64,
    pub bytes_on_disk: u64,
}

impl FromRow for Partition {
    const MODEL: &'static str = "partition";
    const COLUMNS: &'static [&'static str] = &[
        "database",
        "table",
        "partition",
        "partition_id",
        "active",
        "visible",
        "sum(rows)",
        "sum(data_uncompressed_bytes)",
        "sum(data_compressed_bytes)",
        "sum(bytes_on_disk)",
    ];

    fn from_row(row: Row) -> Result<Self, ExecutionError> {
        let mut r = RowReader::new::<Self>(row)?;
        Ok(Partition {
            database: r.string()?,
            table: r.string()?,
            partition: r.string()?,
            partition_id: r.string()?,
            active: r.flag()?,
            visible: r.flag()?,
            rows: r.u64()?,
            data_uncompressed_bytes: r.u64()?,
            data_compressed_bytes: r.u64()?,
            bytes_on_disk: r.u64()?,
        })
    }
}

/// A row of `system.disks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Disk {
    pub name: String,
    pub path: String,
    pub free_space: u64,
    pub total_space: u64,
    pub unreserved_space: u64,
    pub keep_free_space: u64,
    pub disk_type: String,
    pub is_encrypted: bool,
    pub is_read_only: bool,
    pub is_write_once: bool,
    pub is_remote: bool,
    pub is_broken: bool,
    pub cache_path: String,
}

impl FromRow for Disk {
    const MODEL: &'static str = "disk";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "path",
        "free_space",
        "total_space",
        "unreserved_space",
        "keep_free_space",
        "toString(type)",
        "is_encrypted",
        "is_read_only",
        "is_write_once",
        "is_remote",
        "is_broken",
        "cache_path",
    ];

    fn from_row(row: Row) -> Result<Self, ExecutionError> {
        let mut r = RowReader::new::<Self>(row)?;
        Ok(Disk {
            name: r.string()?,
            path: r.string()?,
            free_space: r.u64()?,
            total_space: r.u64()?,
            unreserved_space: r.u64()?,
            keep_free_space: r.u64()?,
            disk_type: r.string()?,
            is_encrypted: r.flag()?,
            is_read_only: r.flag()?,
            is_write_once: r.flag()?,
            is_remote: r.flag()?,
            is_broken: r.flag()?,
            cache_path: r.string()?,
        })
    }
}

/// A row of `system.columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Column {
    pub database: String,
    pub table: String,
    pub name: String,
    pub column_type: String,
    pub position: u64,
    pub default_kind: String,
    pub default_expression: String,
    pub comment: String,
    pub is_in_partition_key: bool,
    pub is_in_sorting_key: bool,
    pub is_in_primary_key: bool,
    pub is_in_sampling_key: bool,
}

impl FromRow for Column {
    const MODEL: &'static str = "column";
    const COLUMNS: &'static [&'static str] = &[
        "database",
        "table",
        "name",
        "type",
        "position",
        "default_kind",
        "default_expression",
        "comment",
        "is_in_partition_key",
        "is_in_sorting_key",
        "is_in_primary_key",
        "is_in_sampling_key",
    ];

    fn from_row(row: Row) -> Result<Self, ExecutionError> {
        let mut r = RowReader::new::<Self>(row)?;
        Ok(Column {
            database: r.string()?,
            table: r.string()?,
            name: r.string()?,
            column_type: r.string()?,
            position: r.u64()?,
            default_kind: r.string()?,
            default_expression: r.string()?,
            comment: r.string()?,
            is_in_partition_key: r.flag()?,
            is_in_sorting_key: r.flag()?,
            is_in_primary_key: r.flag()?,
            is_in_sampling_key: r.flag()?,
        })
    }
}

/// A row of `system.processes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Process {
    pub query_id: String,
    pub user: String,
    pub address: String,
    pub elapsed: f64,
    pub read_rows: u64,
    pub read_bytes: u64,
    pub total_rows_approx: u64,
    pub memory_usage: i64,
    pub query: String,
    pub is_initial_query: bool,
}

impl FromRow for Process {
    const MODEL: &'static str = "process";
    const COLUMNS: &'static [&'static str] = &[
        "query_id",
        "user",
        "toString(address)",
        "elapsed",
        "read_rows",
        "read_bytes",
        "total_rows_approx",
        "memory_usage",
        "query",
        "is_initial_query",
    ];

    fn from_row(row: Row) -> Result<Self, ExecutionError> {
        let mut r = RowReader::new::<Self>(row)?;
        Ok(Process {
            query_id: r.string()?,
            user: r.string()?,
            address: r.string()?,
            elapsed: r.f64()?,
            read_rows: r.u64()?,
            read_bytes: r.u64()?,
            total_rows_approx: r.u64()?,
            memory_usage: r.i64()?,
            query: r.string()?,
            is_initial_query: r.flag()?,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_table(
    database: &str,
    name: &str,
    engine: &str,
    sorting_key: &str,
    partition_key: &str,
) -> Table {
    Table {
        database: database.to_string(),
        name: name.to_string(),
        uuid: String::new(),
        engine: engine.to_string(),
        engine_full: String::new(),
        create_table_query: String::new(),
        as_select: String::new(),
        partition_key: partition_key.to_string(),
        sorting_key: sorting_key.to_string(),
        primary_key: sorting_key.to_string(),
        sampling_key: String::new(),
        storage_policy: "default".to_string(),
        total_rows: None,
        total_bytes: None,
        is_temporary: false,
        comment: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn table_from_row() {
        let row = vec![
            s("db1"),
            s("events"),
            s("00000000-0000-0000-0000-000000000000"),
            s("MergeTree"),
            s("MergeTree PARTITION BY day ORDER BY key SETTINGS index_granularity = 8192"),
            s("CREATE TABLE db1.events (`key` UInt64, `day` Date) ENGINE = MergeTree PARTITION BY day ORDER BY key SETTINGS index_granularity = 8192"),
            s(""),
            s("day"),
            s("key"),
            s("key"),
            s(""),
            s("default"),
            Value::UInt(1000),
            Value::Null,
            Value::UInt(0),
            s(""),
        ];

        let table = Table::from_row(row).unwrap();
        assert_eq!("db1.events", table.full_name());
        assert_eq!("MergeTree", table.engine);
        assert_eq!("key", table.sorting_key);
        assert_eq!("day", table.partition_key);
        assert_eq!(Some(1000), table.total_rows);
        assert_eq!(None, table.total_bytes);
        assert!(!table.is_temporary);
    }

    #[test]
    fn partition_from_row() {
        let row = vec![
            s("db1"),
            s("events"),
            s("2024-01-01"),
            s("20240101"),
            Value::UInt(1),
            Value::UInt(1),
            Value::UInt(666),
            Value::UInt(11844),
            Value::UInt(4000),
            Value::UInt(4500),
        ];
        let partition = Partition::from_row(row).unwrap();
        assert!(partition.active);
        assert_eq!(666, partition.rows);
        assert_eq!("20240101", partition.partition_id);
    }

    #[test]
    fn wrong_field_count() {
        let err = Database::from_row(vec![s("default")]).unwrap_err();
        assert!(matches!(err, ExecutionError::UnexpectedRow { model: "database", .. }));
    }

    #[test]
    fn wrong_field_type() {
        let mut row: Row = (0..Disk::COLUMNS.len()).map(|_| Value::UInt(0)).collect();
        row[0] = s("default");
        row[1] = s("/var/lib/clickhouse/");
        row[2] = s("lots");
        let err = Disk::from_row(row).unwrap_err();
        match err {
            ExecutionError::UnexpectedRow { reason, .. } => {
                assert!(reason.contains("free_space"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
