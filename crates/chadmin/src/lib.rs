//! Administrative operations for ClickHouse.
//!
//! Structured intents (create a table like another one, move a partition,
//! load an object storage file with renamed and retyped columns) are composed
//! into ClickHouse SQL and sent through a [`StatementExecutor`].
//!
//! Composers are pure functions of their inputs and an [`ExecutionContext`].
//! [`ClickhouseSession`] owns a context and an executor and runs the composed
//! statements.

pub mod context;
pub mod ddl;
pub mod endpoint;
pub mod errors;
pub mod executor;
pub mod ident;
mod introspect;
pub mod models;
pub mod native;
pub mod partition;
pub mod session;
pub mod statement;
pub mod transfer;
pub mod transform;

pub use context::ExecutionContext;
pub use ddl::CreateTableOptions;
pub use endpoint::{RemoteSettings, S3Settings};
pub use errors::{ChadminError, ConfigurationError, ExecutionError, Result, StatementError};
pub use executor::{Params, Row, StatementExecutor, Value};
pub use models::{Column, Database, Disk, Partition, Process, Table};
pub use native::{ConnectionOptions, NativeExecutor};
pub use partition::PartitionKey;
pub use session::ClickhouseSession;
pub use statement::{Settings, Statement, StatementKind};
pub use transform::{ColumnTransformSpec, ConvertRule, FileNameSource, RenameRule};
