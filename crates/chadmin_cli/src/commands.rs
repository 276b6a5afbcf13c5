use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chadmin::{
    ClickhouseSession, ColumnTransformSpec, CreateTableOptions, ExecutionError, NativeExecutor,
    Params, PartitionKey, RemoteSettings, S3Settings, Settings, Table, Value,
};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Chadmin(#[from] chadmin::ChadminError),

    #[error("Failed to read {}: {source}", path.display())]
    ReadFile { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<chadmin::StatementError> for CliError {
    fn from(value: chadmin::StatementError) -> Self {
        CliError::Chadmin(value.into())
    }
}

impl From<ExecutionError> for CliError {
    fn from(value: ExecutionError) -> Self {
        CliError::Chadmin(value.into())
    }
}

type Session = ClickhouseSession<NativeExecutor>;

/// Parse `name=value`, typing the value as an integer, float or boolean
/// where it parses as one.
pub fn parse_key_val(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing name in `{s}`"));
    }
    Ok((key.to_string(), infer_value(value.trim())))
}

fn infer_value(s: &str) -> Value {
    if let Ok(v) = s.parse::<u64>() {
        Value::UInt(v)
    } else if let Ok(v) = s.parse::<i64>() {
        Value::Int(v)
    } else if let Ok(v) = s.parse::<f64>() {
        Value::Float(v)
    } else if let Ok(v) = s.parse::<bool>() {
        Value::Bool(v)
    } else {
        Value::String(s.to_string())
    }
}

#[derive(Debug, Clone, Args)]
pub struct TableArgs {
    /// Table name.
    pub table: String,

    /// Database of the table. Defaults to the connection's database.
    #[clap(long, default_value = "")]
    pub database: String,
}

#[derive(Debug, Clone, Args)]
pub struct PartitionArgs {
    /// Partition value, e.g. `2024-01-01`.
    pub partition: String,

    /// Treat the partition as a partition id (`ID '...'`).
    #[clap(long, conflicts_with = "expr")]
    pub id: bool,

    /// Treat the partition as a raw expression, e.g. `(2024, 'eu')`.
    #[clap(long)]
    pub expr: bool,
}

impl PartitionArgs {
    fn key(&self) -> PartitionKey {
        if self.id {
            PartitionKey::id(&self.partition)
        } else if self.expr {
            PartitionKey::expr(&self.partition)
        } else {
            PartitionKey::value(&self.partition)
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct TablePairArgs {
    /// Source table.
    #[clap(long)]
    pub from_table: String,

    #[clap(long, default_value = "")]
    pub from_database: String,

    /// Destination table.
    #[clap(long)]
    pub to_table: String,

    #[clap(long, default_value = "")]
    pub to_database: String,
}

#[derive(Debug, Clone, Args)]
pub struct S3Args {
    /// Object URL.
    pub object_url: String,

    #[clap(long, default_value = chadmin::endpoint::DEFAULT_S3_FORMAT)]
    pub format: String,

    #[clap(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    #[clap(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Column structure, e.g. `a UInt64, b String`.
    #[clap(long)]
    pub structure: Option<String>,

    #[clap(long)]
    pub compression_method: Option<String>,
}

impl From<S3Args> for S3Settings {
    fn from(args: S3Args) -> Self {
        let mut settings = S3Settings::new(args.object_url).with_format(args.format);
        settings.access_key_id = args.access_key_id;
        settings.secret_access_key = args.secret_access_key;
        settings.structure = args.structure;
        settings.compression_method = args.compression_method;
        settings
    }
}

#[derive(Debug, Clone, Args)]
pub struct RemoteArgs {
    /// Address of the remote instance, `host:port`.
    #[clap(long)]
    pub addresses: String,

    #[clap(long)]
    pub remote_database: String,

    #[clap(long)]
    pub remote_table: String,

    #[clap(long, default_value = "")]
    pub user: String,

    #[clap(long, env = "CHADMIN_REMOTE_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,
}

impl From<RemoteArgs> for RemoteSettings {
    fn from(args: RemoteArgs) -> Self {
        RemoteSettings::new(
            args.addresses,
            args.remote_database,
            args.remote_table,
            args.user,
            args.password,
        )
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the connection.
    Ping,

    /// Execute raw SQL and print the returned rows.
    Exec {
        sql: String,

        /// Bound parameter referenced as `{name}`, as `name=value`.
        #[clap(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, Value)>,
    },

    /// Switch the active database and list its tables.
    Use { database: String },

    /// List databases.
    Databases,

    /// Show one database.
    Database { name: String },

    /// List tables of a database.
    Tables {
        #[clap(long, default_value = "")]
        database: String,
    },

    /// Show one table.
    Table(TableArgs),

    /// List active partitions of a table.
    Partitions(TableArgs),

    /// List table columns.
    Columns(TableArgs),

    /// List disks.
    Disks,

    /// List running queries.
    Processes,

    /// Show one running query.
    Process { query_id: String },

    /// Create a database.
    CreateDb {
        name: String,

        #[clap(long, default_value = "")]
        engine: String,
    },

    /// Create a table shaped like another table.
    CreateTableAs {
        /// Table to copy the structure of.
        #[clap(long)]
        from_table: String,

        #[clap(long, default_value = "")]
        from_database: String,

        #[clap(flatten)]
        target: TableArgs,

        /// Sorting key expression. May be repeated.
        #[clap(long)]
        order_by: Vec<String>,

        /// Partition key expression. May be repeated.
        #[clap(long)]
        partition_by: Vec<String>,

        #[clap(long)]
        engine: Option<String>,
    },

    /// Rename a table.
    RenameTable {
        #[clap(flatten)]
        table: TableArgs,

        new_name: String,

        /// Database to move the table into.
        #[clap(long, default_value = "")]
        new_database: String,
    },

    /// Remove all rows of a table.
    Truncate(TableArgs),

    /// Move a partition from one table to another.
    MovePartition {
        #[clap(flatten)]
        tables: TablePairArgs,

        #[clap(flatten)]
        partition: PartitionArgs,
    },

    /// Replace a partition of the destination with the source's copy.
    ReplacePartition {
        #[clap(flatten)]
        tables: TablePairArgs,

        #[clap(flatten)]
        partition: PartitionArgs,
    },

    DropPartition {
        #[clap(flatten)]
        table: TableArgs,

        #[clap(flatten)]
        partition: PartitionArgs,
    },

    DetachPartition {
        #[clap(flatten)]
        table: TableArgs,

        #[clap(flatten)]
        partition: PartitionArgs,
    },

    AttachPartition {
        #[clap(flatten)]
        table: TableArgs,

        #[clap(flatten)]
        partition: PartitionArgs,
    },

    /// Copy all rows of one table into another.
    InsertFromTable(TablePairArgs),

    /// Export a table to object storage.
    ExportToS3 {
        #[clap(flatten)]
        table: TableArgs,

        #[clap(flatten)]
        s3: S3Args,
    },

    /// Load an object storage file into a table.
    ImportFromS3 {
        #[clap(flatten)]
        table: TableArgs,

        #[clap(flatten)]
        s3: S3Args,

        /// JSON file describing column renames and conversions.
        #[clap(long)]
        transform: Option<PathBuf>,
    },

    /// Copy a table from a remote instance.
    InsertFromRemote {
        #[clap(flatten)]
        remote: RemoteArgs,

        #[clap(flatten)]
        target: TableArgs,

        /// Create the target table from the remote definition first.
        #[clap(long)]
        create_table: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

async fn lookup_table(session: &Session, name: &str, database: &str) -> Result<Table, CliError> {
    let table = session
        .get_table_by_name(name, database)
        .await?
        .ok_or_else(|| ExecutionError::NotFound {
            kind: "table",
            name: if database.is_empty() {
                name.to_string()
            } else {
                format!("{database}.{name}")
            },
        })?;
    Ok(table)
}

fn load_transform(path: &Path) -> Result<ColumnTransformSpec, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

impl Commands {
    pub async fn run(
        self,
        url: &str,
        cluster: Option<&str>,
        settings: Settings,
    ) -> Result<(), CliError> {
        let executor = NativeExecutor::connect(url).await?;
        let database = executor.options().database.clone();
        let mut session = ClickhouseSession::new(executor, database);
        if let Some(cluster) = cluster {
            session.set_on_cluster(cluster)?;
        }
        session.set_settings(settings)?;

        match self {
            Commands::Ping => {
                session.ping().await?;
                info!(%url, "ping ok");
            }
            Commands::Exec { sql, params } => {
                let params: Params = params.into_iter().collect();
                print_json(&session.exec(&sql, &params).await?)?;
            }
            Commands::Use { database } => {
                session.set_active_db(&database).await?;
                print_json(&session.get_tables_by_db("").await?)?;
            }
            Commands::Databases => print_json(&session.get_databases().await?)?,
            Commands::Database { name } => {
                print_json(&session.get_database_by_name(&name).await?)?
            }
            Commands::Tables { database } => {
                print_json(&session.get_tables_by_db(&database).await?)?
            }
            Commands::Table(args) => {
                print_json(&lookup_table(&session, &args.table, &args.database).await?)?
            }
            Commands::Partitions(args) => print_json(
                &session
                    .get_table_partitions(&args.table, &args.database)
                    .await?,
            )?,
            Commands::Columns(args) => print_json(
                &session
                    .get_table_columns(&args.table, &args.database)
                    .await?,
            )?,
            Commands::Disks => print_json(&session.get_disks().await?)?,
            Commands::Processes => print_json(&session.get_processes().await?)?,
            Commands::Process { query_id } => {
                print_json(&session.get_process_by_query_id(&query_id).await?)?
            }
            Commands::CreateDb { name, engine } => {
                print_json(&session.create_db(&name, &engine).await?)?
            }
            Commands::CreateTableAs {
                from_table,
                from_database,
                target,
                order_by,
                partition_by,
                engine,
            } => {
                let source = lookup_table(&session, &from_table, &from_database).await?;
                let options = CreateTableOptions {
                    order_by: (!order_by.is_empty()).then_some(order_by),
                    partition_by: (!partition_by.is_empty()).then_some(partition_by),
                    engine,
                };
                let created = session
                    .create_table_as(&source, &target.table, &target.database, &options)
                    .await?;
                print_json(&created)?;
            }
            Commands::RenameTable {
                table,
                new_name,
                new_database,
            } => {
                let table = lookup_table(&session, &table.table, &table.database).await?;
                session
                    .rename_table(&table, &new_name, &new_database)
                    .await?;
            }
            Commands::Truncate(args) => session.truncate(&args.table, &args.database).await?,
            Commands::MovePartition { tables, partition } => {
                let from = lookup_table(&session, &tables.from_table, &tables.from_database).await?;
                let to = lookup_table(&session, &tables.to_table, &tables.to_database).await?;
                session.move_partition(&from, &to, &partition.key()).await?;
            }
            Commands::ReplacePartition { tables, partition } => {
                let from = lookup_table(&session, &tables.from_table, &tables.from_database).await?;
                let to = lookup_table(&session, &tables.to_table, &tables.to_database).await?;
                session
                    .replace_partition(&from, &to, &partition.key())
                    .await?;
            }
            Commands::DropPartition { table, partition } => {
                let table = lookup_table(&session, &table.table, &table.database).await?;
                session.drop_partition(&table, &partition.key()).await?;
            }
            Commands::DetachPartition { table, partition } => {
                let table = lookup_table(&session, &table.table, &table.database).await?;
                session.detach_partition(&table, &partition.key()).await?;
            }
            Commands::AttachPartition { table, partition } => {
                let table = lookup_table(&session, &table.table, &table.database).await?;
                session.attach_partition(&table, &partition.key()).await?;
            }
            Commands::InsertFromTable(tables) => {
                let from = lookup_table(&session, &tables.from_table, &tables.from_database).await?;
                let to = lookup_table(&session, &tables.to_table, &tables.to_database).await?;
                session.insert_from_table(&from, &to).await?;
            }
            Commands::ExportToS3 { table, s3 } => {
                let table = lookup_table(&session, &table.table, &table.database).await?;
                session.insert_table_to_s3(&table, &s3.into()).await?;
            }
            Commands::ImportFromS3 {
                table,
                s3,
                transform,
            } => {
                let transform = transform.as_deref().map(load_transform).transpose()?;
                let table = lookup_table(&session, &table.table, &table.database).await?;
                session
                    .insert_from_s3(&table, &s3.into(), transform.as_ref())
                    .await?;
            }
            Commands::InsertFromRemote {
                remote,
                target,
                create_table,
            } => {
                session
                    .insert_from_remote(
                        &remote.into(),
                        &target.table,
                        &target.database,
                        create_table,
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_val_typing() {
        assert_eq!(
            ("max_threads".to_string(), Value::UInt(4)),
            parse_key_val("max_threads=4").unwrap()
        );
        assert_eq!(
            ("offset".to_string(), Value::Int(-2)),
            parse_key_val("offset = -2").unwrap()
        );
        assert_eq!(
            ("insert_deduplicate".to_string(), Value::Bool(false)),
            parse_key_val("insert_deduplicate=false").unwrap()
        );
        assert_eq!(
            ("region".to_string(), Value::from("eu")),
            parse_key_val("region=eu").unwrap()
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=1").is_err());
    }

    #[test]
    fn partition_arg_kinds() {
        let args = PartitionArgs {
            partition: "20240101".to_string(),
            id: true,
            expr: false,
        };
        assert_eq!(PartitionKey::id("20240101"), args.key());

        let args = PartitionArgs {
            partition: "(2024, 'eu')".to_string(),
            id: false,
            expr: true,
        };
        assert_eq!(PartitionKey::expr("(2024, 'eu')"), args.key());
    }

    #[test]
    fn s3_args_into_settings() {
        let settings: S3Settings = S3Args {
            object_url: "http://localhost:9001/b/f.csv".to_string(),
            format: "CSV".to_string(),
            access_key_id: None,
            secret_access_key: None,
            structure: None,
            compression_method: Some("gzip".to_string()),
        }
        .into();
        assert_eq!("CSV", settings.format);
        assert_eq!(Some("gzip".to_string()), settings.compression_method);
    }
}
