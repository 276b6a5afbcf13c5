use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::ddl::{self, CreateTableOptions};
use crate::endpoint::{RemoteSettings, S3Settings};
use crate::errors::{ExecutionError, Result, StatementError};
use crate::executor::{Params, Row, StatementExecutor};
use crate::introspect::{self, fetch_all, fetch_one, params};
use crate::models::{Column, Database, Disk, Partition, Process, Table};
use crate::partition::{self, PartitionKey};
use crate::statement::{Settings, Statement};
use crate::transfer;
use crate::transform::ColumnTransformSpec;

/// An administrative session against one ClickHouse server.
///
/// Every operation composes its statement from the current
/// [`ExecutionContext`] and hands it to the executor. Context mutations are
/// visible to the next operation.
#[derive(Debug)]
pub struct ClickhouseSession<E> {
    executor: E,
    context: ExecutionContext,
}

impl<E: StatementExecutor> ClickhouseSession<E> {
    /// Create a session. `active_database` should match the database the
    /// executor's connection was opened with.
    pub fn new(executor: E, active_database: impl Into<String>) -> Self {
        ClickhouseSession {
            executor,
            context: ExecutionContext::new(active_database),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn active_db(&self) -> &str {
        self.context.active_database()
    }

    pub fn set_settings(&mut self, settings: Settings) -> Result<(), StatementError> {
        self.context.set_settings(settings)
    }

    pub fn skip_settings(&mut self) {
        self.context.skip_settings();
    }

    pub fn set_on_cluster(&mut self, name: impl Into<String>) -> Result<(), StatementError> {
        self.context.set_on_cluster(name)
    }

    pub fn skip_on_cluster(&mut self) {
        self.context.skip_on_cluster();
    }

    /// Switch the server side default database with `USE`.
    ///
    /// The context only changes once the server accepted the switch.
    pub async fn set_active_db(&mut self, name: &str) -> Result<()> {
        let stmt = ddl::use_database(&self.context, name)?;
        self.run(&stmt).await?;
        self.context.set_active_database(name);
        info!(database = %name, "switched active database");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.executor.execute("SELECT 1", &Params::new()).await?;
        Ok(())
    }

    /// Execute arbitrary SQL. No context is applied.
    pub async fn exec(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        debug!(%sql, "exec");
        Ok(self.executor.execute(sql, params).await?)
    }

    async fn run(&self, stmt: &Statement) -> Result<Vec<Row>, ExecutionError> {
        debug!(kind = ?stmt.kind(), sql = %stmt, "executing statement");
        self.executor.execute_statement(stmt).await
    }

    fn database_or_active<'a>(&'a self, database: &'a str) -> &'a str {
        if database.is_empty() {
            self.context.active_database()
        } else {
            database
        }
    }

    /// Create a database and return its definition as read back from the
    /// server.
    pub async fn create_db(&self, name: &str, engine: &str) -> Result<Database> {
        let stmt = ddl::create_database(&self.context, name, engine)?;
        self.run(&stmt).await?;
        let database = self
            .get_database_by_name(name)
            .await?
            .ok_or_else(|| ExecutionError::NotFound {
                kind: "database",
                name: name.to_string(),
            })?;
        info!(database = %database.name, engine = %database.engine, "created database");
        Ok(database)
    }

    /// Create `database.table` shaped like `from_table` and return the new
    /// table as read back from the server.
    pub async fn create_table_as(
        &self,
        from_table: &Table,
        table: &str,
        database: &str,
        options: &CreateTableOptions,
    ) -> Result<Table> {
        let stmt = ddl::create_table_as(&self.context, from_table, table, database, options)?;
        self.run(&stmt).await?;
        let database = self.database_or_active(database);
        let created = self
            .get_table_by_name(table, database)
            .await?
            .ok_or_else(|| ExecutionError::NotFound {
                kind: "table",
                name: format!("{database}.{table}"),
            })?;
        info!(table = %created.full_name(), source = %from_table.full_name(), "created table");
        Ok(created)
    }

    pub async fn rename_table(&self, table: &Table, new_name: &str, database: &str) -> Result<()> {
        let stmt = ddl::rename_table(&self.context, table, new_name, database)?;
        self.run(&stmt).await?;
        info!(table = %table.full_name(), %new_name, "renamed table");
        Ok(())
    }

    pub async fn truncate(&self, table: &str, database: &str) -> Result<()> {
        let stmt = ddl::truncate(&self.context, table, database)?;
        self.run(&stmt).await?;
        info!(%table, %database, "truncated table");
        Ok(())
    }

    pub async fn move_partition(
        &self,
        from_table: &Table,
        to_table: &Table,
        partition: &PartitionKey,
    ) -> Result<()> {
        let stmt = partition::move_partition(&self.context, from_table, to_table, partition)?;
        self.run(&stmt).await?;
        info!(from = %from_table.full_name(), to = %to_table.full_name(), %partition, "moved partition");
        Ok(())
    }

    pub async fn replace_partition(
        &self,
        from_table: &Table,
        to_table: &Table,
        partition: &PartitionKey,
    ) -> Result<()> {
        let stmt = partition::replace_partition(&self.context, from_table, to_table, partition)?;
        self.run(&stmt).await?;
        info!(from = %from_table.full_name(), to = %to_table.full_name(), %partition, "replaced partition");
        Ok(())
    }

    pub async fn drop_partition(&self, table: &Table, partition: &PartitionKey) -> Result<()> {
        let stmt = partition::drop_partition(&self.context, table, partition)?;
        self.run(&stmt).await?;
        info!(table = %table.full_name(), %partition, "dropped partition");
        Ok(())
    }

    pub async fn detach_partition(&self, table: &Table, partition: &PartitionKey) -> Result<()> {
        let stmt = partition::detach_partition(&self.context, table, partition)?;
        self.run(&stmt).await?;
        info!(table = %table.full_name(), %partition, "detached partition");
        Ok(())
    }

    pub async fn attach_partition(&self, table: &Table, partition: &PartitionKey) -> Result<()> {
        let stmt = partition::attach_partition(&self.context, table, partition)?;
        self.run(&stmt).await?;
        info!(table = %table.full_name(), %partition, "attached partition");
        Ok(())
    }

    pub async fn insert_from_table(&self, from_table: &Table, to_table: &Table) -> Result<()> {
        let stmt = transfer::insert_from_table(&self.context, from_table, to_table)?;
        self.run(&stmt).await?;
        info!(from = %from_table.full_name(), to = %to_table.full_name(), "inserted from table");
        Ok(())
    }

    pub async fn insert_table_to_s3(&self, table: &Table, s3: &S3Settings) -> Result<()> {
        let stmt = transfer::insert_table_to_s3(&self.context, table, s3)?;
        self.run(&stmt).await?;
        info!(table = %table.full_name(), url = %s3.url, "exported table to s3");
        Ok(())
    }

    /// Load an object into `table`.
    ///
    /// With a transform the projection is built against the target table's
    /// current column list.
    pub async fn insert_from_s3(
        &self,
        table: &Table,
        s3: &S3Settings,
        transform: Option<&ColumnTransformSpec>,
    ) -> Result<()> {
        let projection = match transform {
            Some(transform) => {
                let columns = self.get_table_columns(&table.name, &table.database).await?;
                let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
                if names.is_empty() {
                    return Err(StatementError::NoColumns(table.full_name()).into());
                }
                Some(transform.projection(&names, &s3.url)?)
            }
            None => None,
        };
        let stmt = transfer::insert_from_s3(&self.context, table, s3, projection.as_deref())?;
        self.run(&stmt).await?;
        info!(table = %table.full_name(), url = %s3.url, "imported from s3");
        Ok(())
    }

    /// Copy a remote table into `database.table`, creating it first when
    /// `create_table` is set.
    ///
    /// The two statements are independent. A failed insert leaves the
    /// created table in place.
    pub async fn insert_from_remote(
        &self,
        remote: &RemoteSettings,
        table: &str,
        database: &str,
        create_table: bool,
    ) -> Result<()> {
        if create_table {
            let sql = introspect::remote_table_query(remote)?;
            let definition: Table = fetch_one(
                &self.executor,
                &sql,
                &params([
                    ("database", remote.database.as_str()),
                    ("name", remote.table.as_str()),
                ]),
            )
            .await?
            .ok_or_else(|| ExecutionError::NotFound {
                kind: "remote table",
                name: format!("{}.{}", remote.database, remote.table),
            })?;

            let stmt = transfer::create_table_from_remote(
                &self.context,
                &definition,
                remote,
                table,
                database,
            )?;
            self.run(&stmt).await?;
            info!(%table, %database, addresses = %remote.addresses, "created table from remote");
        }

        let stmt = transfer::insert_from_remote(&self.context, remote, table, database)?;
        self.run(&stmt).await?;
        info!(%table, %database, addresses = %remote.addresses, "inserted from remote");
        Ok(())
    }

    pub async fn get_databases(&self) -> Result<Vec<Database>> {
        Ok(fetch_all(&self.executor, &introspect::databases_query(), &Params::new()).await?)
    }

    pub async fn get_database_by_name(&self, name: &str) -> Result<Option<Database>> {
        let params = params([("name", name)]);
        Ok(fetch_one(&self.executor, &introspect::database_by_name_query(), &params).await?)
    }

    /// Tables of `database`, or of the active database when empty.
    pub async fn get_tables_by_db(&self, database: &str) -> Result<Vec<Table>> {
        let params = params([("database", self.database_or_active(database))]);
        Ok(fetch_all(&self.executor, &introspect::tables_by_db_query(), &params).await?)
    }

    pub async fn get_table_by_name(&self, name: &str, database: &str) -> Result<Option<Table>> {
        let params = params([
            ("database", self.database_or_active(database)),
            ("name", name),
        ]);
        Ok(fetch_one(&self.executor, &introspect::table_by_name_query(), &params).await?)
    }

    /// Active partitions of a table with their part totals.
    pub async fn get_table_partitions(&self, table: &str, database: &str) -> Result<Vec<Partition>> {
        let params = params([
            ("database", self.database_or_active(database)),
            ("table", table),
        ]);
        Ok(fetch_all(&self.executor, &introspect::table_partitions_query(), &params).await?)
    }

    pub async fn get_disks(&self) -> Result<Vec<Disk>> {
        Ok(fetch_all(&self.executor, &introspect::disks_query(), &Params::new()).await?)
    }

    pub async fn get_table_columns(&self, table: &str, database: &str) -> Result<Vec<Column>> {
        let params = params([
            ("database", self.database_or_active(database)),
            ("table", table),
        ]);
        Ok(fetch_all(&self.executor, &introspect::table_columns_query(), &params).await?)
    }

    pub async fn get_processes(&self) -> Result<Vec<Process>> {
        Ok(fetch_all(&self.executor, &introspect::processes_query(), &Params::new()).await?)
    }

    pub async fn get_process_by_query_id(&self, query_id: &str) -> Result<Option<Process>> {
        let params = params([("query_id", query_id)]);
        Ok(fetch_one(&self.executor, &introspect::process_by_query_id_query(), &params).await?)
    }
}
