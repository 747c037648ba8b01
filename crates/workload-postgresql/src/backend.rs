//! PostgreSQL implementation of the workload backend.

use crate::args::PostgreSQLBackendArgs;
use crate::error::PostgreSQLWorkloadError;
use crate::statements::{self, validate_identifier, Statements};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Config, NoTls, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;
use workload_core::{
    BackendError, IsolationLevel, TestRecord, WorkloadBackend, WorkloadConfig,
    WorkloadConnection, WorkloadTransaction,
};

/// Map the driver's isolation level onto tokio-postgres.
pub fn pg_isolation_level(level: IsolationLevel) -> tokio_postgres::IsolationLevel {
    match level {
        IsolationLevel::ReadUncommitted => tokio_postgres::IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted => tokio_postgres::IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead => tokio_postgres::IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable => tokio_postgres::IsolationLevel::Serializable,
    }
}

/// Column types of the binary COPY, in `(id, created_at, payload)` order.
pub const COPY_COLUMN_TYPES: [Type; 3] = [Type::UUID, Type::TIMESTAMPTZ, Type::VARCHAR];

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Connect and spawn the connection task.
async fn open(config: &Config) -> Result<Client, PostgreSQLWorkloadError> {
    let (client, connection) = config.connect(NoTls).await?;

    // Spawn the connection task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(client)
}

/// Backend that runs the workload against one PostgreSQL table.
///
/// `prepare` drops and recreates the whole workload database, so point it
/// at a database that holds nothing else.
pub struct PostgreSQLBackend {
    workload: Config,
    maintenance: Config,
    database: String,
    statements: Arc<Statements>,
}

impl PostgreSQLBackend {
    /// Create a backend.
    ///
    /// # Arguments
    ///
    /// * `connection_string` - URL or key/value connection string; its
    ///   database name is replaced
    /// * `database` - Database the workload runs in
    /// * `table` - Table the workload writes to
    /// * `maintenance_database` - Database to connect to while (re)creating
    ///   `database`
    pub fn new(
        connection_string: &str,
        database: &str,
        table: &str,
        maintenance_database: &str,
    ) -> Result<Self, PostgreSQLWorkloadError> {
        validate_identifier(database)?;
        let statements = Statements::new(table)?;

        let base: Config = connection_string.parse().map_err(|e| {
            PostgreSQLWorkloadError::Config(format!("Invalid connection string: {e}"))
        })?;
        let mut workload = base.clone();
        workload.dbname(database);
        let mut maintenance = base;
        maintenance.dbname(maintenance_database);

        Ok(Self {
            workload,
            maintenance,
            database: database.to_string(),
            statements: Arc::new(statements),
        })
    }

    pub fn from_args(args: &PostgreSQLBackendArgs) -> Result<Self, PostgreSQLWorkloadError> {
        Self::new(
            &args.postgresql_connection_string,
            &args.postgresql_database,
            &args.postgresql_table,
            &args.postgresql_maintenance_database,
        )
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        self.statements.table()
    }

    async fn recreate(&self) -> Result<(), PostgreSQLWorkloadError> {
        let admin = open(&self.maintenance).await?;
        info!("Recreating database: {}", self.database);
        admin
            .batch_execute(&statements::drop_database(&self.database))
            .await?;
        admin
            .batch_execute(&statements::create_database(&self.database))
            .await?;
        drop(admin);

        let client = open(&self.workload).await?;
        let ddl = self.statements.create_table();
        info!("Creating table: {}", self.statements.table());
        debug!("DDL: {}", ddl);
        client.batch_execute(&ddl).await?;
        for index in self.statements.create_indexes() {
            debug!("DDL: {}", index);
            client.batch_execute(&index).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkloadBackend for PostgreSQLBackend {
    fn name(&self) -> &str {
        "postgresql"
    }

    async fn prepare(
        &self,
        _config: &WorkloadConfig,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        self.recreate().await?;
        Ok(())
    }

    async fn connect(&self) -> Result<Box<dyn WorkloadConnection>, BackendError> {
        let client = open(&self.workload).await?;
        Ok(Box::new(PostgreSQLConnection {
            client,
            statements: Arc::clone(&self.statements),
        }))
    }
}

/// One client connection.
pub struct PostgreSQLConnection {
    client: Client,
    statements: Arc<Statements>,
}

#[async_trait]
impl WorkloadConnection for PostgreSQLConnection {
    async fn begin<'a>(
        &'a mut self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn WorkloadTransaction + 'a>, BackendError> {
        let statements = Arc::clone(&self.statements);
        let transaction = self
            .client
            .build_transaction()
            .isolation_level(pg_isolation_level(isolation))
            .start()
            .await
            .map_err(PostgreSQLWorkloadError::from)?;
        Ok(Box::new(PostgreSQLTransaction {
            transaction,
            statements,
        }))
    }

    async fn maintenance(&mut self, cancel: &CancellationToken) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        // VACUUM cannot run inside a transaction block.
        self.client
            .batch_execute(self.statements.vacuum())
            .await
            .map_err(PostgreSQLWorkloadError::from)?;
        Ok(())
    }
}

/// Open transaction; rolled back when dropped without commit.
pub struct PostgreSQLTransaction<'a> {
    transaction: Transaction<'a>,
    statements: Arc<Statements>,
}

impl PostgreSQLTransaction<'_> {
    async fn copy_records(&self, records: &[TestRecord]) -> Result<u64, PostgreSQLWorkloadError> {
        let sink = self.transaction.copy_in(self.statements.copy_in()).await?;
        let writer = BinaryCopyInWriter::new(sink, &COPY_COLUMN_TYPES);
        let mut writer = std::pin::pin!(writer);
        for record in records {
            writer
                .as_mut()
                .write(&[&record.id, &record.created_at, &record.payload])
                .await?;
        }
        Ok(writer.finish().await?)
    }
}

#[async_trait]
impl<'a> WorkloadTransaction for PostgreSQLTransaction<'a> {
    async fn insert(
        &mut self,
        records: &[TestRecord],
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() || records.is_empty() {
            return Ok(0);
        }
        Ok(self.copy_records(records).await?)
    }

    async fn select(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }
        let rows = self
            .transaction
            .query(self.statements.select_newest(), &[&to_i64(requested)])
            .await
            .map_err(PostgreSQLWorkloadError::from)?;

        let mut selected = 0;
        for row in &rows {
            let _id: Uuid = row.try_get(0).map_err(PostgreSQLWorkloadError::from)?;
            let _created_at: DateTime<Utc> =
                row.try_get(1).map_err(PostgreSQLWorkloadError::from)?;
            let _payload: &str = row.try_get(2).map_err(PostgreSQLWorkloadError::from)?;
            selected += 1;
        }
        Ok(selected)
    }

    async fn update(
        &mut self,
        offset: u64,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }
        let updated = self
            .transaction
            .execute(
                self.statements.update_window(),
                &[&to_i64(requested), &to_i64(offset)],
            )
            .await
            .map_err(PostgreSQLWorkloadError::from)?;
        Ok(updated)
    }

    async fn delete(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }
        let deleted = self
            .transaction
            .execute(self.statements.delete_oldest(), &[&to_i64(requested)])
            .await
            .map_err(PostgreSQLWorkloadError::from)?;
        Ok(deleted)
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        let this = *self;
        this.transaction
            .commit()
            .await
            .map_err(PostgreSQLWorkloadError::from)?;
        Ok(())
    }
}
