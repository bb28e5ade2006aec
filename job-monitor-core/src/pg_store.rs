use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::OnceCell;

use crate::{
    ops::monitor::{count_grouped, current_database, db_time_now, oldest_grouped},
    store::{JobStore, JobView},
    types::{GroupKey, JobPredicate, TableIdentity, TimestampColumn},
    MonitorError, PoolConfig,
};

pub const POSTGRES_ADAPTER: &str = "postgresql";

// Thin layer on top of the raw monitor operations - mostly just avoids users having to take a dep on sqlx
pub struct PgJobStore {
    pub pool: PgPool,
    table: String,
    // Looked up once, the first time anything asks for the identity
    database: OnceCell<String>,
}

impl PgJobStore {
    pub async fn new(config: PoolConfig, table: &str) -> Result<Self, MonitorError> {
        let pool = config
            .connect()
            .await
            .map_err(|error| MonitorError::PoolCreationError { error })?;
        Ok(Self::from_pool(pool, table))
    }

    // Pools built elsewhere should connect through `utc_session` if the table has `timestamp`
    // columns
    pub fn from_pool(pool: PgPool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_owned(),
            database: OnceCell::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn identity(&self) -> Result<TableIdentity, MonitorError> {
        let database = self
            .database
            .get_or_try_init(|| current_database(&self.pool))
            .await?;

        Ok(TableIdentity {
            table: self.table.clone(),
            database: database.clone(),
            database_adapter: POSTGRES_ADAPTER.to_owned(),
        })
    }

    async fn now(&self) -> Result<DateTime<Utc>, MonitorError> {
        db_time_now(&self.pool).await
    }

    async fn count_grouped(
        &self,
        view: JobView<'_>,
        predicate: JobPredicate,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<GroupKey, i64>, MonitorError> {
        count_grouped(&self.pool, &self.table, view, predicate, as_of).await
    }

    async fn oldest_grouped(
        &self,
        view: JobView<'_>,
        predicate: JobPredicate,
        column: TimestampColumn,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<GroupKey, DateTime<Utc>>, MonitorError> {
        oldest_grouped(&self.pool, &self.table, view, predicate, column, as_of).await
    }
}
