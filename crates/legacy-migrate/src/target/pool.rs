//! Pooled PostgreSQL connection for one tenant database.

use super::{build_insert_sql, create_table_ddl, sequence_ddl, SqlValue, TargetColumn, TargetStore};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};
use crate::transform::SequenceDeclaration;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_postgres::{types::ToSql, Config as PgConfig, NoTls};
use tracing::{debug, info};

/// PostgreSQL target backed by a bounded deadpool pool.
pub struct PgTarget {
    pool: Pool,
    database: String,
    idle_connections: usize,
    lifetime: Duration,
}

impl PgTarget {
    /// Create the pool and probe it with `SELECT 1`.
    pub async fn connect(config: &DatabaseConfig, database: &str) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections.max(1))
            .build()
            .map_err(|e| MigrateError::pool(e.to_string(), "creating target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), format!("connecting to {}", database)))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, database
        );

        Ok(Self {
            pool,
            database: database.to_string(),
            idle_connections: config.idle_connections,
            lifetime: Duration::from_secs(config.connection_lifetime_secs),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Close the pool; outstanding connections are dropped on return.
    pub fn close_pool(&self) {
        self.pool.close();
    }

    /// Borrow a connection, dropping pooled ones past their lifetime first.
    async fn client(&self, context: &str) -> Result<Object> {
        let lifetime = self.lifetime;
        self.pool.retain(|_, metrics| metrics.age() < lifetime);
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), context.to_string()))
    }

    /// Keep at most `idle_connections` idle connections in the pool.
    fn trim_idle(&self) {
        let status = self.pool.status();
        if status.available <= self.idle_connections {
            return;
        }
        let keep = self.idle_connections;
        let seen = AtomicUsize::new(0);
        self.pool
            .retain(|_, _| seen.fetch_add(1, Ordering::Relaxed) < keep);
        debug!(
            "Trimmed idle connections on {} from {} to {}",
            self.database, status.available, keep
        );
    }
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn create_schema(&self, schema: &str) -> Result<()> {
        let client = self.client("create schema").await?;
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", super::quote_ident(schema));
        client.execute(sql.as_str(), &[]).await?;
        debug!("Created schema '{}'", schema);
        Ok(())
    }

    async fn ensure_table(&self, schema: &str, table: &str, columns: &[TargetColumn]) -> Result<()> {
        let client = self.client("create table").await?;
        let ddl = create_table_ddl(schema, table, columns);
        client.execute(ddl.as_str(), &[]).await?;
        debug!("Ensured table {}.{}", schema, table);
        Ok(())
    }

    async fn insert_batch(
        &self,
        schema: &str,
        table: &str,
        columns: &[TargetColumn],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let client = self.client("insert batch").await?;
        let (sql, params) = build_insert_sql(schema, table, columns, rows);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let written = client.execute(sql.as_str(), &param_refs).await?;
        drop(client);
        self.trim_idle();
        Ok(written)
    }

    async fn apply_sequence(&self, schema: &str, sequence: &SequenceDeclaration) -> Result<()> {
        let client = self.client("apply sequence").await?;
        for stmt in sequence_ddl(schema, sequence) {
            client.execute(stmt.as_str(), &[]).await?;
        }
        info!(
            "Sequence {}.{} starts at {}",
            schema, sequence.name, sequence.start
        );
        Ok(())
    }

    async fn close(&self) {
        self.close_pool();
    }
}
