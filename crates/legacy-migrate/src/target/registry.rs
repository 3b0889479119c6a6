//! Process-scoped registry of target connections keyed by tenant database.

use super::PgTarget;
use crate::config::DatabaseConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One [`PgTarget`] per tenant database, created on first use.
///
/// Create one at process start and pass it to every job that needs the
/// target store.
#[derive(Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, Arc<PgTarget>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the target for `database`, connecting if not yet registered.
    pub async fn get_or_connect(
        &self,
        config: &DatabaseConfig,
        database: &str,
    ) -> Result<Arc<PgTarget>> {
        if let Some(existing) = self.targets.read().await.get(database) {
            return Ok(existing.clone());
        }

        let mut targets = self.targets.write().await;
        if let Some(existing) = targets.get(database) {
            return Ok(existing.clone());
        }
        debug!("Registering target database {}", database);
        let target = Arc::new(PgTarget::connect(config, database).await?);
        targets.insert(database.to_string(), target.clone());
        Ok(target)
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }

    /// Close and forget every registered target.
    pub async fn close_all(&self) {
        let mut targets = self.targets.write().await;
        for (_, target) in targets.drain() {
            target.close_pool();
        }
    }
}
