//! Kernel - core infrastructure with dependency injection.
//!
//! `Kernel` holds the long-lived process singletons (database pool, job
//! queue, runtime catalogue, configuration) and is threaded through the
//! HTTP layer and the background services. It carries infrastructure only,
//! never business logic.

use std::sync::Arc;

use sqlx::PgPool;

use crate::catalogue::Catalogue;
use crate::config::Config;
use crate::queue::PostgresJobQueue;
use crate::store::durable::DurableStore;
use crate::store::ephemeral::EphemeralStore;

/// Shared application state, cheap to clone (every field is an `Arc` or
/// already-`Clone` pool handle).
#[derive(Clone)]
pub struct Kernel {
    pub config: Arc<Config>,
    pub db: PgPool,
    pub durable: DurableStore,
    pub ephemeral: EphemeralStore,
    pub queue: PostgresJobQueue,
    pub catalogue: Arc<Catalogue>,
}

impl Kernel {
    pub fn new(config: Config, db: PgPool) -> Self {
        let durable = DurableStore::new(db.clone());
        let ephemeral = EphemeralStore::new(db.clone());
        let queue = PostgresJobQueue::new(db.clone());
        let catalogue = Arc::new(Catalogue::seeded());

        Self {
            config: Arc::new(config),
            db,
            durable,
            ephemeral,
            queue,
            catalogue,
        }
    }

    /// Upserts every descriptor in the in-process catalogue into the `languages` table
    /// (§3 "seeded at install"). Call once at startup, after migrations, before serving
    /// traffic - `POST /code-sessions` resolves `language_id` against this table, not the
    /// catalogue directly.
    pub async fn seed_languages(&self) -> Result<(), sqlx::Error> {
        for descriptor in self.catalogue.all() {
            self.durable
                .upsert_language(
                    descriptor.display_name,
                    descriptor.runtime,
                    descriptor.version,
                    descriptor.file_name,
                    descriptor.compile_cmd_template,
                    descriptor.run_cmd_template,
                    descriptor.default_time_limit_ms,
                    descriptor.default_memory_mb,
                    descriptor.template_code,
                )
                .await?;
        }
        Ok(())
    }
}
