//! Resources-cache refresh sweep
//!
//! Walks the cache table and rebuilds rows made stale by newer quiz or
//! midterm activity, reusing the curation pipeline the API serves from.

use std::sync::Arc;

use studybuddy_common::clients::{CompletionModel, ResourceSearch, WeaknessStore};
use studybuddy_common::db::{DbPool, Repository};
use studybuddy_common::errors::Result;
use studybuddy_insights::ResourceCurator;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome counters for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SweepStats {
    pub scanned: usize,
    pub refreshed: usize,
    pub fresh: usize,
    /// Stale rows whose owner no longer has any identified weaknesses
    pub skipped: usize,
    pub failed: usize,
}

/// Refreshes stale resources-cache rows through the shared curator.
pub struct CacheRefresher {
    repository: Repository,
    curator: ResourceCurator,
    batch_limit: u64,
}

enum UserOutcome {
    Fresh,
    Refreshed,
    NoWeaknesses,
}

impl CacheRefresher {
    pub fn new(
        db: DbPool,
        model: Arc<dyn CompletionModel>,
        search: Arc<dyn ResourceSearch>,
        weaknesses: Arc<dyn WeaknessStore>,
        batch_limit: u64,
    ) -> Self {
        let repository = Repository::new(db.clone());
        let curator = ResourceCurator::new(Repository::new(db), model, search, weaknesses);
        Self {
            repository,
            curator,
            batch_limit,
        }
    }

    /// One pass over the cache table, oldest refresh first. Per-user
    /// failures are counted and logged; only the user listing itself can
    /// fail the sweep.
    pub async fn sweep(&self) -> Result<SweepStats> {
        let user_ids = self
            .repository
            .list_cached_user_ids(self.batch_limit)
            .await?;

        let mut stats = SweepStats {
            scanned: user_ids.len(),
            ..Default::default()
        };

        for user_id in user_ids {
            match self.refresh_user(user_id).await {
                Ok(UserOutcome::Fresh) => stats.fresh += 1,
                Ok(UserOutcome::Refreshed) => stats.refreshed += 1,
                Ok(UserOutcome::NoWeaknesses) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        user_id = %user_id,
                        error = %e,
                        "Failed to refresh cached resources"
                    );
                }
            }
        }

        info!(
            scanned = stats.scanned,
            refreshed = stats.refreshed,
            fresh = stats.fresh,
            skipped = stats.skipped,
            failed = stats.failed,
            "Refresh sweep finished"
        );
        Ok(stats)
    }

    async fn refresh_user(&self, user_id: Uuid) -> Result<UserOutcome> {
        if self.curator.fresh_cache(user_id).await?.is_some() {
            debug!(user_id = %user_id, "Cache still fresh");
            return Ok(UserOutcome::Fresh);
        }

        match self.curator.rebuild(user_id).await? {
            Some(curated) => {
                info!(
                    user_id = %user_id,
                    resources = curated.resources.len(),
                    "Refreshed cached resources"
                );
                Ok(UserOutcome::Refreshed)
            }
            None => {
                debug!(user_id = %user_id, "No weaknesses identified, leaving row as is");
                Ok(UserOutcome::NoWeaknesses)
            }
        }
    }
}
