//! Application state shared across handlers and background tasks.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::data::catalog::Catalog;
use crate::data::dashboard_cache::DashboardCache;
use crate::data::store::FacilityStore;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    /// Required bearer token for mutating endpoints; `None` disables the check.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn FacilityStore>,
        cache_ttl: Duration,
        api_token: Option<String>,
    ) -> Self {
        Self {
            catalog: Catalog::new(store, DashboardCache::new(cache_ttl)),
            api_token: api_token
                .filter(|t| !t.trim().is_empty())
                .map(Arc::from),
        }
    }

    /// Periodically drop expired dashboard entries so idle keys do not accumulate.
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        let cache = self.catalog.cache().clone();
        let period = cache.ttl().max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = cache.len(), "purged expired dashboard entries");
                }
            }
        })
    }
}
