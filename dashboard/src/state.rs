use std::future::Future;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::{ApiError, AuditApi};
use crate::explorer_config::ExplorerSettings;
use crate::query::DateRange;

pub struct AppState {
    pub api: AuditApi,
    pub settings: ExplorerSettings,
    /// Range the query API currently has loaded. The upstream holds one
    /// range at a time, so the lock is kept across load and fetch.
    loaded_range: Mutex<Option<DateRange>>,
}

impl AppState {
    pub fn new(api: AuditApi, settings: ExplorerSettings) -> Self {
        AppState {
            api,
            settings,
            loaded_range: Mutex::new(None),
        }
    }

    /// Runs `fetch` against `range`, loading it upstream first unless it is
    /// already the loaded one.
    ///
    /// A server error from `fetch` on a range loaded by an earlier request
    /// usually means the upstream lost it (a restart, say). The range is
    /// then loaded again and `fetch` retried once.
    pub async fn with_loaded_range<T, F, Fut>(
        &self,
        range: &DateRange,
        fetch: F,
    ) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut loaded = self.loaded_range.lock().await;
        let fresh = loaded.as_ref() != Some(range);
        if fresh {
            self.load(&mut loaded, range).await?;
        }

        match fetch().await {
            Err(ApiError::Server {
                path,
                status,
                message,
            }) if !fresh => {
                warn!(%path, %status, %message, "reloading {} .. {}", range.start_day(), range.end_day());
                self.load(&mut loaded, range).await?;
                fetch().await
            }
            result => result,
        }
    }

    async fn load(&self, loaded: &mut Option<DateRange>, range: &DateRange) -> Result<(), ApiError> {
        *loaded = None;
        let response = self.api.load_range(range).await?;
        info!(
            "loaded {} events for {} .. {}",
            response.total,
            range.start_day(),
            range.end_day()
        );
        *loaded = Some(*range);
        Ok(())
    }
}
