use std::sync::Arc;

use api_types::{dashboard::DashboardSummary, transaction::Transaction};

use crate::{
    cache::{QueryCache, QueryKey, QueryOptions},
    error::ApiError,
    http::ApiClient,
};

pub const DASHBOARD_KEY: &str = "dashboardStats";
pub const DEFAULT_RECENT: usize = 5;

pub fn dashboard_key(wa_id: &str) -> QueryKey {
    QueryKey::new([DASHBOARD_KEY, wa_id])
}

/// Cached access to `GET /api/dashboard/:id`.
#[derive(Debug, Clone)]
pub struct DashboardService {
    api: ApiClient,
    cache: QueryCache,
    options: QueryOptions,
}

impl DashboardService {
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self {
            api,
            cache,
            options: QueryOptions::dashboard(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn summary(&self, wa_id: &str) -> Result<Arc<DashboardSummary>, ApiError> {
        let api = self.api.clone();
        let id = wa_id.to_string();
        let summary: Arc<DashboardSummary> = self
            .cache
            .query(&dashboard_key(wa_id), self.options, move || {
                let api = api.clone();
                let id = id.clone();
                async move { api.dashboard(&id).await }
            })
            .await?;
        if !summary.ccc_consistent() {
            tracing::warn!(
                "dashboard for {wa_id} reports ccc={} but dso={} dio={} dpo={}",
                summary.ccc,
                summary.dso,
                summary.dio,
                summary.dpo
            );
        }
        Ok(summary)
    }

    /// Most recent `n` transactions from the summary, newest first.
    pub async fn recent(&self, wa_id: &str, n: usize) -> Result<Vec<Transaction>, ApiError> {
        let summary = self.summary(wa_id).await?;
        let mut recent = summary.recent_transactions.clone();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        recent.truncate(n);
        Ok(recent)
    }

    pub fn invalidate(&self, wa_id: &str) {
        self.cache.invalidate(&dashboard_key(wa_id));
    }
}
