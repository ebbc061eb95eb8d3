use std::{fmt, time::Duration};

pub const DASHBOARD_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const TRANSACTIONS_STALE_TIME: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

/// Structured cache key, e.g. `["dashboardStats", "60123456789"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Prefix match, used by invalidation.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part:?}")?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Age below which cached data is returned without a refetch.
    pub stale_time: Duration,
    /// Age beyond which unobserved data is no longer served.
    pub cache_time: Duration,
    /// Extra attempts after a transport failure.
    pub retry: u32,
    pub refetch_on_window_focus: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: DASHBOARD_STALE_TIME,
            cache_time: DEFAULT_CACHE_TIME,
            retry: 1,
            refetch_on_window_focus: false,
        }
    }
}

impl QueryOptions {
    pub fn dashboard() -> Self {
        Self::default()
    }

    pub fn transactions() -> Self {
        Self {
            stale_time: TRANSACTIONS_STALE_TIME,
            ..Self::default()
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_refetch_on_window_focus(mut self, refetch: bool) -> Self {
        self.refetch_on_window_focus = refetch;
        self
    }
}
