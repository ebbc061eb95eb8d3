//! Client core for the AliranTunai cash-flow dashboard.
//!
//! [`Client`] wires the pieces together: durable storage, the session, the
//! HTTP client, the shared query cache, and the services built on them.

use std::sync::Arc;

use api_types::identity::Identity;

pub mod auth;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod guard;
pub mod http;
pub mod preferences;
pub mod session;
pub mod storage;
pub mod transactions;

pub use auth::{AuthFlow, AuthState, AuthView};
pub use cache::{QueryCache, QueryKey, QueryOptions};
pub use config::{ClientConfig, Settings};
pub use dashboard::DashboardService;
pub use error::{ApiError, Error, Result};
pub use export::{DirectorySink, Exporter, SaveSink};
pub use guard::{GuardOutcome, Route};
pub use http::ApiClient;
pub use preferences::{ModePreference, ProfileService, VisitTracker};
pub use session::{Session, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transactions::TransactionsView;

/// One per process. Cloning shares the session and the cache.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    storage: Arc<dyn KeyValueStore>,
    sink: Arc<dyn SaveSink>,
    session: SessionStore,
    api: ApiClient,
    cache: QueryCache,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api", &self.api.base_url().as_str())
            .field("session", &self.session)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Client {
    /// Return a builder for `Client`.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn auth(&self) -> AuthFlow {
        AuthFlow::new(self.api.clone(), self.session.clone())
    }

    pub fn dashboard(&self) -> DashboardService {
        DashboardService::new(self.api.clone(), self.cache.clone())
    }

    pub fn transactions(&self, wa_id: &str) -> TransactionsView {
        TransactionsView::new(
            self.api.clone(),
            self.cache.clone(),
            wa_id,
            self.config.timezone,
            self.config.features.clone(),
        )
    }

    pub fn exporter(&self) -> Exporter {
        Exporter::new(
            self.api.clone(),
            self.sink.clone(),
            self.config.timezone,
            self.config.features.clone(),
        )
    }

    pub fn profile(&self) -> ProfileService {
        ProfileService::new(self.api.clone(), self.session.clone(), self.cache.clone())
    }

    pub fn modes(&self) -> ModePreference {
        ModePreference::new(
            self.storage.clone(),
            self.config.features.clone(),
            self.session.clone(),
            self.profile(),
        )
    }

    pub fn visits(&self) -> VisitTracker {
        VisitTracker::new(self.storage.clone())
    }

    /// Route admission against the current session.
    pub fn guard(&self, destination: Route, return_to: Option<Route>) -> GuardOutcome {
        guard::resolve(&self.session.snapshot(), destination, return_to)
    }

    /// Identity of the logged-in account.
    pub fn identity(&self) -> Result<Identity> {
        self.session.identity().ok_or(Error::Unauthenticated)
    }

    /// Ends the session and drops everything cached for it.
    pub fn logout(&self) {
        self.session.logout();
        self.cache.clear();
    }
}

#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    storage: Option<Arc<dyn KeyValueStore>>,
    sink: Option<Arc<dyn SaveSink>>,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    /// Resolved configuration. Defaults to built-in settings.
    pub fn config(mut self, config: ClientConfig) -> ClientBuilder {
        self.config = Some(config);
        self
    }

    /// Durable store. Defaults to a [`FileStore`] at `state_path`.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> ClientBuilder {
        self.storage = Some(storage);
        self
    }

    /// Download target. Defaults to a [`DirectorySink`] on `download_dir`.
    pub fn sink(mut self, sink: Arc<dyn SaveSink>) -> ClientBuilder {
        self.sink = Some(sink);
        self
    }

    pub fn http(mut self, http: reqwest::Client) -> ClientBuilder {
        self.http = Some(http);
        self
    }

    /// Construct `Client`. The session is hydrated before this returns.
    pub fn build(self) -> Result<Client> {
        let config = match self.config {
            Some(config) => config,
            None => ClientConfig::resolve(&Settings::default())?,
        };
        let storage = self.storage.unwrap_or_else(|| {
            Arc::new(FileStore::open(&config.state_path)) as Arc<dyn KeyValueStore>
        });
        let sink = self.sink.unwrap_or_else(|| {
            Arc::new(DirectorySink::new(&config.download_dir)) as Arc<dyn SaveSink>
        });

        let session = SessionStore::open(storage.clone());
        let cache = QueryCache::new();
        let api = ApiClient::with_http(
            config.api_base.clone(),
            session.clone(),
            self.http.unwrap_or_default(),
        )
        .with_cache(cache.clone());

        Ok(Client {
            config,
            storage,
            sink,
            session,
            api,
            cache,
        })
    }
}
