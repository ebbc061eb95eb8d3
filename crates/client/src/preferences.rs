//! User-level preferences: operating mode, first-visit flag, profile edits.

use std::sync::Arc;

use api_types::{
    identity::{Identity, Mode},
    profile::ProfileUpdate,
};

use crate::{
    cache::QueryCache,
    config::FeatureFlags,
    dashboard::dashboard_key,
    error::{Error, Result},
    http::ApiClient,
    session::SessionStore,
    storage::KeyValueStore,
};

pub const APP_MODE_KEY: &str = "appMode";
pub const VISITED_KEY: &str = "hasVisitedBefore";

/// `PUT /api/user/profile`. The returned identity goes back through
/// [`SessionStore::login`] so the session stays the only writer of `user`.
#[derive(Debug, Clone)]
pub struct ProfileService {
    api: ApiClient,
    session: SessionStore,
    cache: QueryCache,
}

impl ProfileService {
    pub fn new(api: ApiClient, session: SessionStore, cache: QueryCache) -> Self {
        Self {
            api,
            session,
            cache,
        }
    }

    pub async fn update(&self, update: &ProfileUpdate) -> Result<Identity> {
        let token = self.session.token().ok_or(Error::Unauthenticated)?;
        let updated = self.api.update_profile(update).await?;
        self.session.login(updated.clone(), token)?;
        self.cache.invalidate(&dashboard_key(&updated.wa_id));
        tracing::info!("profile updated for {}", updated.wa_id);
        Ok(updated)
    }
}

/// Owns [`APP_MODE_KEY`].
#[derive(Clone)]
pub struct ModePreference {
    storage: Arc<dyn KeyValueStore>,
    features: FeatureFlags,
    session: SessionStore,
    profile: ProfileService,
}

impl std::fmt::Debug for ModePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModePreference")
            .field("current", &self.current())
            .finish()
    }
}

impl ModePreference {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        features: FeatureFlags,
        session: SessionStore,
        profile: ProfileService,
    ) -> Self {
        Self {
            storage,
            features,
            session,
            profile,
        }
    }

    /// Stored choice, then the identity's mode, then the configured default;
    /// each only if that mode is available.
    pub fn current(&self) -> Mode {
        let stored = self
            .storage
            .get(APP_MODE_KEY)
            .and_then(|raw| Mode::parse(&raw));
        let from_identity = self.session.identity().map(|identity| identity.mode);

        [stored, from_identity]
            .into_iter()
            .flatten()
            .find(|mode| self.features.is_mode_available(*mode))
            .unwrap_or_else(|| self.features.default_mode())
    }

    pub fn available(&self) -> Vec<Mode> {
        self.features.available_modes()
    }

    /// Switches mode. When logged in the change is pushed to the profile
    /// first and only stored locally once the server accepted it.
    pub async fn switch(&self, mode: Mode) -> Result<Mode> {
        if !self.features.can_switch_modes() {
            return Err(Error::InvalidInput("mode switching is disabled".to_string()));
        }
        if !self.features.is_mode_available(mode) {
            return Err(Error::InvalidInput(format!(
                "{} mode is not available",
                mode.as_str()
            )));
        }
        if mode == self.current() {
            return Ok(mode);
        }

        if self.session.is_authenticated() {
            let update = ProfileUpdate {
                mode: Some(mode),
                ..ProfileUpdate::default()
            };
            self.profile.update(&update).await?;
        }
        self.storage.set(APP_MODE_KEY, mode.as_str())?;
        tracing::info!("switched to {} mode", mode.as_str());
        Ok(mode)
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(APP_MODE_KEY)
    }
}

/// Owns [`VISITED_KEY`].
#[derive(Clone)]
pub struct VisitTracker {
    storage: Arc<dyn KeyValueStore>,
}

impl VisitTracker {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub fn is_first_visit(&self) -> bool {
        self.storage.get(VISITED_KEY).as_deref() != Some("true")
    }

    /// Records the visit; returns whether it was the first one.
    pub fn check_in(&self) -> Result<bool> {
        let first = self.is_first_visit();
        if first {
            self.storage.set(VISITED_KEY, "true")?;
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use super::*;
    use crate::{config::FeatureSettings, storage::MemoryStore};

    fn setup(features: FeatureFlags) -> (Arc<MemoryStore>, SessionStore, ModePreference) {
        let storage = Arc::new(MemoryStore::new());
        let session = SessionStore::open(storage.clone());
        let api = ApiClient::new(Url::parse("http://127.0.0.1:9").unwrap(), session.clone());
        let profile = ProfileService::new(api, session.clone(), QueryCache::new());
        let prefs = ModePreference::new(storage.clone(), features, session.clone(), profile);
        (storage, session, prefs)
    }

    fn identity(mode: Mode) -> Identity {
        Identity {
            wa_id: "60123456789".to_string(),
            name: None,
            owner_name: None,
            mode,
        }
    }

    #[test]
    fn resolution_order() {
        let (storage, session, prefs) = setup(FeatureFlags::default());
        assert_eq!(prefs.current(), Mode::Business);

        session
            .login(identity(Mode::Personal), "T".to_string())
            .unwrap();
        assert_eq!(prefs.current(), Mode::Personal);

        storage.set(APP_MODE_KEY, "business").unwrap();
        assert_eq!(prefs.current(), Mode::Business);
    }

    #[test]
    fn unavailable_modes_are_skipped() {
        let flags = FeatureFlags::resolve(&FeatureSettings {
            enable_business_mode: Some("false".to_string()),
            ..FeatureSettings::default()
        });
        let (storage, _, prefs) = setup(flags);
        storage.set(APP_MODE_KEY, "business").unwrap();
        assert_eq!(prefs.current(), Mode::Personal);
    }

    #[tokio::test]
    async fn switching_respects_flags() {
        let flags = FeatureFlags::resolve(&FeatureSettings {
            allow_mode_switching: Some("false".to_string()),
            ..FeatureSettings::default()
        });
        let (_, _, prefs) = setup(flags);
        assert!(matches!(
            prefs.switch(Mode::Personal).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn logged_out_switch_is_local() {
        let (storage, _, prefs) = setup(FeatureFlags::default());
        assert_eq!(prefs.switch(Mode::Personal).await.unwrap(), Mode::Personal);
        assert_eq!(storage.get(APP_MODE_KEY).as_deref(), Some("personal"));
        assert_eq!(prefs.current(), Mode::Personal);
    }

    #[test]
    fn first_visit_is_reported_once() {
        let tracker = VisitTracker::new(Arc::new(MemoryStore::new()));
        assert!(tracker.check_in().unwrap());
        assert!(!tracker.check_in().unwrap());
        assert!(!tracker.is_first_visit());
    }
}
