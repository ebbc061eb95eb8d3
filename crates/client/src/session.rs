//! Process-wide session: who is logged in, with which token.
//!
//! The store is the only writer of the [`AUTH_TOKEN_KEY`] and [`USER_KEY`]
//! durable keys. State changes are published as whole [`Session`] values, so
//! observers see either the loading state or a fully hydrated one.

use std::sync::Arc;

use api_types::identity::Identity;
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    storage::KeyValueStore,
};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub token: Option<String>,
    pub authenticated: bool,
    pub loading: bool,
}

impl Session {
    fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    fn logged_in(identity: Identity, token: String) -> Self {
        Self {
            identity: Some(identity),
            token: Some(token),
            authenticated: true,
            loading: false,
        }
    }

    fn logged_out() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    state: Arc<watch::Sender<Session>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.state.borrow();
        f.debug_struct("SessionStore")
            .field("authenticated", &session.authenticated)
            .field("loading", &session.loading)
            .finish()
    }
}

impl SessionStore {
    /// Creates the store in the loading state. Call [`hydrate`] before use.
    ///
    /// [`hydrate`]: SessionStore::hydrate
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(Session::loading());
        Self {
            storage,
            state: Arc::new(state),
        }
    }

    /// Creates and hydrates in one step.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        let store = Self::new(storage);
        store.hydrate();
        store
    }

    /// Reads the persisted token and identity. Anything partial or
    /// unparseable counts as logged out and is scrubbed.
    pub fn hydrate(&self) {
        let token = self.storage.get(AUTH_TOKEN_KEY);
        let user = self.storage.get(USER_KEY);

        let session = match (token, user) {
            (None, None) => Session::logged_out(),
            (Some(token), Some(user)) if !token.is_empty() => {
                match serde_json::from_str::<Identity>(&user) {
                    Ok(identity) => Session::logged_in(identity, token),
                    Err(err) => {
                        tracing::warn!("persisted user is malformed, clearing session: {err}");
                        self.scrub();
                        Session::logged_out()
                    }
                }
            }
            _ => {
                tracing::warn!("persisted session is incomplete, clearing it");
                self.scrub();
                Session::logged_out()
            }
        };

        tracing::debug!("session hydrated, authenticated={}", session.authenticated);
        self.state.send_replace(session);
    }

    /// Sets identity and token together and writes both through.
    pub fn login(&self, identity: Identity, token: String) -> Result<()> {
        if token.is_empty() {
            return Err(Error::InvalidInput("empty auth token".to_string()));
        }
        let user = serde_json::to_string(&identity)?;

        let written = self
            .storage
            .set(AUTH_TOKEN_KEY, &token)
            .and_then(|()| self.storage.set(USER_KEY, &user));
        if let Err(err) = written {
            self.scrub();
            return Err(err);
        }

        tracing::info!("logged in as {}", identity.wa_id);
        self.state.send_replace(Session::logged_in(identity, token));
        Ok(())
    }

    /// Clears memory first, then durable state. Never fails.
    pub fn logout(&self) {
        let was_authenticated = self.state.borrow().authenticated;
        self.state.send_replace(Session::logged_out());
        self.scrub();
        if was_authenticated {
            tracing::info!("logged out");
        }
    }

    fn scrub(&self) {
        for key in [AUTH_TOKEN_KEY, USER_KEY] {
            if let Err(err) = self.storage.remove(key) {
                tracing::error!("failed to remove `{key}` from storage: {err}");
            }
        }
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }
}
