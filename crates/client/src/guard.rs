//! Route admission.
//!
//! Each destination is wrapped in a [`Guard`]; the guard looks at the current
//! [`Session`] and decides whether to render, wait, or redirect.

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Landing,
    Login,
    Dashboard,
    Transactions,
    Export,
    Settings,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
            Self::Transactions => "/transactions",
            Self::Export => "/export",
            Self::Settings => "/settings",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        [
            Self::Landing,
            Self::Login,
            Self::Dashboard,
            Self::Transactions,
            Self::Export,
            Self::Settings,
        ]
        .into_iter()
        .find(|route| route.path() == path)
    }

    pub fn is_protected(self) -> bool {
        matches!(
            self,
            Self::Dashboard | Self::Transactions | Self::Export | Self::Settings
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session still hydrating.
    Loading,
    /// Go to `to`; `return_to` is where to continue afterwards.
    Redirect { to: Route, return_to: Option<Route> },
    Render(Route),
}

pub trait Guard {
    fn check(&self, session: &Session, destination: Route) -> GuardOutcome;
}

/// Admits only authenticated sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAuth;

impl Guard for RequireAuth {
    fn check(&self, session: &Session, destination: Route) -> GuardOutcome {
        if session.loading {
            return GuardOutcome::Loading;
        }
        if session.authenticated {
            GuardOutcome::Render(destination)
        } else {
            tracing::debug!("redirecting {} to login", destination.path());
            GuardOutcome::Redirect {
                to: Route::Login,
                return_to: Some(destination),
            }
        }
    }
}

/// Inverse of [`RequireAuth`], for screens like login: an authenticated
/// session is sent on to where it was going, or the dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireGuest {
    pub return_to: Option<Route>,
}

impl Guard for RequireGuest {
    fn check(&self, session: &Session, destination: Route) -> GuardOutcome {
        if session.loading {
            return GuardOutcome::Loading;
        }
        if session.authenticated {
            let to = self
                .return_to
                .filter(|route| route.is_protected())
                .unwrap_or(Route::Dashboard);
            GuardOutcome::Redirect {
                to,
                return_to: None,
            }
        } else {
            GuardOutcome::Render(destination)
        }
    }
}

/// Picks the right guard for a destination.
pub fn resolve(session: &Session, destination: Route, return_to: Option<Route>) -> GuardOutcome {
    if destination.is_protected() {
        RequireAuth.check(session, destination)
    } else if destination == Route::Login {
        RequireGuest { return_to }.check(session, destination)
    } else if session.loading {
        GuardOutcome::Loading
    } else {
        GuardOutcome::Render(destination)
    }
}

#[cfg(test)]
mod tests {
    use api_types::identity::{Identity, Mode};

    use super::*;

    fn authenticated() -> Session {
        Session {
            identity: Some(Identity {
                wa_id: "60123456789".to_string(),
                name: None,
                owner_name: None,
                mode: Mode::Personal,
            }),
            token: Some("T".to_string()),
            authenticated: true,
            loading: false,
        }
    }

    fn loading() -> Session {
        Session {
            loading: true,
            ..Session::default()
        }
    }

    #[test]
    fn protected_route_waits_while_loading() {
        assert_eq!(
            resolve(&loading(), Route::Dashboard, None),
            GuardOutcome::Loading
        );
    }

    #[test]
    fn protected_route_redirects_and_remembers_destination() {
        assert_eq!(
            resolve(&Session::default(), Route::Transactions, None),
            GuardOutcome::Redirect {
                to: Route::Login,
                return_to: Some(Route::Transactions)
            }
        );
    }

    #[test]
    fn protected_route_renders_when_authenticated() {
        assert_eq!(
            resolve(&authenticated(), Route::Dashboard, None),
            GuardOutcome::Render(Route::Dashboard)
        );
    }

    #[test]
    fn login_sends_authenticated_users_onwards() {
        assert_eq!(
            resolve(&authenticated(), Route::Login, Some(Route::Export)),
            GuardOutcome::Redirect {
                to: Route::Export,
                return_to: None
            }
        );
        assert_eq!(
            resolve(&authenticated(), Route::Login, Some(Route::Landing)),
            GuardOutcome::Redirect {
                to: Route::Dashboard,
                return_to: None
            }
        );
        assert_eq!(
            resolve(&Session::default(), Route::Login, None),
            GuardOutcome::Render(Route::Login)
        );
    }

    #[test]
    fn paths_round_trip() {
        assert_eq!(Route::from_path("/dashboard/"), Some(Route::Dashboard));
        assert_eq!(Route::from_path("/login?next=x"), Some(Route::Login));
        assert_eq!(Route::from_path("/"), Some(Route::Landing));
        assert_eq!(Route::from_path("/nope"), None);
    }
}
