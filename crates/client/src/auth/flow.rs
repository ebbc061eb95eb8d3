use std::sync::{Arc, Mutex, MutexGuard};

use crate::{error::ApiError, http::ApiClient, session::SessionStore};

use super::machine::{AuthCommand, AuthError, AuthEvent, AuthMachine, AuthState};

/// What the login screen renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthView {
    pub state: AuthState,
    pub phone: String,
    pub code: String,
    pub error: Option<AuthError>,
}

/// Runs [`AuthMachine`] commands against the backend and hands a verified
/// identity to the [`SessionStore`].
///
/// Methods take `&self` so that inputs can arrive while a request is in
/// flight; the machine decides which of them count.
#[derive(Debug, Clone)]
pub struct AuthFlow {
    machine: Arc<Mutex<AuthMachine>>,
    api: ApiClient,
    session: SessionStore,
}

impl AuthFlow {
    pub fn new(api: ApiClient, session: SessionStore) -> Self {
        Self {
            machine: Arc::new(Mutex::new(AuthMachine::new())),
            api,
            session,
        }
    }

    fn machine(&self) -> MutexGuard<'_, AuthMachine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn view(&self) -> AuthView {
        let machine = self.machine();
        AuthView {
            state: machine.state(),
            phone: machine.phone().to_string(),
            code: machine.code().to_string(),
            error: machine.error().cloned(),
        }
    }

    pub fn set_phone(&self, input: &str) -> AuthView {
        self.machine().handle(AuthEvent::PhoneInput(input.to_string()));
        self.view()
    }

    pub fn set_code(&self, input: &str) -> AuthView {
        self.machine().handle(AuthEvent::CodeInput(input.to_string()));
        self.view()
    }

    pub async fn submit_phone(&self) -> AuthView {
        self.dispatch(AuthEvent::SubmitPhone).await
    }

    pub async fn submit_code(&self) -> AuthView {
        self.dispatch(AuthEvent::SubmitCode).await
    }

    pub async fn resend(&self) -> AuthView {
        self.dispatch(AuthEvent::Resend).await
    }

    pub fn change_number(&self) -> AuthView {
        self.machine().handle(AuthEvent::ChangeNumber);
        self.view()
    }

    async fn dispatch(&self, event: AuthEvent) -> AuthView {
        let command = self.machine().handle(event);
        if let Some(command) = command {
            self.run(command).await;
        }
        self.view()
    }

    async fn run(&self, command: AuthCommand) {
        match command {
            AuthCommand::SendOtp { request, phone } => {
                tracing::debug!("requesting login code for {phone}");
                let event = match self.api.send_otp(&phone).await {
                    Ok(()) => AuthEvent::OtpSent { request },
                    Err(error) => {
                        tracing::warn!("send-otp failed: {error}");
                        AuthEvent::OtpSendFailed { request, error }
                    }
                };
                self.machine().handle(event);
            }
            AuthCommand::VerifyOtp {
                request,
                phone,
                code,
            } => {
                let result = self.api.verify_otp(&phone, &code).await;
                if !self.machine().is_current(request) {
                    tracing::debug!("verification for {phone} was cancelled");
                    return;
                }
                let event = match result {
                    Ok(res) => match self.session.login(res.user, res.token) {
                        Ok(()) => AuthEvent::OtpVerified { request },
                        Err(err) => {
                            tracing::error!("could not persist session: {err}");
                            AuthEvent::OtpRejected {
                                request,
                                error: ApiError::Malformed(err.to_string()),
                            }
                        }
                    },
                    Err(error) => {
                        tracing::warn!("verify-otp failed: {error}");
                        AuthEvent::OtpRejected { request, error }
                    }
                };
                self.machine().handle(event);
            }
        }
    }
}
