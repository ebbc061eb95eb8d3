//! Phone → OTP login as a plain state machine.
//!
//! [`AuthMachine::handle`] never performs I/O: it consumes an event and
//! returns at most one [`AuthCommand`] for the driver to run. Every command
//! carries a request id; completions for anything but the current request
//! are dropped, which is how `resend` and `change number` cancel work that
//! is already in flight.

use crate::error::ApiError;

use super::phone::{is_complete_otp, is_valid_phone, normalize_phone, sanitize_otp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    SendingOtp,
    AwaitingOtp,
    VerifyingOtp,
    Authenticated,
}

impl AuthState {
    pub fn is_inflight(self) -> bool {
        matches!(self, Self::SendingOtp | Self::VerifyingOtp)
    }
}

pub type RequestId = u64;

#[derive(Debug, Clone)]
pub enum AuthEvent {
    PhoneInput(String),
    SubmitPhone,
    CodeInput(String),
    SubmitCode,
    Resend,
    ChangeNumber,
    OtpSent {
        request: RequestId,
    },
    OtpSendFailed {
        request: RequestId,
        error: ApiError,
    },
    OtpVerified {
        request: RequestId,
    },
    OtpRejected {
        request: RequestId,
        error: ApiError,
    },
}

impl AuthEvent {
    /// Event name without its payload, safe to log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhoneInput(_) => "phone_input",
            Self::SubmitPhone => "submit_phone",
            Self::CodeInput(_) => "code_input",
            Self::SubmitCode => "submit_code",
            Self::Resend => "resend",
            Self::ChangeNumber => "change_number",
            Self::OtpSent { .. } => "otp_sent",
            Self::OtpSendFailed { .. } => "otp_send_failed",
            Self::OtpVerified { .. } => "otp_verified",
            Self::OtpRejected { .. } => "otp_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCommand {
    SendOtp {
        request: RequestId,
        phone: String,
    },
    VerifyOtp {
        request: RequestId,
        phone: String,
        code: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidPhone,
    InvalidCode,
    /// The user has to message the bot before a code can be sent.
    MessagingContactRequired,
    Rejected,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
}

const MESSAGING_CONTACT_REQUIRED: &str = "Please send any message to the AliranTunai WhatsApp bot \
     first, then request your login code again.";
const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";
const UNREACHABLE: &str = "Unable to reach the server. Check your connection and try again.";

impl AuthError {
    fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_api(err: &ApiError) -> Self {
        match err {
            ApiError::PreconditionRequired { .. } => {
                Self::new(AuthErrorKind::MessagingContactRequired, MESSAGING_CONTACT_REQUIRED)
            }
            ApiError::Transport(_) => Self::new(AuthErrorKind::Unreachable, UNREACHABLE),
            ApiError::Malformed(_) | ApiError::AuthExpired => {
                Self::new(AuthErrorKind::Rejected, GENERIC_FAILURE)
            }
            other => {
                let message = other.message();
                if message.trim().is_empty() {
                    Self::new(AuthErrorKind::Rejected, GENERIC_FAILURE)
                } else {
                    Self::new(AuthErrorKind::Rejected, message)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthMachine {
    state: AuthState,
    phone: String,
    code: String,
    error: Option<AuthError>,
    next_request: RequestId,
    inflight: Option<RequestId>,
}

impl Default for AuthMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthMachine {
    pub fn new() -> Self {
        Self {
            state: AuthState::Idle,
            phone: String::new(),
            code: String::new(),
            error: None,
            next_request: 1,
            inflight: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Normalised phone number as currently entered.
    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }

    pub fn is_current(&self, request: RequestId) -> bool {
        self.inflight == Some(request)
    }

    fn start_request(&mut self) -> RequestId {
        let request = self.next_request;
        self.next_request += 1;
        self.inflight = Some(request);
        request
    }

    fn send_otp(&mut self) -> AuthCommand {
        self.state = AuthState::SendingOtp;
        self.code.clear();
        self.error = None;
        AuthCommand::SendOtp {
            request: self.start_request(),
            phone: self.phone.clone(),
        }
    }

    pub fn handle(&mut self, event: AuthEvent) -> Option<AuthCommand> {
        use AuthEvent as E;
        use AuthState as S;

        match (self.state, event) {
            (S::Authenticated, _) => None,

            (S::Idle, E::PhoneInput(input)) => {
                self.phone = normalize_phone(&input);
                self.error = None;
                None
            }
            (S::Idle, E::SubmitPhone) => {
                if !is_valid_phone(&self.phone) {
                    self.error = Some(AuthError::new(
                        AuthErrorKind::InvalidPhone,
                        "Enter a valid Malaysian mobile number.",
                    ));
                    return None;
                }
                Some(self.send_otp())
            }

            (S::AwaitingOtp, E::CodeInput(input)) => {
                self.code = sanitize_otp(&input);
                None
            }
            (S::AwaitingOtp, E::SubmitCode) => {
                if !is_complete_otp(&self.code) {
                    self.error = Some(AuthError::new(
                        AuthErrorKind::InvalidCode,
                        "Enter the 6-digit code sent to your WhatsApp.",
                    ));
                    return None;
                }
                self.state = S::VerifyingOtp;
                self.error = None;
                Some(AuthCommand::VerifyOtp {
                    request: self.start_request(),
                    phone: self.phone.clone(),
                    code: self.code.clone(),
                })
            }

            (S::AwaitingOtp | S::VerifyingOtp, E::Resend) => Some(self.send_otp()),
            (S::SendingOtp | S::AwaitingOtp | S::VerifyingOtp, E::ChangeNumber) => {
                self.state = S::Idle;
                self.inflight = None;
                self.code.clear();
                self.error = None;
                None
            }

            (S::SendingOtp, E::OtpSent { request }) if self.is_current(request) => {
                self.inflight = None;
                self.state = S::AwaitingOtp;
                None
            }
            (S::SendingOtp, E::OtpSendFailed { request, error }) if self.is_current(request) => {
                self.inflight = None;
                self.state = S::Idle;
                self.error = Some(AuthError::from_api(&error));
                None
            }
            (S::VerifyingOtp, E::OtpVerified { request }) if self.is_current(request) => {
                self.inflight = None;
                self.state = S::Authenticated;
                self.code.clear();
                None
            }
            (S::VerifyingOtp, E::OtpRejected { request, error }) if self.is_current(request) => {
                self.inflight = None;
                self.state = S::AwaitingOtp;
                self.code.clear();
                self.error = Some(AuthError::from_api(&error));
                None
            }

            (
                _,
                E::OtpSent { request }
                | E::OtpSendFailed { request, .. }
                | E::OtpVerified { request }
                | E::OtpRejected { request, .. },
            ) => {
                tracing::debug!("dropping stale auth completion for request {request}");
                None
            }
            (state, event) => {
                tracing::debug!("ignoring {} in {state:?}", event.name());
                None
            }
        }
    }
}
