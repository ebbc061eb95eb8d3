use thiserror::Error;

use crate::config::Feature;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single backend call, classified by what the caller should do
/// about it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// 401 on an authenticated request. The session has already been
    /// cleared when this is returned.
    #[error("session expired, please log in again")]
    AuthExpired,
    /// `send-otp` refused because the user never messaged the bot.
    #[error("{message}")]
    PreconditionRequired { message: String },
    /// Any other 4xx carrying a server message.
    #[error("{message}")]
    Validation { status: u16, message: String },
    #[error("{message}")]
    NotFound { message: String },
    /// 5xx.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// The request never produced a response.
    #[error("server not reachable: {0}")]
    Transport(String),
    /// 2xx with a body that could not be decoded.
    #[error("unexpected response from server: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExpired => Some(401),
            Self::PreconditionRequired { .. } => Some(400),
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::Transport(_) | Self::Malformed(_) => None,
        }
    }

    /// Stable, machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::PreconditionRequired { .. } => "precondition_required",
            Self::Validation { .. } => "validation_rejected",
            Self::NotFound { .. } => "not_found",
            Self::Server { .. } => "server_error",
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::PreconditionRequired { message }
            | Self::Validation { message, .. }
            | Self::NotFound { message }
            | Self::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Only network failures are worth a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Crate-level error for everything that is not a plain backend call.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid setting: {0}")]
    Settings(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("not logged in")]
    Unauthenticated,
    #[error("{} is disabled in this build", .0.as_str())]
    FeatureDisabled(Feature),
}

impl Error {
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}
