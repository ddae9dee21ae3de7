//! Error types for the grade polling pipeline.

use thiserror::Error;

/// Coarse classification used by the scheduler and in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Auth,
    MarkupShape,
    StateIo,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::MarkupShape => "markup_shape",
            ErrorKind::StateIo => "state_io",
        };
        write!(f, "{}", s)
    }
}

/// Errors produced while talking to the portal or handling grade state.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A request exceeded its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The portal answered with something other than 200.
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// The login page had no anti-forgery token.
    #[error("login token not found on login page")]
    MissingToken,

    /// The portal rejected the username/password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Login response had no logout link and no recognisable error text.
    #[error("login failed: no logout link in response")]
    LoginRejected,

    /// A page still showed the login prompt after re-authenticating.
    #[error("session still expired after re-login ({0})")]
    SessionExpired(String),

    /// An expected table or element was not in the page.
    #[error("unexpected page structure: {0}")]
    MarkupShape(String),

    /// The history file could not be read or written.
    #[error("state file error: {0}")]
    StateIo(String),
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Timeout(_) | MonitorError::Network(_) | MonitorError::HttpStatus { .. } => {
                ErrorKind::Network
            }
            MonitorError::MissingToken
            | MonitorError::InvalidCredentials
            | MonitorError::LoginRejected
            | MonitorError::SessionExpired(_) => ErrorKind::Auth,
            MonitorError::MarkupShape(_) => ErrorKind::MarkupShape,
            MonitorError::StateIo(_) => ErrorKind::StateIo,
        }
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MonitorError::Timeout(e.to_string())
        } else {
            MonitorError::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(e: std::io::Error) -> Self {
        MonitorError::StateIo(e.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::StateIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
