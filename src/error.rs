use std::fmt;

/// Failures of the OAuth token lifecycle.
#[derive(Debug)]
pub enum AuthError {
    /// Token endpoint answered 2xx but the body had no usable `access_token`.
    InvalidResponse(String),
    /// Token endpoint rejected the grant.
    ExchangeRejected { status: u16, body: String },
    /// A refresh was needed but no refresh token is held.
    MissingRefreshToken,
    /// No access token yet; the authorization-code flow has not completed.
    NotAuthorized,
    /// The OAuth redirect carried `error=...` instead of a code.
    Callback(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidResponse(msg) => write!(f, "invalid token response: {msg}"),
            AuthError::ExchangeRejected { status, body } => {
                write!(f, "token exchange rejected (HTTP {status}): {body}")
            }
            AuthError::MissingRefreshToken => write!(f, "no refresh token available"),
            AuthError::NotAuthorized => write!(f, "not authorized, complete the OAuth flow first"),
            AuthError::Callback(msg) => write!(f, "authorization denied: {msg}"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Auth(AuthError),
    Unauthorized,
    Status { status: u16, body: String },
    NotFound(String),
    UnsupportedCapability { device_id: String, capability: &'static str },
    InvalidMode(String),
    InvalidFanMode(String),
    InvalidSetpoint(f64),
    InvalidResponse(String),
    Json(serde_json::Error),
    Url(url::ParseError),
    Io(std::io::Error),
}

impl Error {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Auth(AuthError::ExchangeRejected { status, .. }) => Some(*status),
            Error::Unauthorized => Some(401),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Auth(e) => write!(f, "auth error: {e}"),
            Error::Unauthorized => write!(f, "unauthorized (token refresh did not help)"),
            Error::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Error::NotFound(id) => write!(f, "thermostat not found: {id}"),
            Error::UnsupportedCapability { device_id, capability } => {
                write!(f, "{device_id} does not support {capability}")
            }
            Error::InvalidMode(mode) => write!(f, "invalid mode: {mode}"),
            Error::InvalidFanMode(mode) => write!(f, "invalid fan mode: {mode}"),
            Error::InvalidSetpoint(v) => write!(f, "invalid setpoint: {v}"),
            Error::InvalidResponse(msg) => write!(f, "unexpected response: {msg}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Url(e) => write!(f, "URL error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Url(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Url(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
