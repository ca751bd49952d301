use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Failures surfaced at an operation boundary. None of them is retried
/// automatically.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("location permission denied")]
    PermissionDenied,
    #[error("failed to resolve location: {0}")]
    Geolocation(String),
    #[error("request failed: {message}")]
    Network {
        status: Option<u16>,
        message: String,
    },
    #[error("not allowed to {0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} is already in progress")]
    Busy(&'static str),
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl CoreError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn network(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Network {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CoreError::Network { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::Decode(value.to_string());
        }
        Self::network(value.status().map(|s| s.as_u16()), value.to_string())
    }
}

impl From<url::ParseError> for CoreError {
    fn from(value: url::ParseError) -> Self {
        Self::validation("url", value.to_string())
    }
}
