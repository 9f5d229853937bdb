//! Atelier error types

use std::time::Duration;

/// Errors returned by the marketplace client.
///
/// `Clone` so that one in-flight request can hand the same failure to every
/// caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MarketError {
    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The server rejected the session token. The session has already been
    /// cleared by the time a caller sees this.
    #[error("session expired or unauthorized")]
    Unauthorized,

    #[error("not signed in")]
    NotAuthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Local state errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session error: {0}")]
    Session(String),

    /// The signed-in party sent the latest negotiation entry and must wait
    /// for the other side.
    #[error("waiting for the other party to respond")]
    NotYourTurn,

    #[error("invalid transition: cannot {action} from {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl MarketError {
    /// Whether this error is worth retrying.
    ///
    /// Network failures, rate limits, and 5xx responses are transient.
    /// Everything else (auth, validation, 4xx) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this is an authentication failure owned by the session handler.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for MarketError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MarketError::Json(err.to_string())
        } else {
            MarketError::Http(err.to_string())
        }
    }
}

/// Result type alias for Atelier operations
pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = MarketError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = MarketError::Api {
            status: 422,
            message: "bad budget".into(),
        };
        assert!(!err.is_transient());
        assert!(!MarketError::Unauthorized.is_transient());
        assert!(!MarketError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = MarketError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(MarketError::Http("reset".into()).retry_after(), None);
    }

    #[test]
    fn invalid_transition_display() {
        let err = MarketError::InvalidTransition {
            from: "sent",
            action: "submit",
        };
        assert_eq!(err.to_string(), "invalid transition: cannot submit from sent");
    }
}
