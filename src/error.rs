use thiserror::Error;

/// Type alias for Result with CleanerError
pub type Result<T> = std::result::Result<T, CleanerError>;

/// Error types for the tag cleaner
#[derive(Error, Debug)]
pub enum CleanerError {
    /// A required credential was not provided
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Authentication failed (bad token, 401, malformed authorization URL)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The local redirect listener could not be started
    #[error("Redirect listener error: {0}")]
    ListenerError(String),

    /// Exchanging the authorization code for an access token failed
    #[error("Token exchange failed: {0}")]
    TokenExchangeError(String),

    /// No redirect arrived within the configured timeout
    #[error("Timed out after {0} seconds waiting for the authorization redirect")]
    RedirectTimeout(u64),

    /// Raindrop API returned an error
    #[error("Raindrop API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Network-related error (connection issues, TLS, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// IO error (file operations, stdin, sockets)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl CleanerError {
    /// Errors that abort the run before any tag is touched
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            CleanerError::MissingCredential(_)
                | CleanerError::ConfigError(_)
                | CleanerError::AuthError(_)
                | CleanerError::ListenerError(_)
                | CleanerError::TokenExchangeError(_)
                | CleanerError::RedirectTimeout(_)
        )
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: hyper::StatusCode, retry_after: Option<u64>, body: &str) -> Self {
        let code = status.as_u16();
        let message = if body.trim().is_empty() {
            format!(
                "HTTP {}: {}",
                code,
                status.canonical_reason().unwrap_or("Unknown")
            )
        } else {
            format!("HTTP {}: {}", code, body.trim())
        };

        match code {
            401 => CleanerError::AuthError(message),
            429 => CleanerError::RateLimitExceeded {
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            },
            500..=599 => CleanerError::ServerError {
                status: code,
                message,
            },
            _ => CleanerError::ApiError(message),
        }
    }
}

const DEFAULT_RETRY_AFTER: u64 = 60;

/// Parse the Retry-After header (delay-seconds form only)
pub(crate) fn parse_retry_after_header(headers: &hyper::header::HeaderMap) -> Option<u64> {
    headers
        .get(hyper::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

impl From<hyper_util::client::legacy::Error> for CleanerError {
    fn from(error: hyper_util::client::legacy::Error) -> Self {
        CleanerError::NetworkError(format!("Connection error: {}", error))
    }
}

impl From<hyper::Error> for CleanerError {
    fn from(error: hyper::Error) -> Self {
        CleanerError::NetworkError(error.to_string())
    }
}

impl From<hyper::http::Error> for CleanerError {
    fn from(error: hyper::http::Error) -> Self {
        CleanerError::Unknown(format!("Failed to build request: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    #[test]
    fn test_fatal_startup_errors() {
        assert!(CleanerError::MissingCredential("missing".into()).is_fatal_startup());
        assert!(CleanerError::ListenerError("in use".into()).is_fatal_startup());
        assert!(CleanerError::TokenExchangeError("bad code".into()).is_fatal_startup());

        assert!(!CleanerError::ApiError("HTTP 400".into()).is_fatal_startup());
        assert!(!CleanerError::NetworkError("reset".into()).is_fatal_startup());
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            CleanerError::from_status(StatusCode::UNAUTHORIZED, None, ""),
            CleanerError::AuthError(_)
        ));
        assert!(matches!(
            CleanerError::from_status(StatusCode::TOO_MANY_REQUESTS, Some(30), ""),
            CleanerError::RateLimitExceeded { retry_after: 30 }
        ));
        assert!(matches!(
            CleanerError::from_status(StatusCode::TOO_MANY_REQUESTS, None, ""),
            CleanerError::RateLimitExceeded { retry_after: 60 }
        ));
        assert!(matches!(
            CleanerError::from_status(StatusCode::BAD_GATEWAY, None, ""),
            CleanerError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            CleanerError::from_status(StatusCode::NOT_FOUND, None, ""),
            CleanerError::ApiError(_)
        ));
    }

    #[test]
    fn test_from_status_includes_body() {
        let body = "  {\"result\":false}\n";
        let error = CleanerError::from_status(StatusCode::BAD_REQUEST, None, body);
        assert_eq!(
            error.to_string(),
            "Raindrop API error: HTTP 400: {\"result\":false}"
        );
    }

    #[test]
    fn test_parse_retry_after_header() {
        let mut headers = hyper::header::HeaderMap::new();
        assert_eq!(parse_retry_after_header(&headers), None);

        headers.insert(
            hyper::header::RETRY_AFTER,
            hyper::header::HeaderValue::from_static("120"),
        );
        assert_eq!(parse_retry_after_header(&headers), Some(120));

        headers.insert(
            hyper::header::RETRY_AFTER,
            hyper::header::HeaderValue::from_static("invalid"),
        );
        assert_eq!(parse_retry_after_header(&headers), None);
    }

    #[test]
    fn test_error_display() {
        let error = CleanerError::RateLimitExceeded { retry_after: 10 };
        let display = format!("{}", error);
        assert!(display.contains("Rate limit exceeded"));
        assert!(display.contains("10 seconds"));

        let error = CleanerError::RedirectTimeout(300);
        assert!(error.to_string().contains("300 seconds"));
    }
}
