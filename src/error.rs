//! Defines the app level error type and its conversion to JSON error responses.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The request to the remote store could not be completed.
    ///
    /// `transient` is set for failures that may succeed if retried, such as
    /// connection errors and timeouts.
    #[error("could not reach the movement store: {message}")]
    StoreRequest {
        /// The underlying transport error.
        message: String,
        /// Whether retrying the request may succeed.
        transient: bool,
    },

    /// The remote store answered with a non-success HTTP status.
    #[error("the movement store responded with HTTP {status}: {body}")]
    StoreStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body, useful for debugging query errors.
        body: String,
    },

    /// The remote store's response body was not the expected JSON.
    #[error("could not decode the movement store response: {0}")]
    StoreDecode(String),

    /// A date string could not be parsed as a `YYYY-MM-DD` calendar date.
    #[error("invalid date \"{text}\": {reason}")]
    InvalidDate {
        /// The text that failed to parse.
        text: String,
        /// Why parsing failed.
        reason: String,
    },

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezone(String),

    /// The persisted filter state could not be read or written.
    #[error("could not persist the filter selection: {0}")]
    FilterPersistence(String),

    /// The client sent a filter selection that does not make sense, e.g. a
    /// start date after the end date.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl Error {
    /// Whether the operation that produced this error may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::StoreRequest { transient, .. } => *transient,
            Error::StoreStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::StoreRequest { .. } | Error::StoreStatus { .. } | Error::StoreDecode(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::InvalidDate { .. } | Error::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTimezone(_) | Error::FilterPersistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Error::StoreDecode(error.to_string());
        }

        Error::StoreRequest {
            transient: error.is_timeout() || error.is_connect(),
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::FilterPersistence(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FilterPersistence(error.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let message = match &self {
            Error::InvalidDate { .. } | Error::InvalidFilter(_) => self.to_string(),
            Error::StoreRequest { .. } | Error::StoreStatus { .. } | Error::StoreDecode(_) => {
                tracing::error!("movement store error: {self}");
                "Could not load movements from the store, check the server logs for more details."
                    .to_owned()
            }
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {error}");
                "An unexpected error occurred, check the server logs for more details.".to_owned()
            }
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::Error;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        let status = |status| Error::StoreStatus {
            status,
            body: String::new(),
        };

        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
    }

    #[test]
    fn only_flagged_request_errors_are_transient() {
        let transient = Error::StoreRequest {
            message: "timed out".to_owned(),
            transient: true,
        };
        let permanent = Error::StoreRequest {
            message: "bad url".to_owned(),
            transient: false,
        };

        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert!(!Error::StoreDecode("eof".to_owned()).is_transient());
    }

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(
            Error::StoreDecode("eof".to_owned()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::InvalidFilter("start after end".to_owned())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::FilterPersistence("disk full".to_owned())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
