//! Error types for influxdb2-client.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Error type for influxdb2-client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("InfluxDB returned {status}: {message}")]
    Server {
        /// HTTP status code from the response.
        status: StatusCode,
        /// Message extracted from the response body or headers.
        message: String,
        /// Value of the `Retry-After` header, if the server sent one.
        retry_after: Option<Duration>,
    },

    /// A point or request was rejected before anything was sent.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Failed to serialize a request body to JSON.
    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read CSV data from the response stream.
    #[error("CSV parse error: {0}")]
    Csv(String),

    /// A cell could not be converted to its annotated data type.
    #[error("Failed to parse value (line {line}): {message}")]
    Parse {
        /// Description of what failed to parse.
        message: String,
        /// 1-based line in the CSV response.
        line: u64,
    },

    /// Unknown data type in an annotated CSV `#datatype` row.
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// Missing required annotation in CSV.
    #[error("Missing annotation: {0}")]
    MissingAnnotation(String),

    /// Row has a different number of columns than the header declared.
    #[error("Column count mismatch (line {line}): expected {expected}, got {actual}")]
    ColumnMismatch {
        /// Expected number of columns.
        expected: usize,
        /// Actual number of columns found.
        actual: usize,
        /// 1-based line in the CSV response.
        line: u64,
    },

    /// The query result stream carried an inline error table.
    #[error("Query error from InfluxDB: {message}")]
    Query {
        /// Error message returned by InfluxDB.
        message: String,
        /// Optional reference code for debugging.
        reference: Option<String>,
    },

    /// The background write pipeline is no longer accepting work.
    #[error("write pipeline is shut down")]
    Shutdown,

    /// I/O error during streaming.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a failed write may succeed on a later attempt.
    ///
    /// Covers transport failures at any phase (connecting, timeouts, a
    /// connection dropped mid-request or while reading the body) plus `429`
    /// and all `5xx` responses. Other client errors (`400`, `401`, `404`,
    /// `413`, ...) indicate a request the server will never accept.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.is_body()
                    || (e.is_request() && !e.is_builder())
            }
            Error::Server { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }

    /// The server-requested minimum delay before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Server { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Builds a [`Error::Server`] from a non-success response.
    ///
    /// The message is taken from the JSON body's `message` field when
    /// present, then the raw body, then the platform error headers, and
    /// finally the status line reason.
    pub(crate) async fn from_response(response: reqwest::Response) -> Error {
        #[derive(Deserialize)]
        struct ErrorBody {
            message: String,
        }

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let header_message = [
            "x-platform-error-code",
            "x-influx-error",
            "x-influxdb-error",
        ]
        .iter()
        .find_map(|name| {
            response
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        });
        let body = response.text().await.unwrap_or_default();

        let message = if body.is_empty() {
            header_message
        } else {
            serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .ok()
                .or(Some(body))
        }
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_owned()
        });

        Error::Server {
            status,
            message,
            retry_after,
        }
    }
}

/// Parses a `Retry-After` header value: either delta-seconds or an
/// HTTP-date. A date already in the past means "retry now" and yields no
/// floor at all.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    (when.with_timezone(&chrono::Utc) - chrono::Utc::now())
        .to_std()
        .ok()
}

/// Result type alias for influxdb2-client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_retryable_by_status() {
        let server = |status| Error::Server {
            status,
            message: String::new(),
            retry_after: None,
        };
        assert!(server(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(server(StatusCode::INTERNAL_SERVER_ERROR).is_retryable());
        assert!(server(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(!server(StatusCode::BAD_REQUEST).is_retryable());
        assert!(!server(StatusCode::UNAUTHORIZED).is_retryable());
        assert!(!server(StatusCode::PAYLOAD_TOO_LARGE).is_retryable());
    }

    #[test]
    fn test_non_transport_errors_never_retryable() {
        assert!(!Error::Validation("bad point".into()).is_retryable());
        assert!(
            !Error::Query {
                message: "boom".into(),
                reference: None,
            }
            .is_retryable()
        );
        assert!(!Error::Shutdown.is_retryable());
    }

    #[test]
    fn test_retry_after_header_forms() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));

        let future = (chrono::Utc::now() + chrono::Duration::seconds(60)).to_rfc2822();
        let parsed = parse_retry_after(&future).unwrap();
        assert!(parsed > Duration::from_secs(55), "parsed {:?}", parsed);
        assert!(parsed <= Duration::from_secs(60), "parsed {:?}", parsed);

        // A date already in the past means "retry now": no floor.
        let past = (chrono::Utc::now() - chrono::Duration::seconds(60)).to_rfc2822();
        assert_eq!(parse_retry_after(&past), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_retry_after_only_on_server_errors() {
        let err = Error::Server {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(Error::Shutdown.retry_after(), None);
    }
}
