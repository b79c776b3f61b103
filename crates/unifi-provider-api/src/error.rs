use std::time::Duration;

use thiserror::Error;

/// Legacy `meta.msg` codes meaning the referenced object does not exist.
const NOT_FOUND_CODES: &[&str] = &["api.err.IdInvalid", "api.err.NotFound", "api.err.ObjectNotFound"];

/// Top-level error type for the `unifi-provider-api` crate.
///
/// Covers every failure mode of the controller client: session
/// establishment, transport, retry exhaustion, and controller rejections.
/// `unifi-provider-core` maps these into the reconciliation taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed, or the controller rejected a freshly refreshed session.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The controller answered 401/403 for the current session.
    /// Consumed by the client's single re-authentication step.
    #[error("Session rejected by controller (HTTP {status})")]
    SessionRejected { status: u16 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A single attempt exceeded the caller-supplied timeout.
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Throttled by the controller. Includes `Retry-After` when sent.
    #[error("Rate limited by controller")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Non-success HTTP status without a usable legacy envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Controller ──────────────────────────────────────────────────
    /// Error from the legacy API (`{meta: {rc: "error", msg, validationError}}`).
    #[error("Controller rejected request: {message}")]
    LegacyApi {
        message: String,
        /// Offending attribute reported in `meta.validationError.field`.
        field: Option<String>,
        status: u16,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Control flow ────────────────────────────────────────────────
    /// The caller's cancellation token fired at a retry checkpoint.
    #[error("Request cancelled")]
    Cancelled,

    /// Transient failures persisted through every allowed attempt.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },
}

impl Error {
    /// Returns `true` if the session was rejected and a re-login might help.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionRejected { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            // Connections dropped mid-request or mid-body. Bodies are read as
            // text, so a decode error can only come from a broken stream.
            Self::Transport(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the controller signalled that the request never
    /// took effect, so even a non-idempotent call may be resent.
    pub fn is_not_applied(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Http { status: 503, .. }
        )
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } | Self::LegacyApi { status: 404, .. } => true,
            Self::LegacyApi { message, .. } => NOT_FOUND_CODES.contains(&message.as_str()),
            _ => false,
        }
    }

    /// The underlying error once retry bookkeeping is stripped.
    pub fn root(&self) -> &Error {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Self::SessionRejected { status }
            | Self::Http { status, .. }
            | Self::LegacyApi { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http {
            status: 502,
            message: "bad gateway".into(),
        };
        assert!(err.is_transient());
        assert!(!err.is_not_applied());
    }

    #[tokio::test]
    async fn truncated_body_is_transient_but_not_known_unapplied() {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n{\"meta\"")
                .unwrap();
        });

        let resp = reqwest::get(format!("http://{addr}/api/s/default/rest/networkconf"))
            .await
            .unwrap();
        let err = Error::from(resp.text().await.unwrap_err());
        assert!(err.is_transient(), "{err}");
        assert!(!err.is_not_applied());
    }

    #[test]
    fn throttling_is_transient_and_not_applied() {
        let err = Error::RateLimited {
            retry_after_secs: Some(2),
        };
        assert!(err.is_transient());
        assert!(err.is_not_applied());
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn validation_rejection_is_permanent() {
        let err = Error::LegacyApi {
            message: "api.err.InvalidValue".into(),
            field: Some("vlan".into()),
            status: 400,
        };
        assert!(!err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn legacy_id_invalid_means_not_found() {
        let err = Error::LegacyApi {
            message: "api.err.IdInvalid".into(),
            field: None,
            status: 400,
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn root_unwraps_exhausted_retries() {
        let err = Error::RetriesExhausted {
            attempts: 5,
            last: Box::new(Error::Http {
                status: 500,
                message: "boom".into(),
            }),
        };
        assert!(matches!(err.root(), Error::Http { status: 500, .. }));
        assert_eq!(err.status(), Some(500));
    }
}
