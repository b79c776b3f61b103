// ── Core error types ──
//
// Reconciliation-facing errors. Consumers never see HTTP plumbing directly:
// the `From<unifi_provider_api::Error>` impl folds transport-layer failures
// into the taxonomy the driver reports per instance.

use thiserror::Error;

use crate::model::InstanceAddress;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum ReconcileError {
    // ── Session ──────────────────────────────────────────────────────
    /// Session establishment or refresh failed. Fatal for the run.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ── Transport ────────────────────────────────────────────────────
    /// Network failure or timeout that outlived the retry budget.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// Attempts made before giving up (1 when the error was not retried).
        attempts: u32,
    },

    // ── Controller ───────────────────────────────────────────────────
    /// The controller rejected the request (validation, conflict, ...).
    #[error("Controller rejected request: {message}")]
    Api {
        message: String,
        /// Offending attribute, when the controller names one.
        attribute: Option<String>,
        status: Option<u16>,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Unknown resource kind: {name}")]
    UnknownKind { name: String },

    #[error("Invalid configuration for {address}: {message}")]
    Validation {
        address: InstanceAddress,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Per-instance outcomes ────────────────────────────────────────
    /// A replace removed the old object but could not create the new one.
    /// The instance no longer exists on the controller.
    #[error("{address} is now absent: deleted {deleted_id} but create failed: {source}")]
    PartialFailure {
        address: InstanceAddress,
        deleted_id: String,
        #[source]
        source: Box<ReconcileError>,
    },

    /// Skipped because an instance it depends on did not apply.
    #[error("{address} skipped: dependency {dependency} failed")]
    DependencyFailed {
        address: InstanceAddress,
        dependency: InstanceAddress,
    },

    #[error("Reconciliation cancelled")]
    Cancelled,

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    /// Whether this error ends the whole run rather than one instance.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::UnknownKind { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<unifi_provider_api::Error> for ReconcileError {
    fn from(err: unifi_provider_api::Error) -> Self {
        use unifi_provider_api::Error as ApiError;

        let attempts = match &err {
            ApiError::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        };
        let err = match err {
            ApiError::RetriesExhausted { last, .. } => *last,
            other => other,
        };

        match err {
            ApiError::Authentication { message } => ReconcileError::Auth { message },
            ApiError::SessionRejected { status } => ReconcileError::Auth {
                message: format!("session rejected (HTTP {status})"),
            },
            ApiError::Cancelled => ReconcileError::Cancelled,
            ApiError::LegacyApi {
                message,
                field,
                status,
            } => ReconcileError::Api {
                message,
                attribute: field,
                status: Some(status),
            },
            ApiError::Http { status, message } if status < 500 => ReconcileError::Api {
                message,
                attribute: None,
                status: Some(status),
            },
            ApiError::InvalidUrl(e) => ReconcileError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(message) => ReconcileError::Config {
                message: format!("TLS setup failed: {message}"),
            },
            ApiError::Deserialization { message, body: _ } => {
                ReconcileError::Internal(format!("Deserialization error: {message}"))
            }
            other @ (ApiError::Transport(_)
            | ApiError::Timeout { .. }
            | ApiError::RateLimited { .. }
            | ApiError::Http { .. }
            | ApiError::RetriesExhausted { .. }) => ReconcileError::Transport {
                message: other.to_string(),
                attempts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use unifi_provider_api::Error as ApiError;

    use super::*;

    #[test]
    fn exhausted_retries_become_transport_errors() {
        let err = ReconcileError::from(ApiError::RetriesExhausted {
            attempts: 5,
            last: Box::new(ApiError::Http {
                status: 502,
                message: "bad gateway".into(),
            }),
        });
        match err {
            ReconcileError::Transport { attempts, message } => {
                assert_eq!(attempts, 5);
                assert!(message.contains("502"));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejections_keep_the_attribute() {
        let err = ReconcileError::from(ApiError::LegacyApi {
            message: "api.err.InvalidVlanId".into(),
            field: Some("vlan".into()),
            status: 400,
        });
        match err {
            ReconcileError::Api {
                attribute, status, ..
            } => {
                assert_eq!(attribute.as_deref(), Some("vlan"));
                assert_eq!(status, Some(400));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn refresh_failure_is_fatal() {
        let err = ReconcileError::from(ApiError::Authentication {
            message: "bad password".into(),
        });
        assert!(err.is_fatal());
        assert!(!ReconcileError::Cancelled.is_fatal());
    }
}
