// ── Runtime connection configuration ──
//
// These types describe *how* to reach a controller and how hard to push it.
// They carry credential data and tuning, but never touch disk. The driver
// builds a `ControllerConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use unifi_provider_api::{ControllerPlatform, RetryPolicy};
use url::Url;

/// How to authenticate with a controller.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Local API key, sent on every request.
    ApiKey(SecretString),
    /// Cookie-based session login.
    Credentials {
        username: String,
        password: SecretString,
    },
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs). Default for local controllers.
    #[default]
    DangerAcceptInvalid,
}

/// Which login flow and URL prefix to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlatformHint {
    /// Probe the controller once at connect time.
    #[default]
    Auto,
    Known(ControllerPlatform),
}

/// Concurrency and retry tuning for a reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSettings {
    /// Instances applied at the same time.
    pub max_concurrency: usize,
    /// Per-attempt timeout for controller calls.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Configuration for one controller site.
///
/// Built by the driver, passed to `Controller::connect` -- core never reads
/// config files.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller URL (e.g., `https://192.168.1.1`).
    pub url: Url,
    pub auth: AuthCredentials,
    /// Site to operate on (defaults to "default").
    pub site: String,
    pub platform: PlatformHint,
    pub tls: TlsVerification,
    pub settings: ReconcileSettings,
}

impl ControllerConfig {
    pub fn new(url: Url, auth: AuthCredentials) -> Self {
        Self {
            url,
            auth,
            site: "default".into(),
            platform: PlatformHint::Auto,
            tls: TlsVerification::default(),
            settings: ReconcileSettings::default(),
        }
    }
}
