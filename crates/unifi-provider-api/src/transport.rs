// HTTP stack shared by the controller client and platform probing.
//
// One `reqwest::Client` per controller connection. How it authenticates
// follows from the credentials: session logins keep cookies, API keys ride
// along as a sensitive default header.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use crate::auth::Credentials;
use crate::error::Error;

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    System,
    /// Trust the PEM certificate at this path in addition to system roots.
    CustomCa(PathBuf),
    /// Self-signed controllers.
    DangerAcceptInvalid,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Default per-attempt timeout; `RequestOptions` may override it.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Client for talking to a controller with `credentials`.
    pub fn client_for(&self, credentials: &Credentials) -> Result<reqwest::Client, Error> {
        let builder = self.builder()?;
        let builder = match credentials {
            Credentials::Session { .. } => builder.cookie_store(true),
            Credentials::ApiKey { key } => {
                let mut value = HeaderValue::from_str(key.expose_secret()).map_err(|e| {
                    Error::Authentication {
                        message: format!("API key is not a valid header value: {e}"),
                    }
                })?;
                value.set_sensitive(true);
                let mut headers = HeaderMap::new();
                headers.insert("X-API-KEY", value);
                builder.default_headers(headers)
            }
        };
        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Unauthenticated client, used to probe login endpoints.
    pub fn probe_client(&self) -> Result<reqwest::Client, Error> {
        self.builder()?
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    fn builder(&self) -> Result<reqwest::ClientBuilder, Error> {
        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("unifi-provider/", env!("CARGO_PKG_VERSION")));

        Ok(match &self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(path) => {
                let pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("cannot read CA certificate {}: {e}", path.display())))?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| Error::Tls(format!("invalid CA certificate {}: {e}", path.display())))?;
                builder.add_root_certificate(cert)
            }
            TlsMode::DangerAcceptInvalid => builder.danger_accept_invalid_certs(true),
        })
    }
}
