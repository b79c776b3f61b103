// ── Controller handle ──
//
// Owns the API client for one controller site and speaks `WireBody` on top
// of its REST helpers. Shared behind an `Arc` by every worker task of a
// reconciliation run.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unifi_provider_api::{
    ControllerClient, Credentials, Error as ApiError, RequestOptions, TlsMode, TransportConfig,
};

use crate::config::{AuthCredentials, ControllerConfig, PlatformHint, TlsVerification};
use crate::error::ReconcileError;
use crate::model::{ResourceKind, SiteRef};
use crate::wire::WireBody;

pub struct Controller {
    client: ControllerClient,
    site: SiteRef,
    request_timeout: Duration,
}

impl Controller {
    /// Build a client from `config`, detect the platform if needed, and
    /// establish the session.
    pub async fn connect(config: &ControllerConfig) -> Result<Self, ReconcileError> {
        let transport = build_transport(config);

        let platform = match config.platform {
            PlatformHint::Known(platform) => platform,
            PlatformHint::Auto => ControllerClient::detect_platform(&config.url, &transport).await?,
        };
        debug!(?platform, "controller platform");

        let client = ControllerClient::new(
            config.url.clone(),
            config.site.clone(),
            platform,
            credentials(&config.auth),
            &transport,
        )?
        .with_retry_policy(config.settings.retry.clone());

        client.authenticate().await?;
        info!(url = %config.url, site = %config.site, "connected to controller");

        Ok(Self::from_client(client).with_request_timeout(config.settings.request_timeout))
    }

    /// Wrap an already configured client.
    pub fn from_client(client: ControllerClient) -> Self {
        let site = SiteRef {
            controller: client.base_url().as_str().trim_end_matches('/').to_owned(),
            site: client.site().to_owned(),
        };
        Self {
            client,
            site,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn client(&self) -> &ControllerClient {
        &self.client
    }

    pub fn site(&self) -> &SiteRef {
        &self.site
    }

    pub async fn disconnect(&self) -> Result<(), ReconcileError> {
        self.client.logout().await?;
        Ok(())
    }

    fn options(&self, cancel: &CancellationToken) -> RequestOptions {
        RequestOptions::with_cancel(cancel.clone()).timeout(self.request_timeout)
    }

    // ── Resource calls ───────────────────────────────────────────────

    pub async fn read(
        &self,
        kind: ResourceKind,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<WireBody>, ApiError> {
        let object: Option<Value> = self
            .client
            .get(kind.endpoint(), id, &self.options(cancel))
            .await?;
        object.map(|value| decode(kind, value)).transpose()
    }

    /// Find an object by the value of one of its attributes.
    ///
    /// Used to re-discover objects whose id was never recorded. String
    /// values compare case-insensitively (MAC addresses come back lowercase).
    pub async fn find(
        &self,
        kind: ResourceKind,
        attribute: &str,
        wanted: &Value,
        cancel: &CancellationToken,
    ) -> Result<Option<WireBody>, ApiError> {
        let objects: Vec<Value> = self.client.list(kind.endpoint(), &self.options(cancel)).await?;

        let mut matches = objects
            .into_iter()
            .filter(|object| object.get(attribute).is_some_and(|v| same_identity(v, wanted)));
        let Some(found) = matches.next() else {
            return Ok(None);
        };
        if matches.next().is_some() {
            warn!(%kind, attribute, %wanted, "several objects share this identity, using the first");
        }
        decode(kind, found).map(Some)
    }

    pub async fn create(
        &self,
        body: &WireBody,
        cancel: &CancellationToken,
    ) -> Result<WireBody, ApiError> {
        let kind = body.kind();
        let created: Value = self
            .client
            .create(kind.endpoint(), body, &self.options(cancel))
            .await?;
        decode(kind, created)
    }

    pub async fn update(
        &self,
        id: &str,
        body: &WireBody,
        cancel: &CancellationToken,
    ) -> Result<WireBody, ApiError> {
        let kind = body.kind();
        let updated: Value = self
            .client
            .update(kind.endpoint(), id, body, &self.options(cancel))
            .await?;
        decode(kind, updated)
    }

    pub async fn delete(
        &self,
        kind: ResourceKind,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        self.client
            .delete(kind.endpoint(), id, &self.options(cancel))
            .await
    }
}

fn decode(kind: ResourceKind, value: Value) -> Result<WireBody, ApiError> {
    let body = value.to_string();
    WireBody::from_value(kind, value).map_err(|e| ApiError::Deserialization {
        message: format!("{kind}: {e}"),
        body,
    })
}

fn same_identity(found: &Value, wanted: &Value) -> bool {
    match (found, wanted) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        _ => found == wanted,
    }
}

fn credentials(auth: &AuthCredentials) -> Credentials {
    match auth {
        AuthCredentials::ApiKey(key) => Credentials::ApiKey { key: key.clone() },
        AuthCredentials::Credentials { username, password } => Credentials::Session {
            username: username.clone(),
            password: password.clone(),
        },
    }
}

fn build_transport(config: &ControllerConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.settings.request_timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn identity_strings_ignore_case() {
        assert!(same_identity(&json!("AA:BB:CC:00:11:22"), &json!("aa:bb:cc:00:11:22")));
        assert!(!same_identity(&json!("guest"), &json!("iot")));
        assert!(same_identity(&json!(10), &json!(10)));
    }
}
