// Controller HTTP client
//
// Wraps `reqwest::Client` with UniFi-specific URL construction, envelope
// unwrapping, session handling, and the retry policy. Endpoint helpers
// (REST CRUD) are implemented as inherent methods in `rest.rs` to keep this
// module focused on transport mechanics.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{ControllerPlatform, Credentials};
use crate::error::Error;
use crate::models::LegacyResponse;
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionManager};
use crate::transport::TransportConfig;

/// UniFi OS wraps some errors as `{"error":{"code":N,"message":"..."}}` with HTTP 200.
#[derive(serde::Deserialize)]
struct UnifiOsError {
    error: Option<UnifiOsErrorInner>,
}

#[derive(serde::Deserialize)]
struct UnifiOsErrorInner {
    code: u16,
    message: Option<String>,
}

/// Per-call knobs for [`ControllerClient::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Per-attempt timeout. Falls back to the transport timeout.
    pub timeout: Option<Duration>,
    /// Makes a `POST` safe to resend after ambiguous failures.
    pub idempotency_key: Option<String>,
    /// Checked at every retry checkpoint.
    pub cancel: CancellationToken,
}

impl RequestOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// HTTP client for one controller site.
///
/// Owns the session for `(controller, site)`. The client is `Send + Sync`
/// and meant to be shared behind an `Arc`: requests run concurrently,
/// session refresh is serialized internally.
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: Url,
    site: String,
    platform: ControllerPlatform,
    credentials: Credentials,
    session: SessionManager,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ControllerClient {
    /// `base_url` is the controller root (e.g. `https://192.168.1.1` for
    /// UniFi OS or `https://controller:8443` for standalone).
    pub fn new(
        base_url: Url,
        site: impl Into<String>,
        platform: ControllerPlatform,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.client_for(&credentials)?;

        Ok(Self {
            http,
            base_url,
            site: site.into(),
            platform,
            credentials,
            session: SessionManager::new(),
            retry: RetryPolicy::default(),
            timeout: transport.timeout,
        })
    }

    /// Replace the retry policy (default: 5 attempts, 500ms base, x2, full jitter).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// The current site identifier.
    pub fn site(&self) -> &str {
        &self.site
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The controller platform this client talks to.
    pub fn platform(&self) -> ControllerPlatform {
        self.platform
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The active session, if one has been established.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.current()
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Establish a fresh session, replacing any existing one.
    ///
    /// Session credentials log in (`POST /api/auth/login` on UniFi OS,
    /// `POST /api/login` on standalone); API keys need no round trip.
    pub async fn authenticate(&self) -> Result<Arc<Session>, Error> {
        self.session.refresh(None, || self.login()).await
    }

    /// End the current session.
    pub async fn logout(&self) -> Result<(), Error> {
        let Some(session) = self.session.current() else {
            return Ok(());
        };
        if self.credentials.needs_login() {
            let url = self.base_url.join(self.platform.logout_path())?;
            debug!("logging out at {}", url);
            let mut builder = self.http.post(url);
            if let Some(token) = session.csrf_token() {
                builder = builder.header("X-CSRF-Token", token);
            }
            builder.send().await?;
        }
        self.session.invalidate(session.generation());
        debug!("logout complete");
        Ok(())
    }

    async fn ensure_session(&self) -> Result<Arc<Session>, Error> {
        match self.session.current() {
            Some(session) => Ok(session),
            None => self.session.refresh(Some(0), || self.login()).await,
        }
    }

    async fn login(&self) -> Result<Session, Error> {
        let Credentials::Session { username, password } = &self.credentials else {
            return Ok(Session::new(None));
        };

        let url = self.base_url.join(self.platform.login_path())?;
        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });

        let cancel = CancellationToken::new();
        self.retry
            .run(
                &cancel,
                |attempt| {
                    let url = url.clone();
                    let body = &body;
                    async move {
                        debug!(attempt, "logging in at {}", url);
                        let resp = self
                            .http
                            .post(url)
                            .json(body)
                            .send()
                            .await
                            .map_err(Error::Transport)?;

                        let status = resp.status();
                        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                            return Err(Self::status_error(status, resp).await);
                        }
                        if !status.is_success() {
                            let text = resp.text().await.unwrap_or_default();
                            return Err(Error::Authentication {
                                message: format!("login failed (HTTP {status}): {}", preview(&text)),
                            });
                        }

                        let csrf = resp
                            .headers()
                            .get("X-CSRF-Token")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        debug!("login successful");
                        Ok(Session::new(csrf))
                    }
                },
                Error::is_transient,
            )
            .await
            .map_err(|e| match e {
                Error::RetriesExhausted { .. } => Error::Authentication {
                    message: format!("controller unreachable during login: {e}"),
                },
                other => other,
            })
    }

    /// Auto-detect the controller platform by probing login endpoints.
    ///
    /// UniFi OS answers (even 401/405) at `/api/auth/login`; standalone
    /// controllers 404 there and answer at `/api/login` instead.
    pub async fn detect_platform(
        base_url: &Url,
        transport: &TransportConfig,
    ) -> Result<ControllerPlatform, Error> {
        let http = transport.probe_client()?;

        let unifi_os_url = base_url.join("/api/auth/login")?;
        debug!("probing UniFi OS at {}", unifi_os_url);

        if let Ok(resp) = http.get(unifi_os_url).send().await {
            if resp.status() != reqwest::StatusCode::NOT_FOUND {
                debug!("detected UniFi OS platform");
                return Ok(ControllerPlatform::UnifiOs);
            }
        }

        let standalone_url = base_url.join("/api/login")?;
        debug!("probing standalone at {}", standalone_url);

        http.get(standalone_url).send().await?;
        debug!("detected standalone (classic) controller");
        Ok(ControllerPlatform::ClassicController)
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a site-scoped URL: `{base}{prefix}/api/s/{site}/{path}`
    pub(crate) fn site_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let prefix = self.platform.legacy_prefix().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}{prefix}/api/s/{}/{path}", self.site))?)
    }

    // ── Request pipeline ─────────────────────────────────────────────

    /// Issue one logical call against a site-scoped path.
    ///
    /// Transient failures are retried per the retry policy; a `POST`
    /// without an idempotency key is only resent when the controller
    /// signals the request was not applied. A rejected session is
    /// invalidated and re-established once, then the call is retried once;
    /// a second rejection surfaces as [`Error::Authentication`].
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let url = self.site_url(path)?;
        let idempotent = is_idempotent(&method) || options.idempotency_key.is_some();
        let retryable = |e: &Error| e.is_transient() && (idempotent || e.is_not_applied());
        let mut reauthenticated = false;

        loop {
            let session = self.ensure_session().await?;

            let result = self
                .retry
                .run(
                    &options.cancel,
                    |attempt| self.send_once(&method, &url, body, options, attempt),
                    retryable,
                )
                .await;

            match result {
                Err(e) if e.is_auth_expired() && !reauthenticated => {
                    warn!(%url, "session rejected, re-authenticating");
                    self.session.invalidate(session.generation());
                    self.session
                        .refresh(Some(session.generation()), || self.login())
                        .await?;
                    reauthenticated = true;
                }
                Err(Error::SessionRejected { status }) => {
                    return Err(Error::Authentication {
                        message: format!("controller rejected refreshed session (HTTP {status})"),
                    });
                }
                other => return other,
            }
        }
    }

    async fn send_once<T, B>(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&B>,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        debug!(attempt, "{method} {url}");
        let timeout = options.timeout.unwrap_or(self.timeout);

        let mut builder = self.http.request(method.clone(), url.clone()).timeout(timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if *method != Method::GET {
            if let Some(token) = self.session.current().as_deref().and_then(Session::csrf_token) {
                builder = builder.header("X-CSRF-Token", token);
            }
        }
        if let Some(key) = &options.idempotency_key {
            builder = builder.header("Idempotency-Key", key.as_str());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout { timeout }
            } else {
                Error::Transport(e)
            }
        })?;

        self.parse_envelope(resp).await
    }

    async fn status_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Error::RateLimited { retry_after_secs };
        }
        let text = resp.text().await.unwrap_or_default();
        Error::Http {
            status: status.as_u16(),
            message: preview(&text).to_owned(),
        }
    }

    /// Parse the `{ meta, data }` envelope, returning `data` on success.
    ///
    /// Also handles UniFi OS error responses that use a different shape:
    /// `{"error": {"code": 401, "message": "..."}}` (returned with HTTP 200).
    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<Vec<T>, Error> {
        let status = resp.status();

        if let Some(token) = resp
            .headers()
            .get("X-Updated-CSRF-Token")
            .and_then(|v| v.to_str().ok())
        {
            self.session.rotate_csrf(token);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::SessionRejected {
                status: status.as_u16(),
            });
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Self::status_error(status, resp).await);
        }

        let body = resp.text().await?;

        if !status.is_success() {
            // Client errors usually still carry the legacy envelope with a
            // readable `msg` and the offending field.
            return Err(
                match serde_json::from_str::<LegacyResponse<serde_json::Value>>(&body) {
                    Ok(envelope) => Error::LegacyApi {
                        message: envelope
                            .meta
                            .msg
                            .unwrap_or_else(|| format!("HTTP {status}")),
                        field: envelope.meta.validation_error.and_then(|v| v.field),
                        status: status.as_u16(),
                    },
                    Err(_) => Error::Http {
                        status: status.as_u16(),
                        message: preview(&body).to_owned(),
                    },
                },
            );
        }

        if let Ok(wrapper) = serde_json::from_str::<UnifiOsError>(&body) {
            if let Some(err) = wrapper.error {
                let message = err.message.unwrap_or_default();
                return Err(if err.code == 401 || err.code == 403 {
                    Error::SessionRejected { status: err.code }
                } else {
                    Error::LegacyApi {
                        message: format!("UniFi OS error {}: {message}", err.code),
                        field: None,
                        status: err.code,
                    }
                });
            }
        }

        let envelope: LegacyResponse<T> = serde_json::from_str(&body).map_err(|e| {
            Error::Deserialization {
                message: format!("{e} (body preview: {:?})", preview(&body)),
                body: body.clone(),
            }
        })?;

        match envelope.meta.rc.as_str() {
            "ok" => Ok(envelope.data),
            _ => Err(Error::LegacyApi {
                message: envelope
                    .meta
                    .msg
                    .unwrap_or_else(|| format!("rc={}", envelope.meta.rc)),
                field: envelope.meta.validation_error.and_then(|v| v.field),
                status: status.as_u16(),
            }),
        }
    }
}

fn is_idempotent(method: &Method) -> bool {
    *method != Method::POST && *method != Method::PATCH
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
