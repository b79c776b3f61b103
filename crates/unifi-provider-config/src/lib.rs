//! Provider configuration for the UniFi reconciliation driver.
//!
//! TOML profiles layered under `UNIFI_` environment overrides, credential
//! resolution (env + plaintext), and translation to
//! `unifi_provider_core::ControllerConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use unifi_provider_api::{ControllerPlatform, RetryPolicy};
use unifi_provider_core::{
    AuthCredentials, ControllerConfig, PlatformHint, ReconcileSettings, TlsVerification,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Settings applied to every profile unless it overrides them.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
            max_concurrency: default_max_concurrency(),
            retry: RetrySettings::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_concurrency() -> usize {
    4
}

/// Backoff tuning, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

/// A named controller profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Controller base URL (e.g., "https://192.168.1.1").
    pub controller: String,

    #[serde(default = "default_site")]
    pub site: String,

    /// "api_key" or "session".
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,

    /// "auto", "unifi_os" or "classic".
    #[serde(default = "default_platform")]
    pub platform: String,

    /// API key (plaintext; prefer `api_key_env`).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    pub username: Option<String>,

    /// Password (plaintext; prefer `UNIFI_PASSWORD`).
    pub password: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,
    pub timeout: Option<u64>,
    pub max_concurrency: Option<usize>,
}

fn default_site() -> String {
    "default".into()
}
fn default_auth_mode() -> String {
    "api_key".into()
}
fn default_platform() -> String {
    "auto".into()
}

impl Config {
    /// Pick the named profile, or the default one.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|profile| (name.clone(), profile))
            .ok_or(ConfigError::UnknownProfile { name })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "unifi-provider", "unifi-provider").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("unifi-provider");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` plus environment. A missing file yields the defaults.
///
/// Environment keys nest on `__`, e.g.
/// `UNIFI_PROFILES__HOME__SITE=lab` or `UNIFI_DEFAULTS__MAX_CONCURRENCY=8`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("UNIFI_").split("__"));

    Ok(figment.extract()?)
}

// ── Credential resolution ───────────────────────────────────────────

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Resolve an API key: the profile's `api_key_env` variable, then plaintext.
pub fn resolve_api_key(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    if let Some(val) = profile.api_key_env.as_deref().and_then(env) {
        return Ok(SecretString::from(val));
    }
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }
    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve username + password. `UNIFI_USERNAME` fills a missing username;
/// `UNIFI_PASSWORD` wins over a plaintext password.
pub fn resolve_session_credentials(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(String, SecretString), ConfigError> {
    let missing = || ConfigError::NoCredentials {
        profile: profile_name.into(),
    };
    let username = profile
        .username
        .clone()
        .or_else(|| env("UNIFI_USERNAME"))
        .ok_or_else(missing)?;
    let password = env("UNIFI_PASSWORD")
        .or_else(|| profile.password.clone())
        .ok_or_else(missing)?;
    Ok((username, SecretString::from(password)))
}

/// Resolve `AuthCredentials` from a profile's `auth_mode` field.
pub fn resolve_auth(profile: &Profile, profile_name: &str) -> Result<AuthCredentials, ConfigError> {
    resolve_auth_with(profile, profile_name, env_var)
}

fn resolve_auth_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AuthCredentials, ConfigError> {
    match profile.auth_mode.as_str() {
        "api_key" => Ok(AuthCredentials::ApiKey(resolve_api_key(
            profile,
            profile_name,
            env,
        )?)),
        "session" => {
            let (username, password) = resolve_session_credentials(profile, profile_name, env)?;
            Ok(AuthCredentials::Credentials { username, password })
        }
        other => Err(ConfigError::Validation {
            field: "auth_mode".into(),
            reason: format!("expected 'api_key' or 'session', got '{other}'"),
        }),
    }
}

fn parse_platform(value: &str) -> Result<PlatformHint, ConfigError> {
    match value {
        "auto" => Ok(PlatformHint::Auto),
        "unifi_os" => Ok(PlatformHint::Known(ControllerPlatform::UnifiOs)),
        "classic" => Ok(PlatformHint::Known(ControllerPlatform::ClassicController)),
        other => Err(ConfigError::Validation {
            field: "platform".into(),
            reason: format!("expected 'auto', 'unifi_os', or 'classic', got '{other}'"),
        }),
    }
}

/// Build a `ControllerConfig` from a profile and the global defaults.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    build_controller_config(profile, profile_name, defaults, env_var)
}

fn build_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ControllerConfig, ConfigError> {
    let url: url::Url = profile
        .controller
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "controller".into(),
            reason: format!("invalid URL: {}", profile.controller),
        })?;

    let auth = resolve_auth_with(profile, profile_name, env)?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::DangerAcceptInvalid // local controllers typically self-signed
    };

    let settings = ReconcileSettings {
        max_concurrency: profile
            .max_concurrency
            .unwrap_or(defaults.max_concurrency)
            .max(1),
        request_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        retry: defaults.retry.to_policy(),
    };

    Ok(ControllerConfig {
        url,
        auth,
        site: profile.site.clone(),
        platform: parse_platform(&profile.platform)?,
        tls,
        settings,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn profile(toml_src: &str) -> Profile {
        toml::from_str(toml_src).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn file_profiles_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_profile = "home"

[defaults]
max_concurrency = 8

[defaults.retry]
max_attempts = 3

[profiles.home]
controller = "https://192.168.1.1"
api_key = "k"
"#
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.defaults.max_concurrency, 8);
        assert_eq!(config.defaults.timeout, 30);
        assert_eq!(config.defaults.retry.max_attempts, 3);
        assert_eq!(config.defaults.retry.base_delay_ms, 500);

        let (name, home) = config.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(home.site, "default");
        assert_eq!(home.auth_mode, "api_key");
        assert!(matches!(
            config.profile(Some("lab")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn api_key_env_wins_over_plaintext() {
        let p = profile(
            r#"
controller = "https://10.0.0.1"
api_key = "plain"
api_key_env = "HOME_KEY"
"#,
        );
        let env = |name: &str| (name == "HOME_KEY").then(|| "from-env".to_owned());
        let key = resolve_api_key(&p, "home", env).unwrap();
        assert_eq!(key.expose_secret(), "from-env");

        let key = resolve_api_key(&p, "home", no_env).unwrap();
        assert_eq!(key.expose_secret(), "plain");
    }

    #[test]
    fn session_credentials_need_a_username_and_password() {
        let p = profile(
            r#"
controller = "https://10.0.0.1"
auth_mode = "session"
username = "admin"
"#,
        );
        assert!(matches!(
            resolve_session_credentials(&p, "home", no_env),
            Err(ConfigError::NoCredentials { .. })
        ));

        let env = |name: &str| (name == "UNIFI_PASSWORD").then(|| "hunter2".to_owned());
        let (user, pass) = resolve_session_credentials(&p, "home", env).unwrap();
        assert_eq!(user, "admin");
        assert_eq!(pass.expose_secret(), "hunter2");
    }

    #[test]
    fn profile_translates_to_controller_config() {
        let p = profile(
            r#"
controller = "https://unifi.lan:8443"
site = "lab"
platform = "classic"
api_key = "k"
timeout = 5
max_concurrency = 2
"#,
        );
        let config = build_controller_config(&p, "lab", &Defaults::default(), no_env).unwrap();
        assert_eq!(config.url.as_str(), "https://unifi.lan:8443/");
        assert_eq!(config.site, "lab");
        assert_eq!(
            config.platform,
            PlatformHint::Known(ControllerPlatform::ClassicController)
        );
        assert_eq!(config.settings.max_concurrency, 2);
        assert_eq!(config.settings.request_timeout, Duration::from_secs(5));
        assert_eq!(config.settings.retry.max_attempts, 5);
        assert!(matches!(config.auth, AuthCredentials::ApiKey(_)));
    }

    #[test]
    fn bad_values_are_rejected() {
        let bad_url = profile("controller = \"not a url\"\napi_key = \"k\"");
        assert!(matches!(
            build_controller_config(&bad_url, "x", &Defaults::default(), no_env),
            Err(ConfigError::Validation { field, .. }) if field == "controller"
        ));

        let bad_mode = profile("controller = \"https://a\"\nauth_mode = \"hybrid\"");
        assert!(matches!(
            resolve_auth_with(&bad_mode, "x", no_env),
            Err(ConfigError::Validation { field, .. }) if field == "auth_mode"
        ));

        assert!(parse_platform("cloud").is_err());
    }
}
