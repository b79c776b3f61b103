//! Command handlers and the connection plumbing they share.

pub mod apply;
pub mod plan;
pub mod refresh;
pub mod schema;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use unifi_provider_api::ControllerPlatform;
use unifi_provider_config::{Config, load_config, load_config_from, profile_to_controller_config};
use unifi_provider_core::{
    AuthCredentials, Controller, ControllerConfig, PlatformHint, ReconcileSettings, Reconciler,
    TlsVerification,
};

use crate::cli::{GlobalOpts, PlatformArg};
use crate::error::CliError;

/// Build a `ControllerConfig` from the config file, profile, and CLI overrides.
///
/// `--controller` bypasses profiles entirely and needs `--api-key`.
pub fn controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg: Config = match &global.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let mut config = if let Some(url_str) = global.controller.as_deref() {
        let url: url::Url = url_str.parse().map_err(|_| CliError::Validation {
            field: "controller".into(),
            reason: format!("invalid URL: {url_str}"),
        })?;
        let key = global.api_key.clone().ok_or_else(|| CliError::NoCredentials {
            profile: "(command line)".into(),
        })?;

        let mut config = ControllerConfig::new(url, AuthCredentials::ApiKey(SecretString::from(key)));
        config.tls = TlsVerification::SystemDefaults;
        config.settings = ReconcileSettings {
            max_concurrency: cfg.defaults.max_concurrency.max(1),
            request_timeout: Duration::from_secs(cfg.defaults.timeout),
            retry: cfg.defaults.retry.to_policy(),
        };
        config
    } else {
        let (name, profile) = cfg.profile(global.profile.as_deref())?;
        debug!(profile = %name, "using profile");
        let mut config = profile_to_controller_config(profile, &name, &cfg.defaults)?;
        if let Some(key) = &global.api_key {
            config.auth = AuthCredentials::ApiKey(SecretString::from(key.clone()));
        }
        config
    };

    // Flag overrides
    if let Some(site) = &global.site {
        config.site.clone_from(site);
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(parallelism) = global.parallelism {
        config.settings.max_concurrency = parallelism.max(1);
    }
    if let Some(platform) = global.platform {
        config.platform = PlatformHint::Known(match platform {
            PlatformArg::UnifiOs => ControllerPlatform::UnifiOs,
            PlatformArg::Classic => ControllerPlatform::ClassicController,
        });
    }
    Ok(config)
}

/// Connect and wrap the controller in a reconciler.
pub async fn connect(global: &GlobalOpts) -> Result<Reconciler, CliError> {
    let config = controller_config(global)?;
    let controller = Controller::connect(&config).await?;
    Ok(Reconciler::new(Arc::new(controller)).with_max_concurrency(config.settings.max_concurrency))
}

/// A token cancelled on Ctrl-C.
pub fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling in-flight operations");
            token.cancel();
        }
    });
    cancel
}
