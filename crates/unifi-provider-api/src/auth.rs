use secrecy::SecretString;

/// Credentials for authenticating with a UniFi controller.
///
/// Each variant carries the secret material needed for its auth flow.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Cookie-based session auth. The login response sets a session cookie
    /// (and, on UniFi OS, a CSRF token) used by every later request.
    Session {
        username: String,
        password: SecretString,
    },

    /// Local API key, sent as `X-API-KEY` on every request.
    /// Generated at: Network > Settings > Control Plane > Integrations.
    ApiKey { key: SecretString },
}

impl Credentials {
    /// Whether establishing a session needs a login round trip.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::Session { .. })
    }
}

/// The platform type of the UniFi controller.
///
/// Determines URL prefixes and login paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPlatform {
    /// UniFi OS device (UDM, UCG, etc.) -- port 443, `/proxy/network/` prefix.
    UnifiOs,
    /// Standalone Network Application (Java) -- port 8443, no prefix.
    ClassicController,
}

impl ControllerPlatform {
    /// The path prefix for legacy API endpoints.
    pub fn legacy_prefix(self) -> &'static str {
        match self {
            Self::UnifiOs => "/proxy/network",
            Self::ClassicController => "",
        }
    }

    /// The login endpoint path.
    pub fn login_path(self) -> &'static str {
        match self {
            Self::UnifiOs => "/api/auth/login",
            Self::ClassicController => "/api/login",
        }
    }

    /// The logout endpoint path.
    pub fn logout_path(self) -> &'static str {
        match self {
            Self::UnifiOs => "/api/auth/logout",
            Self::ClassicController => "/api/logout",
        }
    }
}

impl std::str::FromStr for ControllerPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unifi-os" | "unifi_os" | "udm" => Ok(Self::UnifiOs),
            "classic" | "standalone" => Ok(Self::ClassicController),
            other => Err(format!(
                "unknown platform '{other}' (expected 'unifi-os' or 'classic')"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unifi_os_paths_are_proxied() {
        let p = ControllerPlatform::UnifiOs;
        assert_eq!(p.legacy_prefix(), "/proxy/network");
        assert_eq!(p.login_path(), "/api/auth/login");
    }

    #[test]
    fn platform_parses_aliases() {
        assert_eq!(
            "standalone".parse::<ControllerPlatform>(),
            Ok(ControllerPlatform::ClassicController)
        );
        assert!("cloud".parse::<ControllerPlatform>().is_err());
    }
}
