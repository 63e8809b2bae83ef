// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Environment-sourced API configuration.

use std::path::PathBuf;

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Directory holding the redb files (`registry.redb`, `audit.redb`).
    pub data_dir: PathBuf,
    /// Enables the no-key first-admin bootstrap path.
    pub allow_first_admin: bool,
    /// Shared secret for keyed admin signup. Never logged, never echoed.
    pub admin_signup_secret: Option<String>,
    /// Mark cookies `Secure` (HTTPS deployments).
    pub cookie_secure: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            allow_first_admin: false,
            admin_signup_secret: None,
            cookie_secure: false,
        }
    }
}

impl ApiConfig {
    /// Build configuration from the environment, with defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("AERIS_HOST").unwrap_or(defaults.host),
            port: std::env::var("AERIS_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.port),
            data_dir: std::env::var("AERIS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            allow_first_admin: std::env::var("ALLOW_FIRST_ADMIN")
                .map(|value| value == "true")
                .unwrap_or(false),
            admin_signup_secret: std::env::var("ADMIN_SIGNUP_SECRET")
                .ok()
                .filter(|value| !value.is_empty()),
            cookie_secure: std::env::var("AERIS_COOKIE_SECURE")
                .map(|value| value == "true")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let config = ApiConfig::default();
        // Bootstrap must be an explicit opt-in.
        assert!(!config.allow_first_admin);
        assert!(config.admin_signup_secret.is_none());
    }
}
