//! Application configuration.
//!
//! Configuration is loaded from a YAML file and can be overridden with
//! environment variables:
//!
//! ```bash
//! # Point at a config file
//! AIGUILD_CONFIG=config.yaml
//!
//! # Override nested values (double underscore separates levels)
//! AIGUILD_AUTH__ALLOW_REGISTRATION=false
//! AIGUILD_BACKEND__TYPE=memory
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AIGUILD_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret key for signing session tokens (required when the in-memory
    /// auth service is used; the REST backend issues its own tokens)
    pub secret_key: Option<String>,
    /// Authentication and session configuration
    pub auth: AuthConfig,
    /// External backend configuration (auth service + profile/data stores)
    pub backend: BackendConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3020,
            secret_key: None,
            auth: AuthConfig::default(),
            backend: BackendConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Allow new users to self-register (role is chosen at signup)
    pub allow_registration: bool,
    /// Password validation rules
    pub password: PasswordConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Bounded wait applied to profile-store role lookups. Expiry is
    /// treated as a lookup failure (role degrades to Unknown).
    #[serde(with = "humantime_serde")]
    pub role_lookup_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: true,
            password: PasswordConfig::default(),
            session: SessionConfig::default(),
            role_lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session timeout duration
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(24 * 60 * 60),
            cookie_name: "aiguild_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "Lax".to_string(),
        }
    }
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
        }
    }
}

/// External backend configuration.
///
/// The auth service, profile store, and domain stores are external
/// collaborators. They can be served from process memory (development and
/// tests) or from a hosted backend with a GoTrue-style auth API and a
/// PostgREST-style data API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process stores, lost on shutdown
    Memory,
    /// Hosted backend over HTTP
    Rest {
        /// Base URL of the auth API (e.g., "https://backend.example.com/auth/v1")
        auth_url: Url,
        /// Base URL of the data API (e.g., "https://backend.example.com/rest/v1")
        data_url: Url,
        /// API key sent with every request (`apikey` header)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        /// Per-request timeout for backend calls
        #[serde(default = "default_backend_timeout", with = "humantime_serde")]
        request_timeout: Duration,
    },
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests; empty disables CORS entirely
    pub allowed_origins: Vec<String>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allow_credentials: true,
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        Self::figment(args).extract()
    }

    fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("AIGUILD_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn test_args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&test_args("missing.yaml")).expect("defaults should load");
            assert_eq!(config.port, 3020);
            assert!(matches!(config.backend, BackendConfig::Memory));
            assert_eq!(config.auth.session.cookie_name, "aiguild_session");
            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
port: 8088
auth:
  allow_registration: false
  role_lookup_timeout: 2s
backend:
  type: rest
  auth_url: "https://backend.example.com/auth/v1"
  data_url: "https://backend.example.com/rest/v1"
  api_key: "anon-key"
"#,
            )?;
            jail.set_env("AIGUILD_HOST", "127.0.0.1");
            jail.set_env("AIGUILD_AUTH__ALLOW_REGISTRATION", "true");

            let config = Config::load(&test_args("config.yaml")).expect("config should load");
            assert_eq!(config.port, 8088);
            assert_eq!(config.host, "127.0.0.1");
            // Env wins over file
            assert!(config.auth.allow_registration);
            assert_eq!(config.auth.role_lookup_timeout, Duration::from_secs(2));
            match &config.backend {
                BackendConfig::Rest { auth_url, api_key, .. } => {
                    assert_eq!(auth_url.as_str(), "https://backend.example.com/auth/v1");
                    assert_eq!(api_key.as_deref(), Some("anon-key"));
                }
                other => panic!("expected rest backend, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "no_such_field: true\n")?;
            let result = Config::load(&test_args("config.yaml"));
            assert!(result.is_err());
            Ok(())
        });
    }
}
