use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::auth::Credentials;
use crate::error::{RegistryError, Result};
use crate::models::Platform;

pub const DOCKER_HUB_HOST: &str = "registry-1.docker.io";
pub const DOCKER_AUTH_REALM: &str = "https://auth.docker.io/token";
pub const DOCKER_AUTH_SERVICE: &str = "registry.docker.io";

/// Settings for a [`Client`](crate::Client).
///
/// Loaded in layers: built-in defaults, then an optional TOML/YAML/JSON file,
/// then `OCI_REGISTRY_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Registry hostname, or a full base URL when a scheme is given
    pub host: String,
    /// Token endpoint
    pub auth_realm: String,
    /// `service` parameter sent to the token endpoint
    pub auth_service: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Preset bearer token; skips the token endpoint entirely
    pub token: Option<String>,
    /// Redirects plus rate-limit retries allowed per request
    pub redirect_limit: u32,
    /// Nesting allowed when a manifest list points at another list
    pub max_manifest_depth: usize,
    pub architecture: String,
    pub os: String,
    pub variant: Option<String>,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl ClientConfig {
    /// Load configuration from `path` (or `oci-registry.*` in the working
    /// directory when `path` is `None`) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ClientConfig::default();

        let mut builder = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("auth_realm", defaults.auth_realm)?
            .set_default("auth_service", defaults.auth_service)?
            .set_default("redirect_limit", i64::from(defaults.redirect_limit))?
            .set_default("max_manifest_depth", defaults.max_manifest_depth as i64)?
            .set_default("architecture", defaults.architecture)?
            .set_default("os", defaults.os)?
            .set_default("connect_timeout_secs", defaults.connect_timeout_secs as i64)?
            .set_default("timeout_secs", defaults.timeout_secs as i64)?
            .set_default("user_agent", defaults.user_agent)?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("oci-registry").required(false)),
        };

        builder
            .add_source(Environment::with_prefix("OCI_REGISTRY"))
            .build()?
            .try_deserialize()
            .map_err(|e| RegistryError::Config(e.to_string()))
    }

    /// Base URL of the registry. Bare hostnames are reached over HTTPS.
    pub fn registry_url(&self) -> Result<Url> {
        let host = self.host.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Ok(Url::parse(&base)?)
    }

    pub fn auth_realm_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.auth_realm)?)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            architecture: self.architecture.clone(),
            os: self.os.clone(),
            variant: self.variant.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let platform = Platform::default();
        Self {
            host: DOCKER_HUB_HOST.to_string(),
            auth_realm: DOCKER_AUTH_REALM.to_string(),
            auth_service: DOCKER_AUTH_SERVICE.to_string(),
            username: None,
            password: None,
            token: None,
            redirect_limit: crate::transport::DEFAULT_REDIRECT_LIMIT,
            max_manifest_depth: crate::manifest::DEFAULT_MAX_DEPTH,
            architecture: platform.architecture,
            os: platform.os,
            variant: None,
            connect_timeout_secs: 30,
            timeout_secs: 300,
            user_agent: concat!("oci-registry/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
