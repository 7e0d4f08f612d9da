use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{RegistryError, Result};
use crate::transport::Transport;

/// Login material for a registry. Fixed for the lifetime of a client.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Bearer token obtained elsewhere, e.g. `gcloud auth print-access-token`
    pub token: Option<String>,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            token: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// `Basic <base64(user:pass)>`, only when both halves are non-empty.
    pub fn basic_auth_header(&self) -> Option<String> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass))))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// Token authentication response from the auth service
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Fetches pull-scoped bearer tokens from a registry's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    realm: Url,
    service: String,
}

impl TokenProvider {
    pub fn new(realm: Url, service: impl Into<String>) -> Self {
        Self {
            realm,
            service: service.into(),
        }
    }

    /// Token endpoint URL for pulling `repository`.
    pub fn token_url(&self, repository: &str) -> Url {
        let mut url = self.realm.clone();
        url.query_pairs_mut()
            .append_pair("service", &self.service)
            .append_pair("scope", &format!("repository:{}:pull", repository));
        url
    }

    /// Request a token for pulling `repository`, anonymously unless
    /// `credentials` carry both a username and a password.
    pub fn get_token(
        &self,
        transport: &Transport,
        repository: &str,
        credentials: &Credentials,
    ) -> Result<String> {
        let url = self.token_url(repository);

        let mut headers = HeaderMap::new();
        if let Some(basic) = credentials.basic_auth_header() {
            let mut value = HeaderValue::from_str(&basic)
                .map_err(|e| RegistryError::Config(format!("invalid credentials: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        debug!(repository, authenticated = headers.contains_key(header::AUTHORIZATION), "requesting token");
        let response = transport.get(&url, &headers)?;

        if !response.is_success() {
            return Err(RegistryError::Auth {
                status: response.status,
                reason: response.reason().to_string(),
                detail: response.detail(),
            });
        }

        let parsed: TokenResponse = response.json()?;
        parsed
            .token
            .or(parsed.access_token)
            .ok_or_else(|| RegistryError::Auth {
                status: response.status,
                reason: "token missing from response".to_string(),
                detail: response.detail(),
            })
    }
}
