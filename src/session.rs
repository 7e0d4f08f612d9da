use reqwest::header::{self, HeaderMap, HeaderValue};
use url::Url;

use crate::error::{RegistryError, Result};
use crate::transport::Transport;

/// Everything needed to talk to one repository: where the registry is, which
/// repository, and the bearer token scoped to it.
///
/// Sessions are cheap and short-lived; [`Client`](crate::Client) hands one
/// out per operation after resolving the token.
#[derive(Debug, Clone)]
pub struct RepositorySession<'a> {
    pub(crate) transport: &'a Transport,
    pub(crate) base: &'a Url,
    pub(crate) repository: String,
    pub(crate) token: String,
}

impl<'a> RepositorySession<'a> {
    pub fn new(
        transport: &'a Transport,
        base: &'a Url,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base,
            repository: repository.into(),
            token: token.into(),
        }
    }

    /// `<base>/v2/<repository>/<path>`
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(&format!("/v2/{}/{}", self.repository, path))?)
    }

    pub(crate) fn bearer_headers(&self) -> Result<HeaderMap> {
        bearer_headers(&self.token)
    }
}

/// Headers carrying `Authorization: Bearer <token>`.
pub(crate) fn bearer_headers(token: &str) -> Result<HeaderMap> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| RegistryError::Config(format!("token is not a valid header value: {}", e)))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, value);
    Ok(headers)
}
