use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{Credentials, TokenProvider};
use crate::cache::Cache;
use crate::config::ClientConfig;
use crate::digest::Reference;
use crate::error::{Partial, Result};
use crate::layers::FoundFile;
use crate::manifest::resolve_image_manifest;
use crate::models::{ImageConfig, ImageManifest, Layer, Platform};
use crate::session::{self, RepositorySession};
use crate::transport::{Response, Transport};

/// A client for one registry.
///
/// Tokens are cached per repository and manifests per `repository:reference`
/// for as long as the client lives. Nothing is refreshed; build a new client
/// when fresh answers are needed.
#[derive(Debug)]
pub struct Client {
    registry_url: Url,
    transport: Transport,
    token_provider: TokenProvider,
    credentials: Credentials,
    platform: Platform,
    max_manifest_depth: usize,
    tokens: Cache<String>,
    manifests: Cache<Value>,
}

impl Client {
    /// Create a new client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Transport::new(&config)?;
        let token_provider = TokenProvider::new(config.auth_realm_url()?, config.auth_service.clone());

        Ok(Self {
            registry_url: config.registry_url()?,
            transport,
            token_provider,
            credentials: config.credentials(),
            platform: config.platform(),
            max_manifest_depth: config.max_manifest_depth,
            tokens: Cache::new(),
            manifests: Cache::new(),
        })
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn registry_url(&self) -> &Url {
        &self.registry_url
    }

    /// Bearer token for pulling from `repository`. A preset token is used
    /// for every repository as-is.
    pub fn token(&self, repository: &str) -> Result<String> {
        if let Some(token) = &self.credentials.token {
            return Ok(token.clone());
        }

        self.tokens.get_or_try_insert(repository, || {
            debug!(repository, "fetching token");
            self.token_provider
                .get_token(&self.transport, repository, &self.credentials)
        })
    }

    /// Create a new session for the given repository.
    pub fn session(&self, repository: &str) -> Result<RepositorySession<'_>> {
        let token = self.token(repository)?;
        Ok(RepositorySession::new(
            &self.transport,
            &self.registry_url,
            repository,
            token,
        ))
    }

    /// Raw manifest document for `repository:reference`.
    #[instrument(skip(self, reference), fields(reference = %reference))]
    pub fn manifest(&self, repository: &str, reference: &Reference) -> Result<Value> {
        let key = format!("{}:{}", repository, reference);
        self.manifests.get_or_try_insert(&key, || {
            self.session(repository)?.get_manifest(reference)
        })
    }

    /// Single-platform manifest for `repository:reference`, following
    /// manifest lists to this client's target platform.
    pub fn image_manifest(&self, repository: &str, reference: &Reference) -> Result<ImageManifest> {
        resolve_image_manifest(
            repository,
            reference,
            &self.platform,
            self.max_manifest_depth,
            |current| self.manifest(repository, current),
        )
    }

    /// The image configuration blob for `repository:reference`.
    #[instrument(skip(self, reference), fields(reference = %reference))]
    pub fn metadata(&self, repository: &str, reference: &Reference) -> Result<ImageConfig> {
        let manifest = self.image_manifest(repository, reference)?;
        let config = self.session(repository)?.get_blob(&manifest.config.digest)?;
        Ok(ImageConfig::new(config))
    }

    /// Layers of the image for `repository:reference`, base layer first.
    #[instrument(skip(self, reference), fields(reference = %reference))]
    pub fn layers(&self, repository: &str, reference: &Reference) -> Result<Vec<Layer>> {
        let manifest = self.image_manifest(repository, reference)?;
        Ok(Layer::from_manifest(&manifest))
    }

    /// All tags of `repository`. Only token failures are errors; listing
    /// failures show up in the returned [`Partial`].
    pub fn tags(&self, repository: &str) -> Result<Partial<Vec<String>>> {
        self.tags_with(repository, |_| {})
    }

    /// Like [`Client::tags`], calling `on_tag` for each tag as it arrives.
    #[instrument(skip(self, on_tag))]
    pub fn tags_with<F>(&self, repository: &str, on_tag: F) -> Result<Partial<Vec<String>>>
    where
        F: FnMut(&str),
    {
        Ok(self.session(repository)?.list_tags(on_tag))
    }

    /// Search `layers` of `repository` for a file named `file_name`.
    #[instrument(skip(self, layers), fields(layers = layers.len()))]
    pub fn find_file_in_layers(
        &self,
        repository: &str,
        layers: &[Layer],
        file_name: &str,
    ) -> Result<Partial<Option<FoundFile>>> {
        Ok(self.session(repository)?.find_file_in_layers(layers, file_name))
    }

    /// Probe `GET /v2/` with the preset token, if any.
    pub fn ping(&self) -> Result<Response> {
        let url = self.registry_url.join("/v2/")?;
        let token = self.credentials.token.as_deref().unwrap_or_default();
        self.transport.get(&url, &session::bearer_headers(token)?)
    }
}

/// Programmatic alternative to loading a [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn auth_realm(mut self, realm: impl Into<String>) -> Self {
        self.config.auth_realm = realm.into();
        self
    }

    pub fn auth_service(mut self, service: impl Into<String>) -> Self {
        self.config.auth_service = service.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.config.architecture = platform.architecture;
        self.config.os = platform.os;
        self.config.variant = platform.variant;
        self
    }

    pub fn redirect_limit(mut self, limit: u32) -> Self {
        self.config.redirect_limit = limit;
        self
    }

    pub fn max_manifest_depth(mut self, depth: usize) -> Self {
        self.config.max_manifest_depth = depth;
        self
    }

    pub fn build(self) -> Result<Client> {
        Client::new(self.config)
    }
}
