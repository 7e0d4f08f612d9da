//! Manifest and config-blob retrieval, and resolution of multi-platform
//! lists down to a single image manifest.

use reqwest::header::{self, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::digest::{OciDigest, Reference};
use crate::error::{RegistryError, Result};
use crate::models::{ImageManifest, Manifest, MediaType, Platform};
use crate::session::RepositorySession;

/// How many list-to-list hops are followed before giving up.
pub const DEFAULT_MAX_DEPTH: usize = 4;

impl RepositorySession<'_> {
    /// Fetch the raw manifest document for a tag or digest.
    pub fn get_manifest(&self, reference: &Reference) -> Result<Value> {
        let url = self.url(&format!("manifests/{}", reference))?;
        let mut headers = self.bearer_headers()?;
        let accept = HeaderValue::from_str(&MediaType::accept_header())
            .map_err(|e| RegistryError::Config(e.to_string()))?;
        headers.insert(header::ACCEPT, accept);

        let response = self.transport.get(&url, &headers)?;
        if !response.is_success() {
            return Err(RegistryError::ManifestFetch {
                url: url.to_string(),
                status: response.status,
                reason: response.reason().to_string(),
                detail: response.detail(),
            });
        }

        response.json()
    }

    /// Fetch a JSON blob, typically an image config.
    pub fn get_blob(&self, digest: &OciDigest) -> Result<Value> {
        let url = self.url(&format!("blobs/{}", digest))?;
        let response = self.transport.get(&url, &self.bearer_headers()?)?;

        if !response.is_success() {
            return Err(RegistryError::BlobFetch {
                url: url.to_string(),
                status: response.status,
                reason: response.reason().to_string(),
                detail: response.detail(),
            });
        }

        response.json()
    }
}

/// Walk from `reference` to a single-platform image manifest.
///
/// `fetch` returns the raw manifest for a reference; the client passes its
/// caching lookup here. Lists and indexes are followed through their first
/// entry matching `platform`, at most `max_depth` times.
pub fn resolve_image_manifest<F>(
    repository: &str,
    reference: &Reference,
    platform: &Platform,
    max_depth: usize,
    mut fetch: F,
) -> Result<ImageManifest>
where
    F: FnMut(&Reference) -> Result<Value>,
{
    let mut current = reference.clone();
    let mut depth = 0;

    loop {
        let raw = fetch(&current)?;
        let manifest = Manifest::from_value(&raw)?;
        debug!(repository, reference = %current, media_type = %manifest.media_type(), "resolved manifest");

        let index = match manifest {
            Manifest::DockerV2(image) | Manifest::Oci(image) => return Ok(image),
            Manifest::DockerList(index) | Manifest::OciIndex(index) => index,
        };

        if depth == max_depth {
            return Err(RegistryError::ManifestDepthExceeded {
                repository: repository.to_string(),
                reference: current.to_string(),
                limit: max_depth,
            });
        }

        let entry = index
            .find_platform(platform)
            .ok_or_else(|| RegistryError::NoMatchingPlatform {
                repository: repository.to_string(),
                reference: current.to_string(),
                platform: platform.to_string(),
            })?;

        debug!(platform = %platform, digest = %entry.digest, "selected platform manifest");
        current = Reference::Digest(entry.digest.clone());
        depth += 1;
    }
}
