use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::digest::OciDigest;
use crate::error::{RegistryError, Result};

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// The manifest media types this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    DockerManifestV2,
    DockerManifestList,
    OciManifest,
    OciIndex,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::OciIndex,
        MediaType::DockerManifestList,
        MediaType::OciManifest,
        MediaType::DockerManifestV2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::DockerManifestV2 => DOCKER_MANIFEST_V2,
            MediaType::DockerManifestList => DOCKER_MANIFEST_LIST_V2,
            MediaType::OciManifest => OCI_MANIFEST_V1,
            MediaType::OciIndex => OCI_INDEX_V1,
        }
    }

    /// Value for the `Accept` header of a manifest request.
    pub fn accept_header() -> String {
        Self::ALL
            .iter()
            .map(MediaType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            DOCKER_MANIFEST_V2 => Ok(MediaType::DockerManifestV2),
            DOCKER_MANIFEST_LIST_V2 => Ok(MediaType::DockerManifestList),
            OCI_MANIFEST_V1 => Ok(MediaType::OciManifest),
            OCI_INDEX_V1 => Ok(MediaType::OciIndex),
            other => Err(RegistryError::UnknownManifestType(other.to_string())),
        }
    }
}

/// Represents a descriptor for a content blob in an OCI registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    #[serde(default)]
    pub media_type: String,
    /// Digest of the referenced content
    pub digest: OciDigest,
    /// Size of the referenced content in bytes
    #[serde(default)]
    pub size: u64,
    /// Platform of the referenced manifest, only set on list/index entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Represents platform information for a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture
    pub architecture: String,
    /// Operating system
    pub os: String,
    /// Optional variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    pub fn new(architecture: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            variant: None,
        }
    }

    /// Architecture and OS must agree; the variant only matters when this
    /// platform asks for one.
    pub fn matches(&self, other: &Platform) -> bool {
        self.architecture == other.architecture
            && self.os == other.os
            && match &self.variant {
                Some(variant) => other.variant.as_deref() == Some(variant.as_str()),
                None => true,
            }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::new("amd64", "linux")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Single-platform image manifest (Docker v2 schema 2 or OCI v1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default)]
    pub schema_version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// Multi-platform manifest list (Docker) or image index (OCI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    #[serde(default)]
    pub schema_version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

impl ImageIndex {
    /// First entry whose platform matches, in document order.
    pub fn find_platform(&self, platform: &Platform) -> Option<&Descriptor> {
        self.manifests.iter().find(|entry| {
            entry
                .platform
                .as_ref()
                .is_some_and(|candidate| platform.matches(candidate))
        })
    }
}

/// A decoded manifest, keyed by its `mediaType`.
#[derive(Debug, Clone)]
pub enum Manifest {
    DockerV2(ImageManifest),
    DockerList(ImageIndex),
    Oci(ImageManifest),
    OciIndex(ImageIndex),
}

impl Manifest {
    /// Decode a raw manifest document. The `mediaType` field picks the
    /// variant; a missing or unrecognized type is an error.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw_type = value
            .get("mediaType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let media_type = MediaType::from_str(raw_type)?;

        let invalid = |source| RegistryError::InvalidManifest {
            media_type: raw_type.to_string(),
            source,
        };

        let manifest = match media_type {
            MediaType::DockerManifestV2 => {
                Manifest::DockerV2(ImageManifest::deserialize(value).map_err(invalid)?)
            }
            MediaType::OciManifest => {
                Manifest::Oci(ImageManifest::deserialize(value).map_err(invalid)?)
            }
            MediaType::DockerManifestList => {
                Manifest::DockerList(ImageIndex::deserialize(value).map_err(invalid)?)
            }
            MediaType::OciIndex => {
                Manifest::OciIndex(ImageIndex::deserialize(value).map_err(invalid)?)
            }
        };

        Ok(manifest)
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Manifest::DockerV2(_) => MediaType::DockerManifestV2,
            Manifest::DockerList(_) => MediaType::DockerManifestList,
            Manifest::Oci(_) => MediaType::OciManifest,
            Manifest::OciIndex(_) => MediaType::OciIndex,
        }
    }
}

/// One layer of a resolved image manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub digest: OciDigest,
    /// Zero-based position in the manifest's layer list
    pub index: usize,
    pub media_type: String,
    pub size: u64,
}

impl Layer {
    pub fn new(digest: OciDigest, index: usize) -> Self {
        Self {
            digest,
            index,
            media_type: String::new(),
            size: 0,
        }
    }

    pub(crate) fn from_manifest(manifest: &ImageManifest) -> Vec<Layer> {
        manifest
            .layers
            .iter()
            .enumerate()
            .map(|(index, descriptor)| Layer {
                digest: descriptor.digest.clone(),
                index,
                media_type: descriptor.media_type.clone(),
                size: descriptor.size,
            })
            .collect()
    }
}

/// The image configuration blob, kept exactly as the registry served it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageConfig(Value);

impl ImageConfig {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn architecture(&self) -> Option<&str> {
        self.0.get("architecture").and_then(Value::as_str)
    }

    pub fn os(&self) -> Option<&str> {
        self.0.get("os").and_then(Value::as_str)
    }

    /// The runtime `config` section (Env, Cmd, Labels, ...).
    pub fn config(&self) -> Option<&Map<String, Value>> {
        self.0.get("config").and_then(Value::as_object)
    }

    /// `config.Labels`, with non-string values dropped.
    pub fn labels(&self) -> HashMap<String, String> {
        self.config()
            .and_then(|config| config.get("Labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}
