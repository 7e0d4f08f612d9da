use config::ConfigError;
use reqwest::StatusCode;
use thiserror::Error;

/// Hard failures. Anything that can go wrong while fetching a token, a
/// manifest or a config blob ends up here and is returned to the caller
/// immediately.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Too many HTTP redirects while fetching {url}")]
    TooManyRedirects { url: String },

    #[error("Failed to obtain token: {} {}{}", .status.as_u16(), .reason, detail_suffix(.detail))]
    Auth {
        status: StatusCode,
        reason: String,
        detail: String,
    },

    #[error("Failed to fetch manifest {}: {} {}{}", .url, .status.as_u16(), .reason, detail_suffix(.detail))]
    ManifestFetch {
        url: String,
        status: StatusCode,
        reason: String,
        detail: String,
    },

    #[error("Failed to retrieve blob {}: {} {}{}", .url, .status.as_u16(), .reason, detail_suffix(.detail))]
    BlobFetch {
        url: String,
        status: StatusCode,
        reason: String,
        detail: String,
    },

    #[error("Unknown manifest type: {0}")]
    UnknownManifestType(String),

    #[error("No manifest for platform {platform} in {repository}:{reference}")]
    NoMatchingPlatform {
        repository: String,
        reference: String,
        platform: String,
    },

    #[error("Manifest list nesting exceeded {limit} levels at {repository}:{reference}")]
    ManifestDepthExceeded {
        repository: String,
        reference: String,
        limit: usize,
    },

    #[error("Invalid {media_type} manifest: {source}")]
    InvalidManifest {
        media_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<ConfigError> for RegistryError {
    fn from(err: ConfigError) -> Self {
        RegistryError::Config(err.to_string())
    }
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {}", detail)
    }
}

/// One failed request on a soft-failure path.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub url: String,
    /// Set when the server answered; `None` for transport or decoding errors
    pub status: Option<StatusCode>,
    pub message: String,
}

impl FetchFailure {
    pub fn from_status(url: impl Into<String>, status: StatusCode, detail: &str) -> Self {
        let reason = status.canonical_reason().unwrap_or("");
        Self {
            url: url.into(),
            status: Some(status),
            message: format!("{} {}{}", status.as_u16(), reason, detail_suffix(detail)),
        }
    }

    pub fn from_error(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self {
            url: url.into(),
            status: None,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.url, self.message)
    }
}

/// Best-effort result of tag listing and layer search. The value is whatever
/// was gathered before or around the failures, which are kept for callers
/// that care.
#[derive(Debug, Clone)]
pub struct Partial<T> {
    pub value: T,
    pub failures: Vec<FetchFailure>,
}

impl<T> Partial<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
