pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod digest;
pub mod error;
pub mod layers;
pub mod manifest;
pub mod models;
pub mod session;
pub mod tags;
pub mod transport;

// Re-export main client types for convenience
pub use auth::{Credentials, TokenProvider};
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use digest::{OciDigest, Reference};
pub use error::{FetchFailure, Partial, RegistryError, Result};
pub use layers::FoundFile;
pub use models::{ImageConfig, ImageIndex, ImageManifest, Layer, Manifest, MediaType, Platform};
pub use session::RepositorySession;
pub use tags::TagPage;
pub use transport::{Response, Transport};
