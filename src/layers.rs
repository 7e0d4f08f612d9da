use std::io::{self, Read};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

use crate::digest::OciDigest;
use crate::error::{FetchFailure, Partial};
use crate::models::Layer;
use crate::session::RepositorySession;

/// A file located inside an image layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub layer: OciDigest,
    /// Zero-based position of the layer in the searched list
    pub layer_index: usize,
    /// Entry path with any leading `./` or `/` removed
    pub path: String,
    pub content: Vec<u8>,
}

/// Strip a leading `./` and then any leading slashes from an archive path.
pub fn normalize_entry_path(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path).trim_start_matches('/')
}

fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Scan a gzip-compressed tar stream for the first non-directory entry whose
/// base name is `file_name`. Entries after the match are never read.
pub fn search_layer<R: Read>(layer: R, file_name: &str) -> io::Result<Option<(String, Vec<u8>)>> {
    let mut archive = Archive::new(GzDecoder::new(layer));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() == EntryType::Directory {
            continue;
        }

        let raw_path = entry.path()?.to_string_lossy().into_owned();
        let path = normalize_entry_path(&raw_path);
        if base_name(path) != file_name {
            continue;
        }

        // The header size comes from the server; never allocate from it.
        let declared = entry.size();
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        if content.len() as u64 != declared {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry {} declares {} bytes but holds {}",
                    path,
                    declared,
                    content.len()
                ),
            ));
        }
        return Ok(Some((path.to_string(), content)));
    }

    Ok(None)
}

impl RepositorySession<'_> {
    /// Search `layers`, in order, for a file called `file_name`.
    ///
    /// Layers that cannot be downloaded or unpacked are skipped and recorded
    /// as failures; the first match ends the search.
    pub fn find_file_in_layers(&self, layers: &[Layer], file_name: &str) -> Partial<Option<FoundFile>> {
        let mut result = Partial::complete(None);

        for (position, layer) in layers.iter().enumerate() {
            info!("Processing layer {}/{}: {}", position + 1, layers.len(), layer.digest);

            let fetched = self
                .url(&format!("blobs/{}", layer.digest))
                .and_then(|url| {
                    let headers = self.bearer_headers()?;
                    Ok((self.transport.get(&url, &headers)?, url))
                });

            let response = match fetched {
                Ok((response, _)) if response.is_success() => response,
                Ok((response, url)) => {
                    let detail = response.detail();
                    warn!(
                        "Failed to download layer {}: {} {} {}",
                        layer.digest,
                        response.status.as_u16(),
                        response.reason(),
                        detail
                    );
                    result
                        .failures
                        .push(FetchFailure::from_status(url.as_str(), response.status, &detail));
                    continue;
                }
                Err(e) => {
                    warn!("Failed to download layer {}: {}", layer.digest, e);
                    result
                        .failures
                        .push(FetchFailure::from_error(layer.digest.to_string(), e));
                    continue;
                }
            };

            match search_layer(response.body.as_ref(), file_name) {
                Ok(Some((path, content))) => {
                    info!("Found '{}' in layer {} at {}", file_name, layer.digest, path);
                    result.value = Some(FoundFile {
                        layer: layer.digest.clone(),
                        layer_index: layer.index,
                        path,
                        content,
                    });
                    return result;
                }
                Ok(None) => debug!(digest = %layer.digest, "file not in layer"),
                Err(e) => {
                    warn!("Failed to unpack layer {}: {}", layer.digest, e);
                    result
                        .failures
                        .push(FetchFailure::from_error(response.url.as_str(), e));
                }
            }
        }

        result
    }
}
