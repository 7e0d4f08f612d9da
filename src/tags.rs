use std::collections::HashSet;

use reqwest::header::{self, HeaderValue};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{FetchFailure, Partial};
use crate::session::RepositorySession;
use crate::transport::Response;

/// Tags requested per page.
pub const TAG_PAGE_SIZE: usize = 100;

/// One page of a tag listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPage {
    pub tags: Vec<String>,
    /// Target of the `Link: <...>; rel="next"` header, as sent by the server
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsListResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl TagPage {
    pub fn from_response(response: &Response) -> serde_json::Result<Self> {
        let body: TagsListResponse = serde_json::from_slice(&response.body)?;
        Ok(TagPage {
            tags: body.tags.unwrap_or_default(),
            next: response.header(header::LINK).and_then(next_link),
        })
    }
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_link(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params.split(';').any(|param| {
            let param = param.trim().replace(' ', "");
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}

impl RepositorySession<'_> {
    /// Page through the repository's tags, calling `on_tag` for each one as
    /// it arrives.
    ///
    /// A failed page ends the walk; the tags gathered so far are still
    /// returned, together with the failure.
    pub fn list_tags<F>(&self, mut on_tag: F) -> Partial<Vec<String>>
    where
        F: FnMut(&str),
    {
        let mut result = Partial::complete(Vec::new());

        let first = format!("tags/list?n={}", TAG_PAGE_SIZE);
        let mut url = match self.url(&first) {
            Ok(url) => url,
            Err(e) => {
                result.failures.push(FetchFailure::from_error(first, e));
                return result;
            }
        };

        let mut headers = match self.bearer_headers() {
            Ok(headers) => headers,
            Err(e) => {
                result.failures.push(FetchFailure::from_error(url.as_str(), e));
                return result;
            }
        };
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let mut visited = HashSet::new();
        loop {
            visited.insert(url.clone());

            let response = match self.transport.get(&url, &headers) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to fetch tags for {}: {} {}", self.repository, url, e);
                    result.failures.push(FetchFailure::from_error(url.as_str(), e));
                    break;
                }
            };

            if !response.is_success() {
                let detail = response.detail();
                warn!(
                    "Failed to fetch tags for {}: {} {} {} {}",
                    self.repository,
                    url,
                    response.status.as_u16(),
                    response.reason(),
                    detail
                );
                result
                    .failures
                    .push(FetchFailure::from_status(url.as_str(), response.status, &detail));
                break;
            }

            let page = match TagPage::from_response(&response) {
                Ok(page) => page,
                Err(e) => {
                    warn!("Invalid tag list from {}: {}", url, e);
                    result.failures.push(FetchFailure::from_error(url.as_str(), e));
                    break;
                }
            };

            debug!(url = %url, count = page.tags.len(), "tag page");
            for tag in page.tags {
                on_tag(&tag);
                result.value.push(tag);
            }

            let Some(next) = page.next else {
                break;
            };

            match url.join(&next) {
                Ok(next_url) if visited.contains(&next_url) => {
                    warn!(
                        "Tag listing for {} links back to an earlier page {} from {}",
                        self.repository, next_url, url
                    );
                    result.failures.push(FetchFailure::from_error(
                        url.as_str(),
                        format!("next page link revisits {}", next_url),
                    ));
                    break;
                }
                Ok(next_url) => url = next_url,
                Err(e) => {
                    warn!("Invalid next link {:?} from {}: {}", next, url, e);
                    result.failures.push(FetchFailure::from_error(next, e));
                    break;
                }
            }
        }

        result
    }
}
