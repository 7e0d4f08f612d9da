//! Blocking GET with manual redirect handling and rate-limit back-off.
//!
//! Redirects are followed here rather than by reqwest so that the
//! `Authorization` header can be dropped when a hop leaves the original host.
//! Docker Hub answers blob requests with a redirect to a storage bucket that
//! rejects (or worse, logs) foreign credentials.

use std::borrow::Cow;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{self, HeaderMap};
use reqwest::{redirect, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{RegistryError, Result};

/// Redirect hops and rate-limit retries allowed for a single request.
pub const DEFAULT_REDIRECT_LIMIT: u32 = 10;

/// Back-off used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

const DETAIL_LIMIT: usize = 1024;

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Response {
    /// URL of the request that produced this response, after redirects
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Trimmed body, cut short for use in error messages.
    pub fn detail(&self) -> String {
        let text = self.text();
        let text = text.trim();
        match text.char_indices().nth(DETAIL_LIMIT) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        }
    }
}

/// Synchronous HTTP transport shared by every registry operation.
#[derive(Debug, Clone)]
pub struct Transport {
    client: HttpClient,
    redirect_limit: u32,
}

impl Transport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = HttpClient::builder()
            .redirect(redirect::Policy::none())
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            redirect_limit: config.redirect_limit,
        })
    }

    /// GET `url` with the configured redirect budget.
    pub fn get(&self, url: &Url, headers: &HeaderMap) -> Result<Response> {
        self.get_with_budget(url, headers, self.redirect_limit)
    }

    /// GET `url`, following up to `budget` redirects. Each 429 back-off also
    /// spends one unit of the same budget.
    ///
    /// Statuses other than 3xx (with a `Location`) and 429 are handed back
    /// untouched; callers decide what a 404 or 500 means for them.
    pub fn get_with_budget(&self, url: &Url, headers: &HeaderMap, budget: u32) -> Result<Response> {
        let mut url = url.clone();
        let mut headers = headers.clone();
        let mut remaining = budget;

        loop {
            debug!(url = %url, remaining, "GET");
            let response = self.client.get(url.clone()).headers(headers.clone()).send()?;
            let status = response.status();

            if status.is_redirection() {
                let Some(location) = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    return read_response(url, response);
                };

                let next = url.join(location)?;
                if remaining == 0 {
                    return Err(RegistryError::TooManyRedirects {
                        url: url.to_string(),
                    });
                }
                remaining -= 1;

                if next.host_str() != url.host_str() && headers.remove(header::AUTHORIZATION).is_some() {
                    debug!(from = ?url.host_str(), to = ?next.host_str(), "dropping Authorization on cross-host redirect");
                }
                debug!(status = status.as_u16(), location = %next, "following redirect");
                url = next;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if remaining == 0 {
                    return Err(RegistryError::TooManyRedirects {
                        url: url.to_string(),
                    });
                }
                remaining -= 1;

                let delay = retry_after(response.headers());
                warn!(url = %url, delay_secs = delay.as_secs(), "rate limited, backing off");
                thread::sleep(delay);
                continue;
            }

            return read_response(url, response);
        }
    }
}

fn read_response(url: Url, response: reqwest::blocking::Response) -> Result<Response> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes()?;
    debug!(url = %url, status = status.as_u16(), bytes = body.len(), "response");

    Ok(Response {
        url,
        status,
        headers,
        body,
    })
}

/// `Retry-After` in whole seconds. HTTP-date values and garbage fall back to
/// [`DEFAULT_RETRY_AFTER`].
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
