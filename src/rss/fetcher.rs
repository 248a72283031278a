//! SSRF-safe feed fetcher.
//!
//! One call to [`Fetcher::fetch`] is one attempt: no retries happen here.
//! Redirects are followed by hand so that every hop is re-validated by the
//! [`AddressGuard`] before a connection is opened, and the body is streamed
//! against a size cap.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;
use url::Url;

use crate::config::RssConfig;
use crate::rss::failure::{FailureReason, FetchFailure, FetchResult};
use crate::rss::ssrf::{check_scheme, parse_feed_url, AddressGuard, Resolve, SystemResolver, VettedTarget};

/// Limits applied to every fetch.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Timeout for each read from the connection.
    pub read_timeout: Duration,
    /// Redirects followed before giving up.
    pub max_redirects: usize,
    /// Body size cap in bytes.
    pub max_response_bytes: u64,
    /// User agent header value.
    pub user_agent: String,
}

impl FetchSettings {
    /// Build settings from the `[rss]` config section.
    pub fn from_config(config: &RssConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            max_redirects: config.max_redirects,
            max_response_bytes: config.max_response_bytes,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&RssConfig::default())
    }
}

/// Feed fetcher with SSRF protection and resource limits.
#[derive(Debug, Clone)]
pub struct Fetcher {
    settings: FetchSettings,
    guard: AddressGuard,
}

impl Fetcher {
    /// Create a fetcher that resolves hosts through the system resolver.
    pub fn new(settings: FetchSettings) -> Self {
        Self::with_resolver(settings, Arc::new(SystemResolver))
    }

    /// Create a fetcher with a custom resolver.
    pub fn with_resolver(settings: FetchSettings, resolver: Arc<dyn Resolve>) -> Self {
        Self {
            settings,
            guard: AddressGuard::new(resolver),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_guard(settings: FetchSettings, guard: AddressGuard) -> Self {
        Self { settings, guard }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetch the body of `url`.
    ///
    /// Each hop is validated before it is requested: scheme, host, and every
    /// resolved address. A redirect response beyond `max_redirects` fails
    /// with `too_many_redirects`.
    pub async fn fetch(&self, url: &str) -> FetchResult<Vec<u8>> {
        let mut current = parse_feed_url(url)?;
        let mut redirects = 0usize;

        loop {
            let target = self.guard.vet(&current).await?;
            let client = self.client_for(&target)?;

            debug!(url = %current, hop = redirects, "requesting feed");
            let response = client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| classify_transport_error(&e))?;

            let status = response.status();
            if is_followable_redirect(status) {
                if redirects >= self.settings.max_redirects {
                    return Err(FetchFailure::new(
                        FailureReason::TooManyRedirects,
                        format!(
                            "too many redirects (max {}) at {}",
                            self.settings.max_redirects, current
                        ),
                    ));
                }
                let next = redirect_target(&current, &response)?;
                debug!(from = %current, to = %next, "following redirect");
                current = next;
                redirects += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchFailure::new(
                    FailureReason::HttpError,
                    format!("HTTP error: {status}"),
                ));
            }

            let body = self.read_body(response).await?;
            if body.iter().all(u8::is_ascii_whitespace) {
                return Err(FetchFailure::new(
                    FailureReason::EmptyResponse,
                    format!("empty response from {current}"),
                ));
            }
            return Ok(body);
        }
    }

    /// Build a client whose DNS for this hop is pinned to the vetted
    /// addresses. Proxies are disabled; a proxy would resolve the host again.
    fn client_for(&self, target: &VettedTarget) -> FetchResult<Client> {
        let mut builder = Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .read_timeout(self.settings.read_timeout)
            .redirect(Policy::none())
            .user_agent(self.settings.user_agent.as_str())
            .no_proxy();

        if let Some(domain) = &target.domain {
            builder = builder.resolve_to_addrs(domain, &target.addrs);
        }

        builder.build().map_err(|e| {
            FetchFailure::new(
                FailureReason::ConnectionError,
                format!("failed to create HTTP client: {e}"),
            )
        })
    }

    /// Stream the body, aborting as soon as the cap is crossed.
    async fn read_body(&self, mut response: Response) -> FetchResult<Vec<u8>> {
        let cap = self.settings.max_response_bytes;

        if let Some(declared) = response.content_length() {
            if declared > cap {
                return Err(FetchFailure::new(
                    FailureReason::ResponseTooLarge,
                    format!("response too large: {declared} bytes (max {cap} bytes)"),
                ));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_transport_error(&e))?
        {
            if body.len() as u64 + chunk.len() as u64 > cap {
                return Err(FetchFailure::new(
                    FailureReason::ResponseTooLarge,
                    format!("response exceeds maximum size of {cap} bytes"),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

fn is_followable_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Resolve the Location header against the current URL.
fn redirect_target(current: &Url, response: &Response) -> FetchResult<Url> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            FetchFailure::new(
                FailureReason::HttpError,
                format!("redirect ({}) without usable Location header", response.status()),
            )
        })?;

    let next = current.join(location).map_err(|e| {
        FetchFailure::new(
            FailureReason::InvalidUrl,
            format!("invalid redirect target {location:?}: {e}"),
        )
    })?;
    check_scheme(&next)?;
    Ok(next)
}

fn classify_transport_error(e: &reqwest::Error) -> FetchFailure {
    let detail = match std::error::Error::source(e) {
        Some(source) => format!("{e}: {source}"),
        None => e.to_string(),
    };

    if e.is_timeout() {
        FetchFailure::new(FailureReason::Timeout, format!("request timed out: {detail}"))
    } else if e.is_connect() {
        FetchFailure::new(
            FailureReason::ConnectionError,
            format!("connection failed: {detail}"),
        )
    } else {
        FetchFailure::new(
            FailureReason::ConnectionError,
            format!("request failed: {detail}"),
        )
    }
}
