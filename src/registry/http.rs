//! HTTP plumbing shared by the registry clients.
//!
//! Every request goes through a small state machine:
//!
//! ```text
//! Idle -> InFlight -> Succeeded
//!            |  ^
//!            v  |
//!      RetryScheduled      (429 / 5xx, attempts left)
//!            |
//!            v
//!          Failed          (other 4xx, transport error, attempts exhausted)
//! ```
//!
//! The wait before retry `n` is `n * retry_delay`. A request that has been
//! sent is never cancelled.

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::HttpSettings;
use crate::error::{Error, Result};

const GITHUB_API_VERSION: &str = "2022-11-28";
const GITHUB_PAGE_SIZE: u32 = 100;

static NEXT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>;\s*rel="next""#).expect("link header regex"));

enum RequestState {
    Idle,
    InFlight { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Succeeded(Response),
    Failed(Error),
}

pub struct HttpClient {
    client: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
    github_token: Option<String>,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings, github_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| Error::Transport {
                url: String::new(),
                source: e,
            })?;

        Ok(Self {
            client,
            max_attempts: settings.max_attempts.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            github_token,
        })
    }

    pub fn has_github_token(&self) -> bool {
        self.github_token.is_some()
    }

    /// Sends a GET request, retrying on 429 and 5xx.
    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Response> {
        let mut state = RequestState::Idle;

        loop {
            state = match state {
                RequestState::Idle => RequestState::InFlight { attempt: 1 },
                RequestState::InFlight { attempt } => {
                    trace!(url, attempt, "GET");
                    match self.client.get(url).headers(headers.clone()).send().await {
                        Ok(response) => self.next_state(url, attempt, response),
                        Err(e) => RequestState::Failed(Error::Transport {
                            url: url.to_string(),
                            source: e,
                        }),
                    }
                }
                RequestState::RetryScheduled { attempt, delay } => {
                    tokio::time::sleep(delay).await;
                    RequestState::InFlight {
                        attempt: attempt + 1,
                    }
                }
                RequestState::Succeeded(response) => return Ok(response),
                RequestState::Failed(error) => return Err(error),
            };
        }
    }

    fn next_state(&self, url: &str, attempt: u32, response: Response) -> RequestState {
        let status = response.status();
        if status.is_success() {
            return RequestState::Succeeded(response);
        }

        if is_retryable(status) && attempt < self.max_attempts {
            let delay = self.retry_delay * attempt;
            warn!(
                url,
                status = status.as_u16(),
                attempt,
                "Retryable HTTP error, retrying in {:?}",
                delay
            );
            return RequestState::RetryScheduled { attempt, delay };
        }

        RequestState::Failed(Error::Http {
            url: url.to_string(),
            status: status.as_u16(),
            attempts: attempt,
        })
    }

    /// Fetches `url` and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let response = self.get(url, &headers).await?;
        decode(url, response).await
    }

    fn github_headers(&self, url: &str, token_required: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );

        match &self.github_token {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    Error::Config("GITHUB_TOKEN contains invalid characters".to_string())
                })?;
                headers.insert(AUTHORIZATION, value);
            }
            None if token_required => {
                return Err(Error::Config(format!(
                    "GITHUB_TOKEN environment variable is required to access {}",
                    url
                )));
            }
            None => {}
        }

        Ok(headers)
    }

    /// Fetches one GitHub API resource.
    ///
    /// Without a token the API allows 60 requests per hour; with one, 5000.
    pub async fn github_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token_required: bool,
    ) -> Result<T> {
        let headers = self.github_headers(url, token_required)?;
        let response = self.get(url, &headers).await?;
        decode(url, response).await
    }

    /// Fetches every page of a GitHub list endpoint by following the `Link`
    /// header's `rel="next"` URL.
    pub async fn github_paginated<T: DeserializeOwned>(
        &self,
        url: &str,
        token_required: bool,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(with_page_size(url, GITHUB_PAGE_SIZE));
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            let headers = self.github_headers(&page_url, token_required)?;
            let response = self.get(&page_url, &headers).await?;

            next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_page_link);

            let body: Value = decode(&page_url, response).await?;
            for item in page_items(&page_url, body)? {
                let item = serde_json::from_value(item).map_err(|e| {
                    Error::Lookup(format!("Unexpected item in {}: {}", page_url, e))
                })?;
                items.push(item);
            }
            pages += 1;
        }

        debug!(url, pages, items = items.len(), "Fetched paginated listing");
        Ok(items)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| Error::Lookup(format!("Invalid JSON from {}: {}", url, e)))
}

fn with_page_size(url: &str, per_page: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}per_page={}", url, separator, per_page)
}

fn next_page_link(header: &str) -> Option<String> {
    NEXT_LINK
        .captures(header)
        .map(|caps| caps[1].to_string())
}

/// A page is either an array, or an object wrapping exactly one array.
fn page_items(url: &str, body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => Ok(items),
                _ => Err(Error::Lookup(format!(
                    "Unexpected response format from {}: expected array or object with single array property",
                    url
                ))),
            }
        }
        _ => Err(Error::Lookup(format!(
            "Unexpected response format from {}: expected array or object",
            url
        ))),
    }
}
