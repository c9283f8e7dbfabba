//! Paginated, retrying fetcher.
//!
//! ## Page loop
//!
//! 1. Resume from a fresh checkpoint if one exists, else start at page 1.
//! 2. GET `{base}/{endpoint}?page=N&per_page=M` under the [`RetryPolicy`].
//! 3. Stop when the page is undersized, when `X-WP-TotalPages` says it was
//!    the last page, or on a 4xx past page 1 (the "no more pages" signal).
//! 4. Every `checkpoint_every` pages, persist items so far and the next page.
//! 5. On success, delete the checkpoint.
//!
//! After `cooldown_threshold` consecutive failed attempts the fetcher sleeps
//! for the cooldown and probes upstream health before the next attempt.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use sitesync_core::{normalize::normalize_media, MediaRecord, SiteConfig};

use crate::checkpoint::{self, Checkpoint};
use crate::error::FetchError;
use crate::retry::{Attempt, RetryFailure, RetryPolicy};
use crate::state::SyncState;
use crate::transport::{HttpResponse, Transport, TransportError, UreqTransport};

/// Tunables for the page loop.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub per_page: u32,
    pub checkpoint_every: u32,
    pub checkpoint_validity: Duration,
    pub cooldown_threshold: u32,
    pub cooldown: Duration,
    pub probe_attempts: u32,
    pub state_dir: PathBuf,
}

impl FetchOptions {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            per_page: config.per_page,
            checkpoint_every: config.checkpoint.every_pages.max(1),
            checkpoint_validity: config.checkpoint_validity(),
            cooldown_threshold: config.cooldown.threshold,
            cooldown: config.cooldown(),
            probe_attempts: config.cooldown.probe_attempts,
            state_dir: config.state_dir.clone(),
        }
    }
}

/// Why a single request attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    Status(u16),
    Transport(TransportError),
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFailure::Status(status) => write!(f, "HTTP {status}"),
            RequestFailure::Transport(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug)]
enum PageOutcome {
    Items {
        items: Vec<Value>,
        total_pages: Option<u32>,
    },
    End {
        status: u16,
    },
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    base_url: String,
    policy: RetryPolicy,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        policy: RetryPolicy,
        options: FetchOptions,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
            policy,
            options,
        }
    }

    /// Production fetcher over [`UreqTransport`].
    pub fn from_config(config: &SiteConfig) -> Result<Self, FetchError> {
        let base_url = config.require_api_url()?;
        Ok(Self::new(
            Arc::new(UreqTransport::new(config.request_timeout())),
            base_url,
            RetryPolicy::from_settings(&config.retry),
            FetchOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn page_url(&self, endpoint: &str, page: u32) -> String {
        format!(
            "{}/{}?page={}&per_page={}",
            self.base_url, endpoint, page, self.options.per_page
        )
    }

    /// Every item of `endpoint`, in page order.
    pub fn fetch_all(&self, endpoint: &str, state: &mut SyncState) -> Result<Vec<Value>, FetchError> {
        let state_dir = &self.options.state_dir;
        let mut page = 1u32;
        let mut items: Vec<Value> = Vec::new();

        if let Some(saved) = checkpoint::load_fresh(
            state_dir,
            endpoint,
            self.options.per_page,
            self.options.checkpoint_validity,
            Utc::now(),
        )? {
            tracing::info!(
                endpoint,
                next_page = saved.next_page,
                items = saved.items.len(),
                "resuming from checkpoint"
            );
            page = saved.next_page;
            items = saved.items;
            state.resumed.push(endpoint.to_string());
        }

        let mut total_pages: Option<u32> = None;
        loop {
            if matches!(total_pages, Some(total) if page > total) {
                break;
            }
            match self.fetch_page(endpoint, page, state)? {
                PageOutcome::End { status } => {
                    tracing::debug!(endpoint, page, status, "pagination ended by client error");
                    break;
                }
                PageOutcome::Items {
                    items: batch,
                    total_pages: reported,
                } => {
                    let count = batch.len();
                    items.extend(batch);
                    state.pages += 1;
                    state.items += count as u64;
                    if reported.is_some() {
                        total_pages = reported;
                    }
                    tracing::info!(
                        endpoint,
                        page,
                        count,
                        fetched = items.len(),
                        total_pages = ?total_pages,
                        "fetched page"
                    );

                    if count < self.options.per_page as usize {
                        break;
                    }
                    if page % self.options.checkpoint_every == 0 {
                        checkpoint::save(
                            state_dir,
                            &Checkpoint {
                                endpoint: endpoint.to_string(),
                                per_page: self.options.per_page,
                                next_page: page + 1,
                                items: items.clone(),
                                saved_at: Utc::now(),
                            },
                        )?;
                    }
                    page += 1;
                }
            }
        }

        checkpoint::clear(state_dir, endpoint)?;
        Ok(items)
    }

    fn fetch_page(
        &self,
        endpoint: &str,
        page: u32,
        state: &mut SyncState,
    ) -> Result<PageOutcome, FetchError> {
        let url = self.page_url(endpoint, page);
        let response = self.request(&url, endpoint, state).map_err(|failure| match failure {
            RetryFailure::Exhausted { attempts, last } => FetchError::RetriesExhausted {
                endpoint: endpoint.to_string(),
                page,
                attempts,
                last: last.to_string(),
            },
            RetryFailure::Fatal(err) => FetchError::Request {
                endpoint: endpoint.to_string(),
                page,
                reason: err.to_string(),
            },
        })?;

        if response.is_client_error() {
            // Page 1 has no "beyond the last page"; a 4xx there means the
            // collection itself is unavailable.
            if page == 1 {
                return Err(FetchError::Rejected {
                    endpoint: endpoint.to_string(),
                    status: response.status,
                });
            }
            return Ok(PageOutcome::End {
                status: response.status,
            });
        }
        if !response.is_success() {
            return Err(FetchError::Request {
                endpoint: endpoint.to_string(),
                page,
                reason: format!("unexpected status {}", response.status),
            });
        }

        let decode_err = |reason: String| FetchError::Decode {
            endpoint: endpoint.to_string(),
            page,
            reason,
        };
        match serde_json::from_str::<Value>(&response.body) {
            Ok(Value::Array(items)) => Ok(PageOutcome::Items {
                items,
                total_pages: response.total_pages,
            }),
            Ok(other) => Err(decode_err(format!("expected a JSON array, got {}", kind_of(&other)))),
            Err(err) => Err(decode_err(err.to_string())),
        }
    }

    /// Resolve one media item. 4xx means "no such media" and yields `None`.
    pub fn fetch_media(&self, id: u64, state: &mut SyncState) -> Result<Option<MediaRecord>, FetchError> {
        let url = format!("{}/media/{}", self.base_url, id);
        let response = self.request(&url, "media", state).map_err(|failure| FetchError::Request {
            endpoint: "media".to_string(),
            page: 0,
            reason: failure.to_string(),
        })?;
        if !response.is_success() {
            tracing::debug!(id, status = response.status, "media lookup returned no record");
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&response.body).map_err(|err| FetchError::Decode {
            endpoint: "media".to_string(),
            page: 0,
            reason: err.to_string(),
        })?;
        Ok(normalize_media(&value))
    }

    /// One GET under the retry policy. Success and non-retryable statuses are
    /// returned as responses; the caller decides what they mean.
    fn request(
        &self,
        url: &str,
        label: &str,
        state: &mut SyncState,
    ) -> Result<HttpResponse, RetryFailure<RequestFailure>> {
        self.policy.run(
            state,
            |state, attempt| {
                state.requests += 1;
                state.last_fetch_at = Some(Utc::now());
                tracing::debug!(endpoint = label, url, attempt, "GET");
                match self.transport.get(url) {
                    Ok(response) if self.policy.should_retry_status(response.status) => {
                        Attempt::Retry(RequestFailure::Status(response.status))
                    }
                    Ok(response) => {
                        state.consecutive_failures = 0;
                        Attempt::Done(response)
                    }
                    Err(err) if err.is_retryable() => Attempt::Retry(RequestFailure::Transport(err)),
                    Err(err) => Attempt::Fail(RequestFailure::Transport(err)),
                }
            },
            |state, attempt, failure| {
                state.retries += 1;
                state.consecutive_failures += 1;
                tracing::warn!(
                    endpoint = label,
                    url,
                    attempt,
                    error = %failure,
                    "request failed, retrying"
                );
                if self.options.cooldown_threshold > 0
                    && state.consecutive_failures >= self.options.cooldown_threshold
                {
                    self.cool_down(label, state);
                }
            },
        )
    }

    fn cool_down(&self, endpoint: &str, state: &mut SyncState) {
        state.cooldowns += 1;
        tracing::warn!(
            endpoint,
            failures = state.consecutive_failures,
            cooldown_secs = self.options.cooldown.as_secs(),
            "upstream struggling, cooling down"
        );
        sleep(self.options.cooldown);
        for probe in 1..=self.options.probe_attempts {
            state.requests += 1;
            if self.probe(endpoint) {
                tracing::info!(endpoint, probe, "upstream healthy again");
                break;
            }
            tracing::warn!(endpoint, probe, "health probe failed");
            if probe < self.options.probe_attempts {
                sleep(self.options.cooldown);
            }
        }
        state.consecutive_failures = 0;
    }

    /// Cheapest request the endpoint supports; healthy means "not a 5xx".
    pub fn probe(&self, endpoint: &str) -> bool {
        let endpoint = if endpoint == "media" { "posts" } else { endpoint };
        let url = format!("{}/{}?page=1&per_page=1", self.base_url, endpoint);
        matches!(self.transport.get(&url), Ok(response) if response.status < 500)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
