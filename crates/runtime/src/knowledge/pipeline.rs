//! Bounded-parallel fetch fan-out
//!
//! Resolves the top-ranked catalog APIs (or explicit endpoints) to
//! URLs, screens them through the SSRF guard and per-host rate limiter,
//! then fetches with a fixed-width semaphore under per-request and
//! whole-run deadlines. Results that miss the outer deadline are
//! discarded and recorded as timeouts.

use crate::catalog::select_relevant_apis;
use crate::config::Config;
use crate::knowledge::{score_confidence, synthesize, ApiFetchResult, SynthesisResult};
use crate::security::{RateLimiter, SsrfGuard};
use crate::types::{FetchFailure, KnowledgeError, Role};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::header::ACCEPT;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use url::Url;

/// Catalog picks attempted per knowledge run.
const N_FETCH: usize = 3;

/// Raw transport outcome, before confidence scoring.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Response { status: u16, body: String },
    Failed(FetchFailure),
}

/// Transport seam. The production implementation is reqwest-backed;
/// tests substitute canned responders.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// reqwest-backed fetcher with a hard body cap.
pub struct HttpContentFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpContentFetcher {
    pub fn new(config: &Config) -> Result<Self, KnowledgeError> {
        Self::with_headers(config, &[])
    }

    /// Build a fetcher sending extra default headers on every request.
    /// Invalid header names or values are rejected up front.
    pub fn with_headers(
        config: &Config,
        headers: &[(String, String)],
    ) -> Result<Self, KnowledgeError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (name, value) in headers {
            let name: reqwest::header::HeaderName = name
                .parse()
                .map_err(|_| KnowledgeError::ClientBuild(format!("bad header name: {name}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|_| KnowledgeError::ClientBuild(format!("bad value for header {name}")))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .default_headers(header_map)
            .build()
            .map_err(|e| KnowledgeError::ClientBuild(e.to_string()))?;
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self
            .client
            .get(url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return FetchOutcome::Failed(FetchFailure::Timeout),
            Err(e) => return FetchOutcome::Failed(FetchFailure::Network(e.to_string())),
        };

        let status = response.status().as_u16();
        let mut response = response;
        let mut body: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = self.max_body_bytes.saturating_sub(body.len());
                    if room == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
                Ok(None) => break,
                Err(e) if e.is_timeout() => {
                    return FetchOutcome::Failed(FetchFailure::Timeout)
                }
                Err(e) => return FetchOutcome::Failed(FetchFailure::Network(e.to_string())),
            }
        }

        FetchOutcome::Response {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }
}

/// One URL queued for fetching, labeled by its hostname.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub source: String,
    pub url: String,
}

/// The auto-connection pipeline (C5).
pub struct AutoConnectionPipeline {
    fetcher: Arc<dyn ContentFetcher>,
    guard: SsrfGuard,
    limiter: Arc<RateLimiter>,
    config: Config,
}

impl AutoConnectionPipeline {
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self, KnowledgeError> {
        let fetcher = Arc::new(HttpContentFetcher::new(config)?);
        Ok(Self::with_fetcher(config, limiter, fetcher))
    }

    pub fn with_fetcher(
        config: &Config,
        limiter: Arc<RateLimiter>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            fetcher,
            guard: SsrfGuard::from_config(config),
            limiter,
            config: config.clone(),
        }
    }

    /// Discover sources for the objective and role, fetch and
    /// synthesize. Never fails: empty or fully-blocked runs come back
    /// as a zero-confidence fallback synthesis.
    pub async fn run(&self, objective: &str, role: Role) -> SynthesisResult {
        let started = Instant::now();
        let targets: Vec<FetchTarget> = select_relevant_apis(objective, role, N_FETCH)
            .into_iter()
            .map(|scored| FetchTarget {
                source: hostname_of(&scored.api.url).unwrap_or_else(|| scored.api.name.clone()),
                url: scored.api.url,
            })
            .collect();

        let results = self.fetch_all(targets).await;
        synthesize(
            objective,
            &results,
            self.config.knowledge_confidence_threshold,
            started.elapsed().as_millis() as u64,
        )
    }

    /// Fetch explicitly supplied endpoints instead of discovering them.
    pub async fn run_with_endpoints(&self, objective: &str, urls: &[String]) -> SynthesisResult {
        let started = Instant::now();
        let targets: Vec<FetchTarget> = urls
            .iter()
            .map(|url| FetchTarget {
                source: hostname_of(url).unwrap_or_else(|| url.clone()),
                url: url.clone(),
            })
            .collect();

        let results = self.fetch_all(targets).await;
        synthesize(
            objective,
            &results,
            self.config.knowledge_confidence_threshold,
            started.elapsed().as_millis() as u64,
        )
    }

    /// Screen targets and fetch the survivors with bounded concurrency.
    pub async fn fetch_all(&self, targets: Vec<FetchTarget>) -> Vec<ApiFetchResult> {
        let mut results = Vec::with_capacity(targets.len());
        let mut runnable = Vec::new();

        for target in targets {
            let Some(sanitized) = self.guard.validate_and_sanitize(&target.url) else {
                tracing::warn!(source = %target.source, "url rejected by ssrf guard");
                results.push(ApiFetchResult::failure(
                    target.source,
                    0,
                    FetchFailure::SsrfBlocked.to_string(),
                ));
                continue;
            };

            let host = hostname_of(&sanitized).unwrap_or_else(|| target.source.clone());
            if !self.limiter.can_make_request(
                &host,
                self.config.rate_limit_requests_per_minute,
                self.config.rate_limit_window(),
            ) {
                tracing::debug!(source = %target.source, "per-host rate limit exceeded");
                results.push(ApiFetchResult::failure(
                    target.source,
                    0,
                    FetchFailure::RateLimited.to_string(),
                ));
                continue;
            }

            runnable.push(FetchTarget {
                source: target.source,
                url: sanitized,
            });
        }

        if runnable.is_empty() {
            return results;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.knowledge_max_concurrency));
        let deadline = Instant::now() + self.config.request_timeout();
        let mut pending: HashSet<String> = runnable.iter().map(|t| t.source.clone()).collect();

        let mut in_flight = FuturesUnordered::new();
        for target in runnable {
            in_flight.push(self.fetch_one(target, Arc::clone(&semaphore)));
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, in_flight.next()).await {
                Ok(Some(result)) => {
                    pending.remove(&result.source);
                    results.push(result);
                }
                Ok(None) => break,
                Err(_) => {
                    // Phase budget exhausted: whatever is still running
                    // is discarded and reported as timed out.
                    for source in pending.drain() {
                        results.push(ApiFetchResult::failure(
                            source,
                            self.config.knowledge_timeout_ms,
                            FetchFailure::Timeout.to_string(),
                        ));
                    }
                    break;
                }
            }
        }

        results
    }

    async fn fetch_one(&self, target: FetchTarget, semaphore: Arc<Semaphore>) -> ApiFetchResult {
        let permit = match semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => {
                return ApiFetchResult::failure(
                    target.source,
                    0,
                    FetchFailure::Network("fetch pool closed".to_string()).to_string(),
                )
            }
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.request_timeout(),
            self.fetcher.fetch(&target.url),
        )
        .await;
        drop(permit);
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => ApiFetchResult::failure(
                target.source,
                duration_ms,
                FetchFailure::Timeout.to_string(),
            ),
            Ok(FetchOutcome::Failed(reason)) => {
                ApiFetchResult::failure(target.source, duration_ms, reason.to_string())
            }
            Ok(FetchOutcome::Response { status, body }) => {
                let data: String = body
                    .chars()
                    .take(self.config.knowledge_max_response_size)
                    .collect();
                let confidence = score_confidence(status, data.chars().count(), duration_ms);
                let success = (200..300).contains(&status);
                ApiFetchResult {
                    source: target.source,
                    data,
                    confidence,
                    success,
                    duration_ms,
                    error: if success {
                        None
                    } else {
                        Some(FetchFailure::Http { status }.to_string())
                    },
                }
            }
        }
    }
}

fn hostname_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
