//! Existence and accessibility checks of single (candidate, region) pairs.

use crate::classify::{classify_existence, classify_listing, ExistenceVerdict};
use crate::error::{Result, ScanError};
use crate::url_builder::bucket_urls;
use async_trait::async_trait;
use driftnet_core::{Access, CandidateName, Finding, ProbeConfig, RegionCode, Timestamp};
use reqwest::{redirect, Client};
use std::time::Duration;

/// Classified result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Definitive negative
    NotFound {
        /// Status of the deciding response
        status: u16,
        /// When the probe finished
        checked_at: Timestamp,
    },
    /// Bucket exists but is not anonymously readable (includes buckets whose
    /// access could not be determined)
    Private(Finding),
    /// Bucket is anonymously readable
    Public(Finding),
    /// Nothing definitive was learned; the pair stays unchecked
    TransientError {
        /// Status if the endpoint answered at all
        status: Option<u16>,
        /// Human-readable cause
        reason: String,
        /// When the probe finished
        checked_at: Timestamp,
    },
}

impl ProbeOutcome {
    /// Wrap a finding in the outcome matching its access level.
    #[must_use]
    pub fn from_finding(finding: Finding) -> Self {
        if finding.access.is_public() {
            Self::Public(finding)
        } else {
            Self::Private(finding)
        }
    }

    /// True for [`ProbeOutcome::TransientError`].
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientError { .. })
    }

    /// The finding, for outcomes that have one.
    #[must_use]
    pub fn finding(&self) -> Option<&Finding> {
        match self {
            Self::Private(finding) | Self::Public(finding) => Some(finding),
            Self::NotFound { .. } | Self::TransientError { .. } => None,
        }
    }
}

/// Issues one accessibility check for a pair.
///
/// Implementations must not fail: every network problem is reported as
/// [`ProbeOutcome::TransientError`].
#[async_trait]
pub trait Prober: Send + Sync {
    /// Check `candidate` in `region`, giving each request at most `timeout`.
    async fn probe(
        &self,
        candidate: &CandidateName,
        region: RegionCode,
        timeout: Duration,
    ) -> ProbeOutcome;
}

/// Probe, retrying transient failures up to `config.retries` more times
/// with linear backoff.
pub async fn probe_with_retry(
    prober: &dyn Prober,
    candidate: &CandidateName,
    region: RegionCode,
    config: &ProbeConfig,
) -> ProbeOutcome {
    let mut outcome = prober.probe(candidate, region, config.timeout()).await;

    for attempt in 1..=config.retries {
        if !outcome.is_transient() {
            break;
        }
        let delay = config.retry_delay(attempt);
        tracing::debug!(
            bucket = %candidate,
            %region,
            attempt,
            ?delay,
            "transient probe failure, retrying"
        );
        tokio::time::sleep(delay).await;
        outcome = prober.probe(candidate, region, config.timeout()).await;
    }

    outcome
}

/// Prober over the public HTTPS endpoints.
///
/// Redirects are not followed: a `301` from the existence check is itself
/// proof that the bucket exists in another region.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    timeout: Duration,
    endpoint: Option<String>,
}

impl HttpProber {
    /// Build a prober with the configured timeout and user agent.
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ScanError::Client(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout: config.timeout(),
            endpoint: None,
        })
    }

    /// Send every request to `base` instead of the public endpoints.
    #[must_use]
    pub fn with_endpoint(mut self, base: impl Into<String>) -> Self {
        self.endpoint = Some(base.into());
        self
    }

    /// Status of an anonymous `HEAD` with the configured timeout, or `None`
    /// on a network failure.
    pub async fn head_status(&self, url: &str) -> Option<u16> {
        match self.client.head(url).timeout(self.timeout).send().await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                tracing::debug!(url, error = %e, "HEAD request failed");
                None
            }
        }
    }

    async fn listing_access(&self, url: &str, timeout: Duration) -> Access {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                classify_listing(Some(status), &body)
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "listing request failed");
                classify_listing(None, "")
            }
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(
        &self,
        candidate: &CandidateName,
        region: RegionCode,
        timeout: Duration,
    ) -> ProbeOutcome {
        let urls = bucket_urls(self.endpoint.as_deref(), candidate, region);
        let mut not_found = 0;
        let mut deciding_status = None;
        let mut last_status = None;
        let mut last_reason = String::from("no endpoint answered");

        for url in &urls {
            let status = match self.client.head(url).timeout(timeout).send().await {
                Ok(response) => response.status().as_u16(),
                Err(e) => {
                    last_reason = if e.is_timeout() {
                        format!("timeout: {url}")
                    } else {
                        format!("request failed: {e}")
                    };
                    continue;
                }
            };

            let access = match classify_existence(status) {
                ExistenceVerdict::NotFound => {
                    not_found += 1;
                    if deciding_status.is_none() {
                        deciding_status = Some(status);
                    }
                    continue;
                }
                ExistenceVerdict::Transient => {
                    last_status = Some(status);
                    last_reason = format!("HTTP {status} from {url}");
                    continue;
                }
                ExistenceVerdict::Private => Access::Private,
                ExistenceVerdict::NeedsListing => self.listing_access(url, timeout).await,
            };

            return ProbeOutcome::from_finding(Finding {
                url: url.clone(),
                bucket: candidate.clone(),
                region,
                status,
                access,
                timestamp: Timestamp::now(),
            });
        }

        // Negative only when every endpoint said so.
        match deciding_status {
            Some(status) if not_found == urls.len() => ProbeOutcome::NotFound {
                status,
                checked_at: Timestamp::now(),
            },
            _ => ProbeOutcome::TransientError {
                status: last_status,
                reason: last_reason,
                checked_at: Timestamp::now(),
            },
        }
    }
}
