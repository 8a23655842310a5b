//! Automatic thumbnail fetching with a failure budget.
//!
//! A caller that refreshes the artwork preview whenever the current
//! content changes feeds each attempt through [`ThumbnailFetchPolicy`].
//! Store artwork is often DRM protected and yields nothing, which maps to
//! a placeholder rather than a failure. Repeated timeouts on other
//! content switch automatic fetching off until re-enabled.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::art::ArtClient;
use crate::error::ArtError;

/// Overall budget for one automatic fetch.
pub const FETCH_BUDGET: Duration = Duration::from_secs(20);

/// Consecutive timeouts that disable automatic fetching.
pub const MAX_TIMEOUTS: u32 = 3;

/// Prefix of purchased store artwork.
const STORE_IMAGE_PREFIX: &str = "SAM-S";

/// What to show after a fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchVerdict {
    UseThumbnail,
    UsePlaceholder,
    KeepPrevious,
    /// This attempt pushed the timeout count over the limit.
    AutoFetchDisabled,
}

/// Result of one attempt as seen by the policy.
#[derive(Debug, Clone, Copy)]
pub enum FetchOutcome<'a> {
    Data(&'a [u8]),
    TimedOut,
    Failed,
}

impl<'a> From<&'a Result<Vec<u8>, ArtError>> for FetchOutcome<'a> {
    fn from(result: &'a Result<Vec<u8>, ArtError>) -> Self {
        match result {
            Ok(bytes) => Self::Data(bytes),
            Err(ArtError::Empty(_)) => Self::Data(&[]),
            Err(e) if e.is_timeout() => Self::TimedOut,
            Err(_) => Self::Failed,
        }
    }
}

#[derive(Debug)]
pub struct ThumbnailFetchPolicy {
    enabled: bool,
    timeouts: u32,
}

impl Default for ThumbnailFetchPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            timeouts: 0,
        }
    }
}

impl ThumbnailFetchPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-enables automatic fetching and clears the timeout count.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.timeouts = 0;
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.timeouts
    }

    pub fn record(&mut self, content_id: &str, outcome: FetchOutcome<'_>) -> FetchVerdict {
        let store = content_id.starts_with(STORE_IMAGE_PREFIX);
        match outcome {
            FetchOutcome::Data(bytes) if bytes.len() > 1 => {
                self.timeouts = 0;
                FetchVerdict::UseThumbnail
            }
            FetchOutcome::Data(bytes) => {
                debug!(content_id, bytes = bytes.len(), "no thumbnail data, using placeholder");
                FetchVerdict::UsePlaceholder
            }
            FetchOutcome::TimedOut => {
                self.timeouts += 1;
                warn!(
                    content_id,
                    failures = self.timeouts,
                    max = MAX_TIMEOUTS,
                    "thumbnail fetch timed out"
                );
                if store {
                    FetchVerdict::UsePlaceholder
                } else if self.timeouts >= MAX_TIMEOUTS {
                    if self.enabled {
                        warn!(failures = self.timeouts, "disabling automatic thumbnail fetch");
                    }
                    self.enabled = false;
                    FetchVerdict::AutoFetchDisabled
                } else {
                    FetchVerdict::KeepPrevious
                }
            }
            FetchOutcome::Failed if store => FetchVerdict::UsePlaceholder,
            FetchOutcome::Failed => FetchVerdict::KeepPrevious,
        }
    }

    /// Fetches `content_id` within [`FETCH_BUDGET`] and classifies the
    /// result. Returns the bytes only with [`FetchVerdict::UseThumbnail`].
    pub async fn fetch(
        &mut self,
        client: &ArtClient,
        content_id: &str,
    ) -> (FetchVerdict, Option<Vec<u8>>) {
        self.fetch_within(client, content_id, FETCH_BUDGET).await
    }

    pub async fn fetch_within(
        &mut self,
        client: &ArtClient,
        content_id: &str,
        budget: Duration,
    ) -> (FetchVerdict, Option<Vec<u8>>) {
        info!(content_id, "fetching thumbnail");
        let result = match tokio::time::timeout(budget, client.fetch_thumbnail(content_id)).await {
            Ok(result) => result,
            Err(_) => {
                let verdict = self.record(content_id, FetchOutcome::TimedOut);
                return (verdict, None);
            }
        };
        if let Err(e) = &result {
            debug!(content_id, error = %e, "thumbnail fetch failed");
        }
        let verdict = self.record(content_id, FetchOutcome::from(&result));
        match (verdict, result) {
            (FetchVerdict::UseThumbnail, Ok(bytes)) => (verdict, Some(bytes)),
            _ => (verdict, None),
        }
    }
}
