use crate::cache::analysis::AnalysisCache;
use crate::domain::Snapshot;
use crate::ingest::{FetchError, ListingFetcher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Cached {
    snapshot: Arc<Snapshot>,
    refreshed_at: Instant,
}

struct Inner {
    fetcher: Arc<dyn ListingFetcher>,
    analyses: Arc<AnalysisCache>,
    ttl: Duration,
    current: RwLock<Option<Cached>>,
    // Bumped after every finished fetch attempt, successful or not.
    attempts: AtomicU64,
    // Held for the whole fetch; stores the outcome of the latest attempt.
    last_outcome: Mutex<Option<Result<Arc<Snapshot>, FetchError>>>,
}

impl Inner {
    /// The stored snapshot if it stays within the TTL for at least `lead` longer.
    async fn fresh(&self, lead: Duration) -> Option<Arc<Snapshot>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| c.refreshed_at.elapsed() + lead <= self.ttl)
            .map(|c| Arc::clone(&c.snapshot))
    }

    async fn refresh(
        &self,
        observed: u64,
        force: bool,
        lead: Duration,
    ) -> Result<Arc<Snapshot>, FetchError> {
        let mut last = self.last_outcome.lock().await;

        // Another attempt finished while this caller waited for the lock: share it.
        if self.attempts.load(Ordering::Acquire) != observed {
            if let Some(outcome) = last.as_ref() {
                return outcome.clone();
            }
        }
        if !force {
            if let Some(snapshot) = self.fresh(lead).await {
                return Ok(snapshot);
            }
        }

        let started = Instant::now();
        let outcome = match self.fetcher.fetch().await {
            Ok(fetched) => {
                let mut current = self.current.write().await;
                let version = current.as_ref().map_or(1, |c| c.snapshot.version + 1);
                let snapshot = Arc::new(fetched.with_version(version));
                // Retire older analyses while the new snapshot is still unreadable.
                self.analyses.retire_below(version);
                self.analyses.invalidate_all();
                *current = Some(Cached {
                    snapshot: Arc::clone(&snapshot),
                    refreshed_at: Instant::now(),
                });
                drop(current);

                tracing::info!(
                    source = self.fetcher.source_name(),
                    version,
                    force,
                    current = snapshot.current.len(),
                    upcoming = snapshot.upcoming.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "snapshot refreshed"
                );
                Ok(snapshot)
            }
            Err(err) => {
                tracing::warn!(
                    source = self.fetcher.source_name(),
                    force,
                    error = %err,
                    "snapshot refresh failed"
                );
                Err(err)
            }
        };

        *last = Some(outcome.clone());
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }
}

/// Holds the current snapshot and decides when to fetch a new one.
///
/// Refreshes are single-flight: callers that overlap an in-progress fetch receive its
/// outcome. The fetch runs in its own task so a cancelled caller does not abort it.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<Inner>,
}

impl SnapshotCache {
    pub fn new(
        fetcher: Arc<dyn ListingFetcher>,
        analyses: Arc<AnalysisCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                analyses,
                ttl,
                current: RwLock::new(None),
                attempts: AtomicU64::new(0),
                last_outcome: Mutex::new(None),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// The stored snapshot, however old, without triggering a fetch.
    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        let current = self.inner.current.read().await;
        current.as_ref().map(|c| Arc::clone(&c.snapshot))
    }

    pub async fn get_or_refresh(&self, force: bool) -> Result<Arc<Snapshot>, FetchError> {
        self.refresh_with(force, Duration::ZERO).await
    }

    /// Refreshes when the snapshot would go stale within `lead`, so a scheduled caller
    /// can replace it before any request finds it expired.
    pub async fn refresh_ahead(&self, lead: Duration) -> Result<Arc<Snapshot>, FetchError> {
        self.refresh_with(false, lead).await
    }

    async fn refresh_with(&self, force: bool, lead: Duration) -> Result<Arc<Snapshot>, FetchError> {
        let observed = self.inner.attempts.load(Ordering::Acquire);
        if !force {
            if let Some(snapshot) = self.inner.fresh(lead).await {
                return Ok(snapshot);
            }
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.refresh(observed, force, lead).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(FetchError::Network(format!("refresh task aborted: {err}"))),
        }
    }
}
