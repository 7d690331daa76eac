use crate::analysis::AnalysisError;
use crate::domain::{AnalysisReport, Category, ListingRecord};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Reports are valid only for the snapshot version they were generated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub snapshot_version: u64,
    pub category: Category,
    pub index: usize,
}

type Slot = Arc<Mutex<Option<Arc<AnalysisReport>>>>;

/// Per-key report cache.
///
/// Each key owns an async slot; the first caller to miss holds it while computing, so
/// concurrent misses on one key wait for that result instead of computing their own.
/// Failures are never stored: after one, the next waiter in line computes again.
#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: DashMap<AnalysisKey, Slot>,
    // Keys below this snapshot version are never stored.
    floor: AtomicU64,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: AnalysisKey) -> Slot {
        Arc::clone(self.entries.entry(key).or_default().value())
    }

    /// Returns a finished report without waiting on an in-flight computation.
    pub fn get(&self, key: &AnalysisKey) -> Option<Arc<AnalysisReport>> {
        let slot = self.entries.get(key).map(|e| Arc::clone(e.value()))?;
        let guard = slot.try_lock().ok()?;
        let report = guard.as_ref().map(Arc::clone);
        report
    }

    pub async fn get_or_compute<F, Fut>(
        &self,
        key: AnalysisKey,
        record: ListingRecord,
        compute: F,
    ) -> Result<Arc<AnalysisReport>, AnalysisError>
    where
        F: FnOnce(ListingRecord) -> Fut + Send + 'static,
        Fut: Future<Output = Result<AnalysisReport, AnalysisError>> + Send + 'static,
    {
        if let Some(report) = self.get(&key) {
            tracing::debug!(
                category = %key.category,
                index = key.index,
                version = key.snapshot_version,
                "analysis cache hit"
            );
            return Ok(report);
        }

        let slot = self.slot(key);
        // Checked after inserting so a concurrent invalidation either sees the slot or
        // is seen here.
        if key.snapshot_version < self.floor.load(Ordering::SeqCst) {
            self.entries.remove_if(&key, |_, existing| Arc::ptr_eq(existing, &slot));
            tracing::debug!(
                category = %key.category,
                index = key.index,
                version = key.snapshot_version,
                "snapshot superseded; analysis not cached"
            );
            return compute(record).await.map(Arc::new);
        }

        // The computation runs detached so that a caller going away mid-request still
        // leaves the finished report in the cache.
        let task = tokio::spawn(async move {
            let mut guard = slot.lock_owned().await;
            if let Some(report) = guard.as_ref() {
                return Ok(Arc::clone(report));
            }

            tracing::info!(
                category = %key.category,
                index = key.index,
                version = key.snapshot_version,
                name = %record.name,
                "analysis cache miss; running analysis"
            );
            let report = Arc::new(compute(record).await?);
            *guard = Some(Arc::clone(&report));
            Ok(report)
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(AnalysisError::ServiceUnavailable(format!(
                "analysis task aborted: {err}"
            ))),
        }
    }

    /// Stops caching keys of snapshot versions below `version`.
    pub fn retire_below(&self, version: u64) {
        self.floor.fetch_max(version, Ordering::SeqCst);
    }

    pub fn invalidate_all(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::debug!(dropped, "analysis cache invalidated");
    }

    /// Number of keys holding a finished report.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().try_lock().map(|g| g.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
