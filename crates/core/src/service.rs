use crate::analysis::{AnalysisEngine, AnalysisError, IpoAnalyst};
use crate::cache::{AnalysisCache, AnalysisKey, SnapshotCache};
use crate::config::Settings;
use crate::domain::{AnalysisReport, Category, Snapshot};
use crate::ingest::dashboard::DashboardFetcher;
use crate::ingest::page::HttpPageSource;
use crate::ingest::{FetchError, ListingFetcher};
use crate::llm::gemini::GeminiClient;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no {category} IPO at index {index} ({available} available)")]
pub struct NotFoundError {
    pub category: Category,
    pub index: usize,
    pub available: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Entry point shared by the HTTP surface and the CLI driver.
pub struct IpoService {
    snapshots: SnapshotCache,
    analyses: Arc<AnalysisCache>,
    engine: Arc<dyn AnalysisEngine>,
}

impl IpoService {
    pub fn new(
        fetcher: Arc<dyn ListingFetcher>,
        engine: Arc<dyn AnalysisEngine>,
        ttl: Duration,
    ) -> Self {
        let analyses = Arc::new(AnalysisCache::new());
        Self {
            snapshots: SnapshotCache::new(fetcher, Arc::clone(&analyses), ttl),
            analyses,
            engine,
        }
    }

    /// Wires the dashboard scraper, Gemini client and detail-page enrichment.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let pages = Arc::new(HttpPageSource::from_env()?);
        let fetcher = Arc::new(DashboardFetcher::from_settings(settings, pages.clone()));
        let llm = Arc::new(GeminiClient::from_settings(settings)?);
        let engine = Arc::new(IpoAnalyst::from_env(llm).with_detail_pages(pages));
        Ok(Self::new(fetcher, engine, settings.snapshot_ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.snapshots.ttl()
    }

    pub async fn list_ipos(&self, force_refresh: bool) -> Result<Arc<Snapshot>, FetchError> {
        self.snapshots.get_or_refresh(force_refresh).await
    }

    pub async fn refresh(&self) -> Result<Arc<Snapshot>, FetchError> {
        self.list_ipos(true).await
    }

    pub async fn analyze_ipo(
        &self,
        category: Category,
        index: usize,
    ) -> Result<Arc<AnalysisReport>, ServiceError> {
        let snapshot = self.list_ipos(false).await?;
        let record = snapshot
            .get(category, index)
            .cloned()
            .ok_or_else(|| NotFoundError {
                category,
                index,
                available: snapshot.listings(category).len(),
            })?;

        let key = AnalysisKey {
            snapshot_version: snapshot.version,
            category,
            index,
        };
        let engine = Arc::clone(&self.engine);
        let report = self
            .analyses
            .get_or_compute(key, record, move |record| async move {
                engine.analyze(&record).await
            })
            .await?;
        Ok(report)
    }

    /// Keeps the snapshot warm: every `every`, starting immediately, replaces the snapshot
    /// if it would expire before the next tick.
    pub fn spawn_background_refresh(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.snapshots.refresh_ahead(every).await {
                    Ok(snapshot) => tracing::debug!(
                        version = snapshot.version,
                        total = snapshot.total(),
                        "background refresh check done"
                    ),
                    Err(err) => tracing::warn!(error = %err, "background refresh failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListingRecord, ReportSections};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves scripted snapshots in order, repeating the last one.
    struct ScriptedFetcher {
        script: Mutex<Vec<(Vec<&'static str>, Vec<&'static str>)>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<(Vec<&'static str>, Vec<&'static str>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ListingFetcher for ScriptedFetcher {
        fn source_name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self) -> Result<Snapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let (current, upcoming) = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.remove(0)
                } else {
                    script[0].clone()
                }
            };
            let build = |category, names: Vec<&str>| {
                names
                    .into_iter()
                    .enumerate()
                    .map(|(i, n)| ListingRecord::new(category, i, n))
                    .collect::<Vec<_>>()
            };
            Ok(Snapshot::new(
                build(Category::Current, current),
                build(Category::Upcoming, upcoming),
            ))
        }
    }

    #[derive(Default)]
    struct CountingEngine {
        calls_by_name: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingEngine {
        fn calls_for(&self, name: &str) -> usize {
            self.calls_by_name
                .lock()
                .unwrap()
                .get(name)
                .copied()
                .unwrap_or(0)
        }

        fn total(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl AnalysisEngine for CountingEngine {
        async fn analyze(&self, record: &ListingRecord) -> Result<AnalysisReport, AnalysisError> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self
                .calls_by_name
                .lock()
                .unwrap()
                .entry(record.name.clone())
                .or_default() += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(AnalysisError::ServiceUnavailable("model overloaded".to_string()));
            }
            Ok(AnalysisReport {
                id: uuid::Uuid::new_v4(),
                source_listing_key: record.key(),
                listing: record.clone(),
                sections: ReportSections {
                    verdict: format!("verdict for {}", record.name),
                    ..Default::default()
                },
                raw_analysis: String::new(),
                generated_at: chrono::Utc::now(),
            })
        }
    }

    fn service(
        fetcher: &Arc<ScriptedFetcher>,
        engine: &Arc<CountingEngine>,
        ttl: Duration,
    ) -> Arc<IpoService> {
        Arc::new(IpoService::new(fetcher.clone(), engine.clone(), ttl))
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn listing_is_cached_within_ttl() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A", "B"], vec!["C"])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, HOUR);

        for _ in 0..5 {
            svc.list_ipos(false).await.unwrap();
            tokio::time::advance(Duration::from_secs(600)).await;
        }
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(1200)).await;
        svc.list_ipos(false).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_fetch_once() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A"], vec![])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, HOUR);

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let svc = Arc::clone(&svc);
            set.spawn(async move { svc.refresh().await });
        }
        let mut versions = Vec::new();
        while let Some(res) = set.join_next().await {
            versions.push(res.unwrap().unwrap().version);
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(versions.iter().all(|v| *v == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_analysis_invokes_engine_once() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A", "B"], vec!["C"])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, HOUR);

        let first = svc.analyze_ipo(Category::Current, 0).await.unwrap();
        let second = svc.analyze_ipo(Category::Current, 0).await.unwrap();

        assert_eq!(engine.total(), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(first.sections, second.sections);
        assert_eq!(first.sections.verdict, "verdict for A");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_analysis_of_one_listing_converges() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A"], vec![])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, HOUR);
        svc.list_ipos(false).await.unwrap();

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..6 {
            let svc = Arc::clone(&svc);
            set.spawn(async move { svc.analyze_ipo(Category::Current, 0).await });
        }
        while let Some(res) = set.join_next().await {
            res.unwrap().unwrap();
        }
        assert_eq!(engine.total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_index_is_not_found() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A", "B"], vec!["C"])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, HOUR);

        let err = svc.analyze_ipo(Category::Current, 2).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::NotFound(NotFoundError {
                category: Category::Current,
                index: 2,
                available: 2,
            })
        );
        assert!(matches!(
            svc.analyze_ipo(Category::Upcoming, 7).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(engine.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_analysis_is_retried() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A"], vec!["C", "D", "E"])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, HOUR);

        engine.fail.store(true, Ordering::SeqCst);
        let err = svc.analyze_ipo(Category::Upcoming, 2).await.unwrap_err();
        assert!(matches!(err, ServiceError::Analysis(AnalysisError::ServiceUnavailable(_))));

        let err = svc.analyze_ipo(Category::Upcoming, 2).await.unwrap_err();
        assert!(matches!(err, ServiceError::Analysis(_)));
        assert_eq!(engine.calls_for("E"), 2);

        engine.fail.store(false, Ordering::SeqCst);
        let report = svc.analyze_ipo(Category::Upcoming, 2).await.unwrap();
        assert_eq!(report.listing.name, "E");
        assert_eq!(engine.calls_for("E"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_refresh_invalidates_reordered_analysis() {
        let fetcher = ScriptedFetcher::new(vec![
            (vec!["A", "B"], vec!["C"]),
            (vec!["B", "A"], vec!["C"]),
        ]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, HOUR);

        let before = svc.analyze_ipo(Category::Current, 1).await.unwrap();
        assert_eq!(before.listing.name, "B");
        assert_eq!(engine.calls_for("B"), 1);

        let snapshot = svc.refresh().await.unwrap();
        assert_eq!(snapshot.current[0].name, "B");
        assert_eq!(snapshot.current[1].name, "A");

        let after = svc.analyze_ipo(Category::Current, 1).await.unwrap();
        assert_eq!(after.listing.name, "A");
        assert_eq!(after.sections.verdict, "verdict for A");
        assert_eq!(engine.calls_for("A"), 1);
        assert_eq!(engine.total(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_refresh_invalidates_analysis() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A"], vec![])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, Duration::from_secs(60));

        svc.analyze_ipo(Category::Current, 0).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        svc.analyze_ipo(Category::Current, 0).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(engine.calls_for("A"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh_on_ttl_period_keeps_requests_off_the_fetcher() {
        let fetcher = ScriptedFetcher::new(vec![(vec!["A"], vec![])]);
        let engine = Arc::new(CountingEngine::default());
        let svc = service(&fetcher, &engine, Duration::from_secs(60));

        let handle = svc.spawn_background_refresh(svc.ttl());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fetcher.calls(), 1);

        // Just past the TTL: the tick at 60s has already replaced the snapshot.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.calls(), 2);
        let snapshot = svc.list_ipos(false).await.unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(fetcher.calls(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        svc.list_ipos(false).await.unwrap();
        assert_eq!(fetcher.calls(), 3);
        handle.abort();
    }
}
