use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ipo_core::domain::{AnalysisReport, Category, ListingRecord, ParseCategoryError, Snapshot};
use ipo_core::ingest::FetchError;
use ipo_core::service::{IpoService, ServiceError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IpoService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/ipos", get(list_ipos))
        .route("/api/ipo/:category/:index/analyze", get(analyze_ipo))
        .route("/api/refresh", get(refresh))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    refresh: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListingsResponse<'a> {
    success: bool,
    current: &'a [ListingRecord],
    upcoming: &'a [ListingRecord],
    current_count: usize,
    upcoming_count: usize,
    total_count: usize,
    last_updated: DateTime<Utc>,
    version: u64,
}

impl<'a> ListingsResponse<'a> {
    fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            success: true,
            current: &snapshot.current,
            upcoming: &snapshot.upcoming,
            current_count: snapshot.current.len(),
            upcoming_count: snapshot.upcoming.len(),
            total_count: snapshot.total(),
            last_updated: snapshot.fetched_at,
            version: snapshot.version,
        }
    }
}

async fn list_ipos(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let force = query
        .refresh
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let snapshot = state.service.list_ipos(force).await?;
    Ok(Json(ListingsResponse::new(&snapshot)).into_response())
}

#[derive(Debug, Serialize)]
struct AnalysisResponse<'a> {
    success: bool,
    data: &'a AnalysisReport,
}

async fn analyze_ipo(
    State(state): State<AppState>,
    Path((category, index)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let category: Category = category
        .parse()
        .map_err(|err: ParseCategoryError| ApiError::BadRequest(err.to_string()))?;
    let index: usize = index
        .parse()
        .map_err(|_| ApiError::NotFound(format!("invalid {category} index {index:?}")))?;

    let report = state.service.analyze_ipo(category, index).await?;
    Ok(Json(AnalysisResponse {
        success: true,
        data: &report,
    })
    .into_response())
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    success: bool,
    message: String,
    current_count: usize,
    upcoming_count: usize,
    total_count: usize,
    last_updated: DateTime<Utc>,
    version: u64,
}

async fn refresh(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ApiError> {
    let snapshot = state.service.refresh().await?;
    Ok(Json(RefreshResponse {
        success: true,
        message: format!("Refreshed {} IPO listings", snapshot.total()),
        current_count: snapshot.current.len(),
        upcoming_count: snapshot.upcoming.len(),
        total_count: snapshot.total(),
        last_updated: snapshot.fetched_at,
        version: snapshot.version,
    }))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(not_found) => Self::NotFound(not_found.to_string()),
            other => Self::Service(other),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        Self::Service(ServiceError::Fetch(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Service(err) => {
                let status = match &err {
                    ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                    ServiceError::Fetch(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
                    ServiceError::Analysis(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
                    ServiceError::Fetch(_) | ServiceError::Analysis(_) => StatusCode::BAD_GATEWAY,
                };
                let message = err.to_string();
                let err = anyhow::Error::new(err);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(status = status.as_u16(), error = %err, "request failed");
                (status, message)
            }
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use ipo_core::analysis::AnalysisError;
    use axum::http::Request;
    use ipo_core::analysis::AnalysisEngine;
    use ipo_core::domain::ReportSections;
    use ipo_core::ingest::ListingFetcher;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FixedFetcher {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ListingFetcher for FixedFetcher {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self) -> Result<Snapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Network("dashboard unreachable".to_string()));
            }
            Ok(Snapshot::new(
                vec![
                    ListingRecord::new(Category::Current, 0, "Alpha Ltd"),
                    ListingRecord::new(Category::Current, 1, "Gamma Ltd"),
                ],
                vec![ListingRecord::new(Category::Upcoming, 0, "Beta Ltd")],
            ))
        }
    }

    struct StubEngine {
        outcome: Result<(), AnalysisError>,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn ok() -> Self {
            Self {
                outcome: Ok(()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: AnalysisError) -> Self {
            Self {
                outcome: Err(err),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl AnalysisEngine for StubEngine {
        async fn analyze(&self, record: &ListingRecord) -> Result<AnalysisReport, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()?;
            Ok(AnalysisReport {
                id: uuid::Uuid::new_v4(),
                source_listing_key: record.key(),
                listing: record.clone(),
                sections: ReportSections {
                    verdict: format!("verdict for {}", record.name),
                    ..Default::default()
                },
                raw_analysis: "6. Final Verdict: ok".to_string(),
                generated_at: Utc::now(),
            })
        }
    }

    fn app(fetcher: Arc<FixedFetcher>, engine: Arc<StubEngine>) -> Router {
        let service = IpoService::new(fetcher, engine, Duration::from_secs(3600));
        router(AppState {
            service: Arc::new(service),
        })
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        let res = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn lists_ipos_with_counts() {
        let fetcher = Arc::new(FixedFetcher::default());
        let app = app(fetcher.clone(), Arc::new(StubEngine::ok()));

        let (status, body) = get(&app, "/api/ipos").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["current_count"], 2);
        assert_eq!(body["upcoming_count"], 1);
        assert_eq!(body["total_count"], 3);
        assert_eq!(body["current"][1]["name"], "Gamma Ltd");
        assert_eq!(body["upcoming"][0]["category"], "upcoming");
        assert_eq!(body["version"], 1);

        get(&app, "/api/ipos").await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let (_, body) = get(&app, "/api/ipos?refresh=true").await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(body["version"], 2);
    }

    #[tokio::test]
    async fn refresh_route_forces_fetch() {
        let fetcher = Arc::new(FixedFetcher::default());
        let app = app(fetcher.clone(), Arc::new(StubEngine::ok()));

        get(&app, "/api/ipos").await;
        let (status, body) = get(&app, "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["total_count"], 3);
        assert_eq!(body["version"], 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn analyze_returns_report_and_caches_it() {
        let engine = Arc::new(StubEngine::ok());
        let app = app(Arc::new(FixedFetcher::default()), engine.clone());

        let (status, body) = get(&app, "/api/ipo/current/1/analyze").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["listing"]["name"], "Gamma Ltd");
        assert_eq!(body["data"]["sections"]["verdict"], "verdict for Gamma Ltd");

        let (_, again) = get(&app, "/api/ipo/current/1/analyze").await;
        assert_eq!(again["data"]["id"], body["data"]["id"]);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn analyze_rejects_bad_paths() {
        let engine = Arc::new(StubEngine::ok());
        let app = app(Arc::new(FixedFetcher::default()), engine.clone());

        let (status, body) = get(&app, "/api/ipo/upcoming/1/analyze").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("index 1"));

        let (status, _) = get(&app, "/api/ipo/current/abc/analyze").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get(&app, "/api/ipo/closed/0/analyze").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analysis_failures_map_to_gateway_errors() {
        let app_unavailable = app(
            Arc::new(FixedFetcher::default()),
            Arc::new(StubEngine::failing(AnalysisError::ServiceUnavailable(
                "quota exceeded".to_string(),
            ))),
        );
        let (status, body) = get(&app_unavailable, "/api/ipo/current/0/analyze").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);

        let app_timeout = app(
            Arc::new(FixedFetcher::default()),
            Arc::new(StubEngine::failing(AnalysisError::Timeout(Duration::from_secs(120)))),
        );
        let (status, _) = get(&app_timeout, "/api/ipo/current/0/analyze").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn fetch_failure_is_bad_gateway() {
        let fetcher = Arc::new(FixedFetcher::default());
        fetcher.fail.store(true, Ordering::SeqCst);
        let app = app(fetcher, Arc::new(StubEngine::ok()));

        let (status, body) = get(&app, "/api/ipos").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("dashboard unreachable"));
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = app(Arc::new(FixedFetcher::default()), Arc::new(StubEngine::ok()));
        let res = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
