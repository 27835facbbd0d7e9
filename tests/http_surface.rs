//! Router-level tests for the HTTP surface.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use serde_json::{Value, json};
use showcase::application::preload::PreloadAggregator;
use showcase::application::repos::{ContentRepo, RepoError};
use showcase::application::revalidate::NoopRevalidator;
use showcase::cache::{CacheConfig, MemoryStore, ReadThroughCache, TtlPolicy};
use showcase::domain::content::{CampaignList, CategoryStatsReport, SectionConfig, SectionsLayout};
use showcase::domain::types::ContentType;
use showcase::infra::http::{HttpState, build_router};
use showcase::infra::snapshots::{SnapshotStore, SnapshotStoreConfig};
use showcase::sync::{SyncConfig, SyncCoordinator};
use tempfile::TempDir;
use tower::ServiceExt;

struct StaticRepo {
    online: bool,
}

impl StaticRepo {
    fn check(&self) -> Result<(), RepoError> {
        if self.online {
            Ok(())
        } else {
            Err(RepoError::Unavailable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl ContentRepo for StaticRepo {
    async fn homepage_sections(&self) -> Result<SectionsLayout, RepoError> {
        self.check()?;
        Ok(SectionsLayout {
            sections: vec![
                SectionConfig {
                    key: "hero".to_string(),
                    title: None,
                    enabled: true,
                    settings: Value::Null,
                },
                SectionConfig {
                    key: "hidden".to_string(),
                    title: None,
                    enabled: false,
                    settings: Value::Null,
                },
            ],
            section_order: vec!["hero".to_string(), "hidden".to_string()],
        })
    }

    async fn active_campaigns(&self) -> Result<CampaignList, RepoError> {
        self.check()?;
        Ok(CampaignList::default())
    }

    async fn category_stats(&self) -> Result<CategoryStatsReport, RepoError> {
        self.check()?;
        Ok(CategoryStatsReport::default())
    }
}

struct App {
    _dir: TempDir,
    router: Router,
    store: Arc<SnapshotStore>,
}

async fn app(repo_online: bool) -> App {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(
        SnapshotStore::open(SnapshotStoreConfig::new(dir.path()))
            .await
            .expect("open store"),
    );
    let cache = Arc::new(ReadThroughCache::new(
        &CacheConfig::default(),
        Arc::new(MemoryStore::new(NonZeroUsize::new(32).expect("non-zero"))),
    ));
    let coordinator = SyncCoordinator::spawn(
        SyncConfig {
            debounce: Duration::from_secs(60),
        },
        store.clone(),
        cache.clone(),
        Arc::new(NoopRevalidator),
    );
    let aggregator = Arc::new(PreloadAggregator::new(
        Arc::new(StaticRepo {
            online: repo_online,
        }),
        store.clone(),
        cache,
        TtlPolicy::default(),
    ));

    let router = build_router(HttpState {
        aggregator,
        coordinator,
        snapshots: store.clone(),
    });

    App {
        _dir: dir,
        router,
        store,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("request should build");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn queued_update_is_written_by_explicit_flush() {
    let app = app(true).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/sync",
        Some(json!({ "type": "hero", "data": { "slides": [{ "title": "Spring Sale" }] } })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({ "queued": "hero" }));

    let (status, report) = send(&app.router, Method::POST, "/sync/flush", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outcomes"][0]["type"], "hero");
    assert_eq!(report["outcomes"][0]["status"], "written");
    assert_eq!(report["revalidated"], json!(["/"]));

    let document = app.store.load(ContentType::Hero).await.expect("hero written");
    assert_eq!(document.payload["slides"][0]["title"], "Spring Sale");
}

#[tokio::test]
async fn unknown_content_type_is_rejected() {
    let app = app(true).await;

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/sync",
        Some(json!({ "type": "banner", "data": {} })),
    )
    .await;
    assert!(status.is_client_error(), "unexpected status {status}");
}

#[tokio::test]
async fn blank_ui_text_language_is_refused_at_ingress() {
    let app = app(true).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/sync",
        Some(json!({ "type": "ui-text", "data": { "language": " ", "texts": { "cta": "Shop now" } } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_object(), "expected an error report, got {body}");

    let (status, report) = send(&app.router, Method::POST, "/sync/flush", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outcomes"], json!([]));
    assert!(app.store.load(ContentType::UiText).await.is_none());
}

#[tokio::test]
async fn preload_returns_enabled_sections() {
    let app = app(true).await;

    let (status, body) = send(&app.router, Method::GET, "/preload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sections"], json!([{ "key": "hero", "enabled": true }]));
    assert_eq!(body["metadata"]["source"], "database");
    assert_eq!(body["metadata"]["cached"], false);
}

#[tokio::test]
async fn preload_degrades_instead_of_failing() {
    let app = app(false).await;

    let (status, body) = send(&app.router, Method::GET, "/preload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sections"], json!([]));
    assert_eq!(
        body["metadata"]["unavailable"],
        json!(["sections", "campaigns", "categoryStats"])
    );
}

#[tokio::test]
async fn health_reports_snapshots_and_sync_state() {
    let app = app(true).await;

    let (status, body) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync"]["pending"], 0);
    assert_eq!(body["sync"]["debounceMs"], 60_000);
    assert_eq!(
        body["snapshots"]["documents"]
            .as_array()
            .map(|documents| documents.len()),
        Some(ContentType::ALL.len())
    );
}
