//! Registry, scheduler and management API working together.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use dirsync_core::{DocumentIndex, IndexTarget, RawEntry};
use dirsync_engine::{SchedulerState, SourceRegistry, SyncEngine};
use dirsync_server::{AppState, ServerConfig, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::common::{INDEX, OutageIndex, fixture_directory, init_tracing, river_source, target};

fn registry() -> (Arc<SourceRegistry>, Arc<OutageIndex>) {
    init_tracing();
    let index = Arc::new(OutageIndex::default());
    let engine = SyncEngine::new(
        Arc::new(fixture_directory()),
        index.clone() as Arc<dyn DocumentIndex>,
    );
    (Arc::new(SourceRegistry::new(Arc::new(engine))), index)
}

#[tokio::test(start_paused = true)]
async fn registered_source_keeps_the_index_in_sync() {
    let directory = fixture_directory();
    let index = Arc::new(OutageIndex::default());
    let engine = SyncEngine::new(Arc::new(directory.clone()), index.clone());
    let registry = SourceRegistry::new(Arc::new(engine));

    let config = river_source()
        .poll_interval(Duration::from_secs(60))
        .build()
        .unwrap();
    registry.add(config).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(index.inner.count(&target()), 5);
    let status = registry.status("ldapserver0").unwrap();
    assert_eq!(status.state, SchedulerState::Idle);
    assert!(status.next_scan_at.is_some());

    directory.remove("uid=clint,ou=users,ou=system");
    registry.trigger_scan_now("ldapserver0").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let outcome = registry.status("ldapserver0").unwrap().last_outcome.unwrap();
    assert_eq!(outcome.deleted, 1);
    assert_eq!(index.inner.count(&target()), 4);

    // The next poll happens on its own.
    directory.remove("uid=john,ou=users,ou=system");
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(index.inner.count(&target()), 3);
    assert_eq!(registry.status("ldapserver0").unwrap().scans_completed, 3);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn strict_sources_sharing_an_index_stay_isolated() {
    init_tracing();
    let directory = fixture_directory();
    let index = Arc::new(OutageIndex::default());
    let engine = SyncEngine::new(Arc::new(directory.clone()), index.clone());
    let registry = SourceRegistry::new(Arc::new(engine));
    let actors = IndexTarget::new(INDEX, "actor");

    registry
        .add(river_source().poll_interval(Duration::from_secs(3600)).build().unwrap())
        .unwrap();
    registry
        .add(
            river_source()
                .id("actors")
                .filter("(&(objectClass=person)(cn=Clint Eastwood))")
                .target(INDEX, "actor")
                .poll_interval(Duration::from_secs(3600))
                .build()
                .unwrap(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(index.inner.count(&target()), 5);
    assert_eq!(index.inner.ids(&actors), vec!["clint"]);

    // clint leaves the second source's view but stays a person.
    directory.add(
        RawEntry::new("uid=clint,ou=users,ou=system")
            .with_attr("objectClass", ["uidObject", "person", "top"])
            .with_attr("uid", ["clint"])
            .with_attr("cn", ["Clint E."])
            .with_attr("sn", ["clint"]),
    );
    registry.trigger_scan_now("actors").unwrap();
    registry.trigger_scan_now("ldapserver0").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let outcome = registry.status("actors").unwrap().last_outcome.unwrap();
    assert_eq!(outcome.deleted, 1);
    assert_eq!(index.inner.count(&actors), 0);
    let outcome = registry.status("ldapserver0").unwrap().last_outcome.unwrap();
    assert_eq!(outcome.deleted, 0);
    assert_eq!(outcome.updated, 1);
    assert_eq!(index.inner.count(&target()), 5);
    assert_eq!(index.inner.match_field(&target(), "name", "clint"), vec!["clint"]);

    // And the other way round.
    directory.remove("uid=john,ou=users,ou=system");
    directory.add(
        RawEntry::new("uid=clint,ou=users,ou=system")
            .with_attr("objectClass", ["uidObject", "person", "top"])
            .with_attr("uid", ["clint"])
            .with_attr("cn", ["Clint Eastwood"])
            .with_attr("sn", ["clint"]),
    );
    registry.trigger_scan_now("actors").unwrap();
    registry.trigger_scan_now("ldapserver0").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(index.inner.ids(&actors), vec!["clint"]);
    assert_eq!(index.inner.count(&target()), 4);
    assert!(index.inner.get(&target(), "john").is_none());

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn index_outage_keeps_polling() {
    let (registry, index) = registry();
    index.set_down(true);
    registry
        .add(
            river_source()
                .poll_interval(Duration::from_secs(30))
                .build()
                .unwrap(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(45)).await;
    let status = registry.status("ldapserver0").unwrap();
    assert!(status.state.is_running());
    assert_eq!(status.consecutive_failures, 2);

    index.set_down(false);
    tokio::time::sleep(Duration::from_secs(30)).await;
    let status = registry.status("ldapserver0").unwrap();
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(index.inner.count(&target()), 5);

    registry.shutdown().await;
}

async fn call(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test(start_paused = true)]
async fn management_api_reports_scan_outcomes() {
    let (registry, _index) = registry();
    let app = create_router(AppState::new(ServerConfig::default(), registry.clone()));

    let (status, _) = call(
        &app,
        Method::POST,
        "/sources",
        Some(json!({
            "id": "ldapserver0",
            "host": "localhost",
            "port": 9389,
            "bind_dn": "uid=admin,ou=system",
            "credentials": "secret",
            "base_dn": "ou=system",
            "filter": "(objectClass=person)",
            "scope": "",
            "attributes": ["sn", "cn", "objectClass"],
            "fields": ["_id", "name", "groups"],
            "poll_interval_ms": 60000,
            "index": "ldapserver0",
            "doc_kind": "person"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let (status, body) = call(&app, Method::GET, "/sources/ldapserver0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "IDLE");
    assert_eq!(body["last_outcome"]["created"], 5);
    assert_eq!(body["last_outcome"]["status"]["status"], "SUCCEEDED");
    assert!(body.get("credentials").is_none());

    let (status, _) = call(&app, Method::POST, "/sources/ldapserver0/scan", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let (_, body) = call(&app, Method::GET, "/sources/ldapserver0", None).await;
    assert_eq!(body["scans_completed"], 2);
    assert_eq!(body["last_outcome"]["unchanged"], 5);

    let (status, _) = call(&app, Method::DELETE, "/sources/ldapserver0", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::GET, "/sources/ldapserver0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
