//! End-to-end tests: SQLite queue, HTTP endpoints, full trigger loop.
//!
//! The backend is a local axum server standing in for the ERP: a CSRF
//! endpoint, a submit endpoint that upserts by idempotency key, and a
//! sync-log endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::{watch, Mutex};

use outbox_engine::{
    FlushMetrics, Outbox, OutboxConfig, OutboxEvent, QueueStore, QueuedRecord, SqlQueueStore, Submitted,
};

// =============================================================================
// Mock Backend
// =============================================================================

#[derive(Default)]
struct Backend {
    /// Upserted records by idempotency key
    records: Mutex<HashMap<String, Value>>,
    posts: Mutex<usize>,
    sync_logs: Mutex<Vec<FlushMetrics>>,
    submit_status: AtomicU16,
    session_valid: AtomicBool,
}

const TOKEN: &str = "csrf-abc";

async fn csrf(State(backend): State<Arc<Backend>>) -> (StatusCode, Json<Value>) {
    if backend.session_valid.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({"message": {"csrf_token": TOKEN}})))
    } else {
        (StatusCode::FORBIDDEN, Json(json!({"exc_type": "PermissionError"})))
    }
}

async fn submit(State(backend): State<Arc<Backend>>, headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
    *backend.posts.lock().await += 1;
    if headers.get("X-Frappe-CSRF-Token").and_then(|v| v.to_str().ok()) != Some(TOKEN) {
        return StatusCode::FORBIDDEN;
    }
    let status = StatusCode::from_u16(backend.submit_status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK);
    if status.is_success() {
        let key = headers
            .get("Idempotency-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        backend.records.lock().await.insert(key, body);
    }
    status
}

async fn sync_log(State(backend): State<Arc<Backend>>, Json(metrics): Json<FlushMetrics>) -> StatusCode {
    backend.sync_logs.lock().await.push(metrics);
    StatusCode::OK
}

async fn start_backend() -> (SocketAddr, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    backend.submit_status.store(200, Ordering::SeqCst);
    backend.session_valid.store(true, Ordering::SeqCst);

    let app = Router::new()
        .route("/api/csrf", get(csrf))
        .route("/api/submit", post(submit))
        .route("/api/sync_log", post(sync_log))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, backend)
}

fn config_for(addr: SocketAddr, dir: &TempDir) -> OutboxConfig {
    OutboxConfig {
        db_path: Some(dir.path().join("outbox.db").to_string_lossy().to_string()),
        submit_url: Some(format!("http://{}/api/submit", addr)),
        credential_url: Some(format!("http://{}/api/csrf", addr)),
        sync_log_url: Some(format!("http://{}/api/sync_log", addr)),
        sync_interval_secs: 0,
        send_timeout_ms: 2_000,
        ..OutboxConfig::default()
    }
}

async fn open(config: OutboxConfig, online: bool) -> (Outbox, watch::Sender<bool>, watch::Sender<OutboxConfig>) {
    let (config_tx, config_rx) = watch::channel(config.clone());
    let (online_tx, online_rx) = watch::channel(online);
    let outbox = Outbox::from_config(config, config_rx, online_rx).await.unwrap();
    (outbox, online_tx, config_tx)
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// SQLite Store
// =============================================================================

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");

    {
        let store = SqlQueueStore::open(&path).await.unwrap();
        store.enqueue(&QueuedRecord::from_parts("a", "2026-03-01T10:00:00.000Z", 0, "{}")).await.unwrap();
        store.enqueue(&QueuedRecord::from_parts("b", "2026-03-01T09:00:00.000Z", 2, r#"{"x":1}"#)).await.unwrap();
    }

    let store = SqlQueueStore::open(&path).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
    let oldest = store.oldest(1).await.unwrap();
    assert_eq!(oldest[0].id, "b");
    assert_eq!(oldest[0].retry_count, 2);
    assert_eq!(oldest[0].body, r#"{"x":1}"#);
}

// =============================================================================
// Outbox End To End
// =============================================================================

#[tokio::test]
async fn test_offline_queue_flushes_on_reconnect() {
    let (addr, backend) = start_backend().await;
    let dir = TempDir::new().unwrap();
    let (outbox, online_tx, _cfg) = open(config_for(addr, &dir), false).await;
    let mut events = outbox.subscribe().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = outbox.spawn(shutdown_rx);

    let first = outbox.submit(&json!({"customer": "C-1", "qty": 1})).await.unwrap();
    let second = outbox.enqueue(&json!({"customer": "C-2", "qty": 2})).await.unwrap();
    let Submitted::Queued(first) = first else {
        panic!("offline submit must queue");
    };
    assert_eq!(outbox.pending().await.unwrap(), 2);
    assert_eq!(*backend.posts.lock().await, 0);

    online_tx.send(true).unwrap();
    wait_until(|| async { outbox.pending().await.unwrap() == 0 }).await;

    let records = backend.records.lock().await;
    assert_eq!(records.get(&first).unwrap()["customer"], "C-1");
    assert_eq!(records.get(&second).unwrap()["qty"], 2);
    drop(records);

    // Flushed then Drained, in that order, for the reconnect cycle
    let mut saw_drained = false;
    while let Ok(event) = tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
        if event.unwrap() == OutboxEvent::Drained {
            saw_drained = true;
            break;
        }
    }
    assert!(saw_drained);

    wait_until(|| async { !backend.sync_logs.lock().await.is_empty() }).await;
    let logs = backend.sync_logs.lock().await;
    assert!(logs.iter().any(|m| m.succeeded == 2 && m.queued_after == 0));
    drop(logs);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_online_submit_goes_direct() {
    let (addr, backend) = start_backend().await;
    let dir = TempDir::new().unwrap();
    let (outbox, _online, _cfg) = open(config_for(addr, &dir), true).await;

    let result = outbox.submit(&json!({"customer": "C-9"})).await.unwrap();

    assert_eq!(result, Submitted::Sent { status: 200 });
    assert_eq!(outbox.pending().await.unwrap(), 0);
    assert_eq!(backend.records.lock().await.len(), 1);
}

#[tokio::test]
async fn test_server_errors_accumulate_retries_then_evict() {
    let (addr, backend) = start_backend().await;
    backend.submit_status.store(500, Ordering::SeqCst);
    let dir = TempDir::new().unwrap();
    let config = OutboxConfig { max_retries: Some(2), ..config_for(addr, &dir) };
    let (outbox, _online, _cfg) = open(config, true).await;
    let mut events = outbox.subscribe().unwrap();

    let id = outbox.enqueue(&json!({"n": 1})).await.unwrap();
    let coordinator = outbox.coordinator();

    let m = *coordinator.sync_now().await.metrics().unwrap();
    assert_eq!((m.failed, m.queued_after), (1, 1));
    let m = *coordinator.sync_now().await.metrics().unwrap();
    assert_eq!((m.failed, m.queued_after), (1, 1));
    let m = *coordinator.sync_now().await.metrics().unwrap();
    assert_eq!((m.dropped, m.processed, m.queued_after), (1, 0, 0));

    let mut dropped = None;
    while let Ok(event) = events.try_recv() {
        if let OutboxEvent::Dropped { id, reason } = event {
            dropped = Some((id, reason));
        }
    }
    assert_eq!(dropped, Some((id, outbox_engine::DropReason::Retries)));
    assert!(backend.records.lock().await.is_empty());
}

#[tokio::test]
async fn test_expired_session_keeps_queue_and_notifies() {
    let (addr, backend) = start_backend().await;
    backend.session_valid.store(false, Ordering::SeqCst);
    let dir = TempDir::new().unwrap();
    let (outbox, _online, _cfg) = open(config_for(addr, &dir), true).await;
    let mut events = outbox.subscribe().unwrap();

    // Direct send is refused, record falls back to the queue
    let result = outbox.submit(&json!({"n": 1})).await.unwrap();
    assert!(matches!(result, Submitted::Queued(_)));
    assert_eq!(events.try_recv().unwrap(), OutboxEvent::SessionExpired);

    let outcome = outbox.coordinator().sync_now().await;
    assert!(matches!(outcome, outbox_engine::CycleOutcome::SessionExpired));
    assert_eq!(events.try_recv().unwrap(), OutboxEvent::SessionExpired);
    assert_eq!(outbox.pending().await.unwrap(), 1);
    assert_eq!(*backend.posts.lock().await, 0);

    // After re-login the record goes out with retry_count untouched
    backend.session_valid.store(true, Ordering::SeqCst);
    let outcome = outbox.coordinator().sync_now().await;
    assert_eq!(outcome.metrics().unwrap().succeeded, 1);
    assert_eq!(outbox.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_queue_cap_applies_to_sqlite() {
    let (addr, backend) = start_backend().await;
    backend.submit_status.store(503, Ordering::SeqCst);
    let dir = TempDir::new().unwrap();
    let config = OutboxConfig {
        max_batch_size: Some(2),
        max_queue_size: Some(3),
        sync_on_enqueue: false,
        ..config_for(addr, &dir)
    };
    let (outbox, _online, _cfg) = open(config, true).await;

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(outbox.enqueue(&json!({"n": i})).await.unwrap());
        // Distinct millisecond timestamps keep the order unambiguous
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    let m = *outbox.coordinator().sync_now().await.metrics().unwrap();

    assert_eq!(m.queued_before, 6);
    assert_eq!(m.processed, 2);
    assert_eq!(m.failed, 2);
    assert_eq!(m.queued_after, 3);
    assert_eq!(outbox.pending().await.unwrap(), 3);

    let store = SqlQueueStore::open(dir.path().join("outbox.db")).await.unwrap();
    let mut remaining: Vec<String> = store.get_all().await.unwrap().into_iter().map(|r| r.id).collect();
    remaining.sort();
    let mut newest: Vec<String> = ids[3..].to_vec();
    newest.sort();
    assert_eq!(remaining, newest);
}
