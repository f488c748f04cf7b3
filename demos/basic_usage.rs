// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic outbox usage example.
//!
//! Demonstrates:
//! 1. Opening a SQLite-backed outbox against a local stand-in backend
//! 2. Submitting while offline (records are queued)
//! 3. Coming back online (the queue flushes oldest-first)
//! 4. Watching observer events
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::{get, post}, Json, Router};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};

use outbox_engine::{Outbox, OutboxConfig, OutboxEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           outbox-engine: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Stand-in backend: CSRF token + upsert endpoint
    // ─────────────────────────────────────────────────────────────────────────
    let received: Arc<Mutex<Vec<Value>>> = Arc::default();
    let app = {
        let received = Arc::clone(&received);
        Router::new()
            .route(
                "/api/csrf",
                get(|| async { Json(json!({"message": {"csrf_token": "demo-token"}})) }),
            )
            .route(
                "/api/submit",
                post(move |Json(body): Json<Value>| {
                    let received = Arc::clone(&received);
                    async move {
                        received.lock().await.push(body);
                        StatusCode::OK
                    }
                }),
            )
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    println!("🌐 Backend listening on http://{}", addr);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Open the outbox
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let config = OutboxConfig {
        db_path: Some(dir.path().join("outbox.db").to_string_lossy().to_string()),
        submit_url: Some(format!("http://{}/api/submit", addr)),
        credential_url: Some(format!("http://{}/api/csrf", addr)),
        sync_interval_secs: 0,
        ..Default::default()
    };
    let (_config_tx, config_rx) = watch::channel(config.clone());
    let (online_tx, online_rx) = watch::channel(false);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let outbox = Outbox::from_config(config, config_rx, online_rx).await?;
    let mut events = outbox.subscribe().expect("built from config");
    let loop_handle = outbox.spawn(shutdown_rx);
    println!("✅ Outbox ready (offline)\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Submit while offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("📝 Submitting 5 orders while offline...");
    for i in 1..=5 {
        let result = outbox
            .submit(&json!({"customer": format!("CUST-{:03}", i), "qty": i * 2}))
            .await?;
        println!("   └─ order {} → {:?}", i, result);
    }
    println!("   pending: {}\n", outbox.pending().await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Come back online
    // ─────────────────────────────────────────────────────────────────────────
    println!("📶 Connectivity regained, flushing...");
    online_tx.send(true)?;

    loop {
        match tokio::time::timeout(Duration::from_secs(10), events.recv()).await {
            Ok(Ok(OutboxEvent::Flushed(m))) => println!(
                "   ├─ cycle: processed={} succeeded={} failed={} remaining={}",
                m.processed, m.succeeded, m.failed, m.queued_after
            ),
            Ok(Ok(OutboxEvent::Drained)) => {
                println!("   └─ queue drained");
                break;
            }
            Ok(Ok(other)) => println!("   ├─ {:?}", other),
            Ok(Err(e)) => println!("   ├─ event stream: {}", e),
            Err(_) => {
                println!("   └─ timed out waiting for drain");
                break;
            }
        }
    }
    println!("   backend received {} orders\n", received.lock().await.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("📊 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    shutdown_tx.send(true)?;
    loop_handle.await?;
    println!("\n👋 Done");
    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.4}", samples.len(), sum)
                }
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
