//! Capture session walkthrough.
//!
//! Demonstrates:
//! - Building a monitor with file-backed storage
//! - Starting capture on a tab and issuing both kinds of page requests
//! - Watching live broadcasts from the store owner
//! - Navigating, then reading the restored state
//! - Clearing the log and closing the tab
//!
//! Usage:
//!   cargo run --example capture_session
//!   cargo run --example capture_session -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;
use url::Url;
use xhr_monitor::{
    Broadcast, CallHandle, FetchRequest, InterceptorPhase, LoopbackNetwork, Monitor, PageContext,
    ReadyState, RequestBody, Result, TabId,
};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "xhr_monitor=debug"
    } else {
        "xhr_monitor=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Waits briefly for the page's interceptor to reach `phase`.
async fn wait_for_phase(page: &PageContext, phase: InterceptorPhase) {
    for _ in 0..100 {
        if page.interceptor_phase() == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    println!("      ! Interceptor still {:?}", page.interceptor_phase());
}

async fn run() -> Result<()> {
    println!("=== Capture Session ===\n");

    let dir = tempfile::tempdir()?;
    let monitor = Monitor::builder()
        .file_storage(dir.path().join("captures.json"))
        .build()
        .await?;

    // ========================================================================
    // Open Tab
    // ========================================================================

    let url = Url::parse("https://shop.test/cart").expect("valid url");
    let network = Arc::new(LoopbackNetwork::new(url.clone()));
    network
        .route_json("GET", "/api/cart", &json!({ "items": [{ "sku": "A-1", "qty": 2 }] }))
        .route("POST", "/api/checkout", 201, "created")
        .fail("GET", "/api/offline", "connection refused");

    let tab_id = TabId::new(7).expect("valid tab id");
    let mut session = monitor.open_tab(tab_id, "Shop", url, Arc::clone(&network));
    let inspector = monitor.inspector();
    let mut events = inspector.subscribe();

    println!("[Tab] Opened tab {tab_id}");
    inspector.start_listening(tab_id).await?;
    wait_for_phase(session.page(), InterceptorPhase::Active).await;
    println!("      ✓ Listening\n");

    // ========================================================================
    // Page Requests
    // ========================================================================

    let page = session.page().clone();
    page.fetch(FetchRequest::new("/api/cart?coupon=SPRING")).await.ok();
    page.fetch(FetchRequest::new("/api/offline")).await.ok();

    let call = CallHandle::new();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let done_tx = parking_lot::Mutex::new(Some(done_tx));
    call.set_on_ready_state_change(move |c| {
        if c.ready_state() == ReadyState::Done
            && let Some(tx) = done_tx.lock().take()
        {
            tx.send(c.status()).ok();
        }
    });
    page.open(&call, "post", "/api/checkout").ok();
    page.send(&call, Some(RequestBody::text(r#"{"paid":true}"#))).ok();
    let status = done_rx.await.unwrap_or_default();
    println!("[Page] Checkout answered {status}");

    for _ in 0..2 {
        match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Some(Broadcast::UpdateCount { count, .. })) => println!("[Bus]  updateCount {count}"),
            Ok(Some(other)) => println!("[Bus]  {}", other.action()),
            _ => break,
        }
    }

    // ========================================================================
    // Navigate
    // ========================================================================

    session.navigate(Url::parse("https://shop.test/thanks").expect("valid url"));
    wait_for_phase(session.page(), InterceptorPhase::Active).await;
    let state = inspector.popup_state(tab_id).await?;
    println!(
        "\n[Nav]  listening={} count={} after navigation",
        state.is_listening, state.request_count
    );

    // ========================================================================
    // Inspect, Clear, Close
    // ========================================================================

    let view = inspector.records(Some(tab_id)).await?;
    for record in &view.records {
        println!("       {} {} -> {}", record.method, record.url, record.response.to_text());
    }

    inspector.clear_records(tab_id).await?;
    println!("\n[Log]  Cleared");

    monitor.close_tab(session).await;
    println!("[Tab]  Closed; {} records left", inspector.records(None).await?.records.len());
    println!("\nLoopback served {} requests", network.call_count());
    Ok(())
}
