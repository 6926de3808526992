// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic Mobana usage example.
//!
//! Demonstrates:
//! 1. Building a coordinator over a SQLite store
//! 2. Configuring it and resolving attribution
//! 3. Tracking conversions (queued when the service is unreachable)
//! 4. Presenting a flow through a console presenter
//! 5. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! MOBANA_APP_ID=abc123 MOBANA_APP_KEY=secret cargo run --example basic_usage
//! ```
//!
//! Set `MOBANA_ENDPOINT` to point at a local server. Without one the default
//! endpoint is used; if it is unreachable every call degrades gracefully.

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

use mobana::{
    AttributionOptions, AttributionResult, DeviceInfo, FlowOptions, FlowPresenter, FlowRequest,
    FlowResolver, FlowResult, Mobana, MobanaConfig, Platform, SqliteStore, StaticDevice,
};

/// Prints the flow instead of rendering it, then completes it.
struct ConsolePresenter;

impl FlowPresenter for ConsolePresenter {
    fn present(&self, request: FlowRequest, resolver: FlowResolver) {
        println!(
            "   └─ Presenting '{}' v{} ({} bytes of HTML)",
            request.slug,
            request.content.version_id,
            request.content.html.len()
        );
        let session_id = request.session_id().to_string();
        resolver.resolve(FlowResult::completed(session_id, Some(json!({"demo": true}))));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mobana=info")),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║              mobana: Basic Usage Example                      ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Build the coordinator
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("mobana.db");
    println!("📦 Opening durable store at {}", db_path.display());
    let store = Arc::new(SqliteStore::open(&db_path).await?);

    let mobana = Mobana::builder()
        .store(store.clone())
        .device(Arc::new(StaticDevice(DeviceInfo {
            platform: Platform::Ios,
            timezone: "Europe/London".into(),
            screen_width: 390,
            screen_height: 844,
            language: "en-GB".into(),
        })))
        .build();
    mobana.set_flow_presenter(Arc::new(ConsolePresenter));

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Configure and resolve attribution
    // ─────────────────────────────────────────────────────────────────────────
    let mut config = MobanaConfig::new(
        std::env::var("MOBANA_APP_ID").unwrap_or_else(|_| "demo".into()),
        std::env::var("MOBANA_APP_KEY").unwrap_or_else(|_| "demo-key".into()),
    );
    config.endpoint = std::env::var("MOBANA_ENDPOINT").ok();
    config.timeout_ms = 3_000;

    println!("\n🚀 init → {:?}", mobana.init(config).await);
    println!("   └─ endpoint:   {}", mobana.endpoint().unwrap_or_default());
    println!("   └─ install id: {}", mobana.install_id().await);

    println!("\n🔍 Resolving attribution...");
    match mobana.get_attribution(AttributionOptions::default()).await {
        AttributionResult::Matched { attribution } => println!(
            "   └─ matched: source={:?} campaign={:?} confidence={:.2}",
            attribution.utm_source, attribution.utm_campaign, attribution.confidence
        ),
        AttributionResult::NoMatch => println!("   └─ organic install"),
        AttributionResult::Error { error } => println!("   └─ not resolved yet: {}", error),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Conversions
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Tracking conversions...");
    mobana.track_conversion("signup", None, None).await;
    mobana.track_conversion("purchase", Some(9.99), None).await;

    let flushed = mobana.flush_conversions().await;
    println!(
        "   └─ retry flush: {} queued, {} delivered, {} still pending",
        flushed.total, flushed.succeeded, flushed.failed
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Flows
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🖼️  Starting flow 'onboarding'...");
    let result = mobana.start_flow("onboarding", FlowOptions::default()).await;
    match result.error {
        Some(error) => println!("   └─ flow not shown: {}", error),
        None => println!("   └─ completed={} data={:?}", result.completed, result.data),
    }

    mobana.set_local_data("onboarding_seen", json!(true)).await;
    println!("   └─ local data: {}", serde_json::Value::Object(mobana.local_data().await));

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics and cleanup
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    mobana.reset().await;
    store.close().await;

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, sorted by name.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key
                .labels()
                .map(|l| format!("{}={}", l.key(), l.value()))
                .collect();
            let label_str = if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            };
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
