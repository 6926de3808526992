//! Configuration lifecycle, install identity and restarts over SQLite.
//!
//! Run with: `cargo test --test lifecycle`

mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use common::*;
use mobana::{
    AttributionOptions, ConfigState, InMemoryStore, Mobana, MobanaConfig, SqliteStore,
};

#[tokio::test]
async fn test_init_requires_credentials() {
    let api = MockApi::new();
    let mobana = coordinator(&api, Arc::new(InMemoryStore::new()));

    assert_eq!(mobana.init(MobanaConfig::new("", "")).await, ConfigState::Unconfigured);
    assert_eq!(mobana.init(MobanaConfig::new("abc123", "")).await, ConfigState::Unconfigured);
    assert_eq!(mobana.init(config()).await, ConfigState::Configured);
    assert_eq!(api.finds(), 0);
}

#[tokio::test]
async fn test_init_creates_install_id_eagerly() {
    let api = MockApi::new();
    let (mobana, store) = configured(&api).await;

    let stored = store.raw("@mobana:install_id").expect("install id persisted by init");
    assert_eq!(mobana.install_id().await, stored);
}

#[tokio::test]
async fn test_reinit_keeps_attribution_cache() {
    let api = MockApi::new();
    api.script_find(vec![Ok(matched_response())]);
    let (mobana, _store) = configured(&api).await;
    mobana.get_attribution(AttributionOptions::default()).await;

    let mut other = config();
    other.endpoint = Some("https://staging.example.com/".into());
    mobana.init(other).await;

    assert_eq!(mobana.endpoint().as_deref(), Some("https://staging.example.com"));
    assert_eq!(mobana.get_attribution(AttributionOptions::default()).await.status(), "matched");
    assert_eq!(api.finds(), 1);
}

#[tokio::test]
async fn test_install_id_stable_across_instances() {
    let api = MockApi::new();
    let store = Arc::new(InMemoryStore::new());

    let first = coordinator(&api, store.clone()).install_id().await;
    let second = coordinator(&api, store.clone()).install_id().await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_install_id_access_agrees() {
    let api = MockApi::new();
    let mobana = coordinator(&api, Arc::new(InMemoryStore::new()));

    let (a, b, c) = tokio::join!(mobana.install_id(), mobana.install_id(), mobana.install_id());
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[tokio::test]
async fn test_reset_isolates_installs() {
    let api = MockApi::new();
    let (mobana, store) = configured(&api).await;
    api.set_conversions_down(true);
    mobana.track_conversion("signup", None, None).await;
    mobana.set_local_data("seen", json!(true)).await;
    let before = mobana.install_id().await;

    mobana.reset().await;

    assert!(store.is_empty());
    let after = mobana.install_id().await;
    assert_ne!(before, after);
    assert!(mobana.local_data().await.is_empty());
}

#[tokio::test]
async fn test_shared_instance_handles_share_state() {
    Mobana::shared().set_local_data("from_first_handle", json!(1)).await;
    let data = Mobana::shared().local_data().await;
    assert_eq!(data.get("from_first_handle"), Some(&json!(1)));
}

#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mobana.db");
    let api = MockApi::new();
    api.script_find(vec![Ok(matched_response())]);

    let (install_id, original) = {
        let store = Arc::new(SqliteStore::open(&path).await.unwrap());
        let mobana = coordinator(&api, store.clone());
        mobana.init(config()).await;
        let result = mobana.get_attribution(AttributionOptions::default()).await;
        mobana.set_local_data("onboarded", json!(true)).await;

        api.set_conversions_down(true);
        mobana.track_conversion("purchase", Some(4.5), None).await;
        api.set_conversions_down(false);

        let install_id = mobana.install_id().await;
        store.close().await;
        (install_id, result)
    };

    let store = Arc::new(SqliteStore::open(&path).await.unwrap());
    let mobana = coordinator(&api, store.clone());
    mobana.init(config()).await;

    assert_eq!(mobana.install_id().await, install_id);
    assert_eq!(mobana.get_attribution(AttributionOptions::default()).await, original);
    assert_eq!(mobana.local_data().await.get("onboarded"), Some(&json!(true)));
    assert_eq!(api.finds(), 1);

    let sent = api.sent_conversions.lock().clone();
    assert_eq!(sent.len(), 1, "queued conversion delivered by init after restart");
    assert_eq!(sent[0].name, "purchase");
    assert_eq!(sent[0].install_id, install_id);
}
