//! Shared fixtures for integration tests.
//!
//! - [`MockApi`]: scripted [`RemoteApi`] with call counters and a gate that
//!   holds `find` requests open
//! - [`FailingStore`]: error injection over an [`InMemoryStore`]
//! - [`GatedStore`]: holds reads of one key open
//! - [`RecordingPresenter`]: records flow requests and resolves them

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;

use mobana::{
    ApiError, ApiResult, ConversionEvent, ConversionResponse, DurableStore, FindRequest,
    FindResponse, FlowEventRequest, FlowPresenter, FlowRequest, FlowResolver, FlowResponse,
    FlowResult, InMemoryStore, Mobana, MobanaConfig, RemoteApi, StorageError,
};

// =============================================================================
// Mock Remote API
// =============================================================================

pub struct MockApi {
    pub find_calls: AtomicUsize,
    pub conversion_calls: AtomicUsize,
    pub flow_calls: AtomicUsize,
    pub event_calls: AtomicUsize,

    /// Answers for `find`, consumed in order; the last one repeats
    find_script: Mutex<VecDeque<ApiResult<FindResponse>>>,
    /// Answers for `fetch_flow`, consumed in order; the last one repeats
    flow_script: Mutex<VecDeque<ApiResult<FlowResponse>>>,

    /// Every conversion fails while set
    conversions_down: AtomicBool,
    /// Conversions with these names fail
    failing_names: Mutex<HashSet<String>>,

    pub find_requests: Mutex<Vec<FindRequest>>,
    pub sent_conversions: Mutex<Vec<ConversionEvent>>,
    /// `(slug, versionId)` per flow fetch
    pub flow_requests: Mutex<Vec<(String, Option<String>)>>,
    pub flow_events: Mutex<Vec<FlowEventRequest>>,

    /// `find` waits while this is false
    gate: watch::Sender<bool>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            find_calls: AtomicUsize::new(0),
            conversion_calls: AtomicUsize::new(0),
            flow_calls: AtomicUsize::new(0),
            event_calls: AtomicUsize::new(0),
            find_script: Mutex::new(VecDeque::from([Ok(no_match_response())])),
            flow_script: Mutex::new(VecDeque::from([Err(ApiError::Network("offline".into()))])),
            conversions_down: AtomicBool::new(false),
            failing_names: Mutex::new(HashSet::new()),
            find_requests: Mutex::new(Vec::new()),
            sent_conversions: Mutex::new(Vec::new()),
            flow_requests: Mutex::new(Vec::new()),
            flow_events: Mutex::new(Vec::new()),
            gate: watch::Sender::new(true),
        })
    }

    pub fn script_find(&self, responses: Vec<ApiResult<FindResponse>>) {
        *self.find_script.lock() = responses.into();
    }

    pub fn script_flow(&self, responses: Vec<ApiResult<FlowResponse>>) {
        *self.flow_script.lock() = responses.into();
    }

    pub fn set_conversions_down(&self, down: bool) {
        self.conversions_down.store(down, Ordering::SeqCst);
    }

    pub fn fail_conversion(&self, name: &str) {
        self.failing_names.lock().insert(name.to_string());
    }

    /// Hold `find` requests open until [`MockApi::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn finds(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn conversions(&self) -> usize {
        self.conversion_calls.load(Ordering::SeqCst)
    }

    pub fn flows(&self) -> usize {
        self.flow_calls.load(Ordering::SeqCst)
    }

    fn next<T: Clone>(script: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut script = script.lock();
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn find(&self, request: &FindRequest, _timeout: Duration) -> ApiResult<FindResponse> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.find_requests.lock().push(request.clone());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        Self::next(&self.find_script).unwrap_or_else(|| Ok(no_match_response()))
    }

    async fn send_conversion(
        &self,
        event: &ConversionEvent,
        _timeout: Duration,
    ) -> ApiResult<ConversionResponse> {
        self.conversion_calls.fetch_add(1, Ordering::SeqCst);
        if self.conversions_down.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".into()));
        }
        if self.failing_names.lock().contains(&event.name) {
            return Err(ApiError::Server { status: 503 });
        }
        self.sent_conversions.lock().push(event.clone());
        Ok(ConversionResponse { success: true })
    }

    async fn fetch_flow(
        &self,
        slug: &str,
        _install_id: &str,
        version_id: Option<&str>,
        _timeout: Duration,
    ) -> ApiResult<FlowResponse> {
        self.flow_calls.fetch_add(1, Ordering::SeqCst);
        self.flow_requests
            .lock()
            .push((slug.to_string(), version_id.map(str::to_string)));
        Self::next(&self.flow_script).unwrap_or_else(|| Err(ApiError::Network("offline".into())))
    }

    async fn track_flow_event(
        &self,
        _slug: &str,
        event: &FlowEventRequest,
        _timeout: Duration,
    ) -> ApiResult<()> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.flow_events.lock().push(event.clone());
        Ok(())
    }
}

// =============================================================================
// Response builders
// =============================================================================

pub fn matched_response() -> FindResponse {
    FindResponse {
        matched: Some(true),
        attribution: Some(json!({"utm_source": "google"})),
        confidence: Some(0.75),
    }
}

pub fn no_match_response() -> FindResponse {
    FindResponse {
        matched: Some(false),
        attribution: None,
        confidence: None,
    }
}

pub fn fresh_flow(version: &str, html: &str) -> FlowResponse {
    FlowResponse {
        version_id: Some(version.to_string()),
        html: Some(html.to_string()),
        ..Default::default()
    }
}

pub fn cached_flow_response() -> FlowResponse {
    FlowResponse {
        cached: Some(true),
        ..Default::default()
    }
}

pub fn flow_error(code: &str) -> FlowResponse {
    FlowResponse {
        error: Some(code.to_string()),
        ..Default::default()
    }
}

// =============================================================================
// Coordinators
// =============================================================================

/// Valid config without the background lookup, so tests control call counts.
pub fn config() -> MobanaConfig {
    let mut config = MobanaConfig::new("abc123", "secret");
    config.auto_attribute = false;
    config
}

pub fn coordinator(api: &Arc<MockApi>, store: Arc<dyn DurableStore>) -> Mobana {
    Mobana::builder()
        .store(store)
        .remote(Arc::clone(api) as Arc<dyn RemoteApi>)
        .build()
}

/// Configured coordinator over a fresh in-memory store.
pub async fn configured(api: &Arc<MockApi>) -> (Mobana, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let mobana = coordinator(api, store.clone());
    mobana.init(config()).await;
    (mobana, store)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mobana=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Poll until `condition` holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// =============================================================================
// Failing Store Wrapper - Error Injection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Delete,
    Keys,
}

/// An [`InMemoryStore`] that fails every call while `failing` is set, from
/// the Nth call onwards, or for a counted number of calls to one operation
/// on one key.
pub struct FailingStore {
    pub inner: InMemoryStore,
    call_count: AtomicU64,
    fail_from: AtomicU64,
    failing: AtomicBool,
    /// Remaining injected failures per `(op, key)`; `keys` uses `""`
    faults: Mutex<HashMap<(StoreOp, String), usize>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            call_count: AtomicU64::new(0),
            fail_from: AtomicU64::new(u64::MAX),
            failing: AtomicBool::new(false),
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `times` calls of `op` on `key`; other keys are untouched.
    pub fn fail_next(&self, op: StoreOp, key: &str, times: usize) {
        *self.faults.lock().entry((op, key.to_string())).or_default() += times;
    }

    /// Injected failures not yet consumed for `(op, key)`.
    pub fn pending_faults(&self, op: StoreOp, key: &str) -> usize {
        self.faults
            .lock()
            .get(&(op, key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Fail permanently after `n` successful calls.
    pub fn fail_after(n: u64) -> Self {
        let store = Self::new();
        store.fail_from.store(n + 1, Ordering::SeqCst);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn maybe_fail(&self, op: StoreOp, key: &str) -> Result<(), StorageError> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) || count >= self.fail_from.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected failure".into()));
        }
        let mut faults = self.faults.lock();
        if let Some(remaining) = faults.get_mut(&(op, key.to_string())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Backend(format!("injected {:?} failure on {}", op, key)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.maybe_fail(StoreOp::Get, key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.maybe_fail(StoreOp::Set, key)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.maybe_fail(StoreOp::Delete, key)?;
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.maybe_fail(StoreOp::Keys, "")?;
        self.inner.keys().await
    }
}

// =============================================================================
// Gated Store - holds reads of one key open
// =============================================================================

/// An [`InMemoryStore`] whose reads of `key` wait while the gate is closed.
pub struct GatedStore {
    pub inner: InMemoryStore,
    key: String,
    gate: watch::Sender<bool>,
    reads: AtomicUsize,
}

impl GatedStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            inner: InMemoryStore::new(),
            key: key.into(),
            gate: watch::Sender::new(true),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Reads of the gated key so far, including ones still waiting.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if key == self.key {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut gate = self.gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }
}

// =============================================================================
// Recording Presenter
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterMode {
    Complete,
    Dismiss,
    /// Drop the resolver without calling it
    Abandon,
}

pub struct RecordingPresenter {
    mode: PresenterMode,
    pub requests: Mutex<Vec<FlowRequest>>,
}

impl RecordingPresenter {
    pub fn new(mode: PresenterMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn presented(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_html(&self) -> Option<String> {
        self.requests.lock().last().map(|r| r.content.html.clone())
    }
}

impl FlowPresenter for RecordingPresenter {
    fn present(&self, request: FlowRequest, resolver: FlowResolver) {
        let session_id = request.session_id().to_string();
        self.requests.lock().push(request);
        match self.mode {
            PresenterMode::Complete => {
                resolver.resolve(FlowResult::completed(session_id, Some(Value::Bool(true))))
            }
            PresenterMode::Dismiss => resolver.resolve(FlowResult::dismissed(session_id)),
            PresenterMode::Abandon => drop(resolver),
        }
    }
}
