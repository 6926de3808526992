//! # Mobana
//!
//! Client-side SDK for install attribution, conversion tracking and
//! server-authored flows.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Mobana coordinator                      │
//! │  • init / set_enabled / reset lifecycle                    │
//! │  • get_attribution, track_conversion, start_flow           │
//! │  • one shared in-flight attribution lookup                 │
//! └─────────────────────────────────────────────────────────────┘
//!          │                     │                      │
//!          ▼                     ▼                      ▼
//! ┌─────────────────┐  ┌───────────────────┐  ┌──────────────────┐
//! │ Memory cache    │  │ Persistence       │  │ RemoteApi        │
//! │ definitive      │  │ install id        │  │ POST /find       │
//! │ attribution     │  │ attribution rec.  │  │ POST /conversion │
//! │ answer only     │  │ conversion queue  │  │ GET  /flows/..   │
//! └─────────────────┘  │ flow cache, local │  └──────────────────┘
//!                      └───────────────────┘
//!                                │
//!                                ▼
//!                 DurableStore (InMemoryStore | SqliteStore)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mobana::{Mobana, MobanaConfig, SqliteStore, AttributionOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SqliteStore::open("./mobana.db").await.expect("open store");
//!     let mobana = Mobana::builder().store(Arc::new(store)).build();
//!
//!     mobana.init(MobanaConfig::new("abc123", "secret")).await;
//!
//!     let result = mobana.get_attribution(AttributionOptions::default()).await;
//!     println!("attribution: {:?}", result);
//!
//!     mobana.track_conversion("signup", None, None).await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Cached attribution**: matched and no-match answers persist until `reset`
//! - **Deduplication**: concurrent callers share one network lookup
//! - **Conversion queue**: failed sends are retried on the next flush
//! - **Flow cache**: conditional fetches with stale-but-available fallback
//! - **Pluggable storage**: in-memory or SQLite, behind [`DurableStore`]
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`Mobana`] state machine
//! - [`persistence`]: typed, error-swallowing access to the durable store
//! - [`storage`]: store backends
//! - [`remote`]: the attribution service client
//! - [`flow`]: the flow presentation contract

pub mod config;
pub mod platform;
pub mod attribution;
pub mod conversion;
pub mod storage;
pub mod persistence;
pub mod remote;
pub mod flow;
pub mod coordinator;
pub mod resilience;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::MobanaConfig;
pub use coordinator::{
    AttributionError, AttributionOptions, AttributionResult, ConfigState, FlushResult, Mobana,
    MobanaBuilder,
};
pub use attribution::{Attribution, AttributionRecord};
pub use conversion::ConversionEvent;
pub use platform::{
    DeviceInfo, DeviceInfoSource, NoReferrer, Platform, ReferrerResolver, StaticDevice,
    StaticReferrer,
};
pub use storage::{DurableStore, InMemoryStore, SqliteStore, StorageError};
pub use persistence::{CachedFlow, Persistence};
pub use remote::{
    ApiError, ApiResult, ConversionResponse, FindRequest, FindResponse, FlowEventRequest,
    FlowResponse, HttpApi, RemoteApi,
};
pub use flow::{
    FlowContent, FlowError, FlowOptions, FlowPresenter, FlowRequest, FlowResolver, FlowResult,
    FlowSession,
};
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
