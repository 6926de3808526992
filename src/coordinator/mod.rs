// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mobana coordinator.
//!
//! [`Mobana`] is the state machine that ties the SDK together:
//! - configuration lifecycle and the `enabled` gate
//! - in-memory attribution cache over the durable attribution record
//! - deduplication of concurrent attribution lookups
//! - conversion send-or-queue and queue flushing
//! - flow fetch / validate / cache and hand-off to the presenter
//!
//! # Lifecycle
//!
//! ```text
//! Unconfigured ──init──► Configured ──reset──► Configured (fresh install id)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use mobana::{Mobana, MobanaConfig, AttributionOptions, AttributionResult};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mobana = Mobana::shared();
//! mobana.init(MobanaConfig::new("abc123", "secret")).await;
//!
//! match mobana.get_attribution(AttributionOptions::default()).await {
//!     AttributionResult::Matched { attribution } => println!("from {:?}", attribution.utm_source),
//!     AttributionResult::NoMatch => println!("organic install"),
//!     AttributionResult::Error { error } => println!("retry later: {}", error),
//! }
//! # }
//! ```

mod types;
mod lifecycle;
mod attribution;
mod flush;
mod flow;

pub use types::{AttributionError, AttributionOptions, AttributionResult, ConfigState, FlushResult};
use types::Resolved;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::config::MobanaConfig;
use crate::flow::FlowPresenter;
use crate::persistence::Persistence;
use crate::platform::{DeviceInfoSource, NoReferrer, ReferrerResolver, StaticDevice};
use crate::remote::RemoteApi;
use crate::storage::{DurableStore, InMemoryStore};

/// Process-wide default instance.
static SHARED: OnceLock<Mobana> = OnceLock::new();

/// The Mobana SDK coordinator.
///
/// Cloning is cheap and every clone shares the same state. All state is
/// instance-scoped, so tests (or multi-tenant hosts) can build independent
/// coordinators with [`Mobana::builder`].
///
/// # Thread Safety
///
/// `Mobana` is `Send + Sync`. Each state transition completes under a
/// short, non-async lock before the next suspension point.
#[derive(Clone)]
pub struct Mobana {
    inner: Arc<Inner>,
}

struct Inner {
    /// Typed access to the durable store
    persistence: Persistence,

    /// Remote API supplied by the host; `None` builds an `HttpApi` on `init`
    remote_override: Option<Arc<dyn RemoteApi>>,

    device: Arc<dyn DeviceInfoSource>,
    referrer: Arc<dyn ReferrerResolver>,

    /// Set by a successful `init`
    active: RwLock<Option<Arc<ActiveConfig>>>,

    /// Gates attribution, conversions and flows (independent of configuration)
    enabled: AtomicBool,

    /// In-memory attribution cache and in-flight marker
    attribution: Mutex<AttributionState>,

    /// Install id cached for the session; the async lock serializes creation
    install_id: tokio::sync::Mutex<Option<String>>,

    /// Set while a conversion queue flush runs
    flushing: AtomicBool,

    presenter: RwLock<Option<Arc<dyn FlowPresenter>>>,
}

/// Configuration accepted by `init`, with its resolved endpoint and client.
struct ActiveConfig {
    config: MobanaConfig,
    endpoint: String,
    api: Arc<dyn RemoteApi>,
}

/// Receiver side of an in-flight attribution lookup.
type PendingAttribution = watch::Receiver<Option<AttributionResult>>;

#[derive(Default)]
struct AttributionState {
    /// Last definitive answer; never set from an error
    resolved: Option<Resolved>,
    /// At most one lookup in flight; later callers subscribe to it
    in_flight: Option<PendingAttribution>,
    /// Bumped by `reset` so lookups started earlier cannot write back
    epoch: u64,
}

impl Mobana {
    /// Coordinator with an in-memory store and the HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> MobanaBuilder {
        MobanaBuilder::default()
    }

    /// The process-wide default instance.
    ///
    /// Created on first use with [`Mobana::new`]. Hosts that need a durable
    /// store should build their own instance and keep it.
    pub fn shared() -> Mobana {
        SHARED.get_or_init(Mobana::new).clone()
    }

    /// Current configuration state.
    #[must_use]
    pub fn config_state(&self) -> ConfigState {
        if self.inner.active.read().is_some() {
            ConfigState::Configured
        } else {
            ConfigState::Unconfigured
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config_state() == ConfigState::Configured
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Resolved API endpoint, once configured.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.active().map(|active| active.endpoint.clone())
    }

    fn active(&self) -> Option<Arc<ActiveConfig>> {
        self.inner.active.read().clone()
    }

    fn presenter(&self) -> Option<Arc<dyn FlowPresenter>> {
        self.inner.presenter.read().clone()
    }
}

impl Default for Mobana {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Mobana`] with pluggable collaborators.
///
/// ```
/// use std::sync::Arc;
/// use mobana::{Mobana, InMemoryStore, StaticDevice, DeviceInfo, Platform};
///
/// let mobana = Mobana::builder()
///     .store(Arc::new(InMemoryStore::new()))
///     .device(Arc::new(StaticDevice(DeviceInfo {
///         platform: Platform::Ios,
///         ..Default::default()
///     })))
///     .build();
/// assert!(!mobana.is_configured());
/// ```
#[derive(Default)]
pub struct MobanaBuilder {
    store: Option<Arc<dyn DurableStore>>,
    remote: Option<Arc<dyn RemoteApi>>,
    device: Option<Arc<dyn DeviceInfoSource>>,
    referrer: Option<Arc<dyn ReferrerResolver>>,
}

impl MobanaBuilder {
    /// Durable store (default: [`InMemoryStore`]).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Remote API (default: [`crate::HttpApi`] built from the config on `init`).
    #[must_use]
    pub fn remote(mut self, remote: Arc<dyn RemoteApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Device info source (default: [`StaticDevice`] with unknown platform).
    #[must_use]
    pub fn device(mut self, device: Arc<dyn DeviceInfoSource>) -> Self {
        self.device = Some(device);
        self
    }

    /// Install referrer resolver (default: [`NoReferrer`]).
    #[must_use]
    pub fn referrer(mut self, referrer: Arc<dyn ReferrerResolver>) -> Self {
        self.referrer = Some(referrer);
        self
    }

    pub fn build(self) -> Mobana {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));

        Mobana {
            inner: Arc::new(Inner {
                persistence: Persistence::new(store),
                remote_override: self.remote,
                device: self.device.unwrap_or_else(|| Arc::new(StaticDevice::default())),
                referrer: self.referrer.unwrap_or_else(|| Arc::new(NoReferrer)),
                active: RwLock::new(None),
                enabled: AtomicBool::new(true),
                attribution: Mutex::new(AttributionState::default()),
                install_id: tokio::sync::Mutex::new(None),
                flushing: AtomicBool::new(false),
                presenter: RwLock::new(None),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_coordinator_is_unconfigured_and_enabled() {
        let mobana = Mobana::new();
        assert_eq!(mobana.config_state(), ConfigState::Unconfigured);
        assert!(mobana.is_enabled());
        assert!(mobana.endpoint().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let mobana = Mobana::new();
        let clone = mobana.clone();
        clone.inner.enabled.store(false, Ordering::Release);
        assert!(!mobana.is_enabled());
    }

    #[test]
    fn test_shared_instance_is_stable() {
        let a = Mobana::shared();
        let b = Mobana::shared();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn test_built_instances_are_isolated() {
        let a = Mobana::new();
        let b = Mobana::new();
        assert!(!Arc::ptr_eq(&a.inner, &b.inner));
    }
}
