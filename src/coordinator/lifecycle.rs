// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Coordinator lifecycle: init, enable/disable, reset, install identity and
//! local data.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::MobanaConfig;
use crate::remote::{HttpApi, RemoteApi};

use super::{ActiveConfig, AttributionOptions, ConfigState, Mobana};

impl Mobana {
    /// Configure the SDK.
    ///
    /// Re-callable: each call replaces the active configuration but keeps the
    /// in-memory attribution cache. Invalid credentials leave the coordinator
    /// `Unconfigured`.
    ///
    /// Before returning this resolves the install id and flushes the
    /// conversion queue. Unless `auto_attribute` is off, an attribution lookup
    /// is started in the background; its result lands in the shared cache.
    #[tracing::instrument(skip(self, config), fields(app_id = %config.app_id))]
    pub async fn init(&self, config: MobanaConfig) -> ConfigState {
        if !config.is_valid() {
            warn!("Mobana init called without app id or app key; SDK stays unconfigured");
            *self.inner.active.write() = None;
            return ConfigState::Unconfigured;
        }

        let endpoint = config.resolved_endpoint();
        let api: Arc<dyn RemoteApi> = match &self.inner.remote_override {
            Some(api) => Arc::clone(api),
            None => match HttpApi::new(endpoint.clone(), config.app_key.clone()) {
                Ok(api) => Arc::new(api),
                Err(e) => {
                    warn!(error = %e, "Failed to build API client; SDK stays unconfigured");
                    *self.inner.active.write() = None;
                    return ConfigState::Unconfigured;
                }
            },
        };

        if let Some(enabled) = config.enabled {
            self.inner.enabled.store(enabled, Ordering::Release);
        }
        let auto_attribute = config.auto_attribute;

        *self.inner.active.write() = Some(Arc::new(ActiveConfig {
            config,
            endpoint: endpoint.clone(),
            api,
        }));
        info!(endpoint = %endpoint, "Mobana configured");

        // ========== Install identity (eager) ==========
        let install_id = self.install_id().await;
        debug!(install_id = %install_id, "Install id ready");

        // ========== Deliver anything queued by a previous session ==========
        let flushed = self.flush_conversions().await;
        if flushed.total > 0 {
            info!(
                sent = flushed.succeeded,
                requeued = flushed.failed,
                "Flushed queued conversions"
            );
        }

        // ========== Background attribution ==========
        if auto_attribute && self.is_enabled() {
            let this = self.clone();
            tokio::spawn(async move {
                let result = this.get_attribution(AttributionOptions::default()).await;
                debug!(status = result.status(), "Background attribution finished");
            });
        }

        ConfigState::Configured
    }

    /// Turn the SDK on or off. Enabling flushes the conversion queue.
    pub async fn set_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            info!(enabled, "Mobana enabled flag changed");
        }
        if enabled {
            self.flush_conversions().await;
        }
    }

    /// The install id, created and persisted on first access.
    pub async fn install_id(&self) -> String {
        let mut cached = self.inner.install_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }
        let id = self.inner.persistence.get_or_create_install_id().await;
        *cached = Some(id.clone());
        id
    }

    /// Forget this install.
    ///
    /// Clears the in-memory attribution cache and in-flight marker and every
    /// durable SDK key. A new install id is generated on next access, and a
    /// lookup started before the reset can no longer write its result.
    pub async fn reset(&self) {
        let mut identity = self.inner.install_id.lock().await;
        {
            let mut state = self.inner.attribution.lock();
            state.epoch = state.epoch.wrapping_add(1);
            state.resolved = None;
            state.in_flight = None;
        }
        *identity = None;
        self.inner.persistence.clear_all().await;
        drop(identity);
        info!("Mobana state reset");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Local data
    // ═══════════════════════════════════════════════════════════════════════

    /// The persisted local data object (empty if never written).
    pub async fn local_data(&self) -> Map<String, Value> {
        self.inner.persistence.local_data().await
    }

    /// Set one key of the local data object, keeping the others.
    pub async fn set_local_data(&self, key: impl Into<String>, value: Value) -> Map<String, Value> {
        let mut patch = Map::new();
        patch.insert(key.into(), value);
        self.inner.persistence.merge_local_data(patch).await
    }

    /// Replace the whole local data object.
    pub async fn replace_local_data(&self, data: Map<String, Value>) {
        self.inner.persistence.set_local_data(&data).await;
    }
}
