// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attribution resolution: memory → durable record → one shared network lookup.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::attribution::{Attribution, AttributionRecord};
use crate::platform::Platform;
use crate::remote::FindRequest;

use super::{
    ActiveConfig, AttributionError, AttributionOptions, AttributionResult, Mobana,
    PendingAttribution, Resolved,
};

/// What a caller gets after checking the in-memory state under the lock.
enum Lookup {
    Ready(Resolved),
    Pending(PendingAttribution),
}

/// Clears the in-flight marker when the lookup task ends, including by panic.
struct InFlightSlot<'a> {
    mobana: &'a Mobana,
    epoch: u64,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.mobana.inner.attribution.lock();
        if state.epoch == self.epoch {
            state.in_flight = None;
        }
    }
}

impl Mobana {
    /// Resolve the install's attribution.
    ///
    /// Order, each step short-circuiting:
    /// 1. not configured / disabled → error, no I/O
    /// 2. in-memory definitive answer
    /// 3. durable record (promoted to memory)
    /// 4. the lookup already in flight, if any
    /// 5. a new network lookup
    ///
    /// Matched and no-match answers are cached until [`Mobana::reset`];
    /// errors are never cached, so the next call retries.
    #[tracing::instrument(skip(self, options), fields(source))]
    pub async fn get_attribution(&self, options: AttributionOptions) -> AttributionResult {
        let Some(active) = self.active() else {
            return AttributionResult::error(AttributionError::NotConfigured);
        };
        if !self.is_enabled() {
            return AttributionResult::error(AttributionError::Disabled);
        }

        // ========== Memory ==========
        let epoch = {
            let state = self.inner.attribution.lock();
            if let Some(resolved) = state.resolved.clone() {
                return Self::finish(resolved.into(), "memory");
            }
            state.epoch
        };

        // ========== Durable record ==========
        if let Some(record) = self.inner.persistence.attribution().await {
            let resolved = Resolved::from(record);
            {
                let mut state = self.inner.attribution.lock();
                if state.epoch == epoch && state.resolved.is_none() {
                    state.resolved = Some(resolved.clone());
                }
            }
            return Self::finish(resolved.into(), "storage");
        }

        // Enabled may have flipped while the store was read.
        if !self.is_enabled() {
            return AttributionResult::error(AttributionError::Disabled);
        }

        // ========== Network (shared) ==========
        let timeout = options.timeout.unwrap_or_else(|| active.config.timeout());
        let mut pending = match self.join_or_start_lookup(active, timeout) {
            Lookup::Ready(resolved) => return Self::finish(resolved.into(), "memory"),
            Lookup::Pending(rx) => rx,
        };

        let result = pending
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| value.clone())
            .unwrap_or_else(|| AttributionResult::error(AttributionError::Unknown));
        Self::finish(result, "network")
    }

    fn finish(result: AttributionResult, source: &'static str) -> AttributionResult {
        tracing::Span::current().record("source", source);
        debug!(status = result.status(), source, "Attribution resolved");
        crate::metrics::record_attribution(result.status(), source);
        result
    }

    /// Subscribe to the in-flight lookup, or spawn one.
    ///
    /// The lookup runs on its own task so callers that stop waiting do not
    /// cancel it for the others.
    fn join_or_start_lookup(&self, active: Arc<ActiveConfig>, timeout: Duration) -> Lookup {
        let mut state = self.inner.attribution.lock();
        if let Some(resolved) = &state.resolved {
            return Lookup::Ready(resolved.clone());
        }
        if let Some(pending) = &state.in_flight {
            debug!("Joining in-flight attribution lookup");
            return Lookup::Pending(pending.clone());
        }

        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(rx.clone());
        let epoch = state.epoch;
        drop(state);

        tokio::spawn(self.clone().run_lookup(active, timeout, epoch, tx));
        Lookup::Pending(rx)
    }

    async fn run_lookup(
        self,
        active: Arc<ActiveConfig>,
        timeout: Duration,
        epoch: u64,
        tx: watch::Sender<Option<AttributionResult>>,
    ) {
        let slot = InFlightSlot { mobana: &self, epoch };

        let result = match self.lookup_remote(&active, timeout).await {
            Ok(resolved) => {
                self.store_resolved(epoch, &resolved).await;
                resolved.into()
            }
            Err(error) => {
                debug!(error = %error, "Attribution lookup failed; not cached");
                AttributionResult::error(error)
            }
        };

        drop(slot);
        tx.send_replace(Some(result));
    }

    /// One `find` round trip, classified.
    async fn lookup_remote(
        &self,
        active: &ActiveConfig,
        timeout: Duration,
    ) -> Result<Resolved, AttributionError> {
        let install_id = self.install_id().await;
        let device = self.inner.device.device_info();
        let dacid = if device.platform == Platform::Android {
            self.inner.referrer.install_referrer().await
        } else {
            None
        };

        let request = FindRequest::new(install_id, device, dacid);
        let response = active.api.find(&request, timeout).await?;

        match (response.matched, response.attribution) {
            (Some(true), Some(Value::Object(payload))) => Ok(Resolved::Matched(
                Attribution::from_payload(&payload, response.confidence),
            )),
            (Some(false), _) => Ok(Resolved::NoMatch),
            (matched, _) => {
                warn!(?matched, "Unexpected attribution response shape");
                Err(AttributionError::Unknown)
            }
        }
    }

    /// Persist and cache a definitive answer unless a reset happened since
    /// the lookup started.
    async fn store_resolved(&self, epoch: u64, resolved: &Resolved) {
        // Holding the identity lock keeps `reset` out until both writes land.
        let _identity = self.inner.install_id.lock().await;
        if self.inner.attribution.lock().epoch != epoch {
            debug!("Discarding attribution resolved before reset");
            return;
        }

        let record = match resolved {
            Resolved::Matched(attribution) => AttributionRecord::matched(attribution.clone()),
            Resolved::NoMatch => AttributionRecord::no_match(),
        };
        self.inner.persistence.set_attribution(&record).await;
        self.inner.attribution.lock().resolved = Some(resolved.clone());
    }
}
