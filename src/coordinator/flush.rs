// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Conversion tracking and queue flushing.
//!
//! A conversion is sent immediately; if that fails it is appended to the
//! durable queue. A flush takes the whole queue, sends every entry
//! concurrently and puts the failures back in their original order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::conversion::ConversionEvent;
use crate::remote::RemoteApi;

use super::{AttributionOptions, FlushResult, Mobana};

/// Marks a flush as running; released on drop.
struct FlushGuard<'a>(&'a AtomicBool);

impl<'a> FlushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Send one event. `true` only if the server accepted it.
async fn deliver(api: &dyn RemoteApi, event: &ConversionEvent, timeout: Duration) -> bool {
    match api.send_conversion(event, timeout).await {
        Ok(response) if response.success => true,
        Ok(_) => {
            debug!(name = %event.name, "Conversion rejected by server");
            false
        }
        Err(e) => {
            debug!(name = %event.name, error = %e, "Conversion send failed");
            false
        }
    }
}

impl Mobana {
    /// Report a post-install event.
    ///
    /// No-op when unconfigured or disabled. Resolves attribution first so the
    /// server has an install record, but converts organic installs too.
    /// Events that cannot be sent are queued for the next flush.
    pub async fn track_conversion(
        &self,
        name: impl Into<String>,
        value: Option<f64>,
        flow_session_id: Option<String>,
    ) {
        let name = name.into();
        let Some(active) = self.active() else {
            debug!(name = %name, "Conversion ignored: SDK not configured");
            return;
        };
        if !self.is_enabled() {
            debug!(name = %name, "Conversion dropped: SDK disabled");
            crate::metrics::record_conversion("dropped");
            return;
        }

        let install_id = self.install_id().await;
        let event = ConversionEvent::new(install_id, name)
            .with_value(value)
            .with_flow_session(flow_session_id);

        let attribution = self.get_attribution(AttributionOptions::default()).await;
        debug!(status = attribution.status(), "Attribution checked before conversion");

        if !self.is_enabled() {
            debug!(name = %event.name, "Conversion dropped: SDK disabled");
            crate::metrics::record_conversion("dropped");
            return;
        }

        if deliver(active.api.as_ref(), &event, active.config.timeout()).await {
            crate::metrics::record_conversion("sent");
        } else {
            self.inner.persistence.enqueue_conversion(event).await;
            crate::metrics::record_conversion("queued");
        }
    }

    /// Retry every queued conversion.
    ///
    /// Returns an empty result when unconfigured, disabled, the queue is
    /// empty or cannot be taken from storage, or another flush is already
    /// running.
    pub async fn flush_conversions(&self) -> FlushResult {
        let Some(active) = self.active() else {
            return FlushResult::default();
        };
        if !self.is_enabled() {
            return FlushResult::default();
        }
        let Some(_guard) = FlushGuard::acquire(&self.inner.flushing) else {
            debug!("Conversion flush already running");
            return FlushResult::default();
        };

        let Some(queue) = self.inner.persistence.take_conversion_queue().await else {
            warn!("Conversion queue unavailable, flush skipped");
            return FlushResult::default();
        };
        if queue.is_empty() {
            return FlushResult::default();
        }
        let total = queue.len();
        let timeout = active.config.timeout();

        let mut tasks: JoinSet<(usize, bool)> = JoinSet::new();
        for (i, event) in queue.iter().cloned().enumerate() {
            let api: Arc<dyn RemoteApi> = Arc::clone(&active.api);
            tasks.spawn(async move { (i, deliver(api.as_ref(), &event, timeout).await) });
        }

        let mut delivered = vec![false; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, ok)) => delivered[i] = ok,
                Err(e) => warn!(error = %e, "Conversion send task failed"),
            }
        }

        let failed: Vec<ConversionEvent> = queue
            .into_iter()
            .zip(delivered)
            .filter_map(|(event, ok)| (!ok).then_some(event))
            .collect();
        let result = FlushResult {
            total,
            succeeded: total - failed.len(),
            failed: failed.len(),
        };

        crate::metrics::record_conversions("sent", result.succeeded);
        self.inner.persistence.requeue_conversions(failed).await;

        debug!(total, succeeded = result.succeeded, failed = result.failed, "Conversion queue flushed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = FlushGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(FlushGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(FlushGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_flush_unconfigured_is_empty() {
        let mobana = Mobana::new();
        assert_eq!(mobana.flush_conversions().await, FlushResult::default());
    }
}
