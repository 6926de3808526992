// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flow retrieval, caching and hand-off to the host presenter.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::flow::{
    FlowContent, FlowError, FlowOptions, FlowPresenter, FlowRequest, FlowResolver, FlowResult,
    FlowSession,
};
use crate::persistence::CachedFlow;

use super::{ActiveConfig, AttributionOptions, Mobana};

impl Mobana {
    /// Register the component that renders flows.
    pub fn set_flow_presenter(&self, presenter: Arc<dyn FlowPresenter>) {
        *self.inner.presenter.write() = Some(presenter);
    }

    pub fn clear_flow_presenter(&self) {
        *self.inner.presenter.write() = None;
    }

    /// Fetch the flow `slug` and present it.
    ///
    /// Resolves once the presenter reports completion or dismissal. If the
    /// flow cannot be fetched the cached version is shown when available.
    /// Server error codes are returned verbatim and nothing is presented.
    #[tracing::instrument(skip(self, options), fields(source))]
    pub async fn start_flow(&self, slug: &str, options: FlowOptions) -> FlowResult {
        let Some(active) = self.active() else {
            return FlowResult::error(FlowError::NotConfigured);
        };
        if !self.is_enabled() {
            return FlowResult::error(FlowError::Disabled);
        }
        let Some(presenter) = self.presenter() else {
            warn!(slug, "No flow presenter registered");
            return FlowResult::error(FlowError::ProviderNotMounted);
        };

        let attribution = self
            .get_attribution(AttributionOptions::default())
            .await
            .attribution()
            .cloned();
        if !self.is_enabled() {
            debug!(slug, "SDK disabled while resolving attribution");
            return FlowResult::error(FlowError::Disabled);
        }

        let content = match self.load_flow(&active, slug).await {
            Ok(content) => content,
            Err(error) => {
                debug!(slug, error = %error, "Flow not presented");
                return FlowResult::error(error);
            }
        };

        let install_id = self.install_id().await;
        if !self.is_enabled() {
            debug!(slug, "SDK disabled while loading flow");
            return FlowResult::error(FlowError::Disabled);
        }
        let session = FlowSession::new(
            Arc::clone(&active.api),
            slug.to_string(),
            install_id.clone(),
            content.version_id.clone(),
            active.config.timeout(),
        );
        let session_id = session.session_id().to_string();
        let request = FlowRequest {
            slug: slug.to_string(),
            content,
            install_id,
            endpoint: active.endpoint.clone(),
            app_key: active.config.app_key.clone(),
            attribution,
            options,
            session,
        };

        let (resolver, outcome) = FlowResolver::channel();
        if catch_unwind(AssertUnwindSafe(|| presenter.present(request, resolver))).is_err() {
            warn!(slug, "Flow presenter panicked");
            return FlowResult::error(FlowError::ServerError);
        }

        let mut result = outcome.await.unwrap_or_else(|_| {
            debug!(slug, "Flow resolver dropped; treating as dismissed");
            FlowResult::dismissed(session_id.clone())
        });
        if result.session_id.is_none() {
            result.session_id = Some(session_id);
        }
        result
    }

    /// Fetch and cache `slug` without presenting it. Errors are ignored.
    pub async fn prefetch_flow(&self, slug: &str) {
        let Some(active) = self.active() else {
            return;
        };
        if !self.is_enabled() {
            return;
        }
        if let Err(error) = self.load_flow(&active, slug).await {
            debug!(slug, error = %error, "Flow prefetch failed");
        }
    }

    /// Conditional fetch against the cached version.
    async fn load_flow(&self, active: &ActiveConfig, slug: &str) -> Result<FlowContent, FlowError> {
        let cached = self.inner.persistence.flow_cache(slug).await;
        let install_id = self.install_id().await;
        if !self.is_enabled() {
            return Err(FlowError::Disabled);
        }
        let known_version = cached.as_ref().map(|flow| flow.version_id.as_str());

        let response = match active
            .api
            .fetch_flow(slug, &install_id, known_version, active.config.timeout())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return match cached {
                    Some(flow) => {
                        warn!(slug, error = %e, version = %flow.version_id, "Flow fetch failed; using cached version");
                        Self::flow_source("stale");
                        Ok(flow.into())
                    }
                    None => {
                        Self::flow_source("error");
                        Err(FlowError::NetworkError)
                    }
                };
            }
        };

        if let Some(code) = response.error {
            Self::flow_source("error");
            return Err(FlowError::from_code(&code));
        }

        if response.cached == Some(true) {
            return match cached {
                Some(flow) => {
                    Self::flow_source("cached");
                    Ok(flow.into())
                }
                None => {
                    warn!(slug, "Server reported cached flow but none is stored");
                    Self::flow_source("error");
                    Err(FlowError::ServerError)
                }
            };
        }

        match (response.version_id, response.html) {
            (Some(version_id), Some(html)) => {
                let flow = CachedFlow {
                    version_id,
                    html,
                    css: response.css,
                    js: response.js,
                    cached_at: Utc::now(),
                };
                self.inner.persistence.set_flow_cache(slug, &flow).await;
                Self::flow_source("fresh");
                Ok(flow.into())
            }
            _ => {
                warn!(slug, "Unexpected flow response shape");
                Self::flow_source("error");
                Err(FlowError::ServerError)
            }
        }
    }

    fn flow_source(source: &'static str) {
        tracing::Span::current().record("source", source);
        crate::metrics::record_flow(source);
    }
}
