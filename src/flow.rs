// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flow presentation contract.
//!
//! The SDK fetches and caches flow content; the host renders it. A host
//! registers a [`FlowPresenter`] with the coordinator, which hands it a
//! [`FlowRequest`] and a [`FlowResolver`] for each presentation. The
//! coordinator's `start_flow` future resolves when the presenter calls
//! [`FlowResolver::resolve`] (or drops the resolver, which counts as a
//! dismissal).
//!
//! ```text
//!   start_flow(slug) ──► fetch / cache ──► FlowPresenter::present(request, resolver)
//!         ▲                                              │
//!         └──────────────── FlowResult ◄── resolver.resolve(..)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::attribution::Attribution;
use crate::persistence::CachedFlow;
use crate::remote::{FlowEventRequest, RemoteApi};

/// Why a flow could not be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowError {
    NotConfigured,
    Disabled,
    ProviderNotMounted,
    NotFound,
    PlanRequired,
    FlowLimitExceeded,
    NetworkError,
    ServerError,
    /// A server error code this version does not know, kept verbatim
    #[serde(untagged)]
    Other(String),
}

impl FlowError {
    /// Map a server error code onto a variant.
    pub fn from_code(code: &str) -> Self {
        match code {
            "NOT_CONFIGURED" => Self::NotConfigured,
            "DISABLED" => Self::Disabled,
            "PROVIDER_NOT_MOUNTED" => Self::ProviderNotMounted,
            "NOT_FOUND" => Self::NotFound,
            "PLAN_REQUIRED" => Self::PlanRequired,
            "FLOW_LIMIT_EXCEEDED" => Self::FlowLimitExceeded,
            "NETWORK_ERROR" => Self::NetworkError,
            "SERVER_ERROR" => Self::ServerError,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::Disabled => "DISABLED",
            Self::ProviderNotMounted => "PROVIDER_NOT_MOUNTED",
            Self::NotFound => "NOT_FOUND",
            Self::PlanRequired => "PLAN_REQUIRED",
            Self::FlowLimitExceeded => "FLOW_LIMIT_EXCEEDED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::Other(code) => code,
        }
    }
}

impl std::fmt::Display for FlowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::error::Error for FlowError {}

/// Renderable flow content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContent {
    pub version_id: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
}

impl From<CachedFlow> for FlowContent {
    fn from(cached: CachedFlow) -> Self {
        Self {
            version_id: cached.version_id,
            html: cached.html,
            css: cached.css,
            js: cached.js,
        }
    }
}

/// Caller options for `start_flow`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowOptions {
    /// Arbitrary data made available to the flow's scripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outcome of a presented flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    /// The user reached the end of the flow
    pub completed: bool,
    /// The user closed the flow before completing it
    pub dismissed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
    /// Data returned by the flow on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl FlowResult {
    pub fn completed(session_id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            completed: true,
            data,
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn dismissed(session_id: impl Into<String>) -> Self {
        Self {
            dismissed: true,
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn error(error: FlowError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Analytics handle for one flow presentation.
#[derive(Clone)]
pub struct FlowSession {
    api: Arc<dyn RemoteApi>,
    slug: String,
    install_id: String,
    version_id: String,
    session_id: String,
    timeout: Duration,
}

impl FlowSession {
    pub(crate) fn new(
        api: Arc<dyn RemoteApi>,
        slug: String,
        install_id: String,
        version_id: String,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            slug,
            install_id,
            version_id,
            session_id: uuid::Uuid::new_v4().to_string(),
            timeout,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Report a flow event (e.g. `step_viewed`). Returns whether the server
    /// accepted it; failures are not retried.
    pub async fn track_event(&self, event: &str, step: Option<u32>, data: Option<Value>) -> bool {
        let request = FlowEventRequest {
            install_id: self.install_id.clone(),
            version_id: self.version_id.clone(),
            session_id: self.session_id.clone(),
            event: event.to_string(),
            step,
            data,
        };
        match self.api.track_flow_event(&self.slug, &request, self.timeout).await {
            Ok(()) => true,
            Err(e) => {
                debug!(slug = %self.slug, event, error = %e, "Flow event not delivered");
                false
            }
        }
    }
}

impl std::fmt::Debug for FlowSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowSession")
            .field("slug", &self.slug)
            .field("version_id", &self.version_id)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Everything a presenter needs to render a flow.
#[derive(Debug, Clone)]
pub struct FlowRequest {
    pub slug: String,
    pub content: FlowContent,
    pub install_id: String,
    pub endpoint: String,
    pub app_key: String,
    /// Attribution known at presentation time (matched installs only)
    pub attribution: Option<Attribution>,
    pub options: FlowOptions,
    pub session: FlowSession,
}

impl FlowRequest {
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }
}

/// One-shot completion handle for a presentation.
///
/// `resolve` consumes the resolver, so a presentation resolves at most once.
#[derive(Debug)]
pub struct FlowResolver {
    tx: oneshot::Sender<FlowResult>,
}

impl FlowResolver {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<FlowResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the outcome to the waiting `start_flow` caller.
    pub fn resolve(self, result: FlowResult) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.tx.send(result);
    }
}

/// Host-side renderer for flows.
pub trait FlowPresenter: Send + Sync {
    /// Show `request`, then call `resolver.resolve(..)` once the user
    /// finishes or dismisses it. Must not block.
    fn present(&self, request: FlowRequest, resolver: FlowResolver);
}
