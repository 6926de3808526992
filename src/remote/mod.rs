// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote attribution service.
//!
//! [`RemoteApi`] is the seam between the coordinator and the network. Every
//! call takes a timeout and classifies its outcome into success or one
//! [`ApiError`]. [`HttpApi`] is the production implementation.
//!
//! Response types are deliberately lenient (optional fields, unknown fields
//! ignored): the coordinator decides whether a response has a usable shape.

mod http;

pub use http::HttpApi;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::conversion::ConversionEvent;
use crate::platform::{DeviceInfo, Platform};

/// Transport-level outcome of a failed request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection failed or the body could not be read
    #[error("network error: {0}")]
    Network(String),
    /// The request did not settle within its timeout
    #[error("request timed out")]
    Timeout,
    /// The server answered with a non-success status
    #[error("server returned status {status}")]
    Server { status: u16 },
    /// A success status with a body that is not the expected JSON
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Short label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Server { .. } => "server",
            Self::InvalidResponse(_) => "invalid",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if let Some(status) = err.status() {
            ApiError::Server { status: status.as_u16() }
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /find`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindRequest {
    pub install_id: String,
    pub platform: Platform,
    pub timezone: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub language: String,
    /// Deterministic token from the Android install referrer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dacid: Option<String>,
}

impl FindRequest {
    pub fn new(install_id: String, device: DeviceInfo, dacid: Option<String>) -> Self {
        Self {
            install_id,
            platform: device.platform,
            timezone: device.timezone,
            screen_width: device.screen_width,
            screen_height: device.screen_height,
            language: device.language,
            dacid,
        }
    }
}

/// Response of `POST /find`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FindResponse {
    #[serde(default)]
    pub matched: Option<bool>,
    #[serde(default)]
    pub attribution: Option<Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Response of `POST /conversion`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConversionResponse {
    #[serde(default)]
    pub success: bool,
}

/// Response of `GET /flows/{slug}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResponse {
    /// The version sent as `versionId` is still current
    #[serde(default)]
    pub cached: Option<bool>,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub js: Option<String>,
    /// Structured error code (e.g., `NOT_FOUND`, `PLAN_REQUIRED`)
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /flows/{slug}/events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEventRequest {
    pub install_id: String,
    pub version_id: String,
    pub session_id: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The four network operations of the attribution service.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Look up the attribution of an install.
    async fn find(&self, request: &FindRequest, timeout: Duration) -> ApiResult<FindResponse>;

    /// Submit a conversion event.
    async fn send_conversion(
        &self,
        event: &ConversionEvent,
        timeout: Duration,
    ) -> ApiResult<ConversionResponse>;

    /// Conditionally fetch flow content; `version_id` is the locally cached version.
    async fn fetch_flow(
        &self,
        slug: &str,
        install_id: &str,
        version_id: Option<&str>,
        timeout: Duration,
    ) -> ApiResult<FlowResponse>;

    /// Report a flow analytics event (fire-and-forget).
    async fn track_flow_event(
        &self,
        slug: &str,
        event: &FlowEventRequest,
        timeout: Duration,
    ) -> ApiResult<()>;
}
