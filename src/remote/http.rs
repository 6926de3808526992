// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP implementation of [`RemoteApi`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    ApiError, ApiResult, ConversionResponse, FindRequest, FindResponse, FlowEventRequest,
    FlowResponse, RemoteApi,
};
use crate::conversion::ConversionEvent;
use crate::metrics::{self, LatencyTimer};

/// Header carrying the application secret key.
pub const APP_KEY_HEADER: &str = "X-App-Key";

/// HTTP client for the attribution service.
///
/// # Example
///
/// ```rust,no_run
/// use mobana::{HttpApi, RemoteApi, FindRequest, DeviceInfo};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let api = HttpApi::new("https://abc123.mobana.ai", "secret")?;
/// let request = FindRequest::new("install-1".into(), DeviceInfo::default(), None);
/// let response = api.find(&request, Duration::from_secs(10)).await?;
/// println!("matched: {:?}", response.matched);
/// # Ok(())
/// # }
/// ```
pub struct HttpApi {
    base_url: String,
    app_key: String,
    client: Client,
}

impl HttpApi {
    /// Create a client for `base_url` (trailing slashes are ignored).
    pub fn new(base_url: impl Into<String>, app_key: impl Into<String>) -> ApiResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_key: app_key.into(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn flow_url(&self, slug: &str) -> String {
        format!("{}/flows/{}", self.base_url, urlencoding::encode(slug))
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .header(APP_KEY_HEADER, &self.app_key)
    }

    /// Run `call` under `timeout`, recording latency and outcome.
    ///
    /// On elapse the in-flight future is dropped, which aborts the
    /// underlying connection. A settled call is never aborted.
    async fn execute<T, Fut>(&self, endpoint: &'static str, timeout: Duration, call: Fut) -> ApiResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        let _timer = LatencyTimer::new(endpoint);

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        };

        match &result {
            Ok(_) => metrics::record_api_request(endpoint, "success"),
            Err(e) => {
                debug!(endpoint, error = %e, "API request failed");
                metrics::record_api_request(endpoint, e.kind());
            }
        }
        result
    }
}

/// Decode a JSON body, mapping non-success statuses to [`ApiError::Server`].
async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Server { status: status.as_u16() });
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn find(&self, request: &FindRequest, timeout: Duration) -> ApiResult<FindResponse> {
        let url = format!("{}/find", self.base_url);
        let builder = self.request(self.client.post(&url)).json(request);

        self.execute("find", timeout, async move {
            let response = builder.send().await?;
            decode(response).await
        })
        .await
    }

    async fn send_conversion(
        &self,
        event: &ConversionEvent,
        timeout: Duration,
    ) -> ApiResult<ConversionResponse> {
        let url = format!("{}/conversion", self.base_url);
        let builder = self.request(self.client.post(&url)).json(event);

        self.execute("conversion", timeout, async move {
            let response = builder.send().await?;
            decode(response).await
        })
        .await
    }

    async fn fetch_flow(
        &self,
        slug: &str,
        install_id: &str,
        version_id: Option<&str>,
        timeout: Duration,
    ) -> ApiResult<FlowResponse> {
        let mut query = vec![("installId", install_id)];
        if let Some(version_id) = version_id {
            query.push(("versionId", version_id));
        }
        let builder = self.request(self.client.get(self.flow_url(slug))).query(&query);

        self.execute("flow", timeout, async move {
            let response = builder.send().await?;
            let status = response.status();
            if status.is_success() {
                return decode(response).await;
            }

            // Structured flow errors (NOT_FOUND, PLAN_REQUIRED, ...) arrive with
            // a non-success status and an `error` field in the body.
            let bytes = response.bytes().await?;
            match serde_json::from_slice::<FlowResponse>(&bytes) {
                Ok(body) if body.error.is_some() => Ok(body),
                _ => Err(ApiError::Server { status: status.as_u16() }),
            }
        })
        .await
    }

    async fn track_flow_event(
        &self,
        slug: &str,
        event: &FlowEventRequest,
        timeout: Duration,
    ) -> ApiResult<()> {
        let url = format!("{}/events", self.flow_url(slug));
        let builder = self.request(self.client.post(&url)).json(event);

        self.execute("flow_event", timeout, async move {
            let response = builder.send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(ApiError::Server { status: status.as_u16() })
            }
        })
        .await
    }
}
