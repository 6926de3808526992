// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the Mobana SDK.
//!
//! # Example
//!
//! ```
//! use mobana::MobanaConfig;
//!
//! // Minimal config (uses defaults)
//! let config = MobanaConfig::new("abc123", "secret");
//! assert_eq!(config.resolved_endpoint(), "https://abc123.mobana.ai");
//! assert_eq!(config.timeout_ms, 10_000);
//!
//! // Full config
//! let config = MobanaConfig {
//!     app_id: "abc123".into(),
//!     app_key: "secret".into(),
//!     endpoint: Some("https://attribution.example.com/".into()),
//!     auto_attribute: false,
//!     ..Default::default()
//! };
//! assert_eq!(config.resolved_endpoint(), "https://attribution.example.com");
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Domain used to build the default per-app endpoint.
pub const DEFAULT_DOMAIN: &str = "mobana.ai";

/// Configuration passed to [`crate::Mobana::init`].
///
/// `app_id` and `app_key` are required; everything else has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct MobanaConfig {
    /// Application identifier (also the subdomain of the default endpoint)
    #[serde(default)]
    pub app_id: String,

    /// Application secret key, sent as `X-App-Key`
    #[serde(default)]
    pub app_key: String,

    /// Endpoint override (e.g., a custom domain proxying the API)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Resolve attribution in the background as soon as `init` runs
    #[serde(default = "default_auto_attribute")]
    pub auto_attribute: bool,

    /// Request timeout in milliseconds (default: 10s)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Initial value of the enabled flag. `None` keeps the current flag.
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn default_auto_attribute() -> bool { true }
fn default_timeout_ms() -> u64 { 10_000 }

impl Default for MobanaConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_key: String::new(),
            endpoint: None,
            auto_attribute: default_auto_attribute(),
            timeout_ms: default_timeout_ms(),
            enabled: None,
        }
    }
}

impl MobanaConfig {
    /// Config with the two required fields set and defaults elsewhere.
    pub fn new(app_id: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_key: app_key.into(),
            ..Default::default()
        }
    }

    /// Both required fields are present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.app_id.trim().is_empty() && !self.app_key.trim().is_empty()
    }

    /// Base URL for API calls, without a trailing slash.
    #[must_use]
    pub fn resolved_endpoint(&self) -> String {
        match self.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => format!("https://{}.{}", self.app_id, DEFAULT_DOMAIN),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
