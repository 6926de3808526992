// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attribution payload and its durable cache record.
//!
//! An [`AttributionRecord`] is only ever written for a definitive server
//! answer (matched or explicitly unmatched). Transient failures never
//! produce one.
//!
//! # Example
//!
//! ```
//! use mobana::Attribution;
//! use serde_json::json;
//!
//! let payload = json!({"utm_source": "google", "utm_campaign": "spring"});
//! let attribution = Attribution::from_payload(payload.as_object().unwrap(), Some(0.75));
//!
//! assert_eq!(attribution.utm_source.as_deref(), Some("google"));
//! assert_eq!(attribution.confidence, 0.75);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marketing attribution for this install.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_domain: Option<String>,
    /// Application-defined data attached to the tracking link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// 1.0 for a deterministic referrer match, lower for probabilistic ones
    #[serde(default)]
    pub confidence: f64,
}

impl Attribution {
    /// Build from the server's `attribution` object and top-level `confidence`.
    ///
    /// Fields with an unexpected type are ignored rather than rejected.
    /// A missing confidence becomes 0 and the value is clamped to [0, 1].
    pub fn from_payload(payload: &Map<String, Value>, confidence: Option<f64>) -> Self {
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
        let confidence = confidence
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Self {
            utm_source: text("utm_source"),
            utm_medium: text("utm_medium"),
            utm_campaign: text("utm_campaign"),
            utm_content: text("utm_content"),
            utm_term: text("utm_term"),
            referrer_domain: text("referrer_domain"),
            data: payload.get("data").filter(|v| !v.is_null()).cloned(),
            confidence,
        }
    }

    /// Deterministic match via the platform install referrer.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.confidence >= 1.0
    }
}

/// Durable record of a definitive attribution answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionRecord {
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Attribution>,
    pub checked_at: DateTime<Utc>,
}

impl AttributionRecord {
    pub fn matched(attribution: Attribution) -> Self {
        Self {
            matched: true,
            attribution: Some(attribution),
            checked_at: Utc::now(),
        }
    }

    pub fn no_match() -> Self {
        Self {
            matched: false,
            attribution: None,
            checked_at: Utc::now(),
        }
    }

    /// `attribution` is present iff `matched` is true.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.matched == self.attribution.is_some()
    }
}
