// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Conversion events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post-install business event (signup, purchase, ...).
///
/// Serialized as the `/conversion` request body and as a queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    pub install_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_session_id: Option<String>,
}

impl ConversionEvent {
    /// New event stamped with the current time.
    pub fn new(install_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            install_id: install_id.into(),
            name: name.into(),
            value: None,
            timestamp: Utc::now(),
            flow_session_id: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: Option<f64>) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_flow_session(mut self, session_id: Option<String>) -> Self {
        self.flow_session_id = session_id;
        self
    }
}
