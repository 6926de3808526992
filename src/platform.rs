// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Host platform collaborators: device info and the install referrer.
//!
//! Both are supplied by the embedding app. The SDK only reads them when it
//! builds an attribution lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Operating system the SDK is embedded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Unknown,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ios => write!(f, "ios"),
            Self::Android => write!(f, "android"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Device signals sent with an attribution lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: Platform,
    /// IANA timezone (e.g., "Europe/London")
    pub timezone: String,
    pub screen_width: u32,
    pub screen_height: u32,
    /// BCP 47 language tag (e.g., "en-GB")
    pub language: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            platform: Platform::Unknown,
            timezone: "UTC".to_string(),
            screen_width: 0,
            screen_height: 0,
            language: "en".to_string(),
        }
    }
}

/// Supplies the current device info.
pub trait DeviceInfoSource: Send + Sync {
    fn device_info(&self) -> DeviceInfo;
}

/// A fixed [`DeviceInfo`] snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticDevice(pub DeviceInfo);

impl DeviceInfoSource for StaticDevice {
    fn device_info(&self) -> DeviceInfo {
        self.0.clone()
    }
}

/// Resolves the deterministic attribution token from the platform install
/// referrer. Only consulted on Android.
#[async_trait]
pub trait ReferrerResolver: Send + Sync {
    async fn install_referrer(&self) -> Option<String>;
}

/// Resolver for platforms without an install referrer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferrer;

#[async_trait]
impl ReferrerResolver for NoReferrer {
    async fn install_referrer(&self) -> Option<String> {
        None
    }
}

/// Resolver returning a fixed token.
#[derive(Debug, Clone, Default)]
pub struct StaticReferrer(pub Option<String>);

#[async_trait]
impl ReferrerResolver for StaticReferrer {
    async fn install_referrer(&self) -> Option<String> {
        self.0.clone()
    }
}
