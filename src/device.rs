//! Device identity, connectivity status and credential resolution.
//!
//! Devices are owned by the caller (usually a discovery sweep or an
//! inventory). The engine borrows them mutably only to record status
//! transitions; it never stores them.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vendor::{Vendor, VendorProfile};

/// Connectivity status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
    Connected,
    Disconnected,
    Error,
}

/// Coarse device classification reported by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    Switch,
    Firewall,
    AccessPoint,
    LoadBalancer,
    #[default]
    Unknown,
}

/// A network device as known to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub ip_address: String,
    pub hostname: Option<String>,
    /// Free-form vendor tag, e.g. `"Cisco"` or `"Huawei"`.
    pub vendor: Option<String>,
    #[serde(default)]
    pub device_type: DeviceType,
    /// Name of the credential set used to log in.
    pub credential_name: Option<String>,
    #[serde(default)]
    status: DeviceStatus,
    #[serde(default = "Utc::now")]
    last_seen: DateTime<Utc>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// Per-device connect timeout in seconds; falls back to the engine default.
    #[serde(default)]
    pub connection_timeout: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl Device {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            hostname: None,
            vendor: None,
            device_type: DeviceType::Unknown,
            credential_name: None,
            status: DeviceStatus::Unknown,
            last_seen: Utc::now(),
            ssh_port: default_ssh_port(),
            connection_timeout: None,
            tags: Vec::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_credential(mut self, credential_name: impl Into<String>) -> Self {
        self.credential_name = Some(credential_name.into());
        self
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Records a status transition and refreshes `last_seen`.
    pub fn update_status(&mut self, status: DeviceStatus) {
        self.status = status;
        self.last_seen = Utc::now();
    }

    pub fn is_reachable(&self) -> bool {
        matches!(
            self.status,
            DeviceStatus::Reachable | DeviceStatus::Connected
        )
    }

    pub fn is_connected(&self) -> bool {
        self.status == DeviceStatus::Connected
    }

    /// Vendor resolved from the free-form tag; unknown tags map to Cisco.
    pub fn vendor_kind(&self) -> Vendor {
        Vendor::from_tag(self.vendor.as_deref())
    }

    /// True when the vendor tag names a known vendor rather than falling back.
    pub fn has_known_vendor(&self) -> bool {
        self.vendor.as_deref().and_then(Vendor::parse).is_some()
    }

    pub fn profile(&self) -> &'static VendorProfile {
        self.vendor_kind().profile()
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }
}

/// Login material for one credential set.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub enable_password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            enable_password: None,
        }
    }

    pub fn with_enable(mut self, enable_password: impl Into<String>) -> Self {
        self.enable_password = Some(enable_password.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field(
                "enable_password",
                &self.enable_password.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// Resolves a credential name to login material.
///
/// Storage and encryption live outside this crate; implementors only need
/// to answer lookups.
pub trait CredentialStore: Send + Sync {
    fn resolve(&self, credential_name: &str) -> Option<Credentials>;
}

/// Credential store backed by a plain map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentials {
    entries: HashMap<String, Credentials>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, credential_name: impl Into<String>, credentials: Credentials) {
        self.entries.insert(credential_name.into(), credentials);
    }

    pub fn with(mut self, credential_name: impl Into<String>, credentials: Credentials) -> Self {
        self.insert(credential_name, credentials);
        self
    }
}

impl CredentialStore for InMemoryCredentials {
    fn resolve(&self, credential_name: &str) -> Option<Credentials> {
        self.entries.get(credential_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_status_refreshes_last_seen() {
        let mut device = Device::new("10.0.0.1");
        let before = device.last_seen();
        std::thread::sleep(std::time::Duration::from_millis(2));
        device.update_status(DeviceStatus::Connected);
        assert_eq!(device.status(), DeviceStatus::Connected);
        assert!(device.last_seen() > before);
        assert!(device.is_connected());
        assert!(device.is_reachable());
    }

    #[test]
    fn reachable_is_not_connected() {
        let mut device = Device::new("10.0.0.1");
        device.update_status(DeviceStatus::Reachable);
        assert!(device.is_reachable());
        assert!(!device.is_connected());
    }

    #[test]
    fn unknown_vendor_uses_cisco_profile() {
        let device = Device::new("10.0.0.1").with_vendor("Acme");
        assert_eq!(device.vendor_kind(), Vendor::Cisco);
        assert_eq!(device.profile().platform, "cisco_ios");
        assert_eq!(Device::new("10.0.0.2").vendor_kind(), Vendor::Cisco);
        assert!(!device.has_known_vendor());
        assert!(Device::new("10.0.0.3").with_vendor(" cisco ").has_known_vendor());
    }

    #[test]
    fn tags_are_deduplicated() {
        let mut device = Device::new("10.0.0.1");
        device.add_tag("core");
        device.add_tag("core");
        device.add_tag("lab");
        device.remove_tag("lab");
        assert_eq!(device.tags, vec!["core".to_string()]);
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds = Credentials::new("admin", "hunter2").with_enable("enable-secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("enable-secret"));
    }

    #[test]
    fn in_memory_store_resolves_known_names_only() {
        let store = InMemoryCredentials::new().with("lab", Credentials::new("admin", "pw"));
        assert_eq!(
            store.resolve("lab").map(|c| c.username),
            Some("admin".to_string())
        );
        assert!(store.resolve("prod").is_none());
    }

    #[test]
    fn device_roundtrips_through_json() {
        let mut device = Device::new("10.0.0.1")
            .with_hostname("core-sw1")
            .with_credential("lab");
        device.update_status(DeviceStatus::Unreachable);
        let json = serde_json::to_string(&device).expect("encode device");
        assert!(json.contains("\"status\":\"unreachable\""));
        let decoded: Device = serde_json::from_str(&json).expect("decode device");
        assert_eq!(decoded, device);
    }
}
