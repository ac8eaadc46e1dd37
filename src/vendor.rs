//! Built-in vendor profiles.
//!
//! Each supported vendor maps to a static [`VendorProfile`] describing how
//! to drive its CLI: prompt shapes, how to turn off paging, whether an
//! `enable` step exists, and which commands dump the configuration.
//! Unrecognised vendor tags fall back to the Cisco profile.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Vendors with a dedicated profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    Cisco,
    Juniper,
    Hp,
    Huawei,
    MikroTik,
    Aruba,
}

/// All vendors with a built-in profile.
pub const BUILTIN_VENDORS: &[Vendor] = &[
    Vendor::Cisco,
    Vendor::Juniper,
    Vendor::Hp,
    Vendor::Huawei,
    Vendor::MikroTik,
    Vendor::Aruba,
];

/// Which stored configuration to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigKind {
    RunningConfig,
    StartupConfig,
}

/// CLI capabilities of one vendor family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorProfile {
    pub vendor: Vendor,
    /// Display name used in logs and reports.
    pub name: &'static str,
    /// Platform identifier, e.g. `cisco_ios`.
    pub platform: &'static str,
    /// Regexes matching the last line of output when the shell is idle.
    pub prompt_patterns: &'static [&'static str],
    /// Command that disables output paging, sent once after login.
    pub paging_command: Option<&'static str>,
    /// Command that raises privileges when an enable password is configured.
    pub enable_command: Option<&'static str>,
    pub running_config_command: &'static str,
    pub startup_config_command: &'static str,
}

impl VendorProfile {
    pub fn config_command(&self, kind: ConfigKind) -> &'static str {
        match kind {
            ConfigKind::RunningConfig => self.running_config_command,
            ConfigKind::StartupConfig => self.startup_config_command,
        }
    }
}

static CISCO: VendorProfile = VendorProfile {
    vendor: Vendor::Cisco,
    name: "Cisco",
    platform: "cisco_ios",
    prompt_patterns: &[r"[\w.\-@/:()]+[>#]\s*$"],
    paging_command: Some("terminal length 0"),
    enable_command: Some("enable"),
    running_config_command: "show running-config",
    startup_config_command: "show startup-config",
};

static JUNIPER: VendorProfile = VendorProfile {
    vendor: Vendor::Juniper,
    name: "Juniper",
    platform: "juniper_junos",
    prompt_patterns: &[r"[\w.\-]+@[\w.\-]+[>%#]\s*$", r"^[>%#]\s*$"],
    paging_command: Some("set cli screen-length 0"),
    enable_command: None,
    running_config_command: "show configuration",
    startup_config_command: "show configuration",
};

static HP: VendorProfile = VendorProfile {
    vendor: Vendor::Hp,
    name: "HP",
    platform: "hp_procurve",
    prompt_patterns: &[r"[\w.\-()]+[>#]\s*$", r"<[\w.\-]+>\s*$"],
    paging_command: Some("no page"),
    enable_command: None,
    running_config_command: "display current-configuration",
    startup_config_command: "display saved-configuration",
};

static HUAWEI: VendorProfile = VendorProfile {
    vendor: Vendor::Huawei,
    name: "Huawei",
    platform: "huawei",
    prompt_patterns: &[r"<[\w.\-]+>\s*$", r"\[[~*]?[\w.\-/]+\]\s*$"],
    paging_command: Some("screen-length 0 temporary"),
    enable_command: None,
    running_config_command: "display current-configuration",
    startup_config_command: "display saved-configuration",
};

// MikroTik and Aruba have no config commands of their own; they retrieve
// configuration with the Cisco commands.
static MIKROTIK: VendorProfile = VendorProfile {
    vendor: Vendor::MikroTik,
    name: "MikroTik",
    platform: "mikrotik_routeros",
    prompt_patterns: &[r"\[[^\]]+\]\s*>\s*$"],
    paging_command: None,
    enable_command: None,
    running_config_command: "show running-config",
    startup_config_command: "show startup-config",
};

static ARUBA: VendorProfile = VendorProfile {
    vendor: Vendor::Aruba,
    name: "Aruba",
    platform: "aruba_os",
    prompt_patterns: &[r"[\w.\-()]+\s*[>#]\s*$"],
    paging_command: Some("no paging"),
    enable_command: None,
    running_config_command: "show running-config",
    startup_config_command: "show startup-config",
};

impl Vendor {
    /// Parses a vendor tag (case-insensitive). `None` when unrecognised.
    pub fn parse(tag: &str) -> Option<Vendor> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "cisco" => Some(Vendor::Cisco),
            "juniper" => Some(Vendor::Juniper),
            "hp" => Some(Vendor::Hp),
            "huawei" => Some(Vendor::Huawei),
            "mikrotik" => Some(Vendor::MikroTik),
            "aruba" => Some(Vendor::Aruba),
            _ => None,
        }
    }

    /// Resolves a free-form vendor tag.
    ///
    /// Missing or unrecognised tags resolve to [`Vendor::Cisco`].
    pub fn from_tag(tag: Option<&str>) -> Vendor {
        tag.and_then(Vendor::parse).unwrap_or(Vendor::Cisco)
    }

    pub fn profile(self) -> &'static VendorProfile {
        match self {
            Vendor::Cisco => &CISCO,
            Vendor::Juniper => &JUNIPER,
            Vendor::Hp => &HP,
            Vendor::Huawei => &HUAWEI,
            Vendor::MikroTik => &MIKROTIK,
            Vendor::Aruba => &ARUBA,
        }
    }
}

/// Profiles of every built-in vendor.
pub fn vendor_catalog() -> Vec<&'static VendorProfile> {
    BUILTIN_VENDORS.iter().map(|v| v.profile()).collect()
}
