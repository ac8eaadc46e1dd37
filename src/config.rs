//! Engine configuration and SSH algorithm policy tables.
//!
//! The algorithm lists are grouped by [`SecurityLevel`]: the secure set only
//! carries modern primitives, the balanced set adds SHA-1 and CBC variants
//! still common on switch firmware, and the legacy set accepts everything
//! `russh` can speak so that very old devices remain reachable.
//!
//! [`EngineConfig`] holds the numeric knobs consumed by the session registry
//! and the diagnostic workflows. It is read from JSON; a user file can
//! override any subset of a default file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::session::SecurityLevel;

/// Key exchange algorithms for [`SecurityLevel::Secure`].
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
];

/// Key exchange algorithms for [`SecurityLevel::Balanced`].
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA1,
];

/// Every key exchange algorithm, for [`SecurityLevel::LegacyCompatible`].
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::NONE,
];

pub const SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub const BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

/// Includes `none`/`clear` for devices that never negotiated encryption.
pub const LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
    cipher::CLEAR,
    cipher::NONE,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
    mac::NONE,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];

/// Algorithm lists offered during SSH negotiation for one security level.
#[derive(Debug)]
pub struct AlgorithmSet {
    pub kex: &'static [kex::Name],
    pub key: &'static [Algorithm],
    pub cipher: &'static [cipher::Name],
    pub mac: &'static [mac::Name],
}

pub const SECURE_ALGORITHMS: AlgorithmSet = AlgorithmSet {
    kex: SECURE_KEX_ORDER,
    key: SECURE_KEY_TYPES,
    cipher: SECURE_CIPHERS,
    mac: SECURE_MAC_ALGORITHMS,
};

pub const BALANCED_ALGORITHMS: AlgorithmSet = AlgorithmSet {
    kex: BALANCED_KEX_ORDER,
    key: BALANCED_KEY_TYPES,
    cipher: BALANCED_CIPHERS,
    mac: BALANCED_MAC_ALGORITHMS,
};

pub const LEGACY_ALGORITHMS: AlgorithmSet = AlgorithmSet {
    kex: LEGACY_KEX_ORDER,
    key: LEGACY_KEY_TYPES,
    cipher: LEGACY_CIPHERS,
    mac: LEGACY_MAC_ALGORITHMS,
};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    pub network: NetworkConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Connection knobs. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connect and command timeout when the device does not override it.
    pub default_timeout: u64,
    /// Connection attempts before giving up.
    pub retry_attempts: u32,
    /// Pause between connection attempts.
    pub retry_delay: u64,
    /// Default worker pool size for batch connects and diagnostics.
    pub max_concurrent_connections: usize,
    /// Timeout of the liveness probe run before a session is reused.
    pub probe_timeout: u64,
    /// Sessions unused for this long are closed and dropped from the
    /// registry. Zero keeps sessions until they are disconnected.
    pub session_idle_timeout: u64,
    /// Pattern the liveness probe expects back from the shell.
    pub liveness_prompt: String,
    /// SSH algorithm policy.
    pub security: SecurityLevel,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_timeout: 10,
            retry_attempts: 3,
            retry_delay: 2,
            max_concurrent_connections: 50,
            probe_timeout: 2,
            session_idle_timeout: 0,
            liveness_prompt: "#|>".to_string(),
            security: SecurityLevel::Secure,
        }
    }
}

impl NetworkConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// `None` when idle eviction is switched off.
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        (self.session_idle_timeout > 0).then(|| Duration::from_secs(self.session_idle_timeout))
    }
}

/// Workflow catalogue and analyzer thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Workflows keyed by the name callers pass to `run_workflow`.
    pub workflows: BTreeMap<String, WorkflowConfig>,
    pub thresholds: Thresholds,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        let builtin = [
            (
                "interface_health",
                "Interface Health Check",
                vec!["show interfaces", "show interfaces status"],
            ),
            (
                "cpu_memory",
                "CPU and Memory Check",
                vec!["show processes cpu", "show memory statistics"],
            ),
            (
                "connectivity",
                "Connectivity Check",
                vec!["show ip route", "ping 8.8.8.8"],
            ),
            ("log_analysis", "Log Analysis", vec!["show logging"]),
        ];
        let workflows = builtin
            .into_iter()
            .map(|(key, name, commands)| {
                (
                    key.to_string(),
                    WorkflowConfig {
                        name: name.to_string(),
                        enabled: true,
                        commands: commands.into_iter().map(str::to_string).collect(),
                    },
                )
            })
            .collect();
        Self {
            workflows,
            thresholds: Thresholds::default(),
        }
    }
}

/// A named, ordered command sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowConfig {
    /// Display name.
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub commands: Vec<String>,
}

fn enabled_by_default() -> bool {
    true
}

/// Percentage thresholds for the CPU/memory analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Thresholds {
    pub cpu_warning: u32,
    pub cpu_critical: u32,
    pub memory_warning: u32,
    pub memory_critical: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_warning: 80,
            cpu_critical: 90,
            memory_warning: 80,
            memory_critical: 90,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads `default_path` and merges `user_path` over it when the file exists.
    ///
    /// Objects are merged key by key; any other value in the user file
    /// replaces the default outright.
    pub fn load(default_path: &Path, user_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = read_json(default_path)?;
        info!("Default configuration loaded from {}", default_path.display());

        if let Some(path) = user_path.filter(|p| p.exists()) {
            let user = read_json(path)?;
            merge_values(&mut merged, user);
            info!("User configuration merged from {}", path.display());
        } else {
            debug!("No user configuration to merge");
        }

        Ok(serde_json::from_value(merged)?)
    }

    /// JSON schema of the configuration document.
    pub fn json_schema() -> Result<String, ConfigError> {
        let schema = schemars::schema_for!(EngineConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.network.default_timeout, 10);
        assert_eq!(config.network.retry_attempts, 3);
        assert_eq!(config.network.retry_delay, 2);
        assert_eq!(config.network.liveness_prompt, "#|>");
        assert_eq!(config.diagnostics.thresholds, Thresholds::default());
        assert_eq!(
            config.diagnostics.workflows.keys().collect::<Vec<_>>(),
            vec!["connectivity", "cpu_memory", "interface_health", "log_analysis"]
        );
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"network": {"retry_attempts": 5}, "diagnostics": {"thresholds": {"cpu_warning": 70}}}"#,
        )
        .expect("parse config");
        assert_eq!(config.network.retry_attempts, 5);
        assert_eq!(config.network.default_timeout, 10);
        assert_eq!(config.diagnostics.thresholds.cpu_warning, 70);
        assert_eq!(config.diagnostics.thresholds.cpu_critical, 90);
    }

    #[test]
    fn workflow_enabled_defaults_to_true() {
        let config = EngineConfig::from_json_str(
            r#"{"diagnostics": {"workflows": {"test_workflow": {"name": "Test Workflow", "commands": ["show version"]}}}}"#,
        )
        .expect("parse config");
        let workflow = &config.diagnostics.workflows["test_workflow"];
        assert!(workflow.enabled);
        assert_eq!(workflow.commands, vec!["show version".to_string()]);
    }

    #[test]
    fn user_file_overrides_default_file_recursively() {
        let mut default_file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            default_file,
            r#"{{"network": {{"default_timeout": 10, "retry_attempts": 3}},
                "diagnostics": {{"thresholds": {{"cpu_warning": 80, "cpu_critical": 90}}}}}}"#
        )
        .expect("write default");
        let mut user_file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            user_file,
            r#"{{"network": {{"retry_attempts": 1}}, "diagnostics": {{"thresholds": {{"cpu_critical": 95}}}}}}"#
        )
        .expect("write user");

        let config = EngineConfig::load(default_file.path(), Some(user_file.path()))
            .expect("load layered config");
        assert_eq!(config.network.default_timeout, 10);
        assert_eq!(config.network.retry_attempts, 1);
        assert_eq!(config.diagnostics.thresholds.cpu_warning, 80);
        assert_eq!(config.diagnostics.thresholds.cpu_critical, 95);
    }

    #[test]
    fn missing_user_file_is_ignored() {
        let mut default_file = tempfile::NamedTempFile::new().expect("temp file");
        write!(default_file, r#"{{"network": {{"retry_delay": 0}}}}"#).expect("write default");
        let missing = default_file.path().with_extension("absent");

        let config =
            EngineConfig::load(default_file.path(), Some(&missing)).expect("load default only");
        assert_eq!(config.network.retry_delay, 0);
    }

    #[test]
    fn missing_default_file_is_an_io_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/rnetdiag.json"), None)
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn schema_mentions_thresholds() {
        let schema = EngineConfig::json_schema().expect("schema");
        assert!(schema.contains("cpu_critical"));
        assert!(schema.contains("liveness_prompt"));
    }
}
