use super::*;

/// How strictly SSH algorithms are negotiated.
///
/// Network gear often runs firmware that only speaks SHA-1 key exchange or
/// CBC ciphers; the weaker levels exist for those fleets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    #[default]
    Secure,
    Balanced,
    LegacyCompatible,
}

impl SecurityLevel {
    pub fn algorithms(self) -> &'static config::AlgorithmSet {
        match self {
            SecurityLevel::Secure => &config::SECURE_ALGORITHMS,
            SecurityLevel::Balanced => &config::BALANCED_ALGORITHMS,
            SecurityLevel::LegacyCompatible => &config::LEGACY_ALGORITHMS,
        }
    }

    /// Legacy devices rarely have stable host keys in known_hosts.
    pub fn verifies_host_keys(self) -> bool {
        self != SecurityLevel::LegacyCompatible
    }
}

/// Algorithm policy plus host key verification for new sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    pub level: SecurityLevel,
    pub server_check: ServerCheckMethod,
}

impl ConnectionSecurityOptions {
    pub fn new(level: SecurityLevel) -> Self {
        let server_check = if level.verifies_host_keys() {
            ServerCheckMethod::DefaultKnownHostsFile
        } else {
            ServerCheckMethod::NoCheck
        };
        Self {
            level,
            server_check,
        }
    }

    /// Verifies host keys against a specific known_hosts file.
    pub fn with_known_hosts(mut self, path: impl Into<String>) -> Self {
        self.server_check = ServerCheckMethod::KnownHostsFile(path.into());
        self
    }

    /// Accepts any host key. Lab use only.
    pub fn without_host_check(mut self) -> Self {
        self.server_check = ServerCheckMethod::NoCheck;
        self
    }

    pub(super) fn preferred(&self) -> Preferred {
        let set = self.level.algorithms();
        Preferred {
            kex: Cow::Borrowed(set.kex),
            key: Cow::Borrowed(set.key),
            cipher: Cow::Borrowed(set.cipher),
            mac: Cow::Borrowed(set.mac),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        }
    }
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::new(SecurityLevel::Secure)
    }
}

impl From<SecurityLevel> for ConnectionSecurityOptions {
    fn from(level: SecurityLevel) -> Self {
        Self::new(level)
    }
}

#[cfg(test)]
mod tests {
    use async_ssh2_tokio::ServerCheckMethod;
    use russh::{cipher, kex, mac};

    use super::{ConnectionSecurityOptions, SecurityLevel};

    #[test]
    fn default_options_verify_host_keys_with_secure_algorithms() {
        let options = ConnectionSecurityOptions::default();
        assert_eq!(options.level, SecurityLevel::Secure);
        assert_eq!(options.server_check, ServerCheckMethod::DefaultKnownHostsFile);
    }

    #[test]
    fn legacy_level_skips_host_key_check() {
        let options = ConnectionSecurityOptions::from(SecurityLevel::LegacyCompatible);
        assert_eq!(options.server_check, ServerCheckMethod::NoCheck);

        let pinned = ConnectionSecurityOptions::new(SecurityLevel::Balanced)
            .with_known_hosts("/etc/rnetdiag/known_hosts");
        assert_eq!(
            pinned.server_check,
            ServerCheckMethod::KnownHostsFile("/etc/rnetdiag/known_hosts".to_string())
        );
    }

    #[test]
    fn level_is_snake_case_in_config() {
        let level: SecurityLevel =
            serde_json::from_str("\"legacy_compatible\"").expect("parse level");
        assert_eq!(level, SecurityLevel::LegacyCompatible);
    }

    #[test]
    fn only_legacy_offers_plaintext_and_sha1_group1() {
        let secure = ConnectionSecurityOptions::default().preferred();
        assert!(!secure.kex.contains(&kex::NONE));
        assert!(!secure.cipher.contains(&cipher::NONE));
        assert!(!secure.cipher.contains(&cipher::CLEAR));
        assert!(!secure.mac.contains(&mac::NONE));

        let balanced = ConnectionSecurityOptions::new(SecurityLevel::Balanced).preferred();
        assert!(balanced.cipher.contains(&cipher::AES_128_CBC));
        assert!(!balanced.kex.contains(&kex::DH_G1_SHA1));

        let legacy = ConnectionSecurityOptions::new(SecurityLevel::LegacyCompatible).preferred();
        assert!(legacy.kex.contains(&kex::DH_G1_SHA1));
        assert!(legacy.cipher.contains(&cipher::NONE));
    }
}
