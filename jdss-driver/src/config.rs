//! Driver configuration.
//!
//! Loaded from a TOML file and/or assembled from CLI flags; the driver
//! treats the result as an immutable snapshot for the lifetime of one
//! invocation.

use serde::Deserialize;

use crate::error::{JdssError, Result};

/// Block sizes the appliance accepts for zvols.
pub const BLOCK_SIZE_OPTIONS: [&str; 9] = [
    "4K", "8K", "16K", "32K", "64K", "128K", "256K", "512K", "1M",
];

fn default_port() -> u16 {
    82
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_login() -> String {
    "admin".to_string()
}

fn default_pool() -> String {
    "Pool-0".to_string()
}

fn default_target_prefix() -> String {
    "iqn.2025-04.com.open-e.cinder:".to_string()
}

fn default_target_port() -> u16 {
    3260
}

fn default_true() -> bool {
    true
}

fn default_block_size() -> String {
    "16K".to_string()
}

fn default_chap_password_len() -> usize {
    12
}

fn default_rest_timeout() -> u64 {
    60
}

/// Configuration snapshot recognized by the driver.
#[derive(Debug, Clone, Deserialize)]
pub struct JdssConfig {
    /// Ordered list of appliance endpoints; failover walks this list.
    #[serde(default)]
    pub san_hosts: Vec<String>,

    #[serde(default = "default_port")]
    pub san_api_port: u16,

    /// `http` or `https`.
    #[serde(default = "default_protocol")]
    pub jovian_rest_protocol: String,

    #[serde(default = "default_login")]
    pub san_login: String,

    #[serde(default = "default_login")]
    pub san_password: String,

    #[serde(default = "default_pool")]
    pub jovian_pool: String,

    #[serde(default = "default_target_prefix")]
    pub target_prefix: String,

    #[serde(default = "default_target_port")]
    pub target_port: u16,

    #[serde(default = "default_true")]
    pub san_thin_provision: bool,

    #[serde(default = "default_block_size")]
    pub jovian_block_size: String,

    #[serde(default = "default_chap_password_len")]
    pub chap_password_len: usize,

    /// Whitelist of VIP addresses allowed for iSCSI targets; falls back to
    /// `san_hosts` when empty.
    #[serde(default)]
    pub iscsi_vip_addresses: Vec<String>,

    #[serde(default)]
    pub nfs_vip_addresses: Vec<String>,

    #[serde(default)]
    pub reserved_percentage: u8,

    #[serde(default = "default_rest_timeout")]
    pub rest_timeout_secs: u64,

    /// The appliance usually ships a self-signed certificate.
    #[serde(default)]
    pub tls_verify: bool,
}

impl Default for JdssConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl JdssConfig {
    /// Parse a TOML configuration document.
    pub fn from_toml(doc: &str) -> Result<Self> {
        toml::from_str(doc).map_err(|e| JdssError::Config(e.to_string()))
    }

    /// Check invariants that would otherwise surface as confusing REST
    /// failures much later.
    pub fn validate(&self) -> Result<()> {
        if self.san_hosts.is_empty() {
            return Err(JdssError::Config(
                "no hosts provided in configuration (san_hosts)".into(),
            ));
        }
        match self.jovian_rest_protocol.as_str() {
            "http" | "https" => {}
            other => {
                return Err(JdssError::Config(format!(
                    "jovian_rest_protocol must be http or https, got '{other}'"
                )));
            }
        }
        let bs = self.jovian_block_size.to_uppercase();
        if !BLOCK_SIZE_OPTIONS.contains(&bs.as_str()) {
            return Err(JdssError::Config(format!(
                "invalid jovian_block_size '{}', expected one of {}",
                self.jovian_block_size,
                BLOCK_SIZE_OPTIONS.join(", ")
            )));
        }
        Ok(())
    }

    /// Block size normalized to the appliance spelling.
    pub fn block_size(&self) -> String {
        self.jovian_block_size.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = JdssConfig::default();
        assert_eq!(cfg.san_api_port, 82);
        assert_eq!(cfg.jovian_rest_protocol, "https");
        assert_eq!(cfg.jovian_pool, "Pool-0");
        assert_eq!(cfg.jovian_block_size, "16K");
        assert!(cfg.san_thin_provision);
        assert_eq!(cfg.chap_password_len, 12);
        assert!(!cfg.tls_verify);
    }

    #[test]
    fn test_from_toml() {
        let cfg = JdssConfig::from_toml(
            r#"
            san_hosts = ["172.16.0.220", "172.16.0.221"]
            san_api_port = 11582
            jovian_pool = "Pool-2"
            san_login = "admin"
            san_password = "secret"
            jovian_block_size = "64K"
            iscsi_vip_addresses = ["192.168.21.100"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.san_hosts.len(), 2);
        assert_eq!(cfg.san_api_port, 11582);
        assert_eq!(cfg.jovian_pool, "Pool-2");
        assert_eq!(cfg.iscsi_vip_addresses, vec!["192.168.21.100"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_hosts() {
        let cfg = JdssConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_block_size() {
        let mut cfg = JdssConfig::default();
        cfg.san_hosts = vec!["10.0.0.1".into()];
        cfg.jovian_block_size = "3K".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_block_size_is_normalized() {
        let mut cfg = JdssConfig::default();
        cfg.jovian_block_size = "64k".into();
        assert_eq!(cfg.block_size(), "64K");
    }
}
