//! Driver for the JovianDSS storage appliance.
//!
//! Translates high-level intents into idempotent sequences of REST calls.
//! The driver holds no state beyond the configuration snapshot; the
//! appliance is the sole owner of all persistent entities, so every
//! operation re-reads before it acts and is safe to re-run.

mod nas;
mod snapshot;
mod target;
mod volume;

pub use nas::{NasSnapshotInfo, ShareInfo};
pub use snapshot::SnapshotInfo;
pub use target::{PublicationInfo, TargetAssignment};
pub use volume::{RollbackDependency, VolumeInfo};

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::config::JdssConfig;
use crate::error::{JdssError, Result};
use crate::rest::RestApi;

const GIB: u64 = 1024 * 1024 * 1024;

pub struct JdssDriver {
    cfg: JdssConfig,
    ra: RestApi,
}

impl JdssDriver {
    pub fn new(cfg: JdssConfig) -> Result<Self> {
        cfg.validate()?;
        let ra = RestApi::new(&cfg)?;
        Ok(Self { cfg, ra })
    }

    pub fn config(&self) -> &JdssConfig {
        &self.cfg
    }

    pub fn pool_name(&self) -> &str {
        self.ra.pool_name()
    }

    pub(crate) fn api(&self) -> &RestApi {
        &self.ra
    }

    /// Ordered endpoint list, also the iSCSI portal addresses.
    pub fn hosts(&self) -> &[String] {
        &self.cfg.san_hosts
    }

    /// Check config correctness by checking pool availability.
    pub async fn rest_config_is_ok(&self) -> Result<bool> {
        self.ra.is_pool_exists().await
    }

    /// Pool capacity as `(total_gb, free_gb)`, floored to whole gibibytes.
    pub async fn get_pool_stats(&self) -> Result<(u64, u64)> {
        let stats = self.ra.get_pool_stats().await?;
        Ok((stats.size / GIB, stats.available / GIB))
    }

    /// Drain a paginated listing until an empty page is observed.
    pub(crate) async fn list_all_pages<T, F, Fut>(&self, mut fetch: F) -> Result<Vec<T>>
    where
        F: FnMut(u64) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<T>>>,
    {
        let mut out = Vec::new();
        let mut page = 0;
        loop {
            let entries = fetch(page).await?;
            if entries.is_empty() {
                break;
            }
            out.extend(entries);
            page += 1;
        }
        Ok(out)
    }

    /// Generate a CHAP `provider_auth` triple with a random user and a
    /// password of the configured length.
    pub fn generate_provider_auth(&self) -> String {
        let mut rng = rand::thread_rng();
        let user: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        let password: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(self.cfg.chap_password_len.max(12))
            .map(char::from)
            .collect();
        format!("CHAP {user} {password}")
    }
}

/// Split a `"<method> <user> <password>"` triple.
pub fn split_provider_auth(auth: &str) -> Result<(&str, &str, &str)> {
    let mut it = auth.split_whitespace();
    match (it.next(), it.next(), it.next(), it.next()) {
        (Some(method), Some(user), Some(password), None) => Ok((method, user, password)),
        _ => Err(JdssError::Config(format!(
            "malformed provider auth '{auth}', expected '<method> <user> <password>'"
        ))),
    }
}

/// Parse a human size string (`10G`, `512M`, `1048576`) into bytes.
/// Suffixes are 1024-based.
pub fn parse_size(size: &str) -> Result<u64> {
    let size = size.trim();
    if size.is_empty() {
        return Err(JdssError::Config("empty size string".into()));
    }
    if let Ok(bytes) = size.parse::<u64>() {
        return Ok(bytes);
    }

    let (num, suffix) = size.split_at(size.len() - 1);
    let multiplier: u64 = match suffix.to_uppercase().as_str() {
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        "T" => 1024u64.pow(4),
        "P" => 1024u64.pow(5),
        _ => {
            return Err(JdssError::Config(format!(
                "unknown size suffix in '{size}'"
            )));
        }
    };
    let num: f64 = num
        .parse()
        .map_err(|_| JdssError::Config(format!("invalid size number in '{size}'")))?;
    if num < 0.0 {
        return Err(JdssError::Config(format!("negative size '{size}'")));
    }
    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("16k").unwrap(), 16384);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("10G").unwrap(), 10737418240);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert_eq!(parse_size("2T").unwrap(), 2 * 1024u64.pow(4));
        assert!(parse_size("").is_err());
        assert!(parse_size("10X").is_err());
        assert!(parse_size("G").is_err());
    }

    #[test]
    fn test_split_provider_auth() {
        let (method, user, password) = split_provider_auth("CHAP admin s3cr3tpass12").unwrap();
        assert_eq!(method, "CHAP");
        assert_eq!(user, "admin");
        assert_eq!(password, "s3cr3tpass12");
        assert!(split_provider_auth("CHAP useronly").is_err());
        assert!(split_provider_auth("").is_err());
        assert!(split_provider_auth("a b c d").is_err());
    }
}
