//! Wire-level records returned by the appliance REST API.
//!
//! The appliance serializes most numeric properties as strings; the
//! deserializers here tolerate either form.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Outcome of one REST exchange: HTTP status plus the decoded body envelope.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub code: u16,
    pub error: Option<ErrorEnvelope>,
    pub data: Option<Value>,
}

impl RestResponse {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.code)
    }

    /// Decode the `data` field into a typed record.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Decode `data.entries` (paginated listings).
    pub fn decode_entries<T: serde::de::DeserializeOwned>(&self) -> Option<Vec<T>> {
        #[derive(Deserialize)]
        struct Entries<T> {
            entries: Vec<T>,
        }
        self.decode::<Entries<T>>().map(|e| e.entries)
    }
}

/// Appliance error envelope: `{class, code, errno, message}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub class: Option<String>,

    #[serde(default)]
    pub code: Option<Value>,

    #[serde(default)]
    pub errno: Option<Value>,

    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    /// The appliance emits `errno` as a number or a decimal string
    /// depending on the firmware revision.
    pub fn errno(&self) -> Option<i64> {
        match self.errno.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn class(&self) -> &str {
        self.class.as_deref().unwrap_or("Unknown")
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown")
    }
}

fn u64_from_any<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    match Value::deserialize(de)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("negative size")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("bad numeric string '{s}'"))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

fn opt_u64_from_any<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_u64()),
        Some(Value::String(s)) => Ok(s.trim().parse().ok()),
        Some(_) => Ok(None),
    }
}

fn i64_from_any<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    match Value::deserialize(de)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("not an integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("bad numeric string '{s}'"))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

/// A zvol as reported by the appliance.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeRecord {
    pub name: String,

    #[serde(default, deserialize_with = "opt_u64_from_any")]
    pub volsize: Option<u64>,

    /// `"<pool>/<parent_volume>@<parent_snapshot>"` when this is a clone.
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub creation: Option<String>,

    /// Remaining opaque properties (`san:volume_id`, `default_scsi_id`, ...).
    #[serde(flatten)]
    pub props: HashMap<String, Value>,
}

impl VolumeRecord {
    pub fn size_bytes(&self) -> u64 {
        self.volsize.unwrap_or(0)
    }

    pub fn is_cloned(&self) -> bool {
        self.origin.as_deref().is_some_and(|o| !o.is_empty())
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }
}

/// A snapshot as reported by the appliance.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRecord {
    pub name: String,

    /// Creation timestamp, ISO `YYYY-MM-DD HH:MM:SS`.
    #[serde(default)]
    pub creation: Option<String>,

    /// Comma-separated `"<pool>/<child_volume>"` list; may be absent or empty.
    #[serde(default)]
    pub clones: Option<String>,

    #[serde(default)]
    pub guid: Option<String>,

    #[serde(flatten)]
    pub props: HashMap<String, Value>,
}

impl SnapshotRecord {
    /// Physical names of clone volumes referencing this snapshot.
    pub fn clone_names(&self) -> Vec<String> {
        match self.clones.as_deref() {
            None | Some("") => Vec::new(),
            Some(csv) => csv
                .split(',')
                .filter_map(|c| c.split('/').nth(1))
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn creation_str(&self) -> &str {
        self.creation.as_deref().unwrap_or("")
    }
}

/// Assigned-VIP block of a target record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VipPortals {
    #[serde(default)]
    pub assigned_vips: Vec<String>,
}

/// An iSCSI target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetRecord {
    pub name: String,

    #[serde(default)]
    pub active: Option<bool>,

    #[serde(default)]
    pub incoming_users_active: Option<bool>,

    #[serde(default)]
    pub vip_allowed_portals: Option<VipPortals>,

    #[serde(flatten)]
    pub props: HashMap<String, Value>,
}

impl TargetRecord {
    pub fn assigned_vips(&self) -> &[String] {
        self.vip_allowed_portals
            .as_ref()
            .map(|p| p.assigned_vips.as_slice())
            .unwrap_or(&[])
    }
}

/// A LUN slot on a target.
#[derive(Debug, Clone, Deserialize)]
pub struct LunRecord {
    pub name: String,

    #[serde(deserialize_with = "i64_from_any")]
    pub lun: i64,

    #[serde(default)]
    pub mode: Option<String>,
}

/// An incoming (CHAP) user on a target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetUserRecord {
    pub name: String,
}

/// A VIP known to the appliance.
#[derive(Debug, Clone, Deserialize)]
pub struct VipRecord {
    pub name: String,
    pub address: String,
}

/// Pool capacity properties.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolRecord {
    pub name: String,

    #[serde(deserialize_with = "u64_from_any")]
    pub size: u64,

    #[serde(deserialize_with = "u64_from_any")]
    pub available: u64,
}

/// A NAS volume (dataset).
#[derive(Debug, Clone, Deserialize)]
pub struct NasVolumeRecord {
    pub name: String,

    #[serde(default, deserialize_with = "opt_u64_from_any")]
    pub quota: Option<u64>,

    #[serde(default, deserialize_with = "opt_u64_from_any")]
    pub reservation: Option<u64>,

    #[serde(flatten)]
    pub props: HashMap<String, Value>,
}

/// An NFS/SMB share.
#[derive(Debug, Clone, Deserialize)]
pub struct ShareRecord {
    pub name: String,

    #[serde(default)]
    pub path: Option<String>,

    /// Filesystem path the share is actually served from; populated by the
    /// appliance shortly after creation.
    #[serde(default)]
    pub real_path: Option<String>,

    #[serde(default)]
    pub nfs: Option<Value>,

    #[serde(default)]
    pub smb: Option<Value>,
}

/// A local appliance user (SMB access).
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub name: String,
}

/// Rollback dependency counts reported by the appliance.
#[derive(Debug, Clone, Deserialize)]
pub struct RollbackInfo {
    #[serde(deserialize_with = "u64_from_any")]
    pub snapshots: u64,

    #[serde(deserialize_with = "u64_from_any")]
    pub clones: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_record_with_string_numbers() {
        let v: VolumeRecord = serde_json::from_str(
            r#"{
                "name": "v_vol1",
                "volsize": "1073741824",
                "origin": null,
                "san:volume_id": "abc-123"
            }"#,
        )
        .unwrap();
        assert_eq!(v.size_bytes(), 1073741824);
        assert!(!v.is_cloned());
        assert_eq!(v.prop_str("san:volume_id"), Some("abc-123"));
    }

    #[test]
    fn test_cloned_volume_origin() {
        let v: VolumeRecord = serde_json::from_str(
            r#"{"name": "v_child", "volsize": 65536, "origin": "Pool-0/v_base@s_snap-1"}"#,
        )
        .unwrap();
        assert!(v.is_cloned());
    }

    #[test]
    fn test_snapshot_clone_names() {
        let s: SnapshotRecord = serde_json::from_str(
            r#"{"name": "s_a", "creation": "2025-05-27 16:08:35",
                "clones": "Pool-0/v_one,Pool-0/se_a_OZXWY---"}"#,
        )
        .unwrap();
        assert_eq!(s.clone_names(), vec!["v_one", "se_a_OZXWY---"]);

        let s: SnapshotRecord =
            serde_json::from_str(r#"{"name": "s_b", "clones": ""}"#).unwrap();
        assert!(s.clone_names().is_empty());

        let s: SnapshotRecord = serde_json::from_str(r#"{"name": "s_c"}"#).unwrap();
        assert!(s.clone_names().is_empty());
    }

    #[test]
    fn test_errno_string_or_int() {
        let e: ErrorEnvelope =
            serde_json::from_str(r#"{"errno": "5", "message": "m"}"#).unwrap();
        assert_eq!(e.errno(), Some(5));
        let e: ErrorEnvelope = serde_json::from_str(r#"{"errno": 1}"#).unwrap();
        assert_eq!(e.errno(), Some(1));
        let e: ErrorEnvelope = serde_json::from_str(r#"{"message": "m"}"#).unwrap();
        assert_eq!(e.errno(), None);
    }

    #[test]
    fn test_lun_record_numeric_forms() {
        let l: LunRecord =
            serde_json::from_str(r#"{"name": "v_a", "lun": "3"}"#).unwrap();
        assert_eq!(l.lun, 3);
        let l: LunRecord = serde_json::from_str(r#"{"name": "v_a", "lun": 0}"#).unwrap();
        assert_eq!(l.lun, 0);
    }

    #[test]
    fn test_pool_record() {
        let p: PoolRecord = serde_json::from_str(
            r#"{"name": "Pool-0", "size": "29796335616", "available": "24433164288"}"#,
        )
        .unwrap();
        assert_eq!(p.size, 29796335616);
        assert_eq!(p.available, 24433164288);
    }

    #[test]
    fn test_entries_decoding() {
        let resp = RestResponse {
            code: 200,
            error: None,
            data: Some(serde_json::json!({"entries": [{"name": "s_x"}]})),
        };
        let snaps: Vec<SnapshotRecord> = resp.decode_entries().unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].name, "s_x");
    }
}
