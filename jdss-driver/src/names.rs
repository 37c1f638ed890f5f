//! Reversible encoding between external identifiers and physical names.
//!
//! External ids supplied by the hypervisor integration may contain characters
//! that the appliance rejects. Ids made of `[A-Za-z0-9_-]` pass through after
//! a short class tag; anything else is embedded as an RFC-4648 Base32 image
//! with `=` padding replaced by `-` (the appliance rejects `=` too).
//!
//! Current write scheme: `v_`/`vh_` for volumes, `s_`/`se_`/`sb_` for
//! snapshots, `t_` for tombstoned objects. Historical prefixes (`vb_`, `te_`,
//! `autosnap_`) are still accepted on the read path.

use base32::Alphabet;
use uuid::Uuid;

use crate::error::{JdssError, ResourceKind, Result};

const B32: Alphabet = Alphabet::RFC4648 { padding: true };

/// Base32 image of a string, with `=` padding replaced by `-`.
pub fn b32_from_str(name: &str) -> String {
    base32::encode(B32, name.as_bytes()).replace('=', "-")
}

/// Inverse of [`b32_from_str`].
pub fn b32_to_str(encoded: &str) -> Result<String> {
    let data = base32::decode(B32, &encoded.replace('-', "="))
        .ok_or_else(|| bad_name(encoded, "not a base32 image"))?;
    String::from_utf8(data).map_err(|_| bad_name(encoded, "decoded bytes are not utf-8"))
}

fn bad_name(name: &str, why: &str) -> JdssError {
    JdssError::Config(format!("incorrect physical name '{name}': {why}"))
}

/// True if the id can be embedded into a physical name without encoding.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// True for live volume names, current and historical schemes.
pub fn is_volume(name: &str) -> bool {
    name.starts_with("v_") || name.starts_with("vh_") || name.starts_with("vb_")
}

/// True for snapshot names, including snapshot-mount clones (`se_`, `sb_`).
pub fn is_snapshot(name: &str) -> bool {
    name.starts_with("s_") || name.starts_with("se_") || name.starts_with("sb_")
}

/// True for tombstoned objects awaiting reaping.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with("t_") || name.starts_with("te_")
}

/// Convert an external volume id into its physical name.
///
/// Ids that already carry a volume tag are passed through; snapshot and
/// tombstone tags are rejected to keep the name classes disjoint.
pub fn vname(id: &str) -> Result<String> {
    if is_volume(id) {
        return Ok(id.to_string());
    }
    if is_snapshot(id) {
        return Err(JdssError::Config(format!(
            "attempt to use snapshot '{id}' as a volume"
        )));
    }
    if is_hidden(id) {
        return Err(JdssError::Config(format!(
            "attempt to use deleted object '{id}' as a volume"
        )));
    }
    if is_safe_id(id) {
        Ok(format!("v_{id}"))
    } else {
        Ok(format!("vh_{}_{}", sanitize(id), b32_from_str(id)))
    }
}

/// Convert a snapshot id (and optional owning volume id) into its physical
/// name. The volume id is carried for snapshot-mount clones so that the
/// owning volume can be recovered from the name alone.
pub fn sname(sid: &str, vid: Option<&str>) -> String {
    let vid = vid.filter(|v| !v.is_empty());
    let mut out = if is_safe_id(sid) {
        if vid.is_some() {
            format!("se_{sid}")
        } else {
            format!("s_{sid}")
        }
    } else {
        format!("sb_{}", b32_from_str(sid))
    };
    if let Some(vid) = vid {
        out.push('_');
        out.push_str(&b32_from_str(vid));
    }
    out
}

/// Decompose a physical snapshot name into `(snapshot id, volume id)`.
/// Total inverse of [`sname`] on its range.
pub fn sname_to_id(name: &str) -> Result<(String, Option<String>)> {
    let parts: Vec<&str> = name.split('_').collect();
    match parts[0] {
        "s" if parts.len() > 1 => Ok((parts[1..].join("_"), None)),
        "se" if parts.len() > 2 => {
            let sid = parts[1..parts.len() - 1].join("_");
            let vid = b32_to_str(parts[parts.len() - 1])?;
            Ok((sid, Some(vid)))
        }
        "sb" if parts.len() == 2 => Ok((b32_to_str(parts[1])?, None)),
        "sb" if parts.len() == 3 => {
            Ok((b32_to_str(parts[1])?, Some(b32_to_str(parts[2])?)))
        }
        "autosnap" if parts.len() > 1 => Ok((parts[1..].join("_"), None)),
        _ => Err(bad_name(name, "not a snapshot name")),
    }
}

/// Snapshot id encoded in a physical snapshot name.
pub fn sid_from_sname(name: &str) -> Result<String> {
    sname_to_id(name).map(|(sid, _)| sid)
}

/// Volume id encoded in a physical snapshot name, if any.
pub fn vid_from_sname(name: &str) -> Result<Option<String>> {
    sname_to_id(name).map(|(_, vid)| vid)
}

/// Extract the external id from a physical name of any class.
pub fn idname(name: &str) -> Result<String> {
    if let Some(rest) = name.strip_prefix("v_") {
        return Ok(rest.to_string());
    }
    if let Some(rest) = name.strip_prefix("vh_") {
        let encoded = rest
            .rsplit('_')
            .next()
            .ok_or_else(|| bad_name(name, "missing base32 segment"))?;
        return b32_to_str(encoded);
    }
    if let Some(rest) = name.strip_prefix("vb_") {
        return b32_to_str(rest);
    }
    if name.starts_with("te_") {
        let parts: Vec<&str> = name.split('_').collect();
        if parts.len() > 2 {
            return Ok(parts[1..parts.len() - 1].join("_"));
        }
    }
    if let Some(rest) = name.strip_prefix("t_") {
        return Ok(rest.to_string());
    }
    if is_snapshot(name) {
        return sid_from_sname(name);
    }
    Ok(name.to_string())
}

/// Tombstone a physical name: prepend `t_` and append a fresh 128-bit token
/// so tombstones of the same source never collide.
pub fn hidden(name: &str) -> Result<String> {
    if name.len() < 2 {
        return Err(JdssError::Config(format!("incorrect name '{name}'")));
    }
    let token = Uuid::new_v4().simple().to_string();
    let body = name
        .strip_prefix("v_")
        .or_else(|| name.strip_prefix("s_"))
        .unwrap_or(name);
    Ok(format!("t_{body}_{token}"))
}

/// Physical parent volume from an `origin` string `"<pool>/<volume>@<snapshot>"`.
pub fn origin_volume(origin: &str) -> Option<String> {
    let dataset = origin.split('@').next()?;
    dataset.split('/').nth(1).map(str::to_string)
}

/// Physical parent snapshot from an `origin` string.
pub fn origin_snapshot(origin: &str) -> Option<String> {
    origin.split('@').nth(1).map(str::to_string)
}

/// Report a dependency list, ten names per log line.
pub fn dependency_error(msg: &str, deps: &[String]) {
    tracing::error!("{msg}");
    for chunk in deps.chunks(10) {
        tracing::error!("{}", chunk.join(", "));
    }
}

/// Error for resources that turned out to have dependents: the dependents
/// are logged and a busy error for `name` is produced.
pub fn busy_with_dependents(
    kind: ResourceKind,
    name: &str,
    msg: &str,
    deps: &[String],
) -> JdssError {
    dependency_error(msg, deps);
    JdssError::Busy {
        kind,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_id_roundtrip() {
        for id in ["vmdata", "vm-101-disk-0", "a_b-c", "X9"] {
            let v = vname(id).unwrap();
            assert_eq!(v, format!("v_{id}"));
            assert!(is_volume(&v));
            assert!(!is_snapshot(&v));
            assert!(!is_hidden(&v));
            assert_eq!(idname(&v).unwrap(), id);
        }
    }

    #[test]
    fn test_unsafe_id_roundtrip() {
        for id in ["vm data", "disk/0", "päron", "a=b", "x@y:z"] {
            let v = vname(id).unwrap();
            assert!(v.starts_with("vh_"), "{v}");
            assert!(is_volume(&v));
            assert_eq!(idname(&v).unwrap(), id);
        }
    }

    #[test]
    fn test_vname_rejects_foreign_classes() {
        assert!(vname("s_snap").is_err());
        assert!(vname("t_gone").is_err());
    }

    #[test]
    fn test_vname_passthrough_for_tagged_names() {
        assert_eq!(vname("v_x").unwrap(), "v_x");
        assert_eq!(vname("vb_MFRGG---").unwrap(), "vb_MFRGG---");
    }

    #[test]
    fn test_sname_roundtrip_without_volume() {
        let n = sname("snap-1", None);
        assert_eq!(n, "s_snap-1");
        assert_eq!(sname_to_id(&n).unwrap(), ("snap-1".into(), None));
        assert_eq!(vid_from_sname(&n).unwrap(), None);
    }

    #[test]
    fn test_sname_roundtrip_with_volume() {
        let n = sname("snap_1", Some("vol-a"));
        assert!(n.starts_with("se_snap_1_"));
        let (sid, vid) = sname_to_id(&n).unwrap();
        assert_eq!(sid, "snap_1");
        assert_eq!(vid.as_deref(), Some("vol-a"));
    }

    #[test]
    fn test_sname_unsafe_sid() {
        let n = sname("snap 1", Some("vol b"));
        assert!(n.starts_with("sb_"));
        let (sid, vid) = sname_to_id(&n).unwrap();
        assert_eq!(sid, "snap 1");
        assert_eq!(vid.as_deref(), Some("vol b"));

        let n = sname("snap 1", None);
        assert!(n.starts_with("sb_"));
        assert_eq!(sname_to_id(&n).unwrap(), ("snap 1".into(), None));
    }

    #[test]
    fn test_sid_with_underscores_survives() {
        let n = sname("a_b_c", Some("v"));
        assert_eq!(sid_from_sname(&n).unwrap(), "a_b_c");
        let n = sname("a_b_c", None);
        assert_eq!(sid_from_sname(&n).unwrap(), "a_b_c");
    }

    #[test]
    fn test_historical_prefixes_read() {
        let encoded = b32_from_str("legacy id");
        assert_eq!(idname(&format!("vb_{encoded}")).unwrap(), "legacy id");
        assert_eq!(
            sname_to_id("autosnap_2024-01-01").unwrap(),
            ("2024-01-01".into(), None)
        );
        assert!(is_hidden("te_x_abc"));
    }

    #[test]
    fn test_classes_are_disjoint() {
        let names = [
            vname("plain").unwrap(),
            vname("need encoding").unwrap(),
            sname("snap", None),
            sname("snap", Some("plain")),
            sname("need encoding", None),
            hidden("v_plain").unwrap(),
        ];
        for n in &names {
            let classes = [is_volume(n), is_snapshot(n), is_hidden(n)];
            assert_eq!(
                classes.iter().filter(|c| **c).count(),
                1,
                "name {n} must belong to exactly one class"
            );
        }
    }

    #[test]
    fn test_hidden_is_unique() {
        let a = hidden("v_doomed").unwrap();
        let b = hidden("v_doomed").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("t_doomed_"));
        assert!(is_hidden(&a));
    }

    #[test]
    fn test_hidden_keeps_three_char_tags() {
        let h = hidden("se_snap_MFRGG---").unwrap();
        assert!(h.starts_with("t_se_snap_"));
    }

    #[test]
    fn test_origin_parsing() {
        let origin = "Pool-0/v_base@s_snap-1";
        assert_eq!(origin_volume(origin).as_deref(), Some("v_base"));
        assert_eq!(origin_snapshot(origin).as_deref(), Some("s_snap-1"));
        assert_eq!(origin_snapshot("garbage"), None);
    }

    #[test]
    fn test_idname_of_snapshot_mount() {
        let scname = sname("snap-1", Some("vol-1"));
        assert_eq!(idname(&scname).unwrap(), "snap-1");
    }
}
