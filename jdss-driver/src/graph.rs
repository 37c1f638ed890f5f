//! Pure operations over snapshot/clone dependency data.
//!
//! The traversal across volumes lives on the driver (it needs REST); the
//! filtering and selection logic over already-fetched records lives here so
//! it can be exercised without an appliance.

use chrono::NaiveDateTime;

use crate::names;
use crate::rest::SnapshotRecord;

const CREATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an appliance creation timestamp.
pub fn parse_creation(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, CREATION_FORMAT).ok()
}

/// Snapshots whose clone set is non-empty after the requested class
/// exclusions. A snapshot whose only clones are excluded classes is not
/// considered busy.
pub fn busy_snapshots<'a>(
    snapshots: &'a [SnapshotRecord],
    exclude_dedicated_volumes: bool,
    exclude_dedicated_snapshots: bool,
) -> Vec<&'a SnapshotRecord> {
    snapshots
        .iter()
        .filter(|snap| {
            snap.clone_names().iter().any(|clone| {
                if exclude_dedicated_volumes && names::is_volume(clone) {
                    return false;
                }
                if exclude_dedicated_snapshots && names::is_snapshot(clone) {
                    return false;
                }
                true
            })
        })
        .collect()
}

/// Name of the newest snapshot by creation time. Unparseable or missing
/// timestamps lose to any parseable one; ties break to the lexicographically
/// larger name so the result is stable across orderings.
pub fn newest_snapshot_name(snapshots: &[SnapshotRecord]) -> Option<String> {
    snapshots
        .iter()
        .max_by(|a, b| {
            let da = parse_creation(a.creation_str());
            let db = parse_creation(b.creation_str());
            da.cmp(&db).then_with(|| a.name.cmp(&b.name))
        })
        .map(|s| s.name.clone())
}

/// Snapshots strictly newer than the pivot (the resources a rollback to the
/// pivot would destroy). The pivot itself is never included; snapshots with
/// unparseable timestamps are kept as a conservative over-approximation.
pub fn snapshots_newer_than<'a>(
    snapshots: &'a [SnapshotRecord],
    pivot_name: &str,
    pivot_creation: Option<NaiveDateTime>,
) -> Vec<&'a SnapshotRecord> {
    snapshots
        .iter()
        .filter(|snap| {
            if snap.name == pivot_name {
                return false;
            }
            match (parse_creation(snap.creation_str()), pivot_creation) {
                (Some(c), Some(p)) => c >= p,
                _ => true,
            }
        })
        .collect()
}

/// All clone names referenced by any snapshot in the set.
pub fn all_clone_names(snapshots: &[&SnapshotRecord]) -> Vec<String> {
    let mut out = Vec::new();
    for snap in snapshots {
        out.extend(snap.clone_names());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(name: &str, creation: &str, clones: &str) -> SnapshotRecord {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "creation": creation,
            "clones": clones,
        }))
        .unwrap()
    }

    #[test]
    fn test_newest_snapshot() {
        let snaps = vec![
            snap("s_a", "2025-01-01 10:00:00", ""),
            snap("s_b", "2025-01-02 10:00:00", ""),
            snap("s_c", "2025-01-01 23:59:59", ""),
        ];
        assert_eq!(newest_snapshot_name(&snaps).as_deref(), Some("s_b"));
    }

    #[test]
    fn test_newest_snapshot_monotonic_under_older_additions() {
        let mut snaps = vec![
            snap("s_new", "2025-06-01 00:00:00", ""),
            snap("s_old", "2025-01-01 00:00:00", ""),
        ];
        let before = newest_snapshot_name(&snaps);
        snaps.push(snap("s_older", "2024-12-31 00:00:00", ""));
        assert_eq!(newest_snapshot_name(&snaps), before);
    }

    #[test]
    fn test_newest_snapshot_tie_is_stable() {
        let a = vec![
            snap("s_a", "2025-01-01 10:00:00", ""),
            snap("s_b", "2025-01-01 10:00:00", ""),
        ];
        let b = vec![
            snap("s_b", "2025-01-01 10:00:00", ""),
            snap("s_a", "2025-01-01 10:00:00", ""),
        ];
        assert_eq!(newest_snapshot_name(&a), newest_snapshot_name(&b));
    }

    #[test]
    fn test_newest_of_empty_is_none() {
        assert_eq!(newest_snapshot_name(&[]), None);
    }

    #[test]
    fn test_busy_snapshots_filters_by_class() {
        let snaps = vec![
            snap("s_free", "2025-01-01 00:00:00", ""),
            snap("s_vol", "2025-01-01 00:00:00", "Pool-0/v_child"),
            snap("s_mount", "2025-01-01 00:00:00", "Pool-0/se_x_MFRGG---"),
            snap("s_both", "2025-01-01 00:00:00", "Pool-0/v_c,Pool-0/se_y_MFRGG---"),
        ];

        let busy = busy_snapshots(&snaps, false, false);
        let names: Vec<_> = busy.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s_vol", "s_mount", "s_both"]);

        // excluding mount-point clones keeps only live-volume dependents
        let busy = busy_snapshots(&snaps, false, true);
        let names: Vec<_> = busy.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s_vol", "s_both"]);

        let busy = busy_snapshots(&snaps, true, false);
        let names: Vec<_> = busy.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s_mount", "s_both"]);

        assert!(busy_snapshots(&snaps, true, true).is_empty());
    }

    #[test]
    fn test_snapshots_newer_than() {
        let snaps = vec![
            snap("s_1", "2025-01-01 00:00:00", ""),
            snap("s_2", "2025-02-01 00:00:00", ""),
            snap("s_3", "2025-03-01 00:00:00", "Pool-0/v_dep"),
        ];
        let pivot = parse_creation("2025-01-15 00:00:00");
        let newer = snapshots_newer_than(&snaps, "s_x", pivot);
        let names: Vec<_> = newer.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s_2", "s_3"]);
        assert_eq!(all_clone_names(&newer), vec!["v_dep"]);
    }

    #[test]
    fn test_snapshots_newer_than_excludes_pivot_and_keeps_unparseable() {
        let snaps = vec![
            snap("s_pivot", "2025-01-01 00:00:00", ""),
            snap("s_odd", "not a date", ""),
        ];
        let pivot = parse_creation("2025-01-01 00:00:00");
        let newer = snapshots_newer_than(&snaps, "s_pivot", pivot);
        let names: Vec<_> = newer.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s_odd"]);
    }
}
