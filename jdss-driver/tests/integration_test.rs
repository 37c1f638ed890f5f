//! Integration tests for the driver library.
//!
//! These exercise the pure layers (name codec, error classification,
//! snapshot graph logic, configuration) through the public API. REST-bound
//! behavior needs a live appliance and is out of scope here.

use jdss_driver::config::JdssConfig;
use jdss_driver::error::JdssError;
use jdss_driver::rest::{ErrorRules, Fault, RestResponse, SnapshotRecord};
use jdss_driver::{graph, names, parse_size, split_provider_auth};

// ============================================================================
// Name codec invariants
// ============================================================================

/// Every id from the allowed alphabet must survive a volume round-trip and
/// classify as a live volume.
#[test]
fn test_codec_volume_roundtrip_safe_alphabet() {
    for id in ["vm-101-disk-0", "base-100-state", "a", "Z_9-x"] {
        let physical = names::vname(id).unwrap();
        assert!(names::is_volume(&physical));
        assert!(!names::is_snapshot(&physical));
        assert!(!names::is_hidden(&physical));
        assert_eq!(names::idname(&physical).unwrap(), id);
    }
}

/// Ids outside the allowed alphabet must embed a reversible image.
#[test]
fn test_codec_volume_roundtrip_full_unicode() {
    for id in ["vm data", "disk#1", "диск", "100%", "a/b/c"] {
        let physical = names::vname(id).unwrap();
        assert!(names::is_volume(&physical));
        assert_eq!(names::idname(&physical).unwrap(), id);
    }
}

#[test]
fn test_codec_snapshot_roundtrip_matrix() {
    let cases = [
        ("snap-1", None),
        ("snap-1", Some("vol-a")),
        ("snap with space", None),
        ("snap with space", Some("vol with space")),
        ("under_scored_sid", Some("vol-b")),
    ];
    for (sid, vid) in cases {
        let physical = names::sname(sid, vid);
        assert!(names::is_snapshot(&physical), "{physical}");
        let (got_sid, got_vid) = names::sname_to_id(&physical).unwrap();
        assert_eq!(got_sid, sid);
        assert_eq!(got_vid.as_deref(), vid);
    }
}

#[test]
fn test_codec_classes_partition() {
    let mut physical = vec![
        names::vname("plain").unwrap(),
        names::vname("not plain !").unwrap(),
        names::sname("s1", None),
        names::sname("s1", Some("plain")),
        names::sname("s p a c e", Some("v")),
        names::hidden("v_plain").unwrap(),
        names::hidden(&names::sname("s1", Some("plain"))).unwrap(),
    ];
    physical.push("vb_MFRGG---".to_string()); // historical volume scheme
    for name in &physical {
        let count = [
            names::is_volume(name),
            names::is_snapshot(name),
            names::is_hidden(name),
        ]
        .iter()
        .filter(|c| **c)
        .count();
        assert_eq!(count, 1, "{name} must fall into exactly one class");
    }
}

// ============================================================================
// Error classifier
// ============================================================================

fn error_response(code: u16, class: Option<&str>, message: Option<&str>) -> RestResponse {
    let envelope = serde_json::json!({
        "class": class,
        "message": message,
    });
    RestResponse {
        code,
        error: serde_json::from_value(envelope).ok(),
        data: None,
    }
}

#[test]
fn test_classifier_maps_backend_envelopes() {
    let rules = ErrorRules::new();

    let busy = error_response(
        500,
        Some("opene.storage.zfs.ZfsOeError"),
        Some("In order to delete a zvol, you must delete all of its clones first."),
    );
    assert_eq!(rules.classify(&busy), Some(Fault::Busy));

    let missing = error_response(
        500,
        None,
        Some("Zfs resource: Pool-0/v_x not found in this collection."),
    );
    assert_eq!(rules.classify(&missing), Some(Fault::NotFound));

    let exhausted = error_response(
        500,
        None,
        Some("New zvol size(1000) exceeds available space on pool Pool-0(10)."),
    );
    assert_eq!(rules.classify(&exhausted), Some(Fault::Exhausted));
}

#[test]
fn test_exit_codes_cover_the_taxonomy() {
    let errors = [
        JdssError::CommunicationFailure {
            hosts: vec!["h".into()],
            path: "/".into(),
        },
        JdssError::RestProtocol {
            path: "/".into(),
            code: 500,
            class: "X".into(),
            message: "m".into(),
        },
        JdssError::Outdated("f".into()),
        JdssError::volume_not_found("v"),
        JdssError::Exhausted,
        JdssError::OsInternal("o".into()),
    ];
    let codes: Vec<i32> = errors.iter().map(JdssError::exit_code).collect();
    let mut unique = codes.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(codes.len(), unique.len(), "exit codes must be distinct");
    assert!(codes.iter().all(|c| *c != 0), "no failure exits 0");
}

// ============================================================================
// Graph logic
// ============================================================================

fn snapshot(name: &str, creation: &str, clones: &str) -> SnapshotRecord {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "creation": creation,
        "clones": clones,
    }))
    .unwrap()
}

#[test]
fn test_rollback_to_newest_snapshot_has_no_dependencies() {
    let snaps = vec![
        snapshot("s_old", "2025-01-01 00:00:00", ""),
        snapshot("s_new", "2025-03-01 00:00:00", ""),
    ];
    let pivot = graph::parse_creation("2025-03-01 00:00:00");
    let newer = graph::snapshots_newer_than(&snaps, "s_new", pivot);
    assert!(newer.is_empty());
}

#[test]
fn test_rollback_to_older_snapshot_names_the_blockers() {
    let snaps = vec![
        snapshot("s_1", "2025-01-01 00:00:00", ""),
        snapshot("s_2", "2025-02-01 00:00:00", "Pool-0/v_child"),
    ];
    let pivot = graph::parse_creation("2025-01-01 00:00:00");
    let newer = graph::snapshots_newer_than(&snaps, "s_1", pivot);
    let blocked_by: Vec<_> = newer.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(blocked_by, vec!["s_2"]);
    assert_eq!(graph::all_clone_names(&newer), vec!["v_child"]);
}

#[test]
fn test_mount_clone_only_volume_is_not_busy_for_cascade() {
    // cascade delete treats snapshot-mount clones as removable
    let snaps = vec![snapshot(
        "s_exported",
        "2025-01-01 00:00:00",
        "Pool-0/se_exported_OZXWY---",
    )];
    assert!(graph::busy_snapshots(&snaps, false, true).is_empty());
    assert_eq!(graph::busy_snapshots(&snaps, false, false).len(), 1);
}

// ============================================================================
// Config & helpers
// ============================================================================

#[test]
fn test_config_toml_roundtrip_and_validation() {
    let cfg = JdssConfig::from_toml(
        r#"
        san_hosts = ["172.16.0.220"]
        jovian_pool = "Pool-1"
        jovian_block_size = "128K"
        "#,
    )
    .unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.jovian_pool, "Pool-1");

    let bad = JdssConfig::from_toml(r#"san_hosts = []"#).unwrap();
    assert!(bad.validate().is_err());
}

#[test]
fn test_size_and_auth_helpers() {
    assert_eq!(parse_size("10G").unwrap(), 10 * 1024 * 1024 * 1024);
    assert_eq!(parse_size("16K").unwrap(), 16384);
    let (method, user, password) = split_provider_auth("CHAP u p4ssw0rd12345").unwrap();
    assert_eq!((method, user, password), ("CHAP", "u", "p4ssw0rd12345"));
}
