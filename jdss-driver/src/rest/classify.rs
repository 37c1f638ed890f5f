//! Classification of appliance error envelopes.
//!
//! The appliance reports failures through a mix of HTTP statuses, Python
//! exception class names and free-text messages that vary between firmware
//! revisions. This module reduces a `(status, class, message, errno)` tuple
//! to a small closed set of faults through an ordered rule list; the REST
//! facade then attaches resource identity to produce the taxonomy error.
//! Supporting a new backend revision means extending the rule list.

use regex::Regex;

use super::types::RestResponse;

/// Fault classes the rules can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The addressed resource does not exist.
    NotFound,
    /// The resource has dependents that block the operation.
    Busy,
    /// A resource with that identity already exists.
    Exists,
    /// A dataset (NAS namespace) with that identity already exists.
    DatasetExists,
    /// The pool or zvol ran out of space.
    Exhausted,
    /// Appliance-internal failure.
    OsInternal,
}

/// One classification rule; all present fields must match.
struct Rule {
    status: Option<u16>,
    class: Option<Regex>,
    message: Option<Regex>,
    errno: Option<i64>,
    fault: Fault,
}

impl Rule {
    fn matches(&self, resp: &RestResponse) -> bool {
        if let Some(status) = self.status {
            if resp.code != status {
                return false;
            }
        }
        let envelope = resp.error.as_ref();
        if let Some(class_re) = &self.class {
            match envelope.and_then(|e| e.class.as_deref()) {
                Some(class) if class_re.is_match(class) => {}
                _ => return false,
            }
        }
        if let Some(message_re) = &self.message {
            match envelope.and_then(|e| e.message.as_deref()) {
                Some(message) if message_re.is_match(message) => {}
                _ => return false,
            }
        }
        if let Some(errno) = self.errno {
            if envelope.and_then(|e| e.errno()) != Some(errno) {
                return false;
            }
        }
        true
    }
}

/// Ordered rule set; compiled once per driver instance.
pub struct ErrorRules {
    rules: Vec<Rule>,
}

const RESOURCE_DNE_MSG: &str = r"^Zfs resource: .* not found in this collection\.$";
const HAS_CLONES_MSG: &str =
    r"^In order to delete a zvol, you must delete all of its clones first\.$";
const HAS_CLONES_CLASS: &str = r"^opene\.storage\.zfs(\.zfs)?\.ZfsOeError$";
const HAS_SNAPSHOTS_MSG: &str =
    r"^cannot destroy '.*/.*': volume has children\nuse '-r' to destroy the following datasets:\n.*";
const HAS_SNAPSHOTS_CLASS: &str = r"^zfslib\.wrap\.zfs\.ZfsCmdError$";
const ITEM_CONFLICT_CLASS: &str = r"^opene\.exceptions\.ItemConflictError$";
const ITEM_NOT_FOUND_CLASS: &str = r"^opene\.exceptions\.ItemNotFoundError$";
const VOLUME_ALREADY_USED_MSG: &str = r"^Volume .* is already used\.$";
const ALREADY_EXISTS_MSG: &str = r"^Resource .* already exists\.$";
const DATASET_EXISTS_MSG: &str = r"^cannot create '.*': dataset already exists$";
const NO_SPACE_MSG: &str = r"^New zvol size\(\d+\) exceeds available space on pool .+\(\d+\)\.$";
const OS_ERROR_CLASS: &str = r"(^OSError$|\.OsError$|OSException$)";

impl ErrorRules {
    pub fn new() -> Self {
        let re = |p: &str| Regex::new(p).expect("static rule pattern");
        let rules = vec![
            Rule {
                status: None,
                class: None,
                message: Some(re(RESOURCE_DNE_MSG)),
                errno: None,
                fault: Fault::NotFound,
            },
            Rule {
                status: None,
                class: Some(re(HAS_CLONES_CLASS)),
                message: Some(re(HAS_CLONES_MSG)),
                errno: None,
                fault: Fault::Busy,
            },
            Rule {
                status: None,
                class: Some(re(HAS_SNAPSHOTS_CLASS)),
                message: Some(re(HAS_SNAPSHOTS_MSG)),
                errno: None,
                fault: Fault::Busy,
            },
            Rule {
                status: None,
                class: Some(re(ITEM_CONFLICT_CLASS)),
                message: Some(re(VOLUME_ALREADY_USED_MSG)),
                errno: None,
                fault: Fault::Busy,
            },
            Rule {
                status: None,
                class: Some(re(ITEM_NOT_FOUND_CLASS)),
                message: None,
                errno: None,
                fault: Fault::NotFound,
            },
            Rule {
                status: None,
                class: None,
                message: Some(re(NO_SPACE_MSG)),
                errno: None,
                fault: Fault::Exhausted,
            },
            Rule {
                status: None,
                class: None,
                message: Some(re(ALREADY_EXISTS_MSG)),
                errno: None,
                fault: Fault::Exists,
            },
            Rule {
                status: None,
                class: None,
                message: Some(re(DATASET_EXISTS_MSG)),
                errno: None,
                fault: Fault::DatasetExists,
            },
            // errno conventions of the snapshot/clone endpoints
            Rule {
                status: None,
                class: None,
                message: None,
                errno: Some(5),
                fault: Fault::Exists,
            },
            Rule {
                status: None,
                class: None,
                message: None,
                errno: Some(1),
                fault: Fault::NotFound,
            },
            Rule {
                status: None,
                class: None,
                message: None,
                errno: Some(1000),
                fault: Fault::Busy,
            },
            Rule {
                status: Some(404),
                class: None,
                message: None,
                errno: None,
                fault: Fault::NotFound,
            },
            Rule {
                status: Some(409),
                class: None,
                message: None,
                errno: None,
                fault: Fault::Exists,
            },
            Rule {
                status: Some(500),
                class: Some(re(OS_ERROR_CLASS)),
                message: None,
                errno: None,
                fault: Fault::OsInternal,
            },
        ];
        Self { rules }
    }

    /// Classify a failed response; rules are checked in order, first match
    /// wins. `None` means no rule matched and the caller should surface a
    /// protocol error.
    pub fn classify(&self, resp: &RestResponse) -> Option<Fault> {
        self.rules.iter().find(|r| r.matches(resp)).map(|r| r.fault)
    }
}

impl Default for ErrorRules {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::types::ErrorEnvelope;
    use serde_json::Value;

    fn resp(code: u16, class: Option<&str>, message: Option<&str>, errno: Option<i64>) -> RestResponse {
        RestResponse {
            code,
            error: Some(ErrorEnvelope {
                class: class.map(str::to_string),
                code: None,
                errno: errno.map(|n| Value::Number(n.into())),
                message: message.map(str::to_string),
            }),
            data: None,
        }
    }

    #[test]
    fn test_not_found_message() {
        let r = resp(
            500,
            None,
            Some("Zfs resource: Pool-0/v_a not found in this collection."),
            None,
        );
        assert_eq!(ErrorRules::new().classify(&r), Some(Fault::NotFound));
    }

    #[test]
    fn test_busy_clones_both_class_spellings() {
        let rules = ErrorRules::new();
        let msg = "In order to delete a zvol, you must delete all of its clones first.";
        for class in ["opene.storage.zfs.ZfsOeError", "opene.storage.zfs.zfs.ZfsOeError"] {
            let r = resp(500, Some(class), Some(msg), None);
            assert_eq!(rules.classify(&r), Some(Fault::Busy), "class {class}");
        }
        // same message under an unrelated class is not a busy verdict
        let r = resp(500, Some("other.Class"), Some(msg), None);
        assert_ne!(rules.classify(&r), Some(Fault::Busy));
    }

    #[test]
    fn test_busy_children() {
        let msg = "cannot destroy 'Pool-0/v_a': volume has children\nuse '-r' to destroy the following datasets:\nPool-0/v_a@s_b";
        let r = resp(500, Some("zfslib.wrap.zfs.ZfsCmdError"), Some(msg), None);
        assert_eq!(ErrorRules::new().classify(&r), Some(Fault::Busy));
    }

    #[test]
    fn test_lun_already_used_is_busy() {
        let r = resp(
            409,
            Some("opene.exceptions.ItemConflictError"),
            Some("Volume v_a is already used."),
            None,
        );
        assert_eq!(ErrorRules::new().classify(&r), Some(Fault::Busy));
    }

    #[test]
    fn test_no_space_left() {
        let r = resp(
            500,
            None,
            Some("New zvol size(107374182400) exceeds available space on pool Pool-0(24433164288)."),
            None,
        );
        assert_eq!(ErrorRules::new().classify(&r), Some(Fault::Exhausted));
    }

    #[test]
    fn test_exists_variants() {
        let rules = ErrorRules::new();
        let r = resp(409, None, Some("Resource v_a already exists."), None);
        assert_eq!(rules.classify(&r), Some(Fault::Exists));
        let r = resp(
            500,
            None,
            Some("cannot create 'Pool-0/v_a': dataset already exists"),
            None,
        );
        assert_eq!(rules.classify(&r), Some(Fault::DatasetExists));
    }

    #[test]
    fn test_errno_conventions() {
        let rules = ErrorRules::new();
        assert_eq!(rules.classify(&resp(500, None, None, Some(5))), Some(Fault::Exists));
        assert_eq!(rules.classify(&resp(500, None, None, Some(1))), Some(Fault::NotFound));
        assert_eq!(rules.classify(&resp(500, None, None, Some(1000))), Some(Fault::Busy));
    }

    #[test]
    fn test_errno_as_string() {
        let rules = ErrorRules::new();
        let r = RestResponse {
            code: 500,
            error: Some(ErrorEnvelope {
                class: None,
                code: None,
                errno: Some(Value::String("5".into())),
                message: None,
            }),
            data: None,
        };
        assert_eq!(rules.classify(&r), Some(Fault::Exists));
    }

    #[test]
    fn test_status_fallbacks() {
        let rules = ErrorRules::new();
        assert_eq!(rules.classify(&resp(404, None, None, None)), Some(Fault::NotFound));
        assert_eq!(rules.classify(&resp(409, None, None, None)), Some(Fault::Exists));
    }

    #[test]
    fn test_first_match_wins_over_status() {
        // 409 with the already-used envelope must classify as Busy, not the
        // generic 409 Exists fallback further down the list
        let r = resp(
            409,
            Some("opene.exceptions.ItemConflictError"),
            Some("Volume v_a is already used."),
            None,
        );
        assert_eq!(ErrorRules::new().classify(&r), Some(Fault::Busy));
    }

    #[test]
    fn test_unmatched_is_none() {
        let r = resp(500, Some("who.Knows"), Some("something odd"), None);
        assert_eq!(ErrorRules::new().classify(&r), None);
    }
}
