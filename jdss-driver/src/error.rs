use thiserror::Error;

/// Resource class carried by identity-style errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Volume,
    Snapshot,
    Target,
    Pool,
    Dataset,
    Share,
    User,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Volume => "volume",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Target => "target",
            ResourceKind::Pool => "pool",
            ResourceKind::Dataset => "dataset",
            ResourceKind::Share => "share",
            ResourceKind::User => "user",
        };
        f.write_str(s)
    }
}

/// Closed error taxonomy for the driver.
///
/// Every failure observed anywhere in the driver maps to exactly one of
/// these kinds, and each kind carries a stable numeric code that is used
/// as the process exit code by the CLI.
#[derive(Debug, Error)]
pub enum JdssError {
    #[error("none of interfaces {} responded to request {path}", .hosts.join(", "))]
    CommunicationFailure { hosts: Vec<String>, path: String },

    #[error("request {path} failed with code {code} of type {class} reason: {message}")]
    RestProtocol {
        path: String,
        code: u16,
        class: String,
        message: String,
    },

    #[error("feature '{0}' is not supported by this appliance version")]
    Outdated(String),

    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} '{name}' already exists")]
    Exists { kind: ResourceKind, name: String },

    #[error("{kind} '{name}' is busy")]
    Busy { kind: ResourceKind, name: String },

    #[error("volume '{volume}' is busy, delete dependent volumes first: {}", .dependents.join(", "))]
    VolumeBusyWithDependents {
        volume: String,
        dependents: Vec<String>,
    },

    #[error("{}", rollback_blocked_message(.volume, .snapshot, .snapshots, .clones, .snapshot_count, .clone_count))]
    RollbackBlocked {
        volume: String,
        snapshot: String,
        snapshots: Vec<String>,
        clones: Vec<String>,
        snapshot_count: u64,
        clone_count: u64,
    },

    #[error("unable to identify VIP name for addresses: {}", .0.join(", "))]
    VipNotFound(Vec<String>),

    #[error("not enough free space on the pool")]
    Exhausted,

    #[error("appliance internal error: {0}")]
    OsInternal(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn rollback_blocked_message(
    volume: &str,
    snapshot: &str,
    snapshots: &[String],
    clones: &[String],
    nsnapshots: &u64,
    nclones: &u64,
) -> String {
    let (nsnapshots, nclones) = (*nsnapshots, *nclones);
    let mut msg = format!("unable to rollback volume '{volume}' to snapshot '{snapshot}'");
    if nsnapshots > 0 || nclones > 0 {
        msg.push_str(": ");
        if nsnapshots > 0 {
            msg.push_str(&format!("{nsnapshots} snapshot(s) "));
        }
        if nclones > 0 {
            msg.push_str(&format!("{nclones} clone(s) "));
        }
        msg.push_str("will be lost in process");
    }
    if !snapshots.is_empty() {
        msg.push_str(&format!("; remove snapshots: {}", snapshots.join(" ")));
    }
    if !clones.is_empty() {
        msg.push_str(&format!("; remove clones: {}", clones.join(" ")));
    }
    msg
}

impl JdssError {
    /// Stable numeric code, used as process exit code by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            JdssError::Config(_) => 1,
            JdssError::RestProtocol { .. } => 2,
            JdssError::CommunicationFailure { .. } => 4,
            JdssError::Outdated(_) => 5,
            JdssError::VipNotFound(_) => 6,
            JdssError::NotFound { .. } => 7,
            JdssError::Exists { .. } => 8,
            JdssError::Busy { .. } => 9,
            JdssError::VolumeBusyWithDependents { .. } => 10,
            JdssError::RollbackBlocked { .. } => 11,
            JdssError::Exhausted => 12,
            JdssError::OsInternal(_) => 13,
        }
    }

    pub fn volume_not_found(name: impl Into<String>) -> Self {
        JdssError::NotFound {
            kind: ResourceKind::Volume,
            name: name.into(),
        }
    }

    pub fn snapshot_not_found(name: impl Into<String>) -> Self {
        JdssError::NotFound {
            kind: ResourceKind::Snapshot,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JdssError::NotFound { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            JdssError::Busy { .. } | JdssError::VolumeBusyWithDependents { .. }
        )
    }

    pub fn is_exists(&self) -> bool {
        matches!(self, JdssError::Exists { .. })
    }
}

pub type Result<T> = std::result::Result<T, JdssError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_stable() {
        assert_eq!(
            JdssError::CommunicationFailure {
                hosts: vec!["10.0.0.1".into()],
                path: "/volumes".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(JdssError::volume_not_found("v_a").exit_code(), 7);
        assert_eq!(
            JdssError::Exists {
                kind: ResourceKind::Snapshot,
                name: "s_a".into()
            }
            .exit_code(),
            8
        );
        assert_eq!(JdssError::Exhausted.exit_code(), 12);
    }

    #[test]
    fn test_busy_with_dependents_message_names_dependents() {
        let err = JdssError::VolumeBusyWithDependents {
            volume: "base".into(),
            dependents: vec!["child-1".into(), "child-2".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("child-1"));
        assert!(msg.contains("child-2"));
        assert!(err.is_busy());
    }

    #[test]
    fn test_rollback_blocked_message_carries_counts() {
        let err = JdssError::RollbackBlocked {
            volume: "vol".into(),
            snapshot: "s1".into(),
            snapshots: vec!["s2".into()],
            clones: vec![],
            snapshot_count: 1,
            clone_count: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("1 snapshot(s)"));
        assert!(msg.contains("s2"));
    }
}
