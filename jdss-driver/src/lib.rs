//! Control-plane driver for Open-E JovianDSS storage appliances.
//!
//! Translates high-level intents (create a volume, expose a snapshot over
//! iSCSI, roll a volume back, publish a NAS snapshot over NFS) into safe,
//! idempotent sequences of REST calls against the appliance.
//!
//! The library is split into several modules:
//! - `rest`: HTTP transport with host failover, error classification and a
//!   typed facade per appliance resource
//! - `names`: reversible codec between external ids and physical names
//! - `graph`: snapshot/clone dependency logic
//! - `driver`: volume, snapshot, target and NAS lifecycle
//! - `config`: the configuration snapshot recognized by the driver

pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod names;
pub mod rest;

pub use config::JdssConfig;
pub use driver::{
    JdssDriver, NasSnapshotInfo, PublicationInfo, RollbackDependency, ShareInfo, SnapshotInfo,
    TargetAssignment, VolumeInfo, parse_size, split_provider_auth,
};
pub use error::{JdssError, ResourceKind, Result};
