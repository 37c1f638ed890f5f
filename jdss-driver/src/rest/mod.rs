pub mod api;
pub mod classify;
pub mod proxy;
pub mod types;

pub use api::{RestApi, ShareProto};
pub use classify::{ErrorRules, Fault};
pub use proxy::RestProxy;
pub use types::{
    ErrorEnvelope, LunRecord, NasVolumeRecord, PoolRecord, RestResponse, RollbackInfo,
    ShareRecord, SnapshotRecord, TargetRecord, TargetUserRecord, UserRecord, VipRecord,
    VolumeRecord,
};
