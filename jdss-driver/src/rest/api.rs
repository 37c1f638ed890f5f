//! Typed facade over the appliance REST resources.
//!
//! Each method validates its inputs, issues exactly one REST call, runs the
//! error classifier over the response and either returns a decoded record or
//! a taxonomy error. No method retries; idempotency is decided by callers.

use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::classify::{ErrorRules, Fault};
use super::proxy::RestProxy;
use super::types::{
    LunRecord, NasVolumeRecord, PoolRecord, RestResponse, RollbackInfo, ShareRecord,
    SnapshotRecord, TargetRecord, TargetUserRecord, UserRecord, VipRecord, VolumeRecord,
};
use crate::config::JdssConfig;
use crate::error::{JdssError, ResourceKind, Result};

/// Attach mode for a LUN.
pub const LUN_MODES: [&str; 3] = ["wt", "wb", "ro"];

pub struct RestApi {
    proxy: RestProxy,
    rules: ErrorRules,
}

impl RestApi {
    pub fn new(cfg: &JdssConfig) -> Result<Self> {
        Ok(Self {
            proxy: RestProxy::new(cfg)?,
            rules: ErrorRules::new(),
        })
    }

    pub fn active_host(&self) -> &str {
        self.proxy.active_host()
    }

    pub fn pool_name(&self) -> &str {
        self.proxy.pool_name()
    }

    /// Generic mapping of an unexpected response to a protocol error.
    fn fail(&self, path: &str, resp: &RestResponse) -> JdssError {
        if let Some(Fault::OsInternal) = self.rules.classify(resp) {
            let msg = resp.error.as_ref().map(|e| e.message().to_string());
            return JdssError::OsInternal(msg.unwrap_or_else(|| "unknown".into()));
        }
        let (class, message) = match &resp.error {
            Some(e) => (e.class().to_string(), e.message().to_string()),
            None => ("Unknown".into(), "Unknown".into()),
        };
        JdssError::RestProtocol {
            path: path.to_string(),
            code: resp.code,
            class,
            message,
        }
    }

    fn classify(&self, resp: &RestResponse) -> Option<Fault> {
        self.rules.classify(resp)
    }

    // ------------------------------------------------------------------
    // Pool
    // ------------------------------------------------------------------

    /// GET /pools/<pool>: capacity and health properties.
    pub async fn get_pool_stats(&self) -> Result<PoolRecord> {
        let path = "";
        let resp = self.proxy.pool_request(Method::GET, path, None).await?;
        if resp.is_ok() {
            if let Some(pool) = resp.decode() {
                return Ok(pool);
            }
        }
        if let Some(Fault::NotFound) = self.classify(&resp) {
            return Err(JdssError::NotFound {
                kind: ResourceKind::Pool,
                name: self.pool_name().to_string(),
            });
        }
        Err(self.fail("/pools", &resp))
    }

    /// True when the configured pool answers.
    pub async fn is_pool_exists(&self) -> Result<bool> {
        let resp = self.proxy.pool_request(Method::GET, "", None).await?;
        Ok(resp.is_ok())
    }

    /// GET /pools/<pool>/san/vips: VIP table keyed by name.
    pub async fn get_pool_vips(&self) -> Result<Vec<VipRecord>> {
        let path = "/san/vips";
        let resp = self.proxy.pool_request(Method::GET, path, None).await?;
        if resp.is_ok() {
            if let Some(vips) = resp.decode_entries() {
                return Ok(vips);
            }
            if let Some(vips) = resp.decode() {
                return Ok(vips);
            }
        }
        if let Some(Fault::NotFound) = self.classify(&resp) {
            return Err(JdssError::Outdated("pool VIP listing".into()));
        }
        Err(self.fail(path, &resp))
    }

    // ------------------------------------------------------------------
    // Volumes
    // ------------------------------------------------------------------

    /// GET /pools/<pool>/volumes?page=N
    pub async fn get_volumes_page(&self, page: u64) -> Result<Vec<VolumeRecord>> {
        let path = format!("/volumes?page={page}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(vols) = resp.decode_entries() {
                return Ok(vols);
            }
        }
        Err(self.fail(&path, &resp))
    }

    /// GET /pools/<pool>/volumes/<v>
    pub async fn get_lun(&self, volume_name: &str) -> Result<VolumeRecord> {
        let path = format!("/volumes/{volume_name}");
        debug!(volume = volume_name, "get volume info");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(vol) = resp.decode() {
                return Ok(vol);
            }
        }
        if let Some(Fault::NotFound) = self.classify(&resp) {
            return Err(JdssError::volume_not_found(volume_name));
        }
        Err(self.fail(&path, &resp))
    }

    /// True if the volume exists.
    pub async fn is_lun(&self, volume_name: &str) -> Result<bool> {
        let path = format!("/volumes/{volume_name}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        Ok(resp.is_ok())
    }

    /// POST /pools/<pool>/volumes
    pub async fn create_lun(
        &self,
        volume_name: &str,
        size_bytes: u64,
        sparse: bool,
        block_size: Option<&str>,
    ) -> Result<()> {
        let path = "/volumes";
        let mut body = json!({
            "name": volume_name,
            "size": size_bytes.to_string(),
            "sparse": sparse,
        });
        if let Some(bs) = block_size {
            body["blocksize"] = json!(bs);
        }
        info!(volume = volume_name, size = size_bytes, sparse, "create volume");
        let resp = self.proxy.pool_request(Method::POST, path, Some(&body)).await?;
        if resp.is_ok() && (resp.code == 200 || resp.code == 201) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exhausted) => Err(JdssError::Exhausted),
            Some(Fault::Exists) => Err(JdssError::Exists {
                kind: ResourceKind::Volume,
                name: volume_name.to_string(),
            }),
            Some(Fault::DatasetExists) => Err(JdssError::Exists {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            _ => Err(self.fail(path, &resp)),
        }
    }

    /// PUT /pools/<pool>/volumes/<v>: grow the zvol.
    pub async fn extend_lun(&self, volume_name: &str, size_bytes: u64) -> Result<()> {
        let path = format!("/volumes/{volume_name}");
        let body = json!({"size": size_bytes.to_string()});
        info!(volume = volume_name, size = size_bytes, "extend volume");
        let resp = self.proxy.pool_request(Method::PUT, &path, Some(&body)).await?;
        if resp.code == 201 || resp.code == 200 || resp.code == 204 {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::volume_not_found(volume_name)),
            Some(Fault::Exhausted) => Err(JdssError::Exhausted),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// PUT /pools/<pool>/volumes/<v>: update arbitrary properties
    /// (rename via `{"name": ...}`, provisioning, ...).
    pub async fn modify_lun(&self, volume_name: &str, props: &Value) -> Result<()> {
        let path = format!("/volumes/{volume_name}");
        info!(volume = volume_name, props = %props, "update volume properties");
        let resp = self.proxy.pool_request(Method::PUT, &path, Some(props)).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::volume_not_found(volume_name)),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/volumes/<v>
    pub async fn delete_lun(
        &self,
        volume_name: &str,
        recursively_children: bool,
        force_umount: bool,
    ) -> Result<()> {
        let path = format!("/volumes/{volume_name}");
        let mut body = serde_json::Map::new();
        if recursively_children {
            body.insert("recursively_children".into(), Value::Bool(true));
        }
        if force_umount {
            body.insert("force_umount".into(), Value::Bool(true));
        }
        info!(volume = volume_name, recursive = recursively_children, "delete volume");
        let body = if body.is_empty() {
            None
        } else {
            Some(Value::Object(body))
        };
        let resp = self
            .proxy
            .pool_request(Method::DELETE, &path, body.as_ref())
            .await?;
        if resp.code == 204 {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::volume_not_found(volume_name)),
            Some(Fault::Busy) => Err(JdssError::Busy {
                kind: ResourceKind::Volume,
                name: volume_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// POST /pools/<pool>/volumes/<src>/clone
    pub async fn create_volume_from_snapshot(
        &self,
        volume_name: &str,
        snapshot_name: &str,
        original_vol_name: &str,
        sparse: bool,
        readonly: bool,
    ) -> Result<()> {
        let path = format!("/volumes/{original_vol_name}/clone");
        let body = json!({
            "name": volume_name,
            "snapshot": snapshot_name,
            "sparse": sparse,
            "readonly": readonly,
        });
        info!(
            clone = volume_name,
            snapshot = snapshot_name,
            origin = original_vol_name,
            "clone volume from snapshot"
        );
        let resp = self.proxy.pool_request(Method::POST, &path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::DatasetExists) | Some(Fault::Exists) => Err(JdssError::Exists {
                kind: ResourceKind::Volume,
                name: volume_name.to_string(),
            }),
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Snapshot,
                name: format!("{original_vol_name}@{snapshot_name}"),
            }),
            Some(Fault::Exhausted) => Err(JdssError::Exhausted),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// POST /pools/<pool>/volumes/<v>/snapshots
    pub async fn create_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        let path = format!("/volumes/{volume_name}/snapshots");
        let body = json!({"snapshot_name": snapshot_name});
        info!(volume = volume_name, snapshot = snapshot_name, "create snapshot");
        let resp = self.proxy.pool_request(Method::POST, &path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exists) => Err(JdssError::Exists {
                kind: ResourceKind::Snapshot,
                name: snapshot_name.to_string(),
            }),
            Some(Fault::NotFound) => Err(JdssError::volume_not_found(volume_name)),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/volumes/<v>/snapshots/<s>
    pub async fn get_snapshot(
        &self,
        volume_name: &str,
        snapshot_name: &str,
    ) -> Result<SnapshotRecord> {
        let path = format!("/volumes/{volume_name}/snapshots/{snapshot_name}");
        debug!(volume = volume_name, snapshot = snapshot_name, "get snapshot");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(snap) = resp.decode() {
                return Ok(snap);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::snapshot_not_found(snapshot_name)),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/volumes/<v>/snapshots?page=N
    pub async fn get_volume_snapshots_page(
        &self,
        volume_name: &str,
        page: u64,
    ) -> Result<Vec<SnapshotRecord>> {
        let path = format!("/volumes/{volume_name}/snapshots?page={page}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(snaps) = resp.decode_entries() {
                return Ok(snaps);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::volume_not_found(volume_name)),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/volumes/<v>/snapshots/<s>
    pub async fn delete_snapshot(
        &self,
        volume_name: &str,
        snapshot_name: &str,
        recursively_children: bool,
        force_umount: bool,
    ) -> Result<()> {
        let path = format!("/volumes/{volume_name}/snapshots/{snapshot_name}");
        let mut body = serde_json::Map::new();
        if recursively_children {
            body.insert("recursively_children".into(), Value::Bool(true));
        }
        if force_umount {
            body.insert("force_umount".into(), Value::Bool(true));
        }
        info!(volume = volume_name, snapshot = snapshot_name, "delete snapshot");
        let body = Value::Object(body);
        let resp = self
            .proxy
            .pool_request(Method::DELETE, &path, Some(&body))
            .await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Busy) => Err(JdssError::Busy {
                kind: ResourceKind::Snapshot,
                name: snapshot_name.to_string(),
            }),
            Some(Fault::NotFound) => Err(JdssError::snapshot_not_found(snapshot_name)),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/volumes/<v>/snapshots/<s>/rollback: counts of
    /// resources a rollback would destroy.
    pub async fn get_snapshot_rollback(
        &self,
        volume_name: &str,
        snapshot_name: &str,
    ) -> Result<RollbackInfo> {
        let path = format!("/volumes/{volume_name}/snapshots/{snapshot_name}/rollback");
        info!(
            volume = volume_name,
            snapshot = snapshot_name,
            "check rollback dependency count"
        );
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(info) = resp.decode() {
                return Ok(info);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Snapshot,
                name: format!("{volume_name}@{snapshot_name}"),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// POST /pools/<pool>/volumes/<v>/snapshots/<s>/rollback
    pub async fn snapshot_rollback(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        let path = format!("/volumes/{volume_name}/snapshots/{snapshot_name}/rollback");
        info!(volume = volume_name, snapshot = snapshot_name, "rollback volume");
        let resp = self.proxy.pool_request(Method::POST, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        Err(self.fail(&path, &resp))
    }

    // ------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------

    /// GET /pools/<pool>/san/iscsi/targets
    pub async fn get_targets(&self) -> Result<Vec<TargetRecord>> {
        let path = "/san/iscsi/targets";
        let resp = self.proxy.pool_request(Method::GET, path, None).await?;
        if resp.is_ok() {
            if let Some(targets) = resp.decode_entries() {
                return Ok(targets);
            }
            if let Some(targets) = resp.decode() {
                return Ok(targets);
            }
        }
        Err(self.fail(path, &resp))
    }

    /// GET /pools/<pool>/san/iscsi/targets/<t>
    pub async fn get_target(&self, target_name: &str) -> Result<TargetRecord> {
        let path = format!("/san/iscsi/targets/{target_name}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(target) = resp.decode() {
                return Ok(target);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// POST /pools/<pool>/san/iscsi/targets
    pub async fn create_target(
        &self,
        target_name: &str,
        assigned_vips: &[String],
        use_chap: bool,
    ) -> Result<()> {
        let path = "/san/iscsi/targets";
        let body = json!({
            "name": target_name,
            "active": true,
            "incoming_users_active": use_chap,
            "vip_allowed_portals": {"assigned_vips": assigned_vips},
        });
        info!(target = target_name, ?assigned_vips, use_chap, "create iSCSI target");
        let resp = self.proxy.pool_request(Method::POST, path, Some(&body)).await?;
        if resp.is_ok() && resp.code == 201 {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exists) => Err(JdssError::Exists {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/san/iscsi/targets/<t>
    pub async fn delete_target(&self, target_name: &str) -> Result<()> {
        let path = format!("/san/iscsi/targets/{target_name}");
        info!(target = target_name, "delete iSCSI target");
        let resp = self.proxy.pool_request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// PUT /pools/<pool>/san/iscsi/targets/<t>/assigned-vips
    ///
    /// Older firmware has no per-target VIP assignment; a 404/405 here maps
    /// to `Outdated`.
    pub async fn set_target_assigned_vips(
        &self,
        target_name: &str,
        vip_names: &[String],
    ) -> Result<()> {
        let path = format!("/san/iscsi/targets/{target_name}/assigned-vips");
        let body = json!({"assigned_vips": vip_names});
        info!(target = target_name, ?vip_names, "assign target VIPs");
        let resp = self.proxy.pool_request(Method::PUT, &path, Some(&body)).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        if resp.code == 404 || resp.code == 405 {
            return Err(JdssError::Outdated("target VIP assignment".into()));
        }
        Err(self.fail(&path, &resp))
    }

    /// GET /pools/<pool>/san/iscsi/targets/<t>/luns
    pub async fn get_target_luns(&self, target_name: &str) -> Result<Vec<LunRecord>> {
        let path = format!("/san/iscsi/targets/{target_name}/luns");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(luns) = resp.decode_entries() {
                return Ok(luns);
            }
            if let Some(luns) = resp.decode() {
                return Ok(luns);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/san/iscsi/targets/<t>/luns/<lun-name>
    pub async fn is_target_lun(&self, target_name: &str, lun_name: &str) -> Result<bool> {
        let path = format!("/san/iscsi/targets/{target_name}/luns/{lun_name}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            return Ok(true);
        }
        if resp.code == 404 {
            return Ok(false);
        }
        Err(self.fail(&path, &resp))
    }

    /// POST /pools/<pool>/san/iscsi/targets/<t>/luns
    pub async fn attach_target_vol(
        &self,
        target_name: &str,
        lun_name: &str,
        lun_id: i64,
        mode: Option<&str>,
    ) -> Result<()> {
        let path = format!("/san/iscsi/targets/{target_name}/luns");
        let mut body = json!({"name": lun_name, "lun": lun_id});
        if let Some(mode) = mode {
            if !LUN_MODES.contains(&mode) {
                return Err(JdssError::Config(format!(
                    "incorrect LUN mode '{mode}', expected one of {}",
                    LUN_MODES.join(", ")
                )));
            }
            body["mode"] = json!(mode);
        }
        debug!(volume = lun_name, target = target_name, lun = lun_id, "attach volume");
        let resp = self.proxy.pool_request(Method::POST, &path, Some(&body)).await?;
        if resp.is_ok() && resp.code == 201 {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Busy) => Err(JdssError::Busy {
                kind: ResourceKind::Volume,
                name: lun_name.to_string(),
            }),
            Some(Fault::Exhausted) => Err(JdssError::Exhausted),
            Some(Fault::Exists) => Err(JdssError::Exists {
                kind: ResourceKind::Volume,
                name: lun_name.to_string(),
            }),
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/san/iscsi/targets/<t>/luns/<lun-name>
    pub async fn detach_target_vol(&self, target_name: &str, lun_name: &str) -> Result<()> {
        let path = format!("/san/iscsi/targets/{target_name}/luns/{lun_name}");
        debug!(volume = lun_name, target = target_name, "detach volume");
        let resp = self.proxy.pool_request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::volume_not_found(lun_name)),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    // ------------------------------------------------------------------
    // Target users (CHAP)
    // ------------------------------------------------------------------

    /// GET /pools/<pool>/san/iscsi/targets/<t>/incoming-users
    pub async fn get_target_users(&self, target_name: &str) -> Result<Vec<TargetUserRecord>> {
        let path = format!("/san/iscsi/targets/{target_name}/incoming-users");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(users) = resp.decode_entries() {
                return Ok(users);
            }
            if let Some(users) = resp.decode() {
                return Ok(users);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// POST /pools/<pool>/san/iscsi/targets/<t>/incoming-users
    pub async fn create_target_user(
        &self,
        target_name: &str,
        user: &str,
        password: &str,
    ) -> Result<()> {
        let path = format!("/san/iscsi/targets/{target_name}/incoming-users");
        let body = json!({"name": user, "password": password});
        debug!(target = target_name, user, "add CHAP credentials");
        let resp = self.proxy.pool_request(Method::POST, &path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/san/iscsi/targets/<t>/incoming-users/<user>
    pub async fn delete_target_user(&self, target_name: &str, user: &str) -> Result<()> {
        let path = format!("/san/iscsi/targets/{target_name}/incoming-users/{user}");
        debug!(target = target_name, user, "remove CHAP credentials");
        let resp = self.proxy.pool_request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Target,
                name: target_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    // ------------------------------------------------------------------
    // NAS volumes (datasets)
    // ------------------------------------------------------------------

    /// POST /pools/<pool>/nas-volumes
    pub async fn create_nas_volume(
        &self,
        volume_name: &str,
        quota: u64,
        reservation: Option<u64>,
    ) -> Result<()> {
        let path = "/nas-volumes";
        let mut body = json!({"name": volume_name, "quota": quota.to_string()});
        if let Some(res) = reservation {
            body["reservation"] = json!(res.to_string());
        }
        info!(dataset = volume_name, quota, "create NAS volume");
        let resp = self.proxy.pool_request(Method::POST, path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exists) | Some(Fault::DatasetExists) => Err(JdssError::Exists {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            Some(Fault::Exhausted) => Err(JdssError::Exhausted),
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Pool,
                name: self.pool_name().to_string(),
            }),
            _ => Err(self.fail(path, &resp)),
        }
    }

    /// GET /pools/<pool>/nas-volumes/<v>
    pub async fn get_nas_volume(&self, volume_name: &str) -> Result<NasVolumeRecord> {
        let path = format!("/nas-volumes/{volume_name}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(vol) = resp.decode() {
                return Ok(vol);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/nas-volumes?page=N
    pub async fn get_nas_volumes_page(&self, page: u64) -> Result<Vec<NasVolumeRecord>> {
        let path = format!("/nas-volumes?page={page}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(vols) = resp.decode_entries() {
                return Ok(vols);
            }
        }
        Err(self.fail(&path, &resp))
    }

    /// PUT /pools/<pool>/nas-volumes/<v>: grow the quota.
    pub async fn extend_nas_volume(&self, volume_name: &str, quota: u64) -> Result<()> {
        let path = format!("/nas-volumes/{volume_name}");
        let body = json!({"quota": quota.to_string()});
        info!(dataset = volume_name, quota, "extend NAS volume");
        let resp = self.proxy.pool_request(Method::PUT, &path, Some(&body)).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            Some(Fault::Exhausted) => Err(JdssError::Exhausted),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/nas-volumes/<v>
    pub async fn delete_nas_volume(&self, volume_name: &str) -> Result<()> {
        let path = format!("/nas-volumes/{volume_name}");
        info!(dataset = volume_name, "delete NAS volume");
        let resp = self.proxy.pool_request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            Some(Fault::Busy) => Err(JdssError::Busy {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    // ------------------------------------------------------------------
    // NAS snapshots & clones
    // ------------------------------------------------------------------

    /// POST /pools/<pool>/nas-volumes/<v>/snapshots
    pub async fn create_nas_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        let path = format!("/nas-volumes/{volume_name}/snapshots");
        let body = json!({"snapshot_name": snapshot_name});
        info!(dataset = volume_name, snapshot = snapshot_name, "create NAS snapshot");
        let resp = self.proxy.pool_request(Method::POST, &path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exists) => Err(JdssError::Exists {
                kind: ResourceKind::Snapshot,
                name: snapshot_name.to_string(),
            }),
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/nas-volumes/<v>/snapshots/<s>
    pub async fn get_nas_snapshot(
        &self,
        volume_name: &str,
        snapshot_name: &str,
    ) -> Result<SnapshotRecord> {
        let path = format!("/nas-volumes/{volume_name}/snapshots/{snapshot_name}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(snap) = resp.decode() {
                return Ok(snap);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::snapshot_not_found(snapshot_name)),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/nas-volumes/<v>/snapshots?page=N
    pub async fn get_nas_volume_snapshots_page(
        &self,
        volume_name: &str,
        page: u64,
    ) -> Result<Vec<SnapshotRecord>> {
        let path = format!("/nas-volumes/{volume_name}/snapshots?page={page}");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(snaps) = resp.decode_entries() {
                return Ok(snaps);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Dataset,
                name: volume_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/nas-volumes/<v>/snapshots/<s>
    pub async fn delete_nas_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        let path = format!("/nas-volumes/{volume_name}/snapshots/{snapshot_name}");
        info!(dataset = volume_name, snapshot = snapshot_name, "delete NAS snapshot");
        let resp = self.proxy.pool_request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::snapshot_not_found(snapshot_name)),
            Some(Fault::Busy) => Err(JdssError::Busy {
                kind: ResourceKind::Snapshot,
                name: snapshot_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// POST /pools/<pool>/nas-volumes/<v>/snapshots/<s>/clones
    pub async fn create_nas_clone(
        &self,
        volume_name: &str,
        snapshot_name: &str,
        clone_name: &str,
        options: Option<&Value>,
    ) -> Result<()> {
        let path = format!("/nas-volumes/{volume_name}/snapshots/{snapshot_name}/clones");
        let mut body = json!({"name": clone_name});
        if let Some(Value::Object(opts)) = options {
            for (k, v) in opts {
                body[k] = v.clone();
            }
        }
        info!(
            dataset = volume_name,
            snapshot = snapshot_name,
            clone = clone_name,
            "create NAS clone"
        );
        let resp = self.proxy.pool_request(Method::POST, &path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exists) | Some(Fault::DatasetExists) => Err(JdssError::Exists {
                kind: ResourceKind::Dataset,
                name: clone_name.to_string(),
            }),
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Snapshot,
                name: format!("{volume_name}@{snapshot_name}"),
            }),
            Some(Fault::Exhausted) => Err(JdssError::Exhausted),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /pools/<pool>/nas-volumes/<v>/snapshots/<s>/clones
    pub async fn get_nas_clones(
        &self,
        volume_name: &str,
        snapshot_name: &str,
    ) -> Result<Vec<NasVolumeRecord>> {
        let path = format!("/nas-volumes/{volume_name}/snapshots/{snapshot_name}/clones");
        let resp = self.proxy.pool_request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(clones) = resp.decode_entries() {
                return Ok(clones);
            }
            if let Some(clones) = resp.decode() {
                return Ok(clones);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Snapshot,
                name: format!("{volume_name}@{snapshot_name}"),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /pools/<pool>/nas-volumes/<v>/snapshots/<s>/clones/<c>
    pub async fn delete_nas_clone(
        &self,
        volume_name: &str,
        snapshot_name: &str,
        clone_name: &str,
    ) -> Result<()> {
        let path =
            format!("/nas-volumes/{volume_name}/snapshots/{snapshot_name}/clones/{clone_name}");
        info!(dataset = volume_name, clone = clone_name, "delete NAS clone");
        let resp = self.proxy.pool_request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Dataset,
                name: clone_name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    // ------------------------------------------------------------------
    // Shares & users (appliance-global tree)
    // ------------------------------------------------------------------

    /// POST /shares
    pub async fn create_share(
        &self,
        name: &str,
        share_path: &str,
        proto: ShareProto,
        active: bool,
        insecure_connections: bool,
        synchronous_data_record: bool,
    ) -> Result<()> {
        let path = "/shares";
        let mut body = json!({"name": name, "path": share_path, "active": active});
        match proto {
            ShareProto::Nfs => {
                body["nfs"] = json!({
                    "enabled": true,
                    "insecure_connections": insecure_connections,
                    "synchronous_data_record": synchronous_data_record,
                });
            }
            ShareProto::Smb => {
                body["smb"] = json!({
                    "enabled": true,
                    "visible": true,
                    "access_mode": "user",
                });
            }
        }
        info!(share = name, path = share_path, ?proto, "create share");
        let resp = self.proxy.request(Method::POST, path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exists) | Some(Fault::DatasetExists) => Err(JdssError::Exists {
                kind: ResourceKind::Share,
                name: name.to_string(),
            }),
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Pool,
                name: self.pool_name().to_string(),
            }),
            _ => Err(self.fail(path, &resp)),
        }
    }

    /// GET /shares/<name>
    pub async fn get_share(&self, name: &str) -> Result<ShareRecord> {
        let path = format!("/shares/{name}");
        let resp = self.proxy.request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(share) = resp.decode() {
                return Ok(share);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Share,
                name: name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /shares?page=N
    pub async fn get_shares_page(&self, page: u64) -> Result<Vec<ShareRecord>> {
        let path = format!("/shares?page={page}");
        let resp = self.proxy.request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(shares) = resp.decode_entries() {
                return Ok(shares);
            }
        }
        Err(self.fail(&path, &resp))
    }

    /// DELETE /shares/<name>
    pub async fn delete_share(&self, name: &str) -> Result<()> {
        let path = format!("/shares/{name}");
        info!(share = name, "delete share");
        let resp = self.proxy.request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Share,
                name: name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /shares/<s>/users
    pub async fn get_share_users(&self, share: &str) -> Result<Vec<UserRecord>> {
        let path = format!("/shares/{share}/users");
        let resp = self.proxy.request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(users) = resp.decode_entries() {
                return Ok(users);
            }
            if let Some(users) = resp.decode() {
                return Ok(users);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Share,
                name: share.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// PUT /shares/<s>/users: replace the share's user set.
    pub async fn set_share_user(&self, share: &str, user: &str) -> Result<()> {
        let path = format!("/shares/{share}/users");
        let body = json!([{"name": user, "readonly": false}]);
        info!(share, user, "set share user");
        let resp = self.proxy.request(Method::PUT, &path, Some(&body)).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::Share,
                name: share.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /shares/<s>/users/<u>
    pub async fn delete_share_user(&self, share: &str, user: &str) -> Result<()> {
        let path = format!("/shares/{share}/users/{user}");
        info!(share, user, "remove share user");
        let resp = self.proxy.request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::User,
                name: user.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// GET /users/<name>
    pub async fn get_user(&self, name: &str) -> Result<UserRecord> {
        let path = format!("/users/{name}");
        let resp = self.proxy.request(Method::GET, &path, None).await?;
        if resp.is_ok() {
            if let Some(user) = resp.decode() {
                return Ok(user);
            }
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::User,
                name: name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// POST /users
    pub async fn create_user(&self, name: &str, password: &str) -> Result<()> {
        let path = "/users";
        let body = json!({"name": name, "password": password});
        info!(user = name, "create user");
        let resp = self.proxy.request(Method::POST, path, Some(&body)).await?;
        if resp.is_ok() && (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::Exists) => Err(JdssError::Exists {
                kind: ResourceKind::User,
                name: name.to_string(),
            }),
            _ => Err(self.fail(path, &resp)),
        }
    }

    /// PUT /users/<name>: update password.
    pub async fn set_user_pass(&self, name: &str, password: &str) -> Result<()> {
        let path = format!("/users/{name}");
        let body = json!({"password": password});
        info!(user = name, "update user password");
        let resp = self.proxy.request(Method::PUT, &path, Some(&body)).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::User,
                name: name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }

    /// DELETE /users/<name>
    pub async fn delete_user(&self, name: &str) -> Result<()> {
        let path = format!("/users/{name}");
        info!(user = name, "delete user");
        let resp = self.proxy.request(Method::DELETE, &path, None).await?;
        if (200..300).contains(&resp.code) {
            return Ok(());
        }
        match self.classify(&resp) {
            Some(Fault::NotFound) => Err(JdssError::NotFound {
                kind: ResourceKind::User,
                name: name.to_string(),
            }),
            _ => Err(self.fail(&path, &resp)),
        }
    }
}

/// Share protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareProto {
    Nfs,
    Smb,
}
