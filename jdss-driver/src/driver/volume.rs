//! Volume lifecycle: create, clone, resize, rename, delete, rollback.

use std::future::Future;
use std::pin::Pin;

use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use super::{JdssDriver, parse_size};
use crate::error::{JdssError, Result};
use crate::graph;
use crate::names;
use crate::rest::VolumeRecord;

/// Clone resize argument format: plain number with an optional K/M/G suffix.
fn clone_size_pattern() -> Regex {
    Regex::new(r"^\d+[GgMmKk]?$").expect("static pattern")
}

/// Whether a clone-size argument asks for a resize. Single-character sizes
/// (the `0` placeholder and bare digits) keep the snapshot's size.
fn clone_size_requests_resize(size: &str) -> bool {
    clone_size_pattern().is_match(size) && size.len() > 1
}

/// Volume description returned to the CLI.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub name: String,
    pub size: u64,
    pub creation: Option<String>,
    pub scsi_id: Option<String>,
    pub san_scsi_id: Option<String>,
}

impl VolumeInfo {
    fn from_record(name: String, rec: &VolumeRecord) -> Self {
        Self {
            name,
            size: rec.size_bytes(),
            creation: rec.creation.clone(),
            scsi_id: rec.prop_str("default_scsi_id").map(str::to_string),
            san_scsi_id: rec.prop_str("san:volume_id").map(str::to_string),
        }
    }
}

/// Resources a rollback would destroy.
#[derive(Debug, Clone, Default)]
pub struct RollbackDependency {
    pub snapshots: Vec<String>,
    pub clones: Vec<String>,
}

impl JdssDriver {
    /// Create a block volume of `size` (human string, e.g. `10G`).
    pub async fn create_volume(
        &self,
        volume_id: &str,
        size: &str,
        sparse: Option<bool>,
        block_size: Option<&str>,
        direct: bool,
    ) -> Result<()> {
        let vname = self.physical_volume_name(volume_id, direct)?;
        let sparse = sparse.unwrap_or(self.config().san_thin_provision);
        let bytes = parse_size(size)?;
        debug!(volume = volume_id, size = bytes, sparse, "create volume");
        self.api().create_lun(&vname, bytes, sparse, block_size).await
    }

    /// All live volumes in the pool, decoded to external ids.
    pub async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        let records = self
            .list_all_pages(|page| self.api().get_volumes_page(page))
            .await?;
        let mut out = Vec::new();
        for rec in records {
            if !names::is_volume(&rec.name) {
                continue;
            }
            let Ok(id) = names::idname(&rec.name) else {
                continue;
            };
            out.push(VolumeInfo::from_record(id, &rec));
        }
        Ok(out)
    }

    /// Volume information by external id.
    pub async fn get_volume(&self, volume_id: &str, direct: bool) -> Result<VolumeInfo> {
        let vname = self.physical_volume_name(volume_id, direct)?;
        let rec = self.api().get_lun(&vname).await?;
        Ok(VolumeInfo::from_record(volume_id.to_string(), &rec))
    }

    /// Grow a volume to `new_size` bytes.
    pub async fn resize_volume(&self, volume_id: &str, new_size: u64, direct: bool) -> Result<()> {
        let vname = self.physical_volume_name(volume_id, direct)?;
        debug!(volume = volume_id, size = new_size, "extend volume");
        self.api().extend_lun(&vname, new_size).await
    }

    /// Rename a volume; both names are external ids.
    pub async fn rename_volume(&self, volume_id: &str, new_volume_id: &str) -> Result<()> {
        let vname = names::vname(volume_id)?;
        let nvname = names::vname(new_volume_id)?;
        debug!(from = volume_id, to = new_volume_id, "rename volume");
        self.api().modify_lun(&vname, &json!({"name": nvname})).await
    }

    /// Clone a volume, optionally from a named snapshot.
    ///
    /// Without a snapshot an anonymous snapshot named after the clone is
    /// created on the parent first. A `size` of the form `\d+[GMK]?` and
    /// longer than one character grows the clone afterwards (a bare digit,
    /// `0` included, keeps the snapshot's size); if that resize fails the
    /// clone is removed and the original error surfaced.
    pub async fn create_cloned_volume(
        &self,
        clone_id: &str,
        volume_id: &str,
        size: Option<&str>,
        snapshot_id: Option<&str>,
        sparse: Option<bool>,
    ) -> Result<()> {
        let cvname = names::vname(clone_id)?;
        let ovname = names::vname(volume_id)?;
        let sparse = sparse.unwrap_or(self.config().san_thin_provision);
        debug!(clone = clone_id, origin = volume_id, "clone volume");

        if let Some(sid) = snapshot_id {
            let sn = names::sname(sid, None);
            let pname = self
                .find_snapshot_parent(&ovname, &sn)
                .await?
                .ok_or_else(|| JdssError::snapshot_not_found(sid))?;
            self.clone_object(&cvname, &sn, &pname, sparse, false, names::is_snapshot(&cvname))
                .await?;
        } else {
            // anonymous snapshot, named after the clone volume
            let sn = cvname.clone();
            self.clone_object(&cvname, &sn, &ovname, sparse, true, names::is_snapshot(&cvname))
                .await?;
        }

        self.set_provisioning_thin(&cvname, sparse).await?;

        if let Some(size) = size {
            if clone_size_requests_resize(size) {
                let bytes = parse_size(size)?;
                if let Err(err) = self.resize_volume(clone_id, bytes, false).await {
                    // the clone is unusable at the wrong size, clean it up
                    if let Err(cleanup) = self.delete_volume(clone_id, false).await {
                        warn!(clone = clone_id, error = %cleanup, "cleanup of failed clone failed");
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Clone `ovname@sname` into `cvname`, creating the snapshot first when
    /// asked. A `VolumeExists` answer for a snapshot-mount name is a
    /// re-export and swallowed; any other failure rolls back a snapshot we
    /// created.
    pub(crate) async fn clone_object(
        &self,
        cvname: &str,
        sname: &str,
        ovname: &str,
        sparse: bool,
        create_snapshot: bool,
        readonly: bool,
    ) -> Result<()> {
        debug!(origin = ovname, clone = cvname, "cloning");

        if create_snapshot {
            self.api().create_snapshot(ovname, sname).await?;
        }
        match self
            .api()
            .create_volume_from_snapshot(cvname, sname, ovname, sparse, readonly)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_exists() && names::is_snapshot(cvname) => {
                debug!(clone = cvname, "clone already exists, re-export is a no-op");
                Ok(())
            }
            Err(err) => {
                if create_snapshot {
                    if let Err(rollback) =
                        self.api().delete_snapshot(ovname, sname, true, true).await
                    {
                        warn!(
                            snapshot = sname,
                            volume = ovname,
                            error = %rollback,
                            "snapshot left behind by failed clone must be removed manually"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Set thin/thick provisioning property on a volume.
    pub(crate) async fn set_provisioning_thin(&self, vname: &str, thin: bool) -> Result<()> {
        let provisioning = if thin { "thin" } else { "thick" };
        debug!(volume = vname, provisioning, "set provisioning");
        self.api()
            .modify_lun(vname, &json!({"provisioning": provisioning}))
            .await
    }

    /// Delete a volume. With `cascade` the snapshot-mount clones of its
    /// snapshots are removed as well; live clone volumes always block the
    /// deletion and are reported as named dependents.
    pub async fn delete_volume(&self, volume_id: &str, cascade: bool) -> Result<()> {
        let vname = names::vname(volume_id)?;
        debug!(volume = volume_id, cascade, "delete volume");
        self.delete_volume_inner(vname, cascade, true).await
    }

    /// Dry-run of a cascade delete: external ids of the snapshot-mount
    /// clones that would be removed.
    pub async fn list_resources_to_delete(&self, volume_id: &str) -> Result<Vec<String>> {
        let vname = names::vname(volume_id)?;
        let snapshots = match self.list_volume_snapshots_pages(&vname).await {
            Ok(s) => s,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let busy = graph::busy_snapshots(&snapshots, true, false);
        let mut out = Vec::new();
        for snap in busy {
            for clone in snap.clone_names() {
                if names::is_snapshot(&clone) {
                    out.push(names::idname(&clone)?);
                }
            }
        }
        Ok(out)
    }

    /// Recursive deletion worker shared by the volume and snapshot paths.
    ///
    /// Boxed because snapshot-mount cleanup recurses into it.
    pub(crate) fn delete_volume_inner(
        &self,
        vname: String,
        cascade: bool,
        detach_target: bool,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            debug!(volume = %vname, cascade, "deleting physical volume");

            if detach_target {
                match self.detach_volume(&vname).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {
                        debug!(volume = %vname, "no target holds this volume");
                    }
                    Err(err) => return Err(err),
                }
            }

            // One re-attempt after mount-point cleanup; a volume that is
            // still busy after that has live dependents.
            for attempt in 0..2 {
                let vol = match self.api().get_lun(&vname).await {
                    Ok(v) => v,
                    Err(err) if err.is_not_found() => {
                        debug!(volume = %vname, "already deleted");
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                };

                match self.api().delete_lun(&vname, cascade, true).await {
                    Ok(()) => {
                        self.delete_origin_snapshot(&vname, &vol).await;
                        return Ok(());
                    }
                    Err(err) if err.is_busy() => {
                        debug!(volume = %vname, "volume busy, direct deletion failed");
                        if !cascade || attempt > 0 {
                            return Err(err);
                        }
                    }
                    Err(err) if err.is_not_found() => return Ok(()),
                    Err(err) => return Err(err),
                }

                let snapshots = match self.list_volume_snapshots_pages(&vname).await {
                    Ok(s) => s,
                    Err(err) if err.is_not_found() => return Ok(()),
                    Err(err) => return Err(err),
                };

                let busy = graph::busy_snapshots(&snapshots, false, true);
                if !busy.is_empty() {
                    let mut dependents = Vec::new();
                    for snap in &busy {
                        for clone in snap.clone_names() {
                            if names::is_volume(&clone) {
                                dependents.push(names::idname(&clone)?);
                            }
                        }
                    }
                    return Err(JdssError::VolumeBusyWithDependents {
                        volume: names::idname(&vname)?,
                        dependents,
                    });
                }

                for snap in &snapshots {
                    for clone in snap.clone_names() {
                        if names::is_snapshot(&clone) {
                            debug!(clone = %clone, "delete snapshot mount point");
                            self.delete_volume_inner(clone, true, false).await?;
                        }
                    }
                }
            }
            Err(JdssError::Busy {
                kind: crate::error::ResourceKind::Volume,
                name: vname,
            })
        })
    }

    /// After a cloned volume is gone, reap its source snapshot when that
    /// snapshot exists only to serve the clone (anonymous clone snapshots
    /// and tombstoned leftovers). Best effort.
    async fn delete_origin_snapshot(&self, vname: &str, vol: &VolumeRecord) {
        let Some(origin) = vol.origin.as_deref().filter(|o| !o.is_empty()) else {
            return;
        };
        let (Some(ovol), Some(osnap)) = (names::origin_volume(origin), names::origin_snapshot(origin))
        else {
            return;
        };

        let own_id = names::idname(vname).ok();
        let anonymous = match (&own_id, names::vid_from_sname(&osnap)) {
            (Some(own), Ok(Some(vid))) => vid == *own,
            _ => false,
        };

        if names::is_volume(&osnap) || names::is_hidden(&osnap) || anonymous {
            match self.api().delete_snapshot(&ovol, &osnap, true, true).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(
                        snapshot = %osnap,
                        volume = %ovol,
                        error = %err,
                        "failed to reap source snapshot"
                    );
                }
            }
        }
    }

    /// Roll a volume back to a snapshot. Refuses when newer snapshots or
    /// clones would be destroyed; `force_snapshots` overrides the snapshot
    /// check but never the clone check.
    pub async fn rollback(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        force_snapshots: bool,
    ) -> Result<()> {
        let vname = names::vname(volume_id)?;
        let sname = names::sname(snapshot_id, None);

        let counts = self.api().get_snapshot_rollback(&vname, &sname).await?;

        if counts.snapshots == 0 && counts.clones == 0 {
            debug!(volume = volume_id, snapshot = snapshot_id, "rollback is unobstructed");
            return self.api().snapshot_rollback(&vname, &sname).await;
        }
        if force_snapshots && counts.clones == 0 {
            debug!(volume = volume_id, snapshot = snapshot_id, "forced rollback over snapshots");
            return self.api().snapshot_rollback(&vname, &sname).await;
        }

        let deps = self.list_snapshot_rollback_dependency(&vname, &sname).await?;
        let snapshots = pad_unknown(deps.snapshots, counts.snapshots);
        let clones = pad_unknown(deps.clones, counts.clones);
        Err(JdssError::RollbackBlocked {
            volume: volume_id.to_string(),
            snapshot: snapshot_id.to_string(),
            snapshots,
            clones,
            snapshot_count: counts.snapshots,
            clone_count: counts.clones,
        })
    }

    /// Read-only sibling of [`rollback`]: `None` when rollback would not
    /// destroy anything, the dependency set otherwise.
    pub async fn rollback_check(
        &self,
        volume_id: &str,
        snapshot_id: &str,
    ) -> Result<Option<RollbackDependency>> {
        let vname = names::vname(volume_id)?;
        let sname = names::sname(snapshot_id, None);

        let counts = self.api().get_snapshot_rollback(&vname, &sname).await?;
        if counts.snapshots == 0 && counts.clones == 0 {
            return Ok(None);
        }

        let deps = self.list_snapshot_rollback_dependency(&vname, &sname).await?;
        Ok(Some(RollbackDependency {
            snapshots: pad_unknown(deps.snapshots, counts.snapshots),
            clones: pad_unknown(deps.clones, counts.clones),
        }))
    }

    /// Local enumeration of resources a rollback would destroy: snapshots of
    /// `vname` strictly newer than `sname`, plus every clone they reference.
    /// The appliance counts may exceed this list.
    async fn list_snapshot_rollback_dependency(
        &self,
        vname: &str,
        sname: &str,
    ) -> Result<RollbackDependency> {
        let pivot = self.api().get_snapshot(vname, sname).await?;
        let pivot_creation = graph::parse_creation(pivot.creation_str());

        let snapshots = self.list_volume_snapshots_pages(vname).await?;
        let newer = graph::snapshots_newer_than(&snapshots, sname, pivot_creation);

        let mut snapshot_names = Vec::new();
        for snap in &newer {
            snapshot_names.push(names::idname(&snap.name)?);
        }
        let mut clone_names = Vec::new();
        for clone in graph::all_clone_names(&newer) {
            clone_names.push(names::idname(&clone)?);
        }
        Ok(RollbackDependency {
            snapshots: snapshot_names,
            clones: clone_names,
        })
    }

    pub(crate) fn physical_volume_name(&self, volume_id: &str, direct: bool) -> Result<String> {
        if direct {
            Ok(volume_id.to_string())
        } else {
            names::vname(volume_id)
        }
    }
}

/// The appliance may know about dependents the local walk cannot see; report
/// those as "Unknown" rather than an empty list.
fn pad_unknown(found: Vec<String>, count: u64) -> Vec<String> {
    if found.is_empty() && count > 0 {
        vec!["Unknown".to_string()]
    } else {
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_size_pattern() {
        let re = clone_size_pattern();
        for ok in ["10G", "512m", "1024", "8K", "0"] {
            assert!(re.is_match(ok), "{ok}");
        }
        for bad in ["10T", "G", "-5G", "1.5G", ""] {
            assert!(!re.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn test_clone_size_resize_gate() {
        for resizes in ["10G", "512m", "1024", "8K", "20"] {
            assert!(clone_size_requests_resize(resizes), "{resizes}");
        }
        // single-character sizes keep the snapshot's size
        for keeps in ["0", "5", "9"] {
            assert!(!clone_size_requests_resize(keeps), "{keeps}");
        }
        for invalid in ["10T", "G", "-5G", ""] {
            assert!(!clone_size_requests_resize(invalid), "{invalid}");
        }
    }

    #[test]
    fn test_pad_unknown() {
        assert_eq!(pad_unknown(vec![], 2), vec!["Unknown".to_string()]);
        assert_eq!(pad_unknown(vec!["s1".into()], 2), vec!["s1".to_string()]);
        assert!(pad_unknown(vec![], 0).is_empty());
    }
}
