//! NAS volumes (datasets), NAS snapshots/clones and NFS/SMB shares.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::{JdssDriver, parse_size};
use crate::error::{JdssError, Result};
use crate::names;
use crate::rest::{NasVolumeRecord, ShareProto, SnapshotRecord};

/// How long the appliance gets to populate a fresh share's `real_path`.
const SHARE_POLL_ATTEMPTS: u32 = 3;
const SHARE_POLL_DELAY: Duration = Duration::from_secs(1);

/// NAS snapshot description returned to the CLI.
#[derive(Debug, Clone)]
pub struct NasSnapshotInfo {
    pub snapshot_name: String,
    pub volume_name: String,
}

/// Share listing entry.
#[derive(Debug, Clone)]
pub struct ShareInfo {
    pub name: String,
    pub path: Option<String>,
}

impl JdssDriver {
    /// Create a NAS volume with a quota and optional reservation, both
    /// human size strings.
    pub async fn create_nas_volume(
        &self,
        volume_id: &str,
        quota: &str,
        reservation: Option<&str>,
        direct: bool,
    ) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let quota = parse_size(quota)?;
        let reservation = reservation.map(parse_size).transpose()?;
        debug!(dataset = volume_id, quota, "create NAS volume");
        self.api().create_nas_volume(&dname, quota, reservation).await
    }

    /// NAS volume quota and name by external id.
    pub async fn get_nas_volume(&self, volume_id: &str, direct: bool) -> Result<NasVolumeRecord> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        self.api().get_nas_volume(&dname).await
    }

    /// External ids of all NAS volumes in the pool.
    pub async fn list_nas_volumes(&self) -> Result<Vec<String>> {
        let records = self
            .list_all_pages(|page| self.api().get_nas_volumes_page(page))
            .await?;
        let mut out = Vec::new();
        for rec in records {
            if !names::is_volume(&rec.name) {
                continue;
            }
            if let Ok(id) = names::idname(&rec.name) {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Delete a NAS volume; absence is success.
    pub async fn delete_nas_volume(&self, volume_id: &str, direct: bool) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        debug!(dataset = volume_id, "delete NAS volume");
        match self.api().delete_nas_volume(&dname).await {
            Err(err) if err.is_not_found() => {
                debug!(dataset = volume_id, "already absent");
                Ok(())
            }
            other => other,
        }
    }

    /// Grow the quota of a NAS volume to `new_size` bytes.
    pub async fn resize_nas_volume(&self, volume_id: &str, new_size: u64, direct: bool) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        self.api().extend_nas_volume(&dname, new_size).await
    }

    /// Create a NAS snapshot. `proxmox_volume` is encoded into the snapshot
    /// name the same way snapshot-mount clones carry their volume id.
    pub async fn create_nas_snapshot(
        &self,
        snapshot_id: &str,
        volume_id: &str,
        direct: bool,
        proxmox_volume: Option<&str>,
        ignore_exists: bool,
    ) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let sname = names::sname(snapshot_id, proxmox_volume);
        debug!(dataset = volume_id, snapshot = snapshot_id, "create NAS snapshot");
        match self.api().create_nas_snapshot(&dname, &sname).await {
            Err(err) if err.is_exists() && ignore_exists => Ok(()),
            other => other,
        }
    }

    /// Delete a NAS snapshot, removing published clone datasets first.
    /// Absence anywhere along the way is success.
    pub async fn delete_nas_snapshot(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        direct: bool,
        proxmox_volume: Option<&str>,
    ) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let sname = names::sname(snapshot_id, proxmox_volume);

        let clones = match self.api().get_nas_clones(&dname, &sname).await {
            Ok(clones) => clones,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };
        for clone in clones {
            if names::is_snapshot(&clone.name) {
                match self.api().delete_nas_volume(&clone.name).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }
        }

        match self.api().delete_nas_snapshot(&dname, &sname).await {
            Err(err) if err.is_not_found() => {
                debug!(snapshot = snapshot_id, "already absent");
                Ok(())
            }
            other => other,
        }
    }

    /// NAS snapshot record.
    pub async fn get_nas_snapshot(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        direct: bool,
        proxmox_volume: Option<&str>,
    ) -> Result<SnapshotRecord> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let sname = names::sname(snapshot_id, proxmox_volume);
        self.api().get_nas_snapshot(&dname, &sname).await
    }

    /// Snapshots of a NAS volume, optionally filtered to those carrying a
    /// specific proxmox volume id.
    pub async fn list_nas_snapshots(
        &self,
        volume_id: &str,
        direct: bool,
        proxmox_volume: Option<&str>,
    ) -> Result<Vec<NasSnapshotInfo>> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let records = self
            .list_all_pages(|page| self.api().get_nas_volume_snapshots_page(&dname, page))
            .await?;

        let mut out = Vec::new();
        for rec in records {
            if !names::is_snapshot(&rec.name) {
                continue;
            }
            let Ok(sid) = names::sid_from_sname(&rec.name) else {
                continue;
            };
            if let Some(pvol) = proxmox_volume {
                if names::vid_from_sname(&rec.name).unwrap_or(None).as_deref() != Some(pvol) {
                    continue;
                }
            }
            out.push(NasSnapshotInfo {
                snapshot_name: sid,
                volume_name: volume_id.to_string(),
            });
        }
        Ok(out)
    }

    /// Create a writable clone dataset from a NAS snapshot. `options` may
    /// carry ZFS properties (`compression`, `copies`, `dedup`).
    pub async fn create_nas_clone(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        clone_name: &str,
        direct: bool,
        options: Option<&Value>,
    ) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let sname = names::sname(snapshot_id, None);
        self.api()
            .create_nas_clone(&dname, &sname, clone_name, options)
            .await
    }

    /// Delete a clone dataset of a NAS snapshot.
    pub async fn delete_nas_clone(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        clone_name: &str,
        direct: bool,
    ) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let sname = names::sname(snapshot_id, None);
        self.api().delete_nas_clone(&dname, &sname, clone_name).await
    }

    /// Clone datasets published from a NAS snapshot.
    pub async fn list_nas_clones(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        direct: bool,
    ) -> Result<Vec<NasVolumeRecord>> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let sname = names::sname(snapshot_id, None);
        self.api().get_nas_clones(&dname, &sname).await
    }

    /// Publish a NAS snapshot: clone it to a dataset named after the
    /// snapshot and expose the clone over NFS. Returns the share's real
    /// filesystem path. Safe to call again for an existing publication.
    pub async fn publish_nas_snapshot(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        direct: bool,
        proxmox_volume: Option<&str>,
    ) -> Result<String> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        // the snapshot under the name it was created with, the clone under
        // the name that carries the owning volume id
        let sname = names::sname(snapshot_id, proxmox_volume);
        let cname = names::sname(snapshot_id, Some(volume_id));
        debug!(dataset = volume_id, snapshot = snapshot_id, "publish NAS snapshot");

        match self.api().create_nas_clone(&dname, &sname, &cname, None).await {
            Ok(()) => {}
            Err(err) if err.is_exists() => {
                debug!(clone = %cname, "clone already published");
            }
            Err(err) => return Err(err),
        }

        let share_path = format!("{}/{}", self.pool_name(), cname);
        match self
            .api()
            .create_share(&cname, &share_path, ShareProto::Nfs, true, false, true)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_exists() => {
                debug!(share = %cname, "share already exists");
            }
            Err(err) => return Err(err),
        }

        for _ in 0..SHARE_POLL_ATTEMPTS {
            match self.api().get_share(&cname).await {
                Ok(share) => {
                    if let Some(real_path) = share.real_path {
                        return Ok(real_path);
                    }
                }
                Err(err) => {
                    debug!(share = %cname, error = %err, "share not ready yet");
                }
            }
            tokio::time::sleep(SHARE_POLL_DELAY).await;
        }

        // the share never came up; undo both steps before failing
        if let Err(err) = self.api().delete_share(&cname).await {
            warn!(share = %cname, error = %err, "share cleanup failed");
        }
        if let Err(err) = self.api().delete_nas_clone(&dname, &sname, &cname).await {
            warn!(clone = %cname, error = %err, "clone cleanup failed");
        }
        Err(JdssError::OsInternal(format!(
            "share {cname} did not report a real path"
        )))
    }

    /// Remove the share and clone created by [`publish_nas_snapshot`].
    pub async fn unpublish_nas_snapshot(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        direct: bool,
        proxmox_volume: Option<&str>,
    ) -> Result<()> {
        let dname = self.physical_volume_name(volume_id, direct)?;
        let sname = names::sname(snapshot_id, proxmox_volume);
        let cname = names::sname(snapshot_id, Some(volume_id));
        debug!(dataset = volume_id, snapshot = snapshot_id, "unpublish NAS snapshot");

        match self.api().delete_share(&cname).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        match self.api().delete_nas_clone(&dname, &sname, &cname).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Create an NFS share backed by a NAS volume of the same name. An
    /// existing backing volume is reused.
    pub async fn create_share(
        &self,
        share_name: &str,
        quota: &str,
        reservation: Option<&str>,
        direct: bool,
    ) -> Result<()> {
        let sharename = self.physical_volume_name(share_name, direct)?;

        match self
            .create_nas_volume(share_name, quota, reservation, direct)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_exists() => {
                debug!(dataset = share_name, "NAS volume already exists");
            }
            Err(err) => return Err(err),
        }

        let share_path = format!("{}/{}", self.pool_name(), sharename);
        self.api()
            .create_share(&sharename, &share_path, ShareProto::Nfs, true, false, true)
            .await
    }

    /// Delete a share and its backing NAS volume.
    pub async fn delete_share(&self, share_name: &str, direct: bool) -> Result<()> {
        let sharename = self.physical_volume_name(share_name, direct)?;
        match self.api().delete_share(&sharename).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(share = share_name, "share already absent");
            }
            Err(err) => return Err(err),
        }
        self.delete_nas_volume(share_name, direct).await
    }

    /// All shares backed by driver-managed datasets, decoded to external ids.
    pub async fn list_shares(&self, raw_names: bool) -> Result<Vec<ShareInfo>> {
        let records = self
            .list_all_pages(|page| self.api().get_shares_page(page))
            .await?;
        let mut out = Vec::new();
        for rec in records {
            if !names::is_volume(&rec.name) {
                continue;
            }
            let name = if raw_names {
                rec.name.clone()
            } else {
                match names::idname(&rec.name) {
                    Ok(id) => id,
                    Err(_) => continue,
                }
            };
            out.push(ShareInfo {
                name,
                path: rec.path.clone(),
            });
        }
        Ok(out)
    }

    /// Grow a share's quota to `new_size` bytes.
    pub async fn resize_share(&self, share_name: &str, new_size: u64, direct: bool) -> Result<()> {
        self.resize_nas_volume(share_name, new_size, direct).await
    }

    /// Converge an SMB share: backing NAS volume, its access user (created
    /// or re-keyed) and the share itself, with the share's user set replaced
    /// by exactly `{user}`. Every step tolerates pre-existing state.
    pub async fn ensure_cifs_share(
        &self,
        share_name: &str,
        nas_name: &str,
        user: &str,
        password: &str,
        quota: &str,
    ) -> Result<()> {
        match self.api().get_nas_volume(nas_name).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                let quota = parse_size(quota)?;
                self.api().create_nas_volume(nas_name, quota, None).await?;
            }
            Err(err) => return Err(err),
        }

        match self.api().get_user(user).await {
            Ok(_) => self.api().set_user_pass(user, password).await?,
            Err(err) if err.is_not_found() => {
                self.api().create_user(user, password).await?;
            }
            Err(err) => return Err(err),
        }

        match self.api().get_share(share_name).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                let share_path = format!("{}/{}", self.pool_name(), nas_name);
                self.api()
                    .create_share(share_name, &share_path, ShareProto::Smb, true, false, true)
                    .await?;
            }
            Err(err) => return Err(err),
        }

        let users = self.api().get_share_users(share_name).await?;
        if users.iter().any(|u| u.name == user) {
            return Ok(());
        }
        for existing in &users {
            self.api().delete_share_user(share_name, &existing.name).await?;
        }
        self.api().set_share_user(share_name, user).await
    }
}
