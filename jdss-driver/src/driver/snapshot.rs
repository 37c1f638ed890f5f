//! Snapshot lifecycle and graph traversal across the snapshot→clone chains.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use super::JdssDriver;
use crate::error::{JdssError, ResourceKind, Result};
use crate::names;
use crate::rest::SnapshotRecord;

/// Snapshot description returned to the CLI.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub name: String,
    pub guid: Option<String>,
    pub creation: Option<String>,
    pub scsi_id: Option<String>,
    pub san_scsi_id: Option<String>,
}

impl JdssDriver {
    /// Create a snapshot of a volume. The pre-existing snapshot check walks
    /// the whole clone chain so mount-clone revisions are seen too.
    pub async fn create_snapshot(&self, snapshot_id: &str, volume_id: &str) -> Result<()> {
        let vname = names::vname(volume_id)?;
        let sname = names::sname(snapshot_id, None);
        debug!(snapshot = snapshot_id, volume = volume_id, "create snapshot");

        let snaps = self.list_volume_snapshots_recursive(volume_id, &vname).await?;
        if snaps.iter().any(|s| s.name == sname) {
            return Err(JdssError::Exists {
                kind: ResourceKind::Snapshot,
                name: snapshot_id.to_string(),
            });
        }
        self.api().create_snapshot(&vname, &sname).await
    }

    /// Delete a snapshot of a volume, resolving hidden parents and
    /// snapshot-mount clones along the way. Deleting an absent snapshot
    /// succeeds. The snapshot is looked up under its plain name first and
    /// under its mount-clone name second.
    pub async fn delete_snapshot(&self, volume_id: &str, snapshot_id: &str) -> Result<()> {
        let vname = names::vname(volume_id)?;
        if self
            .delete_snapshot_inner(&vname, &names::sname(snapshot_id, None))
            .await?
        {
            return Ok(());
        }
        self.delete_snapshot_inner(&vname, &names::sname(snapshot_id, Some(volume_id)))
            .await?;
        Ok(())
    }

    /// Returns `false` when no snapshot with that physical name exists
    /// anywhere under `vname` (so the caller can try another spelling).
    async fn delete_snapshot_inner(&self, vname: &str, sname: &str) -> Result<bool> {
        let Some(pname) = self.find_snapshot_parent(vname, sname).await? else {
            debug!(snapshot = sname, "snapshot not present under this name");
            return Ok(false);
        };

        let snap = match self.api().get_snapshot(&pname, sname).await {
            Ok(snap) => snap,
            Err(err) if err.is_not_found() => {
                debug!(snapshot = sname, "snapshot already deleted");
                return Ok(true);
            }
            Err(err) => return Err(err),
        };

        for clone in snap.clone_names() {
            if names::is_hidden(&clone) {
                let dsnaps = self.list_volume_snapshots_pages(&clone).await?;
                if !dsnaps.is_empty() {
                    let mut deps = Vec::new();
                    for s in &dsnaps {
                        deps.push(names::sid_from_sname(&s.name).unwrap_or_else(|_| s.name.clone()));
                    }
                    return Err(names::busy_with_dependents(
                        ResourceKind::Snapshot,
                        &names::sid_from_sname(sname).unwrap_or_else(|_| sname.to_string()),
                        "snapshot is busy, delete dependent snapshots first",
                        &deps,
                    ));
                }
                self.delete_volume_inner(clone, false, true).await?;
            } else if names::is_volume(&clone) {
                let deps = vec![names::idname(&clone)?];
                return Err(names::busy_with_dependents(
                    ResourceKind::Snapshot,
                    &names::sid_from_sname(sname).unwrap_or_else(|_| sname.to_string()),
                    "snapshot is busy, delete dependent clone first",
                    &deps,
                ));
            } else if names::is_snapshot(&clone) {
                self.delete_volume_inner(clone, true, true).await?;
            }
        }

        if names::is_hidden(&pname) {
            // a hidden parent with siblings stays as a placeholder; the last
            // snapshot takes the parent down with it
            let siblings = self.api().get_volume_snapshots_page(&pname, 0).await?;
            if siblings.len() > 1 {
                match self.api().delete_snapshot(&pname, sname, false, true).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {
                        debug!(snapshot = sname, "snapshot already gone");
                    }
                    Err(err) => return Err(err),
                }
            } else {
                self.delete_volume_inner(pname, true, true).await?;
            }
        } else if names::is_volume(&pname) {
            match self.api().delete_snapshot(&pname, sname, false, true).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    debug!(snapshot = sname, "snapshot already gone");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    }

    /// Snapshots of a volume decoded to external ids.
    pub async fn list_snapshots(&self, volume_id: &str) -> Result<Vec<SnapshotInfo>> {
        let vname = names::vname(volume_id)?;
        let records = self.list_volume_snapshots_recursive(volume_id, &vname).await?;
        let mut out = Vec::new();
        for rec in records {
            let Ok(vid) = names::vid_from_sname(&rec.name) else {
                continue;
            };
            if vid.is_some() && vid.as_deref() != Some(volume_id) {
                continue;
            }
            let Ok(sid) = names::sid_from_sname(&rec.name) else {
                continue;
            };
            out.push(SnapshotInfo {
                name: sid,
                guid: rec.guid.clone(),
                creation: rec.creation.clone(),
                scsi_id: prop_str(&rec, "default_scsi_id"),
                san_scsi_id: prop_str(&rec, "san:volume_id"),
            });
        }
        Ok(out)
    }

    /// Snapshot information; `export` addresses the snapshot-mount clone
    /// (a readonly volume) instead of the snapshot itself.
    pub async fn get_snapshot(
        &self,
        volume_id: &str,
        snapshot_id: &str,
        export: bool,
        direct: bool,
    ) -> Result<SnapshotInfo> {
        if export {
            let scname = if direct {
                snapshot_id.to_string()
            } else {
                names::sname(snapshot_id, Some(volume_id))
            };
            let rec = self.api().get_lun(&scname).await?;
            return Ok(SnapshotInfo {
                name: snapshot_id.to_string(),
                guid: None,
                creation: rec.creation.clone(),
                scsi_id: rec.prop_str("default_scsi_id").map(str::to_string),
                san_scsi_id: rec.prop_str("san:volume_id").map(str::to_string),
            });
        }

        let (vname, sname) = if direct {
            (volume_id.to_string(), snapshot_id.to_string())
        } else {
            (names::vname(volume_id)?, names::sname(snapshot_id, None))
        };
        let rec = self.api().get_snapshot(&vname, &sname).await?;
        Ok(SnapshotInfo {
            name: snapshot_id.to_string(),
            guid: rec.guid.clone(),
            creation: rec.creation.clone(),
            scsi_id: prop_str(&rec, "default_scsi_id"),
            san_scsi_id: prop_str(&rec, "san:volume_id"),
        })
    }

    /// Paginate the snapshots of one physical volume (no recursion into
    /// clones).
    pub(crate) async fn list_volume_snapshots_pages(
        &self,
        vname: &str,
    ) -> Result<Vec<SnapshotRecord>> {
        self.list_all_pages(|page| self.api().get_volume_snapshots_page(vname, page))
            .await
    }

    /// List snapshots across the whole snapshot→clone graph rooted at
    /// `vname`. Only snapshots belonging to `origin_id` (or carrying no
    /// volume id) are kept; traversal tracks visited physical names since
    /// cloning cannot create cycles but chains may share nodes.
    pub(crate) async fn list_volume_snapshots_recursive(
        &self,
        origin_id: &str,
        vname: &str,
    ) -> Result<Vec<SnapshotRecord>> {
        let mut out = Vec::new();
        let mut stack = vec![vname.to_string()];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let snaps = match self.list_volume_snapshots_pages(&current).await {
                Ok(s) => s,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            for snap in snaps {
                if names::is_volume(&snap.name) {
                    // anonymous clone snapshot, named after its clone volume
                    warn!(snapshot = %snap.name, "linked clone present among snapshots");
                    continue;
                }
                if !names::is_snapshot(&snap.name) {
                    continue;
                }
                let vid = names::vid_from_sname(&snap.name).unwrap_or(None);
                if vid.is_none() || vid.as_deref() == Some(origin_id) {
                    for clone in snap.clone_names() {
                        stack.push(clone);
                    }
                    out.push(snap);
                }
            }
        }
        Ok(out)
    }

    /// DFS down the snapshot→clone→snapshot chain for the physical volume
    /// that directly owns `sname`, or `None`.
    pub(crate) async fn find_snapshot_parent(
        &self,
        vname: &str,
        sname: &str,
    ) -> Result<Option<String>> {
        let mut stack = vec![vname.to_string()];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let snaps = match self.list_volume_snapshots_pages(&current).await {
                Ok(s) => s,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            for snap in &snaps {
                if snap.name == sname {
                    return Ok(Some(current));
                }
            }
            for snap in &snaps {
                if names::is_volume(&snap.name) {
                    warn!(snapshot = %snap.name, "linked clone present among snapshots");
                    continue;
                }
                for clone in snap.clone_names() {
                    stack.push(clone);
                }
            }
        }
        Ok(None)
    }
}

fn prop_str(rec: &SnapshotRecord, key: &str) -> Option<String> {
    rec.props.get(key).and_then(Value::as_str).map(str::to_string)
}
