//! `nas_volumes` / `nas_volume` subjects: datasets, NAS snapshots and
//! published clones.

use clap::Subcommand;
use jdss_driver::{JdssDriver, Result};
use serde_json::json;

#[derive(Debug, Subcommand)]
pub enum NasVolumesAction {
    /// Create a new NAS volume
    Create {
        /// New NAS volume name
        #[arg(short = 'n', long = "name")]
        nas_volume_name: String,

        /// Maximum size in format num + [M G T]
        #[arg(short = 'q', long = "quota")]
        quota: String,

        /// Reserved size in format num + [M G T]
        #[arg(short = 'r', long = "reservation")]
        reservation: Option<String>,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// List NAS volumes
    List {
        /// Show only volumes with a VM id
        #[arg(long)]
        vmid: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum NasVolumeAction {
    /// Print NAS volume properties
    Get {
        /// Print the quota size
        #[arg(short = 's')]
        size: bool,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Operate on a single NAS snapshot
    Snapshot {
        /// Snapshot name
        snapshot_name: String,

        #[command(subcommand)]
        action: NasSnapshotAction,
    },
    /// Operate on the NAS volume's snapshots
    Snapshots {
        #[command(subcommand)]
        action: NasSnapshotsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum NasSnapshotAction {
    /// Delete the snapshot
    Delete,
    /// Print snapshot properties
    Get,
    /// Publish the snapshot as an NFS share and print its real path
    Publish {
        /// Proxmox volume encoded in the snapshot name
        #[arg(long = "proxmox-volume")]
        proxmox_volume: Option<String>,
    },
    /// Remove the share and clone of a published snapshot
    Unpublish {
        /// Proxmox volume encoded in the snapshot name
        #[arg(long = "proxmox-volume")]
        proxmox_volume: Option<String>,
    },
    /// Operate on clones of the snapshot
    Clones {
        #[command(subcommand)]
        action: NasClonesAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum NasClonesAction {
    /// Create a clone dataset from the snapshot
    Create {
        /// Clone name
        clone_name: String,

        /// Compression algorithm
        #[arg(long)]
        compression: Option<String>,

        /// Number of copies (1-3)
        #[arg(long)]
        copies: Option<u8>,

        /// Deduplication setting
        #[arg(long)]
        dedup: Option<String>,
    },
    /// Delete a clone dataset
    Delete {
        /// Clone name
        clone_name: String,
    },
    /// List clone datasets
    List,
}

#[derive(Debug, Subcommand)]
pub enum NasSnapshotsAction {
    /// Create a NAS snapshot
    Create {
        /// New snapshot name
        snapshot_name: String,

        /// Do not fail if a snapshot with that name exists
        #[arg(long)]
        ignoreexists: bool,

        /// Proxmox volume name encoded into the snapshot name
        #[arg(long = "proxmox-volume")]
        proxmox_volume: Option<String>,
    },
    /// List NAS snapshots
    List {
        /// List only snapshots that have published clones
        #[arg(long = "with-clones")]
        with_clones: bool,
    },
}

pub async fn run_nas_volumes(jdss: &JdssDriver, action: NasVolumesAction) -> Result<()> {
    match action {
        NasVolumesAction::Create {
            nas_volume_name,
            quota,
            reservation,
            direct,
        } => {
            jdss.create_nas_volume(&nas_volume_name, &quota, reservation.as_deref(), direct)
                .await
        }
        NasVolumesAction::List { vmid } => {
            for name in jdss.list_nas_volumes().await? {
                if vmid && !name.contains("vm-") {
                    continue;
                }
                println!("{name}");
            }
            Ok(())
        }
    }
}

pub async fn run_nas_volume(
    jdss: &JdssDriver,
    nas_volume_name: &str,
    action: NasVolumeAction,
) -> Result<()> {
    match action {
        NasVolumeAction::Get { size, direct } => {
            let vol = jdss.get_nas_volume(nas_volume_name, direct).await?;
            if size {
                println!("{}", vol.quota.unwrap_or(0));
            }
            Ok(())
        }
        NasVolumeAction::Snapshot {
            snapshot_name,
            action,
        } => nas_snapshot(jdss, nas_volume_name, &snapshot_name, action).await,
        NasVolumeAction::Snapshots { action } => {
            nas_snapshots(jdss, nas_volume_name, action).await
        }
    }
}

async fn nas_snapshot(
    jdss: &JdssDriver,
    nas_volume_name: &str,
    snapshot_name: &str,
    action: NasSnapshotAction,
) -> Result<()> {
    match action {
        NasSnapshotAction::Delete => {
            jdss.delete_nas_snapshot(nas_volume_name, snapshot_name, false, None)
                .await
        }
        NasSnapshotAction::Get => {
            let snap = jdss
                .get_nas_snapshot(nas_volume_name, snapshot_name, false, None)
                .await?;
            println!("name: {}", snapshot_name);
            if let Some(creation) = &snap.creation {
                println!("creation: {creation}");
            }
            if let Some(guid) = &snap.guid {
                println!("guid: {guid}");
            }
            let clones = snap.clone_names();
            if !clones.is_empty() {
                println!("clones: {}", clones.join(","));
            }
            Ok(())
        }
        NasSnapshotAction::Publish { proxmox_volume } => {
            let real_path = jdss
                .publish_nas_snapshot(
                    nas_volume_name,
                    snapshot_name,
                    false,
                    proxmox_volume.as_deref(),
                )
                .await?;
            println!("{real_path}");
            Ok(())
        }
        NasSnapshotAction::Unpublish { proxmox_volume } => {
            jdss.unpublish_nas_snapshot(
                nas_volume_name,
                snapshot_name,
                false,
                proxmox_volume.as_deref(),
            )
            .await
        }
        NasSnapshotAction::Clones { action } => {
            nas_clones(jdss, nas_volume_name, snapshot_name, action).await
        }
    }
}

async fn nas_clones(
    jdss: &JdssDriver,
    nas_volume_name: &str,
    snapshot_name: &str,
    action: NasClonesAction,
) -> Result<()> {
    match action {
        NasClonesAction::Create {
            clone_name,
            compression,
            copies,
            dedup,
        } => {
            let mut options = serde_json::Map::new();
            if let Some(compression) = compression {
                options.insert("compression".into(), json!(compression));
            }
            if let Some(copies) = copies {
                options.insert("copies".into(), json!(copies));
            }
            if let Some(dedup) = dedup {
                options.insert("dedup".into(), json!(dedup));
            }
            let options = if options.is_empty() {
                None
            } else {
                Some(serde_json::Value::Object(options))
            };
            jdss.create_nas_clone(
                nas_volume_name,
                snapshot_name,
                &clone_name,
                false,
                options.as_ref(),
            )
            .await
        }
        NasClonesAction::Delete { clone_name } => {
            jdss.delete_nas_clone(nas_volume_name, snapshot_name, &clone_name, false)
                .await
        }
        NasClonesAction::List => {
            for clone in jdss
                .list_nas_clones(nas_volume_name, snapshot_name, false)
                .await?
            {
                println!("{}", clone.name);
            }
            Ok(())
        }
    }
}

async fn nas_snapshots(
    jdss: &JdssDriver,
    nas_volume_name: &str,
    action: NasSnapshotsAction,
) -> Result<()> {
    match action {
        NasSnapshotsAction::Create {
            snapshot_name,
            ignoreexists,
            proxmox_volume,
        } => {
            jdss.create_nas_snapshot(
                &snapshot_name,
                nas_volume_name,
                false,
                proxmox_volume.as_deref(),
                ignoreexists,
            )
            .await
        }
        NasSnapshotsAction::List { with_clones } => {
            for snap in jdss.list_nas_snapshots(nas_volume_name, false, None).await? {
                if with_clones {
                    let clones = jdss
                        .list_nas_clones(nas_volume_name, &snap.snapshot_name, false)
                        .await;
                    match clones {
                        Ok(clones) if !clones.is_empty() => {}
                        _ => continue,
                    }
                }
                println!("{}", snap.snapshot_name);
            }
            Ok(())
        }
    }
}
