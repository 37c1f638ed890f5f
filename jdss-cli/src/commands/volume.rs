//! `volume <id>` subject: get, clone, delete, rename, resize and the
//! snapshot subtree.

use std::time::Duration;

use clap::Subcommand;
use jdss_driver::{JdssDriver, JdssError, Result, parse_size};
use tracing::debug;

use super::print_hex;

#[derive(Debug, Subcommand)]
pub enum VolumeAction {
    /// Print volume properties
    Get {
        /// Print volume size in bytes
        #[arg(short = 's')]
        size: bool,

        /// Print volume size in gigabytes
        #[arg(short = 'G')]
        gigabytes: bool,

        /// Print volume scsi id
        #[arg(short = 'i', long = "scsi-id")]
        scsi_id: bool,

        /// Print volume san scsi id
        #[arg(short = 'n', long = "san-scsi-id")]
        san_scsi_id: bool,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Clone the volume, optionally from a snapshot
    Clone {
        /// Clone volume name
        #[arg(short = 'n', long = "name")]
        clone_name: String,

        /// Use snapshot for cloning
        #[arg(long = "snapshot")]
        snapshot_name: Option<String>,

        /// New volume size in format size + [K M G]
        #[arg(long = "size")]
        clone_size: Option<String>,
    },
    /// Delete the volume
    Delete {
        /// Remove snapshot-mount clones along with the volume
        #[arg(short = 'c', long)]
        cascade: bool,

        /// Print resources that would be deleted instead of deleting
        #[arg(short = 'p', long = "printres")]
        print_resources: bool,

        /// Target name prefix override
        #[arg(long = "target-prefix")]
        target_prefix: Option<String>,
    },
    /// Rename the volume
    Rename {
        /// New volume name
        new_name: String,
    },
    /// Resize the volume
    Resize {
        /// New volume size
        new_size: String,

        /// Add the new size to the existing volume size
        #[arg(long = "add")]
        add: bool,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Operate on a single snapshot
    Snapshot {
        /// Snapshot name
        snapshot_name: String,

        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Operate on the volume's snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SnapshotAction {
    /// Delete the snapshot
    Delete,
    /// Print snapshot properties
    Get {
        /// Print snapshot scsi id
        #[arg(short = 'i', long = "scsi-id")]
        scsi_id: bool,

        /// Print snapshot san scsi id
        #[arg(short = 'n', long = "san-scsi-id")]
        san_scsi_id: bool,

        /// Use real names
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Roll the volume back to the snapshot
    Rollback {
        /// Only report what a rollback would destroy
        #[arg(long)]
        check: bool,

        /// Roll back even over newer snapshots (never over clones)
        #[arg(long = "force-snapshots")]
        force_snapshots: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum SnapshotsAction {
    /// Create a snapshot
    Create {
        /// New snapshot name
        snapshot_name: String,

        /// Do not fail if a snapshot with that name exists
        #[arg(long)]
        ignoreexists: bool,
    },
    /// List snapshots
    List {
        /// Add the guid to the output
        #[arg(long)]
        guid: bool,

        /// Add the creation time to the output
        #[arg(long)]
        creation: bool,
    },
}

pub async fn run(jdss: &JdssDriver, volume_name: &str, action: VolumeAction) -> Result<()> {
    match action {
        VolumeAction::Get {
            size,
            gigabytes,
            scsi_id,
            san_scsi_id,
            direct,
        } => {
            let info = jdss.get_volume(volume_name, direct).await?;
            if size {
                println!("{}", info.size);
            }
            if gigabytes {
                println!("{}", info.size / (1024 * 1024 * 1024));
            }
            if scsi_id {
                let id = info.scsi_id.ok_or_else(|| {
                    JdssError::Config(format!("volume '{volume_name}' has no scsi id"))
                })?;
                print_hex(&id);
            }
            if san_scsi_id {
                let id = info.san_scsi_id.ok_or_else(|| {
                    JdssError::Config(format!("volume '{volume_name}' has no san scsi id"))
                })?;
                print_hex(&id);
            }
            Ok(())
        }
        VolumeAction::Clone {
            clone_name,
            snapshot_name,
            clone_size,
        } => {
            jdss.create_cloned_volume(
                &clone_name,
                volume_name,
                clone_size.as_deref(),
                snapshot_name.as_deref(),
                None,
            )
            .await
        }
        VolumeAction::Delete {
            cascade,
            print_resources,
            target_prefix: _,
        } => {
            if print_resources {
                for resource in jdss.list_resources_to_delete(volume_name).await? {
                    println!("{resource}");
                }
                Ok(())
            } else {
                jdss.delete_volume(volume_name, cascade).await
            }
        }
        VolumeAction::Rename { new_name } => jdss.rename_volume(volume_name, &new_name).await,
        VolumeAction::Resize {
            new_size,
            add,
            direct,
        } => resize(jdss, volume_name, &new_size, add, direct).await,
        VolumeAction::Snapshot {
            snapshot_name,
            action,
        } => snapshot(jdss, volume_name, &snapshot_name, action).await,
        VolumeAction::Snapshots { action } => snapshots(jdss, volume_name, action).await,
    }
}

async fn resize(
    jdss: &JdssDriver,
    volume_name: &str,
    new_size: &str,
    add: bool,
    direct: bool,
) -> Result<()> {
    let mut size = parse_size(new_size)?;
    if add {
        let current = jdss.get_volume(volume_name, direct).await?;
        size += current.size;
    }
    jdss.resize_volume(volume_name, size, direct).await?;

    // the appliance applies the resize asynchronously; wait until it shows
    for _ in 0..9 {
        let current = jdss.get_volume(volume_name, direct).await?;
        if current.size == size {
            break;
        }
        debug!(volume = volume_name, "resize not visible yet");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

async fn snapshot(
    jdss: &JdssDriver,
    volume_name: &str,
    snapshot_name: &str,
    action: SnapshotAction,
) -> Result<()> {
    match action {
        SnapshotAction::Delete => jdss.delete_snapshot(volume_name, snapshot_name).await,
        SnapshotAction::Get {
            scsi_id,
            san_scsi_id,
            direct,
        } => {
            let want_export = scsi_id || san_scsi_id;
            let mut info = jdss
                .get_snapshot(volume_name, snapshot_name, want_export, direct)
                .await?;

            // a freshly exported snapshot may not carry its ids yet
            if want_export {
                for _ in 0..3 {
                    let have = (!scsi_id || info.scsi_id.is_some())
                        && (!san_scsi_id || info.san_scsi_id.is_some());
                    if have {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    info = jdss
                        .get_snapshot(volume_name, snapshot_name, true, direct)
                        .await?;
                }
            }

            if scsi_id {
                match (&info.scsi_id, &info.san_scsi_id) {
                    (Some(id), _) => print_hex(id),
                    (None, Some(san)) => print_hex(&san.chars().take(16).collect::<String>()),
                    (None, None) => {
                        return Err(JdssError::Config(format!(
                            "unable to acquire scsi id for snapshot '{snapshot_name}' of volume '{volume_name}'"
                        )));
                    }
                }
            }
            if san_scsi_id {
                let id = info.san_scsi_id.ok_or_else(|| {
                    JdssError::Config(format!(
                        "unable to acquire san scsi id for snapshot '{snapshot_name}' of volume '{volume_name}'"
                    ))
                })?;
                print_hex(&id);
            }
            if !scsi_id && !san_scsi_id {
                println!("name: {}", info.name);
                if let Some(creation) = &info.creation {
                    println!("creation: {creation}");
                }
                if let Some(guid) = &info.guid {
                    println!("guid: {guid}");
                }
            }
            Ok(())
        }
        SnapshotAction::Rollback {
            check,
            force_snapshots,
        } => {
            if check {
                if let Some(deps) = jdss.rollback_check(volume_name, snapshot_name).await? {
                    for snap in deps.snapshots {
                        println!("snapshot {snap}");
                    }
                    for clone in deps.clones {
                        println!("clone {clone}");
                    }
                }
                Ok(())
            } else {
                jdss.rollback(volume_name, snapshot_name, force_snapshots).await
            }
        }
    }
}

async fn snapshots(jdss: &JdssDriver, volume_name: &str, action: SnapshotsAction) -> Result<()> {
    match action {
        SnapshotsAction::Create {
            snapshot_name,
            ignoreexists,
        } => match jdss.create_snapshot(&snapshot_name, volume_name).await {
            Err(err) if err.is_exists() && ignoreexists => Ok(()),
            other => other,
        },
        SnapshotsAction::List { guid, creation } => {
            for snap in jdss.list_snapshots(volume_name).await? {
                let mut line = snap.name;
                if guid {
                    line.push(' ');
                    line.push_str(snap.guid.as_deref().unwrap_or("-"));
                }
                if creation {
                    line.push(' ');
                    line.push_str(snap.creation.as_deref().unwrap_or("-"));
                }
                println!("{line}");
            }
            Ok(())
        }
    }
}
