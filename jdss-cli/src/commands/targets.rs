//! `targets` subject: export management.

use clap::Subcommand;
use jdss_driver::{JdssDriver, PublicationInfo, Result};

#[derive(Debug, Subcommand)]
pub enum TargetsAction {
    /// Expose a volume (or snapshot) over iSCSI
    Create {
        /// Volume name
        #[arg(short = 'v', long = "volume")]
        volume_name: String,

        /// Target name prefix
        #[arg(long = "target-prefix")]
        target_prefix: String,

        /// Target group name, appended to the prefix
        #[arg(long = "target-group-name")]
        target_group_name: String,

        /// Create the target for a snapshot of the volume
        #[arg(long = "snapshot")]
        snapshot_name: Option<String>,

        /// Maximal number of LUNs assigned to a single target
        #[arg(long = "luns-per-target", default_value_t = 8)]
        luns_per_target: usize,

        /// Generate CHAP credentials for the target
        #[arg(long)]
        chap: bool,

        /// Print only the host addresses
        #[arg(long)]
        host: bool,

        /// Print only the LUN id
        #[arg(long)]
        lun: bool,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Remove the export of a volume (or snapshot)
    Delete {
        /// Volume name
        #[arg(short = 'v', long = "volume")]
        volume_name: String,

        /// Target name prefix
        #[arg(long = "target-prefix")]
        target_prefix: String,

        /// Target group name, appended to the prefix
        #[arg(long = "target-group-name")]
        target_group_name: String,

        /// Delete the target created for a snapshot
        #[arg(long = "snapshot")]
        snapshot_name: Option<String>,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Print the target a volume is attached to
    Get {
        /// Volume name
        #[arg(short = 'v', long = "volume")]
        volume_name: String,

        /// Target name prefix
        #[arg(long = "target-prefix")]
        target_prefix: Option<String>,

        /// Target group name, appended to the prefix
        #[arg(long = "target-group-name")]
        target_group_name: String,

        /// Look up the target for a snapshot of the volume
        #[arg(long = "snapshot")]
        snapshot_name: Option<String>,

        /// Search for the target the volume is currently attached to
        #[arg(short = 'c', long)]
        current: bool,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// List all targets in the pool
    List,
}

pub async fn run(jdss: &JdssDriver, action: TargetsAction) -> Result<()> {
    match action {
        TargetsAction::Create {
            volume_name,
            target_prefix,
            target_group_name,
            snapshot_name,
            luns_per_target,
            chap,
            host,
            lun,
            direct,
        } => {
            let auth = chap.then(|| jdss.generate_provider_auth());
            let info = match snapshot_name {
                Some(snapshot) => {
                    jdss.create_export_snapshot(
                        &target_prefix,
                        &target_group_name,
                        &snapshot,
                        &volume_name,
                        auth.as_deref(),
                        luns_per_target,
                    )
                    .await?
                }
                None => {
                    jdss.ensure_target_volume(
                        &target_prefix,
                        &target_group_name,
                        &volume_name,
                        auth.as_deref(),
                        direct,
                        luns_per_target,
                    )
                    .await?
                }
            };
            print_publication(&info, host, lun);
            Ok(())
        }
        TargetsAction::Delete {
            volume_name,
            target_prefix,
            target_group_name,
            snapshot_name,
            direct,
        } => match snapshot_name {
            Some(snapshot) => {
                jdss.remove_export_snapshot(
                    &target_prefix,
                    &target_group_name,
                    &snapshot,
                    &volume_name,
                    direct,
                )
                .await
            }
            None => {
                jdss.remove_export(&target_prefix, &target_group_name, &volume_name, direct)
                    .await
            }
        },
        TargetsAction::Get {
            volume_name,
            target_prefix,
            target_group_name,
            snapshot_name,
            current: _,
            direct,
        } => {
            let prefix = target_prefix
                .unwrap_or_else(|| jdss.config().target_prefix.clone());
            let info = jdss
                .get_volume_target(
                    &prefix,
                    &target_group_name,
                    &volume_name,
                    snapshot_name.as_deref(),
                    direct,
                )
                .await?;
            if let Some(info) = info {
                print_publication(&info, false, false);
            }
            Ok(())
        }
        TargetsAction::List => {
            for target in jdss.list_targets().await? {
                println!("{target}");
            }
            Ok(())
        }
    }
}

/// Default output is `<target> <lun> <vips>`; `--host`/`--lun` narrow it to
/// single columns.
fn print_publication(info: &PublicationInfo, host_only: bool, lun_only: bool) {
    let vips = info.vips.join(",");
    let line = if host_only && lun_only {
        format!("{} {}", info.lun, vips)
    } else if host_only {
        vips
    } else if lun_only {
        info.lun.to_string()
    } else {
        let mut line = format!("{} {} {}", info.target, info.lun, vips);
        if let (Some(user), Some(password)) = (&info.username, &info.password) {
            line.push_str(&format!(" {user} {password}"));
        }
        line
    };
    println!("{line}");
}
