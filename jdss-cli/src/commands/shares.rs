//! `shares` / `share` / `cifs` subjects.

use clap::Subcommand;
use jdss_driver::{JdssDriver, Result, parse_size};

#[derive(Debug, Subcommand)]
pub enum SharesAction {
    /// Create an NFS share with a backing NAS volume
    Create {
        /// New share name
        #[arg(short = 'n', long = "name")]
        share_name: String,

        /// Maximum size in format num + [M G T]
        #[arg(short = 'q', long = "quota")]
        quota: String,

        /// Reserved size in format num + [M G T]
        #[arg(short = 'r', long = "reservation")]
        reservation: Option<String>,

        /// Use real share name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// List shares
    List {
        /// Show only shares with a VM id
        #[arg(long)]
        vmid: bool,

        /// Print actual share names
        #[arg(short = 'd', long = "direct")]
        direct: bool,

        /// Print share paths
        #[arg(short = 'p', long = "path")]
        path: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ShareAction {
    /// Print share properties
    Get {
        /// Print share quota size in bytes
        #[arg(short = 's')]
        size: bool,

        /// Print share quota size in gigabytes
        #[arg(short = 'G')]
        gigabytes: bool,

        /// Use real share name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Delete the share and its backing NAS volume
    Delete {
        /// Use real share name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Resize the share quota
    Resize {
        /// New share size
        new_size: String,

        /// Add the new size to the existing quota
        #[arg(long = "add")]
        add: bool,

        /// Use real share name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum CifsAction {
    /// Converge an SMB share with its backing volume and access user
    Ensure {
        /// Size of the share
        #[arg(short = 's', long = "size", default_value = "10G")]
        size: String,

        /// User name for this share
        #[arg(short = 'u', long = "user")]
        user: String,

        /// Password for the user
        #[arg(short = 'p', long = "password")]
        password: String,

        /// Name of the backing NAS volume
        #[arg(short = 'n', long = "nasname")]
        nas_name: String,
    },
    /// Grow the share quota
    Extend {
        /// New size of the share
        #[arg(short = 's', long = "size")]
        size: String,
    },
    /// Delete the share and its backing NAS volume
    Delete,
}

pub async fn run_shares(jdss: &JdssDriver, action: SharesAction) -> Result<()> {
    match action {
        SharesAction::Create {
            share_name,
            quota,
            reservation,
            direct,
        } => {
            jdss.create_share(&share_name, &quota, reservation.as_deref(), direct)
                .await
        }
        SharesAction::List { vmid, direct, path } => {
            for share in jdss.list_shares(direct).await? {
                if vmid && !share.name.contains("vm-") {
                    continue;
                }
                if path {
                    println!("{} {}", share.name, share.path.as_deref().unwrap_or("-"));
                } else {
                    println!("{}", share.name);
                }
            }
            Ok(())
        }
    }
}

pub async fn run_share(jdss: &JdssDriver, share_name: &str, action: ShareAction) -> Result<()> {
    match action {
        ShareAction::Get {
            size,
            gigabytes,
            direct,
        } => {
            let vol = jdss.get_nas_volume(share_name, direct).await?;
            let quota = vol.quota.unwrap_or(0);
            if gigabytes {
                println!("{}", quota / (1024 * 1024 * 1024));
            } else if size {
                println!("{quota}");
            }
            Ok(())
        }
        ShareAction::Delete { direct } => jdss.delete_share(share_name, direct).await,
        ShareAction::Resize {
            new_size,
            add,
            direct,
        } => {
            let mut size = parse_size(&new_size)?;
            if add {
                let vol = jdss.get_nas_volume(share_name, direct).await?;
                size += vol.quota.unwrap_or(0);
            }
            jdss.resize_share(share_name, size, direct).await
        }
    }
}

pub async fn run_cifs(jdss: &JdssDriver, share_name: &str, action: CifsAction) -> Result<()> {
    match action {
        CifsAction::Ensure {
            size,
            user,
            password,
            nas_name,
        } => {
            jdss.ensure_cifs_share(share_name, &nas_name, &user, &password, &size)
                .await
        }
        CifsAction::Extend { size } => {
            let bytes = parse_size(&size)?;
            jdss.resize_share(share_name, bytes, true).await
        }
        CifsAction::Delete => jdss.delete_share(share_name, true).await,
    }
}
