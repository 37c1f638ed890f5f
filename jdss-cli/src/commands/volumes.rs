//! `volumes` subject: create, list, getfreename.

use clap::Subcommand;
use jdss_driver::config::BLOCK_SIZE_OPTIONS;
use jdss_driver::{JdssDriver, JdssError, Result};

/// Return the VM id when the name follows the proxmox
/// `(vm|base)-<digits>-` convention.
fn vmid_from_name(name: &str) -> Option<&str> {
    let rest = name
        .strip_prefix("vm-")
        .or_else(|| name.strip_prefix("base-"))?;
    let (digits, tail) = rest.split_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || tail.is_empty() {
        return None;
    }
    Some(digits)
}

#[derive(Debug, Subcommand)]
pub enum VolumesAction {
    /// Create a new volume
    Create {
        /// New volume name
        #[arg(short = 'n', long = "name")]
        volume_name: String,

        /// New volume size in format num + [K M G]
        #[arg(short = 's', long = "size")]
        volume_size: String,

        /// Block size of the new volume
        #[arg(short = 'b', long = "block-size", value_parser = BLOCK_SIZE_OPTIONS)]
        block_size: Option<String>,

        /// Use real volume name
        #[arg(short = 'd', long = "direct")]
        direct: bool,
    },
    /// Print the first unused volume name with the given prefix
    Getfreename {
        /// Prefix for the new volume
        #[arg(long)]
        prefix: String,
    },
    /// List volumes
    List {
        /// Show only volumes with a VM id, printed as `name vmid size`
        #[arg(long)]
        vmid: bool,
    },
}

pub async fn run(jdss: &JdssDriver, action: VolumesAction) -> Result<()> {
    match action {
        VolumesAction::Create {
            volume_name,
            volume_size,
            block_size,
            direct,
        } => {
            let block_size =
                block_size.unwrap_or_else(|| jdss.config().block_size());
            jdss.create_volume(
                &volume_name,
                &volume_size,
                None,
                Some(&block_size),
                direct,
            )
            .await
        }
        VolumesAction::Getfreename { prefix } => getfreename(jdss, &prefix).await,
        VolumesAction::List { vmid } => list(jdss, vmid).await,
    }
}

async fn getfreename(jdss: &JdssDriver, prefix: &str) -> Result<()> {
    let present: Vec<String> = jdss
        .list_volumes()
        .await?
        .into_iter()
        .map(|v| v.name)
        .filter(|n| n.starts_with(prefix))
        .collect();

    for i in 0..u64::MAX {
        let candidate = format!("{prefix}{i}");
        if !present.contains(&candidate) {
            println!("{candidate}");
            return Ok(());
        }
    }
    Err(JdssError::Config(format!(
        "unable to find a free volume name with prefix '{prefix}'"
    )))
}

async fn list(jdss: &JdssDriver, vmid: bool) -> Result<()> {
    for vol in jdss.list_volumes().await? {
        if vmid {
            if let Some(id) = vmid_from_name(&vol.name) {
                println!("{} {} {}", vol.name, id, vol.size);
            }
        } else {
            println!("{} {}", vol.name, vol.size);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::vmid_from_name;

    #[test]
    fn test_vmid_from_name() {
        assert_eq!(vmid_from_name("vm-101-disk-0"), Some("101"));
        assert_eq!(vmid_from_name("base-9-disk-1"), Some("9"));
        assert_eq!(vmid_from_name("vm-abc-disk-0"), None);
        assert_eq!(vmid_from_name("data-101-disk-0"), None);
        assert_eq!(vmid_from_name("vm-101"), None);
    }
}
