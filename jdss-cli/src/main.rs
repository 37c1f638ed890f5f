//! `jdssc`, the command line client for Open-E JovianDSS appliances.
//!
//! Grammar: `jdssc [global-opts] pool <pool_name> <subject> [<name>] <action>`.
//! Stdout carries machine-readable values for the hypervisor integration;
//! diagnostics go to stderr. The exit code is taken from the error taxonomy.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use jdss_driver::{JdssConfig, JdssDriver, JdssError};

use commands::nas::{NasVolumeAction, NasVolumesAction};
use commands::shares::{CifsAction, ShareAction, SharesAction};
use commands::targets::TargetsAction;
use commands::volume::VolumeAction;
use commands::volumes::VolumesAction;

#[derive(Parser, Debug)]
#[command(name = "jdssc")]
#[command(about = "Open-E JovianDSS storage appliance client")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level for stderr diagnostics (error, warn, info, debug, trace)
    #[arg(short = 'l', long, default_value = "warn")]
    loglevel: String,

    /// Appliance addresses, comma separated (overrides san_hosts)
    #[arg(long, value_delimiter = ',')]
    hosts: Vec<String>,

    /// REST port (overrides san_api_port)
    #[arg(long)]
    port: Option<u16>,

    /// REST user (overrides san_login)
    #[arg(long)]
    user: Option<String>,

    /// REST password (overrides san_password)
    #[arg(long)]
    password: Option<String>,

    /// REST protocol, http or https (overrides jovian_rest_protocol)
    #[arg(long)]
    protocol: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Operate on a pool
    Pool {
        /// Pool name
        pool_name: String,

        #[command(subcommand)]
        subject: Subject,
    },
}

#[derive(Debug, Subcommand)]
enum Subject {
    /// Print pool capacity as `<total_gb> <free_gb> <used_gb>`
    Get,
    /// Print configured appliance addresses
    Ip,
    /// Volume collection commands
    Volumes {
        #[command(subcommand)]
        action: VolumesAction,
    },
    /// Commands for a single volume
    Volume {
        /// Volume name
        volume_name: String,

        #[command(subcommand)]
        action: VolumeAction,
    },
    /// iSCSI target commands
    Targets {
        #[command(subcommand)]
        action: TargetsAction,
    },
    /// NAS volume collection commands
    #[command(name = "nas_volumes")]
    NasVolumes {
        #[command(subcommand)]
        action: NasVolumesAction,
    },
    /// Commands for a single NAS volume
    #[command(name = "nas_volume")]
    NasVolume {
        /// NAS volume name
        nas_volume_name: String,

        #[command(subcommand)]
        action: NasVolumeAction,
    },
    /// Share collection commands
    Shares {
        #[command(subcommand)]
        action: SharesAction,
    },
    /// Commands for a single share
    Share {
        /// Share name
        share_name: String,

        #[command(subcommand)]
        action: ShareAction,
    },
    /// CIFS share management
    Cifs {
        /// CIFS share name
        cifs_share_name: String,

        #[command(subcommand)]
        action: CifsAction,
    },
}

async fn run(cli: Cli) -> Result<(), JdssError> {
    let Cli {
        config,
        loglevel: _,
        hosts,
        port,
        user,
        password,
        protocol,
        command,
    } = cli;
    let Command::Pool { pool_name, subject } = command;

    let mut cfg = match config {
        Some(path) => {
            let doc = std::fs::read_to_string(&path).map_err(|e| {
                JdssError::Config(format!("cannot read config {}: {e}", path.display()))
            })?;
            JdssConfig::from_toml(&doc)?
        }
        None => JdssConfig::default(),
    };
    if !hosts.is_empty() {
        cfg.san_hosts = hosts;
    }
    if let Some(port) = port {
        cfg.san_api_port = port;
    }
    if let Some(user) = user {
        cfg.san_login = user;
    }
    if let Some(password) = password {
        cfg.san_password = password;
    }
    if let Some(protocol) = protocol {
        cfg.jovian_rest_protocol = protocol;
    }
    cfg.jovian_pool = pool_name;

    // `volume delete --target-prefix` overrides the configured default
    if let Subject::Volume {
        action: VolumeAction::Delete {
            target_prefix: Some(prefix),
            ..
        },
        ..
    } = &subject
    {
        cfg.target_prefix = prefix.clone();
    }

    let jdss = JdssDriver::new(cfg)?;

    match subject {
        Subject::Get => commands::pool::get(&jdss).await,
        Subject::Ip => commands::pool::ip(&jdss).await,
        Subject::Volumes { action } => commands::volumes::run(&jdss, action).await,
        Subject::Volume {
            volume_name,
            action,
        } => commands::volume::run(&jdss, &volume_name, action).await,
        Subject::Targets { action } => commands::targets::run(&jdss, action).await,
        Subject::NasVolumes { action } => commands::nas::run_nas_volumes(&jdss, action).await,
        Subject::NasVolume {
            nas_volume_name,
            action,
        } => commands::nas::run_nas_volume(&jdss, &nas_volume_name, action).await,
        Subject::Shares { action } => commands::shares::run_shares(&jdss, action).await,
        Subject::Share { share_name, action } => {
            commands::shares::run_share(&jdss, &share_name, action).await
        }
        Subject::Cifs {
            cifs_share_name,
            action,
        } => commands::shares::run_cifs(&jdss, &cifs_share_name, action).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.loglevel.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code().clamp(0, 255) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::volume::SnapshotAction;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments must parse")
    }

    #[test]
    fn test_volumes_create_grammar() {
        let cli = parse(&[
            "jdssc", "pool", "Pool-0", "volumes", "create", "-n", "vmdata", "-s", "10G", "-b",
            "16K",
        ]);
        let Command::Pool { pool_name, subject } = cli.command;
        assert_eq!(pool_name, "Pool-0");
        let Subject::Volumes {
            action:
                VolumesAction::Create {
                    volume_name,
                    volume_size,
                    block_size,
                    direct,
                },
        } = subject
        else {
            panic!("expected volumes create");
        };
        assert_eq!(volume_name, "vmdata");
        assert_eq!(volume_size, "10G");
        assert_eq!(block_size.as_deref(), Some("16K"));
        assert!(!direct);
    }

    #[test]
    fn test_volumes_create_rejects_bad_block_size() {
        assert!(
            Cli::try_parse_from([
                "jdssc", "pool", "Pool-0", "volumes", "create", "-n", "v", "-s", "1G", "-b", "3K",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_volume_clone_from_snapshot() {
        let cli = parse(&[
            "jdssc",
            "pool",
            "Pool-0",
            "volume",
            "base",
            "clone",
            "-n",
            "child",
            "--snapshot",
            "snap-1",
            "--size",
            "20G",
        ]);
        let Command::Pool { subject, .. } = cli.command;
        let Subject::Volume {
            volume_name,
            action:
                VolumeAction::Clone {
                    clone_name,
                    snapshot_name,
                    clone_size,
                },
        } = subject
        else {
            panic!("expected volume clone");
        };
        assert_eq!(volume_name, "base");
        assert_eq!(clone_name, "child");
        assert_eq!(snapshot_name.as_deref(), Some("snap-1"));
        assert_eq!(clone_size.as_deref(), Some("20G"));
    }

    #[test]
    fn test_volume_snapshot_rollback() {
        let cli = parse(&[
            "jdssc", "pool", "Pool-0", "volume", "vol", "snapshot", "s1", "rollback",
        ]);
        let Command::Pool { subject, .. } = cli.command;
        let Subject::Volume {
            action:
                VolumeAction::Snapshot {
                    snapshot_name,
                    action: SnapshotAction::Rollback {
                        check,
                        force_snapshots,
                    },
                },
            ..
        } = subject
        else {
            panic!("expected snapshot rollback");
        };
        assert_eq!(snapshot_name, "s1");
        assert!(!check);
        assert!(!force_snapshots);
    }

    #[test]
    fn test_targets_create_grammar() {
        let cli = parse(&[
            "jdssc",
            "pool",
            "Pool-0",
            "targets",
            "create",
            "-v",
            "vmdata",
            "--target-prefix",
            "iqn.2025-04.test:",
            "--target-group-name",
            "grp",
            "--luns-per-target",
            "4",
        ]);
        let Command::Pool { subject, .. } = cli.command;
        let Subject::Targets {
            action:
                TargetsAction::Create {
                    volume_name,
                    target_prefix,
                    target_group_name,
                    luns_per_target,
                    snapshot_name,
                    ..
                },
        } = subject
        else {
            panic!("expected targets create");
        };
        assert_eq!(volume_name, "vmdata");
        assert_eq!(target_prefix, "iqn.2025-04.test:");
        assert_eq!(target_group_name, "grp");
        assert_eq!(luns_per_target, 4);
        assert!(snapshot_name.is_none());
    }

    #[test]
    fn test_nas_volume_subject_keeps_underscore_name() {
        let cli = parse(&[
            "jdssc",
            "pool",
            "Pool-0",
            "nas_volume",
            "data",
            "snapshots",
            "create",
            "snap-1",
            "--ignoreexists",
        ]);
        let Command::Pool { subject, .. } = cli.command;
        assert!(matches!(subject, Subject::NasVolume { .. }));
    }

    #[test]
    fn test_pool_get_and_global_overrides() {
        let cli = parse(&[
            "jdssc",
            "--hosts",
            "10.0.0.1,10.0.0.2",
            "--port",
            "11582",
            "pool",
            "Pool-2",
            "get",
        ]);
        assert_eq!(cli.hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(cli.port, Some(11582));
        let Command::Pool { pool_name, subject } = cli.command;
        assert_eq!(pool_name, "Pool-2");
        assert!(matches!(subject, Subject::Get));
    }

    #[test]
    fn test_share_resize_add() {
        let cli = parse(&[
            "jdssc", "pool", "Pool-0", "share", "media", "resize", "5G", "--add",
        ]);
        let Command::Pool { subject, .. } = cli.command;
        let Subject::Share {
            share_name,
            action: ShareAction::Resize { new_size, add, .. },
        } = subject
        else {
            panic!("expected share resize");
        };
        assert_eq!(share_name, "media");
        assert_eq!(new_size, "5G");
        assert!(add);
    }
}
