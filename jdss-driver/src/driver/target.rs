//! iSCSI target and LUN allocation.
//!
//! Volumes are packed onto targets named `<prefix><group>-<N>` with a
//! bounded number of LUNs per target. Allocation is deterministic: the
//! slot a volume gets depends only on the observed target/LUN state, so
//! racing invocations converge.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::{debug, warn};

use super::JdssDriver;
use super::split_provider_auth;
use crate::error::{JdssError, Result};
use crate::names;
use crate::rest::LunRecord;

/// Result of slot selection for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAssignment {
    pub target: String,
    pub lun: i64,
    /// The volume is already attached at `(target, lun)`.
    pub attached: bool,
    /// `target` does not exist yet and must be created.
    pub new_target: bool,
}

/// Everything a client needs to reach an exported volume.
#[derive(Debug, Clone)]
pub struct PublicationInfo {
    pub target: String,
    pub lun: i64,
    pub vips: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Canonical target-name base for a `(prefix, group)` pair.
fn target_base(prefix: &str, group: &str) -> String {
    if prefix.ends_with(':') {
        format!("{prefix}{group}")
    } else {
        format!("{prefix}:{group}")
    }
}

/// Pick `(target, lun)` for `vname` given the observed state of all targets
/// matching `<tbase>-<N>`, ordered by `N`.
fn select_target_slot(
    tbase: &str,
    targets: &[(i64, String, Vec<LunRecord>)],
    vname: &str,
    luns_per_target: usize,
) -> TargetAssignment {
    let mut candidate: Option<(String, i64)> = None;

    for (_, target, luns) in targets {
        if let Some(lun) = luns.iter().find(|l| l.name == vname) {
            return TargetAssignment {
                target: target.clone(),
                lun: lun.lun,
                attached: true,
                new_target: false,
            };
        }
        if candidate.is_none() && luns.len() < luns_per_target {
            let taken: Vec<i64> = luns.iter().map(|l| l.lun).collect();
            if let Some(free) = (0..luns_per_target as i64).find(|i| !taken.contains(i)) {
                candidate = Some((target.clone(), free));
            }
        }
    }

    if let Some((target, lun)) = candidate {
        return TargetAssignment {
            target,
            lun,
            attached: false,
            new_target: false,
        };
    }

    let used: Vec<i64> = targets.iter().map(|(n, _, _)| *n).collect();
    let suffix = (0..).find(|n| !used.contains(n)).unwrap_or(0);
    TargetAssignment {
        target: format!("{tbase}-{suffix}"),
        lun: 0,
        attached: false,
        new_target: true,
    }
}

impl JdssDriver {
    /// Ensure `volume_id` is exported through a target of the
    /// `(prefix, group)` family, creating or repairing the target as needed.
    pub async fn ensure_target_volume(
        &self,
        target_prefix: &str,
        group_name: &str,
        volume_id: &str,
        provider_auth: Option<&str>,
        direct: bool,
        luns_per_target: usize,
    ) -> Result<PublicationInfo> {
        let vname = self.physical_volume_name(volume_id, direct)?;
        debug!(
            prefix = target_prefix,
            group = group_name,
            volume = volume_id,
            luns_per_target,
            "ensure volume is exported"
        );

        if !self.api().is_lun(&vname).await? {
            return Err(JdssError::volume_not_found(volume_id));
        }

        let assignment = self
            .acquire_target_volume_lun(target_prefix, group_name, &vname, luns_per_target)
            .await?;

        if assignment.new_target {
            self.create_target_volume_lun(&assignment.target, &vname, assignment.lun, provider_auth)
                .await
        } else {
            self.ensure_target_volume_lun(&assignment.target, &vname, assignment.lun, provider_auth)
                .await
        }
    }

    /// Export a snapshot: clone it into a read-only snapshot-mount volume
    /// and put that volume on a target. Any downstream failure removes the
    /// mount clone again.
    pub async fn create_export_snapshot(
        &self,
        target_prefix: &str,
        group_name: &str,
        snapshot_id: &str,
        volume_id: &str,
        provider_auth: Option<&str>,
        luns_per_target: usize,
    ) -> Result<PublicationInfo> {
        let sname = names::sname(snapshot_id, None);
        let ovname = names::vname(volume_id)?;
        let scname = names::sname(snapshot_id, Some(volume_id));

        // readonly mount clone; an existing one means re-export
        self.clone_object(&scname, &sname, &ovname, true, false, true)
            .await?;

        let publish = async {
            let assignment = self
                .acquire_target_volume_lun(target_prefix, group_name, &scname, luns_per_target)
                .await?;
            if assignment.new_target {
                self.create_target_volume_lun(
                    &assignment.target,
                    &scname,
                    assignment.lun,
                    provider_auth,
                )
                .await
            } else {
                self.ensure_target_volume_lun(
                    &assignment.target,
                    &scname,
                    assignment.lun,
                    provider_auth,
                )
                .await
            }
        };

        match publish.await {
            Ok(info) => Ok(info),
            Err(err) => {
                if let Err(cleanup) = self.delete_volume_inner(scname.clone(), true, true).await {
                    warn!(clone = %scname, error = %cleanup, "cleanup of snapshot export failed");
                }
                Err(err)
            }
        }
    }

    /// Remove the export of a volume. Absent volumes and targets are fine.
    pub async fn remove_export(
        &self,
        target_prefix: &str,
        group_name: &str,
        volume_id: &str,
        direct: bool,
    ) -> Result<()> {
        let vname = self.physical_volume_name(volume_id, direct)?;
        debug!(volume = volume_id, "remove export");

        if !self.api().is_lun(&vname).await? {
            warn!(volume = volume_id, "abandon detaching, volume does not exist");
            return Ok(());
        }

        let assignment = self
            .acquire_target_volume_lun(target_prefix, group_name, &vname, DEFAULT_LUNS_PER_TARGET)
            .await?;
        if assignment.attached {
            if let Err(err) = self.detach_target_volume(&assignment.target, &vname).await {
                warn!(target = %assignment.target, error = %err, "detach failed");
            }
        }
        Ok(())
    }

    /// Remove the export of a snapshot and its mount clone.
    pub async fn remove_export_snapshot(
        &self,
        target_prefix: &str,
        group_name: &str,
        snapshot_id: &str,
        volume_id: &str,
        direct: bool,
    ) -> Result<()> {
        let scname = if direct {
            snapshot_id.to_string()
        } else {
            names::sname(snapshot_id, Some(volume_id))
        };
        debug!(volume = volume_id, snapshot = snapshot_id, "remove snapshot export");

        if !self.api().is_lun(&scname).await? {
            warn!(
                snapshot = snapshot_id,
                "abandon detaching, snapshot export does not exist"
            );
            return Ok(());
        }

        let assignment = self
            .acquire_target_volume_lun(target_prefix, group_name, &scname, DEFAULT_LUNS_PER_TARGET)
            .await?;
        if assignment.attached {
            if let Err(err) = self.detach_target_volume(&assignment.target, &scname).await {
                if let Err(cleanup) = self.delete_volume_inner(scname.clone(), true, false).await {
                    warn!(clone = %scname, error = %cleanup, "cleanup of snapshot export failed");
                }
                return Err(err);
            }
        }
        // target detachment already done above
        self.delete_volume_inner(scname, true, false).await
    }

    /// Target the volume is currently exported through, or `None`.
    pub async fn get_volume_target(
        &self,
        target_prefix: &str,
        group_name: &str,
        volume_id: &str,
        snapshot_id: Option<&str>,
        direct: bool,
    ) -> Result<Option<PublicationInfo>> {
        let vname = match snapshot_id {
            Some(sid) if !direct => names::sname(sid, Some(volume_id)),
            _ => self.physical_volume_name(volume_id, direct)?,
        };

        if !self.api().is_lun(&vname).await? {
            return Err(JdssError::volume_not_found(volume_id));
        }

        let assignment = self
            .acquire_target_volume_lun(target_prefix, group_name, &vname, DEFAULT_LUNS_PER_TARGET)
            .await?;
        if assignment.new_target || !assignment.attached {
            return Ok(None);
        }

        let vips = self.conforming_vips().await?;
        Ok(Some(PublicationInfo {
            target: assignment.target,
            lun: assignment.lun,
            vips: vips.into_values().collect(),
            username: None,
            password: None,
        }))
    }

    /// Names of all targets in the pool.
    pub async fn list_targets(&self) -> Result<Vec<String>> {
        let targets = self.api().get_targets().await?;
        Ok(targets.into_iter().map(|t| t.name).collect())
    }

    /// LUNs attached to one target.
    pub async fn list_target_luns(&self, target_name: &str) -> Result<Vec<LunRecord>> {
        self.api().get_target_luns(target_name).await
    }

    /// Determine the `(target, lun)` slot for a volume, observing the
    /// current state of every target in the `(prefix, group)` family.
    pub(crate) async fn acquire_target_volume_lun(
        &self,
        target_prefix: &str,
        group_name: &str,
        vname: &str,
        luns_per_target: usize,
    ) -> Result<TargetAssignment> {
        let tbase = target_base(target_prefix, group_name);
        let pattern = Regex::new(&format!(r"^{}-(?P<id>\d+)$", regex::escape(&tbase)))
            .map_err(|e| JdssError::Config(format!("bad target prefix: {e}")))?;

        let mut matching: Vec<(i64, String)> = Vec::new();
        for target in self.api().get_targets().await? {
            if let Some(caps) = pattern.captures(&target.name) {
                if let Ok(id) = caps["id"].parse::<i64>() {
                    debug!(target = %target.name, id, "related target");
                    matching.push((id, target.name));
                }
            }
        }
        matching.sort();

        let mut observed = Vec::with_capacity(matching.len());
        for (id, name) in matching {
            let luns = self.api().get_target_luns(&name).await?;
            observed.push((id, name, luns));
        }

        Ok(select_target_slot(&tbase, &observed, vname, luns_per_target))
    }

    /// Create a target and attach the volume at the given LUN. A failure
    /// after target creation removes the target again so no half-configured
    /// export survives.
    async fn create_target_volume_lun(
        &self,
        target_name: &str,
        vname: &str,
        lun: i64,
        provider_auth: Option<&str>,
    ) -> Result<PublicationInfo> {
        debug!(target = target_name, volume = vname, lun, "create target and attach");

        let vips = self.conforming_vips().await?;
        let vip_names: Vec<String> = vips.keys().cloned().collect();

        self.api()
            .create_target(target_name, &vip_names, provider_auth.is_some())
            .await?;

        if let Err(err) = self.api().attach_target_vol(target_name, vname, lun, None).await {
            if let Err(cleanup) = self.api().delete_target(target_name).await {
                warn!(target = target_name, error = %cleanup, "cleanup of failed target failed");
            }
            return Err(err);
        }

        let mut info = PublicationInfo {
            target: target_name.to_string(),
            lun,
            vips: vips.into_values().collect(),
            username: None,
            password: None,
        };

        if let Some(auth) = provider_auth {
            let (_, user, password) = split_provider_auth(auth)?;
            self.set_target_credentials(target_name, user, password).await?;
            info.username = Some(user.to_string());
            info.password = Some(password.to_string());
        }
        Ok(info)
    }

    /// Bring an existing target into the expected shape: VIP set, LUN
    /// attachment and CHAP credentials. A volume held captive by an
    /// unrelated target is detached once and the export recreated.
    async fn ensure_target_volume_lun(
        &self,
        target_name: &str,
        vname: &str,
        lun: i64,
        provider_auth: Option<&str>,
    ) -> Result<PublicationInfo> {
        debug!(target = target_name, volume = vname, lun, "ensure export");

        let target = match self.api().get_target(target_name).await {
            Ok(t) => Some(t),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };

        let Some(target) = target else {
            return match self
                .create_target_volume_lun(target_name, vname, lun, provider_auth)
                .await
            {
                Err(err) if err.is_busy() => {
                    // the volume is attached somewhere unrelated; free it
                    // and retry exactly once
                    debug!(volume = vname, "volume belongs to another target, detaching");
                    self.detach_volume(vname).await?;
                    self.create_target_volume_lun(target_name, vname, lun, provider_auth)
                        .await
                }
                other => other,
            };
        };

        let expected = self.conforming_vips().await?;
        let mut assigned: Vec<&str> = target.assigned_vips().iter().map(String::as_str).collect();
        let mut wanted: Vec<&str> = expected.keys().map(String::as_str).collect();
        assigned.sort_unstable();
        wanted.sort_unstable();
        if assigned != wanted {
            let vip_names: Vec<String> = expected.keys().cloned().collect();
            self.api()
                .set_target_assigned_vips(target_name, &vip_names)
                .await?;
        }

        if !self.api().is_target_lun(target_name, vname).await? {
            self.api().attach_target_vol(target_name, vname, lun, None).await?;
        }

        let mut info = PublicationInfo {
            target: target_name.to_string(),
            lun,
            vips: expected.into_values().collect(),
            username: None,
            password: None,
        };

        if let Some(auth) = provider_auth {
            let (_, user, password) = split_provider_auth(auth)?;
            info.username = Some(user.to_string());
            info.password = Some(password.to_string());

            if let Err(err) = self.reconcile_chap(target_name, user, password).await {
                // never leave a half-configured export behind
                if let Err(cleanup) = self.api().delete_target(target_name).await {
                    warn!(target = target_name, error = %cleanup, "target cleanup failed");
                }
                return Err(err);
            }
        }
        Ok(info)
    }

    /// Make the target's incoming-user set exactly `{user}`.
    async fn reconcile_chap(&self, target_name: &str, user: &str, password: &str) -> Result<()> {
        let users = self.api().get_target_users(target_name).await?;
        if users.len() == 1 && users[0].name == user {
            return Ok(());
        }
        for existing in &users {
            self.api().delete_target_user(target_name, &existing.name).await?;
        }
        self.api().create_target_user(target_name, user, password).await
    }

    /// Set CHAP credentials; on failure the target is removed so no export
    /// without its credentials survives.
    async fn set_target_credentials(
        &self,
        target_name: &str,
        user: &str,
        password: &str,
    ) -> Result<()> {
        if let Err(err) = self.api().create_target_user(target_name, user, password).await {
            if let Err(cleanup) = self.api().delete_target(target_name).await {
                warn!(target = target_name, error = %cleanup, "target cleanup failed");
            }
            return Err(err);
        }
        Ok(())
    }

    /// VIP names/addresses the configuration allows for iSCSI, intersected
    /// with the appliance's VIP table. Keyed by VIP name.
    pub(crate) async fn conforming_vips(&self) -> Result<BTreeMap<String, String>> {
        let allowed: Vec<String> = if self.config().iscsi_vip_addresses.is_empty() {
            self.config().san_hosts.clone()
        } else {
            self.config().iscsi_vip_addresses.clone()
        };

        let mut conforming = BTreeMap::new();
        for vip in self.api().get_pool_vips().await? {
            if allowed.contains(&vip.address) {
                conforming.insert(vip.name, vip.address);
            }
        }
        if conforming.is_empty() {
            return Err(JdssError::VipNotFound(allowed));
        }
        Ok(conforming)
    }

    /// Detach a volume from whatever target holds it; a target left without
    /// LUNs is removed.
    pub(crate) async fn detach_volume(&self, vname: &str) -> Result<()> {
        debug!(volume = vname, "detach volume");
        for target in self.api().get_targets().await? {
            let luns = self.api().get_target_luns(&target.name).await?;
            if luns.iter().any(|l| l.name == vname) {
                if luns.len() == 1 {
                    self.api().delete_target(&target.name).await?;
                } else {
                    self.api().detach_target_vol(&target.name, vname).await?;
                }
                return Ok(());
            }
        }
        Ok(())
    }

    /// Detach a volume from a known target, removing the target when it
    /// ends up empty. Absence at any step is fine.
    pub(crate) async fn detach_target_volume(&self, target_name: &str, vname: &str) -> Result<()> {
        debug!(target = target_name, volume = vname, "detach from target");
        match self.api().detach_target_vol(target_name, vname).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        let luns = match self.api().get_target_luns(target_name).await {
            Ok(luns) => luns,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        if luns.is_empty() {
            match self.api().delete_target(target_name).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

pub(crate) const DEFAULT_LUNS_PER_TARGET: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    fn lun(name: &str, id: i64) -> LunRecord {
        serde_json::from_value(serde_json::json!({"name": name, "lun": id})).unwrap()
    }

    const TBASE: &str = "iqn.2025-04.test:grp";

    #[test]
    fn test_target_base_colon_handling() {
        assert_eq!(target_base("iqn.test:", "grp"), "iqn.test:grp");
        assert_eq!(target_base("iqn.test", "grp"), "iqn.test:grp");
    }

    #[test]
    fn test_empty_state_creates_first_target() {
        let a = select_target_slot(TBASE, &[], "v_a", 8);
        assert_eq!(
            a,
            TargetAssignment {
                target: format!("{TBASE}-0"),
                lun: 0,
                attached: false,
                new_target: true,
            }
        );
    }

    #[test]
    fn test_attached_volume_short_circuits() {
        let state = vec![(
            0,
            format!("{TBASE}-0"),
            vec![lun("v_other", 0), lun("v_me", 3)],
        )];
        let a = select_target_slot(TBASE, &state, "v_me", 8);
        assert!(a.attached);
        assert!(!a.new_target);
        assert_eq!(a.lun, 3);
        assert_eq!(a.target, format!("{TBASE}-0"));
    }

    #[test]
    fn test_first_free_slot_on_first_non_full_target() {
        let state = vec![(
            0,
            format!("{TBASE}-0"),
            vec![lun("v_a", 0), lun("v_b", 2)],
        )];
        let a = select_target_slot(TBASE, &state, "v_new", 8);
        assert_eq!(a.lun, 1);
        assert!(!a.attached);
        assert!(!a.new_target);
    }

    #[test]
    fn test_full_target_spills_to_next_suffix() {
        let luns: Vec<LunRecord> = (0..8).map(|i| lun(&format!("v_{i}"), i)).collect();
        let state = vec![(0, format!("{TBASE}-0"), luns)];
        let a = select_target_slot(TBASE, &state, "v_new", 8);
        assert_eq!(a.target, format!("{TBASE}-1"));
        assert_eq!(a.lun, 0);
        assert!(a.new_target);
    }

    #[test]
    fn test_smallest_unused_suffix_fills_gaps() {
        let full: Vec<LunRecord> = (0..2).map(|i| lun(&format!("v_{i}"), i)).collect();
        let state = vec![
            (0, format!("{TBASE}-0"), full.clone()),
            (2, format!("{TBASE}-2"), full),
        ];
        let a = select_target_slot(TBASE, &state, "v_new", 2);
        assert_eq!(a.target, format!("{TBASE}-1"));
        assert!(a.new_target);
    }

    #[test]
    fn test_sequential_acquires_get_distinct_slots() {
        // two new volumes, second observes the state after the first attach
        let state1 = vec![(0, format!("{TBASE}-0"), vec![lun("v_x", 0)])];
        let a1 = select_target_slot(TBASE, &state1, "v_1", 8);
        assert_eq!(a1.target, format!("{TBASE}-0"));
        assert_eq!(a1.lun, 1);

        let state2 = vec![(
            0,
            format!("{TBASE}-0"),
            vec![lun("v_x", 0), lun("v_1", a1.lun)],
        )];
        let a2 = select_target_slot(TBASE, &state2, "v_2", 8);
        assert_ne!((a1.target.clone(), a1.lun), (a2.target.clone(), a2.lun));
        assert_eq!(a2.lun, 2);
    }

    #[test]
    fn test_luns_per_target_one_packs_one_per_target() {
        let state = vec![(0, format!("{TBASE}-0"), vec![lun("v_a", 0)])];
        let a = select_target_slot(TBASE, &state, "v_b", 1);
        assert_eq!(a.target, format!("{TBASE}-1"));
        assert!(a.new_target);
    }
}
