use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::loader::{MappingRow, RawRosterRow, RawVolumeRow};
use crate::models::{EmployeeRecord, RosterEntry, SnapshotLabel, SnapshotSet, Volumes, NO_GROUP};

#[derive(Debug, Clone, PartialEq)]
pub struct BranchLabel {
    pub branch: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BranchMapping {
    labels: HashMap<String, BranchLabel>,
}

impl BranchMapping {
    pub fn from_rows(rows: Vec<MappingRow>) -> Self {
        let mut labels = HashMap::new();
        for row in rows {
            if labels.contains_key(&row.parent_branch) {
                warn!("Duplicate mapping row for {}, keeping the first", row.parent_branch);
                continue;
            }
            labels.insert(
                row.parent_branch,
                BranchLabel {
                    branch: row.branch,
                    group: row.group,
                },
            );
        }
        BranchMapping { labels }
    }

    pub fn resolve(&self, parent_branch: &str) -> Option<&BranchLabel> {
        self.labels.get(parent_branch)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Left-joins the roster onto the mapping. Every roster row yields exactly one entry;
/// rows without a mapped group fall into the sentinel group.
pub fn reconcile_roster(raw: &[RawRosterRow], mapping: &BranchMapping) -> Vec<RosterEntry> {
    let mut unmapped = 0usize;
    let entries: Vec<RosterEntry> = raw
        .iter()
        .map(|row| {
            let label = mapping.resolve(&row.parent_branch);
            let group = label.and_then(|l| l.group.clone());
            if group.is_none() {
                unmapped += 1;
            }
            RosterEntry {
                ordinal: row.ordinal,
                employee_id: row.employee_id.clone(),
                name: row.name.clone(),
                parent_branch: row.parent_branch.clone(),
                branch: label.and_then(|l| l.branch.clone()),
                group: group.unwrap_or_else(|| NO_GROUP.to_string()),
            }
        })
        .collect();

    if unmapped > 0 {
        warn!("{unmapped} roster entries have no group mapping and were assigned {NO_GROUP}");
    }
    entries
}

/// Left-joins the reconciled roster onto a volume snapshot by employee id.
/// Employees absent from the snapshot get all-zero volumes.
pub fn attach_volumes(roster: &[RosterEntry], rows: &[RawVolumeRow]) -> Vec<EmployeeRecord> {
    let mut by_id: HashMap<&str, &RawVolumeRow> = HashMap::with_capacity(rows.len());
    for row in rows {
        if by_id.contains_key(row.employee_id.as_str()) {
            warn!(
                "Employee {} appears more than once in a snapshot, keeping the first row",
                row.employee_id
            );
            continue;
        }
        by_id.insert(row.employee_id.as_str(), row);
    }

    let mut missing = 0usize;
    let records: Vec<EmployeeRecord> = roster
        .iter()
        .map(|entry| {
            let volumes = match by_id.get(entry.employee_id.as_str()) {
                Some(row) => row.volumes(),
                None => {
                    missing += 1;
                    Volumes::default()
                }
            };
            EmployeeRecord {
                entry: entry.clone(),
                volumes: volumes.with_composites(),
            }
        })
        .collect();

    debug!(
        "Joined {} roster entries onto {} snapshot rows ({} zero-filled)",
        roster.len(),
        rows.len(),
        missing
    );
    records
}

pub fn build_snapshot_set(
    roster: &[RosterEntry],
    raw: &BTreeMap<SnapshotLabel, Vec<RawVolumeRow>>,
) -> SnapshotSet {
    let mut set = SnapshotSet::new();
    for (label, rows) in raw {
        set.insert(*label, attach_volumes(roster, rows));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn roster_row(id: &str, parent: &str) -> RawRosterRow {
        RawRosterRow {
            ordinal: Some(1),
            employee_id: id.to_string(),
            name: format!("员工{id}"),
            parent_branch: parent.to_string(),
        }
    }

    fn mapping() -> BranchMapping {
        BranchMapping::from_rows(vec![
            MappingRow {
                parent_branch: "某某银行北京分行".to_string(),
                branch: Some("北京".to_string()),
                group: Some("第一组".to_string()),
            },
            MappingRow {
                parent_branch: "某某银行北京分行".to_string(),
                branch: Some("北京重复".to_string()),
                group: Some("第二组".to_string()),
            },
            MappingRow {
                parent_branch: "某某银行总行".to_string(),
                branch: Some("总行".to_string()),
                group: None,
            },
        ])
    }

    #[test]
    fn unmapped_rows_get_sentinel_group() {
        let raw = vec![
            roster_row("1001", "某某银行北京分行"),
            roster_row("1002", "未知分行"),
            roster_row("1003", "某某银行总行"),
        ];
        let entries = reconcile_roster(&raw, &mapping());

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].branch.as_deref(), Some("北京"));
        assert_eq!(entries[0].group, "第一组");
        assert_eq!(entries[1].branch, None);
        assert_eq!(entries[1].group, NO_GROUP);
        assert_eq!(entries[2].branch.as_deref(), Some("总行"));
        assert_eq!(entries[2].group, NO_GROUP);
    }

    #[test]
    fn join_keeps_every_roster_row_and_zero_fills() {
        let entries = reconcile_roster(
            &[
                roster_row("1001", "某某银行北京分行"),
                roster_row("1002", "某某银行北京分行"),
                roster_row("1003", "未知分行"),
            ],
            &mapping(),
        );
        let rows = vec![
            RawVolumeRow {
                employee_id: "1001".to_string(),
                wealth_management: 100.0,
                asset_management_plan: 20.0,
                physical_metal: 1.0,
                accumulated_gold: 2.0,
                ..Default::default()
            },
            RawVolumeRow {
                employee_id: "1001".to_string(),
                wealth_management: 999.0,
                ..Default::default()
            },
            RawVolumeRow {
                employee_id: "9999".to_string(),
                fund: 5.0,
                ..Default::default()
            },
        ];

        let records = attach_volumes(&entries, &rows);
        assert_eq!(records.len(), entries.len());
        assert_eq!(records[0].volumes.get(Category::WealthAsset), 120.0);
        assert_eq!(records[0].volumes.get(Category::PreciousMetal), 3.0);
        assert_eq!(records[1].volumes, Volumes::default());
        assert_eq!(records[2].volumes.get(Category::Fund), 0.0);
        assert!(records
            .iter()
            .zip(&entries)
            .all(|(record, entry)| record.entry == *entry));
    }

    #[test]
    fn snapshot_set_covers_every_label() {
        let entries = reconcile_roster(&[roster_row("1001", "某某银行北京分行")], &mapping());
        let mut raw = BTreeMap::new();
        raw.insert(SnapshotLabel::Today, Vec::new());
        raw.insert(SnapshotLabel::PreviousWorkday, Vec::new());

        let set = build_snapshot_set(&entries, &raw);
        assert_eq!(set.get(SnapshotLabel::Today).map(|r| r.len()), Some(1));
        assert_eq!(set.get(SnapshotLabel::PreviousWorkday).map(|r| r.len()), Some(1));
        assert!(set.get(SnapshotLabel::PreviousMonthEnd).is_none());
    }
}
