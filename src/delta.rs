//! | class | day delta                          | week delta                         |
//! |-------|------------------------------------|------------------------------------|
//! | 0     | today − workday                    | today − wednesday                  |
//! | 1     | today − workday                    | today − wednesday + month end      |
//! | 2     | today − workday + month end        | today − wednesday + month end      |

use std::collections::HashMap;

use log::debug;

use crate::calendar::CrossMonthClass;
use crate::error::{ReportError, Result};
use crate::models::{DeltaRecord, EmployeeRecord, SnapshotLabel, SnapshotSet, Volumes, Window};

type Lookup<'a> = HashMap<&'a str, Volumes>;

fn require(set: &SnapshotSet, label: SnapshotLabel, class: CrossMonthClass) -> Result<&[EmployeeRecord]> {
    set.get(label).ok_or_else(|| {
        ReportError::Precondition(format!(
            "snapshot '{}' is required for cross-month class {} but was not supplied",
            label.key(),
            class.as_u8()
        ))
    })
}

fn lookup(records: &[EmployeeRecord]) -> Lookup<'_> {
    records
        .iter()
        .map(|r| (r.entry.employee_id.as_str(), r.volumes))
        .collect()
}

struct WindowPlan<'a> {
    window: Window,
    baseline: Option<Lookup<'a>>,
    month_end: Option<Lookup<'a>>,
}

impl WindowPlan<'_> {
    fn delta(&self, employee_id: &str, today: Volumes) -> Volumes {
        let value = |table: &Option<Lookup<'_>>| {
            table
                .as_ref()
                .and_then(|t| t.get(employee_id).copied())
                .unwrap_or_default()
        };

        let mut delta = today;
        if self.baseline.is_some() {
            delta = delta - value(&self.baseline);
        }
        if self.month_end.is_some() {
            delta = delta + value(&self.month_end);
        }
        delta
    }
}

fn plan<'a>(set: &'a SnapshotSet, class: CrossMonthClass, window: Window) -> Result<WindowPlan<'a>> {
    let baseline = match window {
        Window::Day => Some(lookup(require(set, SnapshotLabel::PreviousWorkday, class)?)),
        Window::Week => Some(lookup(require(set, SnapshotLabel::PreviousWednesday, class)?)),
        Window::Month => None,
    };
    let month_end = if class.needs_month_end(window) {
        Some(lookup(require(set, SnapshotLabel::PreviousMonthEnd, class)?))
    } else {
        None
    };
    Ok(WindowPlan {
        window,
        baseline,
        month_end,
    })
}

/// Computes the requested window deltas for every employee of today's snapshot.
/// Employees missing from a comparison snapshot count as 0 there.
pub fn compute_deltas(
    set: &SnapshotSet,
    class: CrossMonthClass,
    windows: &[Window],
) -> Result<Vec<DeltaRecord>> {
    let today = require(set, SnapshotLabel::Today, class)?;
    let plans = windows
        .iter()
        .map(|window| plan(set, class, *window))
        .collect::<Result<Vec<_>>>()?;

    let records: Vec<DeltaRecord> = today
        .iter()
        .map(|record| DeltaRecord {
            entry: record.entry.clone(),
            windows: plans
                .iter()
                .map(|p| (p.window, p.delta(&record.entry.employee_id, record.volumes)))
                .collect(),
        })
        .collect();

    debug!(
        "Computed {:?} deltas for {} employees (cross-month class {})",
        windows,
        records.len(),
        class.as_u8()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, RosterEntry};

    fn entry(id: &str) -> RosterEntry {
        RosterEntry {
            ordinal: None,
            employee_id: id.to_string(),
            name: format!("员工{id}"),
            parent_branch: "某某银行A分行".to_string(),
            branch: Some("A".to_string()),
            group: "第一组".to_string(),
        }
    }

    fn record(id: &str, wealth: f64, fund: f64) -> EmployeeRecord {
        let mut volumes = Volumes::default();
        volumes.set(Category::WealthManagement, wealth);
        volumes.set(Category::Fund, fund);
        EmployeeRecord {
            entry: entry(id),
            volumes: volumes.with_composites(),
        }
    }

    fn set(pairs: Vec<(SnapshotLabel, Vec<EmployeeRecord>)>) -> SnapshotSet {
        let mut set = SnapshotSet::new();
        for (label, records) in pairs {
            set.insert(label, records);
        }
        set
    }

    #[test]
    fn same_month_deltas_subtract_baselines() {
        let snapshots = set(vec![
            (SnapshotLabel::Today, vec![record("1", 100.0, 10.0), record("2", 0.0, 0.0)]),
            (SnapshotLabel::PreviousWorkday, vec![record("1", 80.0, 10.0), record("2", 0.0, 0.0)]),
            (SnapshotLabel::PreviousWednesday, vec![record("1", 50.0, 4.0)]),
        ]);

        let deltas = compute_deltas(
            &snapshots,
            CrossMonthClass::SameMonth,
            &[Window::Day, Window::Week],
        )
        .unwrap();

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].value(Window::Day, Category::WealthAsset), 20.0);
        assert_eq!(deltas[0].value(Window::Day, Category::Fund), 0.0);
        assert_eq!(deltas[0].value(Window::Week, Category::WealthAsset), 50.0);
        assert_eq!(deltas[0].value(Window::Week, Category::Fund), 6.0);
        assert_eq!(deltas[0].open_count(Window::Day), 1);
        assert_eq!(deltas[0].open_count(Window::Week), 2);
        assert!(!deltas[1].is_active(Window::Day));
        assert!(!deltas[1].is_active(Window::Week));
    }

    #[test]
    fn week_crossing_adds_month_end_to_week_only() {
        let snapshots = set(vec![
            (SnapshotLabel::Today, vec![record("1", 30.0, 0.0)]),
            (SnapshotLabel::PreviousWorkday, vec![record("1", 10.0, 0.0)]),
            (SnapshotLabel::PreviousWednesday, vec![record("1", 400.0, 0.0)]),
            (SnapshotLabel::PreviousMonthEnd, vec![record("1", 500.0, 0.0)]),
        ]);

        let deltas = compute_deltas(
            &snapshots,
            CrossMonthClass::WeekCrosses,
            &[Window::Day, Window::Week],
        )
        .unwrap();

        assert_eq!(deltas[0].value(Window::Day, Category::WealthManagement), 20.0);
        assert_eq!(deltas[0].value(Window::Week, Category::WealthManagement), 130.0);
    }

    #[test]
    fn day_crossing_with_no_activity_yields_zero() {
        // today's counter reset and nothing sold: the prior month closed at the
        // value the previous workday snapshot carried
        let snapshots = set(vec![
            (SnapshotLabel::Today, vec![record("1", 0.0, 0.0), record("2", 0.0, 0.0)]),
            (SnapshotLabel::PreviousWorkday, vec![record("1", 700.0, 30.0), record("2", 5.0, 0.0)]),
            (SnapshotLabel::PreviousWednesday, vec![record("1", 700.0, 30.0), record("2", 5.0, 0.0)]),
            (SnapshotLabel::PreviousMonthEnd, vec![record("1", 700.0, 30.0), record("2", 5.0, 0.0)]),
        ]);

        let deltas = compute_deltas(
            &snapshots,
            CrossMonthClass::DayCrosses,
            &[Window::Day, Window::Week],
        )
        .unwrap();

        for delta in &deltas {
            for category in Category::RANKED {
                assert_eq!(delta.value(Window::Day, category), 0.0);
                assert_eq!(delta.value(Window::Week, category), 0.0);
            }
            assert_eq!(delta.open_count(Window::Day), 0);
        }
    }

    #[test]
    fn month_window_uses_month_to_date_counter() {
        let snapshots = set(vec![(SnapshotLabel::Today, vec![record("1", 12.0, 0.0)])]);
        let deltas =
            compute_deltas(&snapshots, CrossMonthClass::DayCrosses, &[Window::Month]).unwrap();
        assert_eq!(deltas[0].value(Window::Month, Category::WealthAsset), 12.0);
        assert!(deltas[0].in_bucket(Window::Month, 1));
    }

    #[test]
    fn missing_comparison_snapshot_is_a_precondition_error() {
        let snapshots = set(vec![
            (SnapshotLabel::Today, vec![record("1", 1.0, 0.0)]),
            (SnapshotLabel::PreviousWednesday, vec![record("1", 1.0, 0.0)]),
        ]);

        let err = compute_deltas(&snapshots, CrossMonthClass::WeekCrosses, &[Window::Week])
            .unwrap_err();
        assert!(matches!(err, ReportError::Precondition(_)));
        assert!(err.to_string().contains("previous-month-end"));
    }
}
