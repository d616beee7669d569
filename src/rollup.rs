use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{
    BranchGroupStat, Category, DeltaRecord, RosterEntry, Window, WindowCounts, GRAND_TOTAL,
    GROUP_ORDER, HEAD_OFFICE, NATIONWIDE, NO_GROUP,
};
use crate::ranking::RankedRow;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

pub fn ratio(numerator: f64, denominator: f64, decimals: i32) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(round_to(numerator / denominator, decimals))
    }
}

fn group_rank(group: &str) -> usize {
    GROUP_ORDER
        .iter()
        .position(|g| *g == group)
        .unwrap_or(GROUP_ORDER.len())
}

fn compare_groups(a: &BranchGroupStat, b: &BranchGroupStat) -> Ordering {
    group_rank(&a.group)
        .cmp(&group_rank(&b.group))
        .then_with(|| a.group.cmp(&b.group))
        .then_with(|| a.branch.cmp(&b.branch))
}

pub fn baseline_headcounts(roster: &[RosterEntry]) -> HashMap<String, u64> {
    let mut ids: HashMap<&str, HashSet<&str>> = HashMap::new();
    for entry in roster.iter().filter(|e| e.is_grouped()) {
        if let Some(branch) = entry.branch.as_deref() {
            ids.entry(branch).or_default().insert(entry.employee_id.as_str());
        }
    }
    ids.into_iter()
        .map(|(branch, ids)| (branch.to_string(), ids.len() as u64))
        .collect()
}

#[derive(Default)]
struct GroupAcc<'a> {
    ids: HashSet<&'a str>,
    active: Vec<[u64; 4]>,
    idle: Vec<u64>,
}

/// Per (group, branch) activity statistics with the nationwide total as the first row.
///
/// Category and idle counts exclude sentinel-group employees. Open-count buckets are
/// tallied over the whole table and then matched onto the grouped rows.
pub fn rollup_groups(
    deltas: &[DeltaRecord],
    baseline_roster: &[RosterEntry],
    windows: &[Window],
    bucket_window: Window,
) -> Vec<BranchGroupStat> {
    let baselines = baseline_headcounts(baseline_roster);

    let mut groups: BTreeMap<(&str, &str), GroupAcc<'_>> = BTreeMap::new();
    for record in deltas.iter().filter(|r| r.entry.is_grouped()) {
        let Some(branch) = record.entry.branch.as_deref() else {
            continue;
        };
        let acc = groups
            .entry((record.entry.group.as_str(), branch))
            .or_insert_with(|| GroupAcc {
                ids: HashSet::new(),
                active: vec![[0; 4]; windows.len()],
                idle: vec![0; windows.len()],
            });
        acc.ids.insert(record.entry.employee_id.as_str());
        for (slot, window) in windows.iter().enumerate() {
            for (idx, category) in Category::PRIMARY.iter().enumerate() {
                if record.value(*window, *category) > 0.0 {
                    acc.active[slot][idx] += 1;
                }
            }
            if !record.is_active(*window) {
                acc.idle[slot] += 1;
            }
        }
    }

    let mut buckets: HashMap<(&str, &str), [u64; 4]> = HashMap::new();
    for record in deltas {
        let Some(branch) = record.entry.branch.as_deref() else {
            continue;
        };
        let open = record.open_count(bucket_window);
        if (1..=4).contains(&open) {
            buckets
                .entry((record.entry.group.as_str(), branch))
                .or_insert([0; 4])[open - 1] += 1;
        }
    }

    let mut stats: Vec<BranchGroupStat> = groups
        .into_iter()
        .map(|((group, branch), acc)| BranchGroupStat {
            group: group.to_string(),
            branch: branch.to_string(),
            headcount: acc.ids.len() as u64,
            windows: windows
                .iter()
                .enumerate()
                .map(|(slot, window)| WindowCounts {
                    window: *window,
                    active: acc.active[slot],
                    idle: acc.idle[slot],
                })
                .collect(),
            buckets: buckets.get(&(group, branch)).copied().unwrap_or([0; 4]),
            baseline: baselines.get(branch).copied(),
        })
        .collect();
    stats.sort_by(compare_groups);

    let total = nationwide_total(&stats, windows);
    stats.insert(0, total);
    stats
}

/// Column-wise sum of `stats`. Missing baselines count as zero in the sum.
pub fn nationwide_total(stats: &[BranchGroupStat], windows: &[Window]) -> BranchGroupStat {
    let mut total = BranchGroupStat {
        group: NO_GROUP.to_string(),
        branch: NATIONWIDE.to_string(),
        headcount: 0,
        windows: windows
            .iter()
            .map(|window| WindowCounts {
                window: *window,
                active: [0; 4],
                idle: 0,
            })
            .collect(),
        buckets: [0; 4],
        baseline: Some(0),
    };

    for stat in stats {
        total.headcount += stat.headcount;
        for counts in total.windows.iter_mut() {
            if let Some(row) = stat.counts(counts.window) {
                for (sum, value) in counts.active.iter_mut().zip(row.active) {
                    *sum += value;
                }
                counts.idle += row.idle;
            }
        }
        for (sum, value) in total.buckets.iter_mut().zip(stat.buckets) {
            *sum += value;
        }
        total.baseline = total.baseline.map(|b| b + stat.baseline.unwrap_or(0));
    }
    total
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowRates {
    pub window: Window,
    pub open_rate: Option<f64>,
    pub category: [Option<f64>; 4],
    pub idle: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub group: String,
    pub branch: String,
    pub headcount: u64,
    pub headcount_change: Option<i64>,
    pub windows: Vec<WindowRates>,
    pub buckets: [Option<f64>; 4],
}

pub fn rate_rows(stats: &[BranchGroupStat]) -> Vec<RateRow> {
    stats
        .iter()
        .map(|stat| {
            let total = stat.headcount as f64;
            RateRow {
                group: stat.group.clone(),
                branch: stat.branch.clone(),
                headcount: stat.headcount,
                headcount_change: stat.headcount_change(),
                windows: stat
                    .windows
                    .iter()
                    .map(|counts| WindowRates {
                        window: counts.window,
                        open_rate: (stat.headcount > 0)
                            .then(|| round_to(1.0 - counts.idle as f64 / total, 4)),
                        category: counts.active.map(|n| ratio(n as f64, total, 4)),
                        idle: counts.idle,
                    })
                    .collect(),
                buckets: stat.buckets.map(|n| ratio(n as f64, total, 4)),
            }
        })
        .collect()
}

fn include_in_branch_rollup(entry: &RosterEntry) -> Option<&str> {
    entry
        .branch
        .as_deref()
        .filter(|branch| *branch != HEAD_OFFICE)
}

fn sort_by_per_capita<T>(rows: &mut [T], per_capita: impl Fn(&T) -> Option<f64>) {
    rows.sort_by(|a, b| match (per_capita(a), per_capita(b)) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomeBranchRow {
    pub branch: String,
    pub headcount: u64,
    pub top_count: u64,
    pub four_total: f64,
}

impl IncomeBranchRow {
    pub fn top_share(&self) -> Option<f64> {
        ratio(self.top_count as f64, self.headcount as f64, 4)
    }

    pub fn per_capita(&self) -> Option<f64> {
        ratio(self.four_total, self.headcount as f64, 2)
    }

    pub fn per_capita_10k(&self) -> Option<f64> {
        self.per_capita().map(|v| round_to(v / 10_000.0, 2))
    }
}

pub fn rollup_income(rows: &[RankedRow<'_>], window: Window, top_n: u32) -> Vec<IncomeBranchRow> {
    let mut branches: BTreeMap<&str, (HashSet<&str>, u64, f64)> = BTreeMap::new();
    for row in rows {
        let Some(branch) = include_in_branch_rollup(&row.record.entry) else {
            continue;
        };
        let acc = branches.entry(branch).or_default();
        acc.0.insert(row.record.entry.employee_id.as_str());
        if row.rank(Category::FourTotal).is_some_and(|rank| rank <= top_n) {
            acc.1 += 1;
        }
        acc.2 += row.record.value(window, Category::FourTotal);
    }

    let mut result: Vec<IncomeBranchRow> = branches
        .into_iter()
        .map(|(branch, (ids, top_count, four_total))| IncomeBranchRow {
            branch: branch.to_string(),
            headcount: ids.len() as u64,
            top_count,
            four_total,
        })
        .collect();

    let total = IncomeBranchRow {
        branch: GRAND_TOTAL.to_string(),
        headcount: result.iter().map(|r| r.headcount).sum(),
        top_count: result.iter().map(|r| r.top_count).sum(),
        four_total: result.iter().map(|r| r.four_total).sum(),
    };
    sort_by_per_capita(&mut result, IncomeBranchRow::per_capita);
    result.push(total);
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmountSummary {
    pub total: f64,
    pub by_category: [f64; 4],
}

impl AmountSummary {
    fn add(&mut self, record: &DeltaRecord, window: Window) {
        self.total += record.value(window, Category::FourTotal);
        for (sum, category) in self.by_category.iter_mut().zip(Category::PRIMARY) {
            *sum += record.value(window, category);
        }
    }

    fn merge(&mut self, other: &AmountSummary) {
        self.total += other.total;
        for (sum, value) in self.by_category.iter_mut().zip(other.by_category) {
            *sum += value;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomeSalesBranchRow {
    pub branch: String,
    pub headcount: u64,
    pub income: AmountSummary,
    pub sales: AmountSummary,
}

impl IncomeSalesBranchRow {
    pub fn per_capita(&self, amount: f64) -> Option<f64> {
        ratio(amount, self.headcount as f64, 2)
    }
}

pub fn rollup_income_sales(
    income: &[DeltaRecord],
    sales: &[DeltaRecord],
    window: Window,
) -> Vec<IncomeSalesBranchRow> {
    let sales_by_id: HashMap<&str, &DeltaRecord> = sales
        .iter()
        .map(|r| (r.entry.employee_id.as_str(), r))
        .collect();

    let mut branches: BTreeMap<&str, (HashSet<&str>, AmountSummary, AmountSummary)> =
        BTreeMap::new();
    for record in income {
        let Some(branch) = include_in_branch_rollup(&record.entry) else {
            continue;
        };
        let id = record.entry.employee_id.as_str();
        let acc = branches.entry(branch).or_default();
        acc.0.insert(id);
        acc.1.add(record, window);
        if let Some(sold) = sales_by_id.get(id) {
            acc.2.add(sold, window);
        }
    }

    let mut result: Vec<IncomeSalesBranchRow> = branches
        .into_iter()
        .map(|(branch, (ids, income, sales))| IncomeSalesBranchRow {
            branch: branch.to_string(),
            headcount: ids.len() as u64,
            income,
            sales,
        })
        .collect();

    let mut total = IncomeSalesBranchRow {
        branch: GRAND_TOTAL.to_string(),
        headcount: 0,
        income: AmountSummary::default(),
        sales: AmountSummary::default(),
    };
    for row in &result {
        total.headcount += row.headcount;
        total.income.merge(&row.income);
        total.sales.merge(&row.sales);
    }

    sort_by_per_capita(&mut result, |row| row.per_capita(row.income.total));
    result.push(total);
    result
}
