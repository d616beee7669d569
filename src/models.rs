use std::collections::BTreeMap;
use std::ops::{Add, Sub};

pub const NO_GROUP: &str = "无组别";
pub const NATIONWIDE: &str = "全国";
pub const GRAND_TOTAL: &str = "总计";
pub const HEAD_OFFICE: &str = "总行";
/// Display order of group labels; unknown labels sort after these.
pub const GROUP_ORDER: [&str; 5] = [NO_GROUP, "第一组", "第二组", "第三组", "第四组"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    WealthManagement,
    AssetManagementPlan,
    Insurance,
    Fund,
    PhysicalMetal,
    AccumulatedGold,
    FileTotal,
    WealthAsset,
    PreciousMetal,
    FourTotal,
}

impl Category {
    pub const COUNT: usize = 10;

    pub const PRIMARY: [Category; 4] = [
        Category::WealthAsset,
        Category::Insurance,
        Category::Fund,
        Category::PreciousMetal,
    ];

    pub const RANKED: [Category; 9] = [
        Category::FourTotal,
        Category::WealthAsset,
        Category::WealthManagement,
        Category::Insurance,
        Category::Fund,
        Category::AssetManagementPlan,
        Category::PreciousMetal,
        Category::PhysicalMetal,
        Category::AccumulatedGold,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::WealthManagement => "理财",
            Category::AssetManagementPlan => "资产管理计划",
            Category::Insurance => "保险",
            Category::Fund => "基金",
            Category::PhysicalMetal => "实物贵金属",
            Category::AccumulatedGold => "黄金积存",
            Category::FileTotal => "合计",
            Category::WealthAsset => "理财/资管",
            Category::PreciousMetal => "贵金属",
            Category::FourTotal => "4类业务合计",
        }
    }

    /// Summands of a derived category; empty for categories read from file.
    pub fn components(self) -> &'static [Category] {
        match self {
            Category::WealthAsset => &[Category::WealthManagement, Category::AssetManagementPlan],
            Category::PreciousMetal => &[Category::PhysicalMetal, Category::AccumulatedGold],
            Category::FourTotal => &Category::PRIMARY,
            _ => &[],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Volumes([f64; Category::COUNT]);

impl Volumes {
    pub fn get(&self, category: Category) -> f64 {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: Category, value: f64) {
        self.0[category.index()] = value;
    }

    /// Recomputes derived categories from their summands. `FourTotal` depends on
    /// the other composites, so the order of evaluation matters.
    pub fn with_composites(mut self) -> Self {
        for category in [
            Category::WealthAsset,
            Category::PreciousMetal,
            Category::FourTotal,
        ] {
            let sum = category.components().iter().map(|c| self.get(*c)).sum();
            self.set(category, sum);
        }
        self
    }
}

impl Add for Volumes {
    type Output = Volumes;

    fn add(mut self, rhs: Volumes) -> Volumes {
        for (lhs, rhs) in self.0.iter_mut().zip(rhs.0) {
            *lhs += rhs;
        }
        self
    }
}

impl Sub for Volumes {
    type Output = Volumes;

    fn sub(mut self, rhs: Volumes) -> Volumes {
        for (lhs, rhs) in self.0.iter_mut().zip(rhs.0) {
            *lhs -= rhs;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub ordinal: Option<i64>,
    pub employee_id: String,
    pub name: String,
    pub parent_branch: String,
    pub branch: Option<String>,
    pub group: String,
}

impl RosterEntry {
    pub fn is_grouped(&self) -> bool {
        self.group != NO_GROUP
    }

    pub fn branch_label(&self) -> &str {
        self.branch.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeRecord {
    pub entry: RosterEntry,
    pub volumes: Volumes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SnapshotLabel {
    Today,
    PreviousWorkday,
    PreviousWednesday,
    PreviousMonthEnd,
}

impl SnapshotLabel {
    pub fn key(self) -> &'static str {
        match self {
            SnapshotLabel::Today => "today",
            SnapshotLabel::PreviousWorkday => "previous-workday",
            SnapshotLabel::PreviousWednesday => "previous-wednesday",
            SnapshotLabel::PreviousMonthEnd => "previous-month-end",
        }
    }

    pub fn caption(self) -> &'static str {
        match self {
            SnapshotLabel::Today => "当日",
            SnapshotLabel::PreviousWorkday => "上一工作日",
            SnapshotLabel::PreviousWednesday => "上周三",
            SnapshotLabel::PreviousMonthEnd => "上月末",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    snapshots: BTreeMap<SnapshotLabel, Vec<EmployeeRecord>>,
}

impl SnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: SnapshotLabel, records: Vec<EmployeeRecord>) {
        self.snapshots.insert(label, records);
    }

    pub fn get(&self, label: SnapshotLabel) -> Option<&[EmployeeRecord]> {
        self.snapshots.get(&label).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SnapshotLabel, &[EmployeeRecord])> {
        self.snapshots
            .iter()
            .map(|(label, records)| (*label, records.as_slice()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Window {
    Day,
    Week,
    Month,
}

impl Window {
    pub fn label(self) -> &'static str {
        match self {
            Window::Day => "本日",
            Window::Week => "本周累积",
            Window::Month => "本月",
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Window::Day => "本日",
            Window::Week => "本周",
            Window::Month => "本月",
        }
    }

    pub fn heading(self) -> String {
        format!("{}开单率情况", self.short_label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    pub entry: RosterEntry,
    pub windows: Vec<(Window, Volumes)>,
}

impl DeltaRecord {
    pub fn delta(&self, window: Window) -> Option<&Volumes> {
        self.windows
            .iter()
            .find(|(w, _)| *w == window)
            .map(|(_, volumes)| volumes)
    }

    pub fn value(&self, window: Window, category: Category) -> f64 {
        self.delta(window).map(|v| v.get(category)).unwrap_or(0.0)
    }

    pub fn open_count(&self, window: Window) -> usize {
        Category::PRIMARY
            .iter()
            .filter(|c| self.value(window, **c) > 0.0)
            .count()
    }

    pub fn is_active(&self, window: Window) -> bool {
        self.open_count(window) > 0
    }

    pub fn in_bucket(&self, window: Window, bucket: usize) -> bool {
        self.open_count(window) == bucket
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowCounts {
    pub window: Window,
    pub active: [u64; 4],
    pub idle: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchGroupStat {
    pub group: String,
    pub branch: String,
    pub headcount: u64,
    pub windows: Vec<WindowCounts>,
    /// Employees with exactly 1, 2, 3 and 4 open categories in the bucket window.
    pub buckets: [u64; 4],
    pub baseline: Option<u64>,
}

impl BranchGroupStat {
    pub fn counts(&self, window: Window) -> Option<&WindowCounts> {
        self.windows.iter().find(|c| c.window == window)
    }

    pub fn headcount_change(&self) -> Option<i64> {
        self.baseline
            .map(|baseline| self.headcount as i64 - baseline as i64)
    }
}
