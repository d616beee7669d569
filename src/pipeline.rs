use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};

use crate::config::RunContext;
use crate::delta::compute_deltas;
use crate::error::{ReportError, Result};
use crate::loader::{self, RawRosterRow, RawVolumeRow, SnapshotKind};
use crate::models::{Category, DeltaRecord, RosterEntry, SnapshotLabel, SnapshotSet, Window};
use crate::ranking::{rank_table, top_list};
use crate::reconcile::{build_snapshot_set, reconcile_roster};
use crate::report::{self, Sheet};
use crate::rollup::{rate_rows, rollup_groups, rollup_income, rollup_income_sales};

/// Employees ranked at or above this on 4类业务合计 count toward TOP人数.
pub const TOP_N: u32 = 1000;

const OPEN_RATE_DIR: &str = "理财经理开单情况统计表";
const TOP_DIR: &str = "业务TOP周榜单";
const INCOME_DIR: &str = "投资理财中收统计表";
const INCOME_SALES_DIR: &str = "投资理财中收及销量统计表";

const RESULT_SHEET: &str = "结果通报表";
const DETAIL_SHEET: &str = "多日明细情况";
const EMPLOYEE_SHEET: &str = "用户中间表";
const BRANCH_SHEET: &str = "机构中间表";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Daily,
    Monthly,
    TopList,
    Income,
    IncomeSales,
}

impl ReportKind {
    pub fn key(self) -> &'static str {
        match self {
            ReportKind::Daily => "daily",
            ReportKind::Monthly => "monthly",
            ReportKind::TopList => "top",
            ReportKind::Income => "income",
            ReportKind::IncomeSales => "income-sales",
        }
    }

    pub fn windows(self) -> &'static [Window] {
        match self {
            ReportKind::Daily => &[Window::Day, Window::Week],
            ReportKind::Monthly => &[Window::Month],
            _ => &[Window::Week],
        }
    }

    pub fn bucket_window(self) -> Window {
        match self {
            ReportKind::Monthly => Window::Month,
            _ => Window::Week,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ReportKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(ReportKind::Daily),
            "monthly" => Ok(ReportKind::Monthly),
            "top" => Ok(ReportKind::TopList),
            "income" => Ok(ReportKind::Income),
            "income-sales" => Ok(ReportKind::IncomeSales),
            other => Err(ReportError::Config(format!(
                "unknown report '{other}', expected one of daily, monthly, top, income, income-sales"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Output {
    pub path: PathBuf,
    pub sheets: Vec<Sheet>,
}

/// Builds every table of `kind`, then writes its workbooks. Nothing is written
/// when any stage fails.
pub fn run(ctx: &RunContext, kind: ReportKind) -> Result<Vec<PathBuf>> {
    info!("Building {kind} report for {}", ctx.report_date());
    let outputs = build(ctx, kind)?;
    write_outputs(outputs)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

fn discard(paths: &[PathBuf]) {
    for path in paths.iter().filter(|p| p.exists()) {
        if let Err(err) = fs::remove_file(path) {
            warn!("Could not remove {}: {err}", path.display());
        }
    }
}

/// Saves every workbook next to its target, then renames them all into place, so
/// a failed save leaves none of the outputs behind.
pub fn write_outputs(outputs: Vec<Output>) -> Result<Vec<PathBuf>> {
    let mut staged = Vec::with_capacity(outputs.len());
    for output in &outputs {
        let staging = staging_path(&output.path);
        if let Err(err) = report::write_workbook(&staging, &output.sheets) {
            staged.push(staging);
            discard(&staged);
            return Err(err);
        }
        debug!("Staged {}", staging.display());
        staged.push(staging);
    }

    let mut written = Vec::with_capacity(outputs.len());
    for (staging, output) in staged.iter().zip(outputs) {
        fs::rename(staging, &output.path)?;
        info!("Wrote {}", output.path.display());
        written.push(output.path);
    }
    Ok(written)
}

pub fn build(ctx: &RunContext, kind: ReportKind) -> Result<Vec<Output>> {
    match kind {
        ReportKind::Daily | ReportKind::Monthly => open_rate_report(ctx, kind),
        ReportKind::TopList => top_list_report(ctx),
        ReportKind::Income => income_report(ctx),
        ReportKind::IncomeSales => income_sales_report(ctx),
    }
}

fn load_roster(ctx: &RunContext, label: SnapshotLabel) -> Result<Vec<RosterEntry>> {
    let raw: Vec<RawRosterRow> = loader::load_snapshot(
        &ctx.input_dir(),
        SnapshotKind::Roster,
        ctx.window.date_for(label),
        label,
    )?;
    Ok(reconcile_roster(&raw, &ctx.mapping))
}

fn load_domain(
    ctx: &RunContext,
    kind: SnapshotKind,
    roster: &[RosterEntry],
    windows: &[Window],
) -> Result<SnapshotSet> {
    let labels = ctx.class.required_labels(windows);
    debug!("{kind} snapshots needed: {labels:?}");
    let raw = loader::load_snapshots::<RawVolumeRow>(&ctx.input_dir(), kind, &ctx.window, &labels)?;
    Ok(build_snapshot_set(roster, &raw))
}

fn domain_deltas(
    ctx: &RunContext,
    kind: SnapshotKind,
    roster: &[RosterEntry],
    windows: &[Window],
) -> Result<(SnapshotSet, Vec<DeltaRecord>)> {
    let set = load_domain(ctx, kind, roster, windows)?;
    let deltas = compute_deltas(&set, ctx.class, windows)?;
    Ok((set, deltas))
}

fn open_rate_report(ctx: &RunContext, kind: ReportKind) -> Result<Vec<Output>> {
    let windows = kind.windows();
    let bucket_window = kind.bucket_window();

    let roster = load_roster(ctx, SnapshotLabel::Today)?;
    let baseline = load_roster(ctx, SnapshotLabel::PreviousMonthEnd)?;
    let (sales, deltas) = domain_deltas(ctx, SnapshotKind::Sales, &roster, windows)?;

    let stats = rollup_groups(&deltas, &baseline, windows, bucket_window);
    let rates = rate_rows(&stats);
    debug!("{} group/branch rows including the total", stats.len());

    let (title, result_sheet) = match kind {
        ReportKind::Monthly => ("理财经理开单情况月报表", "月结果通报表"),
        _ => ("理财经理开单情况统计表", RESULT_SHEET),
    };

    let mut sheets = vec![report::rate_sheet(result_sheet, &rates, windows, bucket_window)];
    if kind == ReportKind::Daily {
        sheets.push(report::snapshot_detail_sheet(
            DETAIL_SHEET,
            &sales,
            &Category::PRIMARY,
        ));
    }
    sheets.push(report::employee_sheet(EMPLOYEE_SHEET, &deltas, windows, bucket_window));
    sheets.push(report::branch_group_sheet(BRANCH_SHEET, &stats, windows));

    Ok(vec![Output {
        path: ctx.output_path(OPEN_RATE_DIR, title),
        sheets,
    }])
}

fn top_list_report(ctx: &RunContext) -> Result<Vec<Output>> {
    let windows = ReportKind::TopList.windows();
    let roster = load_roster(ctx, SnapshotLabel::Today)?;
    let (_, sales) = domain_deltas(ctx, SnapshotKind::Sales, &roster, windows)?;
    let (_, equity) = domain_deltas(ctx, SnapshotKind::EquitySales, &roster, windows)?;

    let lists: [(&str, &str, Category, &[DeltaRecord]); 4] = [
        ("理财资管top榜单", "理财/资管本周销量（万元）", Category::WealthAsset, sales.as_slice()),
        ("保险top榜单", "保险_本周销量（万元）", Category::Insurance, sales.as_slice()),
        ("贵金属top榜单", "贵金属_本周销量（万元）", Category::PreciousMetal, sales.as_slice()),
        ("基金top榜单", "基金_本周销量（万元）", Category::Fund, equity.as_slice()),
    ];
    let sheets = lists
        .iter()
        .map(|(name, value_column, category, records)| {
            report::top_sheet(name, value_column, &top_list(records, Window::Week, *category))
        })
        .collect();

    Ok(vec![Output {
        path: ctx.output_path(TOP_DIR, "4种业务TOP周榜单"),
        sheets,
    }])
}

fn income_report(ctx: &RunContext) -> Result<Vec<Output>> {
    let windows = ReportKind::Income.windows();
    let roster = load_roster(ctx, SnapshotLabel::Today)?;
    let (income, deltas) = domain_deltas(ctx, SnapshotKind::Income, &roster, windows)?;

    let ranked = rank_table(&deltas, Window::Week, &Category::RANKED);
    let branches = rollup_income(&ranked, Window::Week, TOP_N);
    let top = top_list(&deltas, Window::Week, Category::FourTotal);

    let mut detail_categories = vec![Category::FourTotal];
    detail_categories.extend(Category::PRIMARY);

    Ok(vec![
        Output {
            path: ctx.output_path(TOP_DIR, "中间业务收入TOP榜单"),
            sheets: vec![report::top_sheet(
                "中间业务收入TOP榜单",
                &format!("{}（万元）", Category::FourTotal.label()),
                &top,
            )],
        },
        Output {
            path: ctx.output_path(INCOME_DIR, "投资理财中收统计表"),
            sheets: vec![
                report::income_rollup_sheet(RESULT_SHEET, &branches),
                report::snapshot_detail_sheet(DETAIL_SHEET, &income, &detail_categories),
                report::ranked_income_sheet(EMPLOYEE_SHEET, &ranked, Window::Week),
            ],
        },
    ])
}

fn income_sales_report(ctx: &RunContext) -> Result<Vec<Output>> {
    let windows = ReportKind::IncomeSales.windows();
    let roster = load_roster(ctx, SnapshotLabel::Today)?;
    let (_, income) = domain_deltas(ctx, SnapshotKind::Income, &roster, windows)?;
    let (_, sales) = domain_deltas(ctx, SnapshotKind::Sales, &roster, windows)?;

    let branches = rollup_income_sales(&income, &sales, Window::Week);

    Ok(vec![Output {
        path: ctx.output_path(INCOME_SALES_DIR, "投资理财中收及销量统计表"),
        sheets: vec![
            report::income_sales_rollup_sheet(RESULT_SHEET, &branches),
            report::income_sales_employee_sheet(EMPLOYEE_SHEET, &income, &sales, Window::Week),
        ],
    }])
}
