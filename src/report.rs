use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};

use crate::error::Result;
use crate::models::{
    BranchGroupStat, Category, DeltaRecord, RosterEntry, SnapshotLabel, SnapshotSet, Volumes, Window,
    WindowCounts,
};
use crate::ranking::{RankedRow, TopEntry};
use crate::rollup::{IncomeBranchRow, IncomeSalesBranchRow, RateRow};

pub const INDEX_HEADER: &str = "序号";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Number(f64),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        Cell::Int(value as i64)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Empty)
    }
}

/// One output worksheet. `header_groups` adds a merged heading row above the column
/// headers; each group spans the given number of columns, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header_groups: Option<Vec<(String, usize)>>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub numbered: bool,
}

impl Sheet {
    pub fn new(name: &str, columns: Vec<String>) -> Self {
        Sheet {
            name: name.to_string(),
            header_groups: None,
            columns,
            rows: Vec::new(),
            numbered: true,
        }
    }

    pub fn unnumbered(mut self) -> Self {
        self.numbered = false;
        self
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> Result<()> {
    match cell {
        Cell::Empty => {}
        Cell::Text(text) => {
            worksheet.write_string(row, col, text)?;
        }
        Cell::Int(value) => {
            worksheet.write_number(row, col, *value as f64)?;
        }
        Cell::Number(value) => {
            worksheet.write_number(row, col, *value)?;
        }
    }
    Ok(())
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet, header: &Format) -> Result<()> {
    let offset: u16 = if sheet.numbered { 1 } else { 0 };
    let mut row = 0u32;

    if let Some(groups) = &sheet.header_groups {
        let mut col = offset;
        for (title, span) in groups {
            let span = *span as u16;
            if span == 0 {
                continue;
            }
            if span > 1 {
                worksheet.merge_range(row, col, row, col + span - 1, title, header)?;
            } else {
                worksheet.write_string_with_format(row, col, title, header)?;
            }
            col += span;
        }
        row += 1;
    }

    if sheet.numbered {
        worksheet.write_string_with_format(row, 0, INDEX_HEADER, header)?;
    }
    for (col, title) in sheet.columns.iter().enumerate() {
        worksheet.write_string_with_format(row, col as u16 + offset, title, header)?;
    }
    row += 1;

    for (idx, cells) in sheet.rows.iter().enumerate() {
        let current = row + idx as u32;
        if sheet.numbered {
            worksheet.write_number(current, 0, (idx + 1) as f64)?;
        }
        for (col, cell) in cells.iter().enumerate() {
            write_cell(worksheet, current, col as u16 + offset, cell)?;
        }
    }
    Ok(())
}

pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let header = Format::new().set_bold().set_align(FormatAlign::Center);
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet().set_name(&sheet.name)?;
        write_sheet(worksheet, sheet, &header)?;
        debug!("Sheet {} has {} rows", sheet.name, sheet.rows.len());
    }
    workbook.save(path)?;
    Ok(())
}

fn identity_columns() -> Vec<String> {
    ["柜员号", "姓名", "分行", "组别"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn identity_cells(entry: &RosterEntry) -> Vec<Cell> {
    vec![
        entry.employee_id.as_str().into(),
        entry.name.as_str().into(),
        entry.branch.clone().into(),
        entry.group.as_str().into(),
    ]
}

fn bucket_label(bucket: usize, suffix: &str) -> String {
    format!("{bucket}种业务{suffix}")
}

/// Group/branch open rates with one heading block per window. Only the bucket window
/// carries the per-bucket rates.
pub fn rate_sheet(name: &str, rates: &[RateRow], windows: &[Window], bucket_window: Window) -> Sheet {
    let mut columns: Vec<String> = ["组别", "分行", "理财经理总人数", "人数变动"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut groups = vec![(String::new(), columns.len())];

    for window in windows {
        let start = columns.len();
        columns.push("合计开单率".to_string());
        for category in Category::PRIMARY {
            columns.push(format!("{}_{}开单率", category.label(), window.label()));
        }
        if *window == bucket_window {
            columns.extend((1..=4).map(|n| bucket_label(n, "开单率")));
        }
        columns.push("未开单人数(0产能)".to_string());
        groups.push((window.heading(), columns.len() - start));
    }

    let mut sheet = Sheet::new(name, columns);
    sheet.header_groups = Some(groups);
    for rate in rates {
        let mut row: Vec<Cell> = vec![
            rate.group.as_str().into(),
            rate.branch.as_str().into(),
            rate.headcount.into(),
            rate.headcount_change.into(),
        ];
        for window in windows {
            let Some(block) = rate.windows.iter().find(|w| w.window == *window) else {
                continue;
            };
            row.push(block.open_rate.into());
            row.extend(block.category.iter().map(|r| Cell::from(*r)));
            if *window == bucket_window {
                row.extend(rate.buckets.iter().map(|r| Cell::from(*r)));
            }
            row.push(block.idle.into());
        }
        sheet.push(row);
    }
    sheet
}

pub fn branch_group_sheet(name: &str, stats: &[BranchGroupStat], windows: &[Window]) -> Sheet {
    let mut columns: Vec<String> = ["组别", "分行", "理财经理总人数"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    for window in windows {
        for category in Category::PRIMARY {
            columns.push(format!("{}_{}开单人数", category.label(), window.label()));
        }
        columns.push(format!("{}未开单人数(0产能)", window.label()));
    }
    columns.extend((1..=4).map(|n| bucket_label(n, "开单人数")));
    columns.push("上月底总人数".to_string());

    let mut sheet = Sheet::new(name, columns);
    for stat in stats {
        let mut row: Vec<Cell> = vec![
            stat.group.as_str().into(),
            stat.branch.as_str().into(),
            stat.headcount.into(),
        ];
        for window in windows {
            let counts = stat.counts(*window).cloned().unwrap_or(WindowCounts {
                window: *window,
                active: [0; 4],
                idle: 0,
            });
            row.extend(counts.active.iter().map(|n| Cell::from(*n)));
            row.push(counts.idle.into());
        }
        row.extend(stat.buckets.iter().map(|n| Cell::from(*n)));
        row.push(stat.baseline.into());
        sheet.push(row);
    }
    sheet
}

pub fn employee_sheet(name: &str, deltas: &[DeltaRecord], windows: &[Window], bucket_window: Window) -> Sheet {
    let mut columns = identity_columns();
    for window in windows {
        for category in Category::PRIMARY {
            columns.push(format!("{}_{}", category.label(), window.label()));
        }
    }
    for window in windows {
        columns.push(format!("{}开单业务数", window.label()));
    }
    columns.extend((1..=4).rev().map(|n| bucket_label(n, "开单情况")));
    for window in windows {
        columns.push(format!("{}是否开单", window.short_label()));
    }

    let mut sheet = Sheet::new(name, columns);
    for record in deltas {
        let mut row = identity_cells(&record.entry);
        for window in windows {
            for category in Category::PRIMARY {
                row.push(record.value(*window, category).into());
            }
        }
        for window in windows {
            row.push((record.open_count(*window) as u64).into());
        }
        for bucket in (1..=4).rev() {
            row.push(u64::from(record.in_bucket(bucket_window, bucket)).into());
        }
        for window in windows {
            row.push(u64::from(record.is_active(*window)).into());
        }
        sheet.push(row);
    }
    sheet
}

pub fn snapshot_detail_sheet(name: &str, set: &SnapshotSet, categories: &[Category]) -> Sheet {
    let mut columns = vec!["原序号".to_string()];
    columns.extend(identity_columns());
    columns.push("总行/一级分行名称".to_string());
    for (label, _) in set.iter() {
        for category in categories {
            columns.push(format!("{}_{}", category.label(), label.caption()));
        }
    }

    let lookups: Vec<HashMap<&str, &Volumes>> = set
        .iter()
        .map(|(_, records)| {
            records
                .iter()
                .map(|r| (r.entry.employee_id.as_str(), &r.volumes))
                .collect()
        })
        .collect();

    let mut sheet = Sheet::new(name, columns);
    let Some(today) = set.get(SnapshotLabel::Today) else {
        return sheet;
    };
    for record in today {
        let mut row: Vec<Cell> = vec![record.entry.ordinal.into()];
        row.extend(identity_cells(&record.entry));
        row.push(record.entry.parent_branch.as_str().into());
        for lookup in &lookups {
            let volumes = lookup.get(record.entry.employee_id.as_str());
            for category in categories {
                row.push(volumes.map(|v| v.get(*category)).unwrap_or(0.0).into());
            }
        }
        sheet.push(row);
    }
    sheet
}

pub fn top_sheet(name: &str, value_column: &str, entries: &[TopEntry]) -> Sheet {
    let columns = vec!["分行".to_string(), "姓名".to_string(), value_column.to_string()];
    let mut sheet = Sheet::new(name, columns).unnumbered();
    for entry in entries {
        sheet.push(vec![
            entry.branch.as_str().into(),
            entry.name.as_str().into(),
            entry.value.into(),
        ]);
    }
    sheet
}

pub fn ranked_income_sheet(name: &str, rows: &[RankedRow<'_>], window: Window) -> Sheet {
    let mut columns: Vec<String> = ["柜员号", "姓名", "分行"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    for category in Category::RANKED {
        columns.push(format!("{}_{}", category.label(), window.short_label()));
        columns.push(format!("{}_排名", category.label()));
    }

    let mut sheet = Sheet::new(name, columns);
    for ranked in rows {
        let entry = &ranked.record.entry;
        let mut row: Vec<Cell> = vec![
            entry.employee_id.as_str().into(),
            entry.name.as_str().into(),
            entry.branch.clone().into(),
        ];
        for category in Category::RANKED {
            row.push(ranked.record.value(window, category).into());
            row.push(ranked.rank(category).map(u64::from).into());
        }
        sheet.push(row);
    }
    sheet
}

pub fn income_rollup_sheet(name: &str, rows: &[IncomeBranchRow]) -> Sheet {
    let columns = [
        "一级名称",
        "总人数",
        "TOP人数",
        "TOP占比",
        "4类业务合计",
        "人均中收",
        "人均中收(万元)",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    let mut sheet = Sheet::new(name, columns);
    for row in rows {
        sheet.push(vec![
            row.branch.as_str().into(),
            row.headcount.into(),
            row.top_count.into(),
            row.top_share().into(),
            row.four_total.into(),
            row.per_capita().into(),
            row.per_capita_10k().into(),
        ]);
    }
    sheet
}

pub fn income_sales_rollup_sheet(name: &str, rows: &[IncomeSalesBranchRow]) -> Sheet {
    let mut columns = vec!["一级名称".to_string(), "总人数".to_string()];
    for (domain, per_capita) in [("中收", "人均中收"), ("销量", "人均销量")] {
        columns.push(format!("总{domain}"));
        columns.push(per_capita.to_string());
        for category in Category::PRIMARY {
            columns.push(format!("{}{domain}合计", category.label()));
            columns.push(format!("{}{per_capita}", category.label()));
        }
    }

    let mut sheet = Sheet::new(name, columns);
    for row in rows {
        let mut cells: Vec<Cell> = vec![row.branch.as_str().into(), row.headcount.into()];
        for summary in [&row.income, &row.sales] {
            cells.push(summary.total.into());
            cells.push(row.per_capita(summary.total).into());
            for amount in summary.by_category {
                cells.push(amount.into());
                cells.push(row.per_capita(amount).into());
            }
        }
        sheet.push(cells);
    }
    sheet
}

pub fn income_sales_employee_sheet(
    name: &str,
    income: &[DeltaRecord],
    sales: &[DeltaRecord],
    window: Window,
) -> Sheet {
    let categories: Vec<Category> = std::iter::once(Category::FourTotal)
        .chain(Category::PRIMARY)
        .collect();
    let mut columns = identity_columns();
    for domain in ["中收", "销量"] {
        for category in &categories {
            columns.push(format!("{}{domain}_{}", category.label(), window.short_label()));
        }
    }

    let sales_by_id: HashMap<&str, &DeltaRecord> = sales
        .iter()
        .map(|r| (r.entry.employee_id.as_str(), r))
        .collect();

    let mut sheet = Sheet::new(name, columns);
    for record in income {
        let mut row = identity_cells(&record.entry);
        for category in &categories {
            row.push(record.value(window, *category).into());
        }
        let sold = sales_by_id.get(record.entry.employee_id.as_str());
        for category in &categories {
            row.push(sold.map(|s| s.value(window, *category)).unwrap_or(0.0).into());
        }
        sheet.push(row);
    }
    sheet
}
