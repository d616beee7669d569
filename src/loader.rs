use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, RangeDeserializerBuilder, Reader};
use chrono::NaiveDate;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::calendar::{date_suffix, ReferenceWindow};
use crate::error::{ReportError, Result};
use crate::models::{Category, SnapshotLabel, Volumes};

pub const INPUT_DIR: &str = "参考文件";
pub const SNAPSHOT_HEADER_ROW: u32 = 2;
pub const MAPPING_STEM: &str = "分行全简称对应及组别分类";
pub const MAPPING_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Roster,
    Sales,
    EquitySales,
    Income,
}

impl SnapshotKind {
    pub fn stem(self) -> &'static str {
        match self {
            SnapshotKind::Roster => "理财经理详细信息",
            SnapshotKind::Sales => "投资理财销售量统计表",
            SnapshotKind::EquitySales => "投资理财销售量统计表-权益",
            SnapshotKind::Income => "投资理财中收统计表",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            SnapshotKind::Sales => &["xls", "xlsx", "csv"],
            _ => &["csv", "xlsx", "xls"],
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRosterRow {
    #[serde(rename = "序号", default, deserialize_with = "de::opt_int")]
    pub ordinal: Option<i64>,
    #[serde(rename = "柜员号", default, deserialize_with = "de::id")]
    pub employee_id: String,
    #[serde(rename = "姓名", default, deserialize_with = "de::text")]
    pub name: String,
    #[serde(rename = "总行/一级分行名称", default, deserialize_with = "de::text")]
    pub parent_branch: String,
}

impl Keyed for RawRosterRow {
    fn key(&self) -> &str {
        &self.employee_id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVolumeRow {
    #[serde(rename = "人员工号", default, deserialize_with = "de::id")]
    pub employee_id: String,
    #[serde(rename = "理财", default, deserialize_with = "de::amount")]
    pub wealth_management: f64,
    #[serde(rename = "资产管理计划", default, deserialize_with = "de::amount")]
    pub asset_management_plan: f64,
    #[serde(rename = "保险", default, deserialize_with = "de::amount")]
    pub insurance: f64,
    #[serde(rename = "基金", default, deserialize_with = "de::amount")]
    pub fund: f64,
    #[serde(rename = "实物贵金属", default, deserialize_with = "de::amount")]
    pub physical_metal: f64,
    #[serde(rename = "黄金积存", default, deserialize_with = "de::amount")]
    pub accumulated_gold: f64,
    #[serde(rename = "合计", default, deserialize_with = "de::amount")]
    pub file_total: f64,
}

impl RawVolumeRow {
    pub fn volumes(&self) -> Volumes {
        let mut volumes = Volumes::default();
        volumes.set(Category::WealthManagement, self.wealth_management);
        volumes.set(Category::AssetManagementPlan, self.asset_management_plan);
        volumes.set(Category::Insurance, self.insurance);
        volumes.set(Category::Fund, self.fund);
        volumes.set(Category::PhysicalMetal, self.physical_metal);
        volumes.set(Category::AccumulatedGold, self.accumulated_gold);
        volumes.set(Category::FileTotal, self.file_total);
        volumes
    }
}

impl Keyed for RawVolumeRow {
    fn key(&self) -> &str {
        &self.employee_id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingRow {
    #[serde(rename = "总行/一级分行名称", default, deserialize_with = "de::text")]
    pub parent_branch: String,
    #[serde(rename = "分行", default, deserialize_with = "de::opt_text")]
    pub branch: Option<String>,
    #[serde(rename = "组别", default, deserialize_with = "de::opt_text")]
    pub group: Option<String>,
}

pub fn input_dir(root: &Path) -> PathBuf {
    root.join(INPUT_DIR)
}

pub fn snapshot_stem(kind: SnapshotKind, date: NaiveDate) -> String {
    format!("{}{}", kind.stem(), date_suffix(date))
}

pub fn locate(dir: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}

pub fn load_snapshots<T>(
    dir: &Path,
    kind: SnapshotKind,
    window: &ReferenceWindow,
    labels: &[SnapshotLabel],
) -> Result<BTreeMap<SnapshotLabel, Vec<T>>>
where
    T: DeserializeOwned + Keyed,
{
    let mut snapshots = BTreeMap::new();
    for label in labels {
        let rows = load_snapshot(dir, kind, window.date_for(*label), *label)?;
        snapshots.insert(*label, rows);
    }
    Ok(snapshots)
}

pub fn load_snapshot<T>(
    dir: &Path,
    kind: SnapshotKind,
    date: NaiveDate,
    label: SnapshotLabel,
) -> Result<Vec<T>>
where
    T: DeserializeOwned + Keyed,
{
    let stem = snapshot_stem(kind, date);
    let path = locate(dir, &stem, kind.extensions()).ok_or_else(|| ReportError::MissingInput {
        label: format!("{kind} ({})", label.key()),
        stem: stem.clone(),
        tried: kind.extensions().iter().map(|ext| format!(".{ext}")).collect(),
    })?;

    info!("Loading {} snapshot from {}", label.key(), path.display());
    let rows: Vec<T> = read_table(&path, SNAPSHOT_HEADER_ROW)?;
    let total = rows.len();
    let rows: Vec<T> = rows.into_iter().filter(|row| !row.key().is_empty()).collect();
    if rows.len() < total {
        debug!(
            "Dropped {} rows without an employee id from {}",
            total - rows.len(),
            path.display()
        );
    }
    Ok(rows)
}

pub fn load_mapping(root: &Path) -> Result<Vec<MappingRow>> {
    let path = locate(root, MAPPING_STEM, &MAPPING_EXTENSIONS).ok_or_else(|| {
        ReportError::MissingInput {
            label: "branch mapping".to_string(),
            stem: MAPPING_STEM.to_string(),
            tried: MAPPING_EXTENSIONS.iter().map(|ext| format!(".{ext}")).collect(),
        }
    })?;

    info!("Loading branch mapping from {}", path.display());
    let rows: Vec<MappingRow> = read_table(&path, 0)?;
    Ok(rows
        .into_iter()
        .filter(|row| !row.parent_branch.is_empty())
        .collect())
}

pub fn read_table<T: DeserializeOwned>(path: &Path, header_row: u32) -> Result<Vec<T>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => read_workbook(path, header_row),
        other => Err(ReportError::load(
            path,
            format!("unsupported file extension '{other}'"),
        )),
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| ReportError::load(path, e))?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        rows.push(result.map_err(|e| ReportError::load(path, e))?);
    }
    Ok(rows)
}

fn read_workbook<T: DeserializeOwned>(path: &Path, header_row: u32) -> Result<Vec<T>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ReportError::load(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReportError::load(path, "workbook contains no sheets"))?
        .map_err(|e| ReportError::load(path, e))?;

    let body = header_range(&range, header_row)
        .ok_or_else(|| ReportError::load(path, format!("no header at row {}", header_row + 1)))?;

    let rows = RangeDeserializerBuilder::new()
        .from_range(&body)
        .map_err(|e| ReportError::load(path, e))?;

    let mut parsed = Vec::new();
    for result in rows {
        parsed.push(result.map_err(|e| ReportError::load(path, e))?);
    }
    Ok(parsed)
}

fn header_range(range: &Range<Data>, header_row: u32) -> Option<Range<Data>> {
    let (_, first_col) = range.start()?;
    let end = range.end()?;
    if end.0 < header_row {
        return None;
    }
    Some(range.range((header_row, first_col), end))
}

mod de {
    use std::fmt;

    use serde::de::{self, Deserializer, Visitor};

    enum Cell {
        Empty,
        Text(String),
        Number(f64),
    }

    struct CellVisitor;

    impl<'de> Visitor<'de> for CellVisitor {
        type Value = Cell;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a text or numeric cell")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Cell, E> {
            Ok(Cell::Empty)
        }

        fn visit_none<E: de::Error>(self) -> Result<Cell, E> {
            Ok(Cell::Empty)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Cell, D::Error> {
            d.deserialize_any(CellVisitor)
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Cell, E> {
            Ok(Cell::Text(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cell, E> {
            Ok(Cell::Number(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cell, E> {
            Ok(Cell::Number(v as f64))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Cell, E> {
            Ok(Cell::Number(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Cell, E> {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                Ok(Cell::Empty)
            } else {
                Ok(Cell::Text(trimmed.to_string()))
            }
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Cell, E> {
            self.visit_str(&v)
        }
    }

    fn integral_text(v: f64) -> String {
        if v.fract() == 0.0 && v.abs() < 1e15 {
            format!("{}", v as i64)
        } else {
            v.to_string()
        }
    }

    /// Employee ids: `1001`, `1001.0` and `"1001"` all become `"1001"`.
    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match d.deserialize_any(CellVisitor)? {
            Cell::Empty => String::new(),
            Cell::Text(s) => match s.parse::<f64>() {
                Ok(v) if s.contains('.') => integral_text(v),
                _ => s,
            },
            Cell::Number(v) => integral_text(v),
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_text(d)?.unwrap_or_default())
    }

    pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match d.deserialize_any(CellVisitor)? {
            Cell::Empty => None,
            Cell::Text(s) => Some(s),
            Cell::Number(v) => Some(integral_text(v)),
        })
    }

    pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match d.deserialize_any(CellVisitor)? {
            Cell::Empty => None,
            Cell::Text(s) => s.parse::<f64>().ok().map(|v| v as i64),
            Cell::Number(v) => Some(v as i64),
        })
    }

    /// Placeholders spreadsheet exports use for a missing amount, compared case-insensitively.
    const NULL_TOKENS: [&str; 15] = [
        "-", "#n/a", "#n/a n/a", "#na", "-1.#ind", "-1.#qnan", "-nan", "1.#ind", "1.#qnan",
        "<na>", "n/a", "na", "null", "nan", "none",
    ];

    fn is_null_token(s: &str) -> bool {
        NULL_TOKENS.iter().any(|token| s.eq_ignore_ascii_case(token))
    }

    /// Amounts: numbers, numeric text with thousands separators, or empty and null
    /// placeholders (0). Infinite values are rejected.
    pub fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = match d.deserialize_any(CellVisitor)? {
            Cell::Empty => return Ok(0.0),
            // typed readers hand a `NaN` token over as a number
            Cell::Number(v) if v.is_nan() => return Ok(0.0),
            Cell::Number(v) => v,
            Cell::Text(s) => {
                if is_null_token(&s) {
                    return Ok(0.0);
                }
                let cleaned: String = s.chars().filter(|c| *c != ',').collect();
                cleaned
                    .parse::<f64>()
                    .map_err(|_| de::Error::custom(format!("invalid amount '{s}'")))?
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(de::Error::custom(format!("invalid amount '{value}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use std::fs;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn reads_csv_volumes_with_lenient_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("投资理财销售量统计表20240315.csv");
        fs::write(
            &path,
            "人员工号,理财,保险,基金,合计\n1001.0,\"1,200.50\",,3,\n,9,9,9,9\n1002,-,4,0,4\n",
        )
        .unwrap();

        let rows: Vec<RawVolumeRow> =
            load_snapshot(dir.path(), SnapshotKind::Sales, ymd(2024, 3, 15), SnapshotLabel::Today)
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].employee_id, "1001");
        assert_eq!(rows[0].wealth_management, 1200.5);
        assert_eq!(rows[0].insurance, 0.0);
        assert_eq!(rows[0].accumulated_gold, 0.0);
        assert_eq!(rows[1].employee_id, "1002");
        assert_eq!(rows[1].wealth_management, 0.0);
        assert_eq!(rows[1].volumes().get(Category::Insurance), 4.0);
    }

    #[test]
    fn null_placeholders_read_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("投资理财销售量统计表20240315.csv"),
            "人员工号,理财,保险,基金\n1001,NaN,5,null\n1002,100000,N/A,#N/A\n1003,NULL,nan,NA\n",
        )
        .unwrap();

        let rows: Vec<RawVolumeRow> =
            load_snapshot(dir.path(), SnapshotKind::Sales, ymd(2024, 3, 15), SnapshotLabel::Today)
                .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].wealth_management, 0.0);
        assert_eq!(rows[0].insurance, 5.0);
        assert_eq!(rows[0].fund, 0.0);
        assert_eq!(rows[1].wealth_management, 100000.0);
        assert_eq!(rows[1].insurance, 0.0);
        assert_eq!(rows[1].fund, 0.0);
        assert!(rows
            .iter()
            .flat_map(|r| [r.wealth_management, r.insurance, r.fund])
            .all(f64::is_finite));
    }

    #[test]
    fn infinite_amount_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("投资理财销售量统计表20240315.csv"),
            "人员工号,理财\n1001,inf\n",
        )
        .unwrap();

        let err = load_snapshot::<RawVolumeRow>(
            dir.path(),
            SnapshotKind::Sales,
            ymd(2024, 3, 15),
            SnapshotLabel::Today,
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::Load { .. }));
        assert!(err.to_string().contains("invalid amount 'inf'"));
    }

    #[test]
    fn missing_snapshot_names_stem_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_snapshot::<RawRosterRow>(
            dir.path(),
            SnapshotKind::Roster,
            ymd(2024, 2, 29),
            SnapshotLabel::PreviousMonthEnd,
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, ReportError::MissingInput { .. }));
        assert!(message.contains("理财经理详细信息20240229"));
        assert!(message.contains(".csv|.xlsx|.xls"));
    }

    #[test]
    fn extension_priority_depends_on_kind() {
        let dir = tempfile::tempdir().unwrap();
        let stem = snapshot_stem(SnapshotKind::Sales, ymd(2024, 3, 15));
        fs::write(dir.path().join(format!("{stem}.csv")), "人员工号\n").unwrap();
        fs::write(dir.path().join(format!("{stem}.xlsx")), b"").unwrap();

        let sales = locate(dir.path(), &stem, SnapshotKind::Sales.extensions()).unwrap();
        assert_eq!(sales.extension().unwrap(), "xlsx");
        let any_csv_first = locate(dir.path(), &stem, SnapshotKind::Income.extensions()).unwrap();
        assert_eq!(any_csv_first.extension().unwrap(), "csv");
    }

    #[test]
    fn corrupt_workbook_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let stem = snapshot_stem(SnapshotKind::Sales, ymd(2024, 3, 15));
        fs::write(dir.path().join(format!("{stem}.xlsx")), b"not a zip archive").unwrap();

        let err = load_snapshot::<RawVolumeRow>(
            dir.path(),
            SnapshotKind::Sales,
            ymd(2024, 3, 15),
            SnapshotLabel::Today,
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::Load { .. }));
        assert!(err.to_string().contains(&stem));
    }

    #[test]
    fn workbook_headers_start_two_rows_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("理财经理详细信息20240315.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "理财经理详细信息").unwrap();
        sheet.write_string(1, 0, "数据日期：2024-03-15").unwrap();
        for (col, header) in ["序号", "柜员号", "姓名", "总行/一级分行名称"]
            .iter()
            .enumerate()
        {
            sheet.write_string(2, col as u16, *header).unwrap();
        }
        sheet.write_number(3, 0, 1.0).unwrap();
        sheet.write_number(3, 1, 1001.0).unwrap();
        sheet.write_string(3, 2, "张三").unwrap();
        sheet.write_string(3, 3, "某某银行北京分行").unwrap();
        sheet.write_number(4, 0, 2.0).unwrap();
        sheet.write_string(4, 1, "1002").unwrap();
        sheet.write_string(4, 2, "李四").unwrap();
        workbook.save(&path).unwrap();

        let rows: Vec<RawRosterRow> =
            load_snapshot(dir.path(), SnapshotKind::Roster, ymd(2024, 3, 15), SnapshotLabel::Today)
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ordinal, Some(1));
        assert_eq!(rows[0].employee_id, "1001");
        assert_eq!(rows[0].parent_branch, "某某银行北京分行");
        assert_eq!(rows[1].employee_id, "1002");
        assert_eq!(rows[1].parent_branch, "");
    }

    #[test]
    fn mapping_reads_header_on_first_row() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(format!("{MAPPING_STEM}.csv")),
            "总行/一级分行名称,分行,组别\n某某银行北京分行,北京,第一组\n某某银行总行,总行,\n,,\n",
        )
        .unwrap();

        let rows = load_mapping(dir.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].branch.as_deref(), Some("北京"));
        assert_eq!(rows[1].group, None);
    }

    #[test]
    fn load_snapshots_aborts_on_any_missing_label() {
        let dir = tempfile::tempdir().unwrap();
        let window = ReferenceWindow::resolve(ymd(2024, 3, 15));
        let stem = snapshot_stem(SnapshotKind::Income, window.report_date);
        fs::write(dir.path().join(format!("{stem}.csv")), "人员工号,基金\n1001,5\n").unwrap();

        let ok: BTreeMap<SnapshotLabel, Vec<RawVolumeRow>> =
            load_snapshots(dir.path(), SnapshotKind::Income, &window, &[SnapshotLabel::Today])
                .unwrap();
        assert_eq!(ok[&SnapshotLabel::Today].len(), 1);

        let err = load_snapshots::<RawVolumeRow>(
            dir.path(),
            SnapshotKind::Income,
            &window,
            &[SnapshotLabel::Today, SnapshotLabel::PreviousWednesday],
        )
        .unwrap_err();
        assert!(err.to_string().contains("投资理财中收统计表20240313"));
    }
}
