use std::env;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{info, warn};

use crate::calendar::{date_suffix, CrossMonthClass, ReferenceWindow};
use crate::error::{ReportError, Result};
use crate::loader;
use crate::pipeline::ReportKind;
use crate::reconcile::BranchMapping;

pub const ROOT_VAR: &str = "WEALTH_REPORT_ROOT";
pub const REPORTS_VAR: &str = "WEALTH_REPORTS";
pub const DEFAULT_REPORTS: &str = "daily,top,income";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub root: PathBuf,
    pub reports: Vec<ReportKind>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let root = match env::var_os(ROOT_VAR) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => env::current_dir()?,
        };
        let reports = match env::var(REPORTS_VAR) {
            Ok(value) => parse_reports(&value)?,
            Err(env::VarError::NotPresent) => parse_reports(DEFAULT_REPORTS)?,
            Err(err) => return Err(ReportError::Config(format!("{REPORTS_VAR}: {err}"))),
        };
        Ok(Settings { root, reports })
    }
}

/// Comma-separated variant keys, deduplicated in first-seen order.
pub fn parse_reports(raw: &str) -> Result<Vec<ReportKind>> {
    let mut reports = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        let kind: ReportKind = key.parse()?;
        if !reports.contains(&kind) {
            reports.push(kind);
        }
    }
    if reports.is_empty() {
        return Err(ReportError::Config(format!("{REPORTS_VAR} names no report")));
    }
    Ok(reports)
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub root: PathBuf,
    pub window: ReferenceWindow,
    pub class: CrossMonthClass,
    pub mapping: BranchMapping,
    pub reports: Vec<ReportKind>,
}

impl RunContext {
    pub fn new(settings: Settings, report_date: NaiveDate) -> Result<Self> {
        let mapping = BranchMapping::from_rows(loader::load_mapping(&settings.root)?);
        if mapping.is_empty() {
            warn!("Branch mapping is empty; every employee falls into the sentinel group");
        } else {
            info!("Loaded {} branch mapping rows", mapping.len());
        }
        Ok(Self::with_mapping(settings, report_date, mapping))
    }

    pub fn with_mapping(settings: Settings, report_date: NaiveDate, mapping: BranchMapping) -> Self {
        let window = ReferenceWindow::resolve(report_date);
        let class = window.cross_month();
        info!(
            "Report date {}: previous workday {}, previous Wednesday {}, previous month end {}, first workday {}, cross-month class {}",
            window.report_date,
            window.previous_workday,
            window.previous_wednesday,
            window.previous_month_end,
            window.first_workday_of_month,
            class.as_u8()
        );
        RunContext {
            root: settings.root,
            window,
            class,
            mapping,
            reports: settings.reports,
        }
    }

    pub fn report_date(&self) -> NaiveDate {
        self.window.report_date
    }

    pub fn input_dir(&self) -> PathBuf {
        loader::input_dir(&self.root)
    }

    pub fn output_path(&self, dir: &str, title: &str) -> PathBuf {
        output_path(&self.root, dir, title, self.report_date())
    }
}

pub fn output_path(root: &Path, dir: &str, title: &str, date: NaiveDate) -> PathBuf {
    root.join(dir).join(format!("{title}{}.xlsx", date_suffix(date)))
}
