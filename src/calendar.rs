use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::{ReportError, Result};
use crate::models::{SnapshotLabel, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceWindow {
    pub report_date: NaiveDate,
    pub previous_workday: NaiveDate,
    pub previous_wednesday: NaiveDate,
    pub previous_month_end: NaiveDate,
    pub first_workday_of_month: NaiveDate,
}

impl ReferenceWindow {
    pub fn resolve(report_date: NaiveDate) -> Self {
        ReferenceWindow {
            report_date,
            previous_workday: previous_workday(report_date),
            previous_wednesday: previous_wednesday(report_date),
            previous_month_end: previous_month_end(report_date),
            first_workday_of_month: first_workday_of_month(report_date),
        }
    }

    pub fn date_for(&self, label: SnapshotLabel) -> NaiveDate {
        match label {
            SnapshotLabel::Today => self.report_date,
            SnapshotLabel::PreviousWorkday => self.previous_workday,
            SnapshotLabel::PreviousWednesday => self.previous_wednesday,
            SnapshotLabel::PreviousMonthEnd => self.previous_month_end,
        }
    }

    pub fn cross_month(&self) -> CrossMonthClass {
        let month = self.report_date.month();
        if self.previous_workday.month() != month {
            CrossMonthClass::DayCrosses
        } else if self.previous_wednesday.month() != month {
            CrossMonthClass::WeekCrosses
        } else {
            CrossMonthClass::SameMonth
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CrossMonthClass {
    SameMonth = 0,
    WeekCrosses = 1,
    DayCrosses = 2,
}

impl CrossMonthClass {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn needs_month_end(self, window: Window) -> bool {
        match window {
            Window::Day => self == CrossMonthClass::DayCrosses,
            Window::Week => self != CrossMonthClass::SameMonth,
            Window::Month => false,
        }
    }

    pub fn required_labels(self, windows: &[Window]) -> Vec<SnapshotLabel> {
        let mut labels = vec![SnapshotLabel::Today];
        for window in windows {
            match window {
                Window::Day => labels.push(SnapshotLabel::PreviousWorkday),
                Window::Week => labels.push(SnapshotLabel::PreviousWednesday),
                Window::Month => {}
            }
            if self.needs_month_end(*window) {
                labels.push(SnapshotLabel::PreviousMonthEnd);
            }
        }
        labels.sort();
        labels.dedup();
        labels
    }
}

/// Monday → previous Friday, weekend → Friday, otherwise the day before.
pub fn previous_workday(date: NaiveDate) -> NaiveDate {
    let back = match date.weekday() {
        Weekday::Mon => 3,
        Weekday::Sat => 1,
        Weekday::Sun => 2,
        _ => 1,
    };
    date - Duration::days(back)
}

pub fn previous_wednesday(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().number_from_monday() as i64;
    let back = if date.weekday() == Weekday::Wed {
        7
    } else {
        (weekday - 3).rem_euclid(7)
    };
    date - Duration::days(back)
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

pub fn previous_month_end(date: NaiveDate) -> NaiveDate {
    first_day_of_month(date) - Duration::days(1)
}

/// First Monday-to-Friday day of `date`'s month.
pub fn first_workday_of_month(date: NaiveDate) -> NaiveDate {
    let first = first_day_of_month(date);
    match first.weekday() {
        Weekday::Sat => first + Duration::days(2),
        Weekday::Sun => first + Duration::days(1),
        _ => first,
    }
}

pub fn parse_report_date(raw: &str) -> Result<NaiveDate> {
    if raw.len() != 8 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReportError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| ReportError::InvalidDate(raw.to_string()))
}

pub fn date_suffix(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
