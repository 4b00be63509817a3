//! Voting window checks and period text.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::types::SurveyDetail;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// `[start_at, end_at]`, either side open when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VotePeriod {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodStatus {
    Loading,
    NotStarted,
    Ended,
    Open,
}

impl PeriodStatus {
    pub fn is_valid(self) -> bool {
        self == PeriodStatus::Open
    }

    pub fn message(self) -> &'static str {
        match self {
            PeriodStatus::Loading => "survey info is loading.",
            PeriodStatus::NotStarted => "not currently in the survey period.",
            PeriodStatus::Ended => "the survey has ended.",
            PeriodStatus::Open => "",
        }
    }
}

impl VotePeriod {
    pub fn check(&self, now: DateTime<Utc>) -> PeriodStatus {
        if matches!(self.start_at, Some(start) if now < start) {
            return PeriodStatus::NotStarted;
        }
        if matches!(self.end_at, Some(end) if now > end) {
            return PeriodStatus::Ended;
        }
        PeriodStatus::Open
    }

    pub fn is_bounded(&self) -> bool {
        self.start_at.is_some() || self.end_at.is_some()
    }

    /// `start ~ end`, `start ~`, `~ end`, or empty for an unbounded period.
    pub fn display_text(&self) -> String {
        match (self.start_at, self.end_at) {
            (Some(start), Some(end)) => {
                format!("{} ~ {}", format_timestamp(start), format_timestamp(end))
            }
            (Some(start), None) => format!("{} ~", format_timestamp(start)),
            (None, Some(end)) => format!("~ {}", format_timestamp(end)),
            (None, None) => String::new(),
        }
    }
}

/// Advisory client-side gate; the server still decides.
pub fn check_period(now: DateTime<Utc>, detail: Option<&SurveyDetail>) -> PeriodStatus {
    match detail {
        None => PeriodStatus::Loading,
        Some(detail) => detail.period.check(now),
    }
}

/// Accepts RFC 3339 with an offset, or naive date-times which are read as
/// local time. Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.trim().replacen(' ', "T", 1);
    if normalized.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `YYYY.MM.DD HH:MM` in local time.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y.%m.%d %H:%M").to_string()
}

#[cfg(test)]
#[path = "tests/period_tests.rs"]
mod tests;
