//! Aggregated vote results: normalization of the results payload and the
//! derived bar/row view.
//!
//! Counts and percentages always come from the server. Nothing here adds
//! votes up, recomputes shares, or rounds what the server sent.

use std::collections::BTreeMap;

use serde_json::Value;
use shared::domain::{OptionId, OptionTone};

use crate::types::SurveyDetail;

/// Segments at or below this share render without a caption.
pub const SEGMENT_CAPTION_MIN_PERCENT: f64 = 15.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionTally {
    pub count: f64,
    pub percent: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyResults {
    pub total: f64,
    pub options: BTreeMap<OptionId, OptionTally>,
}

impl SurveyResults {
    pub fn tally(&self, option_id: OptionId) -> Option<&OptionTally> {
        self.options.get(&option_id)
    }
}

/// Maps `{ total_votes, options: [{option_id|id, label, count, percent}] }`
/// onto [`SurveyResults`]. Missing or malformed numbers become 0 and a
/// null/absent payload yields the empty result.
pub fn normalize_results(raw: Option<&Value>) -> SurveyResults {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return SurveyResults::default();
    };

    let mut options = BTreeMap::new();
    for entry in raw
        .get("options")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(option_id) = entry
            .get("option_id")
            .and_then(coerce_id)
            .or_else(|| entry.get("id").and_then(coerce_id))
        else {
            continue;
        };

        options.insert(
            option_id,
            OptionTally {
                count: coerce_number(entry.get("count")),
                percent: coerce_number(entry.get("percent")),
                label: entry
                    .get("label")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        );
    }

    SurveyResults {
        total: coerce_number(raw.get("total_votes")),
        options,
    }
}

fn coerce_id(value: &Value) -> Option<OptionId> {
    match value {
        Value::Number(n) => n.as_i64().map(OptionId),
        Value::String(s) => s.trim().parse().ok().map(OptionId),
        _ => None,
    }
}

/// Finite number from a JSON number or numeric string, else 0.
fn coerce_number(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(f64::from(u8::from(*b))),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub option_id: OptionId,
    pub label: String,
    pub tone: OptionTone,
    pub count: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultSegment {
    pub option_id: OptionId,
    pub tone: OptionTone,
    /// Width of the segment as a share of the bar.
    pub percent: f64,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    pub total: f64,
    pub rows: Vec<ResultRow>,
    pub segments: Vec<ResultSegment>,
}

impl ResultView {
    /// Rows follow the detail's option order; result entries for ids the
    /// detail does not know are skipped.
    pub fn build(detail: Option<&SurveyDetail>, results: &SurveyResults) -> Self {
        let sorted = detail.map(SurveyDetail::sorted_options).unwrap_or_default();

        let rows: Vec<ResultRow> = sorted
            .into_iter()
            .enumerate()
            .map(|(index, option)| {
                let tally = results.tally(option.id).cloned().unwrap_or_default();
                ResultRow {
                    option_id: option.id,
                    label: option.label,
                    tone: OptionTone::for_position(index),
                    count: tally.count,
                    percent: tally.percent,
                }
            })
            .collect();

        let segments = rows
            .iter()
            .filter(|row| row.percent > 0.0)
            .map(|row| ResultSegment {
                option_id: row.option_id,
                tone: row.tone,
                percent: row.percent,
                caption: (row.percent > SEGMENT_CAPTION_MIN_PERCENT)
                    .then(|| format!("{}({}%)", row.label, format_number(row.percent))),
            })
            .collect();

        Self {
            total: results.total,
            rows,
            segments,
        }
    }

    pub fn has_votes(&self) -> bool {
        self.total > 0.0
    }
}

/// `70` for whole numbers, `33.3` otherwise. Used for counts and shares.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let rendered = format!("{value:.2}");
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

#[cfg(test)]
#[path = "tests/results_tests.rs"]
mod tests;
