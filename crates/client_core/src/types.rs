use chrono::{DateTime, Utc};
use shared::{
    domain::{OptionId, SurveyId},
    protocol::{SurveyOption, WireSurveyDetail},
};
use tracing::warn;

use crate::period::{parse_timestamp, VotePeriod};

pub const FALLBACK_AGENCY_NAME: &str = "agency";
pub const FALLBACK_TITLE: &str = "untitled";

/// A survey as the client works with it after the wire adapter has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyDetail {
    pub id: SurveyId,
    pub title: String,
    pub description: String,
    pub agency_name: Option<String>,
    pub period: VotePeriod,
    pub options: Vec<SurveyOption>,
}

impl SurveyDetail {
    /// Ascending `order_num`; ties keep server order.
    pub fn sorted_options(&self) -> Vec<SurveyOption> {
        sort_options(&self.options)
    }

    pub fn has_option(&self, option_id: OptionId) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }

    pub fn display_title(&self) -> &str {
        non_blank(&self.title).unwrap_or(FALLBACK_TITLE)
    }

    pub fn display_agency(&self) -> &str {
        self.agency_name
            .as_deref()
            .and_then(non_blank)
            .unwrap_or(FALLBACK_AGENCY_NAME)
    }
}

pub fn sort_options(options: &[SurveyOption]) -> Vec<SurveyOption> {
    let mut sorted = options.to_vec();
    sorted.sort_by_key(|option| option.order_num);
    sorted
}

fn non_blank(value: &str) -> Option<&str> {
    (!value.trim().is_empty()).then_some(value)
}

fn parse_bound(survey_id: SurveyId, field: &'static str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() && !raw.trim().is_empty() {
        warn!(survey_id = survey_id.0, field, raw, "ignoring unparseable period bound");
    }
    parsed
}

impl From<WireSurveyDetail> for SurveyDetail {
    fn from(wire: WireSurveyDetail) -> Self {
        let period = VotePeriod {
            start_at: parse_bound(wire.id, "start_at", wire.start_at.as_deref()),
            end_at: parse_bound(wire.id, "end_at", wire.end_at.as_deref()),
        };
        let description = wire
            .description
            .filter(|d| !d.is_empty())
            .or(wire.content)
            .unwrap_or_default();

        Self {
            id: wire.id,
            title: wire.title.unwrap_or_default(),
            description,
            agency_name: wire.agency_name,
            period,
            options: wire.options,
        }
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
