use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{AgencyId, OptionId, SurveyId, SurveyStatus};

/// Treats an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSurveysQuery {
    pub status: SurveyStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveySummary {
    pub id: SurveyId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyOption {
    pub id: OptionId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order_num: i64,
}

/// `GET /surveys/{id}` as it comes off the wire. Converted into the
/// client-side detail type in exactly one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSurveyDetail {
    pub id: SurveyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<SurveyOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub option_id: OptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opinion_text: Option<String>,
}

impl VoteRequest {
    /// Blank reasons are dropped so the field never goes out as `""`.
    pub fn new(option_id: OptionId, reason: Option<&str>) -> Self {
        let opinion_text = reason
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        Self {
            option_id,
            opinion_text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSurveyOption {
    pub label: String,
    pub order_num: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSurveyRequest {
    pub title: String,
    pub description: String,
    pub start_at: String,
    pub end_at: String,
    pub code: String,
    pub options: Vec<NewSurveyOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSurvey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SurveyId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_id: Option<AgencyId>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
