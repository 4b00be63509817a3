//! Admin survey creation: organization code verification and the draft
//! that becomes a `POST /surveys/` body.

use shared::{
    domain::AgencyId,
    protocol::{CreateSurveyRequest, CreatedSurvey, NewSurveyOption},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{error::ClientError, SurveyApi};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CodeStatus {
    #[default]
    Idle,
    /// Not alphanumeric; nothing was sent.
    Format,
    Checking,
    Verified {
        agency_name: String,
        agency_id: Option<AgencyId>,
    },
    Rejected,
}

impl CodeStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, CodeStatus::Verified { .. })
    }

    pub fn caption(&self) -> Option<String> {
        match self {
            CodeStatus::Verified { agency_name, .. } if !agency_name.is_empty() => {
                Some(format!("{agency_name} verified"))
            }
            CodeStatus::Format => Some("only letters and digits are allowed.".to_string()),
            CodeStatus::Rejected => Some("this code does not exist.".to_string()),
            _ => None,
        }
    }
}

pub fn is_code_format_ok(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Status the form should show for `code` before any request goes out.
pub fn precheck_code(code: &str) -> CodeStatus {
    if code.is_empty() {
        CodeStatus::Idle
    } else if !is_code_format_ok(code) {
        CodeStatus::Format
    } else {
        CodeStatus::Checking
    }
}

/// Resolves a code to its final status. Transport failures read as
/// rejection, same as an explicit `valid: false`.
pub async fn verify_code(api: &dyn SurveyApi, code: &str) -> CodeStatus {
    let code = code.trim();
    let pre = precheck_code(code);
    if pre != CodeStatus::Checking {
        return pre;
    }

    match api.verify_code(code).await {
        Ok(response) if response.valid => CodeStatus::Verified {
            agency_name: response.agency_name.unwrap_or_default(),
            agency_id: response.agency_id,
        },
        Ok(_) => CodeStatus::Rejected,
        Err(err) => {
            warn!("code verification failed: {err}");
            CodeStatus::Rejected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("organization code is not verified")]
    CodeNotVerified,
    #[error("title is required")]
    MissingTitle,
    #[error("content is required")]
    MissingContent,
    #[error("start time is required")]
    MissingStart,
    #[error("end time is required")]
    MissingEnd,
    #[error("both vote options need a label")]
    MissingOptionLabel,
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Api(#[from] ClientError),
}

/// Form state for a new two-option survey.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyDraft {
    pub code: String,
    pub title: String,
    pub content: String,
    /// `YYYY-MM-DDTHH:MM` from a datetime input, or a full timestamp.
    pub start_at: String,
    pub end_at: String,
    pub positive_label: String,
    pub negative_label: String,
}

impl SurveyDraft {
    pub fn check(&self, status: &CodeStatus) -> Result<(), DraftError> {
        if !status.is_verified() {
            return Err(DraftError::CodeNotVerified);
        }
        if self.title.trim().is_empty() {
            return Err(DraftError::MissingTitle);
        }
        if self.content.trim().is_empty() {
            return Err(DraftError::MissingContent);
        }
        if self.start_at.is_empty() {
            return Err(DraftError::MissingStart);
        }
        if self.end_at.is_empty() {
            return Err(DraftError::MissingEnd);
        }
        if self.positive_label.trim().is_empty() || self.negative_label.trim().is_empty() {
            return Err(DraftError::MissingOptionLabel);
        }
        Ok(())
    }

    pub fn can_submit(&self, status: &CodeStatus) -> bool {
        self.check(status).is_ok()
    }

    pub fn to_request(&self, status: &CodeStatus) -> Result<CreateSurveyRequest, DraftError> {
        self.check(status)?;
        Ok(CreateSurveyRequest {
            title: self.title.clone(),
            description: self.content.clone(),
            start_at: with_seconds(&self.start_at),
            end_at: with_seconds(&self.end_at),
            // Same trimming as `verify_code`, so the verified code is the one sent.
            code: self.code.trim().to_string(),
            options: vec![
                NewSurveyOption {
                    label: self.positive_label.trim().to_string(),
                    order_num: 0,
                },
                NewSurveyOption {
                    label: self.negative_label.trim().to_string(),
                    order_num: 1,
                },
            ],
        })
    }

    /// Validates, sends, and clears the draft once the server accepts it.
    pub async fn submit(
        &mut self,
        api: &dyn SurveyApi,
        status: &mut CodeStatus,
    ) -> Result<CreatedSurvey, CreateError> {
        let request = self.to_request(status)?;
        let created = api.create_survey(&request).await.map_err(|err| {
            warn!("survey registration failed: {err}");
            err
        })?;
        info!(title = %request.title, "survey registered");
        *self = SurveyDraft::default();
        *status = CodeStatus::Idle;
        Ok(created)
    }
}

/// Datetime inputs stop at minutes; the server wants seconds.
pub fn with_seconds(value: &str) -> String {
    if value.len() == 16 {
        format!("{value}:00")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
#[path = "tests/admin_tests.rs"]
mod tests;
