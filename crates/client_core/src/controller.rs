//! Survey detail flow: initial load, the `choose → reason → done → result`
//! voting state machine, and result refreshes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::domain::{OptionId, SurveyId};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::{
    error::ClientError,
    period::{check_period, PeriodStatus},
    results::{ResultView, SurveyResults},
    types::SurveyDetail,
    SurveyApi,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Choose,
    Reason,
    Done,
    Result,
}

/// How navigation arrived at the detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryMode {
    #[default]
    Vote,
    ShowResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    Failed,
    /// The view went away first; nothing was applied.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    /// Stayed in the view and returned to option selection.
    ToChoose,
    /// The caller should leave the detail view.
    Exit,
}

/// Owned by whoever owns the view. Cancelling it tells in-flight loads to
/// drop their results instead of applying them.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no option selected")]
    NoSelection,
    #[error("option {0} is not part of this survey")]
    UnknownOption(OptionId),
    #[error("{}", .0.message())]
    OutsidePeriod(PeriodStatus),
    #[error("cannot {action} while in {step:?} step")]
    InvalidTransition { step: Step, action: &'static str },
    #[error(transparent)]
    Api(#[from] ClientError),
}

impl ControllerError {
    /// Text for a transient alert.
    pub fn user_message(&self) -> String {
        match self {
            ControllerError::Api(err) => err.explain(),
            other => other.to_string(),
        }
    }
}

pub struct SurveyDetailController {
    api: Arc<dyn SurveyApi>,
    survey_id: SurveyId,
    span: Span,
    step: Step,
    selected_option: Option<OptionId>,
    reason: String,
    detail: Option<SurveyDetail>,
    results: SurveyResults,
    loading: bool,
    load_error: Option<String>,
}

impl SurveyDetailController {
    pub fn new(api: Arc<dyn SurveyApi>, survey_id: SurveyId, entry: EntryMode) -> Self {
        let span = info_span!("survey_detail", survey_id = survey_id.0);
        Self {
            api,
            survey_id,
            span,
            step: match entry {
                EntryMode::Vote => Step::Choose,
                EntryMode::ShowResult => Step::Result,
            },
            selected_option: None,
            reason: String::new(),
            detail: None,
            results: SurveyResults::default(),
            loading: true,
            load_error: None,
        }
    }

    /// Routes all diagnostics of this controller through `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn survey_id(&self) -> SurveyId {
        self.survey_id
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn selected_option(&self) -> Option<OptionId> {
        self.selected_option
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn detail(&self) -> Option<&SurveyDetail> {
        self.detail.as_ref()
    }

    pub fn results(&self) -> &SurveyResults {
        &self.results
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Page-level banner text after a failed load.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn period_status(&self, now: DateTime<Utc>) -> PeriodStatus {
        check_period(now, self.detail.as_ref())
    }

    pub fn result_view(&self) -> ResultView {
        ResultView::build(self.detail.as_ref(), &self.results)
    }

    /// Loads detail and results. If `cancel` fires before the fetches
    /// finish, the outcome is discarded and no state is touched.
    pub async fn load(&mut self, cancel: &CancelToken) -> LoadOutcome {
        if cancel.is_cancelled() {
            return LoadOutcome::Cancelled;
        }
        self.loading = true;
        self.load_error = None;

        let span = self.span.clone();
        let fetched = fetch_detail_and_results(self.api.as_ref(), self.survey_id)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        if cancel.is_cancelled() {
            debug!("view closed before load finished; discarding");
            return LoadOutcome::Cancelled;
        }

        self.loading = false;
        match fetched {
            Ok((detail, results)) => {
                info!(
                    options = detail.options.len(),
                    total_votes = results.total,
                    "survey detail loaded"
                );
                self.detail = Some(detail);
                self.results = results;
                LoadOutcome::Applied
            }
            Err(err) => {
                warn!("survey detail/results failed: {err}");
                self.load_error = Some(format!(
                    "failed to load survey detail/results. {}",
                    err.explain()
                ));
                LoadOutcome::Failed
            }
        }
    }

    /// `choose → reason`; re-selecting in `reason` overwrites the choice.
    pub fn select(&mut self, option_id: OptionId) -> Result<(), ControllerError> {
        if !matches!(self.step, Step::Choose | Step::Reason) {
            return Err(self.invalid("select an option"));
        }
        if let Some(detail) = &self.detail {
            if !detail.has_option(option_id) {
                return Err(ControllerError::UnknownOption(option_id));
            }
        }
        self.selected_option = Some(option_id);
        self.step = Step::Reason;
        Ok(())
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
    }

    /// `reason → choose` keeps the selection and reason; any other step
    /// leaves the view.
    pub fn back(&mut self) -> BackAction {
        if self.step == Step::Reason {
            self.step = Step::Choose;
            BackAction::ToChoose
        } else {
            BackAction::Exit
        }
    }

    pub async fn submit(&mut self) -> Result<(), ControllerError> {
        self.submit_at(Utc::now()).await
    }

    /// `reason → done` once the period check passes and the server accepts
    /// the vote. On failure the step stays `reason` so the vote can be
    /// retried as-is.
    pub async fn submit_at(&mut self, now: DateTime<Utc>) -> Result<(), ControllerError> {
        let span = self.span.clone();
        self.submit_inner(now).instrument(span).await
    }

    async fn submit_inner(&mut self, now: DateTime<Utc>) -> Result<(), ControllerError> {
        if self.step != Step::Reason {
            return Err(self.invalid("submit a vote"));
        }
        let option_id = self.selected_option.ok_or(ControllerError::NoSelection)?;

        let period = self.period_status(now);
        if !period.is_valid() {
            info!(?period, "vote blocked by period check");
            return Err(ControllerError::OutsidePeriod(period));
        }

        if let Err(err) = self
            .api
            .submit_vote(self.survey_id, option_id, Some(self.reason.as_str()))
            .await
        {
            warn!(option_id = option_id.0, "vote failed: {err}");
            return Err(err.into());
        }

        self.refresh_results().await;
        self.step = Step::Done;
        Ok(())
    }

    /// `done → result`, refreshing results on the way. A failed refresh
    /// keeps whatever results were already held.
    pub async fn view_results(&mut self) -> Result<(), ControllerError> {
        if self.step != Step::Done {
            return Err(self.invalid("view results"));
        }
        let span = self.span.clone();
        self.refresh_results().instrument(span).await;
        self.step = Step::Result;
        Ok(())
    }

    /// Best-effort re-fetch of the aggregate; returns whether it succeeded.
    pub async fn refresh_results(&mut self) -> bool {
        match self.api.fetch_results(self.survey_id).await {
            Ok(results) => {
                self.results = results;
                true
            }
            Err(err) => {
                debug!("results refresh failed, keeping previous results: {err}");
                false
            }
        }
    }

    fn invalid(&self, action: &'static str) -> ControllerError {
        ControllerError::InvalidTransition {
            step: self.step,
            action,
        }
    }
}

async fn fetch_detail_and_results(
    api: &dyn SurveyApi,
    survey_id: SurveyId,
) -> Result<(SurveyDetail, SurveyResults), ClientError> {
    let mut detail = api.fetch_detail(survey_id).await?;
    if detail.options.is_empty() {
        match api.fetch_options(survey_id).await {
            Ok(options) => detail.options = options,
            Err(err) => warn!("failed to fetch options separately: {err}"),
        }
    }
    let results = api.fetch_results(survey_id).await?;
    Ok((detail, results))
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
