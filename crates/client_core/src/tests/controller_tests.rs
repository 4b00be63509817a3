use super::*;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::Duration;
use reqwest::StatusCode;
use shared::{
    domain::SurveyStatus,
    protocol::{CreateSurveyRequest, CreatedSurvey, SurveyOption, SurveySummary, VerifyCodeResponse},
};
use tokio::sync::Notify;

use crate::{period::VotePeriod, results::OptionTally};

const SURVEY: SurveyId = SurveyId(42);

fn option(id: i64, order_num: i64, label: &str) -> SurveyOption {
    SurveyOption {
        id: OptionId(id),
        label: label.to_string(),
        order_num,
    }
}

fn sample_detail(options: Vec<SurveyOption>) -> SurveyDetail {
    SurveyDetail {
        id: SURVEY,
        title: "New crosswalk on Main St.".to_string(),
        description: "Should the district add a crosswalk?".to_string(),
        agency_name: Some("District office".to_string()),
        period: VotePeriod::default(),
        options,
    }
}

fn results(total: u64, tallies: &[(i64, u64, f64)]) -> SurveyResults {
    SurveyResults {
        total: total as f64,
        options: tallies
            .iter()
            .map(|(id, count, percent)| {
                (
                    OptionId(*id),
                    OptionTally {
                        count: *count as f64,
                        percent: *percent,
                        label: None,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

fn rejected(status: u16, message: &str) -> ClientError {
    ClientError::rejected(StatusCode::from_u16(status).expect("status"), message)
}

/// Scripted stand-in for the survey service.
struct FakeApi {
    detail: Option<SurveyDetail>,
    options: Option<Vec<SurveyOption>>,
    results: Mutex<VecDeque<Option<SurveyResults>>>,
    vote_failures: Mutex<VecDeque<ClientError>>,
    votes: Mutex<Vec<(OptionId, Option<String>)>>,
    detail_gate: Option<Arc<Notify>>,
    detail_calls: AtomicUsize,
    options_calls: AtomicUsize,
    results_calls: AtomicUsize,
}

impl FakeApi {
    fn new(detail: SurveyDetail) -> Self {
        Self {
            detail: Some(detail),
            options: None,
            results: Mutex::new(VecDeque::new()),
            vote_failures: Mutex::new(VecDeque::new()),
            votes: Mutex::new(Vec::new()),
            detail_gate: None,
            detail_calls: AtomicUsize::new(0),
            options_calls: AtomicUsize::new(0),
            results_calls: AtomicUsize::new(0),
        }
    }

    fn unreachable_detail() -> Self {
        let mut api = Self::new(sample_detail(Vec::new()));
        api.detail = None;
        api
    }

    /// Each results fetch pops one reply; `None` (or running out) fails.
    fn with_results(self, replies: Vec<Option<SurveyResults>>) -> Self {
        *self.results.lock().expect("lock") = replies.into();
        self
    }

    fn with_options(mut self, options: Vec<SurveyOption>) -> Self {
        self.options = Some(options);
        self
    }

    fn with_vote_failure(self, err: ClientError) -> Self {
        self.vote_failures.lock().expect("lock").push_back(err);
        self
    }

    fn with_detail_gate(mut self, gate: Arc<Notify>) -> Self {
        self.detail_gate = Some(gate);
        self
    }

    fn votes(&self) -> Vec<(OptionId, Option<String>)> {
        self.votes.lock().expect("lock").clone()
    }
}

#[async_trait]
impl SurveyApi for FakeApi {
    async fn list_surveys(&self, _status: SurveyStatus) -> Result<Vec<SurveySummary>, ClientError> {
        Ok(Vec::new())
    }

    async fn fetch_detail(&self, _survey_id: SurveyId) -> Result<SurveyDetail, ClientError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.detail_gate {
            gate.notified().await;
        }
        self.detail
            .clone()
            .ok_or_else(|| ClientError::Network("connection refused".to_string()))
    }

    async fn fetch_options(&self, _survey_id: SurveyId) -> Result<Vec<SurveyOption>, ClientError> {
        self.options_calls.fetch_add(1, Ordering::SeqCst);
        self.options.clone().ok_or_else(|| rejected(404, "Not Found"))
    }

    async fn fetch_results(&self, _survey_id: SurveyId) -> Result<SurveyResults, ClientError> {
        self.results_calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .expect("lock")
            .pop_front()
            .flatten()
            .ok_or_else(|| rejected(500, "results unavailable"))
    }

    async fn submit_vote(
        &self,
        _survey_id: SurveyId,
        option_id: OptionId,
        reason: Option<&str>,
    ) -> Result<(), ClientError> {
        if let Some(err) = self.vote_failures.lock().expect("lock").pop_front() {
            return Err(err);
        }
        self.votes
            .lock()
            .expect("lock")
            .push((option_id, reason.map(str::to_string)));
        Ok(())
    }

    async fn create_survey(
        &self,
        _request: &CreateSurveyRequest,
    ) -> Result<CreatedSurvey, ClientError> {
        Ok(CreatedSurvey::default())
    }

    async fn verify_code(&self, _code: &str) -> Result<VerifyCodeResponse, ClientError> {
        Ok(VerifyCodeResponse::default())
    }
}

fn yes_no() -> Vec<SurveyOption> {
    vec![option(2, 1, "No"), option(1, 0, "Yes")]
}

async fn loaded(api: FakeApi) -> (Arc<FakeApi>, SurveyDetailController) {
    let api = Arc::new(api);
    let mut controller = SurveyDetailController::new(api.clone(), SURVEY, EntryMode::Vote);
    assert_eq!(
        controller.load(&CancelToken::new()).await,
        LoadOutcome::Applied
    );
    (api, controller)
}

#[tokio::test]
async fn entry_mode_picks_the_initial_step() {
    let api: Arc<dyn SurveyApi> = Arc::new(FakeApi::new(sample_detail(yes_no())));
    let vote = SurveyDetailController::new(api.clone(), SURVEY, EntryMode::Vote);
    let result = SurveyDetailController::new(api, SURVEY, EntryMode::ShowResult);

    assert_eq!(vote.step(), Step::Choose);
    assert_eq!(result.step(), Step::Result);
    assert!(vote.is_loading());
    assert_eq!(vote.period_status(Utc::now()), PeriodStatus::Loading);
}

#[tokio::test]
async fn load_applies_detail_and_results_in_display_order() {
    let api = FakeApi::new(sample_detail(yes_no()))
        .with_results(vec![Some(results(10, &[(1, 7, 70.0), (2, 3, 30.0)]))]);
    let (api, controller) = loaded(api).await;

    assert!(!controller.is_loading());
    assert_eq!(controller.load_error(), None);
    assert_eq!(api.options_calls.load(Ordering::SeqCst), 0);

    let view = controller.result_view();
    assert_eq!(view.total, 10.0);
    let rows: Vec<_> = view
        .rows
        .iter()
        .map(|row| (row.label.as_str(), row.percent))
        .collect();
    assert_eq!(rows, [("Yes", 70.0), ("No", 30.0)]);
}

#[tokio::test]
async fn load_fetches_options_separately_when_detail_has_none() {
    let api = FakeApi::new(sample_detail(Vec::new()))
        .with_options(yes_no())
        .with_results(vec![Some(SurveyResults::default())]);
    let (api, controller) = loaded(api).await;

    assert_eq!(api.options_calls.load(Ordering::SeqCst), 1);
    let detail = controller.detail().expect("detail");
    assert_eq!(detail.sorted_options()[0].label, "Yes");
}

#[tokio::test]
async fn failed_option_fallback_does_not_fail_the_load() {
    let api = FakeApi::new(sample_detail(Vec::new())).with_results(vec![Some(
        SurveyResults::default(),
    )]);
    let (api, controller) = loaded(api).await;

    assert_eq!(api.options_calls.load(Ordering::SeqCst), 1);
    assert!(controller.detail().expect("detail").options.is_empty());
}

#[tokio::test]
async fn load_failure_sets_page_error_and_stops_loading() {
    let api = Arc::new(FakeApi::unreachable_detail());
    let mut controller = SurveyDetailController::new(api, SURVEY, EntryMode::Vote);

    assert_eq!(
        controller.load(&CancelToken::new()).await,
        LoadOutcome::Failed
    );
    assert!(!controller.is_loading());
    let banner = controller.load_error().expect("banner");
    assert!(banner.starts_with("failed to load survey detail/results."));
    assert!(banner.contains("connection failed"));
    assert!(controller.detail().is_none());
}

#[tokio::test]
async fn results_failure_fails_the_whole_load() {
    let api = Arc::new(FakeApi::new(sample_detail(yes_no())).with_results(vec![None]));
    let mut controller = SurveyDetailController::new(api, SURVEY, EntryMode::Vote);

    assert_eq!(
        controller.load(&CancelToken::new()).await,
        LoadOutcome::Failed
    );
    assert!(controller.detail().is_none());
    assert!(controller
        .load_error()
        .expect("banner")
        .contains("[500 Internal Server Error] results unavailable"));
}

#[tokio::test]
async fn cancellation_mid_load_discards_everything() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(
        FakeApi::new(sample_detail(yes_no()))
            .with_results(vec![Some(results(10, &[(1, 7, 70.0)]))])
            .with_detail_gate(gate.clone()),
    );
    let mut controller = SurveyDetailController::new(api.clone(), SURVEY, EntryMode::Vote);
    let token = CancelToken::new();

    let (outcome, ()) = tokio::join!(controller.load(&token), async {
        token.cancel();
        gate.notify_one();
    });

    assert_eq!(outcome, LoadOutcome::Cancelled);
    assert_eq!(api.detail_calls.load(Ordering::SeqCst), 1);
    assert!(controller.detail().is_none());
    assert_eq!(controller.results(), &SurveyResults::default());
    assert_eq!(controller.load_error(), None);
}

#[tokio::test]
async fn already_cancelled_token_skips_the_fetch() {
    let api = Arc::new(FakeApi::new(sample_detail(yes_no())));
    let mut controller = SurveyDetailController::new(api.clone(), SURVEY, EntryMode::Vote);
    let token = CancelToken::new();
    token.cancel();
    token.cancelled().await;

    assert_eq!(controller.load(&token).await, LoadOutcome::Cancelled);
    assert_eq!(api.detail_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn select_back_and_reselect_keep_the_draft() {
    let api = FakeApi::new(sample_detail(yes_no())).with_results(vec![Some(
        SurveyResults::default(),
    )]);
    let (_, mut controller) = loaded(api).await;

    controller.select(OptionId(1)).expect("select");
    assert_eq!(controller.step(), Step::Reason);
    controller.set_reason("safer for kids");

    assert_eq!(controller.back(), BackAction::ToChoose);
    assert_eq!(controller.step(), Step::Choose);
    assert_eq!(controller.selected_option(), Some(OptionId(1)));
    assert_eq!(controller.reason(), "safer for kids");

    controller.select(OptionId(2)).expect("reselect");
    controller.select(OptionId(1)).expect("overwrite in reason");
    assert_eq!(controller.selected_option(), Some(OptionId(1)));
    assert_eq!(controller.step(), Step::Reason);

    controller.back();
    assert_eq!(controller.back(), BackAction::Exit);
}

#[tokio::test]
async fn selecting_an_unknown_option_is_rejected() {
    let api = FakeApi::new(sample_detail(yes_no())).with_results(vec![Some(
        SurveyResults::default(),
    )]);
    let (_, mut controller) = loaded(api).await;

    let err = controller.select(OptionId(99)).expect_err("unknown option");
    assert!(matches!(err, ControllerError::UnknownOption(OptionId(99))));
    assert_eq!(controller.step(), Step::Choose);
    assert_eq!(controller.selected_option(), None);
}

#[tokio::test]
async fn successful_vote_moves_to_done_with_fresh_results() {
    let api = FakeApi::new(sample_detail(yes_no())).with_results(vec![
        Some(results(0, &[])),
        Some(results(1, &[(1, 1, 100.0)])),
    ]);
    let (api, mut controller) = loaded(api).await;

    controller.select(OptionId(1)).expect("select");
    controller.set_reason("  safer for kids  ");
    controller.submit().await.expect("vote");

    assert_eq!(controller.step(), Step::Done);
    assert_eq!(controller.results().total, 1.0);
    assert_eq!(
        api.votes(),
        [(OptionId(1), Some("  safer for kids  ".to_string()))]
    );
}

#[tokio::test]
async fn rejected_vote_stays_in_reason_and_can_be_retried() {
    let api = FakeApi::new(sample_detail(yes_no()))
        .with_results(vec![Some(results(0, &[])), Some(results(1, &[(2, 1, 100.0)]))])
        .with_vote_failure(rejected(403, "period closed"));
    let (api, mut controller) = loaded(api).await;

    controller.select(OptionId(2)).expect("select");
    let err = controller.submit().await.expect_err("server rejects");

    let message = err.user_message();
    assert!(message.contains("403"), "{message}");
    assert!(message.contains("period closed"), "{message}");
    assert_eq!(controller.step(), Step::Reason);
    assert_eq!(controller.selected_option(), Some(OptionId(2)));
    assert!(api.votes().is_empty());

    controller.submit().await.expect("retry without reselecting");
    assert_eq!(controller.step(), Step::Done);
    assert_eq!(api.votes(), [(OptionId(2), Some(String::new()))]);
}

#[tokio::test]
async fn network_failure_on_vote_is_explained_generically() {
    let api = FakeApi::new(sample_detail(yes_no()))
        .with_results(vec![Some(results(0, &[]))])
        .with_vote_failure(ClientError::Network("tcp reset".to_string()));
    let (_, mut controller) = loaded(api).await;

    controller.select(OptionId(1)).expect("select");
    let err = controller.submit().await.expect_err("network");
    assert_eq!(err.user_message(), "network/server connection failed");
    assert_eq!(controller.step(), Step::Reason);
}

#[tokio::test]
async fn period_gate_blocks_before_contacting_the_server() {
    let mut detail = sample_detail(yes_no());
    let now = Utc::now();
    detail.period.end_at = Some(now - Duration::hours(1));
    let api = FakeApi::new(detail).with_results(vec![Some(results(0, &[]))]);
    let (api, mut controller) = loaded(api).await;

    controller.select(OptionId(1)).expect("select");
    let err = controller.submit_at(now).await.expect_err("ended");

    assert!(matches!(
        err,
        ControllerError::OutsidePeriod(PeriodStatus::Ended)
    ));
    assert_eq!(err.user_message(), "the survey has ended.");
    assert_eq!(controller.step(), Step::Reason);
    assert!(api.votes().is_empty());
}

#[tokio::test]
async fn period_gate_rejects_votes_before_the_start() {
    let mut detail = sample_detail(yes_no());
    let now = Utc::now();
    detail.period.start_at = Some(now + Duration::days(1));
    let api = FakeApi::new(detail).with_results(vec![Some(results(0, &[]))]);
    let (api, mut controller) = loaded(api).await;

    controller.select(OptionId(1)).expect("select");
    let err = controller.submit_at(now).await.expect_err("not started");

    assert_eq!(err.user_message(), "not currently in the survey period.");
    assert!(api.votes().is_empty());

    controller
        .submit_at(now + Duration::days(2))
        .await
        .expect("open once the window starts");
    assert_eq!(controller.step(), Step::Done);
}

#[tokio::test]
async fn submit_outside_reason_step_is_an_invalid_transition() {
    let api = FakeApi::new(sample_detail(yes_no())).with_results(vec![Some(results(0, &[]))]);
    let (api, mut controller) = loaded(api).await;

    let err = controller.submit().await.expect_err("nothing selected");
    assert!(matches!(
        err,
        ControllerError::InvalidTransition {
            step: Step::Choose,
            ..
        }
    ));
    assert!(api.votes().is_empty());
}

#[tokio::test]
async fn vote_counts_even_if_the_follow_up_refresh_fails() {
    let api = FakeApi::new(sample_detail(yes_no()))
        .with_results(vec![Some(results(4, &[(1, 4, 100.0)])), None]);
    let (_, mut controller) = loaded(api).await;

    controller.select(OptionId(1)).expect("select");
    controller.submit().await.expect("vote");

    assert_eq!(controller.step(), Step::Done);
    assert_eq!(controller.results().total, 4.0);
}

#[tokio::test]
async fn view_results_keeps_previous_results_when_refresh_fails() {
    let api = FakeApi::new(sample_detail(yes_no())).with_results(vec![
        Some(results(0, &[])),
        Some(results(5, &[(1, 3, 60.0), (2, 2, 40.0)])),
        None,
    ]);
    let (api, mut controller) = loaded(api).await;

    controller.select(OptionId(1)).expect("select");
    controller.submit().await.expect("vote");
    controller.view_results().await.expect("view results");

    assert_eq!(controller.step(), Step::Result);
    assert_eq!(api.results_calls.load(Ordering::SeqCst), 3);
    assert_eq!(controller.results().total, 5.0);
    let captions: Vec<_> = controller
        .result_view()
        .segments
        .into_iter()
        .filter_map(|segment| segment.caption)
        .collect();
    assert_eq!(captions, ["Yes(60%)", "No(40%)"]);
}

#[tokio::test]
async fn view_results_requires_the_done_step() {
    let api = FakeApi::new(sample_detail(yes_no())).with_results(vec![Some(results(0, &[]))]);
    let (_, mut controller) = loaded(api).await;

    let err = controller.view_results().await.expect_err("not done yet");
    assert!(matches!(err, ControllerError::InvalidTransition { .. }));
    assert_eq!(controller.step(), Step::Choose);
}
