use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{OptionId, SurveyId, SurveyStatus},
    error::server_message,
    protocol::{
        CreateSurveyRequest, CreatedSurvey, ListSurveysQuery, SurveyOption, SurveySummary,
        VerifyCodeRequest, VerifyCodeResponse, VoteRequest, WireSurveyDetail,
    },
};
use tracing::{debug, info, warn};

pub mod admin;
pub mod config;
pub mod controller;
pub mod error;
pub mod period;
pub mod results;
pub mod types;

pub use config::{load_settings, ClientSettings};
pub use controller::{CancelToken, ControllerError, EntryMode, LoadOutcome, Step, SurveyDetailController};
pub use error::ClientError;
pub use results::{normalize_results, ResultView, SurveyResults};
pub use types::SurveyDetail;

/// REST surface of the survey service. The controller only talks to this
/// trait so tests and other transports can stand in for HTTP.
#[async_trait]
pub trait SurveyApi: Send + Sync {
    async fn list_surveys(&self, status: SurveyStatus) -> Result<Vec<SurveySummary>, ClientError>;
    async fn fetch_detail(&self, survey_id: SurveyId) -> Result<SurveyDetail, ClientError>;
    async fn fetch_options(&self, survey_id: SurveyId) -> Result<Vec<SurveyOption>, ClientError>;
    async fn fetch_results(&self, survey_id: SurveyId) -> Result<SurveyResults, ClientError>;
    async fn submit_vote(
        &self,
        survey_id: SurveyId,
        option_id: OptionId,
        reason: Option<&str>,
    ) -> Result<(), ClientError>;
    async fn create_survey(
        &self,
        request: &CreateSurveyRequest,
    ) -> Result<CreatedSurvey, ClientError>;
    async fn verify_code(&self, code: &str) -> Result<VerifyCodeResponse, ClientError>;
}

pub struct HttpSurveyApi {
    http: Client,
    base_url: String,
}

impl HttpSurveyApi {
    /// Cookies set by the server are kept and sent back on every request.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let base_url = config::normalize_base_url(&settings.base_url)?;
        let http = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn detail_urls(&self, survey_id: SurveyId) -> Vec<String> {
        vec![self.url(&format!("/surveys/{survey_id}"))]
    }

    fn options_urls(&self, survey_id: SurveyId) -> Vec<String> {
        vec![self.url(&format!("/surveys/{survey_id}/options"))]
    }

    fn results_urls(&self, survey_id: SurveyId) -> Vec<String> {
        vec![self.url(&format!("/surveys/{survey_id}/results"))]
    }

    /// Tries each candidate in order and returns the first successful body.
    /// Earlier failures are dropped; only the last one reaches the caller.
    pub async fn try_get<T: DeserializeOwned>(&self, urls: &[String]) -> Result<T, ClientError> {
        self.try_get_with(urls, |body| Ok(serde_json::from_slice(body)?))
            .await
    }

    /// [`try_get`](Self::try_get) with a caller-supplied body parser. A parse
    /// failure moves on to the next candidate like any other failure.
    async fn try_get_with<T>(
        &self,
        urls: &[String],
        parse: impl Fn(&[u8]) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut last_err = None;
        for url in urls {
            match self.get_body(url).await.and_then(|body| parse(&body)) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(url = %url, "candidate url failed: {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(ClientError::NoCandidateUrls))
    }

    async fn get_body(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let response = send_checked(self.http.get(url)).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Sends the request and turns any non-2xx answer into
/// [`ClientError::Rejected`] carrying the server's explanation.
async fn send_checked(request: RequestBuilder) -> Result<Response, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::rejected(status, server_message(&body)))
}

#[async_trait]
impl SurveyApi for HttpSurveyApi {
    async fn list_surveys(&self, status: SurveyStatus) -> Result<Vec<SurveySummary>, ClientError> {
        let response = send_checked(
            self.http
                .get(self.url("/surveys/"))
                .query(&ListSurveysQuery { status }),
        )
        .await?;
        Ok(response.json().await?)
    }

    async fn fetch_detail(&self, survey_id: SurveyId) -> Result<SurveyDetail, ClientError> {
        let wire: WireSurveyDetail = self.try_get(&self.detail_urls(survey_id)).await?;
        Ok(wire.into())
    }

    async fn fetch_options(&self, survey_id: SurveyId) -> Result<Vec<SurveyOption>, ClientError> {
        let body: Value = self.try_get(&self.options_urls(survey_id)).await?;
        if !body.is_array() {
            warn!(survey_id = survey_id.0, "options endpoint did not return a list");
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(body)?)
    }

    async fn fetch_results(&self, survey_id: SurveyId) -> Result<SurveyResults, ClientError> {
        // A 2xx with no body is an empty aggregate, not a failed load.
        let body: Option<Value> = self
            .try_get_with(&self.results_urls(survey_id), |body| {
                if body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_slice(body)?))
            })
            .await?;
        Ok(normalize_results(body.as_ref()))
    }

    async fn submit_vote(
        &self,
        survey_id: SurveyId,
        option_id: OptionId,
        reason: Option<&str>,
    ) -> Result<(), ClientError> {
        let body = VoteRequest::new(option_id, reason);
        send_checked(
            self.http
                .post(self.url(&format!("/surveys/{survey_id}/vote")))
                .json(&body),
        )
        .await?;
        info!(
            survey_id = survey_id.0,
            option_id = option_id.0,
            with_opinion = body.opinion_text.is_some(),
            "vote accepted"
        );
        Ok(())
    }

    async fn create_survey(
        &self,
        request: &CreateSurveyRequest,
    ) -> Result<CreatedSurvey, ClientError> {
        let response =
            send_checked(self.http.post(self.url("/surveys/")).json(request)).await?;
        // Any 2xx counts as created; the body is informational.
        let bytes = response.bytes().await?;
        let created = serde_json::from_slice::<CreatedSurvey>(&bytes).unwrap_or_default();
        info!(survey_id = ?created.id.map(|id| id.0), title = %request.title, "survey created");
        Ok(created)
    }

    async fn verify_code(&self, code: &str) -> Result<VerifyCodeResponse, ClientError> {
        let response = send_checked(
            self.http
                .post(self.url("/surveys/verify-code"))
                .json(&VerifyCodeRequest {
                    code: code.to_string(),
                }),
        )
        .await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
