use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::evaluation::{
    CostEstimateRequest, CostEstimateResponse, EvaluationRequest, EvaluationResponse,
};

/// Judge calls may route through slow reasoning models.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Client for the external multi-judge scoring service.
pub struct JudgeServiceClient {
    http: Client,
    base_url: String,
}

impl JudgeServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, JudgeError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask every configured judge to score one candidate response.
    pub async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResponse, JudgeError> {
        self.post_json("/evaluate", request).await
    }

    /// Estimate what [`evaluate`](Self::evaluate) would cost for the same input.
    pub async fn estimate_cost(
        &self,
        request: &CostEstimateRequest,
    ) -> Result<CostEstimateResponse, JudgeError> {
        self.post_json("/estimate_cost", request).await
    }

    pub async fn health_check(&self) -> Result<(), JudgeError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        check_status(response).await.map(|_| ())
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, JudgeError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let body = check_status(response).await?.text().await?;
        serde_json::from_str(&body).map_err(JudgeError::Decode)
    }
}

/// Anything other than 200 is an error carrying the response body.
async fn check_status(response: Response) -> Result<Response, JudgeError> {
    let status = response.status();
    if status == reqwest::StatusCode::OK {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(JudgeError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Judge service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Judge service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode judge service response: {0}")]
    Decode(#[source] serde_json::Error),
}
