//! HTTP client for the name-to-gender prediction service.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::pipeline::enrich::{Gender, GenderLookup, GenderOutcome, LookupResult};

/// JSON pointer to the predicted label in the service response.
const GENDER_POINTER: &str = "/data/Final/gender";

#[derive(Debug, Clone)]
pub struct GenderApiConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

/// One GET per name. The client timeout bounds every call, so a hung
/// request ends as [`GenderOutcome::Failed`] instead of stalling its worker.
#[derive(Debug, Clone)]
pub struct GenderApiClient {
    client: Client,
    url: Url,
}

impl GenderApiClient {
    /// # Errors
    /// Fails when the URL does not parse or the HTTP client cannot be built.
    pub fn new(config: GenderApiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build gender API HTTP client")?;

        let url = Url::parse(&config.url).context("invalid gender API URL")?;

        Ok(Self { client, url })
    }

    /// `?name=<name>&org=`; the same name always yields the same URL.
    fn request_url(&self, name: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("org", "");
        url
    }

    async fn predict(&self, name: &str) -> Result<Option<Gender>> {
        let response = self
            .client
            .get(self.request_url(name))
            .send()
            .await
            .context("gender API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("gender API returned error status {status}: {body}");
        }

        let body: Value = response
            .json()
            .await
            .context("failed to deserialize gender API response")?;

        Ok(body
            .pointer(GENDER_POINTER)
            .and_then(Value::as_str)
            .and_then(Gender::from_label))
    }
}

#[async_trait]
impl GenderLookup for GenderApiClient {
    async fn lookup(&self, name: &str) -> LookupResult {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            warn!("skipping gender lookup for an empty name");
            return LookupResult::new(name, GenderOutcome::Failed);
        }

        let outcome = match self.predict(trimmed).await {
            Ok(Some(gender)) => GenderOutcome::Resolved(gender),
            Ok(None) => GenderOutcome::Unknown,
            Err(error) => {
                warn!(name = trimmed, error = ?error, "gender lookup failed");
                GenderOutcome::Failed
            }
        };
        debug!(name = trimmed, outcome = %outcome, "gender lookup finished");

        LookupResult::new(name, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PREDICT_PATH: &str = "/tools/v1/predict/gender";

    fn test_config(server: &MockServer) -> GenderApiConfig {
        GenderApiConfig {
            url: format!("{}{PREDICT_PATH}", server.uri()),
            connect_timeout: Duration::from_secs(1),
            total_timeout: Duration::from_millis(300),
        }
    }

    fn prediction(gender: &str) -> Value {
        serde_json::json!({
            "data": {
                "Final": { "gender": gender, "conf": 0.93 },
                "FaceBook": { "gender": gender }
            }
        })
    }

    async fn lookup_against(server: &MockServer, name: &str) -> LookupResult {
        GenderApiClient::new(test_config(server))
            .expect("client should build")
            .lookup(name)
            .await
    }

    #[tokio::test]
    async fn resolved_gender_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PREDICT_PATH))
            .and(query_param("name", "Ama Qamata"))
            .and(query_param("org", ""))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction("female")))
            .expect(1)
            .mount(&server)
            .await;

        let result = lookup_against(&server, " Ama Qamata ").await;

        assert_eq!(result.outcome, GenderOutcome::Resolved(Gender::Female));
        assert_eq!(result.name, " Ama Qamata ");
    }

    #[tokio::test]
    async fn indeterminate_label_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction("UNKNOWN")))
            .mount(&server)
            .await;

        let result = lookup_against(&server, "Khosi Ngema").await;

        assert_eq!(result.outcome, GenderOutcome::Unknown);
    }

    #[tokio::test]
    async fn missing_gender_path_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PREDICT_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": {} })),
            )
            .mount(&server)
            .await;

        let result = lookup_against(&server, "Gail Mabalane").await;

        assert_eq!(result.outcome, GenderOutcome::Unknown);
    }

    #[tokio::test]
    async fn malformed_body_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;

        let result = lookup_against(&server, "Thabang Molaba").await;

        assert_eq!(result.outcome, GenderOutcome::Failed);
    }

    #[tokio::test]
    async fn server_error_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let result = lookup_against(&server, "Dillon Windvogel").await;

        assert_eq!(result.outcome, GenderOutcome::Failed);
    }

    #[tokio::test]
    async fn slow_response_times_out_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PREDICT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(prediction("male"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result = lookup_against(&server, "Natasha Thahane").await;

        assert_eq!(result.outcome, GenderOutcome::Failed);
    }

    #[tokio::test]
    async fn blank_name_fails_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction("male")))
            .expect(0)
            .mount(&server)
            .await;

        let result = lookup_against(&server, "   ").await;

        assert_eq!(result.outcome, GenderOutcome::Failed);
    }

    #[test]
    fn request_url_encodes_name_and_keeps_empty_org() {
        let client = GenderApiClient::new(GenderApiConfig {
            url: "https://predict.example/tools/v1/predict/gender".to_string(),
            connect_timeout: Duration::from_secs(1),
            total_timeout: Duration::from_secs(1),
        })
        .expect("client should build");

        let url = client.request_url("Anne Hathaway");

        assert_eq!(
            url.as_str(),
            "https://predict.example/tools/v1/predict/gender?name=Anne+Hathaway&org="
        );
        assert_eq!(client.request_url("Anne Hathaway"), url);
    }
}
