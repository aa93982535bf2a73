use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

use crate::{Error, GenerationApi, Job, JobStatus, Result, StatusOutcome};

#[derive(Debug, Clone)]
pub struct ProxyClientConfig {
    /// Root of a running lumen server, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    pub submit_timeout: Duration,
    /// Per-call ceiling for status checks.
    pub status_timeout: Duration,
}

impl Default for ProxyClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            submit_timeout: Duration::from_secs(60),
            status_timeout: Duration::from_secs(10),
        }
    }
}

/// [`GenerationApi`] that talks to the proxy's own HTTP endpoints.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    config: ProxyClientConfig,
    http: Client,
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str)
}

/// Best-effort human readable message out of an error body.
fn error_message(body: &Value, fallback: &str) -> String {
    let error = field(body, "error").unwrap_or(fallback);
    match body.get("details") {
        Some(Value::String(details)) => format!("{error}: {details}"),
        Some(details) => match details.get("message").and_then(Value::as_str) {
            Some(message) => format!("{error}: {message}"),
            None => error.to_string(),
        },
        None => error.to_string(),
    }
}

impl ProxyClient {
    pub fn new(config: ProxyClientConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read(response: Response) -> Result<(StatusCode, Value)> {
        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "error": text }));
        Ok((status, body))
    }

    fn classify(status: StatusCode, body: &Value, fallback: &str) -> Error {
        let message = error_message(body, fallback);
        match status {
            StatusCode::BAD_REQUEST => Error::Validation(message),
            StatusCode::UNAUTHORIZED => Error::Auth(message),
            StatusCode::GATEWAY_TIMEOUT => Error::Timeout(message),
            _ => Error::Upstream(message),
        }
    }
}

#[async_trait]
impl GenerationApi for ProxyClient {
    async fn submit(&self, prompt: &str, model: &str) -> Result<Job> {
        let response = self
            .http
            .post(self.endpoint("/api/generate"))
            .timeout(self.config.submit_timeout)
            .json(&json!({ "prompt": prompt, "model": model }))
            .send()
            .await?;
        let (status, body) = Self::read(response).await?;

        if !status.is_success() {
            return Err(Self::classify(status, &body, "Failed to generate image"));
        }
        match field(&body, "id") {
            Some(id) if !id.is_empty() => Ok(Job {
                id: id.to_string(),
                status: JobStatus::Processing,
            }),
            _ => Err(Error::upstream("No generation ID received from the server")),
        }
    }

    async fn check_status(&self, job_id: &str) -> Result<StatusOutcome> {
        let response = self
            .http
            .get(self.endpoint("/api/status"))
            .timeout(self.config.status_timeout)
            .query(&[("id", job_id)])
            .send()
            .await?;
        let (status, body) = Self::read(response).await?;

        if status.is_success() {
            return match field(&body, "status") {
                Some("success") => field(&body, "imageUrl")
                    .map(|url| StatusOutcome::Success {
                        image_url: url.to_string(),
                    })
                    .ok_or_else(|| Error::upstream("Invalid status response structure")),
                Some(other) => Ok(StatusOutcome::Processing {
                    status: other.to_string(),
                }),
                None => Err(Error::upstream("Invalid status response structure")),
            };
        }

        // a job that failed upstream is reported with a distinct body shape
        if field(&body, "status") == Some("error") {
            return Ok(StatusOutcome::Failed {
                reason: body.get("error").cloned().unwrap_or(Value::Null),
            });
        }
        Err(Self::classify(status, &body, "Failed to check generation status"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::StatusCode as AxumStatus,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;

    async fn generate(Json(body): Json<Value>) -> impl IntoResponse {
        match (field(&body, "prompt"), field(&body, "model")) {
            (Some(""), _) => (
                AxumStatus::BAD_REQUEST,
                Json(json!({"error": "Prompt is required"})),
            ),
            (_, Some("flux")) => (
                AxumStatus::OK,
                Json(json!({"status": "processing", "id": "abc123"})),
            ),
            (_, Some("ideogram")) => (
                AxumStatus::UNAUTHORIZED,
                Json(json!({"error": "Authentication failed. Please check your Replicate API token."})),
            ),
            _ => (
                AxumStatus::BAD_REQUEST,
                Json(json!({"error": "Invalid model selected"})),
            ),
        }
    }

    async fn status(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
        match query.get("id").map(String::as_str) {
            Some("running") => (
                AxumStatus::OK,
                Json(json!({"status": "starting", "message": "Image is still being generated"})),
            ),
            Some("done") => (
                AxumStatus::OK,
                Json(json!({"status": "success", "imageUrl": "https://x/y.png"})),
            ),
            Some("failed") => (
                AxumStatus::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "error": "NSFW content detected"})),
            ),
            Some(_) => (
                AxumStatus::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to check generation status", "details": "boom"})),
            ),
            None => (
                AxumStatus::BAD_REQUEST,
                Json(json!({"error": "Prediction ID is required"})),
            ),
        }
    }

    async fn proxy() -> ProxyClient {
        let router = Router::new()
            .route("/api/generate", post(generate))
            .route("/api/status", get(status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        ProxyClient::new(ProxyClientConfig {
            base_url: format!("http://{addr}/"),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_decodes_job_and_errors() {
        let client = proxy().await;
        assert_eq!(
            client.submit("a red fox", "flux").await.unwrap(),
            Job {
                id: "abc123".to_string(),
                status: JobStatus::Processing
            }
        );
        assert_eq!(
            client.submit("", "flux").await.unwrap_err(),
            Error::Validation("Prompt is required".to_string())
        );
        assert_eq!(
            client.submit("a red fox", "dall-e").await.unwrap_err(),
            Error::Validation("Invalid model selected".to_string())
        );
        assert!(matches!(
            client.submit("a red fox", "ideogram").await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_check_status_shapes() {
        let client = proxy().await;
        assert_eq!(
            client.check_status("running").await.unwrap(),
            StatusOutcome::Processing {
                status: "starting".to_string()
            }
        );
        assert_eq!(
            client.check_status("done").await.unwrap(),
            StatusOutcome::Success {
                image_url: "https://x/y.png".to_string()
            }
        );
        assert_eq!(
            client.check_status("failed").await.unwrap(),
            StatusOutcome::Failed {
                reason: json!("NSFW content detected")
            }
        );
        assert_eq!(
            client.check_status("other").await.unwrap_err(),
            Error::Upstream("Failed to check generation status: boom".to_string())
        );
    }
}
