// ============================================================================
// HOSTED PREDICTIONS SERVICE: `JobService` over a Replicate-style REST API
// ============================================================================
//
//   POST {api_base}/predictions        {"version"|"model": …, "input": {…}}
//   GET  {api_base}/predictions/{id}   {"status": …, "output": …, "error": …}

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::truncate_text;
use crate::error::VisError;
use crate::jobs::{JobKind, JobService, PollReport};
use crate::settings::Settings;

pub struct ReplicateService {
    api_base: String,
    token: String,
    models: HashMap<JobKind, String>,
    http: Client,
}

impl ReplicateService {
    pub fn new(api_base: &str, token: &str, http: Client) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            models: HashMap::new(),
            http,
        }
    }

    /// Service configured with every model from `settings`.
    pub fn from_settings(settings: &Settings, http: Client) -> Result<Self, VisError> {
        if settings.api_token.is_empty() {
            return Err(VisError::Config(
                "REPLICATE_API_TOKEN is not set".to_string(),
            ));
        }
        let mut service = Self::new(&settings.api_base, &settings.api_token, http);
        for &kind in JobKind::all() {
            service = service.with_model(kind, settings.model_for(kind));
        }
        Ok(service)
    }

    pub fn with_model(mut self, kind: JobKind, model: &str) -> Self {
        self.models.insert(kind, model.trim().to_string());
        self
    }

    fn predictions_endpoint(&self) -> String {
        format!("{}/predictions", self.api_base)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }
}

impl JobService for ReplicateService {
    fn submit_job(&self, kind: JobKind, params: &Value) -> Result<String, VisError> {
        let model = self
            .models
            .get(&kind)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| VisError::Submission(format!("no model configured for {}", kind)))?;
        let body = prediction_body(model, params);
        let endpoint = self.predictions_endpoint();

        let response = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .map_err(|e| VisError::Submission(format!("{}: {}", endpoint, e)))?;
        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(VisError::Submission(format!(
                "{} returned {}: {}",
                endpoint,
                status,
                truncate_text(&text, 512)
            )));
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| VisError::Submission(format!("invalid prediction response: {}", e)))?;
        payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| VisError::Submission("prediction response missing id".to_string()))
    }

    fn poll_job(&self, id: &str) -> Result<PollReport, VisError> {
        let url = format!("{}/{}", self.predictions_endpoint(), id);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .map_err(|e| VisError::TransientPoll(format!("{}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VisError::TransientPoll(format!(
                "{} returned {}: {}",
                url,
                status,
                truncate_text(&body, 256)
            )));
        }
        let payload: Value = response
            .json()
            .map_err(|e| VisError::TransientPoll(format!("invalid poll response: {}", e)))?;
        Ok(parse_prediction(&payload))
    }
}

/// Request body for a model reference: `owner/name:version` and bare
/// version hashes use `version`; `owner/name` uses `model`.
pub fn prediction_body(model: &str, input: &Value) -> Value {
    let model = model.trim();
    if let Some((_, version)) = model.split_once(':') {
        json!({ "version": version, "input": input })
    } else if model.contains('/') {
        json!({ "model": model, "input": input })
    } else {
        json!({ "version": model, "input": input })
    }
}

/// Map a prediction payload onto a poll report.
pub fn parse_prediction(payload: &Value) -> PollReport {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    match status.as_str() {
        "succeeded" => match payload.get("output").and_then(first_output_url) {
            Some(result) => PollReport::Succeeded { result },
            None => PollReport::Failed {
                message: "prediction succeeded without output".to_string(),
            },
        },
        "failed" | "canceled" => {
            let message = match payload.get("error") {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(Value::Null) | None => format!("prediction {}", status),
                Some(other) => other.to_string(),
            };
            PollReport::Failed { message }
        }
        _ => PollReport::Running,
    }
}

/// First http(s) URL in a string, array or `{url|urls|output}` object.
fn first_output_url(value: &Value) -> Option<String> {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            trimmed.starts_with("http").then(|| trimmed.to_string())
        }
        Value::Array(rows) => rows.iter().find_map(first_output_url),
        Value::Object(obj) => ["url", "urls", "output"]
            .iter()
            .filter_map(|k| obj.get(*k))
            .find_map(first_output_url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_picks_version_or_model() {
        let input = json!({"image": "u"});
        assert_eq!(prediction_body("abc123", &input)["version"], "abc123");
        assert_eq!(prediction_body("owner/name:abc", &input)["version"], "abc");
        assert_eq!(prediction_body("stability-ai/sdxl", &input)["model"], "stability-ai/sdxl");
        assert_eq!(prediction_body("abc123", &input)["input"]["image"], "u");
    }

    #[test]
    fn running_states_map_to_running() {
        for s in ["starting", "processing", "", "queued"] {
            assert_eq!(parse_prediction(&json!({"status": s})), PollReport::Running);
        }
        assert_eq!(parse_prediction(&json!({})), PollReport::Running);
    }

    #[test]
    fn success_takes_first_url_from_array_output() {
        let report = parse_prediction(&json!({
            "status": "succeeded",
            "output": ["https://cdn.example/mask.png", "https://cdn.example/other.png"]
        }));
        assert_eq!(
            report,
            PollReport::Succeeded {
                result: "https://cdn.example/mask.png".into()
            }
        );
    }

    #[test]
    fn success_reads_nested_object_output() {
        let report = parse_prediction(&json!({
            "status": "succeeded",
            "output": {"combined_mask": null, "url": "https://cdn.example/m.png"}
        }));
        assert_eq!(
            report,
            PollReport::Succeeded {
                result: "https://cdn.example/m.png".into()
            }
        );
    }

    #[test]
    fn success_without_output_is_failure() {
        assert!(matches!(
            parse_prediction(&json!({"status": "succeeded", "output": null})),
            PollReport::Failed { .. }
        ));
    }

    #[test]
    fn failure_carries_service_message() {
        assert_eq!(
            parse_prediction(&json!({"status": "failed", "error": "NSFW content"})),
            PollReport::Failed {
                message: "NSFW content".into()
            }
        );
        assert_eq!(
            parse_prediction(&json!({"status": "canceled", "error": null})),
            PollReport::Failed {
                message: "prediction canceled".into()
            }
        );
    }

    mod http {
        use super::*;
        use crate::remote::test_server::{client, Reply, TestServer};

        fn service(server: &TestServer) -> ReplicateService {
            ReplicateService::new(&server.base_url, "r8_token", client())
                .with_model(JobKind::Detection, "owner/detector:abc123")
        }

        #[test]
        fn submit_returns_prediction_id() {
            let server = TestServer::start(vec![Reply::json(201, r#"{"id": "p1", "status": "starting"}"#)]);
            let id = service(&server)
                .submit_job(JobKind::Detection, &json!({"image": "https://store/base.jpg"}))
                .unwrap();
            assert_eq!(id, "p1");

            let request = &server.requests()[0];
            assert!(request.starts_with("POST /predictions "), "{}", request);
            assert!(request.to_ascii_lowercase().contains("authorization: token r8_token"));
            assert!(request.contains(r#""version":"abc123""#), "{}", request);
        }

        #[test]
        fn rejected_submit_is_a_submission_error() {
            let server = TestServer::start(vec![Reply::json(422, r#"{"detail": "invalid version"}"#)]);
            let err = service(&server)
                .submit_job(JobKind::Detection, &json!({}))
                .unwrap_err();
            assert!(matches!(&err, VisError::Submission(msg) if msg.contains("422") && msg.contains("invalid version")));
            assert_eq!(server.hits(), 1);
        }

        #[test]
        fn unconfigured_model_is_rejected_before_any_request() {
            let server = TestServer::start(vec![]);
            let err = service(&server)
                .submit_job(JobKind::LightingRefinement, &json!({}))
                .unwrap_err();
            assert_eq!(err.kind(), "SubmissionError");
            assert_eq!(server.hits(), 0);
        }

        #[test]
        fn poll_server_error_is_transient() {
            let server = TestServer::start(vec![Reply::json(502, "bad gateway")]);
            let err = service(&server).poll_job("p1").unwrap_err();
            assert!(matches!(err, VisError::TransientPoll(_)));
            assert!(server.requests()[0].starts_with("GET /predictions/p1 "));
        }

        #[test]
        fn poll_reads_prediction_state() {
            let server = TestServer::start(vec![Reply::json(
                200,
                r#"{"status": "succeeded", "output": ["https://cdn.example/out.png"]}"#,
            )]);
            assert_eq!(
                service(&server).poll_job("p1").unwrap(),
                PollReport::Succeeded {
                    result: "https://cdn.example/out.png".into()
                }
            );
        }
    }
}
