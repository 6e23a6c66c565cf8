use std::time::Duration;

use muse_contracts::campaign::AccessTier;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::BackendError;

/// Shared HTTP access to the Generative Language API.
///
/// Calls run to completion: the client is built without a request timeout
/// and nothing here retries.
#[derive(Clone)]
pub struct GeminiTransport {
    api_base: String,
    config: EngineConfig,
    http: HttpClient,
}

impl GeminiTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, BackendError> {
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|source| BackendError::Transport {
                backend: "http-client".to_string(),
                source,
            })?;
        Ok(Self {
            api_base: config.api_base.clone(),
            config: config.clone(),
            http,
        })
    }

    pub fn endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    pub fn post_json(
        &self,
        backend: &str,
        endpoint: &str,
        tier: AccessTier,
        payload: &Value,
    ) -> Result<Value, BackendError> {
        let api_key = self.config.key_for(tier).ok_or(BackendError::MissingApiKey)?;
        tracing::debug!(backend, endpoint, tier = %tier, "posting generation request");
        let response = self
            .http
            .post(endpoint)
            .header("x-goog-api-key", api_key)
            .json(payload)
            .send()
            .map_err(|source| BackendError::Transport {
                backend: backend.to_string(),
                source,
            })?;
        response_json_or_error(backend, response)
    }
}

fn response_json_or_error(backend: &str, response: HttpResponse) -> Result<Value, BackendError> {
    let status = response.status();
    let body = response.text().map_err(|source| BackendError::Transport {
        backend: backend.to_string(),
        source,
    })?;
    if !status.is_success() {
        let (api_status, message) = parse_api_error(&body);
        return Err(BackendError::Status {
            backend: backend.to_string(),
            status: status.as_u16(),
            api_status,
            message: message.unwrap_or_else(|| truncate_text(&body, 512)),
        });
    }
    serde_json::from_str(&body).map_err(|source| BackendError::InvalidJson {
        backend: backend.to_string(),
        source,
    })
}

/// Pulls `error.status` and `error.message` out of a Google API error body.
pub fn parse_api_error(body: &str) -> (Option<String>, Option<String>) {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let error = parsed.get("error");
    let field = |name: &str| {
        error
            .and_then(|error| error.get(name))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    (field("status"), field("message"))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() {
        let config = EngineConfig {
            api_base: "http://localhost:9000/v1beta".to_string(),
            ..EngineConfig::default()
        };
        let transport = GeminiTransport::new(&config).unwrap();
        assert_eq!(
            transport.endpoint("gemini-2.5-flash-image", "generateContent"),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            transport.endpoint(" models/imagen-3.0-generate-001 ", "predict"),
            "http://localhost:9000/v1beta/models/imagen-3.0-generate-001:predict"
        );
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let transport = GeminiTransport::new(&EngineConfig::default()).unwrap();
        let err = transport
            .post_json(
                "gemini",
                "http://127.0.0.1:9/unused",
                AccessTier::Standard,
                &Value::Null,
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::MissingApiKey));
    }

    #[test]
    fn api_error_body_is_parsed() {
        let body = r#"{"error": {"code": 403, "message": "Permission denied on model", "status": "PERMISSION_DENIED"}}"#;
        assert_eq!(
            parse_api_error(body),
            (
                Some("PERMISSION_DENIED".to_string()),
                Some("Permission denied on model".to_string())
            )
        );
        assert_eq!(parse_api_error("<html>bad gateway</html>"), (None, None));
        assert_eq!(parse_api_error(r#"{"error": {"status": ""}}"#), (None, None));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
