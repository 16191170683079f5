use crate::ai::TextGenerator;
use crate::config::AiBackend;
use crate::errors::DashError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const RESPONSE_MARKER: &str = "\n---";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct GeminiGenerator {
    api_key: Option<String>,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

impl GeminiGenerator {
    pub fn new(api_key: Option<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key,
            endpoint: endpoint.into(),
        }
    }

    pub fn from_env(env: &[(String, String)]) -> Self {
        let api_key = env
            .iter()
            .find(|(key, _)| key == GEMINI_API_KEY_VAR)
            .map(|(_, value)| value.clone());
        Self::new(api_key, GEMINI_ENDPOINT)
    }

    fn api_key(&self) -> Result<&str, DashError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DashError::AiClient(format!("{GEMINI_API_KEY_VAR} is not set")))
    }
}

/// Concatenates every text part of every candidate and appends the marker.
pub fn response_to_text(response: &GenerateResponse) -> String {
    let mut text = String::new();
    for candidate in &response.candidates {
        let Some(content) = &candidate.content else {
            continue;
        };
        for part in &content.parts {
            if let Some(fragment) = &part.text {
                text.push_str(fragment);
            }
        }
    }
    text.push_str(RESPONSE_MARKER);
    text
}

impl TextGenerator for GeminiGenerator {
    fn backend(&self) -> AiBackend {
        AiBackend::Gemini
    }

    fn generate(&self, prompt: &str, model: &str) -> Result<String, DashError> {
        let api_key = self.api_key()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DashError::AiClient(e.to_string()))?;

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response = client
            .post(format!("{}/{model}:generateContent", self.endpoint))
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .map_err(|e| DashError::Ai(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DashError::Ai(format!("gemini returned {status}: {}", body.trim())));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| DashError::Ai(format!("invalid gemini response: {e}")))?;
        Ok(response_to_text(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::{response_to_text, GeminiGenerator, GenerateResponse, GEMINI_API_KEY_VAR};
    use crate::ai::TextGenerator;

    #[test]
    fn response_fragments_are_concatenated_with_marker() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[
                {"content":{"parts":[{"text":"Disk is "},{"text":"almost full."}]}},
                {"content":{"parts":[{"inlineData":{}}]}},
                {"finishReason":"SAFETY"}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(response_to_text(&response), "Disk is almost full.\n---");
        assert_eq!(response_to_text(&GenerateResponse::default()), "\n---");
    }

    #[test]
    fn missing_credential_is_a_fatal_client_error() {
        let generator = GeminiGenerator::from_env(&[(
            GEMINI_API_KEY_VAR.to_string(),
            " ".to_string(),
        )]);
        let err = generator.generate("p", "gemini-1.5-flash").expect_err("no key");
        assert!(err.is_fatal());
        assert!(err.to_string().contains(GEMINI_API_KEY_VAR));
    }
}
