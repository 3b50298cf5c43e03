//! Remote-model strategy: delegates the verdict to a hosted language model.

use super::{Classifier, ClassifyError};
use crate::config::RemoteConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed triage instruction sent as the system message. The model answers
/// with a single word so the verdict parse stays trivial.
const TRIAGE_INSTRUCTION: &str = "You are an emergency triage system. Your task is to identify \
immediate, life-threatening emergencies OR situations requiring urgent medical attention. \
Respond with the single word 'EMERGENCY' if the text mentions things like being trapped, fire, \
serious injury, can't breathe, heart attack, stroke, or a critical need for medical \
equipment/treatment like dialysis or oxygen. For all other cases, respond with the single \
word 'OK'.";

/// Verdict cap, one word either way.
const MAX_VERDICT_TOKENS: u32 = 10;

/// Chat-completions classifier with a bounded per-request timeout and at
/// most one retry on transient timeout.
#[derive(Debug)]
pub struct RemoteModelClassifier {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
    retry_on_timeout: bool,
}

impl RemoteModelClassifier {
    /// Build from config. Fails when the credential variable is unset, so a
    /// misconfigured remote strategy aborts at startup instead of skipping
    /// every record.
    pub fn new(config: &RemoteConfig) -> Result<Self, ClassifyError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ClassifyError::MissingCredential(config.api_key_env.clone()))?;

        let http = reqwest::Client::new();

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
            retry_on_timeout: config.retry_on_timeout,
        })
    }

    async fn request_verdict(&self, text: &str) -> Result<bool, ClassifyError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: TRIAGE_INSTRUCTION.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            max_tokens: MAX_VERDICT_TOKENS,
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClassifyError::Status(status));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        debug!(verdict = %content.trim(), "Remote model verdict");
        parse_verdict(&content)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ClassifyError {
        if e.is_timeout() {
            ClassifyError::Timeout(self.timeout)
        } else {
            ClassifyError::Http(e)
        }
    }
}

#[async_trait]
impl Classifier for RemoteModelClassifier {
    async fn classify(&self, text: &str) -> Result<bool, ClassifyError> {
        // Nothing to send. Same non-emergency treatment as the keyword path.
        if text.trim().is_empty() {
            return Ok(false);
        }

        match self.request_verdict(text).await {
            Err(ClassifyError::Timeout(bound)) if self.retry_on_timeout => {
                warn!(timeout = ?bound, "Classification request timed out, retrying once");
                self.request_verdict(text).await
            }
            other => other,
        }
    }

    fn name(&self) -> &str {
        "remote"
    }
}

/// Parse the model's single-word verdict.
///
/// `EMERGENCY` wins over `OK` when both occur, so a hedged answer never
/// downgrades a real emergency. Anything mentioning neither word is a
/// [`ClassifyError::Verdict`] — the record stays unclassified rather than
/// being guessed at.
fn parse_verdict(content: &str) -> Result<bool, ClassifyError> {
    let upper = content.trim().to_uppercase();
    if upper.contains("EMERGENCY") {
        Ok(true)
    } else if upper.contains("OK") {
        Ok(false)
    } else {
        Err(ClassifyError::Verdict(content.trim().to_string()))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_verdicts_parse() {
        assert!(parse_verdict("EMERGENCY").unwrap());
        assert!(!parse_verdict("OK").unwrap());
    }

    #[test]
    fn verdict_parse_tolerates_case_and_padding() {
        assert!(parse_verdict("  emergency\n").unwrap());
        assert!(!parse_verdict("Ok.").unwrap());
    }

    #[test]
    fn emergency_wins_over_ok_in_hedged_answers() {
        assert!(parse_verdict("OK to treat as EMERGENCY").unwrap());
    }

    #[test]
    fn unrecognized_verdict_is_an_error() {
        let err = parse_verdict("I am not sure about this one").unwrap_err();
        assert!(matches!(err, ClassifyError::Verdict(_)));
        assert!(matches!(parse_verdict("").unwrap_err(), ClassifyError::Verdict(_)));
    }

    #[test]
    fn missing_credential_fails_construction() {
        let config = RemoteConfig {
            api_key_env: "REPORT_TRIAGE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..RemoteConfig::default()
        };
        let err = RemoteModelClassifier::new(&config).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingCredential(_)));
    }

    #[test]
    fn chat_request_serializes_expected_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "system",
                content: "x".into(),
            }],
            max_tokens: MAX_VERDICT_TOKENS,
            temperature: 0.0,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["max_tokens"], 10);
        assert_eq!(value["messages"][0]["role"], "system");
    }
}
