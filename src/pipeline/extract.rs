//! VLM interaction: send the pay stub to the model and parse its answer.
//!
//! The network call sits behind [`StubReader`] so the parsing and
//! error-tagging rules can be exercised without a live provider. The only
//! production implementation, [`LlmStubReader`], drives an edgequake-llm
//! provider.
//!
//! ## Failure model
//!
//! [`read_stub`] never returns `Err`. Transport failures, provider errors,
//! and unparseable replies all come back as an [`ExtractionOutcome`] with a
//! zeroed stub and a tagged [`ExtractionError`], so the caller shows a
//! message and the session stays usable.

use crate::config::TaxShieldConfig;
use crate::error::ExtractionError;
use crate::pipeline::clean::clean_json_reply;
use crate::pipeline::encode::encode_stub_image;
use crate::pipeline::upload::StubImage;
use crate::prompts::{DEFAULT_EXTRACTION_PROMPT, STUB_FIELDS};
use crate::stub::{ExtractedStub, StubAmounts};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Raw text reply from the model plus token accounting.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Anything that can turn a prompt and an image into a text reply.
#[async_trait]
pub trait StubReader: Send + Sync {
    async fn read(&self, prompt: &str, image: ImageData) -> Result<ModelReply, ExtractionError>;
}

/// [`StubReader`] backed by an edgequake-llm provider.
pub struct LlmStubReader {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmStubReader {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TaxShieldConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

#[async_trait]
impl StubReader for LlmStubReader {
    async fn read(&self, prompt: &str, image: ImageData) -> Result<ModelReply, ExtractionError> {
        // The prompt travels in the user turn next to the image: Gemini
        // ignores system turns on some vision models.
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];

        let call = self.provider.chat(&messages, Some(&self.options));
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => Ok(ModelReply {
                content: response.content,
                prompt_tokens: response.prompt_tokens as usize,
                completion_tokens: response.completion_tokens as usize,
            }),
            Ok(Err(e)) => Err(classify_provider_error(&e.to_string())),
            Err(_) => Err(ExtractionError::Transport {
                detail: format!("model call timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }
}

/// Result of one extraction attempt. Check `error` before trusting `stub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// Parsed stub; all-zero when `error` is set.
    pub stub: ExtractedStub,
    pub error: Option<ExtractionError>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl ExtractionOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert to a `Result`, for callers that treat a failed read as fatal.
    pub fn into_result(self) -> Result<ExtractedStub, ExtractionError> {
        match self.error {
            None => Ok(self.stub),
            Some(e) => Err(e),
        }
    }

    fn failed(error: ExtractionError, start: Instant) -> Self {
        Self {
            stub: ExtractedStub::default(),
            error: Some(error),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Send a validated pay-stub image to the model and parse the reply.
pub async fn read_stub(
    reader: &dyn StubReader,
    image: &StubImage,
    config: &TaxShieldConfig,
) -> ExtractionOutcome {
    let start = Instant::now();
    let prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACTION_PROMPT);

    let reply = match reader.read(prompt, encode_stub_image(image)).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Extraction call failed — {}", e);
            return ExtractionOutcome::failed(e, start);
        }
    };

    debug!(
        "Extraction reply: {} input tokens, {} output tokens, {} chars",
        reply.prompt_tokens,
        reply.completion_tokens,
        reply.content.len()
    );

    match parse_stub(&reply.content) {
        Ok(stub) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            info!("Pay stub read in {}ms", duration_ms);
            ExtractionOutcome {
                stub,
                error: None,
                input_tokens: reply.prompt_tokens,
                output_tokens: reply.completion_tokens,
                duration_ms,
            }
        }
        Err(e) => {
            warn!("Extraction reply rejected — {}", e);
            let mut outcome = ExtractionOutcome::failed(e, start);
            outcome.input_tokens = reply.prompt_tokens;
            outcome.output_tokens = reply.completion_tokens;
            outcome
        }
    }
}

/// Parse the model's reply into an [`ExtractedStub`].
///
/// Only a reply that is not a JSON object at all is an error. Inside the
/// object, identity fields that are missing, `null`, blank, or the string
/// `"null"` become `None`, and amounts that are missing or unparseable
/// become 0.0.
pub fn parse_stub(reply: &str) -> Result<ExtractedStub, ExtractionError> {
    let cleaned = clean_json_reply(reply);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| ExtractionError::Malformed {
        detail: e.to_string(),
    })?;
    let obj = value.as_object().ok_or_else(|| ExtractionError::Malformed {
        detail: format!("expected a JSON object, got {}", json_kind(&value)),
    })?;

    let missing = missing_fields(obj);
    if !missing.is_empty() {
        debug!("Reply omitted {}; treating as blank", missing.join(", "));
    }

    Ok(ExtractedStub {
        employee_name: text_field(obj, "employee_name"),
        employer_name: text_field(obj, "employer_name"),
        pay_period_end: text_field(obj, "pay_period_end"),
        amounts: StubAmounts::new(
            amount_field(obj, "ytd_overtime_income"),
            amount_field(obj, "ytd_double_time_income"),
            amount_field(obj, "ytd_tip_income"),
        ),
    })
}

/// Requested fields the reply left out, in prompt order.
fn missing_fields(obj: &Map<String, Value>) -> Vec<&'static str> {
    STUB_FIELDS
        .iter()
        .copied()
        .filter(|k| !obj.contains_key(*k))
        .collect()
}

/// Coerce a JSON value to a dollar amount, falling back to 0.0.
///
/// Numeric strings may carry `$`, thousands separators, and whitespace.
pub fn coerce_amount(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let stripped: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
                .collect();
            stripped.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    };
    if raw.is_finite() && raw > 0.0 {
        raw
    } else {
        0.0
    }
}

fn amount_field(obj: &Map<String, Value>, key: &str) -> f64 {
    coerce_amount(obj.get(key))
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(s.to_string())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Sort a provider error into transport vs. upstream.
///
/// edgequake-llm flattens reqwest failures into its own error type, so the
/// message is all that survives.
fn classify_provider_error(message: &str) -> ExtractionError {
    let lower = message.to_lowercase();
    let transport = ["connect", "network", "timed out", "timeout", "dns", "tls", "broken pipe"]
        .iter()
        .any(|needle| lower.contains(needle));
    if transport {
        ExtractionError::Transport {
            detail: message.to_string(),
        }
    } else {
        ExtractionError::Upstream {
            detail: message.to_string(),
        }
    }
}

/// Build `CompletionOptions` from the config.
fn build_options(config: &TaxShieldConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
