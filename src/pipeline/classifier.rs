//! Classification pipeline: keyword rules first, model fallback second.
//!
//! The pipeline always produces a `Draft`. Any model failure (transport,
//! unparseable output, schema violation) degrades to `Draft::fallback()`,
//! which can never pass the approval guardrail.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{Draft, Intent};

/// Max tokens for the draft call (short replies only).
const DRAFT_MAX_TOKENS: u32 = 400;

/// Temperature for drafting (deterministic-ish).
const DRAFT_TEMPERATURE: f32 = 0.2;

/// Inbound text is truncated to this many characters before prompting.
const MAX_PROMPT_CHARS: usize = 2000;

/// Model-backed draft generator.
#[async_trait]
pub trait DraftModel: Send + Sync {
    async fn generate_draft(&self, text: &str) -> Result<Draft, PipelineError>;
}

/// `DraftModel` backed by an `LlmProvider`.
pub struct LlmDraftModel {
    llm: Arc<dyn LlmProvider>,
}

impl LlmDraftModel {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DraftModel for LlmDraftModel {
    async fn generate_draft(&self, text: &str) -> Result<Draft, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_draft_system_prompt()),
            ChatMessage::user(build_draft_user_prompt(text)),
        ])
        .with_temperature(DRAFT_TEMPERATURE)
        .with_max_tokens(DRAFT_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Draft model responded"
        );
        parse_draft_response(&response.content).map_err(PipelineError::Classification)
    }
}

/// Rules-then-model classification.
pub struct ClassificationPipeline {
    rules: RulesEngine,
    model: Option<Arc<dyn DraftModel>>,
}

impl ClassificationPipeline {
    pub fn new(rules: RulesEngine, model: Option<Arc<dyn DraftModel>>) -> Self {
        Self { rules, model }
    }

    /// Classify inbound text. Never fails.
    pub async fn classify(&self, text: &str) -> Draft {
        if let Some(draft) = self.rules.evaluate(text) {
            return draft;
        }

        let Some(model) = &self.model else {
            debug!("No rule matched and no model configured, using fallback draft");
            return Draft::fallback();
        };

        match model.generate_draft(text).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(error = %e, "Draft model failed, using fallback draft");
                Draft::fallback()
            }
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_draft_system_prompt() -> String {
    "You are a customer-messaging assistant for a small online business. \
     Classify the customer's direct message and draft a short, friendly reply.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"intent\": \"...\", \"confidence\": 0.0, \"reply\": \"...\", \"needs_human_approval\": false}\n\n\
     Rules:\n\
     - intent must be one of: general_question, pricing, order_support, shipping, refund, unknown\n\
     - confidence is a number between 0.0 and 1.0\n\
     - reply is plain text, at most 3 sentences, no promises about money or dates\n\
     - set needs_human_approval to true for complaints, personal topics, or anything you are unsure about"
        .to_string()
}

fn build_draft_user_prompt(text: &str) -> String {
    let preview: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    format!("Customer message:\n{preview}")
}

// ── Response parsing ────────────────────────────────────────────────

/// Strict shape of the model's JSON answer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DraftResponse {
    intent: Intent,
    confidence: f32,
    reply: String,
    needs_human_approval: bool,
}

/// Parse and validate the model output.
fn parse_draft_response(raw: &str) -> Result<Draft, String> {
    let json_str = extract_json_object(raw);
    let response: DraftResponse =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
        return Err(format!("confidence {} outside [0, 1]", response.confidence));
    }
    let reply = response.reply.trim();
    if reply.is_empty() {
        return Err("reply is empty".into());
    }

    Ok(Draft {
        intent: response.intent,
        confidence: response.confidence,
        reply: reply.to_string(),
        needs_human_approval: response.needs_human_approval,
    })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
