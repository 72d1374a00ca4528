//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::completion::message::AssistantContent;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Anthropic rejects requests without an explicit token budget.
const DEFAULT_MAX_TOKENS: u64 = 1024;

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut builder = self
            .model
            .completion_request(prompt)
            .max_tokens(request.max_tokens.map(u64::from).unwrap_or(DEFAULT_MAX_TOKENS));
        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response contained no text".into(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
        })
    }
}
