//! LLM-backed guidance generator.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::prompts::{PromptSet, request_hints};
use super::{GenerationContext, GuidanceGenerator, PromptTemplate};
use crate::error::LlmError;
use crate::llm::{CompletionRequest, FinishReason, LlmProvider};

/// Renders a template into chat messages and runs one completion.
pub struct LlmGuidanceGenerator {
    llm: Arc<dyn LlmProvider>,
    prompts: PromptSet,
}

impl LlmGuidanceGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, prompts: PromptSet) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl GuidanceGenerator for LlmGuidanceGenerator {
    async fn generate(
        &self,
        template: PromptTemplate,
        context: &GenerationContext,
    ) -> Result<String, LlmError> {
        let (max_tokens, temperature) = request_hints(template);
        let request = CompletionRequest::new(self.prompts.messages(template, context))
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);

        debug!(template = %template, model = self.llm.model_name(), "Requesting generation");
        let response = self.llm.complete(request).await?;

        info!(
            template = %template,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost_usd = %response.cost(self.llm.cost_per_token()),
            truncated = response.finish_reason == FinishReason::Length,
            "Generation complete"
        );

        let text = response.content.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: format!("empty {template} response"),
            });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use rust_decimal::Decimal;

    use crate::llm::{CompletionResponse, Role};

    /// Records the last request and answers with a fixed reply.
    struct RecordingLlm {
        reply: Result<String, ()>,
        last: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "recording"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            *self.last.lock().unwrap() = Some(request);
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 10,
                    output_tokens: 20,
                    finish_reason: FinishReason::Stop,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "recording".to_string(),
                    reason: "boom".to_string(),
                }),
            }
        }
    }

    fn generator(reply: Result<&str, ()>) -> (Arc<RecordingLlm>, LlmGuidanceGenerator) {
        let llm = Arc::new(RecordingLlm {
            reply: reply.map(str::to_string),
            last: Mutex::new(None),
        });
        let generator = LlmGuidanceGenerator::new(llm.clone(), PromptSet::default());
        (llm, generator)
    }

    fn ctx() -> GenerationContext {
        GenerationContext {
            question: "How do I find meaning in my work?".to_string(),
            ..GenerationContext::default()
        }
    }

    #[tokio::test]
    async fn advice_request_carries_hints() {
        let (llm, generator) = generator(Ok("  Long advice.  "));
        let text = generator.generate(PromptTemplate::Advice, &ctx()).await.unwrap();
        assert_eq!(text, "Long advice.");

        let request = llm.last.lock().unwrap().take().unwrap();
        assert_eq!(request.max_tokens, Some(2000));
        assert_eq!(request.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let (_llm, generator) = generator(Ok("   "));
        let err = generator.generate(PromptTemplate::Preview, &ctx()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let (_llm, generator) = generator(Err(()));
        let err = generator.generate(PromptTemplate::Oracle, &ctx()).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
