//! Bridges rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::costs::model_cost;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Wraps any rig `CompletionModel`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Map a rig error message to our error kinds. rig reports provider
/// failures as text, so status codes are matched in the message.
fn classify_error(provider: &str, message: String) -> LlmError {
    let lower = message.to_ascii_lowercase();
    if ["401", "unauthorized", "invalid api key", "invalid x-api-key", "authentication"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else if lower.contains("429") || lower.contains("rate limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: message,
        }
    }
}

/// rig does not surface a stop reason; an output that used the whole
/// token cap is taken as cut off.
fn finish_reason(max_tokens: Option<u32>, output_tokens: u32) -> FinishReason {
    if max_tokens.is_some_and(|cap| output_tokens >= cap) {
        FinishReason::Length
    } else {
        FinishReason::Stop
    }
}

/// Split our messages into (preamble, history, prompt) as rig expects them.
fn split_messages(
    messages: &[ChatMessage],
) -> Result<(Option<String>, Vec<Message>, Message), String> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));

    let mut turns: Vec<Message> = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(Message::user(m.content.clone())),
            Role::Assistant => Some(Message::assistant(m.content.clone())),
            Role::System => None,
        })
        .collect();

    let prompt = turns
        .pop()
        .ok_or_else(|| "request has no user or assistant messages".to_string())?;
    Ok((preamble, turns, prompt))
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        model_cost(&self.model_name).unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) =
            split_messages(&request.messages).map_err(|reason| LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason,
            })?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature as f64);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&self.model_name, e.to_string()))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "empty completion".to_string(),
            });
        }

        let output_tokens = response.usage.output_tokens as u32;
        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens,
            finish_reason: finish_reason(request.max_tokens, output_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_moves_system_to_preamble() {
        let msgs = vec![
            ChatMessage::system("be kind"),
            ChatMessage::user("q"),
            ChatMessage::assistant("follow-up?"),
            ChatMessage::user("answer"),
        ];
        let (preamble, history, _prompt) = split_messages(&msgs).unwrap();
        assert_eq!(preamble.as_deref(), Some("be kind"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn split_rejects_system_only() {
        let msgs = vec![ChatMessage::system("only system")];
        assert!(split_messages(&msgs).is_err());
    }

    #[test]
    fn provider_errors_are_classified() {
        let auth = classify_error(
            "gpt-4o",
            "ProviderError: 401 Unauthorized: Incorrect API key provided".to_string(),
        );
        assert!(matches!(auth, LlmError::AuthFailed { .. }));

        let limited = classify_error("gpt-4o", "HttpError: status 429 Too Many Requests".to_string());
        assert!(matches!(limited, LlmError::RateLimited { .. }));

        let other = classify_error("gpt-4o", "HttpError: connection reset".to_string());
        assert!(matches!(other, LlmError::RequestFailed { ref reason, .. } if reason.contains("reset")));
    }

    #[test]
    fn full_token_cap_means_truncated() {
        assert_eq!(finish_reason(Some(200), 200), FinishReason::Length);
        assert_eq!(finish_reason(Some(200), 120), FinishReason::Stop);
        assert_eq!(finish_reason(None, 5000), FinishReason::Stop);
    }
}
