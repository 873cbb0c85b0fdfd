//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the generative chat model. It
//! implements the `GenerativeService` port from the `core` crate, wrapping
//! each remote call with a deadline and a bounded retry loop.

use std::future::Future;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::warn;

use chatbot_core::ports::{GenerativeService, PortError, PortResult};

/// Deadline for a single generation attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// One initial attempt plus two retries on transient failures.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff grows linearly: base delay times the attempt number.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

const MAX_OUTPUT_TOKENS: u32 = 512;
const TEMPERATURE: f32 = 0.9;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerativeService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn run_generation(&self, request: CreateChatCompletionRequest) -> PortResult<String> {
        call_with_retry("Chat generation", REQUEST_TIMEOUT, || {
            let request = request.clone();
            async move {
                let response = self
                    .client
                    .chat()
                    .create(request)
                    .await
                    .map_err(classify_openai_error)?;

                let text = response
                    .choices
                    .first()
                    .and_then(|choice| choice.message.content.clone())
                    .unwrap_or_default();

                if text.trim().is_empty() {
                    return Err(PortError::Upstream {
                        message: "Failed to generate response from AI".to_string(),
                        transient: false,
                    });
                }
                Ok(text)
            }
        })
        .await
    }
}

//=========================================================================================
// `GenerativeService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeService for OpenAiChatAdapter {
    async fn generate_text(&self, message: &str) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestUserMessageArgs::default()
                .content(format!("Reply helpfully: {message}"))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into()])
            .temperature(TEMPERATURE)
            .max_tokens(MAX_OUTPUT_TOKENS)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.run_generation(request).await
    }

    async fn generate_with_image(
        &self,
        message: &str,
        image: &[u8],
        mime_type: &str,
    ) -> PortResult<String> {
        // The image travels inline as a data URI; the encoded buffer is
        // owned by the request and dropped with it on every exit path.
        let data_uri = format!("data:{mime_type};base64,{}", BASE64.encode(image));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestUserMessageArgs::default()
                .content(vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(format!("Describe image and answer: {message}"))
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(
                            ImageUrlArgs::default()
                                .url(data_uri)
                                .detail(ImageDetail::Auto)
                                .build()
                                .map_err(|e| PortError::Unexpected(e.to_string()))?,
                        )
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?
                        .into(),
                ])
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into()])
            .temperature(TEMPERATURE)
            .max_tokens(MAX_OUTPUT_TOKENS)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.run_generation(request).await
    }
}

//=========================================================================================
// Failure Classification and Retry
//=========================================================================================

/// Decides transience at the boundary where the real failure type is known.
fn classify_openai_error(e: OpenAIError) -> PortError {
    match e {
        // Connection refused, DNS, broken transport: worth another attempt.
        OpenAIError::Reqwest(inner) => PortError::Upstream {
            message: inner.to_string(),
            transient: true,
        },
        OpenAIError::ApiError(api) => {
            let transient = matches!(
                api.r#type.as_deref(),
                Some("server_error") | Some("rate_limit_exceeded") | Some("overloaded_error")
            );
            PortError::Upstream {
                message: api.message,
                transient,
            }
        }
        other => PortError::Upstream {
            message: other.to_string(),
            transient: false,
        },
    }
}

/// Runs `op` under a per-attempt deadline, retrying transient failures with
/// linearly increasing backoff. Non-transient failures propagate untouched.
/// Exhausted retries surface as `Unavailable`, or `Timeout` when the final
/// attempt hit the deadline.
pub(crate) async fn call_with_retry<T, F, Fut>(
    what: &str,
    attempt_timeout: Duration,
    mut op: F,
) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    let mut last_err = PortError::Unavailable(format!("{what} failed"));

    for attempt in 1..=MAX_ATTEMPTS {
        match tokio::time::timeout(attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_transient() => {
                warn!("{what} attempt {attempt} failed: {e}");
                last_err = e;
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(
                    "{what} attempt {attempt} timed out after {:?}",
                    attempt_timeout
                );
                last_err = PortError::Timeout(format!("{what} timed out"));
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
        }
    }

    match last_err {
        timeout @ PortError::Timeout(_) => Err(timeout),
        e => Err(PortError::Unavailable(format!(
            "{what} failed after {MAX_ATTEMPTS} attempts: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient(msg: &str) -> PortError {
        PortError::Upstream {
            message: msg.to_string(),
            transient: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry("test call", Duration::from_secs(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(transient("connection reset"))
                } else {
                    Ok("answer".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: PortResult<String> =
            call_with_retry("test call", Duration::from_secs(5), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PortError::Validation("bad prompt".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(PortError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_unavailable() {
        let calls = AtomicU32::new(0);
        let result: PortResult<String> =
            call_with_retry("test call", Duration::from_secs(5), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient("connection reset")) }
            })
            .await;

        assert!(matches!(result, Err(PortError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_overruns_surface_as_timeout() {
        let result: PortResult<String> =
            call_with_retry("test call", Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            })
            .await;

        assert!(matches!(result, Err(PortError::Timeout(_))));
    }
}
