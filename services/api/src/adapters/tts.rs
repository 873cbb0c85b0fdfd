//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for the text-to-speech service.
//! It implements the `TextToSpeechService` port from the `core` crate.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;

use chatbot_core::ports::{PortError, PortResult, TextToSpeechService};

/// Synthesis is best-effort for callers, so it gets a tighter deadline.
const TTS_TIMEOUT: Duration = Duration::from_secs(30);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl OpenAiTtsAdapter {
    /// Creates a new `OpenAiTtsAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, voice: Voice) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Generates a vector of audio data (`Vec<u8>`) from the given text.
    /// A single attempt per call; failure here never fails a chat request.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>> {
        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            ..Default::default()
        };

        let response = tokio::time::timeout(TTS_TIMEOUT, self.client.audio().speech().create(request))
            .await
            .map_err(|_| PortError::Timeout("Text-to-speech timed out".to_string()))?
            .map_err(|e: OpenAIError| PortError::Upstream {
                message: format!("Text-to-speech failed: {e}"),
                transient: false,
            })?;

        Ok(response.bytes.to_vec())
    }
}
