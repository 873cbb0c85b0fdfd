//! services/api/src/adapters/stt.rs
//!
//! This module contains the adapter for the speech-to-text service.
//! It implements the `SpeechToTextService` port from the `core` crate.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{AudioInput, CreateTranscriptionRequest},
    Client,
};
use async_trait::async_trait;

use chatbot_core::ports::{PortError, PortResult, SpeechToTextService};

/// Transcription gets a generous deadline; long clips take a while.
const STT_TIMEOUT: Duration = Duration::from_secs(60);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechToTextService` port using the OpenAI Whisper API.
#[derive(Clone)]
pub struct OpenAiSttAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSttAdapter {
    /// Creates a new `OpenAiSttAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `SpeechToTextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechToTextService for OpenAiSttAdapter {
    /// Transcribes an uploaded audio clip into text using the configured model.
    /// A single attempt per call; the caller decides whether failure is fatal.
    async fn transcribe_audio(&self, audio_data: &[u8], file_name: &str) -> PortResult<String> {
        let input = AudioInput::from_vec_u8(file_name.to_string(), audio_data.to_vec());

        let request = CreateTranscriptionRequest {
            file: input,
            model: self.model.clone(),
            ..Default::default()
        };

        let response = tokio::time::timeout(
            STT_TIMEOUT,
            self.client.audio().transcription().create(request),
        )
        .await
        .map_err(|_| PortError::Timeout("Transcription timed out".to_string()))?
        .map_err(|e: OpenAIError| PortError::Upstream {
            message: format!("Transcription failed: {e}"),
            transient: false,
        })?;

        let text = response.text.trim().to_string();
        if text.is_empty() {
            // Distinct from a transport failure: the call worked, the clip
            // just contained nothing usable.
            return Err(PortError::Validation(
                "Could not transcribe audio. Please ensure audio is clear and contains speech."
                    .to_string(),
            ));
        }
        Ok(text)
    }
}
