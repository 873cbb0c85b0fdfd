//! services/api/src/web/pipeline.rs
//!
//! The chat ingestion pipeline: classifies a submitted payload, drives it
//! through optional speech-to-text, the generative call, and optional
//! text-to-speech, persists exactly one turn, and assembles the history
//! readback. Nothing is persisted unless every required stage succeeded,
//! and media stored for a failed request is rolled back per stage.

use tracing::{info, warn};
use uuid::Uuid;

use crate::web::state::AppState;
use chatbot_core::domain::{ChatTurn, MessageKind, NewChatTurn};
use chatbot_core::ports::{PortError, PortResult};

/// Upper bound on the normalized request text.
pub const MAX_MESSAGE_CHARS: usize = 5000;
/// How many previous turns the readback returns alongside the new one.
const RECENT_HISTORY_LIMIT: i64 = 20;

/// An uploaded binary, already validated against the configured MIME
/// allow-list and size ceiling at the web layer.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub extension: String,
}

/// The classified input of one chat submission.
#[derive(Debug)]
pub enum ChatInput {
    Text { message: String },
    Image { message: String, image: MediaUpload },
    Voice { audio: MediaUpload },
}

/// The successful outcome: the persisted turn plus the history window.
#[derive(Debug)]
pub struct ChatExchange {
    pub current: ChatTurn,
    pub recent: Vec<ChatTurn>,
    pub total: i64,
}

/// Runs one submission through the pipeline. Sequential, no backtracking:
/// transcription and generation failures terminate the request with media
/// rollback, synthesis failure only degrades the reply.
pub async fn submit_turn(
    state: &AppState,
    user_id: Uuid,
    input: ChatInput,
) -> PortResult<ChatExchange> {
    match input {
        ChatInput::Text { message } => {
            let message = normalize_message(&message)?;
            let response = state.llm.generate_text(&message).await?;
            persist_and_assemble(
                state,
                NewChatTurn {
                    user_id,
                    message,
                    response,
                    kind: MessageKind::Text,
                    image_name: None,
                    voice_name: None,
                    response_audio_name: None,
                },
            )
            .await
        }

        ChatInput::Image { message, image } => {
            let message = normalize_message(&message)?;
            // Stored before the generative call so the request holds a
            // durable reference; rolled back if generation fails.
            let image_name = state.assets.save(&image.extension, &image.data).await?;
            let response = match state
                .llm
                .generate_with_image(&message, &image.data, &image.mime_type)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    if let Err(del) = state.assets.delete(&image_name).await {
                        warn!("Failed to roll back image asset {image_name}: {del}");
                    }
                    return Err(e);
                }
            };
            persist_and_assemble(
                state,
                NewChatTurn {
                    user_id,
                    message,
                    response,
                    kind: MessageKind::Image,
                    image_name: Some(image_name),
                    voice_name: None,
                    response_audio_name: None,
                },
            )
            .await
        }

        ChatInput::Voice { audio } => {
            let voice_name = state.assets.save(&audio.extension, &audio.data).await?;
            let transcript = match state.stt.transcribe_audio(&audio.data, &voice_name).await {
                Ok(transcript) => transcript,
                Err(e) => {
                    // No transcript means no usable input: remove the clip
                    // and fail. Failures past this point keep the clip.
                    if let Err(del) = state.assets.delete(&voice_name).await {
                        warn!("Failed to roll back voice asset {voice_name}: {del}");
                    }
                    return Err(e);
                }
            };
            info!("Transcribed voice message ({} chars)", transcript.len());

            let message = normalize_message(&transcript)?;
            let response = state.llm.generate_text(&message).await?;

            // Best-effort synthesis: a reply without audio is still a reply.
            let response_audio_name = match state.tts.generate_audio(&response).await {
                Ok(audio_bytes) => match state.assets.save("mp3", &audio_bytes).await {
                    Ok(name) => Some(name),
                    Err(e) => {
                        warn!("Failed to store synthesized reply audio: {e}");
                        None
                    }
                },
                Err(e) => {
                    warn!("Text-to-speech failed, returning reply without audio: {e}");
                    None
                }
            };

            persist_and_assemble(
                state,
                NewChatTurn {
                    user_id,
                    message,
                    response,
                    kind: MessageKind::Voice,
                    image_name: None,
                    voice_name: Some(voice_name),
                    response_audio_name,
                },
            )
            .await
        }
    }
}

/// Trims the raw text and enforces the non-empty / length rules.
pub fn normalize_message(raw: &str) -> PortResult<String> {
    let message = raw.trim();
    if message.is_empty() {
        return Err(PortError::Validation("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(PortError::Validation(format!(
            "Message is too long. Maximum {MAX_MESSAGE_CHARS} characters allowed."
        )));
    }
    Ok(message.to_string())
}

/// PERSIST and READBACK. The insert is attempted once; a store failure here
/// is surfaced to the caller rather than silently dropped or retried.
async fn persist_and_assemble(state: &AppState, turn: NewChatTurn) -> PortResult<ChatExchange> {
    let user_id = turn.user_id;
    let current = state.db.insert_turn(turn).await?;
    let recent = state
        .db
        .list_recent_turns(user_id, current.id, RECENT_HISTORY_LIMIT)
        .await?;
    let total = state.db.count_turns(user_id).await?;
    Ok(ChatExchange {
        current,
        recent,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::testing::{
        test_state, FakeAssets, FakeDb, FakeLlm, FakeStt, FakeTts, LlmBehavior, SttBehavior,
        TtsBehavior,
    };
    use std::sync::Arc;

    fn voice_clip() -> MediaUpload {
        MediaUpload {
            data: b"fake mp3 bytes".to_vec(),
            mime_type: "audio/mpeg".to_string(),
            extension: "mp3".to_string(),
        }
    }

    fn photo() -> MediaUpload {
        MediaUpload {
            data: b"fake png bytes".to_vec(),
            mime_type: "image/png".to_string(),
            extension: "png".to_string(),
        }
    }

    #[tokio::test]
    async fn text_submission_persists_single_text_turn() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("Hi there!".into())));
        let state = test_state(db.clone(), llm, FakeStt::ok(), FakeTts::ok(), FakeAssets::new());

        let user_id = Uuid::new_v4();
        let exchange = submit_turn(
            &state,
            user_id,
            ChatInput::Text {
                message: "  Hello  ".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(exchange.current.message, "Hello");
        assert_eq!(exchange.current.response, "Hi there!");
        assert_eq!(exchange.current.kind, MessageKind::Text);
        assert!(exchange.current.image_name.is_none());
        assert!(exchange.current.voice_name.is_none());
        assert!(exchange.current.response_audio_name.is_none());
        assert!(exchange.recent.is_empty());
        assert_eq!(exchange.total, 1);
        assert_eq!(db.turn_count(), 1);
    }

    #[tokio::test]
    async fn empty_message_fails_before_any_external_call() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("unused".into())));
        let state = test_state(
            db.clone(),
            llm.clone(),
            FakeStt::ok(),
            FakeTts::ok(),
            FakeAssets::new(),
        );

        let err = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Text {
                message: "   ".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(llm.calls(), 0);
        assert_eq!(db.turn_count(), 0);
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("unused".into())));
        let state = test_state(
            db.clone(),
            llm.clone(),
            FakeStt::ok(),
            FakeTts::ok(),
            FakeAssets::new(),
        );

        let err = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Text {
                message: "x".repeat(MAX_MESSAGE_CHARS + 1),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn image_generation_failure_rolls_back_the_stored_image() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Unavailable));
        let assets = FakeAssets::new();
        let state = test_state(db.clone(), llm, FakeStt::ok(), FakeTts::ok(), assets.clone());

        let err = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Image {
                message: "what is this".into(),
                image: photo(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PortError::Unavailable(_)));
        assert_eq!(db.turn_count(), 0);
        assert!(assets.stored_names().is_empty());
    }

    #[tokio::test]
    async fn image_success_keeps_the_asset_and_references_it() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("A cat.".into())));
        let assets = FakeAssets::new();
        let state = test_state(db.clone(), llm, FakeStt::ok(), FakeTts::ok(), assets.clone());

        let exchange = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Image {
                message: "what is this".into(),
                image: photo(),
            },
        )
        .await
        .unwrap();

        let image_name = exchange.current.image_name.clone().unwrap();
        assert_eq!(exchange.current.kind, MessageKind::Image);
        assert!(assets.stored_names().contains(&image_name));
    }

    #[tokio::test]
    async fn voice_transcription_failure_removes_the_clip_and_persists_nothing() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("unused".into())));
        let assets = FakeAssets::new();
        let state = test_state(
            db.clone(),
            llm.clone(),
            Arc::new(FakeStt::new(SttBehavior::Fail)),
            FakeTts::ok(),
            assets.clone(),
        );

        let err = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Voice { audio: voice_clip() },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PortError::Upstream { .. }));
        assert_eq!(db.turn_count(), 0);
        assert_eq!(llm.calls(), 0);
        assert!(assets.stored_names().is_empty());
    }

    #[tokio::test]
    async fn voice_generation_failure_keeps_the_transcribed_clip() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Unavailable));
        let assets = FakeAssets::new();
        let state = test_state(db.clone(), llm, FakeStt::ok(), FakeTts::ok(), assets.clone());

        let err = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Voice { audio: voice_clip() },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PortError::Unavailable(_)));
        assert_eq!(db.turn_count(), 0);
        // The clip survived transcription; only transcription failure
        // removes it.
        assert_eq!(assets.stored_names().len(), 1);
    }

    #[tokio::test]
    async fn synthesis_failure_still_persists_the_turn_without_audio() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("Spoken reply".into())));
        let assets = FakeAssets::new();
        let state = test_state(
            db.clone(),
            llm,
            FakeStt::ok(),
            Arc::new(FakeTts::new(TtsBehavior::Fail)),
            assets.clone(),
        );

        let exchange = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Voice { audio: voice_clip() },
        )
        .await
        .unwrap();

        assert_eq!(exchange.current.kind, MessageKind::Voice);
        assert!(exchange.current.voice_name.is_some());
        assert!(exchange.current.response_audio_name.is_none());
        assert_eq!(db.turn_count(), 1);
    }

    #[tokio::test]
    async fn successful_voice_turn_stores_the_reply_audio() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("Spoken reply".into())));
        let assets = FakeAssets::new();
        let state = test_state(db.clone(), llm, FakeStt::ok(), FakeTts::ok(), assets.clone());

        let exchange = submit_turn(
            &state,
            Uuid::new_v4(),
            ChatInput::Voice { audio: voice_clip() },
        )
        .await
        .unwrap();

        assert!(exchange.current.response_audio_name.is_some());
        // Input clip plus synthesized reply.
        assert_eq!(assets.stored_names().len(), 2);
    }

    #[tokio::test]
    async fn readback_excludes_the_new_turn_and_orders_newest_first() {
        let db = Arc::new(FakeDb::new());
        let llm = Arc::new(FakeLlm::new(LlmBehavior::Reply("latest".into())));
        let state = test_state(
            db.clone(),
            llm,
            FakeStt::ok(),
            FakeTts::ok(),
            FakeAssets::new(),
        );

        let user_id = Uuid::new_v4();
        for i in 0..3 {
            submit_turn(
                &state,
                user_id,
                ChatInput::Text {
                    message: format!("message {i}"),
                },
            )
            .await
            .unwrap();
        }

        let exchange = submit_turn(
            &state,
            user_id,
            ChatInput::Text {
                message: "message 3".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(exchange.total, 4);
        assert_eq!(exchange.recent.len(), 3);
        assert!(exchange.recent.iter().all(|t| t.id != exchange.current.id));
        // Newest first by (created_at, seq).
        assert_eq!(exchange.recent[0].message, "message 2");
        assert_eq!(exchange.recent[2].message, "message 0");
    }
}
