//! services/api/src/web/chat.rs
//!
//! Chat endpoints: message submission (text or voice), image upload, and
//! history reads/deletes. Handlers classify and validate the payload, then
//! hand it to the ingestion pipeline.

use axum::{
    extract::{Multipart, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::ApiError,
    web::pipeline::{self, ChatInput, MediaUpload},
    web::protocol::{ChatExchangeResponse, ChatTurnView, DeleteAllResponse, MessageResponse},
    web::state::AppState,
};
use chatbot_core::domain::ChatTurn;
use chatbot_core::ports::{PortError, PortResult};

const MAX_PAGE_SIZE: i64 = 100;

//=========================================================================================
// Payload Classification and Validation Helpers
//=========================================================================================

/// Picks the input shape for `/chat/message`. When both a voice clip and a
/// text message are present, the voice clip wins and the text is ignored.
fn resolve_message_input(
    message: Option<String>,
    voice: Option<MediaUpload>,
) -> PortResult<ChatInput> {
    match (voice, message) {
        (Some(audio), _) => Ok(ChatInput::Voice { audio }),
        (None, Some(message)) => Ok(ChatInput::Text { message }),
        (None, None) => Err(PortError::Validation(
            "Message or voice input is required".to_string(),
        )),
    }
}

/// MIME allow-list and size ceiling, checked before anything touches disk.
fn validate_upload(
    mime_type: &str,
    size: usize,
    allowed: &[String],
    max_size: usize,
) -> PortResult<()> {
    if !allowed.iter().any(|t| t == mime_type) {
        return Err(PortError::Validation(format!(
            "Invalid file type. Allowed types: {}",
            allowed.join(", ")
        )));
    }
    if size > max_size {
        return Err(PortError::Validation(format!(
            "File too large. Maximum size: {}MB",
            max_size / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Original extension when the upload carried one, else a sensible guess
/// from the MIME subtype.
fn extension_for(file_name: Option<&str>, mime_type: &str) -> String {
    if let Some(name) = file_name {
        if let Some((_, ext)) = name.rsplit_once('.') {
            if !ext.is_empty() {
                return ext.to_ascii_lowercase();
            }
        }
    }
    match mime_type.rsplit_once('/').map(|(_, sub)| sub) {
        Some("mpeg") => "mp3".to_string(),
        Some("jpeg") => "jpg".to_string(),
        Some(sub) if !sub.is_empty() => sub.to_string(),
        _ => "bin".to_string(),
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> PortError {
    PortError::Validation(format!("Failed to read multipart data: {e}"))
}

fn exchange_response(state: &AppState, exchange: pipeline::ChatExchange) -> ChatExchangeResponse {
    let base = &state.config.public_base_url;
    ChatExchangeResponse {
        current_chat: ChatTurnView::from_turn(&exchange.current, base),
        chat_history: exchange
            .recent
            .iter()
            .map(|t| ChatTurnView::from_turn(t, base))
            .collect(),
        total_chats: exchange.total,
    }
}

/// Best-effort removal of a deleted turn's media; failures are logged,
/// never propagated.
async fn cleanup_turn_assets(state: &AppState, turn: &ChatTurn) {
    let names = [&turn.image_name, &turn.voice_name, &turn.response_audio_name];
    for name in names.into_iter().flatten() {
        if let Err(e) = state.assets.delete(name).await {
            warn!("Failed to delete asset {name}: {e}");
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/chat/message - Send a text message or a voice clip
#[utoipa::path(
    post,
    path = "/api/chat/message",
    request_body(content_type = "multipart/form-data",
        description = "Fields: `message` (text, optional), `voice` (audio file, optional)."),
    responses(
        (status = 200, description = "Turn created", body = ChatExchangeResponse),
        (status = 400, description = "No usable input, or bad media type/size"),
        (status = 503, description = "Generation retries exhausted"),
        (status = 504, description = "Upstream timeout")
    )
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ChatExchangeResponse>, ApiError> {
    let mut message: Option<String> = None;
    let mut voice: Option<MediaUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "message" => {
                message = Some(field.text().await.map_err(multipart_error)?);
            }
            "voice" => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = field.file_name().map(|s| s.to_string());
                let data = field.bytes().await.map_err(multipart_error)?;
                validate_upload(
                    &mime_type,
                    data.len(),
                    &state.config.allowed_audio_types,
                    state.config.max_upload_size,
                )?;
                voice = Some(MediaUpload {
                    extension: extension_for(file_name.as_deref(), &mime_type),
                    mime_type,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    let input = resolve_message_input(message, voice)?;
    let exchange = pipeline::submit_turn(&state, user_id, input).await?;
    Ok(Json(exchange_response(&state, exchange)))
}

/// POST /api/chat/upload-image - Send a message with an image to analyze
#[utoipa::path(
    post,
    path = "/api/chat/upload-image",
    request_body(content_type = "multipart/form-data",
        description = "Fields: `message` (text, required), `image` (image file, required)."),
    responses(
        (status = 200, description = "Turn created", body = ChatExchangeResponse),
        (status = 400, description = "Missing field, or bad media type/size")
    )
)]
pub async fn upload_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ChatExchangeResponse>, ApiError> {
    let mut message: Option<String> = None;
    let mut image: Option<MediaUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "message" => {
                message = Some(field.text().await.map_err(multipart_error)?);
            }
            "image" => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = field.file_name().map(|s| s.to_string());
                let data = field.bytes().await.map_err(multipart_error)?;
                validate_upload(
                    &mime_type,
                    data.len(),
                    &state.config.allowed_image_types,
                    state.config.max_upload_size,
                )?;
                image = Some(MediaUpload {
                    extension: extension_for(file_name.as_deref(), &mime_type),
                    mime_type,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    let message =
        message.ok_or_else(|| PortError::Validation("Message is required".to_string()))?;
    let image =
        image.ok_or_else(|| PortError::Validation("Image file is required".to_string()))?;

    let exchange =
        pipeline::submit_turn(&state, user_id, ChatInput::Image { message, image }).await?;
    Ok(Json(exchange_response(&state, exchange)))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_page_size")]
    pub limit: i64,
}

fn default_page_size() -> i64 {
    50
}

fn page_params(query: &HistoryQuery) -> (i64, i64) {
    (query.skip.max(0), query.limit.clamp(0, MAX_PAGE_SIZE))
}

/// GET /api/chat/history - Page through the caller's history, newest first
#[utoipa::path(
    get,
    path = "/api/chat/history",
    params(
        ("skip" = Option<i64>, Query, description = "Records to skip"),
        ("limit" = Option<i64>, Query, description = "Page size, capped at 100")
    ),
    responses(
        (status = 200, description = "A page of chat turns", body = [ChatTurnView])
    )
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatTurnView>>, ApiError> {
    let (skip, limit) = page_params(&query);
    let turns = state.db.list_turns(user_id, skip, limit).await?;
    let base = &state.config.public_base_url;
    Ok(Json(
        turns.iter().map(|t| ChatTurnView::from_turn(t, base)).collect(),
    ))
}

/// GET /api/chat/history/{id} - Fetch a single turn
#[utoipa::path(
    get,
    path = "/api/chat/history/{id}",
    params(("id" = Uuid, Path, description = "Turn id")),
    responses(
        (status = 200, description = "The turn", body = ChatTurnView),
        (status = 404, description = "No such turn for this user")
    )
)]
pub async fn get_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ChatTurnView>, ApiError> {
    let turn = state.db.get_turn(user_id, chat_id).await?;
    Ok(Json(ChatTurnView::from_turn(
        &turn,
        &state.config.public_base_url,
    )))
}

/// DELETE /api/chat/history/{id} - Delete a single turn
#[utoipa::path(
    delete,
    path = "/api/chat/history/{id}",
    params(("id" = Uuid, Path, description = "Turn id")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "No such turn for this user")
    )
)]
pub async fn delete_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let turn = state.db.delete_turn(user_id, chat_id).await?;
    cleanup_turn_assets(&state, &turn).await;
    Ok(Json(MessageResponse {
        message: "Chat deleted successfully".to_string(),
    }))
}

/// DELETE /api/chat/history - Delete the caller's entire history
#[utoipa::path(
    delete,
    path = "/api/chat/history",
    responses(
        (status = 200, description = "All turns deleted", body = DeleteAllResponse)
    )
)]
pub async fn delete_all_chats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<DeleteAllResponse>, ApiError> {
    let removed = state.db.delete_all_turns(user_id).await?;
    for turn in &removed {
        cleanup_turn_assets(&state, turn).await;
    }
    let deleted = removed.len();
    Ok(Json(DeleteAllResponse {
        message: format!("Deleted {deleted} chat(s) successfully"),
        deleted,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::testing::{
        test_state, FakeAssets, FakeDb, FakeLlm, FakeStt, FakeTts, LlmBehavior,
    };
    use chatbot_core::domain::{MessageKind, NewChatTurn};
    use chatbot_core::ports::{AssetStore, DatabaseService};

    fn clip() -> MediaUpload {
        MediaUpload {
            data: vec![1, 2, 3],
            mime_type: "audio/mpeg".into(),
            extension: "mp3".into(),
        }
    }

    #[test]
    fn voice_takes_precedence_over_text() {
        let input = resolve_message_input(Some("ignored".into()), Some(clip())).unwrap();
        assert!(matches!(input, ChatInput::Voice { .. }));
    }

    #[test]
    fn missing_input_is_a_validation_error() {
        let err = resolve_message_input(None, None).unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn unsupported_mime_type_is_rejected() {
        let allowed = vec!["image/png".to_string()];
        let err = validate_upload("application/zip", 10, &allowed, 1024).unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn oversized_upload_is_rejected() {
        let allowed = vec!["image/png".to_string()];
        assert!(validate_upload("image/png", 2048, &allowed, 1024).is_err());
        assert!(validate_upload("image/png", 1024, &allowed, 1024).is_ok());
    }

    #[test]
    fn extension_prefers_the_file_name() {
        assert_eq!(extension_for(Some("note.WAV"), "audio/mpeg"), "wav");
        assert_eq!(extension_for(Some("noext"), "audio/mpeg"), "mp3");
        assert_eq!(extension_for(None, "image/jpeg"), "jpg");
        assert_eq!(extension_for(None, "image/png"), "png");
    }

    #[test]
    fn page_params_clamp_limit_and_skip() {
        let (skip, limit) = page_params(&HistoryQuery {
            skip: -5,
            limit: 500,
        });
        assert_eq!(skip, 0);
        assert_eq!(limit, MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn deleting_a_turn_removes_its_media() {
        let db = Arc::new(FakeDb::new());
        let assets = FakeAssets::new();
        let state = Arc::new(test_state(
            db.clone(),
            Arc::new(FakeLlm::new(LlmBehavior::Reply("unused".into()))),
            FakeStt::ok(),
            FakeTts::ok(),
            assets.clone(),
        ));

        let user_id = Uuid::new_v4();
        let voice_name = assets.save("mp3", &[1, 2, 3]).await.unwrap();
        let turn = db
            .insert_turn(NewChatTurn {
                user_id,
                message: "hi".into(),
                response: "hello".into(),
                kind: MessageKind::Voice,
                image_name: None,
                voice_name: Some(voice_name),
                response_audio_name: None,
            })
            .await
            .unwrap();

        delete_chat_handler(State(state), Extension(user_id), Path(turn.id))
            .await
            .unwrap();

        assert_eq!(db.turn_count(), 0);
        assert!(assets.stored_names().is_empty());
    }

    #[tokio::test]
    async fn delete_all_reports_the_count() {
        let db = Arc::new(FakeDb::new());
        let state = Arc::new(test_state(
            db.clone(),
            Arc::new(FakeLlm::new(LlmBehavior::Reply("unused".into()))),
            FakeStt::ok(),
            FakeTts::ok(),
            FakeAssets::new(),
        ));

        let user_id = Uuid::new_v4();
        for i in 0..3 {
            db.insert_turn(NewChatTurn {
                user_id,
                message: format!("m{i}"),
                response: "r".into(),
                kind: MessageKind::Text,
                image_name: None,
                voice_name: None,
                response_audio_name: None,
            })
            .await
            .unwrap();
        }

        let Json(resp) = delete_all_chats_handler(State(state), Extension(user_id))
            .await
            .unwrap();
        assert_eq!(resp.deleted, 3);
        assert_eq!(db.turn_count(), 0);
    }

    #[tokio::test]
    async fn cross_owner_lookup_reads_as_not_found() {
        let db = Arc::new(FakeDb::new());
        let state = Arc::new(test_state(
            db.clone(),
            Arc::new(FakeLlm::new(LlmBehavior::Reply("unused".into()))),
            FakeStt::ok(),
            FakeTts::ok(),
            FakeAssets::new(),
        ));

        let owner = Uuid::new_v4();
        let turn = db
            .insert_turn(NewChatTurn {
                user_id: owner,
                message: "private".into(),
                response: "reply".into(),
                kind: MessageKind::Text,
                image_name: None,
                voice_name: None,
                response_audio_name: None,
            })
            .await
            .unwrap();

        let other_user = Uuid::new_v4();
        let err = get_chat_handler(State(state), Extension(other_user), Path(turn.id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Port(PortError::NotFound(_))
        ));
    }
}
