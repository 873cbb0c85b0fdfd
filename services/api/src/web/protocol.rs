//! services/api/src/web/protocol.rs
//!
//! Request and response payloads for the REST API, plus the master
//! definition for the OpenAPI specification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use chatbot_core::domain::{ChatTurn, User};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::register_handler,
        crate::web::auth::login_handler,
        crate::web::auth::forgot_password_handler,
        crate::web::auth::reset_password_handler,
        crate::web::auth::me_handler,
        crate::web::auth::verify_token_handler,
        crate::web::chat::send_message_handler,
        crate::web::chat::upload_image_handler,
        crate::web::chat::history_handler,
        crate::web::chat::get_chat_handler,
        crate::web::chat::delete_chat_handler,
        crate::web::chat::delete_all_chats_handler,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            MessageResponse,
            UserView,
            VerifyTokenResponse,
            ChatTurnView,
            ChatExchangeResponse,
            DeleteAllResponse,
        )
    ),
    tags(
        (name = "Chatbot API", description = "AI chatbot with text, image, and voice messages.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Auth Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub handle: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub handle: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            handle: user.handle,
            display_name: user.display_name,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserView,
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub user: UserView,
}

//=========================================================================================
// Chat Payloads
//=========================================================================================

/// One chat turn as seen by the client. Media references are rendered as
/// publicly fetchable URLs under `/uploads`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatTurnView {
    pub id: Uuid,
    pub message: String,
    pub response: String,
    pub message_type: String,
    pub image_url: Option<String>,
    pub voice_url: Option<String>,
    pub response_audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatTurnView {
    pub fn from_turn(turn: &ChatTurn, public_base_url: &str) -> Self {
        let asset_url =
            |name: &Option<String>| name.as_ref().map(|n| format!("{public_base_url}/uploads/{n}"));
        Self {
            id: turn.id,
            message: turn.message.clone(),
            response: turn.response.clone(),
            message_type: turn.kind.as_str().to_string(),
            image_url: asset_url(&turn.image_name),
            voice_url: asset_url(&turn.voice_name),
            response_audio_url: asset_url(&turn.response_audio_name),
            created_at: turn.created_at,
        }
    }
}

/// Response with the just-created chat turn and previous chat history.
#[derive(Serialize, ToSchema)]
pub struct ChatExchangeResponse {
    pub current_chat: ChatTurnView,
    pub chat_history: Vec<ChatTurnView>,
    pub total_chats: i64,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteAllResponse {
    pub message: String,
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot_core::domain::MessageKind;

    #[test]
    fn view_builds_upload_urls_from_stored_names() {
        let turn = ChatTurn {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            message: "hello".into(),
            response: "hi".into(),
            kind: MessageKind::Voice,
            image_name: None,
            voice_name: Some("clip.mp3".into()),
            response_audio_name: Some("reply.mp3".into()),
            created_at: Utc::now(),
            seq: 1,
        };
        let view = ChatTurnView::from_turn(&turn, "http://localhost:8000");
        assert_eq!(view.message_type, "voice");
        assert_eq!(
            view.voice_url.as_deref(),
            Some("http://localhost:8000/uploads/clip.mp3")
        );
        assert_eq!(
            view.response_audio_url.as_deref(),
            Some("http://localhost:8000/uploads/reply.mp3")
        );
        assert!(view.image_url.is_none());
    }
}
