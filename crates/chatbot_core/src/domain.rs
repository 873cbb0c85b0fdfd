//! crates/chatbot_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The shape of the input that produced a chat turn. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Voice => "voice",
        }
    }
}

/// One user message + assistant reply pair, the atomic unit of chat history.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Normalized request text: typed directly, or the STT transcript.
    pub message: String,
    /// Generated reply. A turn is never persisted without one.
    pub response: String,
    pub kind: MessageKind,
    /// Stored file name of an uploaded image (IMAGE turns only).
    pub image_name: Option<String>,
    /// Stored file name of an uploaded voice clip (VOICE turns only).
    pub voice_name: Option<String>,
    /// Stored file name of the synthesized reply audio, when synthesis succeeded.
    pub response_audio_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Insertion sequence, the stable tie-break for `created_at` ordering.
    pub seq: i64,
}

/// The fields needed to persist a new turn. Id, timestamp, and sequence are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewChatTurn {
    pub user_id: Uuid,
    pub message: String,
    pub response: String,
    pub kind: MessageKind,
    pub image_name: Option<String>,
    pub voice_name: Option<String>,
    pub response_audio_name: Option<String>,
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub handle: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: Uuid,
    pub email: String,
    pub handle: String,
    pub display_name: String,
    pub hashed_password: String,
}

/// The fields needed to create a new user record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub handle: String,
    pub display_name: String,
    pub hashed_password: String,
}

/// A single-use password reset token. Consumed tokens are kept with the
/// `used` flag set rather than deleted.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}
