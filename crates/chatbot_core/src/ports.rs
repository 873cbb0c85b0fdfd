//! crates/chatbot_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{ChatTurn, NewChatTurn, NewUser, ResetToken, User, UserCredentials};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// Adapters classify failures at the boundary where the real error type is
/// known; callers match on the kind to decide retry / rollback / propagate.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Upstream call timed out: {0}")]
    Timeout(String),
    #[error("Upstream service unavailable: {0}")]
    Unavailable(String),
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        /// Whether the failure is network-class and worth retrying.
        transient: bool,
    },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// True for failures a bounded retry loop may reasonably try again.
    pub fn is_transient(&self) -> bool {
        match self {
            PortError::Timeout(_) => true,
            PortError::Upstream { transient, .. } => *transient,
            _ => false,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    /// Removes the user; chat history and reset tokens cascade with it.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    // --- Password Reset Tokens ---
    async fn create_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn get_reset_token(&self, token: &str) -> PortResult<ResetToken>;

    /// Updates the user's password hash and flips the token's used flag in
    /// a single transaction.
    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> PortResult<()>;

    // --- Chat History ---
    async fn insert_turn(&self, turn: NewChatTurn) -> PortResult<ChatTurn>;

    /// The newest turns for `user_id` excluding `exclude_id`, newest first.
    async fn list_recent_turns(
        &self,
        user_id: Uuid,
        exclude_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<ChatTurn>>;

    /// A page of the owner's turns, newest first.
    async fn list_turns(&self, user_id: Uuid, offset: i64, limit: i64)
        -> PortResult<Vec<ChatTurn>>;

    /// Owner-scoped lookup; another owner's turn is NotFound, never a
    /// permission error.
    async fn get_turn(&self, user_id: Uuid, turn_id: Uuid) -> PortResult<ChatTurn>;

    /// Deletes one turn and returns the removed row so the caller can clean
    /// up any referenced media assets.
    async fn delete_turn(&self, user_id: Uuid, turn_id: Uuid) -> PortResult<ChatTurn>;

    /// Deletes all of the owner's turns and returns the removed rows.
    async fn delete_all_turns(&self, user_id: Uuid) -> PortResult<Vec<ChatTurn>>;

    async fn count_turns(&self, user_id: Uuid) -> PortResult<i64>;
}

#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Generates a reply for a plain text prompt.
    async fn generate_text(&self, message: &str) -> PortResult<String>;

    /// Generates a reply grounded in an image. The image is shipped inline;
    /// the buffer is released on every exit path.
    async fn generate_with_image(
        &self,
        message: &str,
        image: &[u8],
        mime_type: &str,
    ) -> PortResult<String>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes an uploaded audio clip into text. An empty transcript is
    /// a validation error, distinct from a transport failure.
    async fn transcribe_audio(&self, audio_data: &[u8], file_name: &str) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait MailerService: Send + Sync {
    /// Greets a newly registered user. Callers treat failure as non-fatal.
    async fn send_welcome(&self, to_email: &str, handle: &str) -> PortResult<()>;

    /// Delivers a password reset link carrying `token`.
    async fn send_password_reset(
        &self,
        to_email: &str,
        handle: &str,
        token: &str,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores a binary under a unique generated name with the given
    /// extension and returns that name.
    async fn save(&self, extension: &str, data: &[u8]) -> PortResult<String>;

    /// Removes a stored asset. Deleting a name that no longer exists is not
    /// an error.
    async fn delete(&self, name: &str) -> PortResult<()>;
}
