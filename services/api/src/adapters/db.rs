//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use chatbot_core::domain::{
    ChatTurn, MessageKind, NewChatTurn, NewUser, ResetToken, User, UserCredentials,
};
use chatbot_core::ports::{DatabaseService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

const TURN_COLUMNS: &str = "id, user_id, message, response, message_type, \
     image_name, voice_name, response_audio_name, created_at, seq";

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    handle: String,
    display_name: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            handle: self.handle,
            display_name: self.display_name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserCredentialsRecord {
    id: Uuid,
    email: String,
    handle: String,
    display_name: String,
    hashed_password: String,
}
impl UserCredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            id: self.id,
            email: self.email,
            handle: self.handle,
            display_name: self.display_name,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ChatTurnRecord {
    id: Uuid,
    user_id: Uuid,
    message: String,
    response: String,
    message_type: String,
    image_name: Option<String>,
    voice_name: Option<String>,
    response_audio_name: Option<String>,
    created_at: DateTime<Utc>,
    seq: i64,
}
impl ChatTurnRecord {
    fn to_domain(self) -> PortResult<ChatTurn> {
        let kind = match self.message_type.as_str() {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            "voice" => MessageKind::Voice,
            other => {
                return Err(PortError::Unexpected(format!(
                    "Unknown message_type '{other}' for turn {}",
                    self.id
                )))
            }
        };
        Ok(ChatTurn {
            id: self.id,
            user_id: self.user_id,
            message: self.message,
            response: self.response,
            kind,
            image_name: self.image_name,
            voice_name: self.voice_name,
            response_audio_name: self.response_audio_name,
            created_at: self.created_at,
            seq: self.seq,
        })
    }
}

#[derive(FromRow)]
struct ResetTokenRecord {
    id: Uuid,
    user_id: Uuid,
    token: String,
    expires_at: DateTime<Utc>,
    used: bool,
    created_at: DateTime<Utc>,
}
impl ResetTokenRecord {
    fn to_domain(self) -> ResetToken {
        ResetToken {
            id: self.id,
            user_id: self.user_id,
            token: self.token,
            expires_at: self.expires_at,
            used: self.used,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, handle, display_name, hashed_password) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, email, handle, display_name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.handle)
        .bind(&new_user.display_name)
        .bind(&new_user.hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error().and_then(|db| db.constraint()) {
            Some("users_email_key") => {
                PortError::Validation("Email already registered".to_string())
            }
            Some("users_handle_key") => PortError::Validation("Handle already taken".to_string()),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, handle, display_name, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("User".to_string()),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserCredentialsRecord>(
            "SELECT id, email, handle, display_name, hashed_password \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("User".to_string()),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        // History and reset tokens go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn create_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, token, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_reset_token(&self, token: &str) -> PortResult<ResetToken> {
        let record = sqlx::query_as::<_, ResetTokenRecord>(
            "SELECT id, user_id, token, expires_at, used, created_at \
             FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("Reset token".to_string()),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> PortResult<()> {
        // The password update and the used-flag flip must land together.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("UPDATE users SET hashed_password = $1, updated_at = now() WHERE id = $2")
            .bind(new_password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE id = $1")
            .bind(token_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn insert_turn(&self, turn: NewChatTurn) -> PortResult<ChatTurn> {
        let record = sqlx::query_as::<_, ChatTurnRecord>(&format!(
            "INSERT INTO chat_history \
             (id, user_id, message, response, message_type, image_name, voice_name, response_audio_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {TURN_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(turn.user_id)
        .bind(&turn.message)
        .bind(&turn.response)
        .bind(turn.kind.as_str())
        .bind(&turn.image_name)
        .bind(&turn.voice_name)
        .bind(&turn.response_audio_name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn list_recent_turns(
        &self,
        user_id: Uuid,
        exclude_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<ChatTurn>> {
        let records = sqlx::query_as::<_, ChatTurnRecord>(&format!(
            "SELECT {TURN_COLUMNS} FROM chat_history \
             WHERE user_id = $1 AND id <> $2 \
             ORDER BY created_at DESC, seq DESC LIMIT $3"
        ))
        .bind(user_id)
        .bind(exclude_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_turns(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<ChatTurn>> {
        let records = sqlx::query_as::<_, ChatTurnRecord>(&format!(
            "SELECT {TURN_COLUMNS} FROM chat_history \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, seq DESC OFFSET $2 LIMIT $3"
        ))
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_turn(&self, user_id: Uuid, turn_id: Uuid) -> PortResult<ChatTurn> {
        let record = sqlx::query_as::<_, ChatTurnRecord>(&format!(
            "SELECT {TURN_COLUMNS} FROM chat_history WHERE user_id = $1 AND id = $2"
        ))
        .bind(user_id)
        .bind(turn_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("Chat".to_string()),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn delete_turn(&self, user_id: Uuid, turn_id: Uuid) -> PortResult<ChatTurn> {
        let record = sqlx::query_as::<_, ChatTurnRecord>(&format!(
            "DELETE FROM chat_history WHERE user_id = $1 AND id = $2 RETURNING {TURN_COLUMNS}"
        ))
        .bind(user_id)
        .bind(turn_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound("Chat".to_string()))?;
        record.to_domain()
    }

    async fn delete_all_turns(&self, user_id: Uuid) -> PortResult<Vec<ChatTurn>> {
        let records = sqlx::query_as::<_, ChatTurnRecord>(&format!(
            "DELETE FROM chat_history WHERE user_id = $1 RETURNING {TURN_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn count_turns(&self, user_id: Uuid) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_history WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }
}
