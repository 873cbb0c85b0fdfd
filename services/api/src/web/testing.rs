//! services/api/src/web/testing.rs
//!
//! In-memory fakes of the service ports, shared by the unit tests in this
//! crate. Only compiled for tests.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use uuid::Uuid;

use crate::config::Config;
use crate::web::state::AppState;
use chatbot_core::domain::{
    ChatTurn, NewChatTurn, NewUser, ResetToken, User, UserCredentials,
};
use chatbot_core::ports::{
    AssetStore, DatabaseService, GenerativeService, MailerService, PortError, PortResult,
    SpeechToTextService, TextToSpeechService,
};

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:8000".parse().unwrap(),
        database_url: "postgres://unused".into(),
        log_level: tracing::Level::INFO,
        jwt_secret: "test-secret".into(),
        jwt_algorithm: Algorithm::HS256,
        access_token_expire_minutes: 60,
        reset_token_expire_minutes: 60,
        mail_api_url: "http://localhost:9/mail".into(),
        mail_api_key: None,
        mail_from: "no-reply@test".into(),
        openai_api_key: None,
        chat_model: "gpt-4o".into(),
        stt_model: "whisper-1".into(),
        tts_voice: "alloy".into(),
        upload_dir: std::env::temp_dir(),
        max_upload_size: 10 * 1024 * 1024,
        allowed_image_types: vec!["image/png".into(), "image/jpeg".into()],
        allowed_audio_types: vec!["audio/mpeg".into(), "audio/wav".into()],
        frontend_origin: "http://localhost:3000".into(),
        public_base_url: "http://localhost:8000".into(),
    }
}

pub fn test_state(
    db: Arc<FakeDb>,
    llm: Arc<FakeLlm>,
    stt: Arc<FakeStt>,
    tts: Arc<FakeTts>,
    assets: Arc<FakeAssets>,
) -> AppState {
    AppState {
        db,
        config: Arc::new(test_config()),
        llm,
        stt,
        tts,
        mailer: Arc::new(FakeMailer::default()),
        assets,
    }
}

/// State for auth handler tests: real config + db + mailer, inert adapters.
pub fn auth_test_state(db: Arc<FakeDb>, mailer: Arc<FakeMailer>) -> Arc<AppState> {
    Arc::new(AppState {
        db,
        config: Arc::new(test_config()),
        llm: Arc::new(FakeLlm::new(LlmBehavior::Reply("unused".into()))),
        stt: FakeStt::ok(),
        tts: FakeTts::ok(),
        mailer,
        assets: FakeAssets::new(),
    })
}

//=========================================================================================
// FakeDb
//=========================================================================================

#[derive(Default)]
pub struct FakeDb {
    users: Mutex<Vec<UserCredentials>>,
    user_created_at: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
    tokens: Mutex<Vec<ResetToken>>,
    turns: Mutex<Vec<ChatTurn>>,
    next_seq: AtomicI64,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.lock().unwrap().len()
    }

    pub fn token_for_user(&self, user_id: Uuid) -> Option<ResetToken> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.user_id == user_id)
            .cloned()
    }

    fn created_at_of(&self, user_id: Uuid) -> DateTime<Utc> {
        self.user_created_at
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == user_id)
            .map(|(_, at)| *at)
            .unwrap_or_else(Utc::now)
    }

    fn sorted_desc(mut turns: Vec<ChatTurn>) -> Vec<ChatTurn> {
        turns.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        turns
    }
}

#[async_trait]
impl DatabaseService for FakeDb {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(PortError::Validation("Email already registered".into()));
        }
        if users.iter().any(|u| u.handle == new_user.handle) {
            return Err(PortError::Validation("Handle already taken".into()));
        }
        let creds = UserCredentials {
            id: Uuid::new_v4(),
            email: new_user.email,
            handle: new_user.handle,
            display_name: new_user.display_name,
            hashed_password: new_user.hashed_password,
        };
        let created_at = Utc::now();
        self.user_created_at
            .lock()
            .unwrap()
            .push((creds.id, created_at));
        users.push(creds.clone());
        Ok(User {
            id: creds.id,
            email: creds.email,
            handle: creds.handle,
            display_name: creds.display_name,
            created_at,
        })
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let users = self.users.lock().unwrap();
        let creds = users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| PortError::NotFound("User".into()))?;
        Ok(User {
            id: creds.id,
            email: creds.email.clone(),
            handle: creds.handle.clone(),
            display_name: creds.display_name.clone(),
            created_at: self.created_at_of(creds.id),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound("User".into()))
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != user_id);
        if users.len() == before {
            return Err(PortError::NotFound("User".into()));
        }
        self.tokens.lock().unwrap().retain(|t| t.user_id != user_id);
        self.turns.lock().unwrap().retain(|t| t.user_id != user_id);
        Ok(())
    }

    async fn create_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tokens.lock().unwrap().push(ResetToken {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            expires_at,
            used: false,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_reset_token(&self, token: &str) -> PortResult<ResetToken> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.token == token)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Reset token".into()))
    }

    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> PortResult<()> {
        if let Some(user) = self
            .users
            .lock()
            .unwrap()
            .iter_mut()
            .find(|u| u.id == user_id)
        {
            user.hashed_password = new_password_hash.to_string();
        }
        if let Some(token) = self
            .tokens
            .lock()
            .unwrap()
            .iter_mut()
            .find(|t| t.id == token_id)
        {
            token.used = true;
        }
        Ok(())
    }

    async fn insert_turn(&self, turn: NewChatTurn) -> PortResult<ChatTurn> {
        let stored = ChatTurn {
            id: Uuid::new_v4(),
            user_id: turn.user_id,
            message: turn.message,
            response: turn.response,
            kind: turn.kind,
            image_name: turn.image_name,
            voice_name: turn.voice_name,
            response_audio_name: turn.response_audio_name,
            created_at: Utc::now(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
        };
        self.turns.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list_recent_turns(
        &self,
        user_id: Uuid,
        exclude_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<ChatTurn>> {
        let turns: Vec<ChatTurn> = self
            .turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id && t.id != exclude_id)
            .cloned()
            .collect();
        Ok(Self::sorted_desc(turns)
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn list_turns(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<ChatTurn>> {
        let turns: Vec<ChatTurn> = self
            .turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted_desc(turns)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_turn(&self, user_id: Uuid, turn_id: Uuid) -> PortResult<ChatTurn> {
        self.turns
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.user_id == user_id && t.id == turn_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Chat".into()))
    }

    async fn delete_turn(&self, user_id: Uuid, turn_id: Uuid) -> PortResult<ChatTurn> {
        let mut turns = self.turns.lock().unwrap();
        let pos = turns
            .iter()
            .position(|t| t.user_id == user_id && t.id == turn_id)
            .ok_or_else(|| PortError::NotFound("Chat".into()))?;
        Ok(turns.remove(pos))
    }

    async fn delete_all_turns(&self, user_id: Uuid) -> PortResult<Vec<ChatTurn>> {
        let mut turns = self.turns.lock().unwrap();
        let (removed, kept): (Vec<ChatTurn>, Vec<ChatTurn>) =
            turns.drain(..).partition(|t| t.user_id == user_id);
        *turns = kept;
        Ok(removed)
    }

    async fn count_turns(&self, user_id: Uuid) -> PortResult<i64> {
        Ok(self
            .turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .count() as i64)
    }
}

//=========================================================================================
// Adapter Fakes
//=========================================================================================

pub enum LlmBehavior {
    Reply(String),
    Unavailable,
}

pub struct FakeLlm {
    behavior: LlmBehavior,
    calls: AtomicU32,
}

impl FakeLlm {
    pub fn new(behavior: LlmBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            LlmBehavior::Reply(text) => Ok(text.clone()),
            LlmBehavior::Unavailable => Err(PortError::Unavailable(
                "Chat generation failed after 3 attempts".into(),
            )),
        }
    }
}

#[async_trait]
impl GenerativeService for FakeLlm {
    async fn generate_text(&self, _message: &str) -> PortResult<String> {
        self.respond()
    }

    async fn generate_with_image(
        &self,
        _message: &str,
        _image: &[u8],
        _mime_type: &str,
    ) -> PortResult<String> {
        self.respond()
    }
}

pub enum SttBehavior {
    Transcript(String),
    Fail,
}

pub struct FakeStt {
    behavior: SttBehavior,
}

impl FakeStt {
    pub fn new(behavior: SttBehavior) -> Self {
        Self { behavior }
    }

    pub fn ok() -> Arc<Self> {
        Arc::new(Self::new(SttBehavior::Transcript("What is Rust?".into())))
    }
}

#[async_trait]
impl SpeechToTextService for FakeStt {
    async fn transcribe_audio(&self, _audio_data: &[u8], _file_name: &str) -> PortResult<String> {
        match &self.behavior {
            SttBehavior::Transcript(text) => Ok(text.clone()),
            SttBehavior::Fail => Err(PortError::Upstream {
                message: "Transcription failed".into(),
                transient: false,
            }),
        }
    }
}

pub enum TtsBehavior {
    Audio,
    Fail,
}

pub struct FakeTts {
    behavior: TtsBehavior,
}

impl FakeTts {
    pub fn new(behavior: TtsBehavior) -> Self {
        Self { behavior }
    }

    pub fn ok() -> Arc<Self> {
        Arc::new(Self::new(TtsBehavior::Audio))
    }
}

#[async_trait]
impl TextToSpeechService for FakeTts {
    async fn generate_audio(&self, _text: &str) -> PortResult<Vec<u8>> {
        match self.behavior {
            TtsBehavior::Audio => Ok(vec![0u8; 16]),
            TtsBehavior::Fail => Err(PortError::Upstream {
                message: "Text-to-speech failed".into(),
                transient: false,
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeMailer {
    pub fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// (recipient, subject-ish discriminator) pairs recorded so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailerService for FakeMailer {
    async fn send_welcome(&self, to_email: &str, _handle: &str) -> PortResult<()> {
        if self.fail {
            return Err(PortError::Unavailable("mail provider down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to_email.to_string(), "welcome".to_string()));
        Ok(())
    }

    async fn send_password_reset(
        &self,
        to_email: &str,
        _handle: &str,
        token: &str,
    ) -> PortResult<()> {
        if self.fail {
            return Err(PortError::Unavailable("mail provider down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to_email.to_string(), token.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAssets {
    live: Mutex<Vec<String>>,
}

impl FakeAssets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stored_names(&self) -> Vec<String> {
        self.live.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn save(&self, extension: &str, _data: &[u8]) -> PortResult<String> {
        let name = format!("{}.{}", Uuid::new_v4(), extension);
        self.live.lock().unwrap().push(name.clone());
        Ok(name)
    }

    async fn delete(&self, name: &str) -> PortResult<()> {
        self.live.lock().unwrap().retain(|n| n != name);
        Ok(())
    }
}
