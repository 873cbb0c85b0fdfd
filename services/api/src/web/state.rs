//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use crate::config::Config;
use chatbot_core::ports::{
    AssetStore, DatabaseService, GenerativeService, MailerService, SpeechToTextService,
    TextToSpeechService,
};

/// The shared application state, created once at startup and passed to all handlers.
///
/// Adapters are constructed once and shared by reference so connection pools
/// are reused across requests; none of them hold per-request state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub llm: Arc<dyn GenerativeService>,
    pub stt: Arc<dyn SpeechToTextService>,
    pub tts: Arc<dyn TextToSpeechService>,
    pub mailer: Arc<dyn MailerService>,
    pub assets: Arc<dyn AssetStore>,
}
