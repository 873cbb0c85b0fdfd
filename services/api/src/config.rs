//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use jsonwebtoken::Algorithm;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,

    // --- Auth ---
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub reset_token_expire_minutes: i64,

    // --- Outbound mail ---
    pub mail_api_url: String,
    pub mail_api_key: Option<String>,
    pub mail_from: String,

    // --- Generative / speech provider ---
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub stt_model: String,
    pub tts_voice: String,

    // --- Uploads ---
    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    pub allowed_image_types: Vec<String>,
    pub allowed_audio_types: Vec<String>,

    // --- Frontend ---
    pub frontend_origin: String,
    pub public_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Auth Settings ---
        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| ConfigError::MissingVar("JWT_SECRET".to_string()))?;
        let jwt_algorithm_str =
            std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string());
        let jwt_algorithm = jwt_algorithm_str.parse::<Algorithm>().map_err(|_| {
            ConfigError::InvalidValue(
                "JWT_ALGORITHM".to_string(),
                format!("'{}' is not a supported algorithm", jwt_algorithm_str),
            )
        })?;
        let access_token_expire_minutes =
            parse_var_or("ACCESS_TOKEN_EXPIRE_MINUTES", 7 * 24 * 60)?;
        let reset_token_expire_minutes = parse_var_or("RESET_TOKEN_EXPIRE_MINUTES", 60)?;

        // --- Load Mail Settings ---
        let mail_api_url = std::env::var("MAIL_API_URL")
            .unwrap_or_else(|_| "https://api.sendgrid.com/v3/mail/send".to_string());
        let mail_api_key = std::env::var("MAIL_API_KEY").ok();
        let mail_from =
            std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".to_string());

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let stt_model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());

        // --- Load Upload Settings ---
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));
        let max_upload_size = parse_var_or("MAX_UPLOAD_SIZE", 10 * 1024 * 1024)?;
        let allowed_image_types = list_var_or(
            "ALLOWED_IMAGE_TYPES",
            "image/jpeg,image/jpg,image/png,image/gif,image/webp",
        );
        let allowed_audio_types = list_var_or(
            "ALLOWED_AUDIO_TYPES",
            "audio/mpeg,audio/mp3,audio/wav,audio/x-wav,audio/webm,audio/ogg,audio/mp4",
        );

        // --- Load Frontend Settings ---
        let frontend_origin =
            std::env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}", bind_address));

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            jwt_secret,
            jwt_algorithm,
            access_token_expire_minutes,
            reset_token_expire_minutes,
            mail_api_url,
            mail_api_key,
            mail_from,
            openai_api_key,
            chat_model,
            stt_model,
            tts_voice,
            upload_dir,
            max_upload_size,
            allowed_image_types,
            allowed_audio_types,
            frontend_origin,
            public_base_url,
        })
    }
}

fn parse_var_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn list_var_or(name: &str, default: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
