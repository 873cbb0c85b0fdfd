//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        chat_llm::OpenAiChatAdapter, db::DbAdapter, mailer::HttpMailerAdapter,
        stt::OpenAiSttAdapter, tts::OpenAiTtsAdapter,
    },
    assets::FsAssetStore,
    config::Config,
    error::ApiError,
    web::{
        auth::{
            forgot_password_handler, login_handler, me_handler, register_handler,
            reset_password_handler, verify_token_handler,
        },
        chat::{
            delete_all_chats_handler, delete_chat_handler, get_chat_handler, history_handler,
            send_message_handler, upload_image_handler,
        },
        middleware::require_auth,
        protocol::ApiDoc,
        state::AppState,
    },
};
use async_openai::{
    config::OpenAIConfig,
    types::audio::{SpeechModel, Voice},
    Client,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter
        .run_migrations()
        .await
        .map_err(|e| ApiError::Internal(format!("Migration failed: {e}")))?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let llm_adapter = Arc::new(OpenAiChatAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
    ));

    let stt_adapter = Arc::new(OpenAiSttAdapter::new(
        openai_client.clone(),
        config.stt_model.clone(),
    ));

    let tts_voice = match config.tts_voice.to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => {
            return Err(ApiError::Internal(format!(
                "Invalid TTS voice specified in config: '{}'",
                config.tts_voice
            )))
        }
    };
    let tts_adapter = Arc::new(OpenAiTtsAdapter::new(
        openai_client.clone(),
        SpeechModel::Tts1Hd,
        tts_voice,
    ));

    let mailer_adapter = Arc::new(HttpMailerAdapter::new(
        reqwest::Client::new(),
        config.mail_api_url.clone(),
        config.mail_api_key.clone(),
        config.mail_from.clone(),
        config.frontend_origin.clone(),
    ));

    let asset_store = Arc::new(FsAssetStore::new(config.upload_dir.clone()).await?);

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        llm: llm_adapter,
        stt: stt_adapter,
        tts: tts_adapter,
        mailer: mailer_adapter,
        assets: asset_store,
    });

    // --- 5. CORS for the frontend origin ---
    let frontend_origin = config
        .frontend_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid FRONTEND_ORIGIN: {e}")))?;
    let cors = CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/forgot-password", post(forgot_password_handler))
        .route("/api/auth/reset-password", post(reset_password_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/auth/me", get(me_handler))
        .route("/api/auth/verify-token", get(verify_token_handler))
        .route("/api/chat/message", post(send_message_handler))
        .route("/api/chat/upload-image", post(upload_image_handler))
        .route(
            "/api/chat/history",
            get(history_handler).delete(delete_all_chats_handler),
        )
        .route(
            "/api/chat/history/{id}",
            get(get_chat_handler).delete(delete_chat_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes; leave headroom over the upload ceiling for the
    // rest of the multipart body.
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_size + 64 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with static uploads and the Swagger UI router.
    let app = Router::new()
        .merge(api_router)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to Chatbot API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/swagger-ui",
        "status": "active"
    }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
