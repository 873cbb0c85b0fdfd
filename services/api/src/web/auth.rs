//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: registration, login, password reset, and
//! token introspection.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::ApiError,
    security,
    web::protocol::{
        ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
        ResetPasswordRequest, UserView, VerifyTokenResponse,
    },
    web::state::AppState,
};
use chatbot_core::domain::NewUser;
use chatbot_core::ports::PortError;

/// The one message both bad-email and bad-password logins produce, so the
/// response never confirms which field was wrong.
const INCORRECT_CREDENTIALS: &str = "Incorrect email or password";

/// Password-reset requests answer identically whether or not the email is
/// registered.
const RESET_REQUESTED: &str =
    "If an account with that email exists, a password reset link has been sent.";

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = UserView),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    // 1. Validate the identity fields and password policy
    security::validate_email(&req.email)?;
    security::validate_handle(&req.handle)?;
    security::validate_password_strength(&req.password)?;

    // 2. Hash the password
    let hashed_password = security::hash_password(&req.password)?;

    // 3. Create user in database (unique email/handle enforced there)
    let user = state
        .db
        .create_user(NewUser {
            email: req.email,
            handle: req.handle,
            display_name: req.display_name,
            hashed_password,
        })
        .await?;

    // 4. Send the welcome email off the request path; delivery failure
    //    never fails registration
    let mailer = state.mailer.clone();
    let (email, handle) = (user.email.clone(), user.handle.clone());
    tokio::spawn(async move {
        if let Err(e) = mailer.send_welcome(&email, &handle).await {
            warn!("Failed to send welcome email to {email}: {e}");
        }
    });

    // 5. Return the created user
    Ok((StatusCode::CREATED, Json(UserView::from(user))))
}

/// POST /api/auth/login - Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // 1. Get user by email; an unknown address reads like a bad password
    let creds = state
        .db
        .get_user_by_email(&req.email)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => {
                PortError::Unauthorized(INCORRECT_CREDENTIALS.to_string())
            }
            other => other,
        })?;

    // 2. Verify password
    if !security::verify_password(&req.password, &creds.hashed_password)? {
        return Err(PortError::Unauthorized(INCORRECT_CREDENTIALS.to_string()).into());
    }

    // 3. Issue the access token
    let access_token = security::create_access_token(
        creds.id,
        &state.config.jwt_secret,
        state.config.jwt_algorithm,
        state.config.access_token_expire_minutes,
    )?;

    let user = state.db.get_user_by_id(creds.id).await?;
    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user: UserView::from(user),
    }))
}

/// POST /api/auth/forgot-password - Request a password reset email
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Generic acknowledgement", body = MessageResponse)
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let acknowledged = Json(MessageResponse {
        message: RESET_REQUESTED.to_string(),
    });

    // Unknown addresses get the same acknowledgement as known ones.
    let user = match state.db.get_user_by_email(&req.email).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => return Ok(acknowledged),
        Err(e) => return Err(e.into()),
    };

    let token = security::generate_reset_token();
    let expires_at = Utc::now() + Duration::minutes(state.config.reset_token_expire_minutes);
    state
        .db
        .create_reset_token(user.id, &token, expires_at)
        .await?;

    let mailer = state.mailer.clone();
    let (email, handle) = (user.email.clone(), user.handle.clone());
    tokio::spawn(async move {
        if let Err(e) = mailer.send_password_reset(&email, &handle, &token).await {
            warn!("Failed to send password reset email to {email}: {e}");
        }
    });

    Ok(acknowledged)
}

/// POST /api/auth/reset-password - Reset password using an emailed token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid, expired, or used token")
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    // 1. The new password has to pass the same policy as registration
    security::validate_password_strength(&req.new_password)?;

    // 2. Look the token up; not-found, expired, and used each fail distinctly
    let token = state
        .db
        .get_reset_token(&req.token)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => {
                PortError::Validation("Invalid reset token".to_string())
            }
            other => other,
        })?;

    if token.expires_at < Utc::now() {
        return Err(PortError::Validation("Reset token has expired".to_string()).into());
    }
    if token.used {
        return Err(
            PortError::Validation("Reset token has already been used".to_string()).into(),
        );
    }

    // 3. Update the hash and burn the token in one transaction
    let new_hash = security::hash_password(&req.new_password)?;
    state
        .db
        .consume_reset_token(token.id, token.user_id, &new_hash)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password has been reset successfully. You can now login with your new password."
            .to_string(),
    }))
}

/// GET /api/auth/me - Current authenticated user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserView),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<UserView>, ApiError> {
    let user = state.db.get_user_by_id(user_id).await?;
    Ok(Json(UserView::from(user)))
}

/// GET /api/auth/verify-token - Check that the presented token is valid
#[utoipa::path(
    get,
    path = "/api/auth/verify-token",
    responses(
        (status = 200, description = "Token is valid", body = VerifyTokenResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn verify_token_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<VerifyTokenResponse>, ApiError> {
    let user = state.db.get_user_by_id(user_id).await?;
    Ok(Json(VerifyTokenResponse {
        valid: true,
        user: UserView::from(user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::testing::{auth_test_state, FakeDb, FakeMailer};
    use chatbot_core::ports::DatabaseService;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: "user@example.com".into(),
            handle: "chat_user".into(),
            display_name: "Chat User".into(),
            password: "Sup3rSecret".into(),
        }
    }

    async fn registered_state() -> (Arc<AppState>, UserView) {
        let state = auth_test_state(Arc::new(FakeDb::new()), Arc::new(FakeMailer::default()));
        let (_, Json(user)) = register_handler(State(state.clone()), Json(register_request()))
            .await
            .unwrap();
        (state, user)
    }

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let (state, user) = registered_state().await;

        let Json(login) = login_handler(
            State(state.clone()),
            Json(LoginRequest {
                email: "user@example.com".into(),
                password: "Sup3rSecret".into(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(login.token_type, "bearer");
        assert_eq!(login.user.id, user.id);
        let decoded = security::decode_access_token(
            &login.access_token,
            &state.config.jwt_secret,
            state.config.jwt_algorithm,
        )
        .unwrap();
        assert_eq!(decoded, user.id);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (state, _) = registered_state().await;

        let wrong_password = login_handler(
            State(state.clone()),
            Json(LoginRequest {
                email: "user@example.com".into(),
                password: "WrongPass1".into(),
            }),
        )
        .await
        .unwrap_err();

        let unknown_email = login_handler(
            State(state.clone()),
            Json(LoginRequest {
                email: "nobody@example.com".into(),
                password: "Sup3rSecret".into(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn registration_survives_mail_outage() {
        let state = auth_test_state(Arc::new(FakeDb::new()), Arc::new(FakeMailer::failing()));
        let (status, _) = register_handler(State(state), Json(register_request()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (state, _) = registered_state().await;
        let mut second = register_request();
        second.handle = "other_handle".into();
        let err = register_handler(State(state), Json(second))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Email already registered"));
    }

    #[tokio::test]
    async fn weak_password_is_rejected() {
        let state = auth_test_state(Arc::new(FakeDb::new()), Arc::new(FakeMailer::default()));
        let mut req = register_request();
        req.password = "alllowercase1".into();
        assert!(register_handler(State(state), Json(req)).await.is_err());
    }

    #[tokio::test]
    async fn forgot_password_is_uniform_and_issues_a_token() {
        let db = Arc::new(FakeDb::new());
        let state = auth_test_state(db.clone(), Arc::new(FakeMailer::default()));
        let (_, Json(user)) = register_handler(State(state.clone()), Json(register_request()))
            .await
            .unwrap();

        let Json(known) = forgot_password_handler(
            State(state.clone()),
            Json(ForgotPasswordRequest {
                email: "user@example.com".into(),
            }),
        )
        .await
        .unwrap();
        let Json(unknown) = forgot_password_handler(
            State(state.clone()),
            Json(ForgotPasswordRequest {
                email: "nobody@example.com".into(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(known.message, unknown.message);
        assert!(db.token_for_user(user.id).is_some());
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let db = Arc::new(FakeDb::new());
        let state = auth_test_state(db.clone(), Arc::new(FakeMailer::default()));
        let (_, Json(user)) = register_handler(State(state.clone()), Json(register_request()))
            .await
            .unwrap();

        let token = security::generate_reset_token();
        db.create_reset_token(user.id, &token, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let request = ResetPasswordRequest {
            token: token.clone(),
            new_password: "NewSecret1".into(),
        };
        reset_password_handler(State(state.clone()), Json(request))
            .await
            .unwrap();

        // New password works now.
        login_handler(
            State(state.clone()),
            Json(LoginRequest {
                email: "user@example.com".into(),
                password: "NewSecret1".into(),
            }),
        )
        .await
        .unwrap();

        // Same token again: already used.
        let err = reset_password_handler(
            State(state),
            Json(ResetPasswordRequest {
                token,
                new_password: "OtherSecret1".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("already been used"));
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let db = Arc::new(FakeDb::new());
        let state = auth_test_state(db.clone(), Arc::new(FakeMailer::default()));
        let (_, Json(user)) = register_handler(State(state.clone()), Json(register_request()))
            .await
            .unwrap();

        let token = security::generate_reset_token();
        db.create_reset_token(user.id, &token, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let err = reset_password_handler(
            State(state),
            Json(ResetPasswordRequest {
                token,
                new_password: "NewSecret1".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn unknown_reset_token_is_rejected() {
        let state = auth_test_state(Arc::new(FakeDb::new()), Arc::new(FakeMailer::default()));
        let err = reset_password_handler(
            State(state),
            Json(ResetPasswordRequest {
                token: "not-a-real-token".into(),
                new_password: "NewSecret1".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Invalid reset token"));
    }
}
