use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{issue_token, require_auth, CurrentUser};
use crate::state::AppState;
use rideok_core::User;

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePhoneNumberRequest {
    user_id: Option<Uuid>,
    phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProfileResponse {
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    email: String,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(get_profile))
        .route("/profile", put(update_profile).delete(delete_profile))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/updatePhoneNumber", put(update_phone_number))
        .route("/userId/{userId}", get(get_user_by_id))
        .merge(protected)
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let mut problems = Vec::new();
    if req.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        problems.push("name is required".to_string());
    }
    if req.email.as_deref().map_or(true, |e| e.trim().is_empty()) {
        problems.push("email is required".to_string());
    }
    if req.password.as_deref().map_or(true, |p| p.is_empty()) {
        problems.push("password is required".to_string());
    }
    if !problems.is_empty() {
        return Err(AppError::ValidationError(problems.join(", ")));
    }

    let name = req.name.unwrap_or_default();
    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    // Check if user already exists
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::ValidationError("User already exists".to_string()));
    }

    let user = User::new(name, email, hash_password(&password)?, Utc::now());
    state.users.insert(&user).await?;

    // Issue the token right away so registration doubles as login
    let token = issue_token(user.id, &state.auth)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            id: user.id,
            name: user.name,
            email: user.email,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::AuthenticationError("Invalid email or password".to_string());

    let email = req.email.ok_or_else(invalid)?;
    let password = req.password.ok_or_else(invalid)?;

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&password, &user.password_hash) {
        return Err(invalid());
    }

    let token = issue_token(user.id, &state.auth)?;

    Ok(Json(AuthResponse {
        token,
        id: user.id,
        name: user.name,
        email: user.email,
    }))
}

async fn get_profile(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.0)
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut user = current.0;

    if let Some(name) = req.name {
        user.name = name;
    }
    if let Some(email) = req.email {
        user.email = email;
    }
    if let Some(password) = req.password {
        user.password_hash = hash_password(&password)?;
    }

    state.users.save(&user).await?;

    Ok(Json(ProfileResponse {
        id: user.id,
        name: user.name,
        email: user.email,
    }))
}

async fn delete_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    if !state.users.delete(current.0.id).await? {
        return Err(AppError::NotFoundError("User not found".to_string()));
    }
    Ok(Json(json!({ "message": "User removed" })))
}

async fn update_phone_number(
    State(state): State<AppState>,
    Json(req): Json<UpdatePhoneNumberRequest>,
) -> Result<Json<Value>, AppError> {
    let (Some(user_id), Some(phone_number)) = (req.user_id, req.phone_number) else {
        return Err(AppError::ValidationError(
            "User ID and phone number are required.".to_string(),
        ));
    };

    let mut user = state
        .users
        .get(user_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("User not found".to_string()))?;

    user.phone_number = Some(phone_number);
    state.users.save(&user).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Phone number updated successfully.",
    })))
}

async fn get_user_by_id(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .get(user_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("User not found".to_string()))?;
    Ok(Json(user))
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::InternalServerError(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
