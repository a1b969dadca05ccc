// ABOUTME: Account and token service: registration, credential checks, token issue, profiles
// ABOUTME: Emails are normalized to lowercase and passwords only ever stored as argon2 hashes

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::config::Config;
use crate::entities::user;
use crate::error::{AppError, FieldErrors, Result};
use crate::storage::Storage;
use crate::types::*;
use crate::AppState;

pub const MAX_FIELD_LENGTH: usize = 255;

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
                && email.len() <= MAX_FIELD_LENGTH
        }
        None => false,
    }
}

fn check_password(errors: &mut FieldErrors, password: &str, min_length: usize) {
    if password.chars().count() < min_length {
        errors.entry("password".to_string()).or_default().push(format!(
            "Ensure this field has at least {} characters.",
            min_length
        ));
    }
}

fn check_name(errors: &mut FieldErrors, name: &str) {
    if name.chars().count() > MAX_FIELD_LENGTH {
        errors.entry("name".to_string()).or_default().push(format!(
            "Ensure this field has no more than {} characters.",
            MAX_FIELD_LENGTH
        ));
    }
}

fn push(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

pub async fn create_account(
    storage: &Storage,
    config: &Config,
    request: CreateUserRequest,
) -> Result<user::Model> {
    let mut errors = FieldErrors::new();

    let email = request.email.as_deref().map(normalize_email);
    match email.as_deref() {
        None => push(&mut errors, "email", "This field is required."),
        Some("") => push(&mut errors, "email", "This field may not be blank."),
        Some(email) if !is_valid_email(email) => {
            push(&mut errors, "email", "Enter a valid email address.")
        }
        Some(_) => {}
    }

    match request.password.as_deref() {
        None => push(&mut errors, "password", "This field is required."),
        Some(password) => check_password(&mut errors, password, config.min_password_length),
    }

    let name = request.name.unwrap_or_default().trim().to_string();
    check_name(&mut errors, &name);

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    // Both are present once validation passed
    let email = email.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    if storage.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "user with this email already exists.".to_string(),
        ));
    }

    let password_hash = hash_password(&password).await?;
    let created = storage
        .create_user(NewAccount {
            email,
            password_hash,
            name,
            is_staff: false,
            is_superuser: false,
        })
        .await?;

    tracing::info!("Created account {}", created.id);
    Ok(created)
}

/// Returns the active account whose password matches, if any.
pub async fn authenticate(
    storage: &Storage,
    email: &str,
    password: &str,
) -> Result<Option<user::Model>> {
    let Some(user) = storage.find_user_by_email(&normalize_email(email)).await? else {
        return Ok(None);
    };

    if !user.is_active {
        return Ok(None);
    }

    if verify_password(password, &user.password_hash).await? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

pub async fn issue_token(storage: &Storage, request: TokenRequest) -> Result<String> {
    let email = request.email.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::InvalidCredentials(
            "email and password are required".to_string(),
        ));
    }

    let user = authenticate(storage, &email, &password)
        .await?
        .ok_or_else(|| AppError::InvalidCredentials(format!("no match for {}", email.trim())))?;

    storage.get_or_create_token(user.id).await
}

pub async fn update_profile(
    storage: &Storage,
    config: &Config,
    user_id: i32,
    request: UpdateProfileRequest,
) -> Result<user::Model> {
    let mut errors = FieldErrors::new();

    let name = request.name.map(|name| name.trim().to_string());
    if let Some(name) = &name {
        check_name(&mut errors, name);
    }
    if let Some(password) = &request.password {
        check_password(&mut errors, password, config.min_password_length);
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let password_hash = match request.password {
        Some(password) => Some(hash_password(&password).await?),
        None => None,
    };

    storage
        .update_profile(
            user_id,
            ProfileChanges {
                name,
                password_hash,
            },
        )
        .await
}

/// Creates the bootstrap superuser unless an account with that email exists.
/// Returns whether an account was created.
pub async fn ensure_superuser(storage: &Storage, email: &str, password: &str) -> Result<bool> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AppError::invalid("email", "Enter a valid email address."));
    }
    if password.is_empty() {
        return Err(AppError::invalid("password", "This field may not be blank."));
    }

    if storage.find_user_by_email(&email).await?.is_some() {
        tracing::info!("Superuser {} already present", email);
        return Ok(false);
    }

    let password_hash = hash_password(password).await?;
    storage
        .create_user(NewAccount {
            email: email.clone(),
            password_hash,
            name: String::new(),
            is_staff: true,
            is_superuser: true,
        })
        .await?;

    tracing::info!("Created superuser {}", email);
    Ok(true)
}

// HTTP handlers

pub async fn create_user(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<CreateUserRequest>, AppError>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user = create_account(&state.storage, &state.config, request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn create_token(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<TokenRequest>, AppError>,
) -> Result<Json<TokenResponse>> {
    let token = issue_token(&state.storage, request).await?;
    Ok(Json(TokenResponse { token }))
}

pub async fn get_me(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(user.into())
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<UpdateProfileRequest>, AppError>,
) -> Result<Json<UserResponse>> {
    let user = update_profile(&state.storage, &state.config, auth.id(), request).await?;
    Ok(Json(user.into()))
}
