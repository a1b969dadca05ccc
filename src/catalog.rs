// ABOUTME: Tag and ingredient endpoints sharing one contract parametrized by AttributeKind
// ABOUTME: Lists are limited to the caller's own entries and can be narrowed to assigned ones

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;

use crate::accounts::MAX_FIELD_LENGTH;
use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::types::*;
use crate::AppState;

/// Parses `assigned_only` the way an integer query flag reads: non-zero is on.
pub fn parse_assigned_only(raw: Option<&str>) -> Result<bool> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some(value) => value
            .parse::<i64>()
            .map(|flag| flag != 0)
            .map_err(|_| AppError::invalid("assigned_only", "A valid integer is required.")),
    }
}

pub fn validate_name(name: Option<String>) -> Result<String> {
    let Some(name) = name else {
        return Err(AppError::invalid("name", "This field is required."));
    };
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::invalid("name", "This field may not be blank."));
    }
    if name.chars().count() > MAX_FIELD_LENGTH {
        return Err(AppError::invalid(
            "name",
            format!(
                "Ensure this field has no more than {} characters.",
                MAX_FIELD_LENGTH
            ),
        ));
    }
    Ok(name)
}

async fn list(
    kind: AttributeKind,
    state: AppState,
    auth: AuthUser,
    filter: AttributeFilter,
) -> Result<Json<Vec<AttributeResponse>>> {
    let assigned_only = parse_assigned_only(filter.assigned_only.as_deref())?;
    let items = state
        .storage
        .list_attributes(kind, auth.id(), assigned_only)
        .await?;
    Ok(Json(items))
}

async fn create(
    kind: AttributeKind,
    state: AppState,
    auth: AuthUser,
    request: AttributeRequest,
) -> Result<(StatusCode, Json<AttributeResponse>)> {
    let name = validate_name(request.name)?;
    let created = state
        .storage
        .create_attribute(kind, auth.id(), name)
        .await?;
    tracing::debug!("Created {} {} for user {}", kind.label(), created.id, auth.id());
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_tags(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<AttributeFilter>,
) -> Result<Json<Vec<AttributeResponse>>> {
    list(AttributeKind::Tag, state, auth, filter).await
}

pub async fn create_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<AttributeRequest>, AppError>,
) -> Result<(StatusCode, Json<AttributeResponse>)> {
    create(AttributeKind::Tag, state, auth, request).await
}

pub async fn list_ingredients(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<AttributeFilter>,
) -> Result<Json<Vec<AttributeResponse>>> {
    list(AttributeKind::Ingredient, state, auth, filter).await
}

pub async fn create_ingredient(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<AttributeRequest>, AppError>,
) -> Result<(StatusCode, Json<AttributeResponse>)> {
    create(AttributeKind::Ingredient, state, auth, request).await
}
