// ABOUTME: Recipe endpoints and payload validation for create, merge, and replace updates
// ABOUTME: All lookups are scoped to the authenticated owner; foreign ids read as not found

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::accounts::MAX_FIELD_LENGTH;
use crate::auth::AuthUser;
use crate::error::{AppError, FieldErrors, Result};
use crate::images::MediaStore;
use crate::storage::price_from_cents;
use crate::types::*;
use crate::AppState;

/// Prices are stored as cents; five digits with two decimal places tops out here.
const MAX_PRICE_CENTS: i64 = 99_999;

fn push(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.into());
}

fn price_to_cents(errors: &mut FieldErrors, price: Decimal) -> Option<i64> {
    if price.is_sign_negative() && !price.is_zero() {
        push(errors, "price", "Ensure this value is greater than or equal to 0.");
        return None;
    }
    if price.normalize().scale() > 2 {
        push(errors, "price", "Ensure that there are no more than 2 decimal places.");
        return None;
    }
    match price
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.trunc().to_i64())
    {
        Some(cents) if cents <= MAX_PRICE_CENTS => Some(cents),
        _ => {
            push(errors, "price", "Ensure that there are no more than 5 digits in total.");
            None
        }
    }
}

/// Checks every supplied field; with `require_all` the create/replace fields
/// must also be present.
fn validate(payload: RecipePayload, require_all: bool) -> Result<RecipePatch> {
    let mut errors = FieldErrors::new();
    let mut patch = RecipePatch::default();

    match payload.title.map(|title| title.trim().to_string()) {
        Some(title) if title.is_empty() => push(&mut errors, "title", "This field may not be blank."),
        Some(title) if title.chars().count() > MAX_FIELD_LENGTH => push(
            &mut errors,
            "title",
            format!("Ensure this field has no more than {} characters.", MAX_FIELD_LENGTH),
        ),
        Some(title) => patch.title = Some(title),
        None if require_all => push(&mut errors, "title", "This field is required."),
        None => {}
    }

    match payload.time_minutes {
        Some(minutes) if minutes < 0 => push(
            &mut errors,
            "time_minutes",
            "Ensure this value is greater than or equal to 0.",
        ),
        Some(minutes) => match i32::try_from(minutes) {
            Ok(minutes) => patch.time_minutes = Some(minutes),
            Err(_) => push(
                &mut errors,
                "time_minutes",
                format!("Ensure this value is less than or equal to {}.", i32::MAX),
            ),
        },
        None if require_all => push(&mut errors, "time_minutes", "This field is required."),
        None => {}
    }

    match payload.price {
        Some(price) => patch.price_cents = price_to_cents(&mut errors, price),
        None if require_all => push(&mut errors, "price", "This field is required."),
        None => {}
    }

    if let Some(link) = payload.link.map(|link| link.trim().to_string()) {
        if link.chars().count() > MAX_FIELD_LENGTH {
            push(
                &mut errors,
                "link",
                format!("Ensure this field has no more than {} characters.", MAX_FIELD_LENGTH),
            );
        } else {
            patch.link = Some(link);
        }
    }

    patch.tags = payload.tags;
    patch.ingredients = payload.ingredients;

    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Validates a create or PUT payload; omitted optional fields become empty.
pub fn into_new_recipe(payload: RecipePayload) -> Result<NewRecipe> {
    let patch = validate(payload, true)?;
    Ok(NewRecipe {
        title: patch.title.unwrap_or_default(),
        time_minutes: patch.time_minutes.unwrap_or_default(),
        price_cents: patch.price_cents.unwrap_or_default(),
        link: patch.link.unwrap_or_default(),
        tags: patch.tags.unwrap_or_default(),
        ingredients: patch.ingredients.unwrap_or_default(),
    })
}

pub fn into_patch(payload: RecipePayload) -> Result<RecipePatch> {
    validate(payload, false)
}

/// Parses a comma separated id filter such as `tags=1,3`.
pub fn parse_id_list(field: &str, raw: Option<&str>) -> Result<Option<Vec<i32>>> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Some)
        .map_err(|_| AppError::invalid(field, "Enter a comma separated list of ids."))
}

pub fn to_detail(record: RecipeRecord, media: &MediaStore) -> RecipeDetail {
    let recipe = record.recipe;
    RecipeDetail {
        id: recipe.id,
        title: recipe.title,
        ingredients: record
            .ingredients
            .into_iter()
            .map(AttributeResponse::from)
            .collect(),
        tags: record.tags.into_iter().map(AttributeResponse::from).collect(),
        time_minutes: recipe.time_minutes,
        price: price_from_cents(recipe.price_cents),
        link: recipe.link,
        image: recipe.image.as_deref().map(|path| media.url_for(path)),
    }
}

async fn summary_of(state: &AppState, recipe: crate::entities::recipe::Model) -> Result<RecipeSummary> {
    let id = recipe.id;
    state
        .storage
        .summarize(vec![recipe])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound(format!("recipe {}", id)))
}

// HTTP handlers

pub async fn list_recipes(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<RecipeFilter>,
) -> Result<Json<Vec<RecipeSummary>>> {
    let tags = parse_id_list("tags", filter.tags.as_deref())?;
    let ingredients = parse_id_list("ingredients", filter.ingredients.as_deref())?;
    let recipes = state
        .storage
        .list_recipes(auth.id(), tags, ingredients)
        .await?;
    Ok(Json(recipes))
}

pub async fn create_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Json(payload), _): WithRejection<Json<RecipePayload>, AppError>,
) -> Result<(StatusCode, Json<RecipeSummary>)> {
    let new = into_new_recipe(payload)?;
    let created = state.storage.create_recipe(auth.id(), new).await?;
    Ok((StatusCode::CREATED, Json(summary_of(&state, created).await?)))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(recipe_id), _): WithRejection<Path<i32>, AppError>,
) -> Result<Json<RecipeDetail>> {
    let record = state.storage.get_recipe(auth.id(), recipe_id).await?;
    Ok(Json(to_detail(record, &state.media)))
}

pub async fn replace_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(recipe_id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<RecipePayload>, AppError>,
) -> Result<Json<RecipeSummary>> {
    let update = RecipeUpdate::Replace(into_new_recipe(payload)?);
    let updated = state
        .storage
        .update_recipe(auth.id(), recipe_id, update)
        .await?;
    Ok(Json(summary_of(&state, updated).await?))
}

pub async fn patch_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(recipe_id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<RecipePayload>, AppError>,
) -> Result<Json<RecipeSummary>> {
    let update = RecipeUpdate::Merge(into_patch(payload)?);
    let updated = state
        .storage
        .update_recipe(auth.id(), recipe_id, update)
        .await?;
    Ok(Json(summary_of(&state, updated).await?))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(recipe_id), _): WithRejection<Path<i32>, AppError>,
) -> Result<StatusCode> {
    let removed = state.storage.delete_recipe(auth.id(), recipe_id).await?;
    if let Some(path) = removed.image {
        state.media.remove(&path).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_payload() -> RecipePayload {
        RecipePayload {
            title: Some("Cheesecake".into()),
            time_minutes: Some(30),
            price: Some(Decimal::new(500, 2)),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_recipe_defaults_optional_fields() {
        let new = into_new_recipe(full_payload()).unwrap();
        assert_eq!(new.title, "Cheesecake");
        assert_eq!(new.time_minutes, 30);
        assert_eq!(new.price_cents, 500);
        assert_eq!(new.link, "");
        assert!(new.tags.is_empty());
        assert!(new.ingredients.is_empty());
    }

    #[test]
    fn test_new_recipe_reports_every_missing_field() {
        let err = into_new_recipe(RecipePayload::default()).unwrap_err();
        match err {
            AppError::Validation(fields) => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                assert_eq!(names, vec!["price", "time_minutes", "title"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_patch_keeps_absent_fields_unset() {
        let patch = into_patch(RecipePayload {
            title: Some("Chicken tikka".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch.title.as_deref(), Some("Chicken tikka"));
        assert_eq!(patch.time_minutes, None);
        assert_eq!(patch.price_cents, None);
        assert_eq!(patch.tags, None);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut payload = full_payload();
        payload.time_minutes = Some(-1);
        assert!(into_new_recipe(payload).is_err());

        let mut payload = full_payload();
        payload.price = Some(Decimal::new(-100, 2));
        assert!(into_new_recipe(payload).is_err());

        let mut payload = full_payload();
        payload.price = Some(Decimal::new(1234, 3));
        assert!(into_new_recipe(payload).is_err());

        let mut payload = full_payload();
        payload.price = Some(Decimal::new(100_000, 2));
        assert!(into_new_recipe(payload).is_err());

        let mut payload = full_payload();
        payload.title = Some("  ".into());
        assert!(into_new_recipe(payload).is_err());

        let mut payload = full_payload();
        payload.price = Some(Decimal::MAX);
        assert!(matches!(into_new_recipe(payload), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_huge_price_is_a_validation_error() {
        for price in [
            serde_json::json!(1e28),
            serde_json::json!("10000000000000000000000000000"),
        ] {
            let payload: RecipePayload = serde_json::from_value(serde_json::json!({
                "title": "x",
                "time_minutes": 1,
                "price": price
            }))
            .unwrap();
            match into_new_recipe(payload.clone()) {
                Err(AppError::Validation(fields)) => assert!(fields.contains_key("price")),
                other => panic!("unexpected result: {other:?}"),
            }
            assert!(matches!(into_patch(payload), Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_price_with_trailing_zeros_is_accepted() {
        let mut payload = full_payload();
        payload.price = Some(Decimal::new(5000, 3)); // 5.000
        assert_eq!(into_new_recipe(payload).unwrap().price_cents, 500);
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("tags", None).unwrap(), None);
        assert_eq!(parse_id_list("tags", Some("")).unwrap(), None);
        assert_eq!(parse_id_list("tags", Some("1, 3")).unwrap(), Some(vec![1, 3]));
        assert!(parse_id_list("tags", Some("1,x")).is_err());
    }
}
