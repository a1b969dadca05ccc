// ABOUTME: Type definitions for API requests and responses
// ABOUTME: Payload fields are optional so validation can report every missing field at once

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{ingredient, tag, user};

// Account related types
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            email: user.email,
            name: user.name,
        }
    }
}

// Tag and ingredient types
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AttributeRequest {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AttributeFilter {
    pub assigned_only: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeResponse {
    pub id: i32,
    pub name: String,
}

impl From<tag::Model> for AttributeResponse {
    fn from(tag: tag::Model) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
        }
    }
}

impl From<ingredient::Model> for AttributeResponse {
    fn from(ingredient: ingredient::Model) -> Self {
        Self {
            id: ingredient.id,
            name: ingredient.name,
        }
    }
}

// Recipe types
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RecipePayload {
    pub title: Option<String>,
    pub time_minutes: Option<i64>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<i32>>,
    pub ingredients: Option<Vec<i32>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipeFilter {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: i32,
    pub title: String,
    pub ingredients: Vec<i32>,
    pub tags: Vec<i32>,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeDetail {
    pub id: i32,
    pub title: String,
    pub ingredients: Vec<AttributeResponse>,
    pub tags: Vec<AttributeResponse>,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub image: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeImageResponse {
    pub id: i32,
    pub image: String,
}

// Internal data structures passed to the storage layer

/// Which user-owned recipe attribute a catalog operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Tag,
    Ingredient,
}

impl AttributeKind {
    pub fn label(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tag",
            AttributeKind::Ingredient => "ingredient",
        }
    }

    /// Payload field holding ids of this kind on a recipe.
    pub fn recipe_field(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tags",
            AttributeKind::Ingredient => "ingredients",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub password_hash: Option<String>,
}

/// Fully validated recipe fields, used for creation and full replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub title: String,
    pub time_minutes: i32,
    pub price_cents: i64,
    pub link: String,
    pub tags: Vec<i32>,
    pub ingredients: Vec<i32>,
}

/// Validated subset of recipe fields; `None` means "leave as is".
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecipePatch {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price_cents: Option<i64>,
    pub link: Option<String>,
    pub tags: Option<Vec<i32>>,
    pub ingredients: Option<Vec<i32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeUpdate {
    /// PATCH: only supplied fields and associations change.
    Merge(RecipePatch),
    /// PUT: every mutable field is overwritten, omitted associations are cleared.
    Replace(NewRecipe),
}

/// A recipe together with its linked tags and ingredients.
#[derive(Debug, Clone)]
pub struct RecipeRecord {
    pub recipe: crate::entities::recipe::Model,
    pub tags: Vec<tag::Model>,
    pub ingredients: Vec<ingredient::Model>,
}
