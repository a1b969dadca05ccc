// ABOUTME: Recipe API library: shared application state and the HTTP route table
// ABOUTME: Users, tokens, tags, ingredients, recipes, and recipe image uploads

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod entities;
pub mod error;
pub mod images;
pub mod migration;
pub mod recipes;
pub mod storage;
pub mod types;

#[cfg(test)]
mod storage_tests;

use auth::TokenAuthority;
use config::Config;
use error::method_not_allowed;
use images::MediaStore;
use storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub tokens: Arc<dyn TokenAuthority>,
    pub media: MediaStore,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the store in as the token authority.
    pub fn new(storage: Arc<Storage>, config: Config) -> Self {
        Self {
            tokens: storage.clone(),
            storage,
            media: MediaStore::new(config.media_root.clone(), &config.media_url),
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let media_service = ServeDir::new(state.media.root());

    Router::new()
        .route(
            "/user/create",
            post(accounts::create_user).fallback(method_not_allowed),
        )
        .route(
            "/user/token",
            post(accounts::create_token).fallback(method_not_allowed),
        )
        .route(
            "/user/me",
            get(accounts::get_me)
                .patch(accounts::update_me)
                .fallback(method_not_allowed),
        )
        .route(
            "/recipe/tags",
            get(catalog::list_tags)
                .post(catalog::create_tag)
                .fallback(method_not_allowed),
        )
        .route(
            "/recipe/ingredients",
            get(catalog::list_ingredients)
                .post(catalog::create_ingredient)
                .fallback(method_not_allowed),
        )
        .route(
            "/recipe/recipes",
            get(recipes::list_recipes)
                .post(recipes::create_recipe)
                .fallback(method_not_allowed),
        )
        .route(
            "/recipe/recipes/:id",
            get(recipes::get_recipe)
                .put(recipes::replace_recipe)
                .patch(recipes::patch_recipe)
                .delete(recipes::delete_recipe)
                .fallback(method_not_allowed),
        )
        .route(
            "/recipe/recipes/:id/upload-image",
            post(images::upload_recipe_image).fallback(method_not_allowed),
        )
        .nest_service(&state.config.media_url, media_service)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
