// ABOUTME: SeaORM storage layer for accounts, tokens, tags, ingredients, and recipes
// ABOUTME: Every recipe query is scoped to the owning user; multi-row writes run in transactions

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    IntoActiveModel, NotSet, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
};
use sea_orm_migration::MigratorTrait;

use crate::auth::{generate_token_key, TokenAuthority};
use crate::entities::{ingredient, recipe, recipe_ingredient, recipe_tag, tag, token, user};
use crate::error::{AppError, Result};
use crate::migration::Migrator;
use crate::types::*;

pub struct Storage {
    pub db: DatabaseConnection,
}

impl Storage {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = Database::connect(database_url).await?;
        Migrator::up(&db, None).await?;
        Ok(Self { db })
    }

    /// Retries `connect` until the database accepts connections or attempts run out.
    pub async fn connect_with_retry(
        database_url: &str,
        attempts: u32,
        delay: Duration,
    ) -> anyhow::Result<Self> {
        let attempts = attempts.max(1);
        tracing::info!("Waiting for database");

        let mut attempt = 1;
        loop {
            match Self::connect(database_url).await {
                Ok(storage) => {
                    tracing::info!("Database available after {} attempt(s)", attempt);
                    return Ok(storage);
                }
                Err(err) if attempt < attempts => {
                    tracing::warn!(
                        "Database unavailable (attempt {}/{}): {}; retrying in {:?}",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "Database unavailable after {} attempts",
                        attempts
                    )))
                }
            }
        }
    }

    // Accounts

    pub async fn create_user(&self, account: NewAccount) -> Result<user::Model> {
        let email = account.email.clone();
        let model = user::ActiveModel {
            id: NotSet,
            email: Set(account.email),
            password_hash: Set(account.password_hash),
            name: Set(account.name),
            is_active: Set(true),
            is_staff: Set(account.is_staff),
            is_superuser: Set(account.is_superuser),
            created_at: Set(chrono::Utc::now().timestamp()),
        };

        model.insert(&self.db).await.map_err(|err| {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                AppError::Conflict(format!("user with email {} already exists", email))
            } else {
                AppError::Database(err)
            }
        })
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    pub async fn get_user(&self, user_id: i32) -> Result<user::Model> {
        user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    pub async fn update_profile(
        &self,
        user_id: i32,
        changes: ProfileChanges,
    ) -> Result<user::Model> {
        let current = self.get_user(user_id).await?;
        let mut model = current.clone().into_active_model();

        if let Some(name) = changes.name {
            model.name = Set(name);
        }
        if let Some(password_hash) = changes.password_hash {
            model.password_hash = Set(password_hash);
        }

        if !model.is_changed() {
            return Ok(current);
        }
        Ok(model.update(&self.db).await?)
    }

    // Tokens

    /// Returns the user's token, creating one on first use.
    pub async fn get_or_create_token(&self, user_id: i32) -> Result<String> {
        if let Some(key) = self.find_token(user_id).await? {
            return Ok(key);
        }

        match self.insert_token(user_id).await {
            Ok(key) => Ok(key),
            // A concurrent login created it first
            Err(AppError::Conflict(_)) => self
                .find_token(user_id)
                .await?
                .ok_or_else(|| AppError::Internal(format!("token for user {} vanished", user_id))),
            Err(err) => Err(err),
        }
    }

    async fn find_token(&self, user_id: i32) -> Result<Option<String>> {
        Ok(token::Entity::find()
            .filter(token::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .map(|existing| existing.key))
    }

    pub(crate) async fn insert_token(&self, user_id: i32) -> Result<String> {
        let model = token::ActiveModel {
            key: Set(generate_token_key()),
            user_id: Set(user_id),
            created_at: Set(chrono::Utc::now().timestamp()),
        };

        match model.insert(&self.db).await {
            Ok(created) => Ok(created.key),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(AppError::Conflict(format!(
                    "user {} already has a token",
                    user_id
                ))),
                _ => Err(AppError::Database(err)),
            },
        }
    }

    pub async fn user_for_token(&self, key: &str) -> Result<Option<user::Model>> {
        let found = token::Entity::find_by_id(key.to_string())
            .find_also_related(user::Entity)
            .one(&self.db)
            .await?;
        Ok(found.and_then(|(_, user)| user))
    }

    // Tags and ingredients

    /// Lists the user's own tags or ingredients, name descending.
    pub async fn list_attributes(
        &self,
        kind: AttributeKind,
        user_id: i32,
        assigned_only: bool,
    ) -> Result<Vec<AttributeResponse>> {
        let items = match kind {
            AttributeKind::Tag => {
                let mut query = tag::Entity::find().filter(tag::Column::UserId.eq(user_id));
                if assigned_only {
                    query = query.filter(
                        tag::Column::Id.in_subquery(
                            Query::select()
                                .column(recipe_tag::Column::TagId)
                                .from(recipe_tag::Entity)
                                .to_owned(),
                        ),
                    );
                }
                query
                    .order_by_desc(tag::Column::Name)
                    .order_by_desc(tag::Column::Id)
                    .all(&self.db)
                    .await?
                    .into_iter()
                    .map(AttributeResponse::from)
                    .collect()
            }
            AttributeKind::Ingredient => {
                let mut query =
                    ingredient::Entity::find().filter(ingredient::Column::UserId.eq(user_id));
                if assigned_only {
                    query = query.filter(
                        ingredient::Column::Id.in_subquery(
                            Query::select()
                                .column(recipe_ingredient::Column::IngredientId)
                                .from(recipe_ingredient::Entity)
                                .to_owned(),
                        ),
                    );
                }
                query
                    .order_by_desc(ingredient::Column::Name)
                    .order_by_desc(ingredient::Column::Id)
                    .all(&self.db)
                    .await?
                    .into_iter()
                    .map(AttributeResponse::from)
                    .collect()
            }
        };
        Ok(items)
    }

    pub async fn create_attribute(
        &self,
        kind: AttributeKind,
        user_id: i32,
        name: String,
    ) -> Result<AttributeResponse> {
        let created: AttributeResponse = match kind {
            AttributeKind::Tag => tag::ActiveModel {
                id: NotSet,
                user_id: Set(user_id),
                name: Set(name),
            }
            .insert(&self.db)
            .await?
            .into(),
            AttributeKind::Ingredient => ingredient::ActiveModel {
                id: NotSet,
                user_id: Set(user_id),
                name: Set(name),
            }
            .insert(&self.db)
            .await?
            .into(),
        };
        Ok(created)
    }

    // Recipes

    /// Lists the user's recipes, newest id first, optionally restricted to
    /// recipes linked to any of the given tag or ingredient ids.
    pub async fn list_recipes(
        &self,
        user_id: i32,
        tag_ids: Option<Vec<i32>>,
        ingredient_ids: Option<Vec<i32>>,
    ) -> Result<Vec<RecipeSummary>> {
        let mut query = recipe::Entity::find().filter(recipe::Column::UserId.eq(user_id));

        if let Some(ids) = tag_ids {
            query = query.filter(
                recipe::Column::Id.in_subquery(
                    Query::select()
                        .column(recipe_tag::Column::RecipeId)
                        .from(recipe_tag::Entity)
                        .and_where(recipe_tag::Column::TagId.is_in(ids))
                        .to_owned(),
                ),
            );
        }
        if let Some(ids) = ingredient_ids {
            query = query.filter(
                recipe::Column::Id.in_subquery(
                    Query::select()
                        .column(recipe_ingredient::Column::RecipeId)
                        .from(recipe_ingredient::Entity)
                        .and_where(recipe_ingredient::Column::IngredientId.is_in(ids))
                        .to_owned(),
                ),
            );
        }

        let recipes = query
            .order_by_desc(recipe::Column::Id)
            .all(&self.db)
            .await?;
        self.summarize(recipes).await
    }

    /// Builds list representations, loading association ids in two queries.
    pub async fn summarize(&self, recipes: Vec<recipe::Model>) -> Result<Vec<RecipeSummary>> {
        let recipe_ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();

        let mut tags_by_recipe: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for link in recipe_tag::Entity::find()
            .filter(recipe_tag::Column::RecipeId.is_in(recipe_ids.clone()))
            .order_by_asc(recipe_tag::Column::TagId)
            .all(&self.db)
            .await?
        {
            tags_by_recipe.entry(link.recipe_id).or_default().push(link.tag_id);
        }

        let mut ingredients_by_recipe: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for link in recipe_ingredient::Entity::find()
            .filter(recipe_ingredient::Column::RecipeId.is_in(recipe_ids))
            .order_by_asc(recipe_ingredient::Column::IngredientId)
            .all(&self.db)
            .await?
        {
            ingredients_by_recipe
                .entry(link.recipe_id)
                .or_default()
                .push(link.ingredient_id);
        }

        Ok(recipes
            .into_iter()
            .map(|r| RecipeSummary {
                id: r.id,
                tags: tags_by_recipe.remove(&r.id).unwrap_or_default(),
                ingredients: ingredients_by_recipe.remove(&r.id).unwrap_or_default(),
                title: r.title,
                time_minutes: r.time_minutes,
                price: price_from_cents(r.price_cents),
                link: r.link,
            })
            .collect())
    }

    async fn owned_recipe<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
        recipe_id: i32,
    ) -> Result<recipe::Model> {
        recipe::Entity::find_by_id(recipe_id)
            .filter(recipe::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("recipe {}", recipe_id)))
    }

    pub async fn get_recipe(&self, user_id: i32, recipe_id: i32) -> Result<RecipeRecord> {
        let recipe = Self::owned_recipe(&self.db, user_id, recipe_id).await?;

        let tags = tag::Entity::find()
            .filter(
                tag::Column::Id.in_subquery(
                    Query::select()
                        .column(recipe_tag::Column::TagId)
                        .from(recipe_tag::Entity)
                        .and_where(recipe_tag::Column::RecipeId.eq(recipe_id))
                        .to_owned(),
                ),
            )
            .order_by_asc(tag::Column::Id)
            .all(&self.db)
            .await?;

        let ingredients = ingredient::Entity::find()
            .filter(
                ingredient::Column::Id.in_subquery(
                    Query::select()
                        .column(recipe_ingredient::Column::IngredientId)
                        .from(recipe_ingredient::Entity)
                        .and_where(recipe_ingredient::Column::RecipeId.eq(recipe_id))
                        .to_owned(),
                ),
            )
            .order_by_asc(ingredient::Column::Id)
            .all(&self.db)
            .await?;

        Ok(RecipeRecord {
            recipe,
            tags,
            ingredients,
        })
    }

    pub async fn create_recipe(&self, user_id: i32, new: NewRecipe) -> Result<recipe::Model> {
        let txn = self.db.begin().await?;

        ensure_attributes_exist(&txn, AttributeKind::Tag, &new.tags).await?;
        ensure_attributes_exist(&txn, AttributeKind::Ingredient, &new.ingredients).await?;

        let created = recipe::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            title: Set(new.title),
            time_minutes: Set(new.time_minutes),
            price_cents: Set(new.price_cents),
            link: Set(new.link),
            image: Set(None),
            created_at: Set(chrono::Utc::now().timestamp()),
        }
        .insert(&txn)
        .await?;

        link_attributes(&txn, AttributeKind::Tag, created.id, &new.tags).await?;
        link_attributes(&txn, AttributeKind::Ingredient, created.id, &new.ingredients).await?;

        txn.commit().await?;
        tracing::debug!("Created recipe {} for user {}", created.id, user_id);
        Ok(created)
    }

    pub async fn update_recipe(
        &self,
        user_id: i32,
        recipe_id: i32,
        update: RecipeUpdate,
    ) -> Result<recipe::Model> {
        let txn = self.db.begin().await?;
        let current = Self::owned_recipe(&txn, user_id, recipe_id).await?;
        let mut model = current.clone().into_active_model();

        let (tags, ingredients) = match update {
            RecipeUpdate::Replace(new) => {
                model.title = Set(new.title);
                model.time_minutes = Set(new.time_minutes);
                model.price_cents = Set(new.price_cents);
                model.link = Set(new.link);
                (Some(new.tags), Some(new.ingredients))
            }
            RecipeUpdate::Merge(patch) => {
                if let Some(title) = patch.title {
                    model.title = Set(title);
                }
                if let Some(time_minutes) = patch.time_minutes {
                    model.time_minutes = Set(time_minutes);
                }
                if let Some(price_cents) = patch.price_cents {
                    model.price_cents = Set(price_cents);
                }
                if let Some(link) = patch.link {
                    model.link = Set(link);
                }
                (patch.tags, patch.ingredients)
            }
        };

        if let Some(ids) = &tags {
            ensure_attributes_exist(&txn, AttributeKind::Tag, ids).await?;
        }
        if let Some(ids) = &ingredients {
            ensure_attributes_exist(&txn, AttributeKind::Ingredient, ids).await?;
        }

        let updated = if model.is_changed() {
            model.update(&txn).await?
        } else {
            current
        };

        if let Some(ids) = tags {
            unlink_attributes(&txn, AttributeKind::Tag, recipe_id).await?;
            link_attributes(&txn, AttributeKind::Tag, recipe_id, &ids).await?;
        }
        if let Some(ids) = ingredients {
            unlink_attributes(&txn, AttributeKind::Ingredient, recipe_id).await?;
            link_attributes(&txn, AttributeKind::Ingredient, recipe_id, &ids).await?;
        }

        txn.commit().await?;
        Ok(updated)
    }

    /// Deletes the recipe and its association rows, returning the removed row.
    pub async fn delete_recipe(&self, user_id: i32, recipe_id: i32) -> Result<recipe::Model> {
        let txn = self.db.begin().await?;
        let current = Self::owned_recipe(&txn, user_id, recipe_id).await?;

        unlink_attributes(&txn, AttributeKind::Tag, recipe_id).await?;
        unlink_attributes(&txn, AttributeKind::Ingredient, recipe_id).await?;
        recipe::Entity::delete_by_id(recipe_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(current)
    }

    /// Points the recipe at a new image, returning the updated row and the
    /// path it replaced.
    pub async fn set_recipe_image(
        &self,
        user_id: i32,
        recipe_id: i32,
        image_path: String,
    ) -> Result<(recipe::Model, Option<String>)> {
        let current = Self::owned_recipe(&self.db, user_id, recipe_id).await?;
        let previous = current.image.clone();
        let mut model = current.into_active_model();
        model.image = Set(Some(image_path));
        Ok((model.update(&self.db).await?, previous))
    }

    pub async fn recipe_exists_for(&self, user_id: i32, recipe_id: i32) -> Result<()> {
        Self::owned_recipe(&self.db, user_id, recipe_id)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl TokenAuthority for Storage {
    async fn resolve(&self, key: &str) -> Result<Option<user::Model>> {
        self.user_for_token(key).await
    }
}

pub fn price_from_cents(cents: i64) -> rust_decimal::Decimal {
    rust_decimal::Decimal::new(cents, 2)
}

/// Rejects ids that do not name an existing tag or ingredient.
async fn ensure_attributes_exist<C: ConnectionTrait>(
    conn: &C,
    kind: AttributeKind,
    ids: &[i32],
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let wanted: BTreeSet<i32> = ids.iter().copied().collect();

    let found: BTreeSet<i32> = match kind {
        AttributeKind::Tag => tag::Entity::find()
            .select_only()
            .column(tag::Column::Id)
            .filter(tag::Column::Id.is_in(wanted.iter().copied()))
            .into_tuple::<i32>()
            .all(conn)
            .await?,
        AttributeKind::Ingredient => ingredient::Entity::find()
            .select_only()
            .column(ingredient::Column::Id)
            .filter(ingredient::Column::Id.is_in(wanted.iter().copied()))
            .into_tuple::<i32>()
            .all(conn)
            .await?,
    }
    .into_iter()
    .collect();

    match wanted.difference(&found).next() {
        Some(missing) => Err(AppError::invalid(
            kind.recipe_field(),
            format!("Invalid pk \"{}\" - object does not exist.", missing),
        )),
        None => Ok(()),
    }
}

async fn link_attributes<C: ConnectionTrait>(
    conn: &C,
    kind: AttributeKind,
    recipe_id: i32,
    ids: &[i32],
) -> Result<()> {
    let unique: BTreeSet<i32> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(());
    }

    match kind {
        AttributeKind::Tag => {
            recipe_tag::Entity::insert_many(unique.into_iter().map(|tag_id| {
                recipe_tag::ActiveModel {
                    recipe_id: Set(recipe_id),
                    tag_id: Set(tag_id),
                }
            }))
            .exec_without_returning(conn)
            .await?;
        }
        AttributeKind::Ingredient => {
            recipe_ingredient::Entity::insert_many(unique.into_iter().map(|ingredient_id| {
                recipe_ingredient::ActiveModel {
                    recipe_id: Set(recipe_id),
                    ingredient_id: Set(ingredient_id),
                }
            }))
            .exec_without_returning(conn)
            .await?;
        }
    }
    Ok(())
}

async fn unlink_attributes<C: ConnectionTrait>(
    conn: &C,
    kind: AttributeKind,
    recipe_id: i32,
) -> Result<()> {
    match kind {
        AttributeKind::Tag => {
            recipe_tag::Entity::delete_many()
                .filter(recipe_tag::Column::RecipeId.eq(recipe_id))
                .exec(conn)
                .await?;
        }
        AttributeKind::Ingredient => {
            recipe_ingredient::Entity::delete_many()
                .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
                .exec(conn)
                .await?;
        }
    }
    Ok(())
}
