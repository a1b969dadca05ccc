// ABOUTME: Tests for the storage layer against a throwaway SQLite database
// ABOUTME: Covers accounts, tokens, per-user catalogs, recipe updates, and connection retry

#[cfg(test)]
mod tests {
    use super::super::accounts;
    use super::super::config::Config;
    use super::super::entities::user;
    use super::super::error::AppError;
    use super::super::storage::*;
    use super::super::types::*;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        use sea_orm::Database;
        use sea_orm_migration::MigratorTrait;

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let db = Database::connect(&db_url).await.unwrap();

        crate::migration::Migrator::up(&db, None).await.unwrap();

        let storage = Storage { db };
        (storage, temp_dir)
    }

    async fn create_test_user(storage: &Storage, email: &str) -> user::Model {
        accounts::create_account(
            storage,
            &Config::default(),
            CreateUserRequest {
                email: Some(email.to_string()),
                password: Some("testpass123".to_string()),
                name: Some("Test Name".to_string()),
            },
        )
        .await
        .unwrap()
    }

    async fn create_tag(storage: &Storage, user_id: i32, name: &str) -> i32 {
        storage
            .create_attribute(AttributeKind::Tag, user_id, name.to_string())
            .await
            .unwrap()
            .id
    }

    async fn create_ingredient(storage: &Storage, user_id: i32, name: &str) -> i32 {
        storage
            .create_attribute(AttributeKind::Ingredient, user_id, name.to_string())
            .await
            .unwrap()
            .id
    }

    fn sample_recipe(title: &str) -> NewRecipe {
        NewRecipe {
            title: title.to_string(),
            time_minutes: 10,
            price_cents: 500,
            link: String::new(),
            tags: vec![],
            ingredients: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_account_normalizes_email() {
        let (storage, _temp_dir) = create_test_storage().await;

        let user = create_test_user(&storage, "Test@LONDONAPPDEV.com").await;
        assert_eq!(user.email, "test@londonappdev.com");
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
        assert_ne!(user.password_hash, "testpass123");
    }

    #[tokio::test]
    async fn test_invalid_account_is_not_persisted() {
        let (storage, _temp_dir) = create_test_storage().await;

        let result = accounts::create_account(
            &storage,
            &Config::default(),
            CreateUserRequest {
                email: Some("test@londonappdev.com".to_string()),
                password: Some("pw".to_string()),
                name: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let found = storage
            .find_user_by_email("test@londonappdev.com")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let (storage, _temp_dir) = create_test_storage().await;
        create_test_user(&storage, "test@londonappdev.com").await;

        let result = accounts::create_account(
            &storage,
            &Config::default(),
            CreateUserRequest {
                email: Some("TEST@londonappdev.com".to_string()),
                password: Some("another123".to_string()),
                name: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let found = accounts::authenticate(&storage, "test@londonappdev.com", "testpass123")
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        let wrong = accounts::authenticate(&storage, "test@londonappdev.com", "wrong")
            .await
            .unwrap();
        assert!(wrong.is_none());

        let unknown = accounts::authenticate(&storage, "nobody@londonappdev.com", "testpass123")
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_authenticate() {
        use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let mut model = user.into_active_model();
        model.is_active = Set(false);
        model.update(&storage.db).await.unwrap();

        let found = accounts::authenticate(&storage, "test@londonappdev.com", "testpass123")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_token_is_reused() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let first = storage.get_or_create_token(user.id).await.unwrap();
        let second = storage.get_or_create_token(user.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 40);

        let resolved = storage.user_for_token(&first).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));

        let missing = storage.user_for_token("not-a-token").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_token_insert_race_falls_back_to_existing() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let first = storage.insert_token(user.id).await.unwrap();

        // A second insert for the same user is a conflict, not a database failure
        let result = storage.insert_token(user.id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let (a, b) = tokio::join!(
            storage.get_or_create_token(user.id),
            storage.get_or_create_token(user.id)
        );
        assert_eq!(a.unwrap(), first);
        assert_eq!(b.unwrap(), first);
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_share_one_token() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let (a, b) = tokio::join!(
            storage.get_or_create_token(user.id),
            storage.get_or_create_token(user.id)
        );
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let updated = accounts::update_profile(
            &storage,
            &Config::default(),
            user.id,
            UpdateProfileRequest {
                name: Some("new name".to_string()),
                password: Some("newpassword123".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "new name");

        let found = accounts::authenticate(&storage, "test@londonappdev.com", "newpassword123")
            .await
            .unwrap();
        assert!(found.is_some());

        // Nothing supplied leaves the record untouched
        let same = accounts::update_profile(
            &storage,
            &Config::default(),
            user.id,
            UpdateProfileRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(same, updated);
    }

    #[tokio::test]
    async fn test_tags_are_listed_by_name_descending_per_user() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;
        let other = create_test_user(&storage, "other@londonappdev.com").await;

        create_tag(&storage, user.id, "Dessert").await;
        create_tag(&storage, user.id, "Vegan").await;
        create_tag(&storage, other.id, "Fruity").await;

        let tags = storage
            .list_attributes(AttributeKind::Tag, user.id, false)
            .await
            .unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Vegan", "Dessert"]);

        let other_tags = storage
            .list_attributes(AttributeKind::Tag, other.id, false)
            .await
            .unwrap();
        assert_eq!(other_tags.len(), 1);
        assert_eq!(other_tags[0].name, "Fruity");
    }

    #[tokio::test]
    async fn test_assigned_only_lists_each_ingredient_once() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let eggs = create_ingredient(&storage, user.id, "Eggs").await;
        create_ingredient(&storage, user.id, "Cheese").await;

        for title in ["Eggs benedict", "Coriander eggs on toast"] {
            let mut new = sample_recipe(title);
            new.ingredients = vec![eggs];
            storage.create_recipe(user.id, new).await.unwrap();
        }

        let assigned = storage
            .list_attributes(AttributeKind::Ingredient, user.id, true)
            .await
            .unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, eggs);

        let all = storage
            .list_attributes(AttributeKind::Ingredient, user.id, false)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_assigned_only_lists_each_tag_once() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let breakfast = create_tag(&storage, user.id, "Breakfast").await;
        create_tag(&storage, user.id, "Lunch").await;

        for title in ["Pancakes", "Porridge"] {
            let mut new = sample_recipe(title);
            new.tags = vec![breakfast];
            storage.create_recipe(user.id, new).await.unwrap();
        }

        let assigned = storage
            .list_attributes(AttributeKind::Tag, user.id, true)
            .await
            .unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, breakfast);
        assert_eq!(assigned[0].name, "Breakfast");

        let all = storage
            .list_attributes(AttributeKind::Tag, user.id, false)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_recipes_are_scoped_to_owner() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;
        let other = create_test_user(&storage, "other@londonappdev.com").await;

        let first = storage
            .create_recipe(user.id, sample_recipe("Steak and mushroom sauce"))
            .await
            .unwrap();
        let second = storage
            .create_recipe(user.id, sample_recipe("Fish and chips"))
            .await
            .unwrap();
        let foreign = storage
            .create_recipe(other.id, sample_recipe("Porridge"))
            .await
            .unwrap();

        let recipes = storage.list_recipes(user.id, None, None).await.unwrap();
        let ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(recipes[0].price, Decimal::new(500, 2));

        let result = storage.get_recipe(user.id, foreign.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = storage
            .update_recipe(
                user.id,
                foreign.id,
                RecipeUpdate::Merge(RecipePatch {
                    title: Some("Stolen".to_string()),
                    ..Default::default()
                }),
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let untouched = storage.get_recipe(other.id, foreign.id).await.unwrap();
        assert_eq!(untouched.recipe.title, "Porridge");
    }

    #[tokio::test]
    async fn test_patch_keeps_tags_and_put_clears_them() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let vegan = create_tag(&storage, user.id, "Vegan").await;
        let curry = create_tag(&storage, user.id, "Curry").await;

        let mut new = sample_recipe("Chicken tikka");
        new.tags = vec![vegan];
        let created = storage.create_recipe(user.id, new).await.unwrap();

        let patched = storage
            .update_recipe(
                user.id,
                created.id,
                RecipeUpdate::Merge(RecipePatch {
                    title: Some("Chicken tikka masala".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        assert_eq!(patched.title, "Chicken tikka masala");
        assert_eq!(patched.time_minutes, 10);

        let record = storage.get_recipe(user.id, created.id).await.unwrap();
        assert_eq!(record.tags.len(), 1);
        assert_eq!(record.tags[0].id, vegan);

        storage
            .update_recipe(
                user.id,
                created.id,
                RecipeUpdate::Merge(RecipePatch {
                    tags: Some(vec![curry]),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        let record = storage.get_recipe(user.id, created.id).await.unwrap();
        let tag_ids: Vec<i32> = record.tags.iter().map(|t| t.id).collect();
        assert_eq!(tag_ids, vec![curry]);

        let replaced = storage
            .update_recipe(
                user.id,
                created.id,
                RecipeUpdate::Replace(NewRecipe {
                    title: "Spaghetti carbonara".to_string(),
                    time_minutes: 25,
                    price_cents: 500,
                    link: String::new(),
                    tags: vec![],
                    ingredients: vec![],
                }),
            )
            .await
            .unwrap();
        assert_eq!(replaced.title, "Spaghetti carbonara");
        assert_eq!(replaced.time_minutes, 25);

        let record = storage.get_recipe(user.id, created.id).await.unwrap();
        assert!(record.tags.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tag_rejects_recipe() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let mut new = sample_recipe("Ghost recipe");
        new.tags = vec![9999];
        let result = storage.create_recipe(user.id, new).await;
        match result {
            Err(AppError::Validation(fields)) => assert!(fields.contains_key("tags")),
            other => panic!("unexpected result: {other:?}"),
        }

        let recipes = storage.list_recipes(user.id, None, None).await.unwrap();
        assert!(recipes.is_empty());
    }

    #[tokio::test]
    async fn test_filter_recipes_by_tag_and_ingredient() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;

        let vegan = create_tag(&storage, user.id, "Vegan").await;
        let feta = create_ingredient(&storage, user.id, "Feta cheese").await;

        let mut curry = sample_recipe("Thai vegetable curry");
        curry.tags = vec![vegan];
        let curry = storage.create_recipe(user.id, curry).await.unwrap();

        let mut salad = sample_recipe("Greek salad");
        salad.ingredients = vec![feta];
        let salad = storage.create_recipe(user.id, salad).await.unwrap();

        storage
            .create_recipe(user.id, sample_recipe("Fish and chips"))
            .await
            .unwrap();

        let by_tag = storage
            .list_recipes(user.id, Some(vec![vegan]), None)
            .await
            .unwrap();
        assert_eq!(by_tag.iter().map(|r| r.id).collect::<Vec<_>>(), vec![curry.id]);

        let by_ingredient = storage
            .list_recipes(user.id, None, Some(vec![feta]))
            .await
            .unwrap();
        assert_eq!(
            by_ingredient.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![salad.id]
        );
    }

    #[tokio::test]
    async fn test_delete_recipe() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;
        let vegan = create_tag(&storage, user.id, "Vegan").await;

        let mut new = sample_recipe("Lentil soup");
        new.tags = vec![vegan];
        let created = storage.create_recipe(user.id, new).await.unwrap();

        let removed = storage.delete_recipe(user.id, created.id).await.unwrap();
        assert_eq!(removed.id, created.id);

        let result = storage.get_recipe(user.id, created.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        // The tag outlives the recipe but is no longer assigned
        let assigned = storage
            .list_attributes(AttributeKind::Tag, user.id, true)
            .await
            .unwrap();
        assert!(assigned.is_empty());
    }

    #[tokio::test]
    async fn test_set_recipe_image() {
        let (storage, _temp_dir) = create_test_storage().await;
        let user = create_test_user(&storage, "test@londonappdev.com").await;
        let other = create_test_user(&storage, "other@londonappdev.com").await;
        let created = storage
            .create_recipe(user.id, sample_recipe("Pancakes"))
            .await
            .unwrap();

        let (updated, previous) = storage
            .set_recipe_image(user.id, created.id, "uploads/recipe/a.png".to_string())
            .await
            .unwrap();
        assert_eq!(updated.image.as_deref(), Some("uploads/recipe/a.png"));
        assert_eq!(previous, None);

        let (updated, previous) = storage
            .set_recipe_image(user.id, created.id, "uploads/recipe/c.png".to_string())
            .await
            .unwrap();
        assert_eq!(updated.image.as_deref(), Some("uploads/recipe/c.png"));
        assert_eq!(previous.as_deref(), Some("uploads/recipe/a.png"));

        let result = storage
            .set_recipe_image(other.id, created.id, "uploads/recipe/b.png".to_string())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ensure_superuser_is_idempotent() {
        let (storage, _temp_dir) = create_test_storage().await;

        let created = accounts::ensure_superuser(&storage, "Admin@Example.com", "adminpass")
            .await
            .unwrap();
        assert!(created);

        let again = accounts::ensure_superuser(&storage, "admin@example.com", "adminpass")
            .await
            .unwrap();
        assert!(!again);

        let admin = storage
            .find_user_by_email("admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(admin.is_staff);
        assert!(admin.is_superuser);
    }

    #[tokio::test]
    async fn test_connect_with_retry() {
        let temp_dir = TempDir::new().unwrap();

        let db_url = format!(
            "sqlite:{}?mode=rwc",
            temp_dir.path().join("ready.db").display()
        );
        let storage = Storage::connect_with_retry(&db_url, 3, Duration::from_millis(10))
            .await
            .unwrap();
        let user = create_test_user(&storage, "test@londonappdev.com").await;
        assert!(user.id > 0);

        let unreachable = format!(
            "sqlite:{}?mode=rwc",
            temp_dir.path().join("missing").join("db.sqlite").display()
        );
        let result = Storage::connect_with_retry(&unreachable, 2, Duration::from_millis(10)).await;
        assert!(result.is_err());
    }
}
