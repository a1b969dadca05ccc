// ABOUTME: SeaORM entities module for database models and relationships
// ABOUTME: Exports entity definitions for users, tokens, tags, ingredients, and recipes

pub mod ingredient;
pub mod recipe;
pub mod recipe_ingredient;
pub mod recipe_tag;
pub mod tag;
pub mod token;
pub mod user;

pub use ingredient::Entity as Ingredient;
pub use recipe::Entity as Recipe;
pub use recipe_ingredient::Entity as RecipeIngredient;
pub use recipe_tag::Entity as RecipeTag;
pub use tag::Entity as Tag;
pub use token::Entity as Token;
pub use user::Entity as User;
