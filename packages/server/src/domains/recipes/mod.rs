pub mod store;

pub use store::{MemoryRecipeStore, PostgresRecipeStore, RecipeStore, SharedRecipes};
