pub mod jobs;
pub mod runner;

pub use runner::{ApplicationRunner, RunDecision, AI_ATTEMPT_COST, RECIPE_ATTEMPT_COST};
