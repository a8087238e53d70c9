//! Domain types for application automation.

pub mod ats;
pub mod field;
pub mod fill;
pub mod profile;
pub mod recipe;

pub use ats::AtsType;
pub use field::{ExtractedField, ExtractedForm, FieldKind, FieldOption};
pub use fill::{FieldOutcome, FieldValue, FieldValues, FillResult};
pub use profile::{PreAnswered, UserProfile};
pub use recipe::{Recipe, RecipeExecution, RecipeStep, ReplayOutcome, StepAction};
