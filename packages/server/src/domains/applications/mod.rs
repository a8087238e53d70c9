pub mod model;
pub mod service;
pub mod store;

pub use model::{Application, ApplicationStatus, ApplyMethod};
pub use service::{ApplyError, ApplyRequest, ApplyService};
pub use store::{
    ApplicationStore, AttemptOutcome, MemoryApplicationStore, OutcomeKind,
    PostgresApplicationStore, RecipeUpdate,
};
