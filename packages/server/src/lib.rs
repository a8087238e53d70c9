// Applyline - Application Submission Core
//
// Backend for automated job-application submission: a durable job queue
// feeding a fixed pool of browser-owning workers, with AI and recipe
// fill strategies from the automation library.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
