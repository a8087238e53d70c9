pub mod applications;
pub mod health;

pub use applications::{
    cancel_application_handler, create_application_handler, get_application_handler,
};
pub use health::health_handler;
