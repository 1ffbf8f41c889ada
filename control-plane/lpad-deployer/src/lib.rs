pub mod chart;
pub mod config;
pub mod errors;
pub mod hub;
pub mod installer;
pub mod lifecycle;
pub mod metadata;
pub mod readiness;
pub mod resolver;
pub mod stream;
pub mod web;

pub use config::DeployerConfig;
pub use errors::DeployerError;
pub use hub::EventHub;
pub use lifecycle::{ServiceLifecycle, StartRequest, StartResponse};
pub use web::{ApiServer, AppState};
