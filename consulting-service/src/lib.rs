pub mod config;
pub mod models;
pub mod service;

pub use config::{AppConfig, create_services, create_session_storage};
pub use service::{AppState, build_router};
