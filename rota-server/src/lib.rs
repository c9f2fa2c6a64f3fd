//! HTTP delivery and durable persistence for the review-rota service.

pub mod config;
pub mod db;
pub mod handlers;

pub use handlers::{router, AppState};
