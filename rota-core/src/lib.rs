//! Core domain logic for the review-rota service.
//!
//! This crate is pure business logic over an injected [`storage::Storage`]
//! trait. The design separates:
//! - **Models**: what the system tracks (teams, users, pull requests)
//! - **Assignment**: how reviewers are selected and replaced
//! - **Service**: lifecycle rules (uniqueness, open/merged transitions)
//! - **Storage**: the persistence contract, with an in-memory backend
//!
//! Delivery (HTTP) and durable persistence (SQLite) live in `rota-server`.

pub mod assignment;
pub mod error;
pub mod models;
pub mod service;
pub mod storage;

pub use error::{DomainError, ErrorCode, ServiceError};
pub use service::Service;
pub use storage::{InMemoryStorage, Storage, StorageError};
