//! Storage abstraction for the review-rota domain.
//!
//! This module defines the `Storage` trait that abstracts persistence
//! for teams, users, and pull requests. Implementations can provide
//! different backends; the in-memory one lives here, the SQLite one in
//! `rota-server`.

mod memory;

pub use memory::InMemoryStorage;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{PullRequest, PullRequestShort, Statistics, Team, User};

/// A storage-layer failure, tagged with the operation that failed.
///
/// Storage errors are not domain outcomes: the service either
/// propagates them unchanged (surfaced as internal errors by the
/// delivery layer) or, for review-count lookups only, degrades to
/// random reviewer selection.
#[derive(Debug, Clone, Error)]
#[error("storage error during {operation}: {detail}")]
pub struct StorageError {
    pub operation: String,
    pub detail: String,
}

impl StorageError {
    pub fn new(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        StorageError {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

/// Persistence contract consumed by the service and assignment engine.
///
/// Consistency expectations:
/// - `create_team` persists the team row and upserts every member
///   atomically (all-or-nothing).
/// - `update_pull_request` is a single-row replace.
/// - Reads are at least read-committed with respect to prior writes
///   through the same storage handle.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a new team and upsert its members (insert-or-update by
    /// user id, reassigning team membership).
    async fn create_team(&self, team: &Team) -> Result<(), StorageError>;

    /// Get a team with its current member list, sorted by user id.
    /// Returns `None` if no such team exists.
    async fn get_team(&self, team_name: &str) -> Result<Option<Team>, StorageError>;

    async fn team_exists(&self, team_name: &str) -> Result<bool, StorageError>;

    async fn create_user(&self, user: &User) -> Result<(), StorageError>;

    async fn update_user(&self, user: &User) -> Result<(), StorageError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StorageError>;

    async fn users_by_team(&self, team_name: &str) -> Result<Vec<User>, StorageError>;

    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), StorageError>;

    async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, StorageError>;

    async fn update_pull_request(&self, pr: &PullRequest) -> Result<(), StorageError>;

    async fn pull_request_exists(&self, pr_id: &str) -> Result<bool, StorageError>;

    /// All PRs where the user appears as a reviewer, newest first.
    async fn pull_requests_by_reviewer(
        &self,
        user_id: &str,
    ) -> Result<Vec<PullRequestShort>, StorageError>;

    /// Open-PR review counts for the given users. Ids with no open
    /// assignments are present in the result with a count of 0.
    async fn open_review_counts(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, u32>, StorageError>;

    /// Aggregate counters across teams, users, and pull requests.
    async fn statistics(&self) -> Result<Statistics, StorageError>;
}
