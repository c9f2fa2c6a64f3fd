//! Entity lifecycle service.
//!
//! Enforces creation uniqueness, active/inactive toggling, and the
//! open-to-merged transition, delegating reviewer selection to the
//! assignment engine and all durable state to the [`Storage`]
//! collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tracing::info;

use crate::assignment;
use crate::error::{DomainError, ErrorCode, ServiceError};
use crate::models::{PullRequest, PullRequestShort, PullRequestStatus, Statistics, Team, User};
use crate::storage::Storage;

/// Stateless lifecycle logic over an injected storage backend.
///
/// The only in-process state is a map of per-PR mutexes: mutations of a
/// pull request's reviewer list are read-modify-write, so concurrent
/// reassignments (or a reassignment racing a merge) of the same PR are
/// serialized within this process. Cross-process callers still rely on
/// storage-level atomicity of the single-row update.
pub struct Service {
    storage: Arc<dyn Storage>,
    pr_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Service {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Service {
            storage,
            pr_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh entropy-seeded generator per call, so there is no shared
    /// mutable RNG state between concurrent requests.
    fn rng() -> StdRng {
        StdRng::from_entropy()
    }

    async fn pr_lock(&self, pr_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.pr_locks.lock().await;
        locks
            .entry(pr_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry for `pr_id` once no task holds the lock any
    /// more, so ids passed in (including ones that never existed) do
    /// not accumulate. Callers must release their own `Arc` clone
    /// first; a concurrent holder keeps the count above one and the
    /// entry stays.
    async fn release_pr_lock(&self, pr_id: &str) {
        let mut locks = self.pr_locks.lock().await;
        if let Some(lock) = locks.get(pr_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(pr_id);
            }
        }
    }

    #[cfg(test)]
    async fn tracked_pr_locks(&self) -> usize {
        self.pr_locks.lock().await.len()
    }

    /// Create a team and upsert its members. Fails with `TEAM_EXISTS`
    /// if the name is taken. Returns the team as persisted, members
    /// sorted by user id.
    pub async fn create_team(&self, team: Team) -> Result<Team, ServiceError> {
        if self.storage.team_exists(&team.team_name).await? {
            return Err(DomainError::new(
                ErrorCode::TeamExists,
                "team_name already exists",
            )
            .into());
        }

        self.storage.create_team(&team).await?;
        info!(team = %team.team_name, members = team.members.len(), "team created");

        self.storage
            .get_team(&team.team_name)
            .await?
            .ok_or_else(|| DomainError::not_found("team not found").into())
    }

    pub async fn get_team(&self, team_name: &str) -> Result<Team, ServiceError> {
        self.storage
            .get_team(team_name)
            .await?
            .ok_or_else(|| DomainError::not_found("team not found").into())
    }

    /// Toggle a user's active flag. Does not cascade to existing
    /// reviewer assignments.
    pub async fn set_user_active(
        &self,
        user_id: &str,
        is_active: bool,
    ) -> Result<User, ServiceError> {
        let mut user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user not found"))?;

        user.is_active = is_active;
        self.storage.update_user(&user).await?;
        info!(user = %user_id, is_active, "user activity updated");
        Ok(user)
    }

    /// PRs where the user is a reviewer, newest first. An unknown user
    /// yields an empty list, not an error.
    pub async fn get_user_reviews(
        &self,
        user_id: &str,
    ) -> Result<Vec<PullRequestShort>, ServiceError> {
        if self.storage.get_user(user_id).await?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self.storage.pull_requests_by_reviewer(user_id).await?)
    }

    /// Create an open PR and assign up to two reviewers from the
    /// author's team, least-loaded first.
    pub async fn create_pull_request(
        &self,
        pr_id: &str,
        pr_name: &str,
        author_id: &str,
    ) -> Result<PullRequest, ServiceError> {
        if self.storage.pull_request_exists(pr_id).await? {
            return Err(DomainError::new(ErrorCode::PrExists, "PR id already exists").into());
        }

        let author = self
            .storage
            .get_user(author_id)
            .await?
            .ok_or_else(|| DomainError::not_found("author not found"))?;

        let team_members = self.storage.users_by_team(&author.team_name).await?;
        let reviewers =
            assignment::select_reviewers(self.storage.as_ref(), &team_members, author_id, &mut Self::rng())
                .await;

        let pr = PullRequest {
            pull_request_id: pr_id.to_string(),
            pull_request_name: pr_name.to_string(),
            author_id: author_id.to_string(),
            status: PullRequestStatus::Open,
            assigned_reviewers: reviewers,
            created_at: Some(Utc::now()),
            merged_at: None,
        };
        self.storage.create_pull_request(&pr).await?;
        info!(
            pr = %pr_id,
            author = %author_id,
            reviewers = ?pr.assigned_reviewers,
            "pull request created"
        );
        Ok(pr)
    }

    /// Merge a PR. Merging an already-merged PR is a no-op success and
    /// leaves the original merge timestamp untouched.
    pub async fn merge_pull_request(&self, pr_id: &str) -> Result<PullRequest, ServiceError> {
        let lock = self.pr_lock(pr_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.merge_locked(pr_id).await
        };
        drop(lock);
        self.release_pr_lock(pr_id).await;
        result
    }

    async fn merge_locked(&self, pr_id: &str) -> Result<PullRequest, ServiceError> {
        let mut pr = self
            .storage
            .get_pull_request(pr_id)
            .await?
            .ok_or_else(|| DomainError::not_found("PR not found"))?;

        if pr.status == PullRequestStatus::Merged {
            return Ok(pr);
        }

        pr.status = PullRequestStatus::Merged;
        pr.merged_at = Some(Utc::now());
        self.storage.update_pull_request(&pr).await?;
        info!(pr = %pr_id, "pull request merged");
        Ok(pr)
    }

    /// Replace `old_reviewer_id` on an open PR with an eligible
    /// teammate, preserving the reviewer's position in the list.
    /// Returns the updated PR and the replacement's id.
    pub async fn reassign_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
    ) -> Result<(PullRequest, String), ServiceError> {
        let lock = self.pr_lock(pr_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.reassign_locked(pr_id, old_reviewer_id).await
        };
        drop(lock);
        self.release_pr_lock(pr_id).await;
        result
    }

    async fn reassign_locked(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
    ) -> Result<(PullRequest, String), ServiceError> {
        let mut pr = self
            .storage
            .get_pull_request(pr_id)
            .await?
            .ok_or_else(|| DomainError::not_found("PR not found"))?;

        if pr.status == PullRequestStatus::Merged {
            return Err(DomainError::new(
                ErrorCode::PrMerged,
                "cannot reassign on merged PR",
            )
            .into());
        }

        let position = pr
            .assigned_reviewers
            .iter()
            .position(|r| r == old_reviewer_id)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::NotAssigned,
                    "reviewer is not assigned to this PR",
                )
            })?;

        let old_reviewer = self
            .storage
            .get_user(old_reviewer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("old reviewer not found"))?;

        let team_members = self.storage.users_by_team(&old_reviewer.team_name).await?;
        let new_reviewer_id = assignment::select_replacement(
            self.storage.as_ref(),
            &team_members,
            &pr.author_id,
            &pr.assigned_reviewers,
            &mut Self::rng(),
        )
        .await?;

        pr.assigned_reviewers[position] = new_reviewer_id.clone();
        self.storage.update_pull_request(&pr).await?;
        info!(
            pr = %pr_id,
            old = %old_reviewer_id,
            new = %new_reviewer_id,
            "reviewer reassigned"
        );
        Ok((pr, new_reviewer_id))
    }

    pub async fn statistics(&self) -> Result<Statistics, ServiceError> {
        Ok(self.storage.statistics().await?)
    }
}
