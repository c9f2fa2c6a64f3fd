//! In-memory implementation of `Storage`.
//!
//! All state is held in memory and lost on restart. Used by core tests
//! and available as a backend for ephemeral deployments.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageError};
use crate::models::{
    PullRequest, PullRequestShort, PullRequestStatus, ReviewerStats, Statistics, Team, TeamMember,
    User,
};

/// In-memory storage backend.
///
/// Tables are `HashMap`s protected by `RwLock`s. Team membership is
/// derived from the users table, so a team row is just its name.
pub struct InMemoryStorage {
    teams: RwLock<HashSet<String>>,
    users: RwLock<HashMap<String, User>>,
    pull_requests: RwLock<HashMap<String, PullRequest>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            teams: RwLock::new(HashSet::new()),
            users: RwLock::new(HashMap::new()),
            pull_requests: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_team(&self, team: &Team) -> Result<(), StorageError> {
        // Hold both write locks so the team row and member upserts are
        // atomic with respect to concurrent readers.
        let mut teams = self.teams.write().await;
        let mut users = self.users.write().await;
        teams.insert(team.team_name.clone());
        for member in &team.members {
            users.insert(
                member.user_id.clone(),
                User {
                    user_id: member.user_id.clone(),
                    username: member.username.clone(),
                    team_name: team.team_name.clone(),
                    is_active: member.is_active,
                },
            );
        }
        Ok(())
    }

    async fn get_team(&self, team_name: &str) -> Result<Option<Team>, StorageError> {
        let teams = self.teams.read().await;
        if !teams.contains(team_name) {
            return Ok(None);
        }
        let users = self.users.read().await;
        let mut members: Vec<TeamMember> = users
            .values()
            .filter(|u| u.team_name == team_name)
            .map(|u| TeamMember {
                user_id: u.user_id.clone(),
                username: u.username.clone(),
                is_active: u.is_active,
            })
            .collect();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(Some(Team {
            team_name: team_name.to_string(),
            members,
        }))
    }

    async fn team_exists(&self, team_name: &str) -> Result<bool, StorageError> {
        let teams = self.teams.read().await;
        Ok(teams.contains(team_name))
    }

    async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        let mut users = self.users.write().await;
        users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let mut users = self.users.write().await;
        users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StorageError> {
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }

    async fn users_by_team(&self, team_name: &str) -> Result<Vec<User>, StorageError> {
        let users = self.users.read().await;
        let mut members: Vec<User> = users
            .values()
            .filter(|u| u.team_name == team_name)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(members)
    }

    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), StorageError> {
        let mut prs = self.pull_requests.write().await;
        prs.insert(pr.pull_request_id.clone(), pr.clone());
        Ok(())
    }

    async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, StorageError> {
        let prs = self.pull_requests.read().await;
        Ok(prs.get(pr_id).cloned())
    }

    async fn update_pull_request(&self, pr: &PullRequest) -> Result<(), StorageError> {
        let mut prs = self.pull_requests.write().await;
        prs.insert(pr.pull_request_id.clone(), pr.clone());
        Ok(())
    }

    async fn pull_request_exists(&self, pr_id: &str) -> Result<bool, StorageError> {
        let prs = self.pull_requests.read().await;
        Ok(prs.contains_key(pr_id))
    }

    async fn pull_requests_by_reviewer(
        &self,
        user_id: &str,
    ) -> Result<Vec<PullRequestShort>, StorageError> {
        let prs = self.pull_requests.read().await;
        let mut assigned: Vec<&PullRequest> = prs
            .values()
            .filter(|pr| pr.assigned_reviewers.iter().any(|r| r == user_id))
            .collect();
        // Newest first; PRs without a creation timestamp sort last.
        assigned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assigned.into_iter().map(PullRequestShort::from).collect())
    }

    async fn open_review_counts(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, u32>, StorageError> {
        let prs = self.pull_requests.read().await;
        let mut counts: HashMap<String, u32> =
            user_ids.iter().map(|id| (id.clone(), 0)).collect();
        for pr in prs.values() {
            if pr.status != PullRequestStatus::Open {
                continue;
            }
            for reviewer in &pr.assigned_reviewers {
                if let Some(count) = counts.get_mut(reviewer) {
                    *count += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn statistics(&self) -> Result<Statistics, StorageError> {
        let teams = self.teams.read().await;
        let users = self.users.read().await;
        let prs = self.pull_requests.read().await;

        let open_prs = prs
            .values()
            .filter(|pr| pr.status == PullRequestStatus::Open)
            .count() as u64;

        // (open, completed) review counts per user id.
        let mut reviews: HashMap<&str, (u64, u64)> = HashMap::new();
        for pr in prs.values() {
            for reviewer in &pr.assigned_reviewers {
                let entry = reviews.entry(reviewer).or_default();
                match pr.status {
                    PullRequestStatus::Open => entry.0 += 1,
                    PullRequestStatus::Merged => entry.1 += 1,
                }
            }
        }

        let mut top_reviewers: Vec<ReviewerStats> = reviews
            .into_iter()
            .map(|(user_id, (open, completed))| ReviewerStats {
                user_id: user_id.to_string(),
                username: users
                    .get(user_id)
                    .map(|u| u.username.clone())
                    .unwrap_or_default(),
                open_reviews: open,
                completed_reviews: completed,
                total_reviews: open + completed,
            })
            .collect();
        top_reviewers.sort_by(|a, b| {
            b.total_reviews
                .cmp(&a.total_reviews)
                .then(b.open_reviews.cmp(&a.open_reviews))
                .then(a.user_id.cmp(&b.user_id))
        });
        top_reviewers.truncate(10);

        Ok(Statistics {
            total_teams: teams.len() as u64,
            total_users: users.len() as u64,
            active_users: users.values().filter(|u| u.is_active).count() as u64,
            total_prs: prs.len() as u64,
            open_prs,
            merged_prs: prs.len() as u64 - open_prs,
            top_reviewers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(id: &str, team: &str, active: bool) -> User {
        User {
            user_id: id.to_string(),
            username: format!("user {id}"),
            team_name: team.to_string(),
            is_active: active,
        }
    }

    fn open_pr(id: &str, author: &str, reviewers: &[&str]) -> PullRequest {
        PullRequest {
            pull_request_id: id.to_string(),
            pull_request_name: format!("PR {id}"),
            author_id: author.to_string(),
            status: PullRequestStatus::Open,
            assigned_reviewers: reviewers.iter().map(|r| r.to_string()).collect(),
            created_at: Some(Utc::now()),
            merged_at: None,
        }
    }

    #[tokio::test]
    async fn get_team_returns_none_for_missing() {
        let storage = InMemoryStorage::new();
        assert!(storage.get_team("backend").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_team_upserts_members_and_sorts_by_user_id() {
        let storage = InMemoryStorage::new();
        storage
            .create_team(&Team {
                team_name: "backend".to_string(),
                members: vec![
                    TeamMember {
                        user_id: "u2".to_string(),
                        username: "Bea".to_string(),
                        is_active: true,
                    },
                    TeamMember {
                        user_id: "u1".to_string(),
                        username: "Ada".to_string(),
                        is_active: false,
                    },
                ],
            })
            .await
            .unwrap();

        let team = storage.get_team("backend").await.unwrap().unwrap();
        let ids: Vec<&str> = team.members.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert!(storage.team_exists("backend").await.unwrap());
    }

    #[tokio::test]
    async fn team_creation_reassigns_existing_users() {
        let storage = InMemoryStorage::new();
        storage.create_user(&user("u1", "old-team", true)).await.unwrap();
        storage
            .create_team(&Team {
                team_name: "new-team".to_string(),
                members: vec![TeamMember {
                    user_id: "u1".to_string(),
                    username: "Ada".to_string(),
                    is_active: true,
                }],
            })
            .await
            .unwrap();

        let moved = storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(moved.team_name, "new-team");
    }

    #[tokio::test]
    async fn open_review_counts_defaults_to_zero() {
        let storage = InMemoryStorage::new();
        storage
            .create_pull_request(&open_pr("pr-1", "u1", &["u2", "u3"]))
            .await
            .unwrap();
        let mut merged = open_pr("pr-2", "u1", &["u2"]);
        merged.status = PullRequestStatus::Merged;
        storage.create_pull_request(&merged).await.unwrap();

        let counts = storage
            .open_review_counts(&["u2".to_string(), "u3".to_string(), "u4".to_string()])
            .await
            .unwrap();
        assert_eq!(counts["u2"], 1);
        assert_eq!(counts["u3"], 1);
        assert_eq!(counts["u4"], 0);
    }

    #[tokio::test]
    async fn reviewer_listing_is_newest_first() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        let mut older = open_pr("pr-old", "u1", &["u2"]);
        older.created_at = Some(now - Duration::hours(2));
        let mut newer = open_pr("pr-new", "u1", &["u2"]);
        newer.created_at = Some(now);
        storage.create_pull_request(&older).await.unwrap();
        storage.create_pull_request(&newer).await.unwrap();

        let listed = storage.pull_requests_by_reviewer("u2").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|p| p.pull_request_id.as_str()).collect();
        assert_eq!(ids, vec!["pr-new", "pr-old"]);
    }

    #[tokio::test]
    async fn statistics_counts_and_ranks_reviewers() {
        let storage = InMemoryStorage::new();
        storage.create_user(&user("u2", "backend", true)).await.unwrap();
        storage.create_user(&user("u3", "backend", false)).await.unwrap();
        storage
            .create_pull_request(&open_pr("pr-1", "u1", &["u2", "u3"]))
            .await
            .unwrap();
        let mut merged = open_pr("pr-2", "u1", &["u2"]);
        merged.status = PullRequestStatus::Merged;
        storage.create_pull_request(&merged).await.unwrap();

        let stats = storage.statistics().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_prs, 2);
        assert_eq!(stats.open_prs, 1);
        assert_eq!(stats.merged_prs, 1);
        assert_eq!(stats.top_reviewers[0].user_id, "u2");
        assert_eq!(stats.top_reviewers[0].total_reviews, 2);
        assert_eq!(stats.top_reviewers[0].open_reviews, 1);
    }
}
