//! SQLite implementation of the core `Storage` trait.
//!
//! Provides persistent storage that survives service restarts. Uses
//! `tokio::task::spawn_blocking` to run synchronous rusqlite operations
//! without blocking the async runtime.
//!
//! # Schema versioning
//!
//! The database has a `schema_version` table. When the schema changes,
//! increment `CURRENT_SCHEMA_VERSION` and add a migration in
//! `run_migrations()`.
//!
//! Reviewer lists are stored as a JSON array column and queried through
//! SQLite's `json_each`, which keeps the reviewer-membership and
//! open-review-count queries single statements.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use rota_core::models::{
    PullRequest, PullRequestShort, PullRequestStatus, ReviewerStats, Statistics, Team, TeamMember,
    User,
};
use rota_core::storage::{Storage, StorageError};

/// Current schema version. Increment when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed storage.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage at the given path.
    ///
    /// Creates the database file and schema if they don't exist. The
    /// connection is configured with WAL journaling (verified, since
    /// SQLite can silently keep rollback mode on some filesystems) and
    /// a busy timeout for concurrent access.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();

        if path_str != ":memory:" && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StorageError::new(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| StorageError::new("open database", e.to_string()))?;

        let is_in_memory = path_str == ":memory:";
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StorageError::new("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(StorageError::new(
                "configure journal_mode",
                format!("expected WAL mode, SQLite reports '{journal_mode}'"),
            ));
        }

        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(|e| StorageError::new("set busy_timeout", e.to_string()))?;

        Self::run_migrations(&conn)?;

        Ok(SqliteStorage {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, for tests and ephemeral deployments.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS teams (
                team_name TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS users (
                user_id   TEXT PRIMARY KEY,
                username  TEXT NOT NULL,
                team_name TEXT NOT NULL,
                is_active INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_team ON users(team_name);

            CREATE TABLE IF NOT EXISTS pull_requests (
                pull_request_id    TEXT PRIMARY KEY,
                pull_request_name  TEXT NOT NULL,
                author_id          TEXT NOT NULL,
                status             TEXT NOT NULL,
                assigned_reviewers TEXT NOT NULL,
                created_at         TEXT,
                merged_at          TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_prs_status ON pull_requests(status);
            "#,
        )
        .map_err(|e| StorageError::new("create schema", e.to_string()))?;

        let version: Option<i64> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| StorageError::new("read schema version", e.to_string()))?;

        match version {
            None => {
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![CURRENT_SCHEMA_VERSION],
                )
                .map_err(|e| StorageError::new("write schema version", e.to_string()))?;
            }
            Some(v) if v == CURRENT_SCHEMA_VERSION => {}
            Some(v) if v < CURRENT_SCHEMA_VERSION => {
                // Sequential migrations go here as the schema evolves.
                warn!(from = v, to = CURRENT_SCHEMA_VERSION, "migrating schema");
                conn.execute(
                    "UPDATE schema_version SET version = ?1",
                    params![CURRENT_SCHEMA_VERSION],
                )
                .map_err(|e| StorageError::new("write schema version", e.to_string()))?;
            }
            Some(v) => {
                return Err(StorageError::new(
                    "check schema version",
                    format!("database schema version {v} is newer than supported {CURRENT_SCHEMA_VERSION}"),
                ));
            }
        }

        Ok(())
    }

    /// Run a blocking closure against the connection on the blocking
    /// thread pool, tagging failures with the operation name.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StorageError::new(operation, "connection mutex poisoned"))?;
            f(&mut conn).map_err(|e| StorageError::new(operation, e.to_string()))
        })
        .await
        .map_err(|e| StorageError::new(operation, format!("blocking task failed: {e}")))?
    }
}

fn conversion_err(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_status(index: usize, raw: &str) -> rusqlite::Result<PullRequestStatus> {
    match raw {
        "OPEN" => Ok(PullRequestStatus::Open),
        "MERGED" => Ok(PullRequestStatus::Merged),
        other => Err(conversion_err(index, format!("unknown PR status '{other}'"))),
    }
}

fn parse_reviewers(index: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| conversion_err(index, format!("invalid reviewer list: {e}")))
}

fn parse_timestamp(index: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_err(index, format!("invalid timestamp '{text}': {e}"))),
    }
}

fn reviewers_json(reviewers: &[String]) -> rusqlite::Result<String> {
    serde_json::to_string(reviewers)
        .map_err(|e| conversion_err(0, format!("cannot encode reviewer list: {e}")))
}

fn timestamp_text(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|dt| dt.to_rfc3339())
}

fn row_to_pull_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<PullRequest> {
    let status: String = row.get(3)?;
    let reviewers: String = row.get(4)?;
    let created_at: Option<String> = row.get(5)?;
    let merged_at: Option<String> = row.get(6)?;
    Ok(PullRequest {
        pull_request_id: row.get(0)?,
        pull_request_name: row.get(1)?,
        author_id: row.get(2)?,
        status: parse_status(3, &status)?,
        assigned_reviewers: parse_reviewers(4, &reviewers)?,
        created_at: parse_timestamp(5, created_at)?,
        merged_at: parse_timestamp(6, merged_at)?,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_team(&self, team: &Team) -> Result<(), StorageError> {
        let team = team.clone();
        self.with_conn("create_team", move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO teams (team_name) VALUES (?1)",
                params![team.team_name],
            )?;
            for member in &team.members {
                tx.execute(
                    r#"INSERT INTO users (user_id, username, team_name, is_active)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(user_id) DO UPDATE SET
                           username = excluded.username,
                           team_name = excluded.team_name,
                           is_active = excluded.is_active"#,
                    params![
                        member.user_id,
                        member.username,
                        team.team_name,
                        member.is_active
                    ],
                )?;
            }
            tx.commit()
        })
        .await
    }

    async fn get_team(&self, team_name: &str) -> Result<Option<Team>, StorageError> {
        let team_name = team_name.to_string();
        self.with_conn("get_team", move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = ?1)",
                params![team_name],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(None);
            }

            let mut stmt = conn.prepare(
                "SELECT user_id, username, is_active FROM users
                 WHERE team_name = ?1 ORDER BY user_id",
            )?;
            let members = stmt
                .query_map(params![team_name], |row| {
                    Ok(TeamMember {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        is_active: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Some(Team { team_name, members }))
        })
        .await
    }

    async fn team_exists(&self, team_name: &str) -> Result<bool, StorageError> {
        let team_name = team_name.to_string();
        self.with_conn("team_exists", move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = ?1)",
                params![team_name],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        let user = user.clone();
        self.with_conn("create_user", move |conn| {
            conn.execute(
                "INSERT INTO users (user_id, username, team_name, is_active)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user.user_id, user.username, user.team_name, user.is_active],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let user = user.clone();
        self.with_conn("update_user", move |conn| {
            conn.execute(
                "UPDATE users SET username = ?1, team_name = ?2, is_active = ?3
                 WHERE user_id = ?4",
                params![user.username, user.team_name, user.is_active, user.user_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StorageError> {
        let user_id = user_id.to_string();
        self.with_conn("get_user", move |conn| {
            conn.query_row(
                "SELECT user_id, username, team_name, is_active FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        team_name: row.get(2)?,
                        is_active: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn users_by_team(&self, team_name: &str) -> Result<Vec<User>, StorageError> {
        let team_name = team_name.to_string();
        self.with_conn("users_by_team", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, team_name, is_active FROM users
                 WHERE team_name = ?1 ORDER BY user_id",
            )?;
            let users = stmt
                .query_map(params![team_name], |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        team_name: row.get(2)?,
                        is_active: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
        .await
    }

    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), StorageError> {
        let pr = pr.clone();
        self.with_conn("create_pull_request", move |conn| {
            let reviewers = reviewers_json(&pr.assigned_reviewers)?;
            conn.execute(
                r#"INSERT INTO pull_requests
                   (pull_request_id, pull_request_name, author_id, status,
                    assigned_reviewers, created_at, merged_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                params![
                    pr.pull_request_id,
                    pr.pull_request_name,
                    pr.author_id,
                    pr.status.as_str(),
                    reviewers,
                    timestamp_text(&pr.created_at),
                    timestamp_text(&pr.merged_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, StorageError> {
        let pr_id = pr_id.to_string();
        self.with_conn("get_pull_request", move |conn| {
            conn.query_row(
                r#"SELECT pull_request_id, pull_request_name, author_id, status,
                          assigned_reviewers, created_at, merged_at
                   FROM pull_requests WHERE pull_request_id = ?1"#,
                params![pr_id],
                row_to_pull_request,
            )
            .optional()
        })
        .await
    }

    async fn update_pull_request(&self, pr: &PullRequest) -> Result<(), StorageError> {
        let pr = pr.clone();
        self.with_conn("update_pull_request", move |conn| {
            let reviewers = reviewers_json(&pr.assigned_reviewers)?;
            conn.execute(
                r#"UPDATE pull_requests
                   SET pull_request_name = ?1, author_id = ?2, status = ?3,
                       assigned_reviewers = ?4, merged_at = ?5
                   WHERE pull_request_id = ?6"#,
                params![
                    pr.pull_request_name,
                    pr.author_id,
                    pr.status.as_str(),
                    reviewers,
                    timestamp_text(&pr.merged_at),
                    pr.pull_request_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn pull_request_exists(&self, pr_id: &str) -> Result<bool, StorageError> {
        let pr_id = pr_id.to_string();
        self.with_conn("pull_request_exists", move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM pull_requests WHERE pull_request_id = ?1)",
                params![pr_id],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn pull_requests_by_reviewer(
        &self,
        user_id: &str,
    ) -> Result<Vec<PullRequestShort>, StorageError> {
        let user_id = user_id.to_string();
        self.with_conn("pull_requests_by_reviewer", move |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT pull_request_id, pull_request_name, author_id, status
                   FROM pull_requests
                   WHERE EXISTS (
                       SELECT 1 FROM json_each(pull_requests.assigned_reviewers)
                       WHERE json_each.value = ?1
                   )
                   ORDER BY created_at DESC"#,
            )?;
            let prs = stmt
                .query_map(params![user_id], |row| {
                    let status: String = row.get(3)?;
                    Ok(PullRequestShort {
                        pull_request_id: row.get(0)?,
                        pull_request_name: row.get(1)?,
                        author_id: row.get(2)?,
                        status: parse_status(3, &status)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(prs)
        })
        .await
    }

    async fn open_review_counts(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, u32>, StorageError> {
        let user_ids = user_ids.to_vec();
        self.with_conn("open_review_counts", move |conn| {
            let mut counts: HashMap<String, u32> =
                user_ids.iter().map(|id| (id.clone(), 0)).collect();

            let mut stmt = conn.prepare(
                r#"SELECT json_each.value, COUNT(*)
                   FROM pull_requests, json_each(pull_requests.assigned_reviewers)
                   WHERE pull_requests.status = 'OPEN'
                   GROUP BY json_each.value"#,
            )?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let count: u32 = row.get(1)?;
                Ok((id, count))
            })?;
            for row in rows {
                let (id, count) = row?;
                if let Some(entry) = counts.get_mut(&id) {
                    *entry = count;
                }
            }
            Ok(counts)
        })
        .await
    }

    async fn statistics(&self) -> Result<Statistics, StorageError> {
        self.with_conn("statistics", move |conn| {
            let total_teams: u64 =
                conn.query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))?;
            let (total_users, active_users): (u64, u64) = conn.query_row(
                "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active = 1) FROM users",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let (total_prs, open_prs, merged_prs): (u64, u64, u64) = conn.query_row(
                r#"SELECT COUNT(*),
                          COUNT(*) FILTER (WHERE status = 'OPEN'),
                          COUNT(*) FILTER (WHERE status = 'MERGED')
                   FROM pull_requests"#,
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let mut stmt = conn.prepare(
                r#"SELECT u.user_id, u.username,
                          COUNT(*) FILTER (WHERE pr.status = 'OPEN') AS open_reviews,
                          COUNT(*) FILTER (WHERE pr.status = 'MERGED') AS completed_reviews,
                          COUNT(*) AS total_reviews
                   FROM users u
                   JOIN pull_requests pr ON EXISTS (
                       SELECT 1 FROM json_each(pr.assigned_reviewers)
                       WHERE json_each.value = u.user_id
                   )
                   GROUP BY u.user_id, u.username
                   ORDER BY total_reviews DESC, open_reviews DESC, u.user_id
                   LIMIT 10"#,
            )?;
            let top_reviewers = stmt
                .query_map([], |row| {
                    Ok(ReviewerStats {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        open_reviews: row.get(2)?,
                        completed_reviews: row.get(3)?,
                        total_reviews: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Statistics {
                total_teams,
                total_users,
                active_users,
                total_prs,
                open_prs,
                merged_prs,
                top_reviewers,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_storage() -> (tempfile::TempDir, SqliteStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path().join("test.db")).unwrap();
        (dir, storage)
    }

    fn backend_team() -> Team {
        Team {
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
    async fn schema_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let storage = SqliteStorage::new(&path).unwrap();
            storage.create_team(&backend_team()).await.unwrap();
        }
        let reopened = SqliteStorage::new(&path).unwrap();
        assert!(reopened.team_exists("backend").await.unwrap());
    }

    #[tokio::test]
    async fn get_team_returns_none_for_missing() {
        let (_dir, storage) = test_storage();
        assert!(storage.get_team("ghost").await.unwrap().is_none());
        assert!(!storage.team_exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn create_team_upserts_and_sorts_members() {
        let (_dir, storage) = test_storage();
        storage.create_team(&backend_team()).await.unwrap();

        let team = storage.get_team("backend").await.unwrap().unwrap();
        let ids: Vec<&str> = team.members.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);

        // Re-adding a member under a new team reassigns them.
        storage
            .create_team(&Team {
                team_name: "platform".to_string(),
                members: vec![TeamMember {
                    user_id: "u1".to_string(),
                    username: "Ada".to_string(),
                    is_active: true,
                }],
            })
            .await
            .unwrap();
        let moved = storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(moved.team_name, "platform");
        assert!(moved.is_active);
    }

    #[tokio::test]
    async fn duplicate_team_insert_is_a_storage_error() {
        let (_dir, storage) = test_storage();
        storage.create_team(&backend_team()).await.unwrap();
        let err = storage.create_team(&backend_team()).await.unwrap_err();
        assert_eq!(err.operation, "create_team");
    }

    #[tokio::test]
    async fn user_update_roundtrip() {
        let (_dir, storage) = test_storage();
        storage.create_team(&backend_team()).await.unwrap();

        let mut user = storage.get_user("u1").await.unwrap().unwrap();
        user.is_active = true;
        storage.update_user(&user).await.unwrap();
        assert!(storage.get_user("u1").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn pull_request_roundtrip_preserves_fields() {
        let (_dir, storage) = test_storage();
        let mut pr = open_pr("pr-1", "u1", &["u2", "u3"]);
        storage.create_pull_request(&pr).await.unwrap();
        assert!(storage.pull_request_exists("pr-1").await.unwrap());

        let loaded = storage.get_pull_request("pr-1").await.unwrap().unwrap();
        assert_eq!(loaded.assigned_reviewers, pr.assigned_reviewers);
        assert_eq!(loaded.status, PullRequestStatus::Open);
        assert!(loaded.created_at.is_some());
        assert!(loaded.merged_at.is_none());

        pr.status = PullRequestStatus::Merged;
        pr.merged_at = Some(Utc::now());
        storage.update_pull_request(&pr).await.unwrap();
        let merged = storage.get_pull_request("pr-1").await.unwrap().unwrap();
        assert_eq!(merged.status, PullRequestStatus::Merged);
        assert!(merged.merged_at.is_some());
    }

    #[tokio::test]
    async fn reviewer_listing_is_newest_first() {
        let (_dir, storage) = test_storage();
        let now = Utc::now();
        let mut older = open_pr("pr-old", "u1", &["u2"]);
        older.created_at = Some(now - Duration::hours(2));
        let mut newer = open_pr("pr-new", "u1", &["u2"]);
        newer.created_at = Some(now);
        storage.create_pull_request(&older).await.unwrap();
        storage.create_pull_request(&newer).await.unwrap();
        storage
            .create_pull_request(&open_pr("pr-other", "u1", &["u9"]))
            .await
            .unwrap();

        let listed = storage.pull_requests_by_reviewer("u2").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|p| p.pull_request_id.as_str()).collect();
        assert_eq!(ids, vec!["pr-new", "pr-old"]);
    }

    #[tokio::test]
    async fn open_review_counts_ignore_merged_and_default_to_zero() {
        let (_dir, storage) = test_storage();
        storage
            .create_pull_request(&open_pr("pr-1", "u1", &["u2", "u3"]))
            .await
            .unwrap();
        let mut merged = open_pr("pr-2", "u1", &["u2"]);
        merged.status = PullRequestStatus::Merged;
        merged.merged_at = Some(Utc::now());
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
    async fn statistics_aggregate_across_tables() {
        let (_dir, storage) = test_storage();
        storage.create_team(&backend_team()).await.unwrap();
        storage
            .create_pull_request(&open_pr("pr-1", "u1", &["u2"]))
            .await
            .unwrap();
        let mut merged = open_pr("pr-2", "u1", &["u2"]);
        merged.status = PullRequestStatus::Merged;
        storage.create_pull_request(&merged).await.unwrap();

        let stats = storage.statistics().await.unwrap();
        assert_eq!(stats.total_teams, 1);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_prs, 2);
        assert_eq!(stats.open_prs, 1);
        assert_eq!(stats.merged_prs, 1);
        assert_eq!(stats.top_reviewers.len(), 1);
        let top = &stats.top_reviewers[0];
        assert_eq!(top.user_id, "u2");
        assert_eq!(top.username, "Bea");
        assert_eq!(top.open_reviews, 1);
        assert_eq!(top.completed_reviews, 1);
        assert_eq!(top.total_reviews, 2);
    }
}
