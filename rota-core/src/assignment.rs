//! Reviewer assignment engine.
//!
//! Selects reviewers for a new pull request and replacements during
//! reassignment, least-loaded-first. Review load is the number of open
//! PRs a user is currently assigned to, fetched on demand from storage.
//!
//! The two operations break ties differently on purpose:
//! - initial assignment orders ties by ascending user id, so a fresh
//!   PR's reviewer list is reproducible;
//! - replacement picks uniformly at random from the minimum-load tie
//!   group, so repeated reassignments don't converge on the same
//!   teammate.
//!
//! If the load lookup fails, both operations degrade to uniform random
//! selection rather than failing the calling operation.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::error::{DomainError, ErrorCode};
use crate::models::User;
use crate::storage::Storage;

/// Maximum number of reviewers on a pull request.
pub const MAX_REVIEWERS: usize = 2;

/// Select up to [`MAX_REVIEWERS`] reviewers for a new PR authored by
/// `author_id`.
///
/// Candidates are the active team members other than the author. An
/// empty candidate set yields an empty list; the PR is simply created
/// without reviewers.
pub async fn select_reviewers(
    storage: &dyn Storage,
    team_members: &[User],
    author_id: &str,
    rng: &mut StdRng,
) -> Vec<String> {
    let candidates = eligible(team_members, |u| u.user_id != author_id);
    if candidates.is_empty() {
        return Vec::new();
    }

    let candidate_ids: Vec<String> = candidates.iter().map(|u| u.user_id.clone()).collect();
    let counts = match storage.open_review_counts(&candidate_ids).await {
        Ok(counts) => counts,
        Err(err) => {
            warn!(error = %err, "review load lookup failed, falling back to random selection");
            return random_selection(candidate_ids, MAX_REVIEWERS, rng);
        }
    };

    let mut ranked = candidate_ids;
    ranked.sort_by(|a, b| {
        let load_a = counts.get(a).copied().unwrap_or(0);
        let load_b = counts.get(b).copied().unwrap_or(0);
        load_a.cmp(&load_b).then_with(|| a.cmp(b))
    });
    ranked.truncate(MAX_REVIEWERS);
    ranked
}

/// Select a replacement for a reviewer being removed from a PR.
///
/// The author and every currently assigned reviewer are excluded, so a
/// replacement is never a duplicate. Fails with `NO_CANDIDATE` when no
/// active teammate remains outside the exclusion set.
pub async fn select_replacement(
    storage: &dyn Storage,
    team_members: &[User],
    author_id: &str,
    current_reviewers: &[String],
    rng: &mut StdRng,
) -> Result<String, DomainError> {
    let candidates = eligible(team_members, |u| {
        u.user_id != author_id && !current_reviewers.contains(&u.user_id)
    });
    if candidates.is_empty() {
        return Err(DomainError::new(
            ErrorCode::NoCandidate,
            "no active replacement candidate in team",
        ));
    }

    let no_candidate = || {
        DomainError::new(
            ErrorCode::NoCandidate,
            "no active replacement candidate in team",
        )
    };

    let candidate_ids: Vec<String> = candidates.iter().map(|u| u.user_id.clone()).collect();
    let counts = match storage.open_review_counts(&candidate_ids).await {
        Ok(counts) => counts,
        Err(err) => {
            warn!(error = %err, "review load lookup failed, falling back to random replacement");
            return candidate_ids.choose(rng).cloned().ok_or_else(no_candidate);
        }
    };

    let min_load = candidate_ids
        .iter()
        .map(|id| counts.get(id).copied().unwrap_or(0))
        .min()
        .ok_or_else(no_candidate)?;
    let tie_group: Vec<String> = candidate_ids
        .into_iter()
        .filter(|id| counts.get(id).copied().unwrap_or(0) == min_load)
        .collect();

    tie_group.choose(rng).cloned().ok_or_else(no_candidate)
}

fn eligible<'a, F>(team_members: &'a [User], keep: F) -> Vec<&'a User>
where
    F: Fn(&User) -> bool,
{
    team_members
        .iter()
        .filter(|u| u.is_active && keep(u))
        .collect()
}

fn random_selection(mut candidate_ids: Vec<String>, max_count: usize, rng: &mut StdRng) -> Vec<String> {
    candidate_ids.shuffle(rng);
    candidate_ids.truncate(max_count);
    candidate_ids
}
