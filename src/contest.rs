//! Contest phase state machine.
//!
//! Phases move `submission → voting → closed`. Voting opens by admin command
//! or automatically the instant the entry count reaches the configured
//! capacity, and closes by admin command or lazily once the voting window has
//! elapsed: there is no background timer, [`tick`] runs at the top of every
//! phase-sensitive operation instead. Reset is the only way back to the
//! submission phase.

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    database::{self, Contest, Entry, Phase},
    error::AppError,
    utils,
};

pub const UNTITLED: &str = "Untitled";

/// Closes voting if the window has elapsed, then returns the fresh contest
/// row. Every operation that depends on the phase calls this first.
pub async fn tick(pool: &SqlitePool, now: i64) -> Result<Contest, AppError> {
    let contest = database::load_contest(pool).await?;
    if contest.status != Phase::Voting {
        return Ok(contest);
    }

    match contest.voting_ends_at {
        Some(ends_at) if now >= ends_at => {
            if database::close_voting(pool).await? {
                info!("voting window elapsed, contest closed");
            }
            Ok(database::load_contest(pool).await?)
        }
        _ => Ok(contest),
    }
}

/// Registers one entry for `voter_id` during the submission phase.
///
/// Preconditions are checked in order, first failure wins: phase, capacity,
/// one-entry-per-creator, image reference. When the insert fills the contest
/// to capacity, voting opens immediately with a window of
/// `voting_period_secs`.
pub async fn submit_entry(
    pool: &SqlitePool,
    voter_id: &str,
    title: &str,
    image_url: &str,
    now: i64,
    voting_period_secs: i64,
) -> Result<Entry, AppError> {
    let contest = tick(pool, now).await?;
    if contest.status != Phase::Submission {
        return Err(AppError::WrongPhase);
    }

    if let Some(max) = contest.max_entries {
        if database::entry_count(pool).await? >= max {
            return Err(AppError::CapacityReached);
        }
    }

    if database::creator_has_entry(pool, voter_id).await? {
        return Err(AppError::DuplicateSubmission);
    }

    let image_url = validate_image_url(image_url)?;

    let mut title = utils::sanitize_title(title);
    if title.is_empty() {
        title = UNTITLED.to_string();
    }

    let id = match database::insert_entry(
        pool,
        &title,
        image_url,
        voter_id,
        now,
        contest.max_entries,
    )
    .await
    {
        Ok(Some(id)) => id,
        Ok(None) => return Err(AppError::CapacityReached),
        Err(e) if database::is_unique_violation(&e) => return Err(AppError::DuplicateSubmission),
        Err(e) => return Err(e.into()),
    };

    if let Some(max) = contest.max_entries {
        if database::entry_count(pool).await? >= max
            && database::open_voting(pool, now, now + voting_period_secs).await?
        {
            info!("entry limit reached, voting opened");
        }
    }

    database::find_entry(pool, id)
        .await?
        .ok_or(AppError::EntryNotFound)
}

/// Casts one vote for `entry_id` on behalf of `voter_id`.
///
/// Preconditions in order: voting phase and inside the window, daily vote
/// budget, entry existence, no self-votes. Returns the voter's remaining
/// votes for the current KST day.
pub async fn cast_vote(
    pool: &SqlitePool,
    voter_id: &str,
    entry_id: i64,
    now: i64,
) -> Result<i64, AppError> {
    let contest = tick(pool, now).await?;
    if contest.status != Phase::Voting {
        return Err(AppError::WrongPhase);
    }
    let (Some(opened_at), Some(ends_at)) = (contest.voting_opened_at, contest.voting_ends_at)
    else {
        return Err(AppError::WrongPhase);
    };
    if now < opened_at || now >= ends_at {
        return Err(AppError::WrongPhase);
    }

    let (day_start, day_end) = utils::kst_day_bounds(now);
    let used = database::votes_in_window(pool, voter_id, day_start, day_end).await?;
    if used >= contest.votes_per_voter {
        return Err(AppError::VoteLimitReached);
    }

    let entry = database::find_entry(pool, entry_id)
        .await?
        .ok_or(AppError::EntryNotFound)?;
    if entry.creator_id == voter_id {
        return Err(AppError::SelfVoteForbidden);
    }

    let inserted = match database::insert_vote(
        pool,
        entry_id,
        voter_id,
        now,
        day_start,
        day_end,
        contest.votes_per_voter,
    )
    .await
    {
        Ok(inserted) => inserted,
        Err(e) if database::is_unique_violation(&e) => return Err(AppError::DuplicateVote),
        Err(e) => return Err(e.into()),
    };
    if !inserted {
        return Err(AppError::VoteLimitReached);
    }

    Ok((contest.votes_per_voter - used - 1).max(0))
}

/// Votes `voter_id` may still cast within the current KST day.
pub async fn remaining_votes_today(
    pool: &SqlitePool,
    voter_id: &str,
    votes_per_voter: i64,
    now: i64,
) -> Result<i64, AppError> {
    let (day_start, day_end) = utils::kst_day_bounds(now);
    let used = database::votes_in_window(pool, voter_id, day_start, day_end).await?;

    Ok((votes_per_voter - used).max(0))
}

/// Admin override: open voting now. Legal only from the submission phase.
pub async fn force_start_voting(
    pool: &SqlitePool,
    now: i64,
    voting_period_secs: i64,
) -> Result<Contest, AppError> {
    let contest = tick(pool, now).await?;
    if contest.status != Phase::Submission {
        return Err(AppError::InvalidPhaseTransition);
    }

    if !database::open_voting(pool, now, now + voting_period_secs).await? {
        // A concurrent submission filled the contest first.
        return Err(AppError::InvalidPhaseTransition);
    }

    Ok(database::load_contest(pool).await?)
}

/// Admin override: close the contest regardless of phase.
pub async fn force_close(pool: &SqlitePool) -> Result<Contest, AppError> {
    database::force_close(pool).await?;

    Ok(database::load_contest(pool).await?)
}

fn validate_image_url(image_url: &str) -> Result<&str, AppError> {
    let trimmed = image_url.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidImage("an image address is required"));
    }
    if !(trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with('/'))
    {
        return Err(AppError::InvalidImage("unsupported image address"));
    }

    Ok(trimmed)
}
