//! # SQLite
//!
//! Durable storage for the contest singleton, entries, and vote records.
//!
//! The contest row is the single point of truth for the current phase; it is
//! loaded fresh on every request and never cached in process memory. Phase
//! transitions are conditional updates (`UPDATE ... WHERE status = ?`) so that
//! concurrent writers cannot both apply the same transition. Entry and vote
//! inserts are guarded the same way: the `INSERT ... SELECT ... WHERE` form
//! re-evaluates the capacity/limit inside the statement, and the two unique
//! indexes (`entries(contest_id, creator_id)`, `votes(entry_id, voter_id)`)
//! are the second line of defense under concurrent identical requests.

use std::str::FromStr;

use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};

/// The one contest row every deployment owns.
pub const CONTEST_ID: i64 = 1;

/// Contest lifecycle stage, stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Phase {
    Submission,
    Voting,
    Closed,
}

/// The singleton contest row (`id = 1`).
#[derive(Debug, Clone, FromRow)]
pub struct Contest {
    pub title: String,
    pub status: Phase,
    pub max_entries: Option<i64>,
    pub votes_per_voter: i64,
    pub voting_opened_at: Option<i64>,
    pub voting_ends_at: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Entry {
    pub id: i64,
    pub title: String,
    pub image_url: String,
    pub creator_id: String,
    pub created_at: i64,
}

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
}

/// Creates the schema and seeds the contest singleton on first boot. Safe to
/// run on every startup.
pub async fn init(
    pool: &SqlitePool,
    title: &str,
    max_entries: Option<i64>,
    votes_per_voter: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS contest (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             title TEXT NOT NULL,
             status TEXT NOT NULL DEFAULT 'submission',
             max_entries INTEGER,
             votes_per_voter INTEGER NOT NULL,
             voting_opened_at INTEGER,
             voting_ends_at INTEGER
         )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS entries (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             contest_id INTEGER NOT NULL REFERENCES contest(id),
             title TEXT NOT NULL,
             image_url TEXT NOT NULL,
             creator_id TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             UNIQUE (contest_id, creator_id)
         )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS votes (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
             voter_id TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             UNIQUE (entry_id, voter_id)
         )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO contest (id, title, status, max_entries, votes_per_voter)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(CONTEST_ID)
    .bind(title)
    .bind(Phase::Submission)
    .bind(max_entries)
    .bind(votes_per_voter)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_contest(pool: &SqlitePool) -> Result<Contest, sqlx::Error> {
    sqlx::query_as::<_, Contest>(
        "SELECT title, status, max_entries, votes_per_voter, voting_opened_at, voting_ends_at
         FROM contest WHERE id = ?1",
    )
    .bind(CONTEST_ID)
    .fetch_one(pool)
    .await
}

/// Conditional submission → voting transition. Returns `false` when another
/// writer already moved the contest out of the submission phase.
pub async fn open_voting(
    pool: &SqlitePool,
    opened_at: i64,
    ends_at: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE contest SET status = ?1, voting_opened_at = ?2, voting_ends_at = ?3
         WHERE id = ?4 AND status = ?5",
    )
    .bind(Phase::Voting)
    .bind(opened_at)
    .bind(ends_at)
    .bind(CONTEST_ID)
    .bind(Phase::Submission)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Conditional voting → closed transition.
pub async fn close_voting(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE contest SET status = ?1 WHERE id = ?2 AND status = ?3")
        .bind(Phase::Closed)
        .bind(CONTEST_ID)
        .bind(Phase::Voting)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Unconditional close, for the admin override.
pub async fn force_close(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE contest SET status = ?1 WHERE id = ?2")
        .bind(Phase::Closed)
        .bind(CONTEST_ID)
        .execute(pool)
        .await?;

    Ok(())
}

/// Deletes all votes and entries and rewrites the contest row back to the
/// submission phase with cleared voting timestamps.
pub async fn reset_contest(
    pool: &SqlitePool,
    title: &str,
    max_entries: Option<i64>,
    votes_per_voter: i64,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM votes").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM entries").execute(&mut *tx).await?;
    sqlx::query(
        "UPDATE contest SET status = ?1, title = ?2, max_entries = ?3, votes_per_voter = ?4,
             voting_opened_at = NULL, voting_ends_at = NULL
         WHERE id = ?5",
    )
    .bind(Phase::Submission)
    .bind(title)
    .bind(max_entries)
    .bind(votes_per_voter)
    .bind(CONTEST_ID)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

pub async fn entry_count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE contest_id = ?1")
        .bind(CONTEST_ID)
        .fetch_one(pool)
        .await
}

pub async fn creator_has_entry(pool: &SqlitePool, creator_id: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM entries WHERE contest_id = ?1 AND creator_id = ?2",
    )
    .bind(CONTEST_ID)
    .bind(creator_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Capacity-guarded entry insert. Returns the new entry id, or `None` when
/// the contest is already at `max_entries` (`None` capacity never blocks).
/// A unique-constraint error means the creator already owns an entry.
pub async fn insert_entry(
    pool: &SqlitePool,
    title: &str,
    image_url: &str,
    creator_id: &str,
    created_at: i64,
    max_entries: Option<i64>,
) -> Result<Option<i64>, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO entries (contest_id, title, image_url, creator_id, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5
         WHERE ?6 IS NULL
            OR (SELECT COUNT(*) FROM entries WHERE contest_id = ?1) < ?6",
    )
    .bind(CONTEST_ID)
    .bind(title)
    .bind(image_url)
    .bind(creator_id)
    .bind(created_at)
    .bind(max_entries)
    .execute(pool)
    .await?;

    Ok((result.rows_affected() == 1).then(|| result.last_insert_rowid()))
}

pub async fn find_entry(pool: &SqlitePool, id: i64) -> Result<Option<Entry>, sqlx::Error> {
    sqlx::query_as::<_, Entry>(
        "SELECT id, title, image_url, creator_id, created_at FROM entries WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// All entries, newest first.
pub async fn list_entries(pool: &SqlitePool) -> Result<Vec<Entry>, sqlx::Error> {
    sqlx::query_as::<_, Entry>(
        "SELECT id, title, image_url, creator_id, created_at FROM entries
         WHERE contest_id = ?1 ORDER BY id DESC",
    )
    .bind(CONTEST_ID)
    .fetch_all(pool)
    .await
}

pub async fn votes_in_window(
    pool: &SqlitePool,
    voter_id: &str,
    start: i64,
    end: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM votes WHERE voter_id = ?1 AND created_at >= ?2 AND created_at < ?3",
    )
    .bind(voter_id)
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await
}

/// Limit-guarded vote insert: the voter's in-window count is re-evaluated
/// inside the statement, so two concurrent votes cannot both slip under the
/// cap. Returns `false` when the guard rejected the row. A unique-constraint
/// error means this voter already voted for this entry.
pub async fn insert_vote(
    pool: &SqlitePool,
    entry_id: i64,
    voter_id: &str,
    created_at: i64,
    window_start: i64,
    window_end: i64,
    limit: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO votes (entry_id, voter_id, created_at)
         SELECT ?1, ?2, ?3
         WHERE (SELECT COUNT(*) FROM votes
                WHERE voter_id = ?2 AND created_at >= ?4 AND created_at < ?5) < ?6",
    )
    .bind(entry_id)
    .bind(voter_id)
    .bind(created_at)
    .bind(window_start)
    .bind(window_end)
    .bind(limit)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn vote_count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM votes")
        .fetch_one(pool)
        .await
}

/// Deletes one entry (votes cascade) and returns its image URL so the caller
/// can release the stored file. `None` when the entry does not exist.
pub async fn delete_entry(pool: &SqlitePool, id: i64) -> Result<Option<String>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let url: Option<String> = sqlx::query_scalar("SELECT image_url FROM entries WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if url.is_none() {
        return Ok(None);
    }

    sqlx::query("DELETE FROM entries WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(url)
}

/// Deletes every entry and vote, returning the image URLs that were
/// referenced.
pub async fn delete_all_entries(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let urls: Vec<String> = sqlx::query_scalar("SELECT image_url FROM entries")
        .fetch_all(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM votes").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM entries").execute(&mut *tx).await?;
    tx.commit().await?;

    Ok(urls)
}

pub async fn all_image_urls(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT image_url FROM entries")
        .fetch_all(pool)
        .await
}

/// True when `err` is a unique-index violation, i.e. this writer lost a race
/// it should report as a duplicate rather than a storage failure.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory database options")
        .foreign_keys(true);

    // A single connection so every query sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("memory pool");

    init(&pool, "Test Contest", None, 2).await.expect("schema");

    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_seeds_once() {
        let pool = memory_pool().await;

        // Mutate, then re-run init: the seed must not overwrite.
        force_close(&pool).await.unwrap();
        init(&pool, "Other", Some(9), 5).await.unwrap();

        let contest = load_contest(&pool).await.unwrap();
        assert_eq!(contest.status, Phase::Closed);
        assert_eq!(contest.title, "Test Contest");
    }

    #[tokio::test]
    async fn test_open_voting_is_conditional() {
        let pool = memory_pool().await;

        assert!(open_voting(&pool, 100, 200).await.unwrap());
        assert!(!open_voting(&pool, 300, 400).await.unwrap());

        let contest = load_contest(&pool).await.unwrap();
        assert_eq!(contest.status, Phase::Voting);
        assert_eq!(contest.voting_opened_at, Some(100));
        assert_eq!(contest.voting_ends_at, Some(200));
    }

    #[tokio::test]
    async fn test_close_voting_is_conditional() {
        let pool = memory_pool().await;

        assert!(!close_voting(&pool).await.unwrap());
        open_voting(&pool, 100, 200).await.unwrap();
        assert!(close_voting(&pool).await.unwrap());
        assert!(!close_voting(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_entry_respects_capacity() {
        let pool = memory_pool().await;

        let first = insert_entry(&pool, "a", "https://x/a.png", "alice", 1, Some(1))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = insert_entry(&pool, "b", "https://x/b.png", "bob", 2, Some(1))
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(entry_count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_entry_duplicate_creator() {
        let pool = memory_pool().await;

        insert_entry(&pool, "a", "https://x/a.png", "alice", 1, None)
            .await
            .unwrap();
        let err = insert_entry(&pool, "b", "https://x/b.png", "alice", 2, None)
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_insert_vote_guard_and_uniqueness() {
        let pool = memory_pool().await;

        let a = insert_entry(&pool, "a", "https://x/a.png", "alice", 1, None)
            .await
            .unwrap()
            .unwrap();
        let b = insert_entry(&pool, "b", "https://x/b.png", "bob", 2, None)
            .await
            .unwrap()
            .unwrap();

        assert!(insert_vote(&pool, a, "zoe", 10, 0, 100, 1).await.unwrap());
        // Guard: in-window count is already at the limit.
        assert!(!insert_vote(&pool, b, "zoe", 11, 0, 100, 1).await.unwrap());
        // Uniqueness: same (entry, voter) pair with a roomier limit.
        let err = insert_vote(&pool, a, "zoe", 12, 0, 100, 10).await.unwrap_err();
        assert!(is_unique_violation(&err));

        assert_eq!(votes_in_window(&pool, "zoe", 0, 100).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_entry_cascades_votes() {
        let pool = memory_pool().await;

        let a = insert_entry(&pool, "a", "https://x/a.png", "alice", 1, None)
            .await
            .unwrap()
            .unwrap();
        insert_vote(&pool, a, "zoe", 10, 0, 100, 10).await.unwrap();

        let url = delete_entry(&pool, a).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://x/a.png"));
        assert_eq!(vote_count(&pool).await.unwrap(), 0);

        assert!(delete_entry(&pool, a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all_returns_urls() {
        let pool = memory_pool().await;

        insert_entry(&pool, "a", "https://x/a.png", "alice", 1, None)
            .await
            .unwrap();
        insert_entry(&pool, "b", "https://x/b.png", "bob", 2, None)
            .await
            .unwrap();

        let mut urls = delete_all_entries(&pool).await.unwrap();
        urls.sort();
        assert_eq!(urls, ["https://x/a.png", "https://x/b.png"]);
        assert_eq!(entry_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let pool = memory_pool().await;

        insert_entry(&pool, "a", "https://x/a.png", "alice", 1, None)
            .await
            .unwrap();
        open_voting(&pool, 100, 200).await.unwrap();

        reset_contest(&pool, "Fresh", Some(10), 3).await.unwrap();

        let contest = load_contest(&pool).await.unwrap();
        assert_eq!(contest.status, Phase::Submission);
        assert_eq!(contest.title, "Fresh");
        assert_eq!(contest.max_entries, Some(10));
        assert_eq!(contest.votes_per_voter, 3);
        assert!(contest.voting_opened_at.is_none());
        assert!(contest.voting_ends_at.is_none());
        assert_eq!(entry_count(&pool).await.unwrap(), 0);
    }
}
