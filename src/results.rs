//! Ranking computation for a closed contest.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::{
    database::{self, Phase},
    error::AppError,
};

pub const PODIUM_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct RankedEntry {
    pub id: i64,
    pub title: String,
    pub image_url: String,
    pub created_at: i64,
    pub vote_count: i64,
}

/// Full ranking, available only once the contest is closed. Zero-vote entries
/// are included; the order is total: vote count descending, then submission
/// time ascending, then entry id ascending.
pub async fn compute_ranking(pool: &SqlitePool) -> Result<Vec<RankedEntry>, AppError> {
    let contest = database::load_contest(pool).await?;
    if contest.status != Phase::Closed {
        return Err(AppError::ResultsNotAvailable);
    }

    let ranking = sqlx::query_as::<_, RankedEntry>(
        "SELECT e.id, e.title, e.image_url, e.created_at, COUNT(v.id) AS vote_count
         FROM entries e
         LEFT JOIN votes v ON v.entry_id = e.id
         GROUP BY e.id
         ORDER BY vote_count DESC, e.created_at ASC, e.id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(ranking)
}

/// The top-3 prefix of a ranking.
pub fn podium(ranking: &[RankedEntry]) -> &[RankedEntry] {
    &ranking[..ranking.len().min(PODIUM_SIZE)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_pool;

    async fn seed_entry(pool: &SqlitePool, creator: &str, created_at: i64) -> i64 {
        database::insert_entry(
            pool,
            creator,
            &format!("https://x/{creator}.png"),
            creator,
            created_at,
            None,
        )
        .await
        .unwrap()
        .unwrap()
    }

    async fn seed_vote(pool: &SqlitePool, entry_id: i64, voter: &str) {
        assert!(database::insert_vote(pool, entry_id, voter, 50, 0, 1_000, 100)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_requires_closed_contest() {
        let pool = memory_pool().await;

        let err = compute_ranking(&pool).await.unwrap_err();
        assert!(matches!(err, AppError::ResultsNotAvailable));

        database::open_voting(&pool, 0, 100).await.unwrap();
        let err = compute_ranking(&pool).await.unwrap_err();
        assert!(matches!(err, AppError::ResultsNotAvailable));
    }

    #[tokio::test]
    async fn test_available_once_window_elapses() {
        let pool = memory_pool().await;

        seed_entry(&pool, "alice", 10).await;
        database::open_voting(&pool, 0, 100).await.unwrap();

        // Any phase-sensitive request past the window closes the contest
        // before its own work runs.
        crate::contest::tick(&pool, 100).await.unwrap();
        let ranking = compute_ranking(&pool).await.unwrap();
        assert_eq!(ranking.len(), 1);
    }

    #[tokio::test]
    async fn test_orders_by_votes_then_age_then_id() {
        let pool = memory_pool().await;

        let a = seed_entry(&pool, "alice", 10).await;
        let b = seed_entry(&pool, "bob", 20).await;
        let c = seed_entry(&pool, "carol", 20).await;
        let d = seed_entry(&pool, "dave", 5).await;

        // b: 2 votes; a and c: 1 vote each; d: none.
        seed_vote(&pool, b, "v1").await;
        seed_vote(&pool, b, "v2").await;
        seed_vote(&pool, a, "v1").await;
        seed_vote(&pool, c, "v2").await;

        database::force_close(&pool).await.unwrap();
        let ranking = compute_ranking(&pool).await.unwrap();

        let ids: Vec<i64> = ranking.iter().map(|r| r.id).collect();
        // a beats c on created_at despite equal counts; d trails with zero.
        assert_eq!(ids, [b, a, c, d]);
        assert_eq!(ranking[0].vote_count, 2);
        assert_eq!(ranking[3].vote_count, 0);
    }

    #[tokio::test]
    async fn test_equal_age_falls_back_to_id() {
        let pool = memory_pool().await;

        let a = seed_entry(&pool, "alice", 10).await;
        let b = seed_entry(&pool, "bob", 10).await;

        database::force_close(&pool).await.unwrap();
        let ranking = compute_ranking(&pool).await.unwrap();

        let ids: Vec<i64> = ranking.iter().map(|r| r.id).collect();
        assert_eq!(ids, [a, b]);
    }

    #[tokio::test]
    async fn test_ranking_is_idempotent() {
        let pool = memory_pool().await;

        let a = seed_entry(&pool, "alice", 10).await;
        seed_entry(&pool, "bob", 20).await;
        seed_vote(&pool, a, "v1").await;

        database::force_close(&pool).await.unwrap();
        let first = compute_ranking(&pool).await.unwrap();
        let second = compute_ranking(&pool).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_podium_prefix() {
        let pool = memory_pool().await;

        for (i, creator) in ["alice", "bob", "carol", "dave"].iter().enumerate() {
            seed_entry(&pool, creator, i as i64).await;
        }

        database::force_close(&pool).await.unwrap();
        let ranking = compute_ranking(&pool).await.unwrap();

        assert_eq!(podium(&ranking).len(), PODIUM_SIZE);
        assert_eq!(podium(&ranking[..1]).len(), 1);
        assert!(podium(&[]).is_empty());
    }
}
