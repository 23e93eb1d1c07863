use std::{collections::HashSet, sync::Arc};

use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::{
    config::Config,
    database,
    storage::{ImageStore, LocalStore},
};

pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub images: Arc<dyn ImageStore>,
    /// Tokens of sessions that presented the admin key. Lives for the
    /// process; logout or restart revokes.
    pub admin_sessions: RwLock<HashSet<String>>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let pool = database::connect(&config.database_url)
            .await
            .expect("Database misconfigured!");
        database::init(
            &pool,
            &config.contest_title,
            config.max_entries,
            config.votes_per_voter,
        )
        .await
        .expect("Schema initialization failed!");

        let images = Arc::new(LocalStore::new(
            config.upload_dir.clone(),
            &config.public_base_url,
        ));

        Arc::new(Self {
            config,
            pool,
            images,
            admin_sessions: RwLock::new(HashSet::new()),
        })
    }
}
