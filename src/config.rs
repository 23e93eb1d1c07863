use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_key: String,
    pub contest_title: String,
    /// Entry capacity. `None` means unbounded.
    pub max_entries: Option<i64>,
    /// Votes each voter may cast per KST calendar day.
    pub votes_per_voter: i64,
    pub voting_days: i64,
    pub upload_dir: String,
    /// Prefix for stored-image URLs, e.g. `https://contest.example.com`.
    /// Empty means relative URLs.
    pub public_base_url: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "5000"),
            database_url: try_load("DATABASE_URL", "sqlite://contest.db"),
            admin_key: read_secret("ADMIN_KEY", "dev-admin"),
            contest_title: try_load("CONTEST_TITLE", "Outfit Contest"),
            max_entries: try_load_optional("MAX_ENTRIES"),
            votes_per_voter: try_load("VOTES_PER_VOTER", "2"),
            voting_days: try_load("VOTING_DAYS", "5"),
            upload_dir: try_load("UPLOAD_DIR", "uploads"),
            public_base_url: try_load("PUBLIC_BASE_URL", ""),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "8388608"),
        }
    }

    pub fn voting_period_secs(&self) -> i64 {
        self.voting_days * 24 * 60 * 60
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn try_load_optional<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: Display,
{
    let raw = env::var(key).ok()?;
    if raw.is_empty() {
        return None;
    }

    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .map(Some)
        .expect("Environment misconfigured!")
}

/// Secrets come from the container secret mount when present, otherwise from
/// the environment.
fn read_secret(secret_name: &str, default: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(s) => s.trim().to_string(),
        Err(_) => try_load(secret_name, default),
    }
}
