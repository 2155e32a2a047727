//! Runtime configuration read from the environment (and `.env`, when present).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::calculator::DEFAULT_SCROLL_DELAY;

const MIN_SCROLL_DELAY_MS: u64 = 100;
const MAX_SCROLL_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Memory,
    Postgres,
}

impl StoreBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Some(StoreBackend::File),
            "memory" => Some(StoreBackend::Memory),
            "postgres" | "pg" => Some(StoreBackend::Postgres),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub store_path: PathBuf,
    pub database_url: Option<String>,
    pub scroll_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::File,
            store_path: PathBuf::from(".belonging/storage.json"),
            database_url: None,
            scroll_delay: DEFAULT_SCROLL_DELAY,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let store = match lookup("CALCULATOR_STORE") {
            Some(raw) => StoreBackend::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown CALCULATOR_STORE, using file storage");
                defaults.store
            }),
            None => defaults.store,
        };

        Self {
            store,
            store_path: lookup("CALCULATOR_STORE_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            scroll_delay: lookup("CALCULATOR_SCROLL_DELAY_MS")
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .map(|ms| Duration::from_millis(ms.clamp(MIN_SCROLL_DELAY_MS, MAX_SCROLL_DELAY_MS)))
                .unwrap_or(defaults.scroll_delay),
        }
    }
}
