use std::{str::FromStr, time::Duration};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::EnvError(format!(
                "STORE_BACKEND must be 'redis' or 'memory', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub allowed_origins: Vec<String>,
    /// Hard ceiling applied by the HTTP layer on top of the query translator.
    pub max_page_limit: u64,
    pub store_timeout: Duration,
    pub recompute_on_start: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| AppError::EnvError("JWT_SECRET must be set".into()))?;

        let store_backend = std::env::var("STORE_BACKEND")
            .map(|s| s.parse::<StoreBackend>())
            .unwrap_or(Ok(StoreBackend::Redis))?;

        let redis_url = std::env::var("REDIS_URL").ok();
        if store_backend == StoreBackend::Redis && redis_url.is_none() {
            return Err(AppError::EnvError("REDIS_URL must be set".into()));
        }

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            port: env_or("PORT", 3001),
            store_backend,
            redis_url,
            jwt_secret,
            allowed_origins,
            max_page_limit: env_or("MAX_PAGE_LIMIT", 1000),
            store_timeout: Duration::from_millis(env_or("STORE_TIMEOUT_MS", 2000)),
            recompute_on_start: env_or("RECOMPUTE_ON_START", false),
        })
    }

    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: 3001,
            store_backend: StoreBackend::Memory,
            redis_url: None,
            jwt_secret: jwt_secret.into(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_page_limit: 1000,
            store_timeout: Duration::from_millis(2000),
            recompute_on_start: false,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
