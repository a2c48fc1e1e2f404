pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use anyhow::Result;

use crate::config::AppConfig;
use crate::infra::{cache::RedisCache, db::Db, storage::ObjectStorage};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub storage: ObjectStorage,
    pub admin_token: Option<String>,
    pub session_key: [u8; 32],
    pub session_ttl_minutes: u64,
    pub page_size: i64,
    pub index_cache_ttl_seconds: u64,
    pub upload_max_bytes: usize,
}

impl AppState {
    /// Connects every backing service named in `config`.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let db = Db::connect(config).await?;
        let cache = RedisCache::connect(&config.redis_url).await?;
        let storage = ObjectStorage::new(config).await?;

        Ok(Self {
            db,
            cache,
            storage,
            admin_token: config.admin_token.clone(),
            session_key: config.session_key,
            session_ttl_minutes: config.session_ttl_minutes,
            page_size: config.page_size,
            index_cache_ttl_seconds: config.index_cache_ttl_seconds,
            upload_max_bytes: config.upload_max_bytes,
        })
    }
}
