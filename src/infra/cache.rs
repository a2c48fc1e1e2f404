use anyhow::Result;
use redis::{AsyncCommands, Client};

/// Prefix shared by every rendered-page entry, so a clear never touches other keys.
pub const PAGE_KEY_PREFIX: &str = "page:";

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    pub async fn get_page(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let body = conn
            .get::<_, Option<Vec<u8>>>(format!("{}{}", PAGE_KEY_PREFIX, key))
            .await?;
        Ok(body)
    }

    pub async fn put_page(&self, key: &str, body: &[u8], ttl_seconds: u64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(format!("{}{}", PAGE_KEY_PREFIX, key), body, ttl_seconds)
            .await?;
        Ok(())
    }

    /// Drops every cached page. Returns the number of entries removed.
    pub async fn clear_pages(&self) -> Result<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(format!("{}*", PAGE_KEY_PREFIX))
                .await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let removed = keys.len();
        conn.del::<_, ()>(keys).await?;
        Ok(removed)
    }
}
