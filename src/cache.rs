use std::{collections::HashMap, sync::Arc, time::Duration};

use redis::AsyncCommands;
use tokio::{sync::RwLock, time::Instant};

/// Key/value cache with optional per-key expiry.
///
/// Writers do not coordinate; the last write wins.
#[derive(Clone)]
pub enum Cache {
    Memory(MemoryCache),
    Redis(redis::aio::MultiplexedConnection),
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Option<Instant>)>>>,
}

impl Cache {
    pub fn memory() -> Self {
        Self::Memory(MemoryCache::default())
    }

    pub async fn redis(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::Redis(conn))
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match self {
            Self::Memory(mem) => {
                let entries = mem.entries.read().await;
                Ok(entries.get(key).and_then(|(value, expires)| match expires {
                    Some(at) if *at <= Instant::now() => None,
                    _ => Some(value.clone()),
                }))
            }
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.get(key).await?)
            }
        }
    }

    /// Stores `value` with no expiry.
    pub async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        match self {
            Self::Memory(mem) => {
                mem.entries.write().await.insert(key.to_owned(), (value.to_owned(), None));
            }
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let secs = ttl.as_secs().max(1);
        match self {
            Self::Memory(mem) => {
                let expires = Instant::now() + Duration::from_secs(secs);
                mem.entries.write().await.insert(key.to_owned(), (value.to_owned(), Some(expires)));
            }
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.set_ex(key, value, secs).await?;
            }
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        match self {
            Self::Memory(mem) => {
                mem.entries.write().await.remove(key);
            }
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.del(key).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = Cache::memory();
        cache.set_ex("k", "v", Duration::from_secs(2)).await.unwrap();
        cache.set("forever", "1").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.get("forever").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn delete_removes() {
        let cache = Cache::memory();
        cache.set("k", "v").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
