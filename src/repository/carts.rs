//! Cart repository backed by Redis
//!
//! Carts are session-scoped staging areas: losing one loses no inventory,
//! since a cart item holds no claim on the copy. That makes Redis the right
//! storage class; each user's cart is a list keyed by user id, preserving
//! insertion order.

use async_trait::async_trait;
use redis::{AsyncCommands, Client};

use crate::{
    error::{AppError, AppResult},
    models::cart::CartItem,
};

/// Ordered per-user cart storage. Remove and clear are idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn list(&self, user_id: i32) -> AppResult<Vec<CartItem>>;
    async fn push(&self, user_id: i32, item: CartItem) -> AppResult<()>;
    async fn remove(&self, user_id: i32, copy_id: i32) -> AppResult<()>;
    async fn clear(&self, user_id: i32) -> AppResult<()>;

    /// Verify the backing store is reachable (readiness probe)
    async fn ping(&self) -> AppResult<()>;
}

#[derive(Clone)]
pub struct RedisCartRepository {
    client: Client,
}

fn cart_key(user_id: i32) -> String {
    format!("cart:{}", user_id)
}

impl RedisCartRepository {
    /// Create a new cart repository and verify the Redis connection
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;

        Ok(Self { client })
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl CartStore for RedisCartRepository {
    async fn list(&self, user_id: i32) -> AppResult<Vec<CartItem>> {
        let mut conn = self.connection().await?;
        let entries: Vec<String> = conn.lrange(cart_key(user_id), 0, -1).await?;

        entries
            .iter()
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| AppError::Internal(format!("Corrupt cart entry: {}", e)))
            })
            .collect()
    }

    async fn push(&self, user_id: i32, item: CartItem) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let raw = serde_json::to_string(&item)
            .map_err(|e| AppError::Internal(format!("Failed to serialize cart entry: {}", e)))?;
        conn.rpush::<_, _, ()>(cart_key(user_id), raw).await?;
        Ok(())
    }

    async fn remove(&self, user_id: i32, copy_id: i32) -> AppResult<()> {
        // LREM needs the exact stored value, so find the matching entry first
        let items = self.list(user_id).await?;
        let Some(item) = items.into_iter().find(|i| i.copy_id == copy_id) else {
            return Ok(());
        };

        let raw = serde_json::to_string(&item)
            .map_err(|e| AppError::Internal(format!("Failed to serialize cart entry: {}", e)))?;
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(cart_key(user_id), 1, raw).await?;
        Ok(())
    }

    async fn clear(&self, user_id: i32) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(cart_key(user_id)).await?;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
