use airlane_core::geocoding::CoordinateCache;
use airlane_shared::Coordinate;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::error::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    coordinate_ttl_seconds: u64,
}

impl RedisClient {
    pub async fn new(connection_string: &str, coordinate_ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, coordinate_ttl_seconds })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

fn coordinate_key(city_id: Uuid) -> String {
    format!("geo:city:{}", city_id)
}

#[async_trait]
impl CoordinateCache for RedisClient {
    async fn get(&self, city_id: Uuid) -> Result<Option<Coordinate>, Box<dyn Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(coordinate_key(city_id)).await?;

        let Some(json) = cached else {
            return Ok(None);
        };
        // Re-validate; the cache may be shared with other writers
        let raw: Coordinate = serde_json::from_str(&json)?;
        Ok(Some(Coordinate::new(raw.latitude(), raw.longitude())?))
    }

    async fn put(&self, city_id: Uuid, coordinate: Coordinate) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(&coordinate)?;
        conn.set_ex::<_, _, ()>(coordinate_key(city_id), json, self.coordinate_ttl_seconds).await?;
        debug!("Cached coordinate for city {}", city_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_key_layout() {
        let id = Uuid::nil();
        assert_eq!(coordinate_key(id), "geo:city:00000000-0000-0000-0000-000000000000");
    }
}
