use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

/// Outbound domain-event sink (Kafka in production).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Serialize and publish an event after the state change it describes has
/// been committed. Failures are logged; they never undo the commit.
pub async fn publish_json<E: Serialize + Sync>(
    publisher: Option<&dyn EventPublisher>,
    topic: &str,
    key: &str,
    event: &E,
) {
    let Some(publisher) = publisher else {
        return;
    };

    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to serialize event for {}: {}", topic, e);
            return;
        }
    };

    if let Err(e) = publisher.publish(topic, key, &payload).await {
        warn!("Failed to publish event to {}/{}: {}", topic, key, e);
    }
}
