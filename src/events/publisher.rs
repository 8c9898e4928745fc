use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::constants::defaults;

/// Fan-out of federation lifecycle events to any number of in-process
/// subscribers. Slow subscribers lag and lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// One event as delivered to subscribers
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    /// One of `crate::constants::events`
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event payload could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver an event to current subscribers. Having none is not an error.
    pub async fn publish(
        &self,
        event_name: impl Into<String>,
        context: Value,
    ) -> Result<(), PublishError> {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        if let Err(broadcast::error::SendError(unsent)) = self.sender.send(event) {
            trace!(event = %unsent.name, "No event subscribers");
        }
        Ok(())
    }

    /// Serialize `payload` as the event context, then publish
    pub async fn publish_serialized<T: Serialize>(
        &self,
        event_name: impl Into<String>,
        payload: &T,
    ) -> Result<(), PublishError> {
        let context = serde_json::to_value(payload)?;
        self.publish(event_name, context).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::default();
        assert_eq!(publisher.subscriber_count(), 0);
        assert!(publisher
            .publish(events::SYSTEM_FAILURE, json!({}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_each_event() {
        let publisher = EventPublisher::new(8);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher
            .publish(events::CIRCUIT_OPENED, json!({"identity": "openai"}))
            .await
            .unwrap();

        for receiver in [&mut first, &mut second] {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.name, events::CIRCUIT_OPENED);
            assert_eq!(event.context["identity"], "openai");
        }
    }

    #[tokio::test]
    async fn test_publish_serialized_payload() {
        #[derive(Serialize)]
        struct Transition<'a> {
            identity: &'a str,
            failure_count: u32,
        }

        let publisher = EventPublisher::new(4);
        let mut receiver = publisher.subscribe();
        publisher
            .publish_serialized(
                events::CIRCUIT_CLOSED,
                &Transition {
                    identity: "alpha",
                    failure_count: 0,
                },
            )
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.context, json!({"identity": "alpha", "failure_count": 0}));
    }
}
