//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Every [`EventPayload`] variant belongs to exactly one [`Topic`] lane:
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Decisions`] | One command decision per sensor tick |
//! | [`Topic::Goals`] | Reward states reached by an agent |
//! | [`Topic::Faults`] | Malformed sensor strings, transport failures |
//!
//! Published events also go to a global channel that sees every lane.

use strider_types::{Event, EventPayload, StriderError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Decisions,
    Goals,
    Faults,
}

impl Topic {
    /// The lane a payload is routed to.
    pub fn of(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::Decision { .. } => Topic::Decisions,
            EventPayload::GoalReached { .. } => Topic::Goals,
            EventPayload::MalformedInput { .. } | EventPayload::TransportFault { .. } => {
                Topic::Faults
            }
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    all: broadcast::Sender<Event>,
    decisions: broadcast::Sender<Event>,
    goals: broadcast::Sender<Event>,
    faults: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (decisions, _) = broadcast::channel(capacity);
        let (goals, _) = broadcast::channel(capacity);
        let (faults, _) = broadcast::channel(capacity);
        Self {
            all,
            decisions,
            goals,
            faults,
        }
    }

    /// Publish `event` to its topic lane and to the global channel.
    ///
    /// Returns the number of receivers that were handed the event, or
    /// [`StriderError::Channel`] when nobody is listening anywhere.
    pub fn publish(&self, event: Event) -> Result<usize, StriderError> {
        let topic = Topic::of(&event.payload);
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_all = self.all.send(event).unwrap_or(0);
        match on_topic + on_all {
            0 => Err(StriderError::Channel(format!(
                "no subscribers for topic {topic:?}"
            ))),
            n => Ok(n),
        }
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Subscribe to a single [`Topic`] lane.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Decisions => &self.decisions,
            Topic::Goals => &self.goals,
            Topic::Faults => &self.faults,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Topic-based receiver
// ─────────────────────────────────────────────────────────────────────────────

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn decision(now: usize) -> Event {
        Event::new(
            "strider-middleware::test",
            EventPayload::Decision {
                agent_id: Uuid::new_v4(),
                now,
                code: 1,
                scripted: false,
            },
        )
    }

    fn fault() -> Event {
        Event::new(
            "strider-middleware::test",
            EventPayload::TransportFault {
                message: "link down".into(),
            },
        )
    }

    #[tokio::test]
    async fn publish_and_receive_globally() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = decision(0);
        bus.publish(event.clone())?;

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        assert_eq!(received.source, event.source);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_an_error() {
        let bus = EventBus::default();
        let result = bus.publish(decision(0));
        assert!(matches!(result, Err(StriderError::Channel(_))));
    }

    #[tokio::test]
    async fn topic_lanes_are_separate() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut faults = bus.subscribe_to(Topic::Faults);
        let mut decisions = bus.subscribe_to(Topic::Decisions);

        bus.publish(decision(4))?;

        let got = decisions.recv().await?;
        assert!(matches!(got.payload, EventPayload::Decision { now: 4, .. }));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), faults.recv()).await;
        assert!(result.is_err(), "Faults lane must not see a decision");

        bus.publish(fault())?;
        let got = faults.recv().await?;
        assert_eq!(faults.topic(), Topic::Faults);
        assert!(matches!(got.payload, EventPayload::TransportFault { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn clones_share_channels() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let other = bus.clone();
        let mut rx = other.subscribe_to(Topic::Decisions);
        let event = decision(9);
        bus.publish(event.clone())?;
        assert_eq!(rx.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(8);
        let mut slow = bus.subscribe_to(Topic::Decisions);
        for now in 0..100 {
            let _ = bus.publish(decision(now));
        }
        let result = slow.recv().await;
        assert!(matches!(
            result,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn payloads_map_to_lanes() {
        assert_eq!(Topic::of(&decision(0).payload), Topic::Decisions);
        assert_eq!(Topic::of(&fault().payload), Topic::Faults);
        let goal = EventPayload::GoalReached {
            agent_id: Uuid::new_v4(),
            now: 3,
        };
        assert_eq!(Topic::of(&goal), Topic::Goals);
    }
}
