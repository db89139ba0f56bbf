//! Pipeline progress events and the subscription hub
//!
//! Subscribers observe a session's pipeline through a broadcast channel.
//! Five message kinds cover the whole lifecycle; `analysis_complete` and
//! `insight` messages interleave arbitrarily and consumers must tolerate
//! that.
//!
//! Publishing is strictly fire-and-forget: a send with no subscribers (or a
//! lagging subscriber) never affects pipeline progress, and all results stay
//! durably queryable through the store afterward.

use crate::types::{ExtractionResult, Insight};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// A progress message published while a session's pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Coarse progress: percentage plus a human-readable message
    Status { progress: u8, message: String },
    /// One extraction pass finished; carries its full result
    AnalysisComplete { analysis: ExtractionResult },
    /// One insight was generated and persisted
    Insight { insight: Insight },
    /// Terminal success
    Complete { message: String },
    /// Terminal failure with a human-readable reason
    Error { message: String },
}

impl PipelineEvent {
    pub fn status(progress: u8, message: impl Into<String>) -> Self {
        PipelineEvent::Status {
            progress,
            message: message.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Complete { .. } | PipelineEvent::Error { .. })
    }
}

/// Per-session broadcast channels.
///
/// Channels are created lazily on first subscribe or publish and dropped
/// once the session reaches a terminal event, so the map never grows with
/// finished sessions.
pub struct EventHub {
    channels: Mutex<HashMap<String, broadcast::Sender<PipelineEvent>>>,
    capacity: usize,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a session's event stream.
    ///
    /// Subscribing before the pipeline starts guarantees no events are
    /// missed; late subscribers receive whatever is still to come.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<PipelineEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish an event for a session; silently drops when nobody listens.
    ///
    /// Returns whether at least one subscriber received the event, so the
    /// caller can track delivery (e.g. the insight `shown` flag).
    pub fn publish(&self, session_id: &str, event: PipelineEvent) -> bool {
        let terminal = event.is_terminal();
        let mut channels = self.channels.lock().unwrap();
        let delivered = match channels.get(session_id) {
            // a send error just means no active subscribers
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        };
        if terminal {
            channels.remove(session_id);
        }
        delivered
    }

    /// Number of live channels (for tests and diagnostics).
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let hub = EventHub::default();
        let mut rx = hub.subscribe("s1");

        hub.publish("s1", PipelineEvent::status(20, "parsed"));

        match rx.recv().await.unwrap() {
            PipelineEvent::Status { progress, message } => {
                assert_eq!(progress, 20);
                assert_eq!(message, "parsed");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_harmless() {
        let hub = EventHub::default();
        hub.publish("nobody", PipelineEvent::status(50, "halfway"));
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn terminal_event_drops_the_channel() {
        let hub = EventHub::default();
        let mut rx = hub.subscribe("s1");
        assert_eq!(hub.channel_count(), 1);

        hub.publish(
            "s1",
            PipelineEvent::Complete {
                message: "done".to_string(),
            },
        );
        assert_eq!(hub.channel_count(), 0);

        // the already-sent event is still delivered
        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::Complete { .. }
        ));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let hub = EventHub::default();
        let mut rx_a = hub.subscribe("a");
        let _rx_b = hub.subscribe("b");

        hub.publish("b", PipelineEvent::status(10, "b only"));
        hub.publish("a", PipelineEvent::status(99, "a only"));

        match rx_a.recv().await.unwrap() {
            PipelineEvent::Status { progress, .. } => assert_eq!(progress, 99),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let event = PipelineEvent::status(85, "generating insights");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["progress"], 85);
    }
}
