use chrono::NaiveDateTime;
use std::fmt;
use tokio::sync::mpsc;

/// One inbound PUBLISH, payload kept exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub timestamp: NaiveDateTime,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} - {} ({} bytes)",
            self.timestamp,
            self.topic,
            self.payload.len()
        )
    }
}

impl MqttMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        MqttMessage {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }
}

/// Sending half of the handoff queue, owned by the delivery task.
pub type MessageSender = mpsc::UnboundedSender<MqttMessage>;
/// Receiving half of the handoff queue, owned by the dispatcher.
pub type MessageReceiver = mpsc::UnboundedReceiver<MqttMessage>;

/// Creates the unbounded queue between delivery and dispatch.
pub fn message_channel() -> (MessageSender, MessageReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_topic_and_size() {
        let msg = MqttMessage::from_topic("v3/app/devices/dev1/up", b"{}".to_vec());
        let rendered = msg.to_string();
        assert!(rendered.ends_with("v3/app/devices/dev1/up (2 bytes)"));
    }

    #[tokio::test]
    async fn channel_preserves_order() {
        let (tx, mut rx) = message_channel();
        tx.send(MqttMessage::from_topic("a", b"1".to_vec())).unwrap();
        tx.send(MqttMessage::from_topic("b", b"2".to_vec())).unwrap();
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().topic, "a");
        assert_eq!(rx.recv().await.unwrap().topic, "b");
        assert!(rx.recv().await.is_none());
    }
}
