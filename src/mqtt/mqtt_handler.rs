use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, Publish, QoS, SubscribeReasonCode};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::config::MqttConfig;
use super::error::MqttError;
use super::message_manager::{MessageSender, MqttMessage};

/// Capacity of the request queue between `AsyncClient` and its event loop.
const REQUEST_CAPACITY: usize = 10;

/// Pause after a transport error before the event loop is polled again,
/// which is what makes rumqttc attempt the reconnect.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl MqttStatus {
    fn fail(&mut self, error: &MqttError) {
        self.connection_state = ConnectionState::Failed;
        self.error_messages.push(error.to_string());
    }

    fn record_message(&mut self) {
        self.messages_received += 1;
        self.last_activity = Some(Local::now());
    }
}

/// What the delivery task did before it stopped.
#[derive(Debug, Default)]
struct DeliveryReport {
    forwarded: usize,
    last_activity: Option<DateTime<Local>>,
}

/// Owns the broker session: connect, subscribe, background delivery and
/// the final disconnect.
pub struct MqttHandler {
    status: MqttStatus,
    config: MqttConfig,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    sender: MessageSender,
    delivery: Option<JoinHandle<DeliveryReport>>,
}

impl MqttHandler {
    pub fn new(config: MqttConfig, sender: MessageSender) -> Self {
        MqttHandler {
            status: MqttStatus::default(),
            config,
            client: None,
            eventloop: None,
            sender,
            delivery: None,
        }
    }

    pub fn status(&self) -> &MqttStatus {
        &self.status
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Opens the session and blocks until the broker's CONNACK arrives.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let options = match self.config.to_options() {
            Ok(options) => options,
            Err(e) => {
                self.status.fail(&e);
                return Err(e);
            }
        };

        self.status.connection_state = ConnectionState::Connecting;
        info!(
            "Connecting to {} as {}",
            self.config.broker, self.config.client_id
        );

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!("CONNACK received: {:?}", ack.code);
                    break;
                }
                Ok(event) => trace!("Event before CONNACK: {:?}", event),
                Err(e) => {
                    let error = MqttError::Connection(e);
                    self.status.fail(&error);
                    return Err(error);
                }
            }
        }

        self.status.connection_state = ConnectionState::Connected;
        self.client = Some(client);
        self.eventloop = Some(eventloop);
        Ok(())
    }

    /// Subscribes to the configured filter at QoS 0 and waits for the SUBACK.
    /// Messages that overtake the SUBACK are forwarded as usual.
    pub async fn subscribe(&mut self) -> Result<(), MqttError> {
        let (Some(client), Some(eventloop)) = (self.client.as_ref(), self.eventloop.as_mut())
        else {
            return Err(MqttError::InvalidState("subscribe requires a connected session"));
        };

        let topic = self.config.topic.clone();
        if let Err(source) = client.subscribe(topic.clone(), QoS::AtMostOnce).await {
            let error = MqttError::SubscribeRequest { topic, source };
            self.status.fail(&error);
            return Err(error);
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        let error = MqttError::SubscriptionRejected(topic);
                        self.status.fail(&error);
                        return Err(error);
                    }
                    debug!("SUBACK received for {}: {:?}", topic, ack.return_codes);
                    break;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if forward(&self.sender, publish) {
                        self.status.record_message();
                    }
                }
                Ok(event) => trace!("Event before SUBACK: {:?}", event),
                Err(e) => {
                    let error = MqttError::Connection(e);
                    self.status.fail(&error);
                    return Err(error);
                }
            }
        }

        self.status.connection_state = ConnectionState::Subscribed;
        info!("Subscribed to {}", topic);
        Ok(())
    }

    /// Hands the event loop to a background task that forwards every inbound
    /// PUBLISH into the message queue.
    pub fn start_delivery(&mut self) -> Result<(), MqttError> {
        if self.status.connection_state != ConnectionState::Subscribed {
            return Err(MqttError::InvalidState("delivery requires an active subscription"));
        }
        let (Some(client), Some(eventloop)) = (self.client.clone(), self.eventloop.take()) else {
            return Err(MqttError::InvalidState("delivery already started"));
        };

        let sender = self.sender.clone();
        let topic = self.config.topic.clone();
        self.delivery = Some(tokio::spawn(deliver(eventloop, client, sender, topic)));
        Ok(())
    }

    /// Sends DISCONNECT and gives the delivery task `grace` to flush it.
    pub async fn disconnect(&mut self, grace: Duration) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.try_disconnect() {
                warn!("Failed to queue disconnect: {}", e);
            }
        }

        if let Some(mut handle) = self.delivery.take() {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(report)) => {
                    self.status.messages_received += report.forwarded;
                    if report.last_activity.is_some() {
                        self.status.last_activity = report.last_activity;
                    }
                }
                Ok(Err(e)) => warn!("Delivery task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Disconnect not flushed within {:?}, closing anyway", grace);
                    handle.abort();
                }
            }
        }

        self.eventloop = None;
        self.status.connection_state = ConnectionState::Disconnected;
        debug!(
            "Session closed after {} messages",
            self.status.messages_received
        );
    }
}

/// Returns false once the receiving side is gone.
fn forward(sender: &MessageSender, publish: Publish) -> bool {
    let message = MqttMessage::from_topic(publish.topic, publish.payload.to_vec());
    trace!("Received {}", message);
    sender.send(message).is_ok()
}

async fn deliver(
    mut eventloop: EventLoop,
    client: AsyncClient,
    sender: MessageSender,
    topic: String,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if !forward(&sender, publish) {
                    debug!("Message queue closed, stopping delivery");
                    break;
                }
                report.forwarded += 1;
                report.last_activity = Some(Local::now());
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("Reconnected to broker");
                if !ack.session_present {
                    if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtMostOnce) {
                        warn!("Failed to renew subscription to {}: {}", topic, e);
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent");
                break;
            }
            Ok(event) => trace!("Event: {:?}", event),
            Err(e) => {
                warn!("Connection error: {}", e);
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }

    report
}
