//! # MQTT Session Module
//!
//! Wraps a single `rumqttc` session for the subscriber. The broker connection is
//! opened and acknowledged before anything else happens, then the event loop is
//! moved into a background task that only forwards publishes into an unbounded
//! queue. Formatting happens elsewhere, so the delivery path never waits on
//! stdout.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address parsing and client options
//! ├── error.rs            - Session error type
//! ├── message_manager.rs  - Inbound message type and handoff queue
//! └── mqtt_handler.rs     - Connect, subscribe, delivery task, disconnect
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! connect() ──► subscribe() ──► start_delivery() ──► disconnect(grace)
//!  CONNACK        SUBACK         PUBLISH ─► queue      DISCONNECT flushed
//! ```
//!
//! Reconnects are left to rumqttc: after a transport error the next poll
//! reconnects, and the subscription is renewed when the broker reports no
//! stored session.

pub mod config;
pub mod error;
pub mod message_manager;
pub mod mqtt_handler;
