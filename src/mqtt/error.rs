//! Error types for the broker session

use rumqttc::{ClientError, ConnectionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqttError {
    /// The `-b` value could not be turned into a host and port
    #[error("invalid broker address {address:?}: {reason}")]
    InvalidBrokerAddress { address: String, reason: String },

    /// Network, TLS or CONNACK failure
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// The client refused to queue the SUBSCRIBE, e.g. for a malformed filter
    #[error("cannot subscribe to {topic:?}: {source}")]
    SubscribeRequest {
        topic: String,
        #[source]
        source: ClientError,
    },

    /// The broker answered the SUBSCRIBE with a failure return code
    #[error("broker rejected subscription to {0:?}")]
    SubscriptionRejected(String),

    /// Operation called in the wrong lifecycle phase
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}
