//! Broker transport seam.
//!
//! Both nodes talk to the broker through `BrokerSession`; the field node
//! opens sessions through a `BrokerConnector` so the connectivity manager can
//! drop a failed session and bring up a fresh one under a new identity.
//!
//! - `mqtt`: rumqttc-backed sessions (plain TCP or TLS)
//! - `loopback`: in-process broker for dry runs and tests
//! - `reconnect`: session wrapper that reopens itself after failures
//! - `tls`: endpoint parsing and TLS material loading

use std::time::Duration;

use crate::error::TransportError;

pub mod loopback;
pub mod mqtt;
pub mod reconnect;
mod tls;

pub use loopback::{LoopbackBroker, LoopbackConnector, LoopbackSession};
pub use mqtt::{MqttConnector, MqttSession, MqttSettings};
pub use reconnect::ReconnectingSession;
pub use tls::{parse_mqtt_endpoint, MqttEndpoint, TlsMaterials};

/// One message delivered on a subscribed topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A live broker session. Any call may fail with a `TransportError`.
pub trait BrokerSession {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Drive the session for at most `wait` and return the first inbound
    /// message, if any arrived.
    fn poll(&mut self, wait: Duration) -> Result<Option<InboundMessage>, TransportError>;

    fn is_connected(&self) -> bool;

    /// Best-effort disconnect. Errors are ignored.
    fn close(&mut self) {}
}

/// Opens sessions under a caller-chosen client identity.
pub trait BrokerConnector {
    type Session: BrokerSession;

    fn connect(&mut self, client_id: &str) -> Result<Self::Session, TransportError>;
}

/// Reject MQTT wildcards in topics we publish to.
pub fn validate_publish_topic(topic: &str) -> anyhow::Result<()> {
    if topic.is_empty() {
        return Err(anyhow::anyhow!("topic must not be empty"));
    }
    if topic.contains(['+', '#']) {
        return Err(anyhow::anyhow!(
            "publish topic '{}' must not contain MQTT wildcards",
            topic
        ));
    }
    Ok(())
}
