//! rumqttc-backed broker sessions.
//!
//! The synchronous rumqttc client only makes progress while its
//! `Connection` is polled, so `MqttSession::poll` is what moves outgoing
//! publishes, keep-alive pings and inbound messages. Callers poll once per
//! loop iteration; nothing here spawns a thread.

use std::time::{Duration, Instant};

use anyhow::Result;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, ClientError, Connection, Event, Incoming, MqttOptions};

use crate::error::TransportError;

use super::tls::{MqttEndpoint, TlsMaterials};
use super::{BrokerConnector, BrokerSession, InboundMessage};

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const MIN_POLL_WAIT: Duration = Duration::from_millis(1);

/// Everything needed to open a session apart from the client identity.
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub endpoint: MqttEndpoint,
    pub tls: TlsMaterials,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// How long to wait for the broker's ConnAck during bring-up.
    pub connect_timeout: Duration,
}

impl From<ClientError> for TransportError {
    fn from(e: ClientError) -> Self {
        TransportError::Client(e.to_string())
    }
}

pub struct MqttConnector {
    settings: MqttSettings,
}

impl MqttConnector {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    pub fn endpoint(&self) -> &MqttEndpoint {
        &self.settings.endpoint
    }

    fn options(&self, client_id: &str) -> Result<MqttOptions> {
        let endpoint = &self.settings.endpoint;
        let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(self.settings.keep_alive);
        options.set_clean_start(true);
        if let Some(user) = self.settings.username.as_deref() {
            options.set_credentials(user, self.settings.password.clone().unwrap_or_default());
        }
        options.set_transport(self.settings.tls.build_transport(endpoint)?);
        Ok(options)
    }
}

impl BrokerConnector for MqttConnector {
    type Session = MqttSession;

    fn connect(&mut self, client_id: &str) -> Result<MqttSession, TransportError> {
        let options = self
            .options(client_id)
            .map_err(|e| TransportError::Client(format!("{e:#}")))?;
        let (client, connection) = Client::new(options, REQUEST_CHANNEL_CAPACITY);
        let mut session = MqttSession {
            client,
            connection,
            connected: false,
        };
        session.wait_for_connack(self.settings.connect_timeout)?;
        log::info!(
            "Connected to MQTT broker {} as {} (TLS: {}, auth: {})",
            self.settings.endpoint,
            client_id,
            self.settings.endpoint.use_tls,
            self.settings.username.is_some()
        );
        Ok(session)
    }
}

pub struct MqttSession {
    client: Client,
    connection: Connection,
    connected: bool,
}

impl MqttSession {
    fn wait_for_connack(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::ConnectTimeout(timeout));
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Incoming::ConnAck(..)))) => {
                    self.connected = true;
                    return Ok(());
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(TransportError::Connection(e.to_string())),
                // The session owns its client, so the only receive error is a timeout.
                Err(_) => return Err(TransportError::ConnectTimeout(timeout)),
            }
        }
    }

    fn lost(&mut self, reason: String) -> TransportError {
        self.connected = false;
        TransportError::Connection(reason)
    }
}

impl BrokerSession for MqttSession {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.client.try_subscribe(topic, QoS::AtMostOnce)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())?;
        Ok(())
    }

    fn poll(&mut self, wait: Duration) -> Result<Option<InboundMessage>, TransportError> {
        let deadline = Instant::now() + wait.max(MIN_POLL_WAIT);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Incoming::Publish(publish)))) => {
                    let topic = String::from_utf8_lossy(&publish.topic).into_owned();
                    return Ok(Some(InboundMessage {
                        topic,
                        payload: publish.payload.to_vec(),
                    }));
                }
                Ok(Ok(Event::Incoming(Incoming::ConnAck(..)))) => {
                    if !self.connected {
                        log::info!("MQTT session re-established");
                    }
                    self.connected = true;
                }
                Ok(Ok(Event::Incoming(Incoming::Disconnect(..)))) => {
                    return Err(self.lost("broker sent disconnect".to_string()));
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(self.lost(e.to_string())),
                Err(_) => return Ok(None),
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        if self.connected {
            if let Err(e) = self.client.try_disconnect() {
                log::debug!("MQTT disconnect request failed: {}", e);
            }
            // Give the event loop a moment to flush the disconnect.
            let _ = self.connection.recv_timeout(Duration::from_millis(100));
        }
        self.connected = false;
    }
}
