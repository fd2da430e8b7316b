//! A broker session that replaces itself when it dies.
//!
//! `ReconnectingSession` owns a connector and one client identity. When the
//! current session errors or reports itself disconnected it is closed and
//! dropped; the next `poll` opens a fresh one through the connector, no more
//! than once per backoff period. Publishes made while no session is live fail
//! with `NotConnected`.

use std::time::{Duration, Instant};

use crate::error::TransportError;

use super::{BrokerConnector, BrokerSession, InboundMessage};

pub struct ReconnectingSession<C: BrokerConnector> {
    connector: C,
    client_id: String,
    backoff: Duration,
    session: Option<C::Session>,
    next_attempt: Option<Instant>,
}

impl<C: BrokerConnector> ReconnectingSession<C> {
    /// Open the first session. Failure here is returned to the caller.
    pub fn connect(
        mut connector: C,
        client_id: impl Into<String>,
        backoff: Duration,
    ) -> Result<Self, TransportError> {
        let client_id = client_id.into();
        let session = connector.connect(&client_id)?;
        Ok(Self {
            connector,
            client_id,
            backoff,
            session: Some(session),
            next_attempt: None,
        })
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn drop_session(&mut self, reason: &TransportError) {
        if let Some(mut session) = self.session.take() {
            log::warn!("Broker session lost: {}", reason);
            session.close();
        }
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        let now = Instant::now();
        if self.next_attempt.is_some_and(|at| now < at) {
            return Err(TransportError::NotConnected);
        }
        match self.connector.connect(&self.client_id) {
            Ok(session) => {
                log::info!("Broker session re-established as {}", self.client_id);
                self.session = Some(session);
                self.next_attempt = None;
                Ok(())
            }
            Err(e) => {
                self.next_attempt = Some(now + self.backoff);
                Err(e)
            }
        }
    }

    fn live(&mut self) -> Result<&mut C::Session, TransportError> {
        match self.session.as_mut() {
            Some(session) if session.is_connected() => Ok(session),
            _ => Err(TransportError::NotConnected),
        }
    }
}

impl<C: BrokerConnector> BrokerSession for ReconnectingSession<C> {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let result = self.live()?.subscribe(topic);
        if let Err(e) = &result {
            self.drop_session(e);
        }
        result
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let result = self.live()?.publish(topic, payload);
        if let Err(e) = &result {
            self.drop_session(e);
        }
        result
    }

    fn poll(&mut self, wait: Duration) -> Result<Option<InboundMessage>, TransportError> {
        if self.session.as_ref().is_some_and(|s| !s.is_connected()) {
            self.drop_session(&TransportError::NotConnected);
        }
        if self.session.is_none() {
            self.reconnect()?;
        }
        let result = self.live()?.poll(wait);
        if let Err(e) = &result {
            self.drop_session(e);
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_connected())
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}
