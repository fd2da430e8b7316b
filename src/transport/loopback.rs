//! In-process broker.
//!
//! `LoopbackBroker` routes publishes to subscribed sessions by exact topic
//! match and records every publish. It backs the sensing node's dry-run mode
//! and the test suites, and can inject the failures the reconnection logic
//! has to survive: refused connections, dropped sessions, failed publishes.
//!
//! Single-threaded by construction (`Rc<RefCell<_>>`), like the node loops.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::error::TransportError;

use super::{BrokerConnector, BrokerSession, InboundMessage};

#[derive(Default)]
struct BrokerState {
    /// Bumped on every `drop_sessions`; sessions from an older epoch are dead.
    epoch: u64,
    next_session_id: u64,
    sessions: Vec<SessionEntry>,
    published: Vec<InboundMessage>,
    connects: Vec<String>,
    refuse_connects: u32,
    fail_publishes: u32,
}

struct SessionEntry {
    id: u64,
    epoch: u64,
    client_id: String,
    topics: Vec<String>,
    inbox: VecDeque<InboundMessage>,
}

#[derive(Clone, Default)]
pub struct LoopbackBroker {
    state: Rc<RefCell<BrokerState>>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            broker: self.clone(),
        }
    }

    /// Open a session directly (sensing node dry runs).
    pub fn open(&self, client_id: &str) -> Result<LoopbackSession, TransportError> {
        let mut state = self.state.borrow_mut();
        state.connects.push(client_id.to_string());
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(TransportError::Connection(format!(
                "loopback broker refused {client_id}"
            )));
        }
        state.next_session_id += 1;
        let id = state.next_session_id;
        let epoch = state.epoch;
        state.sessions.push(SessionEntry {
            id,
            epoch,
            client_id: client_id.to_string(),
            topics: Vec::new(),
            inbox: VecDeque::new(),
        });
        Ok(LoopbackSession {
            broker: self.clone(),
            id,
            closed: false,
        })
    }

    /// Publish from outside any session (e.g. a test standing in for the sensing node).
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        self.state.borrow_mut().deliver(topic, payload);
    }

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<InboundMessage> {
        self.state.borrow().published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.state
            .borrow()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| String::from_utf8_lossy(&m.payload).into_owned())
            .collect()
    }

    /// Client identities that attempted to connect, in order.
    pub fn connect_attempts(&self) -> Vec<String> {
        self.state.borrow().connects.clone()
    }

    /// Client identities of live sessions.
    pub fn live_clients(&self) -> Vec<String> {
        let state = self.state.borrow();
        state
            .sessions
            .iter()
            .filter(|s| s.epoch == state.epoch)
            .map(|s| s.client_id.clone())
            .collect()
    }

    pub fn refuse_next_connects(&self, count: u32) {
        self.state.borrow_mut().refuse_connects = count;
    }

    pub fn fail_next_publishes(&self, count: u32) {
        self.state.borrow_mut().fail_publishes = count;
    }

    /// Kill every open session, as if the broker restarted.
    pub fn drop_sessions(&self) {
        let mut state = self.state.borrow_mut();
        state.epoch += 1;
        state.sessions.clear();
    }
}

impl BrokerState {
    fn deliver(&mut self, topic: &str, payload: &[u8]) {
        let message = InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        for session in self.sessions.iter_mut() {
            if session.topics.iter().any(|t| t == topic) {
                session.inbox.push_back(message.clone());
            }
        }
        self.published.push(message);
    }

    fn session_mut(&mut self, id: u64) -> Option<&mut SessionEntry> {
        let epoch = self.epoch;
        self.sessions
            .iter_mut()
            .find(|s| s.id == id && s.epoch == epoch)
    }
}

pub struct LoopbackConnector {
    broker: LoopbackBroker,
}

impl BrokerConnector for LoopbackConnector {
    type Session = LoopbackSession;

    fn connect(&mut self, client_id: &str) -> Result<LoopbackSession, TransportError> {
        self.broker.open(client_id)
    }
}

pub struct LoopbackSession {
    broker: LoopbackBroker,
    id: u64,
    closed: bool,
}

impl LoopbackSession {
    fn check_live(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::Connection("loopback session dropped".to_string()))
        }
    }
}

impl BrokerSession for LoopbackSession {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.check_live()?;
        let mut state = self.broker.state.borrow_mut();
        if let Some(session) = state.session_mut(self.id) {
            if !session.topics.iter().any(|t| t == topic) {
                session.topics.push(topic.to_string());
            }
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.check_live()?;
        let mut state = self.broker.state.borrow_mut();
        if state.fail_publishes > 0 {
            state.fail_publishes -= 1;
            return Err(TransportError::Client("loopback publish rejected".to_string()));
        }
        state.deliver(topic, payload);
        Ok(())
    }

    fn poll(&mut self, _wait: Duration) -> Result<Option<InboundMessage>, TransportError> {
        self.check_live()?;
        let mut state = self.broker.state.borrow_mut();
        Ok(state
            .session_mut(self.id)
            .and_then(|session| session.inbox.pop_front()))
    }

    fn is_connected(&self) -> bool {
        if self.closed {
            return false;
        }
        let state = self.broker.state.borrow();
        state
            .sessions
            .iter()
            .any(|s| s.id == self.id && s.epoch == state.epoch)
    }

    fn close(&mut self) {
        self.closed = true;
        let id = self.id;
        self.broker
            .state
            .borrow_mut()
            .sessions
            .retain(|s| s.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_only_to_subscribers() {
        let broker = LoopbackBroker::new();
        let mut field = broker.open("field-1").unwrap();
        let mut other = broker.open("other").unwrap();
        field.subscribe("esp32/detections").unwrap();

        broker.inject("esp32/detections", b"Detected: person");
        broker.inject("camera/results", b"{}");

        let msg = field.poll(Duration::ZERO).unwrap().expect("delivered");
        assert_eq!(msg.payload, b"Detected: person");
        assert!(field.poll(Duration::ZERO).unwrap().is_none());
        assert!(other.poll(Duration::ZERO).unwrap().is_none());
        assert_eq!(broker.published().len(), 2);
    }

    #[test]
    fn dropped_sessions_fail_every_operation() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("field-1").unwrap();
        broker.drop_sessions();
        assert!(!session.is_connected());
        assert!(session.publish("esp32/status", b"online").is_err());
        assert!(session.poll(Duration::ZERO).is_err());

        let fresh = broker.open("field-2").unwrap();
        assert!(fresh.is_connected());
        assert_eq!(broker.live_clients(), vec!["field-2".to_string()]);
    }

    #[test]
    fn refused_connects_are_counted_down() {
        let broker = LoopbackBroker::new();
        broker.refuse_next_connects(1);
        assert!(broker.open("a").is_err());
        assert!(broker.open("b").is_ok());
        assert_eq!(broker.connect_attempts(), vec!["a", "b"]);
    }

    #[test]
    fn failed_publish_is_not_recorded() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        broker.fail_next_publishes(1);
        assert!(session.publish("camera/results", b"x").is_err());
        session.publish("camera/results", b"y").unwrap();
        assert_eq!(broker.published_on("camera/results"), vec!["y"]);
    }

    #[test]
    fn close_removes_session() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        session.close();
        assert!(!session.is_connected());
        assert!(broker.live_clients().is_empty());
    }
}
