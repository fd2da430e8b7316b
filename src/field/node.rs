use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::TransportError;
use crate::field::connectivity::{ConnectionState, ConnectivityManager};
use crate::field::heartbeat::HeartbeatScheduler;
use crate::field::link::LinkDriver;
use crate::field::router::{MessageRouter, RouteOutcome};
use crate::transport::{BrokerConnector, BrokerSession};

pub const DEFAULT_LOOP_POLL: Duration = Duration::from_millis(100);

/// What one loop iteration did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub routed: Option<RouteOutcome>,
    pub heartbeat_sent: bool,
}

/// Field node main loop: one inbound message and one heartbeat check per
/// iteration, with any transport error handed to the connectivity manager.
pub struct FieldNode<L: LinkDriver, C: BrokerConnector> {
    connectivity: ConnectivityManager<L, C>,
    router: MessageRouter,
    heartbeat: HeartbeatScheduler,
    poll_interval: Duration,
}

impl<L: LinkDriver, C: BrokerConnector> FieldNode<L, C> {
    pub fn new(
        connectivity: ConnectivityManager<L, C>,
        router: MessageRouter,
        heartbeat: HeartbeatScheduler,
        poll_interval: Duration,
    ) -> Self {
        Self {
            connectivity,
            router,
            heartbeat,
            poll_interval,
        }
    }

    pub fn connectivity(&self) -> &ConnectivityManager<L, C> {
        &self.connectivity
    }

    pub fn connectivity_mut(&mut self) -> &mut ConnectivityManager<L, C> {
        &mut self.connectivity
    }

    pub fn tick(&mut self, now: Instant) -> Result<TickReport, TransportError> {
        if self.connectivity.refresh() != ConnectionState::LinkUpSessionUp {
            return Err(TransportError::NotConnected);
        }
        let session = self.connectivity.session_mut()?;

        let routed = match session.poll(Duration::ZERO)? {
            Some(message) => {
                log::info!("Message received on topic [{}]", message.topic);
                Some(self.router.route(&message.payload))
            }
            None => None,
        };
        let heartbeat_sent = self.heartbeat.tick(session, now)?;

        Ok(TickReport {
            routed,
            heartbeat_sent,
        })
    }

    /// One iteration with recovery: errors never escape.
    pub fn step(&mut self, now: Instant) -> Option<TickReport> {
        match self.tick(now) {
            Ok(report) => Some(report),
            Err(e) => {
                self.connectivity.report_failure(&e);
                self.connectivity.recover();
                None
            }
        }
    }

    /// Loop until `quit` is set, then close the session. `on_step` sees the
    /// connection state after every iteration.
    pub fn run(&mut self, quit: &AtomicBool, mut on_step: impl FnMut(ConnectionState)) {
        log::info!("Starting main loop...");
        while !quit.load(Ordering::Relaxed) {
            self.step(Instant::now());
            on_step(self.connectivity.state());
            std::thread::sleep(self.poll_interval);
        }
        self.connectivity.shutdown();
        log::info!("Field node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::connectivity::tests::{fast_link, session_settings, ScriptedLink};
    use crate::transport::{LoopbackBroker, LoopbackConnector};

    fn node(broker: &LoopbackBroker, link: ScriptedLink, t0: Instant) -> FieldNode<ScriptedLink, LoopbackConnector> {
        let mut connectivity = ConnectivityManager::new(
            link,
            broker.connector(),
            fast_link(),
            session_settings(),
            Duration::ZERO,
        );
        connectivity.start().unwrap();
        FieldNode::new(
            connectivity,
            MessageRouter::default(),
            HeartbeatScheduler::new(Duration::from_secs(30), "esp32/status", "Field node online", t0),
            Duration::ZERO,
        )
    }

    #[test]
    fn routes_one_message_per_tick() {
        let broker = LoopbackBroker::new();
        let t0 = Instant::now();
        let mut n = node(&broker, ScriptedLink::up(), t0);

        broker.inject("esp32/detections", b"Detected: cat");
        broker.inject("esp32/detections", b"Detected: bird");

        let first = n.tick(t0).unwrap();
        assert_eq!(first.routed, Some(RouteOutcome::Matched("cat".to_string())));
        let second = n.tick(t0).unwrap();
        assert_eq!(second.routed, Some(RouteOutcome::Matched("bird".to_string())));
        assert_eq!(n.tick(t0).unwrap().routed, None);
    }

    #[test]
    fn heartbeat_rides_the_loop() {
        let broker = LoopbackBroker::new();
        let t0 = Instant::now();
        let mut n = node(&broker, ScriptedLink::up(), t0);

        assert!(!n.tick(t0 + Duration::from_secs(10)).unwrap().heartbeat_sent);
        assert!(n.tick(t0 + Duration::from_secs(30)).unwrap().heartbeat_sent);
        assert_eq!(
            broker.published_on("esp32/status"),
            vec!["Field node connected and ready", "Field node online"]
        );
    }

    #[test]
    fn step_recovers_from_dropped_session() {
        let broker = LoopbackBroker::new();
        let t0 = Instant::now();
        let mut n = node(&broker, ScriptedLink::up(), t0);

        broker.drop_sessions();
        assert!(n.step(t0).is_none());
        assert_eq!(
            n.connectivity().state(),
            ConnectionState::LinkUpSessionUp
        );
        assert_eq!(broker.connect_attempts().len(), 2);

        broker.inject("esp32/detections", b"Person detected");
        let report = n.step(t0).unwrap();
        assert_eq!(report.routed, Some(RouteOutcome::Matched("person".to_string())));
    }

    #[test]
    fn run_reports_state_until_quit() {
        let broker = LoopbackBroker::new();
        let mut n = node(&broker, ScriptedLink::up(), Instant::now());
        let quit = AtomicBool::new(false);
        let mut states = Vec::new();
        n.run(&quit, |state| {
            states.push(state);
            if states.len() == 3 {
                quit.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(states, vec![ConnectionState::LinkUpSessionUp; 3]);
        assert!(broker.live_clients().is_empty());
    }
}
