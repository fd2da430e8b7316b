use std::time::{Duration, Instant};

use crate::error::TransportError;
use crate::transport::BrokerSession;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic liveness message on the status topic.
///
/// The interval is measured from the last successful heartbeat (or from
/// construction), so a failed send is retried on the next tick.
pub struct HeartbeatScheduler {
    interval: Duration,
    topic: String,
    message: String,
    last_beat: Instant,
}

impl HeartbeatScheduler {
    pub fn new(interval: Duration, topic: impl Into<String>, message: impl Into<String>, now: Instant) -> Self {
        Self {
            interval,
            topic: topic.into(),
            message: message.into(),
            last_beat: now,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_beat) >= self.interval
    }

    /// Send the heartbeat if due. Returns whether one was sent.
    pub fn tick<S: BrokerSession + ?Sized>(
        &mut self,
        session: &mut S,
        now: Instant,
    ) -> Result<bool, TransportError> {
        if !self.is_due(now) {
            return Ok(false);
        }
        session.publish(&self.topic, self.message.as_bytes())?;
        self.last_beat = now;
        log::info!("Status update sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackBroker;

    #[test]
    fn fires_once_per_interval() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("field").unwrap();
        let t0 = Instant::now();
        let mut hb = HeartbeatScheduler::new(Duration::from_secs(30), "esp32/status", "online", t0);

        assert!(!hb.tick(&mut session, t0 + Duration::from_secs(29)).unwrap());
        assert!(hb.tick(&mut session, t0 + Duration::from_secs(30)).unwrap());
        assert!(!hb.tick(&mut session, t0 + Duration::from_secs(45)).unwrap());
        assert!(hb.tick(&mut session, t0 + Duration::from_secs(61)).unwrap());
        assert_eq!(broker.published_on("esp32/status"), vec!["online", "online"]);
    }

    #[test]
    fn failed_heartbeat_is_retried_next_tick() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("field").unwrap();
        let t0 = Instant::now();
        let mut hb = HeartbeatScheduler::new(Duration::from_secs(30), "esp32/status", "online", t0);

        broker.fail_next_publishes(1);
        assert!(hb.tick(&mut session, t0 + Duration::from_secs(31)).is_err());
        assert!(hb.is_due(t0 + Duration::from_secs(31)));
        assert!(hb.tick(&mut session, t0 + Duration::from_secs(32)).unwrap());
    }
}
