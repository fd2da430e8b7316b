//! Detection events: message construction and rate limiting.
//!
//! Every emission sends two messages:
//! - a JSON `DetectionEvent` (timestamp, detections, count) on the results topic
//! - a plain `Detected: a, b` summary on the topic constrained consumers read
//!
//! Emission is gated by a fixed interval since the last successful emission.
//! Detections seen while the gate is closed are dropped, not queued.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::error::PublishError;
use crate::transport::BrokerSession;

pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_secs(2);

/// Re-alert behaviour once the interval has elapsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum AlertPolicy {
    /// The first non-empty cycle after the interval always emits.
    #[default]
    EveryInterval,
    /// After an emission, `empty_cycles` consecutive empty cycles must be
    /// observed before the next emission.
    RequireQuiet { empty_cycles: u32 },
}

/// Fixed-interval emission gate.
#[derive(Clone, Debug)]
pub struct RateGate {
    interval: Duration,
    policy: AlertPolicy,
    last_emit: Option<Instant>,
    quiet_streak: u32,
}

impl RateGate {
    pub fn new(interval: Duration, policy: AlertPolicy) -> Self {
        Self {
            interval,
            policy,
            last_emit: None,
            quiet_streak: 0,
        }
    }

    /// Record a cycle that produced no detections.
    pub fn observe_empty(&mut self) {
        self.quiet_streak = self.quiet_streak.saturating_add(1);
    }

    /// Record a cycle with detections that the gate held back. It breaks any
    /// run of empty cycles.
    pub fn observe_suppressed(&mut self) {
        self.quiet_streak = 0;
    }

    pub fn is_open(&self, now: Instant) -> bool {
        let Some(last) = self.last_emit else {
            return true;
        };
        if now.saturating_duration_since(last) < self.interval {
            return false;
        }
        match self.policy {
            AlertPolicy::EveryInterval => true,
            AlertPolicy::RequireQuiet { empty_cycles } => self.quiet_streak >= empty_cycles,
        }
    }

    pub fn record_emit(&mut self, now: Instant) {
        self.last_emit = Some(now);
        self.quiet_streak = 0;
    }

    pub fn last_emit(&self) -> Option<Instant> {
        self.last_emit
    }
}

/// Structured message for one emission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectionEvent {
    /// Wall-clock seconds since the Unix epoch at send time.
    pub timestamp: f64,
    pub detections: Vec<Detection>,
    pub count: usize,
}

impl DetectionEvent {
    pub fn new(detections: Vec<Detection>, sent_at: SystemTime) -> Self {
        let timestamp = sent_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let count = detections.len();
        Self {
            timestamp,
            detections,
            count,
        }
    }
}

/// `Detected: person, car`, labels in detection order.
pub fn summary_message(detections: &[Detection]) -> String {
    let names: Vec<&str> = detections.iter().map(|d| d.name.as_str()).collect();
    format!("Detected: {}", names.join(", "))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublisherTopics {
    /// JSON `DetectionEvent`s.
    pub results: String,
    /// Plain-text summaries.
    pub summary: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    NothingDetected,
    RateLimited,
    Emitted { count: usize },
}

pub struct EventPublisher {
    topics: PublisherTopics,
    gate: RateGate,
}

impl EventPublisher {
    pub fn new(topics: PublisherTopics, gate: RateGate) -> Self {
        Self { topics, gate }
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    /// Offer one cycle's detections.
    ///
    /// On an error nothing is retried and the gate is left as it
    /// was, so the next cycle may try again.
    pub fn offer<S: BrokerSession + ?Sized>(
        &mut self,
        session: &mut S,
        detections: &[Detection],
        now: Instant,
        wall: SystemTime,
    ) -> Result<PublishOutcome, PublishError> {
        if detections.is_empty() {
            self.gate.observe_empty();
            return Ok(PublishOutcome::NothingDetected);
        }
        if !self.gate.is_open(now) {
            self.gate.observe_suppressed();
            return Ok(PublishOutcome::RateLimited);
        }

        let event = DetectionEvent::new(detections.to_vec(), wall);
        let json = serde_json::to_vec(&event)?;
        session.publish(&self.topics.results, &json)?;
        log::info!("Sent MQTT message: {} objects detected", event.count);

        let summary = summary_message(detections);
        session.publish(&self.topics.summary, summary.as_bytes())?;
        log::info!("Simple message: {}", summary);

        self.gate.record_emit(now);
        Ok(PublishOutcome::Emitted { count: event.count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::transport::LoopbackBroker;

    fn detection(name: &str, confidence: f32) -> Detection {
        Detection {
            name: name.to_string(),
            confidence,
            bbox: BoundingBox::from([10, 20, 30, 40]),
            class_id: 0,
        }
    }

    fn publisher(policy: AlertPolicy) -> EventPublisher {
        EventPublisher::new(
            PublisherTopics {
                results: "camera/results".to_string(),
                summary: "esp32/detections".to_string(),
            },
            RateGate::new(Duration::from_secs(2), policy),
        )
    }

    #[test]
    fn summary_joins_labels_in_order() {
        let ds = vec![detection("person", 0.9), detection("car", 0.7)];
        assert_eq!(summary_message(&ds), "Detected: person, car");
    }

    #[test]
    fn event_serializes_expected_shape() {
        let sent = UNIX_EPOCH + Duration::from_millis(1_700_000_000_500);
        let event = DetectionEvent::new(vec![detection("person", 0.9)], sent);
        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&event).unwrap()).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["timestamp"], 1_700_000_000.5);
        assert_eq!(json["detections"][0]["name"], "person");
        assert_eq!(json["detections"][0]["bbox"], serde_json::json!([10, 20, 30, 40]));
    }

    #[test]
    fn empty_cycle_emits_nothing() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::EveryInterval);
        let outcome = p
            .offer(&mut session, &[], Instant::now(), SystemTime::now())
            .unwrap();
        assert_eq!(outcome, PublishOutcome::NothingDetected);
        assert!(broker.published().is_empty());
        assert!(p.gate().last_emit().is_none());
    }

    #[test]
    fn second_offer_within_interval_is_suppressed() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::EveryInterval);
        let ds = [detection("person", 0.9)];
        let t0 = Instant::now();

        let first = p.offer(&mut session, &ds, t0, SystemTime::now()).unwrap();
        let second = p
            .offer(&mut session, &ds, t0 + Duration::from_millis(1500), SystemTime::now())
            .unwrap();
        assert_eq!(first, PublishOutcome::Emitted { count: 1 });
        assert_eq!(second, PublishOutcome::RateLimited);
        assert_eq!(broker.published_on("camera/results").len(), 1);
        assert_eq!(
            broker.published_on("esp32/detections"),
            vec!["Detected: person"]
        );
    }

    #[test]
    fn offers_an_interval_apart_both_emit() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::EveryInterval);
        let ds = [detection("cat", 0.8)];
        let t0 = Instant::now();

        p.offer(&mut session, &ds, t0, SystemTime::now()).unwrap();
        let second = p
            .offer(&mut session, &ds, t0 + Duration::from_secs(2), SystemTime::now())
            .unwrap();
        assert_eq!(second, PublishOutcome::Emitted { count: 1 });
        assert_eq!(broker.published_on("camera/results").len(), 2);
    }

    #[test]
    fn suppressed_cycle_does_not_move_the_gate() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::EveryInterval);
        let ds = [detection("person", 0.9)];
        let t0 = Instant::now();

        p.offer(&mut session, &ds, t0, SystemTime::now()).unwrap();
        p.offer(&mut session, &ds, t0 + Duration::from_secs(1), SystemTime::now())
            .unwrap();
        assert_eq!(p.gate().last_emit(), Some(t0));
        let third = p
            .offer(&mut session, &ds, t0 + Duration::from_secs(2), SystemTime::now())
            .unwrap();
        assert_eq!(third, PublishOutcome::Emitted { count: 1 });
    }

    #[test]
    fn transport_failure_leaves_gate_open() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::EveryInterval);
        let ds = [detection("person", 0.9)];
        let t0 = Instant::now();

        broker.fail_next_publishes(1);
        assert!(p.offer(&mut session, &ds, t0, SystemTime::now()).is_err());
        assert!(p.gate().last_emit().is_none());

        let retry = p
            .offer(&mut session, &ds, t0 + Duration::from_millis(100), SystemTime::now())
            .unwrap();
        assert_eq!(retry, PublishOutcome::Emitted { count: 1 });
    }

    #[test]
    fn require_quiet_waits_for_empty_cycles() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::RequireQuiet { empty_cycles: 2 });
        let ds = [detection("person", 0.9)];
        let t0 = Instant::now();

        p.offer(&mut session, &ds, t0, SystemTime::now()).unwrap();
        let sustained = p
            .offer(&mut session, &ds, t0 + Duration::from_secs(5), SystemTime::now())
            .unwrap();
        assert_eq!(sustained, PublishOutcome::RateLimited);

        p.offer(&mut session, &[], t0 + Duration::from_secs(6), SystemTime::now())
            .unwrap();
        p.offer(&mut session, &[], t0 + Duration::from_secs(7), SystemTime::now())
            .unwrap();
        let rearmed = p
            .offer(&mut session, &ds, t0 + Duration::from_secs(8), SystemTime::now())
            .unwrap();
        assert_eq!(rearmed, PublishOutcome::Emitted { count: 1 });
    }

    #[test]
    fn detections_between_empty_cycles_break_the_quiet_run() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::RequireQuiet { empty_cycles: 2 });
        let ds = [detection("person", 0.9)];
        let t0 = Instant::now();
        let at = |secs| t0 + Duration::from_secs(secs);

        p.offer(&mut session, &ds, at(0), SystemTime::now()).unwrap();
        p.offer(&mut session, &[], at(3), SystemTime::now()).unwrap();
        let held = p.offer(&mut session, &ds, at(4), SystemTime::now()).unwrap();
        p.offer(&mut session, &[], at(5), SystemTime::now()).unwrap();
        let last = p.offer(&mut session, &ds, at(6), SystemTime::now()).unwrap();

        assert_eq!(held, PublishOutcome::RateLimited);
        assert_eq!(last, PublishOutcome::RateLimited);
        assert_eq!(broker.published_on("esp32/detections").len(), 1);
    }

    #[test]
    fn transport_failure_is_reported_as_such() {
        let broker = LoopbackBroker::new();
        let mut session = broker.open("sensor").unwrap();
        let mut p = publisher(AlertPolicy::EveryInterval);

        broker.fail_next_publishes(1);
        let err = p
            .offer(&mut session, &[detection("car", 0.7)], Instant::now(), SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)));
    }
}
