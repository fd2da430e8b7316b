//! Sensing node cycle: acquire → score → pipeline → rate-limited publish.
//!
//! `cycle` is one fully synchronous iteration. Every failure comes back as a
//! `CycleError`; the caller logs it, sleeps `retry_delay`, and carries on.

use std::time::{Duration, Instant, SystemTime};

use crate::detect::{Detection, DetectionPipeline, Scorer};
use crate::error::{AcquisitionError, PublishError};
use crate::ingest::FrameSource;
use crate::publish::{EventPublisher, PublishOutcome};
use crate::transport::BrokerSession;

pub const DEFAULT_CONNECTION_RETRY: Duration = Duration::from_secs(2);
pub const DEFAULT_ERROR_RETRY: Duration = Duration::from_secs(1);
pub const DEFAULT_SESSION_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensingSettings {
    /// Delay after the camera could not be reached.
    pub connection_retry: Duration,
    /// Delay after any other failed cycle.
    pub error_retry: Duration,
    /// Time spent driving the broker session at the start of each cycle.
    pub session_poll: Duration,
}

impl Default for SensingSettings {
    fn default() -> Self {
        Self {
            connection_retry: DEFAULT_CONNECTION_RETRY,
            error_retry: DEFAULT_ERROR_RETRY,
            session_poll: DEFAULT_SESSION_POLL,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("scorer failed: {0:#}")]
    Scorer(anyhow::Error),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl CycleError {
    /// Whether the camera itself was unreachable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            CycleError::Acquisition(AcquisitionError::Request(_) | AcquisitionError::Status(_))
        )
    }

    pub fn retry_delay(&self, settings: &SensingSettings) -> Duration {
        if self.is_connection_error() {
            settings.connection_retry
        } else {
            settings.error_retry
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub frame_width: u32,
    pub frame_height: u32,
    pub detections: Vec<Detection>,
    pub outcome: PublishOutcome,
}

pub struct SensingNode<F: FrameSource, S: Scorer> {
    source: F,
    scorer: S,
    pipeline: DetectionPipeline,
    publisher: EventPublisher,
    settings: SensingSettings,
}

impl<F: FrameSource, S: Scorer> SensingNode<F, S> {
    pub fn new(
        source: F,
        scorer: S,
        pipeline: DetectionPipeline,
        publisher: EventPublisher,
        settings: SensingSettings,
    ) -> Self {
        Self {
            source,
            scorer,
            pipeline,
            publisher,
            settings,
        }
    }

    pub fn settings(&self) -> &SensingSettings {
        &self.settings
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn warm_up(&mut self) -> anyhow::Result<()> {
        self.scorer.warm_up()
    }

    pub fn cycle<B: BrokerSession + ?Sized>(
        &mut self,
        session: &mut B,
        now: Instant,
        wall: SystemTime,
    ) -> Result<CycleReport, CycleError> {
        // The sensing node subscribes to nothing; polling only keeps the
        // session alive and lets it reconnect.
        if let Err(e) = session.poll(self.settings.session_poll) {
            log::warn!("Broker session: {}", e);
        }

        let frame = self.source.next_frame()?;
        let output = self.scorer.score(&frame).map_err(CycleError::Scorer)?;
        let detections = self.pipeline.run(&output, frame.width(), frame.height());
        let outcome = self.publisher.offer(session, &detections, now, wall)?;

        Ok(CycleReport {
            frame_width: frame.width(),
            frame_height: frame.height(),
            detections,
            outcome,
        })
    }
}
