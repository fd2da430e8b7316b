//! Vision relay
//!
//! Links a camera-side sensing node and a remote field node over MQTT.
//!
//! # Architecture
//!
//! The sensing node runs one synchronous cycle per frame:
//!
//! 1. **Acquire**: pull a snapshot from the camera (`ingest`).
//! 2. **Score**: run the opaque scorer over the frame (`detect::Scorer`).
//! 3. **Decode**: threshold, convert boxes, suppress overlaps (`detect::DetectionPipeline`).
//! 4. **Publish**: rate-limited JSON event plus a plain-text summary (`publish`).
//!
//! The field node subscribes to the summaries, dispatches them by keyword,
//! sends heartbeats, and supervises its own link and broker session
//! (`field`). Neither node ever exits on a recoverable error.
//!
//! # Module Structure
//!
//! - `config`: layered configuration for both nodes
//! - `error`: acquisition, transport and connectivity failures
//! - `frame`: decoded RGB frames
//! - `ingest`: frame sources (HTTP snapshot, file)
//! - `detect`: scorer seam, backends, detection pipeline
//! - `publish`: detection events and the emission rate gate
//! - `transport`: broker sessions (MQTT, in-process loopback)
//! - `sensing`: the sensing node cycle
//! - `field`: the field node loop and its collaborators

pub mod config;
pub mod detect;
pub mod error;
pub mod field;
pub mod frame;
pub mod ingest;
pub mod publish;
pub mod sensing;
pub mod transport;

pub use detect::{Detection, DetectionPipeline, PipelineConfig, Scorer, ScorerOutput};
pub use error::{AcquisitionError, ConnectivityError, PublishError, TransportError};
pub use frame::Frame;
pub use publish::{AlertPolicy, DetectionEvent, EventPublisher, PublishOutcome, RateGate};
pub use sensing::{CycleError, CycleReport, SensingNode};
