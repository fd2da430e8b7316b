//! HTTP snapshot frame source.
//!
//! Each call to `next_frame` issues one GET against a snapshot endpoint
//! (for example an IP webcam's `/shot.jpg`), reads the whole body up to a
//! size cap, and decodes it in memory. The request is bounded by the
//! configured timeout so a stalled camera cannot wedge the sensing loop.

use std::io::Read;
use std::time::Duration;

use crate::error::AcquisitionError;
use crate::frame::Frame;

use super::FrameSource;

const MAX_SNAPSHOT_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for an HTTP snapshot source.
#[derive(Clone, Debug)]
pub struct HttpSnapshotConfig {
    /// Snapshot URL returning one encoded image per request.
    pub url: String,
    /// Whole-request timeout (connect + read).
    pub timeout: Duration,
    /// Largest accepted body.
    pub max_bytes: usize,
}

impl Default for HttpSnapshotConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/shot.jpg".to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_bytes: MAX_SNAPSHOT_BYTES,
        }
    }
}

/// Pulls single encoded frames from a camera over HTTP.
pub struct HttpSnapshotSource {
    config: HttpSnapshotConfig,
    agent: ureq::Agent,
    frame_count: u64,
}

impl HttpSnapshotSource {
    pub fn new(config: HttpSnapshotConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            config,
            agent,
            frame_count: 0,
        }
    }

    fn fetch(&self) -> Result<Vec<u8>, AcquisitionError> {
        let response = self.agent.get(&self.config.url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => AcquisitionError::Status(code),
            ureq::Error::Transport(transport) => AcquisitionError::Request(transport.to_string()),
        })?;
        read_capped(response.into_reader(), self.config.max_bytes)
    }
}

impl FrameSource for HttpSnapshotSource {
    fn describe(&self) -> String {
        format!("http snapshot {}", self.config.url)
    }

    fn next_frame(&mut self) -> Result<Frame, AcquisitionError> {
        let bytes = self.fetch()?;
        let frame = Frame::decode(&bytes)?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

/// Read a body fully, failing once it grows past `max_bytes`.
pub(crate) fn read_capped(reader: impl Read, max_bytes: usize) -> Result<Vec<u8>, AcquisitionError> {
    let mut bytes = Vec::new();
    reader
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(AcquisitionError::TooLarge(max_bytes));
    }
    if bytes.is_empty() {
        return Err(AcquisitionError::Empty);
    }
    Ok(bytes)
}
