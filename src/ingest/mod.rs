//! Frame sources for the sensing node.
//!
//! Sources produce one decoded `Frame` per call:
//! - HTTP(S) snapshot endpoints (IP webcam `shot.jpg` style)
//! - Local image files (offline runs and tests)
//!
//! A failed fetch or decode is an `AcquisitionError`; the sensing loop logs
//! it, waits, and retries. Sources never retain frames between calls.

use std::time::Duration;

use url::Url;

use crate::error::AcquisitionError;
use crate::frame::Frame;

pub mod file;
pub mod http;

pub use file::FileSnapshotSource;
pub use http::{HttpSnapshotConfig, HttpSnapshotSource};

/// Anything that can hand the sensing loop a frame.
pub trait FrameSource {
    /// Human-readable source description for logs.
    fn describe(&self) -> String;

    /// Acquire and decode the next frame.
    fn next_frame(&mut self) -> Result<Frame, AcquisitionError>;

    /// Frames successfully produced so far.
    fn frames_captured(&self) -> u64;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn next_frame(&mut self) -> Result<Frame, AcquisitionError> {
        (**self).next_frame()
    }

    fn frames_captured(&self) -> u64 {
        (**self).frames_captured()
    }
}

/// Open a source by URL scheme: `http(s)://` or `file://`.
pub fn open_source(url: &str, timeout: Duration) -> Result<Box<dyn FrameSource>, AcquisitionError> {
    let parsed = Url::parse(url).map_err(|e| AcquisitionError::Unsupported(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Box::new(HttpSnapshotSource::new(HttpSnapshotConfig {
            url: url.to_string(),
            timeout,
            ..HttpSnapshotConfig::default()
        }))),
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| AcquisitionError::Unsupported(format!("bad file url {url}")))?;
            Ok(Box::new(FileSnapshotSource::new(path)))
        }
        other => Err(AcquisitionError::Unsupported(format!(
            "scheme '{other}'; expected http(s) or file"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_source_selects_by_scheme() {
        let http = open_source("http://192.168.8.157:8080/shot.jpg", Duration::from_secs(3))
            .expect("http source");
        assert!(http.describe().contains("shot.jpg"));

        let file = open_source("file:///tmp/frame.jpg", Duration::from_secs(3)).expect("file");
        assert!(file.describe().contains("frame.jpg"));
    }

    #[test]
    fn open_source_rejects_unknown_scheme() {
        let err = open_source("rtsp://camera/stream", Duration::from_secs(3))
            .err()
            .expect("rtsp rejected");
        assert!(err.to_string().contains("rtsp"));
    }
}
