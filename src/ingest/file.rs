//! Local file snapshot source.
//!
//! Re-reads one image file on every call, so a process writing snapshots to
//! a path (or a fixed test image) can stand in for a network camera.

use std::path::PathBuf;

use crate::error::AcquisitionError;
use crate::frame::Frame;

use super::FrameSource;

pub struct FileSnapshotSource {
    path: PathBuf,
    frame_count: u64,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_count: 0,
        }
    }
}

impl FrameSource for FileSnapshotSource {
    fn describe(&self) -> String {
        format!("file snapshot {}", self.path.display())
    }

    fn next_frame(&mut self) -> Result<Frame, AcquisitionError> {
        let bytes = std::fs::read(&self.path)?;
        let frame = Frame::decode(&bytes)?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn reads_and_decodes_file_each_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shot.png");
        DynamicImage::ImageRgb8(RgbImage::new(32, 24))
            .save(&path)
            .expect("write png");

        let mut source = FileSnapshotSource::new(&path);
        let frame = source.next_frame().expect("first frame");
        assert_eq!((frame.width(), frame.height()), (32, 24));
        source.next_frame().expect("second frame");
        assert_eq!(source.frames_captured(), 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut source = FileSnapshotSource::new("/nonexistent/shot.jpg");
        assert!(matches!(source.next_frame(), Err(AcquisitionError::Io(_))));
        assert_eq!(source.frames_captured(), 0);
    }
}
