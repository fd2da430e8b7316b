use anyhow::Result;

use crate::detect::result::ScorerOutput;
use crate::frame::Frame;

/// Opaque object scorer.
///
/// A scorer owns model loading and tensor execution. It receives a decoded
/// frame and returns raw candidate rows per output layer; thresholding,
/// box conversion and suppression happen downstream in `DetectionPipeline`.
///
/// Implementations must treat the frame as read-only and must not keep it
/// past the `score` call.
pub trait Scorer {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Run the model over one frame.
    fn score(&mut self, frame: &Frame) -> Result<ScorerOutput>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Scorer + ?Sized> Scorer for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn score(&mut self, frame: &Frame) -> Result<ScorerOutput> {
        (**self).score(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
