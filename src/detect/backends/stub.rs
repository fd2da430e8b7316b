use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::Scorer;
use crate::detect::result::ScorerOutput;
use crate::frame::Frame;

/// Scripted scorer for tests and dry runs.
///
/// Returns queued outputs in order, then empty outputs once the script runs out.
#[derive(Default)]
pub struct StubScorer {
    script: VecDeque<ScorerOutput>,
    frames_scored: u64,
}

impl StubScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an output for a future `score` call.
    pub fn push(&mut self, output: ScorerOutput) {
        self.script.push_back(output);
    }

    pub fn with_script(outputs: impl IntoIterator<Item = ScorerOutput>) -> Self {
        Self {
            script: outputs.into_iter().collect(),
            frames_scored: 0,
        }
    }

    pub fn frames_scored(&self) -> u64 {
        self.frames_scored
    }
}

impl Scorer for StubScorer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn score(&mut self, _frame: &Frame) -> Result<ScorerOutput> {
        self.frames_scored += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::OutputLayer;
    use image::RgbImage;

    #[test]
    fn stub_replays_script_then_goes_quiet() {
        let layer = OutputLayer::from_rows(&[0.5, 0.5, 0.2, 0.2, 1.0, 0.9], 6);
        let mut scorer = StubScorer::with_script([ScorerOutput {
            layers: vec![layer],
        }]);
        let frame = Frame::from_rgb(RgbImage::new(4, 4));

        assert_eq!(scorer.score(&frame).unwrap().candidate_count(), 1);
        assert_eq!(scorer.score(&frame).unwrap().candidate_count(), 0);
        assert_eq!(scorer.frames_scored(), 2);
    }
}
