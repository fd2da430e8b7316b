//! Scorer output → final detections.
//!
//! Per frame: best class per candidate, confidence threshold, normalized to
//! pixel box conversion (truncating), greedy non-maximum suppression, then
//! label lookup. An empty result is a normal outcome.

use serde::Deserialize;

use crate::detect::result::{BoundingBox, Candidate, Detection, ScorerOutput};
use crate::detect::vocabulary::ClassVocabulary;

pub const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.3;

/// Which boxes compete with each other during suppression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionMode {
    /// One pass over all boxes regardless of class.
    #[default]
    ClassAgnostic,
    /// Boxes only suppress boxes of the same class.
    PerClass,
}

impl std::str::FromStr for SuppressionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "class_agnostic" | "agnostic" => Ok(Self::ClassAgnostic),
            "per_class" | "class" => Ok(Self::PerClass),
            other => Err(anyhow::anyhow!(
                "unknown suppression mode '{}': expected 'class_agnostic' or 'per_class'",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineConfig {
    pub conf_threshold: f32,
    pub nms_threshold: f32,
    pub suppression: SuppressionMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            suppression: SuppressionMode::ClassAgnostic,
        }
    }
}

/// Thresholded candidate in pixel space, before suppression.
#[derive(Clone, Debug)]
struct Scored {
    class_id: usize,
    confidence: f32,
    bbox: BoundingBox,
}

pub struct DetectionPipeline {
    config: PipelineConfig,
    vocabulary: ClassVocabulary,
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig, vocabulary: ClassVocabulary) -> Self {
        Self { config, vocabulary }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode one scorer output against the source frame's pixel size.
    pub fn run(&self, output: &ScorerOutput, frame_width: u32, frame_height: u32) -> Vec<Detection> {
        let scored: Vec<Scored> = output
            .candidates()
            .filter_map(|candidate| self.threshold(candidate, frame_width, frame_height))
            .collect();

        let kept = suppress(
            &scored,
            self.config.nms_threshold,
            self.config.suppression,
        );

        log::debug!(
            "pipeline: {} candidates, {} above threshold, {} after suppression",
            output.candidate_count(),
            scored.len(),
            kept.len()
        );

        kept.into_iter()
            .map(|index| {
                let s = &scored[index];
                Detection {
                    name: self.vocabulary.label(s.class_id),
                    confidence: s.confidence,
                    bbox: s.bbox,
                    class_id: s.class_id,
                }
            })
            .collect()
    }

    fn threshold(&self, candidate: &Candidate, frame_width: u32, frame_height: u32) -> Option<Scored> {
        let (class_id, confidence) = candidate.best_class()?;
        if confidence.is_nan() || confidence < self.config.conf_threshold {
            return None;
        }
        let bbox = to_pixel_box(candidate, frame_width, frame_height);
        if bbox.width <= 0 || bbox.height <= 0 {
            return None;
        }
        Some(Scored {
            class_id,
            confidence,
            bbox,
        })
    }
}

/// Normalized center/size → top-left pixel box, truncating toward zero.
pub fn to_pixel_box(candidate: &Candidate, frame_width: u32, frame_height: u32) -> BoundingBox {
    let fw = frame_width as f32;
    let fh = frame_height as f32;
    let width = (candidate.width * fw) as i32;
    let height = (candidate.height * fh) as i32;
    let x = (candidate.center_x * fw - width as f32 / 2.0) as i32;
    let y = (candidate.center_y * fh - height as f32 / 2.0) as i32;
    BoundingBox {
        x,
        y,
        width,
        height,
    }
}

/// Greedy NMS. Returns indices into `scored` in retention order
/// (descending confidence, scorer order on ties).
fn suppress(scored: &[Scored], nms_threshold: f32, mode: SuppressionMode) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scored.len()).collect();
    // Stable sort keeps scorer order among equal confidences.
    order.sort_by(|&a, &b| scored[b].confidence.total_cmp(&scored[a].confidence));

    let mut kept: Vec<usize> = Vec::new();
    for index in order {
        let candidate = &scored[index];
        let overlaps = kept.iter().any(|&k| {
            let other = &scored[k];
            let competes = match mode {
                SuppressionMode::ClassAgnostic => true,
                SuppressionMode::PerClass => other.class_id == candidate.class_id,
            };
            competes && candidate.bbox.iou(&other.bbox) > nms_threshold
        });
        if !overlaps {
            kept.push(index);
        }
    }
    kept
}
