mod backend;
mod backends;
mod pipeline;
mod result;
mod vocabulary;

pub use backend::Scorer;
pub use backends::StubScorer;
#[cfg(feature = "backend-tract")]
pub use backends::TractScorer;
pub use pipeline::{
    to_pixel_box, DetectionPipeline, PipelineConfig, SuppressionMode, DEFAULT_CONF_THRESHOLD,
    DEFAULT_NMS_THRESHOLD,
};
pub use result::{BoundingBox, Candidate, Detection, OutputLayer, ScorerOutput, ROW_PREFIX_LEN};
pub use vocabulary::{ClassVocabulary, COCO_LABELS};
