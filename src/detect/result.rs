use serde::{Deserialize, Serialize};

/// Number of leading row values that are not class scores:
/// center x, center y, width, height, objectness.
pub const ROW_PREFIX_LEN: usize = 5;

/// One raw scorer row before thresholding and suppression.
///
/// Box values are normalized to 0..1 of the scorer input.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub objectness: f32,
    pub class_scores: Vec<f32>,
}

impl Candidate {
    /// Parse a `[cx, cy, w, h, objectness, score_0, score_1, ...]` row.
    ///
    /// Returns `None` for rows without at least one class score.
    pub fn from_row(row: &[f32]) -> Option<Self> {
        if row.len() <= ROW_PREFIX_LEN {
            return None;
        }
        Some(Self {
            center_x: row[0],
            center_y: row[1],
            width: row[2],
            height: row[3],
            objectness: row[4],
            class_scores: row[ROW_PREFIX_LEN..].to_vec(),
        })
    }

    /// Highest-scoring class and its score. The first class wins ties.
    pub fn best_class(&self) -> Option<(usize, f32)> {
        self.class_scores
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (id, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((id, score)),
            })
    }
}

/// Candidates from one scorer output layer.
#[derive(Clone, Debug, Default)]
pub struct OutputLayer {
    pub candidates: Vec<Candidate>,
}

impl OutputLayer {
    /// Split a flat row-major buffer into candidates of `row_len` values.
    pub fn from_rows(flat: &[f32], row_len: usize) -> Self {
        let candidates = if row_len == 0 {
            Vec::new()
        } else {
            flat.chunks_exact(row_len)
                .filter_map(Candidate::from_row)
                .collect()
        };
        Self { candidates }
    }
}

/// Everything the scorer produced for one frame.
#[derive(Clone, Debug, Default)]
pub struct ScorerOutput {
    pub layers: Vec<OutputLayer>,
}

impl ScorerOutput {
    pub fn candidate_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.candidates.len()).sum()
    }

    /// Candidates across all layers in scorer order.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.layers.iter().flat_map(|layer| layer.candidates.iter())
    }
}

/// Pixel-space box. Serialized as `[x, y, w, h]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> i64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            return 0;
        }
        i64::from(right - left) * i64::from(bottom - top)
    }

    /// Intersection over union. Zero when both boxes are empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union > 0 {
            intersection as f32 / union as f32
        } else {
            0.0
        }
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// One recognized object in a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Category label from the class vocabulary.
    pub name: String,
    /// Best class score, in 0..1.
    pub confidence: f32,
    /// Box in source-frame pixels.
    pub bbox: BoundingBox,
    #[serde(skip)]
    pub class_id: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_row_splits_box_objectness_and_scores() {
        let c = Candidate::from_row(&[0.5, 0.4, 0.2, 0.1, 0.7, 0.1, 0.9]).expect("row");
        assert_eq!(c.center_x, 0.5);
        assert_eq!(c.objectness, 0.7);
        assert_eq!(c.class_scores, vec![0.1, 0.9]);
        assert_eq!(c.best_class(), Some((1, 0.9)));
    }

    #[test]
    fn from_row_rejects_rows_without_scores() {
        assert!(Candidate::from_row(&[0.5, 0.5, 0.1, 0.1, 0.9]).is_none());
    }

    #[test]
    fn best_class_prefers_first_on_tie() {
        let c = Candidate::from_row(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.6, 0.6]).expect("row");
        assert_eq!(c.best_class(), Some((0, 0.6)));
    }

    #[test]
    fn output_layer_drops_trailing_partial_row() {
        let flat = [0.5, 0.5, 0.1, 0.1, 1.0, 0.8, 0.5, 0.5, 0.1];
        let layer = OutputLayer::from_rows(&flat, 6);
        assert_eq!(layer.candidates.len(), 1);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::from([0, 0, 10, 10]);
        let b = BoundingBox::from([20, 20, 10, 10]);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        // Overlap 5x10 = 50, union 100 + 100 - 50 = 150.
        let a = BoundingBox::from([0, 0, 10, 10]);
        let b = BoundingBox::from([5, 0, 10, 10]);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn detection_serializes_bbox_as_array() {
        let detection = Detection {
            name: "person".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::from([256, 192, 128, 96]),
            class_id: 0,
        };
        let json = serde_json::to_string(&detection).expect("serialize");
        assert_eq!(
            json,
            r#"{"name":"person","confidence":0.9,"bbox":[256,192,128,96]}"#
        );
    }
}
