use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// COCO class labels in model class-id order.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorbike", "aeroplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "sofa",
    "pottedplant", "bed", "diningtable", "toilet", "tvmonitor", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Fixed class-id → label table supplied alongside the model.
#[derive(Clone, Debug)]
pub struct ClassVocabulary {
    labels: Vec<String>,
}

impl ClassVocabulary {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn coco() -> Self {
        Self::new(COCO_LABELS.iter().map(|label| label.to_string()).collect())
    }

    /// Parse a names file: one label per line, trailing blank lines ignored.
    pub fn parse(contents: &str) -> Result<Self> {
        let labels: Vec<String> = contents
            .trim_end_matches(['\n', '\r'])
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        if labels.is_empty() || labels.iter().all(|l| l.is_empty()) {
            return Err(anyhow!("class names file is empty"));
        }
        Ok(Self::new(labels))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read class names {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid class names {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for `class_id`, or `class<N>` when the model emits an id past the table.
    pub fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{class_id}"))
    }
}

impl Default for ClassVocabulary {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_starts_with_person() {
        let vocab = ClassVocabulary::coco();
        assert_eq!(vocab.len(), 80);
        assert_eq!(vocab.label(0), "person");
        assert_eq!(vocab.label(2), "car");
        assert_eq!(vocab.label(14), "bird");
        assert_eq!(vocab.label(15), "cat");
    }

    #[test]
    fn parse_names_file_ignores_trailing_newline() {
        let vocab = ClassVocabulary::parse("person\nbicycle\r\ncar\n").expect("parse");
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.label(1), "bicycle");
        assert_eq!(vocab.label(2), "car");
    }

    #[test]
    fn unknown_class_id_gets_placeholder_label() {
        let vocab = ClassVocabulary::parse("person\n").expect("parse");
        assert_eq!(vocab.label(7), "class7");
    }

    #[test]
    fn empty_names_file_is_rejected() {
        assert!(ClassVocabulary::parse("\n\n").is_err());
    }
}
