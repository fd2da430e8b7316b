#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::Scorer;
use crate::detect::result::{OutputLayer, ScorerOutput, ROW_PREFIX_LEN};
use crate::frame::Frame;

/// Tract-based scorer for YOLO-style ONNX models.
///
/// The frame is resized to a square `input_size` input and scaled by 1/255.
/// Every model output is read as rows of
/// `[cx, cy, w, h, objectness, class scores...]` normalized to the input.
pub struct TractScorer {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractScorer {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let resized = imageops::resize(
            frame.rgb(),
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode_outputs(outputs: TVec<TValue>) -> Result<ScorerOutput> {
        let mut layers = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.iter().enumerate() {
            let row_len = *output
                .shape()
                .last()
                .ok_or_else(|| anyhow!("model output {} is a scalar", index))?;
            if row_len <= ROW_PREFIX_LEN {
                return Err(anyhow!(
                    "model output {} has rows of {} values; expected box, objectness and class scores",
                    index,
                    row_len
                ));
            }
            let flat = output
                .as_slice::<f32>()
                .with_context(|| format!("model output {} was not f32", index))?;
            layers.push(OutputLayer::from_rows(flat, row_len));
        }
        Ok(ScorerOutput { layers })
    }
}

impl Scorer for TractScorer {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn score(&mut self, frame: &Frame) -> Result<ScorerOutput> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        Self::decode_outputs(outputs)
    }
}
