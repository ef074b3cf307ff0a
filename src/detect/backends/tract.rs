#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{decode_yolov8, YoloParams};
use crate::detect::result::Detection;
use crate::frame::Frame;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Loads a local model file once and runs it on RGB frames of the model's
/// input size.
pub struct TractBackend {
    model: OnnxPlan,
    width: u32,
    height: u32,
    params: YoloParams,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{})",
            model_path.display(),
            width,
            height
        );

        Ok(Self {
            model,
            width,
            height,
            params: YoloParams::default(),
        })
    }

    /// Override the decoding thresholds.
    pub fn with_params(mut self, params: YoloParams) -> Self {
        self.params = params;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }

        let pixels = frame.pixels();
        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();
        decode_yolov8(&data, &shape, &self.params)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::new(
            vec![0u8; crate::frame::rgb_len(self.width, self.height)?],
            self.width,
            self.height,
            0,
        )?;
        self.detect(&blank).map(|_| ())
    }
}
