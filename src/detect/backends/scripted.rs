use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Backend that replays a fixed detection script, one entry per call.
///
/// The script wraps around, so a single-entry script returns the same
/// detections for every frame. Pixels are ignored.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
    input_size: (u32, u32),
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>, input_size: (u32, u32)) -> Self {
        Self {
            script,
            cursor: 0,
            input_size,
        }
    }

    /// A person and a chair in front of the camera, plus an unannounced car.
    pub fn demo(input_size: (u32, u32)) -> Self {
        let (w, h) = (input_size.0 as f32, input_size.1 as f32);
        let frame = vec![
            Detection::coco(
                BoundingBox::new(0.30 * w, 0.20 * h, 0.50 * w, 0.95 * h),
                0,
                0.91,
            ),
            Detection::coco(
                BoundingBox::new(0.60 * w, 0.55 * h, 0.80 * w, 0.90 * h),
                56,
                0.74,
            ),
            Detection::coco(
                BoundingBox::new(0.05 * w, 0.40 * h, 0.25 * w, 0.60 * h),
                2,
                0.66,
            ),
        ];
        Self::new(vec![frame, Vec::new()], input_size)
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let detections = self.script[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.script.len();
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 1).unwrap()
    }

    #[test]
    fn script_wraps_around() {
        let person = Detection::coco(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, 0.9);
        let mut backend = ScriptedBackend::new(vec![vec![person], vec![]], (4, 4));

        assert_eq!(backend.detect(&blank()).unwrap().len(), 1);
        assert!(backend.detect(&blank()).unwrap().is_empty());
        assert_eq!(backend.detect(&blank()).unwrap().len(), 1);
    }

    #[test]
    fn empty_script_detects_nothing() {
        let mut backend = ScriptedBackend::new(Vec::new(), (4, 4));
        assert!(backend.detect(&blank()).unwrap().is_empty());
    }

    #[test]
    fn demo_script_scales_to_input() {
        let mut backend = ScriptedBackend::demo((640, 640));
        let dets = backend.detect(&blank()).unwrap();
        assert_eq!(dets[0].label, "person");
        assert_eq!(dets[1].label, "chair");
        assert!((dets[0].bbox.width() - 128.0).abs() < 1e-3);
    }
}
