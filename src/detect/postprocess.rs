//! YOLOv8 output decoding.
//!
//! A YOLOv8 ONNX export produces one tensor shaped `[1, 4 + classes, anchors]`
//! (some exports transpose it to `[1, anchors, 4 + classes]`). Each anchor
//! carries `cx, cy, w, h` in input pixels followed by one score per class.

use anyhow::{anyhow, Result};
use std::cmp::Ordering;

use crate::detect::result::{BoundingBox, Detection};

/// Thresholds applied while decoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloParams {
    /// Candidates must score strictly above this.
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Number of class scores per anchor (80 for COCO).
    pub num_classes: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.7,
            max_detections: 300,
            num_classes: 80,
        }
    }
}

/// Decode a raw YOLOv8 output tensor into labelled detections.
pub fn decode_yolov8(data: &[f32], shape: &[usize], params: &YoloParams) -> Result<Vec<Detection>> {
    let (rows, cols) = match shape {
        [1, a, b] => (*a, *b),
        [a, b] => (*a, *b),
        other => return Err(anyhow!("unexpected YOLOv8 output shape {:?}", other)),
    };
    let expected = rows
        .checked_mul(cols)
        .ok_or_else(|| anyhow!("YOLOv8 output shape overflows"))?;
    if data.len() != expected {
        return Err(anyhow!(
            "YOLOv8 output holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            expected
        ));
    }

    // Prefer the axis matching the class count; otherwise attributes are the
    // smaller axis (84 vs 8400 for COCO).
    let attrs_expected = params.num_classes + 4;
    let channels_first = match (rows == attrs_expected, cols == attrs_expected) {
        (true, false) => true,
        (false, true) => false,
        _ => rows <= cols,
    };
    let (attrs, anchors) = if channels_first { (rows, cols) } else { (cols, rows) };
    if attrs < 5 {
        return Err(anyhow!(
            "YOLOv8 output needs at least 5 attributes per anchor, got {}",
            attrs
        ));
    }
    let value = |anchor: usize, attr: usize| -> f32 {
        if channels_first {
            data[attr * anchors + anchor]
        } else {
            data[anchor * attrs + attr]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..attrs - 4 {
            let score = value(anchor, 4 + class);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score <= params.confidence_threshold {
            continue;
        }
        let bbox = BoundingBox::from_center(
            value(anchor, 0),
            value(anchor, 1),
            value(anchor, 2),
            value(anchor, 3),
        );
        candidates.push(Detection::coco(bbox, best_class, best_score));
    }

    Ok(non_max_suppression(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

/// Per-class greedy NMS, highest confidence first.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a channels-first `[1, 4 + classes, anchors]` tensor.
    fn tensor(classes: usize, anchors: &[([f32; 4], usize, f32)]) -> (Vec<f32>, Vec<usize>) {
        let attrs = 4 + classes;
        let n = anchors.len();
        let mut data = vec![0.0f32; attrs * n];
        for (i, (b, class, score)) in anchors.iter().enumerate() {
            for (a, v) in b.iter().enumerate() {
                data[a * n + i] = *v;
            }
            data[(4 + class) * n + i] = *score;
        }
        (data, vec![1, attrs, n])
    }

    #[test]
    fn drops_candidates_below_threshold() -> Result<()> {
        let (data, shape) = tensor(
            80,
            &[
                ([100.0, 100.0, 50.0, 80.0], 0, 0.9),
                ([300.0, 300.0, 40.0, 40.0], 56, 0.49),
            ],
        );
        let dets = decode_yolov8(&data, &shape, &YoloParams::default())?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "person");
        assert_eq!(dets[0].bbox, BoundingBox::new(75.0, 60.0, 125.0, 140.0));
        Ok(())
    }

    #[test]
    fn score_equal_to_threshold_is_dropped() -> Result<()> {
        let (data, shape) = tensor(
            80,
            &[
                ([100.0, 100.0, 50.0, 80.0], 0, 0.5),
                ([300.0, 300.0, 40.0, 40.0], 56, 0.51),
            ],
        );
        let dets = decode_yolov8(&data, &shape, &YoloParams::default())?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "chair");
        Ok(())
    }

    #[test]
    fn nms_suppresses_same_class_overlap_only() -> Result<()> {
        let (data, shape) = tensor(
            80,
            &[
                ([100.0, 100.0, 50.0, 50.0], 16, 0.8),
                ([102.0, 101.0, 50.0, 50.0], 16, 0.7),
                ([101.0, 100.0, 50.0, 50.0], 15, 0.6),
            ],
        );
        let dets = decode_yolov8(&data, &shape, &YoloParams::default())?;
        let labels: Vec<&str> = dets.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["dog", "cat"]);
        assert!((dets[0].confidence - 0.8).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn accepts_transposed_layout() -> Result<()> {
        // Eight anchors of seven attributes (three classes), anchors-first.
        let attrs = 7;
        let mut data = vec![0.0f32; 8 * attrs];
        data[..attrs].copy_from_slice(&[10.0, 10.0, 4.0, 4.0, 0.1, 0.95, 0.0]);
        data[attrs..2 * attrs].copy_from_slice(&[50.0, 50.0, 8.0, 8.0, 0.2, 0.1, 0.3]);
        let shape = vec![1, 8, attrs];
        let params = YoloParams {
            num_classes: 3,
            ..YoloParams::default()
        };
        let dets = decode_yolov8(&data, &shape, &params)?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[0].label, "bicycle");
        assert_eq!(dets[0].bbox, BoundingBox::new(8.0, 8.0, 12.0, 12.0));
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shape() {
        assert!(decode_yolov8(&[0.0; 10], &[1, 84, 8400], &YoloParams::default()).is_err());
        assert!(decode_yolov8(&[0.0; 8], &[1, 2, 2, 2], &YoloParams::default()).is_err());
    }

    #[test]
    fn nms_respects_max_detections() {
        let dets = (0..5)
            .map(|i| {
                let x = i as f32 * 100.0;
                Detection::coco(BoundingBox::new(x, 0.0, x + 10.0, 10.0), 0, 0.9)
            })
            .collect();
        assert_eq!(non_max_suppression(dets, 0.7, 3).len(), 3);
    }
}
