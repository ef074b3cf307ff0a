/// Axis-aligned box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box from a YOLO-style center/size description.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    /// Horizontal extent; negative when the corners are swapped.
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Scale both axes independently, e.g. from detector input back to capture size.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}

/// A single detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub label: String,
    /// Confidence in 0..1.
    pub confidence: f32,
}

impl Detection {
    pub fn new(
        bbox: BoundingBox,
        class_id: usize,
        label: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            bbox,
            class_id,
            label: label.into(),
            confidence,
        }
    }

    /// Detection labelled from the COCO class table.
    pub fn coco(bbox: BoundingBox, class_id: usize, confidence: f32) -> Self {
        let label = crate::detect::labels::coco_label(class_id);
        Self::new(bbox, class_id, label, confidence)
    }
}
