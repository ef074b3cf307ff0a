//! Pinhole-camera distance estimates.
//!
//! distance = known real width * focal length / observed pixel width

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Approximate focal length of a 640x480 webcam, in pixels.
pub const DEFAULT_FOCAL_LENGTH_PX: f32 = 615.0;

/// Real-world widths (meters) of the classes that get announced.
pub const DEFAULT_KNOWN_WIDTHS: &[(&str, f32)] = &[
    ("chair", 0.5),
    ("dog", 0.6),
    ("cat", 0.3),
    ("potted plant", 0.4),
    ("cell phone", 0.08),
    ("person", 0.5),
];

/// Result of a distance estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DistanceEstimate {
    Meters(f32),
    /// Pixel width was zero or negative.
    Invalid,
}

impl DistanceEstimate {
    pub fn is_valid(&self) -> bool {
        matches!(self, DistanceEstimate::Meters(_))
    }

    pub fn meters(&self) -> Option<f32> {
        match self {
            DistanceEstimate::Meters(m) => Some(*m),
            DistanceEstimate::Invalid => None,
        }
    }
}

impl fmt::Display for DistanceEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceEstimate::Meters(m) => write!(f, "{:.2} m", m),
            DistanceEstimate::Invalid => f.write_str("invalid"),
        }
    }
}

/// Estimate the distance to an object of `known_width` meters that spans
/// `pixel_width` pixels through a lens of `focal_length` pixels.
pub fn estimate_distance(
    known_width: f32,
    focal_length: f32,
    pixel_width: f32,
) -> DistanceEstimate {
    if pixel_width > 0.0 {
        DistanceEstimate::Meters(known_width * focal_length / pixel_width)
    } else {
        DistanceEstimate::Invalid
    }
}

/// Mapping from class label to real-world width in meters.
#[derive(Clone, Debug, PartialEq)]
pub struct KnownWidthTable {
    widths: BTreeMap<String, f32>,
}

impl KnownWidthTable {
    /// Build a table, rejecting non-positive or non-finite widths.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut widths = BTreeMap::new();
        for (label, width) in entries {
            let label = label.into();
            validate_width(&label, width)?;
            widths.insert(label, width);
        }
        Ok(Self { widths })
    }

    /// Replace or add entries on top of the current table.
    pub fn with_overrides<I, S>(mut self, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        for (label, width) in entries {
            let label = label.into();
            validate_width(&label, width)?;
            self.widths.insert(label, width);
        }
        Ok(self)
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.widths.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.widths.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.widths.keys().map(String::as_str)
    }

    /// Estimate distance for `label`; `None` when the class is not in the table.
    pub fn estimate(
        &self,
        label: &str,
        focal_length: f32,
        pixel_width: f32,
    ) -> Option<DistanceEstimate> {
        self.get(label)
            .map(|width| estimate_distance(width, focal_length, pixel_width))
    }
}

impl Default for KnownWidthTable {
    fn default() -> Self {
        Self {
            widths: DEFAULT_KNOWN_WIDTHS
                .iter()
                .map(|(label, width)| (label.to_string(), *width))
                .collect(),
        }
    }
}

fn validate_width(label: &str, width: f32) -> Result<()> {
    if label.trim().is_empty() {
        return Err(anyhow!("known width entry has an empty label"));
    }
    if !width.is_finite() || width <= 0.0 {
        return Err(anyhow!(
            "known width for '{}' must be a positive number of meters, got {}",
            label,
            width
        ));
    }
    Ok(())
}
