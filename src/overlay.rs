//! Box and label drawing onto captured frames.
//!
//! Text uses a built-in 5x7 bitmap font; characters outside it advance the
//! cursor without drawing.

use image::Rgb;

use crate::detect::BoundingBox;
use crate::frame::ImageViewMut;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;

/// Gap between the top of a box and the baseline of its label.
const LABEL_OFFSET: i32 = 10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub color: Rgb<u8>,
    pub thickness: u32,
    /// Integer pixel scale applied to the 5x7 font.
    pub text_scale: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: Rgb([0, 255, 0]),
            thickness: 2,
            text_scale: 2,
        }
    }
}

/// Overlay text for one announced detection.
pub fn label_text(label: &str, confidence: f32, meters: f32) -> String {
    format!("{}: {:.2}, Distance: {:.2} m", label, confidence, meters)
}

/// Draw a rectangle and its label above it.
pub fn draw_detection(
    image: &mut ImageViewMut<'_>,
    bbox: &BoundingBox,
    text: &str,
    style: &OverlayStyle,
) {
    let left = bbox.x1.round() as i32;
    let top = bbox.y1.round() as i32;
    let right = bbox.x2.round() as i32;
    let bottom = bbox.y2.round() as i32;
    draw_rectangle(image, left, top, right, bottom, style.color, style.thickness);

    let scale = style.text_scale.max(1) as i32;
    let text_top = (top - LABEL_OFFSET - GLYPH_HEIGHT * scale).max(0);
    draw_label(image, left.max(0), text_top, text, style.color, scale);
}

fn draw_rectangle(
    image: &mut ImageViewMut<'_>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
    thickness: u32,
) {
    let (left, right) = (left.min(right), left.max(right));
    let (top, bottom) = (top.min(bottom), top.max(bottom));
    for t in 0..thickness.max(1) as i32 {
        for x in left..=right {
            put(image, x, top + t, color);
            put(image, x, bottom - t, color);
        }
        for y in top..=bottom {
            put(image, left + t, y, color);
            put(image, right - t, y, color);
        }
    }
}

fn draw_label(
    image: &mut ImageViewMut<'_>,
    mut x: i32,
    y: i32,
    text: &str,
    color: Rgb<u8>,
    scale: i32,
) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            put(
                                image,
                                x + col * scale + dx,
                                y + row as i32 * scale + dy,
                                color,
                            );
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * scale;
    }
}

fn put(image: &mut ImageViewMut<'_>, x: i32, y: i32, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
        return;
    }
    image.put_pixel(x as u32, y as u32, color);
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let glyph = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b00100, 0b01000],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        _ => return None,
    };
    Some(glyph)
}
