use std::f32::consts::TAU;

use super::{palette, BlendMode, Canvas};
use crate::SpectrumFrame;

/// Base radius as a share of the surface's shorter side.
pub const BASE_RADIUS_FRACTION: f32 = 0.28;
/// Outward reach of a full-scale sample, in CSS pixels.
pub const EXTENT_SCALE: f32 = 160.0;
/// Inner reference circle as a share of the base radius.
pub const INNER_FRACTION: f32 = 0.6;

pub fn base_radius(width: f32, height: f32) -> f32 {
    width.min(height) * BASE_RADIUS_FRACTION
}

/// How far past the base radius the segment for one sample reaches.
pub fn segment_extent(value: u8, sensitivity: f32) -> f32 {
    (value as f32 / 255.0 * sensitivity).max(0.0) * EXTENT_SCALE
}

/// Radial segments around the centre, one per bin. Returns the segment count.
pub fn draw(canvas: &mut Canvas, frame: &SpectrumFrame, sensitivity: f32) -> usize {
    let count = frame.len();
    if count == 0 {
        return 0;
    }

    let cx = canvas.css_width() * 0.5;
    let cy = canvas.css_height() * 0.5;
    let radius = base_radius(canvas.css_width(), canvas.css_height());

    for (index, value) in frame.bins().iter().enumerate() {
        let level = frame.level(index, sensitivity).max(0.0);
        let angle = index as f32 / count as f32 * TAU;
        let (sin, cos) = angle.sin_cos();
        let reach = radius + segment_extent(*value, sensitivity);

        canvas.stroke_line(
            (cx + cos * radius, cy + sin * radius),
            (cx + cos * reach, cy + sin * reach),
            2.0 + level * 3.0,
            palette::ACCENT.with_alpha(0.12 + level * 0.6),
            BlendMode::SourceOver,
        );
    }

    canvas.stroke_circle(
        cx,
        cy,
        radius,
        2.0,
        palette::ACCENT.with_alpha(0.15),
        BlendMode::Lighter,
    );
    canvas.stroke_circle(
        cx,
        cy,
        radius * INNER_FRACTION,
        1.5,
        palette::WHITE.with_alpha(0.1),
        BlendMode::Lighter,
    );
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_is_monotonic() {
        for sensitivity in [0.0, 0.7, 1.0, 2.0] {
            let mut previous = 0.0;
            for value in 0..=255u8 {
                let extent = segment_extent(value, sensitivity);
                assert!(extent >= previous);
                previous = extent;
            }
        }
    }

    #[test]
    fn zero_sensitivity_stays_on_base_radius() {
        assert_eq!(segment_extent(255, 0.0), 0.0);
        assert!((base_radius(800.0, 600.0) - 168.0).abs() < 1e-4);
    }

    #[test]
    fn draws_one_segment_per_bin() {
        let mut canvas = Canvas::new(100.0, 100.0, 1.0);
        let frame = SpectrumFrame::from_bins(vec![128; 32]);
        assert_eq!(draw(&mut canvas, &frame, 1.0), 32);
    }
}
