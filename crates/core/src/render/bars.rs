use super::{palette, BlendMode, Canvas};
use crate::SpectrumFrame;

/// Share of the surface height a full-scale bar reaches.
pub const HEIGHT_FRACTION: f32 = 0.9;
/// Bars never shrink below this many CSS pixels.
pub const MIN_BAR_HEIGHT: f32 = 2.0;

const FILL_RATIO: f32 = 0.85;
const OUTLINE_WIDTH: f32 = 2.5;

/// Height of the bar for one spectrum sample.
pub fn bar_height(value: u8, sensitivity: f32, canvas_height: f32) -> f32 {
    let level = (value as f32 / 255.0 * sensitivity).clamp(0.0, 1.0);
    (level * HEIGHT_FRACTION * canvas_height).max(MIN_BAR_HEIGHT)
}

/// One equal-width column per bin, plus an additive outline across the tops.
/// Returns the number of bars drawn.
pub fn draw(canvas: &mut Canvas, frame: &SpectrumFrame, sensitivity: f32) -> usize {
    let count = frame.len();
    if count == 0 {
        return 0;
    }

    let width = canvas.css_width();
    let height = canvas.css_height();
    let column = width / count as f32;
    let mut outline = Vec::with_capacity(count);

    for (index, value) in frame.bins().iter().enumerate() {
        let level = frame.level(index, sensitivity).clamp(0.0, 1.0);
        let bar = bar_height(*value, sensitivity, height);
        let x = index as f32 * column;

        canvas.fill_rect_gradient(
            x,
            height - bar,
            column * FILL_RATIO,
            bar,
            palette::HIGHLIGHT.with_alpha(0.3 + level * 0.7),
            palette::ACCENT.with_alpha(0.08 + level * 0.3),
        );
        outline.push((
            x + column * 0.5,
            height - level * HEIGHT_FRACTION * height,
        ));
    }

    canvas.stroke_polyline(
        &outline,
        OUTLINE_WIDTH,
        palette::ACCENT.with_alpha(0.4),
        BlendMode::Lighter,
    );
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_monotonic_and_floored() {
        for sensitivity in [0.0, 0.5, 1.0, 1.5, 2.0] {
            let mut previous = 0.0;
            for value in 0..=255u8 {
                let height = bar_height(value, sensitivity, 400.0);
                assert!(height >= previous);
                assert!(height >= MIN_BAR_HEIGHT);
                assert!(height <= 400.0 * HEIGHT_FRACTION);
                previous = height;
            }
        }
    }

    #[test]
    fn zero_sensitivity_draws_the_floor() {
        assert_eq!(bar_height(255, 0.0, 400.0), MIN_BAR_HEIGHT);
        assert_eq!(bar_height(0, 2.0, 400.0), MIN_BAR_HEIGHT);
    }

    #[test]
    fn full_scale_reaches_ninety_percent() {
        assert!((bar_height(255, 1.0, 100.0) - 90.0).abs() < 1e-4);
        assert!((bar_height(200, 2.0, 100.0) - 90.0).abs() < 1e-4);
    }

    #[test]
    fn draws_one_bar_per_bin() {
        let mut canvas = Canvas::new(64.0, 32.0, 1.0);
        let frame = SpectrumFrame::from_bins(vec![255; 16]);
        assert_eq!(draw(&mut canvas, &frame, 1.0), 16);
        assert_eq!(draw(&mut canvas, &SpectrumFrame::default(), 1.0), 0);
    }
}
