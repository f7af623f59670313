use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use tiny_skia::{
    FillRule, GradientStop, LineCap, LineJoin, LinearGradient, Paint, Path, PathBuilder,
    PixmapMut, Point, RadialGradient, Rect, Shader, SpreadMode, Stroke, Transform,
};

use crate::{config::MAX_DEVICE_PIXEL_RATIO, AuraluxError, Result};

/// Straight-alpha colour with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// How a drawn colour combines with what is already on the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Ordinary alpha compositing.
    #[default]
    SourceOver,
    /// Additive: overlapping strokes brighten instead of occluding.
    Lighter,
}

/// Opaque RGBA drawing surface.
///
/// Drawing calls take CSS-pixel coordinates; the backing store is sized in
/// device pixels (CSS size times the device pixel ratio, capped at 2x).
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
    css_width: f32,
    css_height: f32,
    scale: f32,
}

impl Canvas {
    /// Black surface of the given CSS size.
    pub fn new(css_width: f32, css_height: f32, device_pixel_ratio: f32) -> Self {
        let mut canvas = Self {
            image: RgbaImage::new(0, 0),
            css_width: 0.0,
            css_height: 0.0,
            scale: 1.0,
        };
        canvas.resize(css_width, css_height, device_pixel_ratio);
        canvas
    }

    /// Reallocates the backing store. Contents are reset to black.
    pub fn resize(&mut self, css_width: f32, css_height: f32, device_pixel_ratio: f32) {
        let scale = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio.min(MAX_DEVICE_PIXEL_RATIO)
        } else {
            1.0
        };
        let css_width = if css_width.is_finite() { css_width.max(0.0) } else { 0.0 };
        let css_height = if css_height.is_finite() { css_height.max(0.0) } else { 0.0 };

        self.css_width = css_width;
        self.css_height = css_height;
        self.scale = scale;
        self.image = RgbaImage::from_pixel(
            (css_width * scale).floor() as u32,
            (css_height * scale).floor() as u32,
            Rgba([0, 0, 0, 255]),
        );
    }

    pub fn css_width(&self) -> f32 {
        self.css_width
    }

    pub fn css_height(&self) -> f32 {
        self.css_height
    }

    /// Device pixels per CSS pixel.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pixel_width(&self) -> u32 {
        self.image.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA bytes, row-major, device pixels.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// RGBA of one device pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|pixel| pixel.0)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Encodes the current contents as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        self.image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| AuraluxError::msg(format!("failed to encode png: {err}")))?;
        Ok(bytes.into_inner())
    }

    /// Paints the whole surface with an opaque colour.
    pub fn fill(&mut self, color: Color) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([color.r, color.g, color.b, 255]);
        }
    }

    /// Fills a rectangle with a vertical gradient, `top` at `y`.
    pub fn fill_rect_gradient(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        top: Color,
        bottom: Color,
    ) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let Some(rect) = Rect::from_xywh(x, y, width, height) else {
            return;
        };
        let Some(shader) = LinearGradient::new(
            Point::from_xy(x, y),
            Point::from_xy(x, y + height),
            vec![
                GradientStop::new(0.0, top.into()),
                GradientStop::new(1.0, bottom.into()),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        ) else {
            return;
        };
        let paint = paint(shader, BlendMode::SourceOver);
        let transform = self.transform();
        if let Some(mut surface) = self.surface() {
            surface.fill_rect(rect, &paint, transform, None);
        }
    }

    /// Straight segment with round caps.
    pub fn stroke_line(
        &mut self,
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        color: Color,
        blend: BlendMode,
    ) {
        self.stroke_polyline(&[from, to], width, color, blend);
    }

    /// Open path through `points`, drawn as one stroke.
    pub fn stroke_polyline(
        &mut self,
        points: &[(f32, f32)],
        width: f32,
        color: Color,
        blend: BlendMode,
    ) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let mut builder = PathBuilder::new();
        builder.move_to(first.0, first.1);
        for point in rest {
            builder.line_to(point.0, point.1);
        }
        if let Some(path) = builder.finish() {
            self.stroke(&path, width, color, blend);
        }
    }

    /// Solid disc.
    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color, blend: BlendMode) {
        if radius <= 0.0 {
            return;
        }
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        let paint = paint(Shader::SolidColor(color.into()), blend);
        let transform = self.transform();
        if let Some(mut surface) = self.surface() {
            surface.fill_path(&path, &paint, FillRule::Winding, transform, None);
        }
    }

    /// Disc whose colour fades from `inner` at the centre to `outer` at `radius`.
    pub fn fill_radial(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        inner: Color,
        outer: Color,
        blend: BlendMode,
    ) {
        if radius <= 0.0 {
            return;
        }
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        let centre = Point::from_xy(cx, cy);
        let Some(shader) = RadialGradient::new(
            centre,
            centre,
            radius,
            vec![
                GradientStop::new(0.0, inner.into()),
                GradientStop::new(1.0, outer.into()),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        ) else {
            return;
        };
        let paint = paint(shader, blend);
        let transform = self.transform();
        if let Some(mut surface) = self.surface() {
            surface.fill_path(&path, &paint, FillRule::Winding, transform, None);
        }
    }

    /// Circle outline of the given stroke width.
    pub fn stroke_circle(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        width: f32,
        color: Color,
        blend: BlendMode,
    ) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.stroke(&path, width, color, blend);
        }
    }

    fn stroke(&mut self, path: &Path, width: f32, color: Color, blend: BlendMode) {
        if !(width.is_finite() && width > 0.0) {
            return;
        }
        let paint = paint(Shader::SolidColor(color.into()), blend);
        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let transform = self.transform();
        if let Some(mut surface) = self.surface() {
            surface.stroke_path(path, &paint, &stroke, transform, None);
        }
    }

    /// CSS pixels to device pixels.
    fn transform(&self) -> Transform {
        Transform::from_scale(self.scale, self.scale)
    }

    /// Borrows the backing store as a raster target. The surface is kept
    /// opaque, so premultiplied and straight RGBA coincide. `None` for an
    /// empty surface.
    fn surface(&mut self) -> Option<PixmapMut<'_>> {
        let (width, height) = self.image.dimensions();
        PixmapMut::from_bytes(&mut self.image, width, height)
    }
}

fn paint(shader: Shader<'_>, blend: BlendMode) -> Paint<'_> {
    Paint {
        shader,
        blend_mode: blend.into(),
        anti_alias: true,
        ..Paint::default()
    }
}

impl From<Color> for tiny_skia::Color {
    fn from(color: Color) -> Self {
        let alpha = (color.a.clamp(0.0, 1.0) * 255.0).round() as u8;
        tiny_skia::Color::from_rgba8(color.r, color.g, color.b, alpha)
    }
}

impl From<BlendMode> for tiny_skia::BlendMode {
    fn from(mode: BlendMode) -> Self {
        match mode {
            BlendMode::SourceOver => tiny_skia::BlendMode::SourceOver,
            BlendMode::Lighter => tiny_skia::BlendMode::Plus,
        }
    }
}
