//! Render Engine: a cooperative frame loop that samples the spectrum every
//! frame and dispatches to one of three drawing algorithms.

mod bars;
mod canvas;
mod particles;
mod ring;

pub use canvas::{BlendMode, Canvas, Color};
pub use particles::{ParticleField, ParticleStats, TARGET_POPULATION};

use crate::{
    config::{Theme, VisualConfig, VisualMode},
    timeline::{FrameLoop, FrameRequest},
    SpectrumFrame,
};

/// Shared visual palette; every mode draws in these hues.
pub mod palette {
    use super::Color;

    pub const ACCENT: Color = Color::rgb(10, 132, 255);
    pub const HIGHLIGHT: Color = Color::rgb(100, 200, 255);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
}

/// Upper bound of the sensitivity scalar.
pub const MAX_SENSITIVITY: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Idle,
    Running,
}

/// What one frame put on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameStats {
    /// No spectrum was available; only the background was painted.
    Cleared,
    Bars { bars: usize },
    Ring { segments: usize },
    Particles(ParticleStats),
}

#[derive(Debug)]
pub struct RenderEngine {
    canvas: Canvas,
    mode: VisualMode,
    sensitivity: f32,
    theme: Theme,
    particles: ParticleField,
    frame_loop: FrameLoop,
    state: RenderState,
}

impl RenderEngine {
    /// Idle engine with the surface painted in the theme background.
    pub fn new(config: &VisualConfig, theme: Theme) -> Self {
        Self::with_particles(config, theme, ParticleField::new())
    }

    /// Engine whose particle field is seeded, for reproducible output.
    pub fn with_particle_seed(config: &VisualConfig, theme: Theme, seed: u64) -> Self {
        Self::with_particles(config, theme, ParticleField::with_seed(seed))
    }

    fn with_particles(config: &VisualConfig, theme: Theme, particles: ParticleField) -> Self {
        let mut canvas = Canvas::new(config.width, config.height, config.device_pixel_ratio);
        canvas.fill(theme.background());
        Self {
            canvas,
            mode: config.mode,
            sensitivity: config.sensitivity.clamp(0.0, MAX_SENSITIVITY),
            theme,
            particles,
            frame_loop: FrameLoop::new(),
            state: RenderState::Idle,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RenderState::Running
    }

    /// Idle → Running. Schedules the first frame; a second call while running
    /// does not schedule another one.
    pub fn start(&mut self) {
        if self.state == RenderState::Idle {
            tracing::debug!(mode = %self.mode, "render loop started");
        }
        self.state = RenderState::Running;
        self.frame_loop.request();
    }

    /// Running → Idle. Cancels the pending frame before returning and paints
    /// the empty background.
    pub fn stop(&mut self) {
        if let Some(request) = self.frame_loop.cancel() {
            tracing::debug!(request = request.id(), "render loop cancelled");
        }
        self.state = RenderState::Idle;
        self.canvas.fill(self.theme.background());
    }

    /// Claims the pending frame, if any. The caller must follow up with
    /// [`RenderEngine::render_frame`], which schedules the next one.
    pub fn frame_due(&mut self) -> Option<FrameRequest> {
        if self.state != RenderState::Running {
            return None;
        }
        self.frame_loop.take_due()
    }

    /// Frames drawn since construction.
    pub fn frames_rendered(&self) -> u64 {
        self.frame_loop.frames_run()
    }

    /// Draws one frame and, while running, schedules the next.
    pub fn render_frame(&mut self, frame: Option<&SpectrumFrame>) -> FrameStats {
        let stats = self.draw(frame);
        if self.state == RenderState::Running {
            self.frame_loop.request();
        }
        stats
    }

    /// Draws without touching the loop; used for one-off renders.
    pub fn draw(&mut self, frame: Option<&SpectrumFrame>) -> FrameStats {
        self.canvas.fill(self.theme.background());
        let Some(frame) = frame else {
            return FrameStats::Cleared;
        };

        let sensitivity = self.sensitivity;
        match self.mode {
            VisualMode::Bars => FrameStats::Bars {
                bars: bars::draw(&mut self.canvas, frame, sensitivity),
            },
            VisualMode::Ring => FrameStats::Ring {
                segments: ring::draw(&mut self.canvas, frame, sensitivity),
            },
            VisualMode::Particles => {
                FrameStats::Particles(self.particles.draw(&mut self.canvas, frame, sensitivity))
            }
        }
    }

    pub fn mode(&self) -> VisualMode {
        self.mode
    }

    /// Switches the visual mode from the next frame on.
    pub fn set_mode(&mut self, mode: VisualMode) {
        if mode != self.mode {
            tracing::debug!(from = %self.mode, to = %mode, "visual mode changed");
        }
        self.mode = mode;
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Clamped to `[0, MAX_SENSITIVITY]`; non-finite values are ignored.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        if sensitivity.is_finite() {
            self.sensitivity = sensitivity.clamp(0.0, MAX_SENSITIVITY);
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Changes the palette. An idle surface is repainted straight away.
    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        if !self.is_running() {
            self.canvas.fill(theme.background());
        }
    }

    /// Resizes the surface and clears it to the background.
    pub fn resize(&mut self, css_width: f32, css_height: f32, device_pixel_ratio: f32) {
        self.canvas
            .resize(css_width, css_height, device_pixel_ratio);
        self.canvas.fill(self.theme.background());
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}
