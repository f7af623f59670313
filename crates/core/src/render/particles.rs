use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{palette, BlendMode, Canvas};
use crate::SpectrumFrame;

/// Population the field grows towards and never exceeds.
pub const TARGET_POPULATION: usize = 200;
/// Particles added per frame while below target.
pub const SPAWN_BATCH: usize = 10;
/// Distance outside the surface a particle may drift before it respawns.
pub const BOUNDS_MARGIN: f32 = 50.0;
/// Squared link distance (120 px).
pub const LINK_DISTANCE_SQ: f32 = 14_400.0;
/// Each particle is only compared with this many successors.
pub const LINK_LOOKAHEAD: usize = 9;

const INITIAL_SPEED: f32 = 0.6;
const JITTER: f32 = 0.1;
const LINK_WIDTH: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Core radius of every particle for a given average energy.
pub fn particle_radius(average_energy: f32) -> f32 {
    1.5 + average_energy.max(0.0) * 5.0
}

/// Per-frame outcome of the particle renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParticleStats {
    pub population: usize,
    pub links: usize,
    pub average_energy: f32,
}

/// Persistent particle population driven by average spectral energy.
#[derive(Debug, Clone)]
pub struct ParticleField {
    particles: Vec<Particle>,
    rng: StdRng,
}

impl Default for ParticleField {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleField {
    /// Empty field with an entropy-seeded generator.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic field for reproducible renders.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            particles: Vec::with_capacity(TARGET_POPULATION),
            rng,
        }
    }

    /// Live particle count.
    pub fn population(&self) -> usize {
        self.particles.len()
    }

    pub(crate) fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Spawns towards the target, jitters and integrates every particle, and
    /// respawns the ones that left the extended bounds.
    pub fn step(&mut self, width: f32, height: f32, average_energy: f32) {
        let missing = TARGET_POPULATION.saturating_sub(self.particles.len());
        for _ in 0..missing.min(SPAWN_BATCH) {
            let particle = self.spawn(width, height);
            self.particles.push(particle);
        }

        let speed = 1.0 + average_energy.max(0.0) * 2.0;
        for index in 0..self.particles.len() {
            let jitter_x = self.rng.gen_range(-JITTER..JITTER);
            let jitter_y = self.rng.gen_range(-JITTER..JITTER);
            let particle = &mut self.particles[index];
            particle.vx += jitter_x;
            particle.vy += jitter_y;
            particle.x += particle.vx * speed;
            particle.y += particle.vy * speed;

            let outside = particle.x < -BOUNDS_MARGIN
                || particle.x > width + BOUNDS_MARGIN
                || particle.y < -BOUNDS_MARGIN
                || particle.y > height + BOUNDS_MARGIN
                || !particle.x.is_finite()
                || !particle.y.is_finite();
            if outside {
                self.particles[index] = self.spawn(width, height);
            }
        }
    }

    /// Pairs `(i, j)` with `i < j <= i + LINK_LOOKAHEAD` closer than the
    /// link distance.
    pub(crate) fn links(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let particles = &self.particles;
        (0..particles.len()).flat_map(move |i| {
            let end = (i + LINK_LOOKAHEAD + 1).min(particles.len());
            (i + 1..end).filter_map(move |j| {
                let dx = particles[i].x - particles[j].x;
                let dy = particles[i].y - particles[j].y;
                (dx * dx + dy * dy < LINK_DISTANCE_SQ).then_some((i, j))
            })
        })
    }

    /// Advances the field one frame and draws it.
    pub fn draw(
        &mut self,
        canvas: &mut Canvas,
        frame: &SpectrumFrame,
        sensitivity: f32,
    ) -> ParticleStats {
        let width = canvas.css_width();
        let height = canvas.css_height();
        let average_energy = frame.average_energy(sensitivity);
        self.step(width, height, average_energy);

        let size = particle_radius(average_energy);
        for particle in &self.particles {
            canvas.fill_radial(
                particle.x,
                particle.y,
                size * 2.0,
                palette::HIGHLIGHT.with_alpha(0.15 + average_energy * 0.7),
                palette::ACCENT.with_alpha(0.0),
                BlendMode::SourceOver,
            );
            canvas.fill_circle(
                particle.x,
                particle.y,
                size,
                palette::ACCENT.with_alpha(0.12 + average_energy * 0.6),
                BlendMode::SourceOver,
            );
        }

        let line = palette::ACCENT.with_alpha(0.04 + average_energy * 0.25);
        let mut links = 0;
        for (i, j) in self.links() {
            let (a, b) = (self.particles[i], self.particles[j]);
            canvas.stroke_line((a.x, a.y), (b.x, b.y), LINK_WIDTH, line, BlendMode::SourceOver);
            links += 1;
        }

        ParticleStats {
            population: self.particles.len(),
            links,
            average_energy,
        }
    }

    fn spawn(&mut self, width: f32, height: f32) -> Particle {
        Particle {
            x: self.rng.gen::<f32>() * width.max(0.0),
            y: self.rng.gen::<f32>() * height.max(0.0),
            vx: self.rng.gen_range(-INITIAL_SPEED..INITIAL_SPEED),
            vy: self.rng.gen_range(-INITIAL_SPEED..INITIAL_SPEED),
        }
    }
}
