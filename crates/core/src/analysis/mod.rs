use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::validate_fft_size, AudioConfig, AuraluxError, Result};

mod spectrum;

pub use spectrum::{SpectrumFrame, SpectrumSampler};

/// Analysis tap of the signal graph.
///
/// Keeps the most recent `fft_size` samples that flowed through the gain
/// stage and, on demand, turns them into a smoothed magnitude spectrum mapped
/// onto bytes. Nothing is computed while samples are pushed; the transform
/// only runs when a snapshot is requested.
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    window: Vec<f32>,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl Analyser {
    /// Builds the tap from the FFT size, smoothing and decibel range in `config`.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        validate_fft_size(config.fft_size)?;
        let mut analyser = Self {
            fft_size: config.fft_size,
            smoothing: config.smoothing.clamp(0.0, 1.0),
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            history: Vec::new(),
            write_pos: 0,
            smoothed: Vec::new(),
            window: Vec::new(),
            fft_planner: RealFftPlanner::new(),
            fft: None,
        };
        analyser.allocate(config.fft_size);
        Ok(analyser)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced per snapshot.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Changes the analysis window. Buffers are rebuilt whole; the most recent
    /// audio is carried over but the smoothing history starts fresh.
    pub fn set_fft_size(&mut self, fft_size: usize) -> Result<()> {
        validate_fft_size(fft_size)?;
        if fft_size == self.fft_size {
            return Ok(());
        }

        let recent = self.chronological();
        self.allocate(fft_size);
        let keep = recent.len().min(fft_size);
        self.push_samples(&recent[recent.len() - keep..]);
        tracing::debug!(fft_size, "analyser resized");
        Ok(())
    }

    /// Appends processed samples to the rolling time-domain window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let len = self.history.len();
        if len == 0 {
            return;
        }
        let skip = samples.len().saturating_sub(len);
        for &sample in &samples[skip..] {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Writes the current magnitude spectrum into `out`, one byte per bin,
    /// from low to high frequency. Bins beyond `out.len()` are ignored.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        self.update_spectrum()?;

        let range = self.max_decibels - self.min_decibels;
        for (dst, magnitude) in out.iter_mut().zip(&self.smoothed) {
            *dst = if *magnitude <= f32::MIN_POSITIVE {
                0
            } else {
                let db = 20.0 * magnitude.log10();
                let scaled = (db - self.min_decibels) / range * 255.0;
                scaled.clamp(0.0, 255.0) as u8
            };
        }
        Ok(())
    }

    fn update_spectrum(&mut self) -> Result<()> {
        let size = self.fft_size;
        let fft = self
            .fft
            .as_mut()
            .ok_or_else(|| AuraluxError::msg("analyser buffers missing"))?;

        let (newest, oldest) = self.history.split_at(self.write_pos);
        let ordered = oldest.iter().chain(newest);
        for ((dst, sample), weight) in fft.input.iter_mut().zip(ordered).zip(&self.window) {
            *dst = sample * weight;
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| AuraluxError::msg(format!("spectrum transform failed: {err}")))?;

        let scale = 1.0 / size as f32;
        let tau = self.smoothing;
        for (previous, bin) in self.smoothed.iter_mut().zip(&fft.spectrum) {
            let magnitude = bin.norm() * scale;
            let next = tau * *previous + (1.0 - tau) * magnitude;
            *previous = if next.is_finite() { next } else { 0.0 };
        }
        Ok(())
    }

    fn chronological(&self) -> Vec<f32> {
        let mut ordered = Vec::with_capacity(self.history.len());
        ordered.extend_from_slice(&self.history[self.write_pos..]);
        ordered.extend_from_slice(&self.history[..self.write_pos]);
        ordered
    }

    fn allocate(&mut self, size: usize) {
        let plan = self.fft_planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        self.fft = Some(FftResources {
            size,
            plan,
            scratch,
            spectrum,
            input,
        });

        self.fft_size = size;
        self.history = vec![0.0; size];
        self.write_pos = 0;
        self.smoothed = vec![0.0; size / 2];
        self.window = (0..size).map(|index| blackman_value(index, size)).collect();
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser(fft_size: usize) -> Analyser {
        let config = AudioConfig {
            fft_size,
            smoothing: 0.0,
            ..AudioConfig::default()
        };
        Analyser::new(&config).unwrap()
    }

    fn sine(bin: usize, fft_size: usize, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * bin as f32 * n as f32 / fft_size as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = analyser(256);
        analyser.push_samples(&[0.0; 512]);
        let mut out = vec![7u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&mut out).unwrap();
        assert!(out.iter().all(|&value| value == 0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut analyser = analyser(512);
        analyser.push_samples(&sine(20, 512, 512, 0.01));
        let mut out = vec![0u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&mut out).unwrap();

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, value)| **value)
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(peak, 20);
        assert!(out[21] < out[20]);
        assert!(out[200] < out[20]);
    }

    #[test]
    fn smoothing_decays_towards_silence() {
        let config = AudioConfig {
            fft_size: 256,
            ..AudioConfig::default()
        };
        let mut analyser = Analyser::new(&config).unwrap();
        let mut out = vec![0u8; analyser.frequency_bin_count()];

        analyser.push_samples(&sine(10, 256, 256, 1.0));
        analyser.byte_frequency_data(&mut out).unwrap();
        let loud = out[10];

        analyser.push_samples(&[0.0; 256]);
        analyser.byte_frequency_data(&mut out).unwrap();
        let fading = out[10];
        assert!(fading > 0 && fading <= loud);
    }

    #[test]
    fn resizing_changes_bin_count() {
        let mut analyser = analyser(1024);
        assert_eq!(analyser.frequency_bin_count(), 512);
        analyser.set_fft_size(2048).unwrap();
        assert_eq!(analyser.frequency_bin_count(), 1024);
        assert!(analyser.set_fft_size(1000).is_err());
        assert_eq!(analyser.fft_size(), 2048);
    }
}
