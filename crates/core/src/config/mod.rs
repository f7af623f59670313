use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AuraluxError, Result};

mod theme;

pub use theme::{Theme, ThemeStore, THEME_KEY};

/// Smallest analysis window the analyser accepts.
pub const MIN_FFT_SIZE: usize = 32;
/// Largest analysis window the analyser accepts.
pub const MAX_FFT_SIZE: usize = 32_768;
/// Highest device pixel ratio honoured by the drawing surface.
pub const MAX_DEVICE_PIXEL_RATIO: f32 = 2.0;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub visual: VisualConfig,
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.visual.validate()?;
        self.capture.validate()
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    /// Weight of the previous spectrum when smoothing successive samples.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub volume: f32,
    /// How much processed audio the capture tap holds when nobody drains it.
    pub capture_tap_seconds: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 1024,
            smoothing: 0.85,
            min_decibels: -100.0,
            max_decibels: -30.0,
            volume: 1.0,
            capture_tap_seconds: 1.0,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AuraluxError::invalid("sample rate must be positive"));
        }
        validate_fft_size(self.fft_size)?;
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(AuraluxError::invalid("smoothing must lie in [0, 1]"));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(AuraluxError::invalid(
                "min_decibels must be below max_decibels",
            ));
        }
        if !(self.volume >= 0.0) {
            return Err(AuraluxError::invalid("volume must be non-negative"));
        }
        Ok(())
    }
}

/// Checks that `size` is a power of two the analyser can use.
pub fn validate_fft_size(size: usize) -> Result<()> {
    if !size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size) {
        return Err(AuraluxError::invalid(format!(
            "fft size {size} must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}"
        )));
    }
    Ok(())
}

/// Which of the three renderers draws each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    #[default]
    Bars,
    Ring,
    Particles,
}

impl VisualMode {
    pub fn as_str(self) -> &'static str {
        match self {
            VisualMode::Bars => "bars",
            VisualMode::Ring => "ring",
            VisualMode::Particles => "particles",
        }
    }
}

impl fmt::Display for VisualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualMode {
    type Err = AuraluxError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bars" => Ok(VisualMode::Bars),
            "ring" => Ok(VisualMode::Ring),
            "particles" => Ok(VisualMode::Particles),
            other => Err(AuraluxError::invalid(format!(
                "unknown visual mode `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub mode: VisualMode,
    pub sensitivity: f32,
    /// Surface width in CSS pixels.
    pub width: f32,
    /// Surface height in CSS pixels.
    pub height: f32,
    pub device_pixel_ratio: f32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            mode: VisualMode::Bars,
            sensitivity: 1.0,
            width: 960.0,
            height: 540.0,
            device_pixel_ratio: 1.0,
        }
    }
}

impl VisualConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sensitivity >= 0.0) {
            return Err(AuraluxError::invalid("sensitivity must be non-negative"));
        }
        if !(self.width >= 1.0) || !(self.height >= 1.0) {
            return Err(AuraluxError::invalid("surface must be at least 1x1"));
        }
        if !(self.device_pixel_ratio > 0.0) {
            return Err(AuraluxError::invalid("device pixel ratio must be positive"));
        }
        Ok(())
    }
}

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub fps: u32,
    pub timeslice_ms: u64,
    /// Output formats tried in order before falling back to the host default.
    pub format_preferences: Vec<String>,
    pub output_dir: String,
    pub file_prefix: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            timeslice_ms: 100,
            format_preferences: vec![
                "video/webm;codecs=vp9,opus".to_string(),
                "video/webm;codecs=vp8,opus".to_string(),
                "video/webm".to_string(),
            ],
            output_dir: ".".to_string(),
            file_prefix: "auralux".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(AuraluxError::invalid("capture fps must be positive"));
        }
        if self.timeslice_ms == 0 {
            return Err(AuraluxError::invalid("capture time-slice must be positive"));
        }
        Ok(())
    }

    /// Encoder flush interval in seconds.
    pub fn timeslice_secs(&self) -> f64 {
        self.timeslice_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        assert!(validate_fft_size(1000).is_err());
        assert!(validate_fft_size(16).is_err());
        assert!(validate_fft_size(65_536).is_err());
        assert!(validate_fft_size(2048).is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "visual": { "mode": "ring", "sensitivity": 1.5 } }"#)
                .unwrap();
        assert_eq!(config.visual.mode, VisualMode::Ring);
        assert_eq!(config.visual.sensitivity, 1.5);
        assert_eq!(config.audio.fft_size, 1024);
        assert_eq!(config.capture.timeslice_ms, 100);
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.visual.mode = VisualMode::Particles;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("Ring".parse::<VisualMode>().unwrap(), VisualMode::Ring);
        assert!("waveform".parse::<VisualMode>().is_err());
    }
}
