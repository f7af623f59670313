//! Core library for the Auralux audio visualiser.
//!
//! The pipeline runs leaf-first: the [`audio`] graph routes the active source
//! through a shared gain stage into the analysis and capture taps, the
//! [`analysis`] sampler turns the analysis tap into spectrum frames, the
//! [`render`] engine draws one of three visual modes from them and the
//! [`record`] controller encodes the result. [`transport::Visualizer`] ties the
//! pieces together behind a cooperative tick loop.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod record;
pub mod render;
pub mod timeline;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{Analyser, SpectrumFrame, SpectrumSampler};
pub use audio::{AudioSource, DecodedAudio, MediaElement, SignalGraphManager, SourceKind};
pub use config::{AppConfig, AudioConfig, CaptureConfig, Theme, ThemeStore, VisualConfig, VisualMode};
pub use error::{AuraluxError, Result};
pub use record::{Artifact, ArtifactSink, CaptureController, CaptureHost, Encoder};
pub use render::{Canvas, RenderEngine, RenderState};
pub use timeline::FrameLoop;
pub use transport::{Hosts, PlaybackState, Visualizer};
