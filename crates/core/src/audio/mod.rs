//! Audio side of the pipeline: sources, the processing graph that routes
//! them through the gain stage into the analysis and capture taps, and the
//! hardware seams behind it.

pub mod decoder;
pub mod device;
mod graph;
mod ring;
mod source;

pub use decoder::{decode_file, spawn_decode, DecodedAudio};
pub use device::{
    AudioOutput, CpalInputDevice, CpalLiveStream, CpalOutput, InputDevice, LiveStream, NullOutput,
};
pub use graph::{AudioContext, AudioTrackInfo, CaptureTap, GainStage, SignalGraphManager};
pub use ring::SampleRing;
pub use source::{AudioSource, MediaElement, MediaEvent, SourceKind};
