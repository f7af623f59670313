use std::{
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    thread,
};

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::{AuraluxError, Result};

/// Decoded mono audio ready to be bound as a file source.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Mono samples at `sample_rate`.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns the same audio at `target_rate`.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate {
            return self;
        }
        Self {
            samples: resample_linear(&self.samples, self.sample_rate, target_rate),
            sample_rate: target_rate,
        }
    }
}

/// Decodes any symphonia-supported file into mono samples at `target_rate`.
pub fn decode_file(path: &Path, target_rate: u32) -> Result<DecodedAudio> {
    let file = File::open(path)
        .map_err(|err| AuraluxError::LoadFailure(format!("{}: {err}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| AuraluxError::LoadFailure(format!("unrecognised audio: {err}")))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AuraluxError::LoadFailure("file contains no audio track".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AuraluxError::LoadFailure("track is missing a sample rate".into()))?;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| AuraluxError::LoadFailure(format!("no decoder for track: {err}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => {
                return Err(AuraluxError::LoadFailure(format!(
                    "failed to read packet: {err}"
                )))
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);

                for frame in buffer.samples().chunks(channels) {
                    samples.push(frame.iter().sum::<f32>() / frame.len() as f32);
                }
            }
            Err(SymphoniaError::DecodeError(err)) => {
                tracing::debug!(%err, "skipping undecodable packet");
            }
            Err(err) => {
                return Err(AuraluxError::LoadFailure(format!(
                    "failed to decode packet: {err}"
                )))
            }
        }
    }

    if samples.is_empty() {
        return Err(AuraluxError::LoadFailure(
            "audio file produced no samples".into(),
        ));
    }

    Ok(DecodedAudio::new(samples, sample_rate).resampled(target_rate))
}

/// Decodes `path` on a worker thread. The single result arrives on the
/// returned channel once decoding finishes.
pub fn spawn_decode(path: PathBuf, target_rate: u32) -> Receiver<Result<DecodedAudio>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let result = decode_file(&path, target_rate);
        if let Err(err) = &result {
            tracing::warn!(path = ?path, %err, "decode failed");
        }
        let _ = sender.send(result);
    });
    receiver
}

/// Resamples mono audio with linear interpolation.
pub fn resample_linear(samples: &[f32], src_rate: u32, target_rate: u32) -> Vec<f32> {
    if src_rate == 0 || target_rate == 0 || src_rate == target_rate {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate as f64 / src_rate as f64;
    let new_len = ((samples.len() as f64) * ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..new_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let lower = src_pos.floor() as usize;
            if lower >= last {
                samples[last]
            } else {
                let frac = (src_pos - lower as f64) as f32;
                samples[lower] * (1.0 - frac) + samples[lower + 1] * frac
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_changes_length_proportionally() {
        let samples = vec![0.0, 1.0, 0.0, -1.0];
        let up = resample_linear(&samples, 24_000, 48_000);
        assert_eq!(up.len(), 8);
        assert!((up[1] - 0.5).abs() < 1e-6);

        let same = resample_linear(&samples, 48_000, 48_000);
        assert_eq!(same, samples);
    }

    #[test]
    fn decodes_wav_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..8_000 {
            writer.write_sample(i16::MAX / 2).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_file(&path, 16_000).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert!((decoded.duration_secs() - 1.0).abs() < 0.01);
        assert!((decoded.samples[100] - 0.25).abs() < 0.01);
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let err = decode_file(Path::new("/definitely/not/here.mp3"), 48_000).unwrap_err();
        assert!(matches!(err, AuraluxError::LoadFailure(_)));
    }

    #[test]
    fn worker_reports_result() {
        let receiver = spawn_decode(PathBuf::from("/definitely/not/here.wav"), 48_000);
        let result = receiver.recv().unwrap();
        assert!(result.is_err());
    }
}
