use super::Analyser;

/// One instant's magnitude spectrum, low to high frequency, one byte per bin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpectrumFrame {
    bins: Vec<u8>,
}

impl SpectrumFrame {
    /// Frame over the given byte magnitudes.
    pub fn from_bins(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    /// Magnitudes from low to high frequency.
    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bin `index` scaled into `[0, 1]` and multiplied by `sensitivity`.
    pub fn level(&self, index: usize, sensitivity: f32) -> f32 {
        self.bins
            .get(index)
            .map(|value| *value as f32 / 255.0 * sensitivity)
            .unwrap_or(0.0)
    }

    /// Mean normalised magnitude across all bins, scaled by `sensitivity`.
    pub fn average_energy(&self, sensitivity: f32) -> f32 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.bins.iter().map(|value| *value as u64).sum();
        sum as f32 / (255.0 * self.bins.len() as f32) * sensitivity
    }
}

/// Pulls spectrum snapshots out of the analysis tap into a reused buffer.
///
/// The buffer is only reallocated when the analyser's bin count changes, so
/// sampling once per display frame does not allocate.
#[derive(Debug, Default)]
pub struct SpectrumSampler {
    frame: SpectrumFrame,
    reallocations: usize,
}

impl SpectrumSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` until a signal graph (and therefore an analyser) exists.
    pub fn sample(&mut self, analyser: Option<&mut Analyser>) -> Option<&SpectrumFrame> {
        let analyser = analyser?;
        let bins = analyser.frequency_bin_count();
        if self.frame.bins.len() != bins {
            self.frame.bins = vec![0; bins];
            self.reallocations += 1;
        }

        if let Err(err) = analyser.byte_frequency_data(&mut self.frame.bins) {
            tracing::warn!(%err, "spectrum sample failed, keeping previous frame");
        }
        Some(&self.frame)
    }

    /// Number of times the sample buffer had to be (re)allocated.
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }
}
