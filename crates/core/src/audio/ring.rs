use std::collections::VecDeque;

/// Fixed-capacity FIFO of mono samples.
///
/// When full, the oldest samples are overwritten so a stalled consumer only
/// ever costs `capacity` samples of memory.
#[derive(Debug, Clone)]
pub struct SampleRing {
    buffer: VecDeque<f32>,
    capacity: usize,
    dropped: usize,
}

impl SampleRing {
    /// Ring holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Ring sized to hold `seconds` of audio at `sample_rate`.
    pub fn with_duration(seconds: f32, sample_rate: u32) -> Self {
        Self::new((seconds.max(0.0) * sample_rate as f32).ceil() as usize)
    }

    /// Appends one sample, dropping the oldest when full.
    pub fn push(&mut self, sample: f32) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(sample);
    }

    pub fn extend(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.push(sample);
        }
    }

    /// Removes the oldest sample.
    pub fn pop(&mut self) -> Option<f32> {
        self.buffer.pop_front()
    }

    /// Moves every buffered sample, oldest first, onto the end of `out`.
    pub fn drain_into(&mut self, out: &mut Vec<f32>) {
        out.extend(self.buffer.drain(..));
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples discarded because the ring was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
