/// Cubic Hermite interpolation for smooth resampling
/// p0, p1, p2, p3 are four consecutive samples
/// x is the fractional position between p1 and p2 (0.0 to 1.0)
#[inline]
pub fn hermite_interpolate(p0: f32, p1: f32, p2: f32, p3: f32, x: f32) -> f32 {
    let c0 = p1;
    let c1 = 0.5 * (p2 - p0);
    let c2 = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c3 = 0.5 * (p3 - p0) + 1.5 * (p1 - p2);

    ((c3 * x + c2) * x + c1) * x + c0
}

/// Decoded audio, always held as interleaved stereo at its own sample rate
///
/// Buffers are shared between the clip snapshots and the buffer players on
/// the render thread through `Arc`, so they are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    data: Vec<f32>,
    sample_rate: u32,
    frames: usize,
}

impl AudioBuffer {
    /// Wrap interleaved samples with `channels` channels, converting to stereo
    ///
    /// Mono is duplicated to both sides; more than two channels are folded
    /// down by averaging the odd and even channels.
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels;
        let mut data = Vec::with_capacity(frames * 2);

        for frame in samples.chunks_exact(channels) {
            match channels {
                1 => data.extend_from_slice(&[frame[0], frame[0]]),
                2 => data.extend_from_slice(frame),
                _ => {
                    let (mut left, mut right) = (0.0f32, 0.0f32);
                    for (ch, sample) in frame.iter().enumerate() {
                        if ch % 2 == 0 {
                            left += sample;
                        } else {
                            right += sample;
                        }
                    }
                    let left_count = channels.div_ceil(2) as f32;
                    let right_count = (channels / 2) as f32;
                    data.push(left / left_count);
                    data.push(right / right_count);
                }
            }
        }

        Self {
            data,
            sample_rate: sample_rate.max(1),
            frames,
        }
    }

    /// Build a buffer from a single channel
    pub fn from_mono(samples: &[f32], sample_rate: u32) -> Self {
        Self::from_interleaved(samples, 1, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Interleaved stereo samples
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn frame(&self, index: usize) -> [f32; 2] {
        if index < self.frames {
            [self.data[index * 2], self.data[index * 2 + 1]]
        } else {
            [0.0, 0.0]
        }
    }

    /// Read a stereo frame at a fractional frame position
    ///
    /// Positions past the end read as silence.
    #[inline]
    pub fn sample_at(&self, position: f64) -> [f32; 2] {
        if position < 0.0 || position >= self.frames as f64 {
            return [0.0, 0.0];
        }
        let index = position as usize;
        let frac = (position - index as f64) as f32;
        if frac == 0.0 {
            return self.frame(index);
        }

        let p0 = self.frame(index.saturating_sub(1));
        let p1 = self.frame(index);
        let p2 = self.frame(index + 1);
        let p3 = self.frame(index + 2);
        [
            hermite_interpolate(p0[0], p1[0], p2[0], p3[0], frac),
            hermite_interpolate(p0[1], p1[1], p2[1], p3[1], frac),
        ]
    }
}
