use std::sync::Arc;

use super::{AudioNode, NodeMessage, RenderQuantum};
use crate::audio::buffer::AudioBuffer;

/// One-shot player for a decoded buffer
///
/// Starts at `start_at` on the audio clock, reading from `offset` seconds into
/// the buffer for at most `duration` seconds. Buffers at another sample rate
/// are resampled on the fly. A start time already in the past starts at once.
pub struct BufferSourceNode {
    buffer: Arc<AudioBuffer>,
    start_at: f64,
    offset: f64,
    stop_at: f64,
    /// Read position in buffer frames
    position: f64,
    /// Buffer frames advanced per output frame
    rate_ratio: f64,
    /// Output frames left to play once started
    remaining: u64,
    started: bool,
    finished: bool,
}

impl BufferSourceNode {
    pub fn new(buffer: Arc<AudioBuffer>, start_at: f64, offset: f64, duration: f64, sample_rate: u32) -> Self {
        let rate_ratio = buffer.sample_rate() as f64 / sample_rate as f64;
        let remaining = (duration.max(0.0) * sample_rate as f64).round() as u64;

        Self {
            buffer,
            start_at,
            offset: offset.max(0.0),
            stop_at: f64::INFINITY,
            position: 0.0,
            rate_ratio,
            remaining,
            started: false,
            finished: remaining == 0,
        }
    }
}

impl AudioNode for BufferSourceNode {
    fn process(&mut self, _input: &[f32], output: &mut [f32], quantum: &RenderQuantum) {
        output.fill(0.0);
        if self.finished {
            return;
        }

        for (i, out) in output.chunks_exact_mut(2).enumerate() {
            let time = quantum.time_at(i);
            if time >= self.stop_at {
                self.finished = true;
                break;
            }
            if !self.started {
                if time < self.start_at {
                    continue;
                }
                self.started = true;
                self.position = self.offset * self.buffer.sample_rate() as f64;
            }

            let [left, right] = self.buffer.sample_at(self.position);
            out[0] = left;
            out[1] = right;

            self.position += self.rate_ratio;
            self.remaining -= 1;
            if self.remaining == 0 || self.position >= self.buffer.frames() as f64 {
                self.finished = true;
                break;
            }
        }
    }

    fn handle(&mut self, message: NodeMessage) {
        if let NodeMessage::Stop(time) = message {
            self.stop_at = self.stop_at.min(time);
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn node_type(&self) -> &'static str {
        "BufferSource"
    }
}
