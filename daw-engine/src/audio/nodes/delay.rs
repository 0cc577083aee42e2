use super::{AudioNode, RenderQuantum};

/// Fixed stereo delay line, used as the reverb pre-delay
pub struct DelayNode {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_frames: usize,
}

impl DelayNode {
    pub fn new(delay_secs: f64, sample_rate: u32) -> Self {
        let delay_secs = if delay_secs.is_finite() { delay_secs.max(0.0) } else { 0.0 };
        let delay_frames = (delay_secs * sample_rate as f64).round() as usize;

        Self {
            buffer: vec![0.0; (delay_frames + 1) * 2],
            write_pos: 0,
            delay_frames,
        }
    }

    pub fn delay_frames(&self) -> usize {
        self.delay_frames
    }
}

impl AudioNode for DelayNode {
    fn process(&mut self, input: &[f32], output: &mut [f32], _quantum: &RenderQuantum) {
        if self.delay_frames == 0 {
            output.copy_from_slice(input);
            return;
        }

        let len = self.buffer.len() / 2;
        for (out, frame) in output.chunks_exact_mut(2).zip(input.chunks_exact(2)) {
            let read_pos = (self.write_pos + len - self.delay_frames) % len;
            out[0] = self.buffer[read_pos * 2];
            out[1] = self.buffer[read_pos * 2 + 1];

            self.buffer[self.write_pos * 2] = frame[0];
            self.buffer[self.write_pos * 2 + 1] = frame[1];
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    fn node_type(&self) -> &'static str {
        "Delay"
    }
}
