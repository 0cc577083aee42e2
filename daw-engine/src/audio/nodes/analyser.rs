use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dasp_ring_buffer::Fixed;
use dasp_rms::Rms;

use super::{AudioNode, RenderQuantum};

/// Latest per-channel RMS of a bus, shared between the analyser on the render
/// thread and the meter on the control side
#[derive(Debug, Default)]
pub struct LevelTap {
    left: AtomicU32,
    right: AtomicU32,
}

impl LevelTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, left: f32, right: f32) {
        self.left.store(left.to_bits(), Ordering::Relaxed);
        self.right.store(right.to_bits(), Ordering::Relaxed);
    }

    /// Per-channel RMS over the analyser window
    pub fn load(&self) -> (f32, f32) {
        (
            f32::from_bits(self.left.load(Ordering::Relaxed)),
            f32::from_bits(self.right.load(Ordering::Relaxed)),
        )
    }
}

/// Pass-through node that tracks a running RMS of its input
pub struct AnalyserNode {
    rms: Rms<[f32; 2], Vec<[f32; 2]>>,
    tap: Arc<LevelTap>,
}

impl AnalyserNode {
    pub fn new(window_frames: usize, tap: Arc<LevelTap>) -> Self {
        let window = vec![[0.0f32; 2]; window_frames.max(1)];
        Self {
            rms: Rms::new(Fixed::from(window)),
            tap,
        }
    }
}

impl AudioNode for AnalyserNode {
    fn process(&mut self, input: &[f32], output: &mut [f32], _quantum: &RenderQuantum) {
        output.copy_from_slice(input);

        for frame in input.chunks_exact(2) {
            self.rms.next([frame[0], frame[1]]);
        }
        let [left, right] = self.rms.current();
        self.tap.store(left, right);
    }

    fn node_type(&self) -> &'static str {
        "Analyser"
    }
}
