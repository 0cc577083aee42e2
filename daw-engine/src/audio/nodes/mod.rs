//! Processing units of the render graph
//!
//! Nodes are built on the control thread and moved into the renderer inside
//! a `Command`. Everything a node needs is allocated up front; `process`
//! must not allocate or block.

pub mod analyser;
pub mod buffer_source;
pub mod convolver;
pub mod delay;
pub mod filter;
pub mod gain;
pub mod oscillator;

pub use analyser::{AnalyserNode, LevelTap};
pub use buffer_source::BufferSourceNode;
pub use convolver::ConvolverNode;
pub use delay::DelayNode;
pub use filter::FilterNode;
pub use gain::{apply_to_timeline, GainNode};
pub use oscillator::OscillatorNode;

use super::instrument::Waveform;

/// Frames processed per render pass
pub const RENDER_QUANTUM: usize = 128;

/// Handle to a node in the render graph
pub type NodeId = u64;

/// Timing of the block currently being rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderQuantum {
    /// Audio-clock time of the first frame, in seconds
    pub start_time: f64,
    pub sample_rate: u32,
    pub frames: usize,
}

impl RenderQuantum {
    /// Audio-clock time of frame `index` within this quantum
    #[inline]
    pub fn time_at(&self, index: usize) -> f64 {
        self.start_time + index as f64 / self.sample_rate as f64
    }
}

/// Control messages addressed to a single live node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeMessage {
    SetValueAtTime { value: f32, time: f64 },
    LinearRampToValueAtTime { value: f32, time: f64 },
    CancelScheduledValues(f64),
    /// Stop a source at the given clock time (immediately if in the past)
    Stop(f64),
    SetWaveform(Waveform),
}

/// Custom node trait for audio processing nodes
///
/// All nodes must be Send to be usable in the audio thread.
/// Buffers are interleaved stereo, `quantum.frames * 2` samples long.
pub trait AudioNode: Send {
    /// Render one quantum. `input` is the sum of every upstream node.
    fn process(&mut self, input: &[f32], output: &mut [f32], quantum: &RenderQuantum);

    /// Apply a control message; nodes ignore messages that don't concern them
    fn handle(&mut self, _message: NodeMessage) {}

    /// Sources report true once they've played out or been stopped
    fn is_finished(&self) -> bool {
        false
    }

    /// Get the node type name (for logging)
    fn node_type(&self) -> &'static str;
}
