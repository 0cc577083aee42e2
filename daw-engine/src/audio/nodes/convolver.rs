use super::{AudioNode, RenderQuantum};
use crate::audio::impulse::ImpulseResponse;
use crate::dsp::{Convolver, PARTITION_SIZE};

/// Convolution reverb stage
pub struct ConvolverNode {
    convolver: Convolver,
}

impl ConvolverNode {
    pub fn new(impulse: &ImpulseResponse) -> Self {
        Self {
            convolver: Convolver::new(impulse.left(), impulse.right()),
        }
    }
}

impl AudioNode for ConvolverNode {
    fn process(&mut self, input: &[f32], output: &mut [f32], _quantum: &RenderQuantum) {
        let block = PARTITION_SIZE * 2;
        for (out, chunk) in output.chunks_mut(block).zip(input.chunks(block)) {
            self.convolver.process_block(chunk, out);
        }
    }

    fn node_type(&self) -> &'static str {
        "Convolver"
    }
}
