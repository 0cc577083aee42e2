use std::f64::consts::TAU;

use super::{AudioNode, NodeMessage, RenderQuantum};
use crate::audio::instrument::Waveform;

/// Synth voice oscillator with a scheduled start and stop
pub struct OscillatorNode {
    waveform: Waveform,
    frequency: f64,
    /// Phase in cycles, 0..1
    phase: f64,
    start_at: f64,
    stop_at: f64,
    finished: bool,
}

impl OscillatorNode {
    pub fn new(waveform: Waveform, frequency: f64, start_at: f64, stop_at: f64) -> Self {
        Self {
            waveform,
            frequency,
            phase: 0.0,
            start_at,
            stop_at,
            finished: false,
        }
    }

    #[inline]
    fn sample(&self) -> f32 {
        let phase = self.phase;
        let value = match self.waveform {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        };
        value as f32
    }
}

impl AudioNode for OscillatorNode {
    fn process(&mut self, _input: &[f32], output: &mut [f32], quantum: &RenderQuantum) {
        output.fill(0.0);
        if self.finished {
            return;
        }

        let increment = self.frequency / quantum.sample_rate as f64;
        for (i, out) in output.chunks_exact_mut(2).enumerate() {
            let time = quantum.time_at(i);
            if time >= self.stop_at {
                self.finished = true;
                break;
            }
            if time < self.start_at {
                continue;
            }

            let sample = self.sample();
            out[0] = sample;
            out[1] = sample;
            self.phase = (self.phase + increment).fract();
        }
    }

    fn handle(&mut self, message: NodeMessage) {
        match message {
            NodeMessage::Stop(time) => self.stop_at = self.stop_at.min(time),
            NodeMessage::SetWaveform(waveform) => self.waveform = waveform,
            _ => {}
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn node_type(&self) -> &'static str {
        "Oscillator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_window() {
        // 1 Hz square at 4 Hz sample rate, sounding from 0.25 to 0.75
        let mut osc = OscillatorNode::new(Waveform::Square, 1.0, 0.25, 0.75);
        let mut output = vec![0.0; 8];
        let quantum = RenderQuantum {
            start_time: 0.0,
            sample_rate: 4,
            frames: 4,
        };

        osc.process(&[], &mut output, &quantum);

        assert_eq!(output, vec![0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(osc.is_finished());
    }

    #[test]
    fn test_waveform_switch() {
        let mut osc = OscillatorNode::new(Waveform::Sine, 1.0, 0.0, f64::INFINITY);
        osc.handle(NodeMessage::SetWaveform(Waveform::Sawtooth));
        assert_eq!(osc.sample(), -1.0);
    }
}
