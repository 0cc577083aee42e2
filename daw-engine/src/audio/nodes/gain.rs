use super::{AudioNode, NodeMessage, RenderQuantum};
use crate::audio::automation::ParamTimeline;

/// Room for scheduled gain events before the timeline has to grow
const EVENT_CAPACITY: usize = 32;

/// Apply a gain automation message to a timeline
///
/// Shared by `GainNode` and the control-side mirrors of note envelopes, so
/// both see exactly the same schedule. Returns false for messages that
/// aren't gain automation.
pub fn apply_to_timeline(timeline: &mut ParamTimeline, message: NodeMessage) -> bool {
    match message {
        NodeMessage::SetValueAtTime { value, time } => timeline.set_value_at_time(value, time),
        NodeMessage::LinearRampToValueAtTime { value, time } => {
            timeline.linear_ramp_to_value_at_time(value, time)
        }
        NodeMessage::CancelScheduledValues(time) => timeline.cancel_scheduled_values(time),
        NodeMessage::Stop(_) | NodeMessage::SetWaveform(_) => return false,
    }
    true
}

/// Gain/volume control node with a schedulable gain parameter
pub struct GainNode {
    gain: ParamTimeline,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: ParamTimeline::with_capacity(gain, EVENT_CAPACITY),
        }
    }
}

impl AudioNode for GainNode {
    fn process(&mut self, input: &[f32], output: &mut [f32], quantum: &RenderQuantum) {
        let settled = self
            .gain
            .last_time()
            .map_or(true, |last| last <= quantum.start_time);

        if settled {
            let gain = self.gain.value_at(quantum.start_time);
            for (out, sample) in output.iter_mut().zip(input) {
                *out = sample * gain;
            }
        } else {
            for (i, (out, frame)) in output.chunks_exact_mut(2).zip(input.chunks_exact(2)).enumerate() {
                let gain = self.gain.value_at(quantum.time_at(i));
                out[0] = frame[0] * gain;
                out[1] = frame[1] * gain;
            }
        }

        self.gain.prune_before(quantum.start_time);
    }

    fn handle(&mut self, message: NodeMessage) {
        apply_to_timeline(&mut self.gain, message);
    }

    fn node_type(&self) -> &'static str {
        "Gain"
    }
}
