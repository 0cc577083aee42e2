use std::collections::{BTreeMap, HashMap};

use super::automation::ParamTimeline;
use super::cleanup::{CleanupAction, CleanupQueue};
use super::context::AudioContext;
use super::instrument::{SynthParams, Waveform};
use super::nodes::{apply_to_timeline, GainNode, NodeId, NodeMessage, OscillatorNode};
use super::track::TrackId;

/// Note ID type
pub type NoteId = u64;

/// Attack and release lengths actually used for a note
///
/// When attack + release doesn't fit in the audible duration both are
/// shortened by the same factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeTimes {
    pub attack: f64,
    pub release: f64,
}

impl EnvelopeTimes {
    pub fn fit(attack: f64, release: f64, duration: f64) -> Self {
        let attack = attack.max(0.0);
        let release = release.max(0.0);
        let total = attack + release;
        let duration = duration.max(0.0);
        if total > duration && total > 0.0 {
            let scale = duration / total;
            Self {
                attack: attack * scale,
                release: release * scale,
            }
        } else {
            Self { attack, release }
        }
    }
}

/// Everything needed to start one synth voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteRequest {
    pub track: TrackId,
    /// Node the voice's gain feeds, normally the track's synth output
    pub output: NodeId,
    pub frequency: f64,
    pub waveform: Waveform,
    /// Velocity as a 0..1 factor
    pub velocity: f32,
    /// Extra scaling on top of velocity
    pub gain: f32,
    /// Audio-clock start and hard end
    pub start: f64,
    pub end: f64,
    pub attack: f64,
    pub release: f64,
}

/// A sounding (or about to sound) synth voice
#[derive(Debug, Clone)]
pub struct ActiveNote {
    pub track: TrackId,
    pub oscillator: NodeId,
    pub gain: NodeId,
    pub velocity: f32,
    pub amplitude: f32,
    pub start: f64,
    pub end: f64,
    pub times: EnvelopeTimes,
    /// Mirror of the gain node's schedule
    pub envelope: ParamTimeline,
    pub cleanup_at: f64,
}

impl ActiveNote {
    pub fn release_start(&self) -> f64 {
        self.end - self.times.release
    }

    /// Gain the voice is producing at clock time `time`
    pub fn amplitude_at(&self, time: f64) -> f32 {
        self.envelope.value_at(time)
    }

    fn schedule(&mut self, ctx: &mut AudioContext, message: NodeMessage) {
        apply_to_timeline(&mut self.envelope, message);
        ctx.message(self.gain, message);
    }

    /// Attack, sustain and release starting from silence at `start`
    fn envelope_from_start(&mut self, ctx: &mut AudioContext) {
        let (start, end, amp) = (self.start, self.end, self.amplitude);
        self.schedule(ctx, NodeMessage::SetValueAtTime { value: 0.0, time: start });
        self.schedule(
            ctx,
            NodeMessage::LinearRampToValueAtTime {
                value: amp,
                time: start + self.times.attack,
            },
        );
        self.schedule(
            ctx,
            NodeMessage::SetValueAtTime {
                value: amp,
                time: self.release_start(),
            },
        );
        self.schedule(ctx, NodeMessage::LinearRampToValueAtTime { value: 0.0, time: end });
    }

    /// Re-anchor a sounding note at its current value and continue along the
    /// new envelope
    fn envelope_from(&mut self, ctx: &mut AudioContext, now: f64) {
        let current = self.amplitude_at(now);
        let attack_end = self.start + self.times.attack;
        let release_start = self.release_start();
        let (end, amp) = (self.end, self.amplitude);

        self.schedule(ctx, NodeMessage::CancelScheduledValues(now));
        self.schedule(ctx, NodeMessage::SetValueAtTime { value: current, time: now });

        if now < attack_end {
            self.schedule(ctx, NodeMessage::LinearRampToValueAtTime { value: amp, time: attack_end });
            self.schedule(ctx, NodeMessage::SetValueAtTime { value: amp, time: release_start });
        } else if now < release_start {
            self.schedule(ctx, NodeMessage::LinearRampToValueAtTime { value: amp, time: release_start });
        }
        self.schedule(ctx, NodeMessage::LinearRampToValueAtTime { value: 0.0, time: end });
    }
}

/// Registry of every synth voice the scheduler has started
pub struct NoteManager {
    notes: BTreeMap<NoteId, ActiveNote>,
    by_oscillator: HashMap<NodeId, NoteId>,
    next_id: NoteId,
    cleanup_grace: f64,
}

impl NoteManager {
    pub fn new(cleanup_grace: f64) -> Self {
        Self {
            notes: BTreeMap::new(),
            by_oscillator: HashMap::new(),
            next_id: 0,
            cleanup_grace: cleanup_grace.max(0.0),
        }
    }

    /// Create the voice's nodes and schedule its envelope
    ///
    /// Returns `None` when the note has no duration left.
    pub fn start_note(
        &mut self,
        ctx: &mut AudioContext,
        cleanup: &mut CleanupQueue,
        request: NoteRequest,
    ) -> Option<NoteId> {
        if !(request.end > request.start) {
            return None;
        }

        let times = EnvelopeTimes::fit(request.attack, request.release, request.end - request.start);
        let gain = ctx.add_node(Box::new(GainNode::new(0.0)));
        let oscillator = ctx.add_node(Box::new(OscillatorNode::new(
            request.waveform,
            request.frequency,
            request.start,
            request.end,
        )));
        ctx.connect(oscillator, gain);
        ctx.connect(gain, request.output);

        let mut note = ActiveNote {
            track: request.track,
            oscillator,
            gain,
            velocity: request.velocity,
            amplitude: request.velocity * request.gain,
            start: request.start,
            end: request.end,
            times,
            envelope: ParamTimeline::new(0.0),
            cleanup_at: request.end + self.cleanup_grace,
        };
        note.envelope_from_start(ctx);

        let id = self.next_id;
        self.next_id += 1;
        cleanup.push(note.cleanup_at, CleanupAction::Note(id));
        self.by_oscillator.insert(oscillator, id);
        self.notes.insert(id, note);
        Some(id)
    }

    /// Apply new synth settings to every voice of a track without restarting it
    ///
    /// `gain` replaces the per-note scaling; voices that haven't started yet
    /// get a fresh envelope, sounding ones continue from their current value.
    pub fn retarget_track(
        &mut self,
        ctx: &mut AudioContext,
        track: TrackId,
        params: &SynthParams,
        gain: f32,
        now: f64,
    ) -> usize {
        let mut retargeted = 0;
        for note in self.notes.values_mut().filter(|n| n.track == track) {
            if note.end <= now {
                continue;
            }
            ctx.message(note.oscillator, NodeMessage::SetWaveform(params.waveform));
            note.times = EnvelopeTimes::fit(params.attack_secs(), params.release_secs(), note.end - note.start);
            note.amplitude = note.velocity * gain;

            if note.start > now {
                note.schedule(ctx, NodeMessage::CancelScheduledValues(note.start));
                note.envelope_from_start(ctx);
            } else {
                note.envelope_from(ctx, now);
            }
            retargeted += 1;
        }
        retargeted
    }

    /// Stop a voice now and drop its nodes; unknown ids are ignored
    pub fn release(&mut self, ctx: &mut AudioContext, id: NoteId) -> bool {
        match self.notes.remove(&id) {
            Some(note) => {
                self.by_oscillator.remove(&note.oscillator);
                ctx.remove_node(note.oscillator);
                ctx.remove_node(note.gain);
                true
            }
            None => false,
        }
    }

    /// Handle the renderer reporting an oscillator as finished
    pub fn oscillator_ended(&mut self, ctx: &mut AudioContext, node: NodeId) -> bool {
        match self.by_oscillator.get(&node).copied() {
            Some(id) => self.release(ctx, id),
            None => false,
        }
    }

    pub fn stop_track(&mut self, ctx: &mut AudioContext, track: TrackId) -> usize {
        let ids: Vec<NoteId> = self
            .notes
            .iter()
            .filter(|(_, n)| n.track == track)
            .map(|(&id, _)| id)
            .collect();
        for id in &ids {
            self.release(ctx, *id);
        }
        ids.len()
    }

    pub fn stop_all(&mut self, ctx: &mut AudioContext) -> usize {
        let ids: Vec<NoteId> = self.notes.keys().copied().collect();
        for id in &ids {
            self.release(ctx, *id);
        }
        ids.len()
    }

    pub fn get(&self, id: NoteId) -> Option<&ActiveNote> {
        self.notes.get(&id)
    }

    pub fn notes_for_track(&self, track: TrackId) -> impl Iterator<Item = &ActiveNote> + '_ {
        self.notes.values().filter(move |n| n.track == track)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::render::Renderer;
    use crate::config::EngineConfig;

    fn setup() -> (AudioContext, Renderer, NoteManager, CleanupQueue, NodeId) {
        let (mut ctx, renderer) = AudioContext::new(48000, &EngineConfig::default());
        let out = ctx.add_node(Box::new(GainNode::new(1.0)));
        (ctx, renderer, NoteManager::new(0.05), CleanupQueue::new(), out)
    }

    fn request(out: NodeId, start: f64, end: f64, attack: f64, release: f64) -> NoteRequest {
        NoteRequest {
            track: 1,
            output: out,
            frequency: 440.0,
            waveform: Waveform::Sine,
            velocity: 0.8,
            gain: 1.0,
            start,
            end,
            attack,
            release,
        }
    }

    fn params(attack_ms: f32, release_ms: f32) -> SynthParams {
        SynthParams {
            waveform: Waveform::Square,
            gain: 1.0,
            attack_ms,
            release_ms,
        }
    }

    #[test]
    fn test_envelope_times_compress() {
        let times = EnvelopeTimes::fit(0.3, 0.1, 0.2);
        assert!((times.attack - 0.15).abs() < 1e-12);
        assert!((times.release - 0.05).abs() < 1e-12);

        let times = EnvelopeTimes::fit(0.01, 0.1, 1.0);
        assert_eq!(times, EnvelopeTimes { attack: 0.01, release: 0.1 });
    }

    #[test]
    fn test_envelope_shape() {
        let (mut ctx, _r, mut notes, mut cleanup, out) = setup();
        let id = notes
            .start_note(&mut ctx, &mut cleanup, request(out, 1.0, 3.0, 0.5, 1.0))
            .unwrap();
        let note = notes.get(id).unwrap();

        assert_eq!(note.amplitude_at(0.5), 0.0);
        assert!((note.amplitude_at(1.25) - 0.4).abs() < 1e-6);
        assert!((note.amplitude_at(1.8) - 0.8).abs() < 1e-6);
        assert!((note.amplitude_at(2.5) - 0.4).abs() < 1e-6);
        assert_eq!(note.amplitude_at(3.0), 0.0);
        assert_eq!(ctx.downstream(note.oscillator), &[note.gain]);
        assert_eq!(ctx.downstream(note.gain), &[out]);
        assert_eq!(cleanup.next_deadline(), Some(3.05));
    }

    #[test]
    fn test_zero_length_note_is_skipped() {
        let (mut ctx, _r, mut notes, mut cleanup, out) = setup();
        assert!(notes.start_note(&mut ctx, &mut cleanup, request(out, 2.0, 2.0, 0.0, 0.0)).is_none());
        assert!(notes.is_empty());
        assert!(cleanup.is_empty());
    }

    #[test]
    fn test_retarget_in_sustain_is_continuous() {
        let (mut ctx, _r, mut notes, mut cleanup, out) = setup();
        let id = notes
            .start_note(&mut ctx, &mut cleanup, request(out, 0.0, 4.0, 0.01, 0.1))
            .unwrap();
        let before = notes.get(id).unwrap().amplitude_at(1.0);
        assert!((before - 0.8).abs() < 1e-6);

        notes.retarget_track(&mut ctx, 1, &params(500.0, 2000.0), 1.0, 1.0);

        let note = notes.get(id).unwrap();
        assert!((note.amplitude_at(1.0) - before).abs() < 1e-6);
        assert!((note.amplitude_at(1.5) - 0.8).abs() < 1e-6);
        // New 2s release starts at 2.0
        assert!((note.amplitude_at(3.0) - 0.4).abs() < 1e-5);
        assert_eq!(note.amplitude_at(4.0), 0.0);
    }

    #[test]
    fn test_retarget_during_attack_is_continuous() {
        let (mut ctx, _r, mut notes, mut cleanup, out) = setup();
        let id = notes
            .start_note(&mut ctx, &mut cleanup, request(out, 0.0, 4.0, 1.0, 0.5))
            .unwrap();
        let before = notes.get(id).unwrap().amplitude_at(0.5);
        assert!((before - 0.4).abs() < 1e-6);

        notes.retarget_track(&mut ctx, 1, &params(2000.0, 500.0), 1.0, 0.5);

        let note = notes.get(id).unwrap();
        assert!((note.amplitude_at(0.5) - before).abs() < 1e-6);
        assert!((note.amplitude_at(1.25) - 0.6).abs() < 1e-5);
        assert!((note.amplitude_at(2.0) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_retarget_future_note_starts_fresh() {
        let (mut ctx, _r, mut notes, mut cleanup, out) = setup();
        let id = notes
            .start_note(&mut ctx, &mut cleanup, request(out, 2.0, 3.0, 0.1, 0.1))
            .unwrap();

        notes.retarget_track(&mut ctx, 1, &params(500.0, 100.0), 0.5, 1.0);

        let note = notes.get(id).unwrap();
        assert_eq!(note.amplitude, 0.4);
        assert_eq!(note.amplitude_at(2.0), 0.0);
        assert!((note.amplitude_at(2.25) - 0.2).abs() < 1e-6);
        assert_eq!(note.envelope.points().len(), 4);
    }

    #[test]
    fn test_stop_and_cleanup_release_nodes() {
        let (mut ctx, _r, mut notes, mut cleanup, out) = setup();
        let a = notes
            .start_note(&mut ctx, &mut cleanup, request(out, 0.0, 1.0, 0.0, 0.0))
            .unwrap();
        notes.start_note(&mut ctx, &mut cleanup, request(out, 0.0, 1.0, 0.0, 0.0));
        let osc = notes.get(a).unwrap().oscillator;

        assert!(notes.oscillator_ended(&mut ctx, osc));
        assert!(!notes.oscillator_ended(&mut ctx, osc));
        assert!(!ctx.is_live(osc));
        assert!(!notes.release(&mut ctx, a));

        assert_eq!(notes.stop_all(&mut ctx), 1);
        assert!(notes.is_empty());
        assert!(ctx.upstream(out).is_empty());
    }
}
