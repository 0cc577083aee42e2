use std::collections::HashMap;
use std::sync::Arc;

use super::buffer::AudioBuffer;
use super::cleanup::{CleanupAction, CleanupQueue};
use super::clip::{AudioClip, MidiClip};
use super::clock::TransportClock;
use super::context::AudioContext;
use super::midi::Note;
use super::nodes::{BufferSourceNode, NodeId};
use super::track::TrackId;

/// When and how much of an audio clip's buffer to play
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioClipPlan {
    /// Audio-clock start time
    pub clock_start: f64,
    /// Seconds into the buffer
    pub offset: f64,
    /// Seconds of buffer to play
    pub duration: f64,
}

/// Work out the part of an audio clip still ahead of (or under) the playhead
///
/// The audible window is the clip span shifted by `left_pad` and cut at the
/// buffer's end. Returns `None` when nothing of it is left to play.
pub fn plan_audio_clip(
    clip: &AudioClip,
    buffer_duration: f64,
    playhead: f64,
    clock: &TransportClock,
    now: f64,
) -> Option<AudioClipPlan> {
    let (window_start, window_end) = clip.audible_window(buffer_duration);
    if playhead >= window_end {
        return None;
    }

    let offset = (playhead - window_start).max(0.0);
    let duration = (buffer_duration - offset).min(window_end - playhead.max(window_start));
    if !(duration > 0.0) {
        return None;
    }

    Some(AudioClipPlan {
        clock_start: now.max(clock.timeline_to_clock(window_start)),
        offset,
        duration,
    })
}

/// One note of a MIDI clip mapped onto the audio clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotePlan {
    pub pitch: f64,
    pub velocity: u8,
    pub clock_start: f64,
    pub clock_end: f64,
}

/// Place a clip's notes on the audio clock
///
/// Notes are cut at the clip end, notes wholly behind the playhead are
/// skipped and a note the playhead is inside of starts at the playhead.
pub fn plan_midi_clip(
    clip: &MidiClip,
    notes: &[Note],
    bpm: f64,
    playhead: f64,
    clock: &TransportClock,
    now: f64,
) -> Vec<NotePlan> {
    if !(bpm > 0.0) {
        return Vec::new();
    }
    let seconds_per_beat = 60.0 / bpm;
    let clip_end = clip.end();

    notes
        .iter()
        .filter_map(|note| {
            let note_start = clip.start + note.beat * seconds_per_beat;
            let note_end = (note_start + note.length * seconds_per_beat).min(clip_end);
            if note_start >= clip_end || note_end <= playhead {
                return None;
            }

            let clock_start = now.max(clock.timeline_to_clock(note_start.max(playhead)));
            let clock_end = clock.timeline_to_clock(note_end);
            (clock_end > clock_start).then_some(NotePlan {
                pitch: note.pitch,
                velocity: note.velocity(),
                clock_start,
                clock_end,
            })
        })
        .collect()
}

/// Registry of the buffer players started for audio clips, per track
#[derive(Default)]
pub struct ClipScheduler {
    sources: HashMap<TrackId, Vec<NodeId>>,
}

impl ClipScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a buffer player for a planned clip, feeding `output`
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_audio(
        &mut self,
        ctx: &mut AudioContext,
        cleanup: &mut CleanupQueue,
        track: TrackId,
        output: NodeId,
        buffer: Arc<AudioBuffer>,
        plan: AudioClipPlan,
        grace: f64,
    ) -> NodeId {
        let node = ctx.add_node(Box::new(BufferSourceNode::new(
            buffer,
            plan.clock_start,
            plan.offset,
            plan.duration,
            ctx.sample_rate(),
        )));
        ctx.connect(node, output);
        self.sources.entry(track).or_default().push(node);
        cleanup.push(
            plan.clock_start + plan.duration + grace,
            CleanupAction::Source { track, node },
        );
        node
    }

    /// Remove a player once it's done; unknown nodes are ignored
    pub fn release(&mut self, ctx: &mut AudioContext, track: TrackId, node: NodeId) -> bool {
        let Some(nodes) = self.sources.get_mut(&track) else {
            return false;
        };
        let Some(idx) = nodes.iter().position(|&n| n == node) else {
            return false;
        };
        nodes.swap_remove(idx);
        if nodes.is_empty() {
            self.sources.remove(&track);
        }
        ctx.remove_node(node);
        true
    }

    /// Handle the renderer reporting a player as finished
    pub fn source_ended(&mut self, ctx: &mut AudioContext, node: NodeId) -> bool {
        let track = self
            .sources
            .iter()
            .find(|(_, nodes)| nodes.contains(&node))
            .map(|(&track, _)| track);
        match track {
            Some(track) => self.release(ctx, track, node),
            None => false,
        }
    }

    pub fn stop_track(&mut self, ctx: &mut AudioContext, track: TrackId) -> usize {
        let nodes = self.sources.remove(&track).unwrap_or_default();
        for &node in &nodes {
            ctx.remove_node(node);
        }
        nodes.len()
    }

    pub fn stop_all(&mut self, ctx: &mut AudioContext) -> usize {
        let mut stopped = 0;
        for (_, nodes) in self.sources.drain() {
            for node in nodes {
                ctx.remove_node(node);
                stopped += 1;
            }
        }
        stopped
    }

    pub fn len(&self) -> usize {
        self.sources.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
