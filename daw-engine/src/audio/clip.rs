use std::sync::Arc;

use super::buffer::AudioBuffer;
use super::instrument::Waveform;
use super::midi::Note;

/// Clip ID type
pub type ClipId = u32;

/// A clip placed on a track
#[derive(Debug, Clone)]
pub enum Clip {
    Audio(AudioClip),
    Midi(MidiClip),
}

impl Clip {
    pub fn id(&self) -> ClipId {
        match self {
            Clip::Audio(clip) => clip.id,
            Clip::Midi(clip) => clip.id,
        }
    }

    /// Timeline start in seconds
    pub fn start(&self) -> f64 {
        match self {
            Clip::Audio(clip) => clip.start,
            Clip::Midi(clip) => clip.start,
        }
    }
}

/// Audio clip referencing a decoded buffer
///
/// ## Timing Model
/// - `start` / `duration`: the clip's window on the timeline
/// - `left_pad`: silence before the buffer's first sample inside the window;
///   trimming the front of a clip moves audio later without moving the window
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub id: ClipId,
    /// Decoded audio; clips whose buffer hasn't arrived yet are skipped
    pub buffer: Option<Arc<AudioBuffer>>,
    pub start: f64,
    pub duration: f64,
    pub left_pad: f64,
}

impl AudioClip {
    pub fn new(id: ClipId, buffer: Arc<AudioBuffer>, start: f64, duration: f64) -> Self {
        Self {
            id,
            buffer: Some(buffer),
            start,
            duration,
            left_pad: 0.0,
        }
    }

    /// Timeline span that actually carries audio: `[start + left_pad, end)`
    /// where `end` is whichever comes first of the clip end and the buffer end
    pub fn audible_window(&self, buffer_duration: f64) -> (f64, f64) {
        let window_start = self.start + self.left_pad;
        let window_end = (self.start + self.duration).min(window_start + buffer_duration);
        (window_start, window_end)
    }
}

/// MIDI clip played through the track's synth
#[derive(Debug, Clone)]
pub struct MidiClip {
    pub id: ClipId,
    pub start: f64,
    pub duration: f64,
    /// Notes with beat positions relative to `start`
    pub notes: Vec<Note>,
    /// Waveform used when the track has no synth params of its own
    pub waveform: Waveform,
    /// Clip gain used when the track has no synth params of its own
    pub gain: f32,
}

impl MidiClip {
    pub fn new(id: ClipId, start: f64, duration: f64, notes: Vec<Note>) -> Self {
        Self {
            id,
            start,
            duration,
            notes,
            waveform: Waveform::Sine,
            gain: 1.0,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}
