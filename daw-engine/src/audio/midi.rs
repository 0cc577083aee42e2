use serde::{Deserialize, Serialize};

/// Velocity used when a note doesn't carry one
pub const DEFAULT_VELOCITY: u8 = 100;

/// A note inside a MIDI clip, positioned in beats relative to the clip start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub beat: f64,
    /// Length in beats
    pub length: f64,
    /// MIDI note number; fractional values detune
    pub pitch: f64,
    pub velocity: Option<u8>,
}

impl Note {
    pub fn new(beat: f64, length: f64, pitch: f64) -> Self {
        Self {
            beat,
            length,
            pitch,
            velocity: None,
        }
    }

    pub fn end_beat(&self) -> f64 {
        self.beat + self.length
    }

    pub fn velocity(&self) -> u8 {
        self.velocity.unwrap_or(DEFAULT_VELOCITY).min(127)
    }

    /// Clamp malformed fields to usable values
    ///
    /// Returns `None` for notes that have no length left to play.
    pub fn sanitized(&self) -> Option<Note> {
        let beat = if self.beat.is_finite() { self.beat.max(0.0) } else { 0.0 };
        let length = if self.length.is_finite() { self.length } else { 0.0 };
        if length <= 0.0 {
            return None;
        }
        let pitch = if self.pitch.is_finite() { self.pitch } else { 60.0 };

        Some(Note {
            beat,
            length,
            pitch: pitch.clamp(0.0, 127.0),
            velocity: self.velocity,
        })
    }
}

/// Sanitize a note list, dropping notes that can't be played
pub fn sanitize_notes(notes: &[Note]) -> Vec<Note> {
    notes.iter().filter_map(Note::sanitized).collect()
}

/// Convert MIDI note number to frequency (A4 = 440 Hz)
pub fn note_to_frequency(pitch: f64) -> f64 {
    440.0 * 2.0_f64.powf((pitch - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_frequency() {
        assert!((note_to_frequency(69.0) - 440.0).abs() < 1e-9);
        assert!((note_to_frequency(81.0) - 880.0).abs() < 1e-9);
        assert!((note_to_frequency(60.0) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_sanitize_clamps_and_drops() {
        let notes = vec![
            Note::new(f64::NAN, 1.0, f64::INFINITY),
            Note::new(-2.0, 0.5, 200.0),
            Note::new(1.0, 0.0, 60.0),
            Note::new(1.0, f64::NAN, 60.0),
            Note::new(2.0, -1.0, 60.0),
        ];

        let clean = sanitize_notes(&notes);

        assert_eq!(clean.len(), 2);
        assert_eq!(clean[0].beat, 0.0);
        assert_eq!(clean[0].pitch, 60.0);
        assert_eq!(clean[1].beat, 0.0);
        assert_eq!(clean[1].pitch, 127.0);
    }

    #[test]
    fn test_default_velocity() {
        let mut note = Note::new(0.0, 1.0, 60.0);
        assert_eq!(note.velocity(), DEFAULT_VELOCITY);
        note.velocity = Some(200);
        assert_eq!(note.velocity(), 127);
    }
}
