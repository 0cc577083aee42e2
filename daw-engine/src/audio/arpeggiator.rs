use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::instrument::{ArpPattern, ArpeggiatorParams};
use super::midi::Note;

/// Notes starting within this many beats of a chord's first note join the chord
pub const CHORD_EPSILON: f64 = 0.01;

/// Notes that start together
#[derive(Debug, Clone, PartialEq)]
struct Chord {
    beat: f64,
    end: f64,
    /// Distinct pitches, ascending
    pitches: Vec<f64>,
    velocity: Option<u8>,
}

fn group_chords(notes: &[Note]) -> Vec<Chord> {
    let mut sorted = notes.to_vec();
    sorted.sort_by(|a, b| a.beat.total_cmp(&b.beat).then(a.pitch.total_cmp(&b.pitch)));

    let mut chords: Vec<Chord> = Vec::new();
    for note in sorted {
        match chords.last_mut() {
            Some(chord) if note.beat - chord.beat <= CHORD_EPSILON => {
                chord.end = chord.end.max(note.end_beat());
                if !chord.pitches.contains(&note.pitch) {
                    chord.pitches.push(note.pitch);
                }
            }
            _ => chords.push(Chord {
                beat: note.beat,
                end: note.end_beat(),
                pitches: vec![note.pitch],
                velocity: note.velocity,
            }),
        }
    }

    for chord in &mut chords {
        chord.pitches.sort_by(f64::total_cmp);
    }
    chords
}

/// Pitch set spread over `octaves`, octave by octave, dropping anything above 127
fn expand_octaves(pitches: &[f64], octaves: u8) -> Vec<f64> {
    (0..octaves.max(1))
        .flat_map(|octave| pitches.iter().map(move |p| p + 12.0 * octave as f64))
        .filter(|p| *p <= 127.0)
        .collect()
}

/// SplitMix64 finalizer
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministic per-chord seed so re-scheduling plays the same "random" order
fn chord_seed(chord: &Chord) -> u64 {
    chord
        .pitches
        .iter()
        .fold(mix(chord.beat.to_bits()), |seed, pitch| mix(seed ^ pitch.to_bits()))
}

fn order_pitches(chord: &Chord, pattern: ArpPattern, octaves: u8) -> Vec<f64> {
    let mut pitches = expand_octaves(&chord.pitches, octaves);
    match pattern {
        ArpPattern::Up => {}
        ArpPattern::Down => pitches.reverse(),
        ArpPattern::UpDown => {
            if pitches.len() > 2 {
                let descent: Vec<f64> = pitches[1..pitches.len() - 1].iter().rev().copied().collect();
                pitches.extend(descent);
            }
        }
        ArpPattern::Random => {
            let mut rng = StdRng::seed_from_u64(chord_seed(chord));
            pitches.shuffle(&mut rng);
        }
    }
    pitches
}

/// Replace each chord with a stepped arpeggio
///
/// Nothing is stepped past `clip_length_beats`; held arpeggios run up to it.
/// With the arpeggiator disabled the notes come back unchanged.
pub fn arpeggiate(notes: &[Note], params: &ArpeggiatorParams, clip_length_beats: f64) -> Vec<Note> {
    if !params.enabled {
        return notes.to_vec();
    }
    let gate = if params.gate.is_finite() { params.gate.min(1.0) } else { 0.0 };
    if gate <= 0.0 || !(clip_length_beats.is_finite() && clip_length_beats > 0.0) {
        return Vec::new();
    }

    let step = params.rate.beats();
    let mut out = Vec::new();

    for chord in group_chords(notes) {
        let order = order_pitches(&chord, params.pattern, params.octaves);
        if order.is_empty() {
            continue;
        }
        let end = if params.hold {
            clip_length_beats
        } else {
            chord.end.min(clip_length_beats)
        };

        let mut index = 0usize;
        loop {
            let beat = chord.beat + index as f64 * step;
            // Tolerance keeps float drift from adding a step right at the end
            if beat >= end - 1e-9 {
                break;
            }
            out.push(Note {
                beat,
                length: step * gate,
                pitch: order[index % order.len()],
                velocity: chord.velocity,
            });
            index += 1;
        }
    }

    out
}
