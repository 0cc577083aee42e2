use serde::{Deserialize, Serialize};

/// Oscillator waveform types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Per-track synth voice settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthParams {
    pub waveform: Waveform,
    /// Output level of the track's synth bus
    pub gain: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            gain: 0.8,
            attack_ms: 10.0,
            release_ms: 100.0,
        }
    }
}

impl SynthParams {
    pub fn attack_secs(&self) -> f64 {
        non_negative(self.attack_ms) as f64 / 1000.0
    }

    pub fn release_secs(&self) -> f64 {
        non_negative(self.release_ms) as f64 / 1000.0
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Order in which chord tones are stepped through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArpPattern {
    #[default]
    Up,
    Down,
    UpDown,
    Random,
}

/// Step length of the arpeggiator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArpRate {
    #[serde(rename = "1/4")]
    Quarter,
    #[default]
    #[serde(rename = "1/8")]
    Eighth,
    #[serde(rename = "1/16")]
    Sixteenth,
    #[serde(rename = "1/32")]
    ThirtySecond,
}

impl ArpRate {
    /// Step length in beats
    pub fn beats(&self) -> f64 {
        match self {
            ArpRate::Quarter => 1.0,
            ArpRate::Eighth => 0.5,
            ArpRate::Sixteenth => 0.25,
            ArpRate::ThirtySecond => 0.125,
        }
    }
}

/// Arpeggiator settings for an instrument track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpeggiatorParams {
    pub enabled: bool,
    pub pattern: ArpPattern,
    pub rate: ArpRate,
    /// Number of octaves the chord is spread across, at least 1
    pub octaves: u8,
    /// Fraction of each step the note sounds for
    pub gate: f64,
    /// Keep stepping until the clip ends instead of the chord
    pub hold: bool,
}

impl Default for ArpeggiatorParams {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern: ArpPattern::Up,
            rate: ArpRate::Eighth,
            octaves: 1,
            gate: 0.8,
            hold: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_beats() {
        assert_eq!(ArpRate::Quarter.beats(), 1.0);
        assert_eq!(ArpRate::Eighth.beats(), 0.5);
        assert_eq!(ArpRate::Sixteenth.beats(), 0.25);
        assert_eq!(ArpRate::ThirtySecond.beats(), 0.125);
    }

    #[test]
    fn test_arp_params_from_json() {
        let params: ArpeggiatorParams =
            serde_json::from_str(r#"{ "pattern": "updown", "rate": "1/16", "octaves": 2 }"#).unwrap();
        assert_eq!(params.pattern, ArpPattern::UpDown);
        assert_eq!(params.rate, ArpRate::Sixteenth);
        assert_eq!(params.octaves, 2);
        assert!(params.enabled);
    }

    #[test]
    fn test_synth_times_are_non_negative() {
        let params = SynthParams {
            attack_ms: -5.0,
            release_ms: f32::NAN,
            ..SynthParams::default()
        };
        assert_eq!(params.attack_secs(), 0.0);
        assert_eq!(params.release_secs(), 0.0);
    }
}
