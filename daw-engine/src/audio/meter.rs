//! Level readback for track and master buses
//!
//! Analysers publish raw RMS per channel; these helpers turn that into the
//! 0..1 meter values the UI draws.

use super::nodes::LevelTap;

/// Square-root companding so quiet signals still move the meter
pub fn compand(rms: f32) -> f32 {
    if rms.is_finite() && rms > 0.0 {
        rms.sqrt().clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Combined RMS of both channels
fn mono_rms(left: f32, right: f32) -> f32 {
    ((left * left + right * right) * 0.5).sqrt()
}

/// Mono meter level of a bus, 0 when there's no tap
pub fn level(tap: Option<&LevelTap>) -> f32 {
    match tap {
        Some(tap) => {
            let (left, right) = tap.load();
            compand(mono_rms(left, right))
        }
        None => 0.0,
    }
}

/// Per-channel meter levels
///
/// Without a tap both channels report the mono value.
pub fn levels_stereo(tap: Option<&LevelTap>) -> (f32, f32) {
    match tap {
        Some(tap) => {
            let (left, right) = tap.load();
            (compand(left), compand(right))
        }
        None => {
            let mono = level(None);
            (mono, mono)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compand_curve() {
        assert_eq!(compand(0.0), 0.0);
        assert!((compand(0.25) - 0.5).abs() < 1e-6);
        assert_eq!(compand(4.0), 1.0);
        assert_eq!(compand(f32::NAN), 0.0);
        assert_eq!(compand(-1.0), 0.0);
    }

    #[test]
    fn test_levels_from_tap() {
        let tap = LevelTap::new();
        tap.store(0.25, 0.0);

        let (left, right) = levels_stereo(Some(&tap));
        assert!((left - 0.5).abs() < 1e-6);
        assert_eq!(right, 0.0);

        let mono = level(Some(&tap));
        assert!((mono - compand(0.25 / 2.0_f32.sqrt())).abs() < 1e-6);
    }

    #[test]
    fn test_missing_tap_reads_zero() {
        assert_eq!(level(None), 0.0);
        assert_eq!(levels_stereo(None), (0.0, 0.0));
    }
}
