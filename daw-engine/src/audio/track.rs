use super::clip::Clip;

/// Track ID type
pub type TrackId = u32;

/// Snapshot of one track as the editor sees it
///
/// The engine only reads these; every scheduling call takes the full list.
#[derive(Debug, Clone, Default)]
pub struct Track {
    pub id: TrackId,
    /// Linear volume, 0.0 = silence, 1.0 = unity gain
    pub volume: f32,
    pub muted: bool,
    pub soloed: bool,
    pub clips: Vec<Clip>,
}

impl Track {
    /// Create an empty track at unity volume
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            volume: 1.0,
            muted: false,
            soloed: false,
            clips: Vec::new(),
        }
    }

    /// Builder-style helper to attach a clip
    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.clips.push(clip);
        self
    }

    /// Check if this track should be audible given the global solo state
    pub fn is_active(&self, any_solo: bool) -> bool {
        !self.muted && (!any_solo || self.soloed)
    }

    /// Gain the track's bus should be driven to
    ///
    /// Mute always wins; while any track is soloed only soloed tracks pass.
    pub fn effective_gain(&self, any_solo: bool) -> f32 {
        if self.is_active(any_solo) {
            if self.volume.is_finite() {
                self.volume.clamp(0.0, 1.0)
            } else {
                0.0
            }
        } else {
            0.0
        }
    }
}

/// Whether any track in the snapshot is soloed
pub fn any_soloed(tracks: &[Track]) -> bool {
    tracks.iter().any(|t| t.soloed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: TrackId, volume: f32, muted: bool, soloed: bool) -> Track {
        Track {
            id,
            volume,
            muted,
            soloed,
            clips: Vec::new(),
        }
    }

    #[test]
    fn test_solo_silences_others() {
        let tracks = vec![track(1, 0.6, false, true), track(2, 0.9, false, false)];
        let any_solo = any_soloed(&tracks);

        assert!(any_solo);
        assert_eq!(tracks[0].effective_gain(any_solo), 0.6);
        assert_eq!(tracks[1].effective_gain(any_solo), 0.0);
    }

    #[test]
    fn test_mute_beats_solo() {
        let tracks = vec![track(1, 0.6, true, true), track(2, 0.9, false, true)];
        let any_solo = any_soloed(&tracks);

        assert_eq!(tracks[0].effective_gain(any_solo), 0.0);
        assert_eq!(tracks[1].effective_gain(any_solo), 0.9);
    }

    #[test]
    fn test_no_solo_uses_volume() {
        let tracks = vec![track(1, 1.5, false, false), track(2, 0.25, false, false)];
        let any_solo = any_soloed(&tracks);

        assert!(!any_solo);
        assert_eq!(tracks[0].effective_gain(any_solo), 1.0);
        assert_eq!(tracks[1].effective_gain(any_solo), 0.25);
    }
}
