use serde::{Deserialize, Serialize};

/// Biquad response of one EQ band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Lowshelf,
    Highshelf,
    Peaking,
    Notch,
    Allpass,
}

impl FilterType {
    /// Only peaking and shelf filters respond to `gain_db`
    pub fn uses_gain(&self) -> bool {
        matches!(self, FilterType::Peaking | FilterType::Lowshelf | FilterType::Highshelf)
    }
}

/// One band of a parametric EQ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqBand {
    pub filter_type: FilterType,
    pub frequency: f32,
    pub gain_db: f32,
    pub q: f32,
    pub enabled: bool,
}

impl Default for EqBand {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Peaking,
            frequency: 1000.0,
            gain_db: 0.0,
            q: 1.0,
            enabled: true,
        }
    }
}

/// EQ settings for a track or the master bus
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EqParams {
    pub enabled: bool,
    /// Bands in processing order
    pub bands: Vec<EqBand>,
}

impl EqParams {
    /// Bands that will actually be instantiated
    pub fn active_bands(&self) -> impl Iterator<Item = &EqBand> {
        self.bands.iter().filter(move |band| self.enabled && band.enabled)
    }
}

/// Convolution reverb settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParams {
    pub enabled: bool,
    /// Wet level 0..1; the dry path gets `1 - wet`
    pub wet: f32,
    pub decay_secs: f32,
    pub pre_delay_ms: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            enabled: false,
            wet: 0.3,
            decay_secs: 2.0,
            pre_delay_ms: 20.0,
        }
    }
}

impl ReverbParams {
    pub fn wet(&self) -> f32 {
        if self.wet.is_finite() {
            self.wet.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn dry(&self) -> f32 {
        1.0 - self.wet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_bands_respect_both_flags() {
        let mut eq = EqParams {
            enabled: true,
            bands: vec![
                EqBand::default(),
                EqBand {
                    enabled: false,
                    ..EqBand::default()
                },
                EqBand {
                    filter_type: FilterType::Highpass,
                    ..EqBand::default()
                },
            ],
        };
        assert_eq!(eq.active_bands().count(), 2);

        eq.enabled = false;
        assert_eq!(eq.active_bands().count(), 0);
    }

    #[test]
    fn test_params_from_json() {
        let eq: EqParams = serde_json::from_str(
            r#"{ "enabled": true, "bands": [{ "filter_type": "lowshelf", "gain_db": 3.0 }] }"#,
        )
        .unwrap();
        assert_eq!(eq.bands[0].filter_type, FilterType::Lowshelf);
        assert_eq!(eq.bands[0].frequency, 1000.0);

        let reverb = ReverbParams {
            wet: 1.7,
            ..ReverbParams::default()
        };
        assert_eq!(reverb.wet(), 1.0);
        assert_eq!(reverb.dry(), 0.0);
    }
}
