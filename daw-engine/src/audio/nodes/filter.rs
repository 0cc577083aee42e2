use super::{AudioNode, RenderQuantum};
use crate::audio::effects::{EqBand, FilterType};
use crate::dsp::BiquadFilter;

/// One EQ band as a biquad stage
pub struct FilterNode {
    filter: BiquadFilter,
}

impl FilterNode {
    pub fn new(band: &EqBand, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let mut filter = BiquadFilter::new();
        let (freq, q, gain) = (band.frequency, band.q, band.gain_db);

        match band.filter_type {
            FilterType::Lowpass => filter.set_lowpass(freq, q, sr),
            FilterType::Highpass => filter.set_highpass(freq, q, sr),
            FilterType::Bandpass => filter.set_bandpass(freq, q, sr),
            FilterType::Lowshelf => filter.set_lowshelf(freq, gain, sr),
            FilterType::Highshelf => filter.set_highshelf(freq, gain, sr),
            FilterType::Peaking => filter.set_peaking(freq, q, gain, sr),
            FilterType::Notch => filter.set_notch(freq, q, sr),
            FilterType::Allpass => filter.set_allpass(freq, q, sr),
        }

        Self { filter }
    }
}

impl AudioNode for FilterNode {
    fn process(&mut self, input: &[f32], output: &mut [f32], _quantum: &RenderQuantum) {
        output.copy_from_slice(input);
        self.filter.process_stereo(output);
    }

    fn node_type(&self) -> &'static str {
        "Filter"
    }
}
