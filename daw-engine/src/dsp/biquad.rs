use std::f32::consts::{PI, SQRT_2};

/// Biquad filter implementation (2-pole IIR filter)
///
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
///
/// Coefficients follow the RBJ audio EQ cookbook. Shelves use a fixed slope of 1.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    // Filter coefficients
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,

    // Transposed direct form II state, one slot per channel
    z1: [f32; 2],
    z2: [f32; 2],
}

/// Normalized angular frequency and its sin/cos, with the cutoff kept inside (0, nyquist)
fn omega(frequency: f32, sample_rate: f32) -> (f32, f32) {
    let nyquist = sample_rate * 0.5;
    let frequency = frequency.clamp(1.0, nyquist * 0.999);
    let w = 2.0 * PI * frequency / sample_rate;
    (w.sin(), w.cos())
}

fn safe_q(q: f32) -> f32 {
    if q.is_finite() {
        q.max(1e-4)
    } else {
        0.707
    }
}

impl BiquadFilter {
    /// Create a new biquad filter with unity gain (pass-through)
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: [0.0; 2],
            z2: [0.0; 2],
        }
    }

    /// Create a lowpass filter
    ///
    /// # Arguments
    /// * `frequency` - Cutoff frequency in Hz
    /// * `q` - Quality factor (resonance), typically 0.707 for Butterworth
    /// * `sample_rate` - Sample rate in Hz
    pub fn lowpass(frequency: f32, q: f32, sample_rate: f32) -> Self {
        let mut filter = Self::new();
        filter.set_lowpass(frequency, q, sample_rate);
        filter
    }

    fn normalize(&mut self, b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) {
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Set coefficients for a lowpass filter
    pub fn set_lowpass(&mut self, frequency: f32, q: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let alpha = sin_omega / (2.0 * safe_q(q));

        self.normalize(
            (1.0 - cos_omega) / 2.0,
            1.0 - cos_omega,
            (1.0 - cos_omega) / 2.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        );
    }

    /// Set coefficients for a highpass filter
    pub fn set_highpass(&mut self, frequency: f32, q: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let alpha = sin_omega / (2.0 * safe_q(q));

        self.normalize(
            (1.0 + cos_omega) / 2.0,
            -(1.0 + cos_omega),
            (1.0 + cos_omega) / 2.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        );
    }

    /// Set coefficients for a bandpass filter (0 dB peak gain)
    pub fn set_bandpass(&mut self, frequency: f32, q: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let alpha = sin_omega / (2.0 * safe_q(q));

        self.normalize(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha);
    }

    /// Set coefficients for a notch filter
    pub fn set_notch(&mut self, frequency: f32, q: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let alpha = sin_omega / (2.0 * safe_q(q));

        self.normalize(
            1.0,
            -2.0 * cos_omega,
            1.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        );
    }

    /// Set coefficients for an allpass filter
    pub fn set_allpass(&mut self, frequency: f32, q: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let alpha = sin_omega / (2.0 * safe_q(q));

        self.normalize(
            1.0 - alpha,
            -2.0 * cos_omega,
            1.0 + alpha,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        );
    }

    /// Set coefficients for a peaking EQ filter
    pub fn set_peaking(&mut self, frequency: f32, q: f32, gain_db: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let a_gain = 10.0_f32.powf(gain_db / 40.0);
        let alpha = sin_omega / (2.0 * safe_q(q));

        self.normalize(
            1.0 + alpha * a_gain,
            -2.0 * cos_omega,
            1.0 - alpha * a_gain,
            1.0 + alpha / a_gain,
            -2.0 * cos_omega,
            1.0 - alpha / a_gain,
        );
    }

    /// Set coefficients for a low shelf
    pub fn set_lowshelf(&mut self, frequency: f32, gain_db: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * (sin_omega / 2.0 * SQRT_2);

        self.normalize(
            a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
            a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
            (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha,
        );
    }

    /// Set coefficients for a high shelf
    pub fn set_highshelf(&mut self, frequency: f32, gain_db: f32, sample_rate: f32) {
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * (sin_omega / 2.0 * SQRT_2);

        self.normalize(
            a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega),
            a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_omega),
            (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha,
        );
    }

    /// Process a single sample
    ///
    /// # Arguments
    /// * `input` - Input sample
    /// * `channel` - Channel index (0 or 1)
    #[inline]
    pub fn process_sample(&mut self, input: f32, channel: usize) -> f32 {
        let channel = channel.min(1);

        let output = self.b0 * input + self.z1[channel];
        self.z1[channel] = self.b1 * input - self.a1 * output + self.z2[channel];
        self.z2[channel] = self.b2 * input - self.a2 * output;

        output
    }

    /// Process a buffer of interleaved stereo samples in place
    pub fn process_stereo(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            frame[0] = self.process_sample(frame[0], 0);
            frame[1] = self.process_sample(frame[1], 1);
        }
    }

    /// Reset filter state (clear delay lines)
    pub fn reset(&mut self) {
        self.z1 = [0.0; 2];
        self.z2 = [0.0; 2];
    }
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new()
    }
}
