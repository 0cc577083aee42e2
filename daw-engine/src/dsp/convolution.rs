use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

/// Block size of the partitioned convolver, equal to the render quantum
pub const PARTITION_SIZE: usize = 128;
const FFT_SIZE: usize = PARTITION_SIZE * 2;
const BINS: usize = FFT_SIZE / 2 + 1;

/// One channel of uniformly partitioned overlap-save convolution
struct ConvolutionChannel {
    /// IR partition spectra
    partitions: Vec<Vec<Complex<f32>>>,
    /// Frequency delay line of past input block spectra, newest at `fdl_pos`
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    /// Previous and current input block
    history: Vec<f32>,
}

impl ConvolutionChannel {
    fn new(ir: &[f32], fft: &Arc<dyn RealToComplex<f32>>, scratch: &mut [Complex<f32>]) -> Self {
        let count = ir.len().div_ceil(PARTITION_SIZE).max(1);
        let mut padded = vec![0.0f32; FFT_SIZE];
        let mut partitions = Vec::with_capacity(count);

        for index in 0..count {
            padded.fill(0.0);
            let start = index * PARTITION_SIZE;
            let end = (start + PARTITION_SIZE).min(ir.len());
            if start < end {
                padded[..end - start].copy_from_slice(&ir[start..end]);
            }
            let mut spectrum = vec![Complex::new(0.0, 0.0); BINS];
            if fft
                .process_with_scratch(&mut padded, &mut spectrum, scratch)
                .is_err()
            {
                spectrum.fill(Complex::new(0.0, 0.0));
            }
            partitions.push(spectrum);
        }

        Self {
            fdl: vec![vec![Complex::new(0.0, 0.0); BINS]; count],
            partitions,
            fdl_pos: 0,
            history: vec![0.0; FFT_SIZE],
        }
    }

    fn reset(&mut self) {
        for slot in &mut self.fdl {
            slot.fill(Complex::new(0.0, 0.0));
        }
        self.history.fill(0.0);
        self.fdl_pos = 0;
    }
}

/// Stereo partitioned FFT convolver
///
/// Input is fed one `PARTITION_SIZE` block at a time. Left input is convolved
/// with the first impulse channel and right input with the second; a mono
/// impulse is used for both.
pub struct Convolver {
    channels: [ConvolutionChannel; 2],
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    time_buf: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
}

impl Convolver {
    /// Build a convolver for an impulse given as one or two channel slices
    pub fn new(left: &[f32], right: &[f32]) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(FFT_SIZE);
        let fft_inverse = planner.plan_fft_inverse(FFT_SIZE);

        let mut forward_scratch = fft_forward.make_scratch_vec();
        let inverse_scratch = fft_inverse.make_scratch_vec();
        let right = if right.is_empty() { left } else { right };
        let channels = [
            ConvolutionChannel::new(left, &fft_forward, &mut forward_scratch),
            ConvolutionChannel::new(right, &fft_forward, &mut forward_scratch),
        ];

        Self {
            channels,
            time_buf: fft_forward.make_input_vec(),
            spectrum: fft_forward.make_output_vec(),
            accum: fft_forward.make_output_vec(),
            fft_forward,
            fft_inverse,
            forward_scratch,
            inverse_scratch,
        }
    }

    /// Number of partitions per channel
    pub fn partition_count(&self) -> usize {
        self.channels[0].partitions.len()
    }

    /// Convolve one block of interleaved stereo input into `output`
    ///
    /// Both slices must hold `PARTITION_SIZE` frames. A failed transform
    /// produces silence for that block.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let frames = (input.len() / 2).min(output.len() / 2).min(PARTITION_SIZE);
        let norm = 1.0 / FFT_SIZE as f32;

        for (ch, channel) in self.channels.iter_mut().enumerate() {
            // Slide the input window: [previous block | current block]
            channel.history.copy_within(PARTITION_SIZE.., 0);
            for i in 0..PARTITION_SIZE {
                channel.history[PARTITION_SIZE + i] =
                    if i < frames { input[i * 2 + ch] } else { 0.0 };
            }

            self.time_buf.copy_from_slice(&channel.history);
            if self
                .fft_forward
                .process_with_scratch(&mut self.time_buf, &mut self.spectrum, &mut self.forward_scratch)
                .is_err()
            {
                write_silence(output, ch, frames);
                continue;
            }

            let slots = channel.fdl.len();
            channel.fdl_pos = (channel.fdl_pos + 1) % slots;
            channel.fdl[channel.fdl_pos].copy_from_slice(&self.spectrum);

            self.accum.fill(Complex::new(0.0, 0.0));
            for (k, partition) in channel.partitions.iter().enumerate() {
                let slot = &channel.fdl[(channel.fdl_pos + slots - k) % slots];
                for ((acc, x), h) in self.accum.iter_mut().zip(slot).zip(partition) {
                    *acc += x * h;
                }
            }

            // The inverse transform rejects imaginary parts at DC and Nyquist
            self.accum[0].im = 0.0;
            self.accum[BINS - 1].im = 0.0;

            if self
                .fft_inverse
                .process_with_scratch(&mut self.accum, &mut self.time_buf, &mut self.inverse_scratch)
                .is_err()
            {
                write_silence(output, ch, frames);
                continue;
            }

            for i in 0..frames {
                output[i * 2 + ch] = self.time_buf[PARTITION_SIZE + i] * norm;
            }
        }
    }

    /// Clear all input history
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }
}

fn write_silence(output: &mut [f32], ch: usize, frames: usize) {
    for i in 0..frames {
        output[i * 2 + ch] = 0.0;
    }
}
