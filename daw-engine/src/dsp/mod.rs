pub mod biquad;
pub mod convolution;

pub use biquad::BiquadFilter;
pub use convolution::{Convolver, PARTITION_SIZE};
