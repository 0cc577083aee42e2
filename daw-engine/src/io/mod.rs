pub mod audio_file;
pub mod output;

pub use audio_file::{decode_audio_data, decode_file};
pub use output::{CpalOutput, HeadlessHandle, HeadlessOutput, OutputDriver};
