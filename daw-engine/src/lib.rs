// DAW Engine - clip scheduling and mixing
//
// Turns a snapshot of tracks, clips and effect settings into timed, routed
// audio. A control-side context builds node graphs and sends them over
// lock-free queues to a renderer running on the output thread.
// Uses cpal for audio output and symphonia for decoding.

pub mod audio;
pub mod command;
pub mod config;
pub mod dsp;
pub mod error;
pub mod io;

// Re-export commonly used types
pub use audio::{
    AudioBuffer, AudioClip, AudioEngine, Clip, ClipId, EqBand, EqParams, FilterType, MidiClip, Note,
    ReverbParams, SynthParams, Track, TrackId, Waveform,
};
pub use audio::{ArpPattern, ArpRate, ArpeggiatorParams};
pub use command::{AudioEvent, Command};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use io::{decode_audio_data, decode_file, HeadlessHandle};
