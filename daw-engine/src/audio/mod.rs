pub mod arpeggiator;
pub mod automation;
pub mod buffer;
pub mod cleanup;
pub mod clip;
pub mod clock;
pub mod context;
pub mod deferred;
pub mod effects;
pub mod engine;
pub mod envelope;
pub mod impulse;
pub mod instrument;
pub mod meter;
pub mod metronome;
pub mod midi;
pub mod nodes;
pub mod render;
pub mod routing;
pub mod scheduler;
pub mod track;

pub use arpeggiator::arpeggiate;
pub use automation::{AutomationPoint, CurveType, ParamTimeline};
pub use buffer::AudioBuffer;
pub use clip::{AudioClip, Clip, ClipId, MidiClip};
pub use clock::{TransportClock, TransportState};
pub use context::AudioContext;
pub use effects::{EqBand, EqParams, FilterType, ReverbParams};
pub use engine::AudioEngine;
pub use instrument::{ArpPattern, ArpRate, ArpeggiatorParams, SynthParams, Waveform};
pub use midi::Note;
pub use nodes::NodeId;
pub use render::{Renderer, DESTINATION};
pub use routing::RoutingTable;
pub use track::{Track, TrackId};
