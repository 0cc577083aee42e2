/// Transport state as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Maps timeline positions to audio-clock times
///
/// An epoch pairs an audio-clock time with the timeline position that was
/// under the playhead at that moment. It's captured on play and seek; while
/// playing, the timeline advances one second per clock second from there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportClock {
    epoch_clock: f64,
    epoch_timeline: f64,
    state: TransportState,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClock {
    pub fn new() -> Self {
        Self {
            epoch_clock: 0.0,
            epoch_timeline: 0.0,
            state: TransportState::Stopped,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Anchor `timeline` at clock time `now` and start running
    pub fn start(&mut self, now: f64, timeline: f64) {
        self.epoch_clock = now;
        self.epoch_timeline = timeline.max(0.0);
        self.state = TransportState::Playing;
    }

    /// Freeze the timeline where it is at `now`
    pub fn pause(&mut self, now: f64) {
        if self.state == TransportState::Playing {
            self.epoch_timeline = self.timeline_at(now);
        }
        self.epoch_clock = now;
        self.state = TransportState::Paused;
    }

    /// Return to the start of the timeline
    pub fn stop(&mut self, now: f64) {
        self.epoch_clock = now;
        self.epoch_timeline = 0.0;
        self.state = TransportState::Stopped;
    }

    /// Move the playhead without changing the transport state
    pub fn seek(&mut self, now: f64, timeline: f64) {
        self.epoch_clock = now;
        self.epoch_timeline = timeline.max(0.0);
    }

    /// Clock time at which `timeline` will be (or was) under the playhead;
    /// positions before the epoch map to the epoch itself
    pub fn timeline_to_clock(&self, timeline: f64) -> f64 {
        self.epoch_clock + (timeline - self.epoch_timeline).max(0.0)
    }

    /// Timeline position at clock time `clock`, never earlier than the epoch
    pub fn clock_to_timeline(&self, clock: f64) -> f64 {
        self.epoch_timeline + (clock - self.epoch_clock).max(0.0)
    }

    /// Playhead position at clock time `now`; frozen unless playing
    pub fn timeline_at(&self, now: f64) -> f64 {
        match self.state {
            TransportState::Playing => self.clock_to_timeline(now),
            TransportState::Paused | TransportState::Stopped => self.epoch_timeline,
        }
    }
}
