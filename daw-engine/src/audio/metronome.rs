use std::sync::Arc;

use super::buffer::AudioBuffer;
use super::cleanup::{CleanupAction, CleanupQueue};
use super::clock::TransportClock;
use super::context::AudioContext;
use super::nodes::{BufferSourceNode, NodeId};

/// Beats per bar; the first beat of each bar gets the accented click
const BEATS_PER_BAR: i64 = 4;

/// Keeps float error from skipping a beat that lands exactly on the playhead
const BEAT_EPSILON: f64 = 1e-9;

/// Generate a woodblock-style click: two sines with a squared linear decay
fn woodblock(sample_rate: u32, freq1: f32, freq2: f32, level: f32) -> Vec<f32> {
    let click_duration_ms = 10.0;
    let click_samples = ((sample_rate as f32 * click_duration_ms) / 1000.0) as usize;

    (0..click_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = 1.0 - (i as f32 / click_samples as f32);
            let envelope = envelope * envelope;

            let sample = 0.3 * (2.0 * std::f32::consts::PI * freq1 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * freq2 * t).sin();

            // A bit of noise for the attack transient
            let noise = (i as f32 * 0.1).sin() * 0.1;

            (sample + noise) * envelope * level
        })
        .collect()
}

/// Accent (1200 + 2400 Hz) and normal (800 + 1600 Hz) clicks
pub fn generate_clicks(sample_rate: u32) -> (AudioBuffer, AudioBuffer) {
    let high = woodblock(sample_rate, 1200.0, 2400.0, 0.5);
    let low = woodblock(sample_rate, 800.0, 1600.0, 0.4);
    (
        AudioBuffer::from_mono(&high, sample_rate),
        AudioBuffer::from_mono(&low, sample_rate),
    )
}

/// A beat the scheduler has committed to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub beat: i64,
    /// Audio-clock time of the click
    pub time: f64,
    pub accent: bool,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledTick {
    node: NodeId,
    time: f64,
}

/// Lookahead click scheduler
///
/// Each poll commits every beat whose click falls before `now + lookahead`.
/// The cursor only moves forward, so overlapping polls never schedule a beat
/// twice; anything that moves the timeline resets it.
pub struct MetronomeScheduler {
    enabled: bool,
    lookahead: f64,
    next_beat: Option<i64>,
    scheduled: Vec<ScheduledTick>,
    high_click: Arc<AudioBuffer>,
    low_click: Arc<AudioBuffer>,
}

impl MetronomeScheduler {
    pub fn new(sample_rate: u32, lookahead: f64) -> Self {
        let (high, low) = generate_clicks(sample_rate);
        Self {
            enabled: false,
            lookahead: lookahead.max(0.0),
            next_beat: None,
            scheduled: Vec::new(),
            high_click: Arc::new(high),
            low_click: Arc::new(low),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Click nodes that are scheduled and not yet cleaned up
    pub fn pending(&self) -> usize {
        self.scheduled.len()
    }

    /// Beats due before the lookahead horizon, advancing the cursor past them
    pub fn due_ticks(&mut self, clock: &TransportClock, bpm: f64, now: f64) -> Vec<Tick> {
        if !self.enabled || !clock.is_playing() || !(bpm > 0.0) {
            return Vec::new();
        }
        let seconds_per_beat = 60.0 / bpm;
        let horizon = now + self.lookahead;

        let mut beat = match self.next_beat {
            Some(beat) => beat,
            None => {
                let position = clock.timeline_at(now);
                (position / seconds_per_beat - BEAT_EPSILON).ceil().max(0.0) as i64
            }
        };

        let mut ticks = Vec::new();
        loop {
            let time = clock.timeline_to_clock(beat as f64 * seconds_per_beat);
            if time >= horizon {
                break;
            }
            ticks.push(Tick {
                beat,
                time,
                accent: beat % BEATS_PER_BAR == 0,
            });
            beat += 1;
        }
        self.next_beat = Some(beat);
        ticks
    }

    /// Schedule due clicks into `output` and queue their cleanup
    pub fn poll(
        &mut self,
        ctx: &mut AudioContext,
        output: NodeId,
        clock: &TransportClock,
        bpm: f64,
        cleanup: &mut CleanupQueue,
        grace: f64,
    ) -> usize {
        let now = ctx.current_time();
        let ticks = self.due_ticks(clock, bpm, now);

        for tick in &ticks {
            let click = if tick.accent { &self.high_click } else { &self.low_click };
            let duration = click.duration();
            let node = ctx.add_node(Box::new(BufferSourceNode::new(
                click.clone(),
                tick.time,
                0.0,
                duration,
                ctx.sample_rate(),
            )));
            ctx.connect(node, output);
            self.scheduled.push(ScheduledTick { node, time: tick.time });
            cleanup.push(tick.time + duration + grace, CleanupAction::Tick(node));
        }
        ticks.len()
    }

    /// Remove a click node once it has played
    pub fn release(&mut self, ctx: &mut AudioContext, node: NodeId) -> bool {
        match self.scheduled.iter().position(|t| t.node == node) {
            Some(idx) => {
                self.scheduled.swap_remove(idx);
                ctx.remove_node(node);
                true
            }
            None => false,
        }
    }

    /// Forget the cursor and drop clicks that haven't sounded yet
    pub fn reset(&mut self, ctx: &mut AudioContext) {
        let now = ctx.current_time();
        self.next_beat = None;
        self.scheduled.retain(|tick| {
            if tick.time >= now {
                ctx.remove_node(tick.node);
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn playing_from(epoch_clock: f64, timeline: f64) -> TransportClock {
        let mut clock = TransportClock::new();
        clock.start(epoch_clock, timeline);
        clock
    }

    #[test]
    fn test_ticks_across_polls_have_no_gaps_or_duplicates() {
        let mut metronome = MetronomeScheduler::new(48000, 0.2);
        metronome.set_enabled(true);
        let clock = playing_from(0.0, 0.0);

        let mut ticks = Vec::new();
        let mut now = 0.0;
        while now < 3.0 {
            ticks.extend(metronome.due_ticks(&clock, 120.0, now));
            now += 0.025;
        }

        let times: Vec<f64> = ticks.iter().map(|t| t.time).collect();
        let expected: Vec<f64> = (0..7).map(|i| i as f64 * 0.5).collect();
        assert_eq!(times, expected);
        assert_eq!(ticks.iter().filter(|t| t.accent).count(), 2);
        assert!(ticks[0].accent && ticks[4].accent);
    }

    #[test]
    fn test_first_beat_from_mid_timeline() {
        let mut metronome = MetronomeScheduler::new(48000, 0.2);
        metronome.set_enabled(true);
        // Playhead at 1.2s on the timeline, clock at 10s: next beat is 1.5 (beat 3)
        let clock = playing_from(10.0, 1.2);

        assert!(metronome.due_ticks(&clock, 120.0, 10.0).is_empty());
        let ticks = metronome.due_ticks(&clock, 120.0, 10.15);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].beat, 3);
        assert!((ticks[0].time - 10.3).abs() < 1e-9);
    }

    #[test]
    fn test_silent_when_disabled_or_stopped() {
        let mut metronome = MetronomeScheduler::new(48000, 0.2);
        let clock = playing_from(0.0, 0.0);
        assert!(metronome.due_ticks(&clock, 120.0, 0.0).is_empty());

        metronome.set_enabled(true);
        let stopped = TransportClock::new();
        assert!(metronome.due_ticks(&stopped, 120.0, 0.0).is_empty());
        assert!(metronome.due_ticks(&clock, 0.0, 0.0).is_empty());
    }

    #[test]
    fn test_reset_drops_future_clicks() {
        let (mut ctx, mut renderer) = AudioContext::new(48000, &EngineConfig::default());
        let out = ctx.destination();
        let mut cleanup = CleanupQueue::new();
        let mut metronome = MetronomeScheduler::new(48000, 1.2);
        metronome.set_enabled(true);
        let clock = playing_from(0.0, 0.0);

        // Beats at 0.0, 0.5 and 1.0 fall inside the horizon
        assert_eq!(metronome.poll(&mut ctx, out, &clock, 120.0, &mut cleanup, 0.05), 3);
        assert_eq!(ctx.upstream(out).len(), 3);

        // Past the first click, so it has started and stays
        renderer.render(&mut vec![0.0; 2 * 256]);
        metronome.reset(&mut ctx);

        assert_eq!(metronome.pending(), 1);
        assert_eq!(ctx.upstream(out).len(), 1);

        // A fresh cursor picks up at the next beat
        let ticks = metronome.due_ticks(&clock, 120.0, ctx.current_time());
        let beats: Vec<i64> = ticks.iter().map(|t| t.beat).collect();
        assert_eq!(beats, vec![1, 2]);
    }

    #[test]
    fn test_click_shapes() {
        let (high, low) = generate_clicks(48000);
        assert_eq!(high.frames(), 480);
        assert_eq!(low.frames(), 480);
        let peak = |b: &AudioBuffer| b.data().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak(&high) > peak(&low));
    }
}
