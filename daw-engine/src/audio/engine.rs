use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::arpeggiator::arpeggiate;
use super::cleanup::{CleanupAction, CleanupQueue};
use super::clip::Clip;
use super::clock::{TransportClock, TransportState};
use super::context::AudioContext;
use super::deferred::DeferredQueue;
use super::effects::{EqParams, ReverbParams};
use super::envelope::{NoteManager, NoteRequest};
use super::instrument::{ArpeggiatorParams, SynthParams};
use super::meter;
use super::metronome::MetronomeScheduler;
use super::midi::{note_to_frequency, sanitize_notes};
use super::nodes::{GainNode, NodeId};
use super::routing::RoutingTable;
use super::scheduler::{plan_audio_clip, plan_midi_clip, ClipScheduler};
use super::track::{any_soloed, Track, TrackId};
use crate::command::AudioEvent;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::io::{CpalOutput, HeadlessHandle, HeadlessOutput, OutputDriver};

/// Target of a bus parameter update made before warm-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusParamKey {
    TrackEq(TrackId),
    TrackReverb(TrackId),
    MasterEq,
    MasterReverb,
}

#[derive(Debug, Clone)]
enum BusParam {
    TrackEq(TrackId, EqParams),
    TrackReverb(TrackId, ReverbParams),
    MasterEq(EqParams),
    MasterReverb(ReverbParams),
}

impl BusParam {
    fn key(&self) -> BusParamKey {
        match self {
            BusParam::TrackEq(id, _) => BusParamKey::TrackEq(*id),
            BusParam::TrackReverb(id, _) => BusParamKey::TrackReverb(*id),
            BusParam::MasterEq(_) => BusParamKey::MasterEq,
            BusParam::MasterReverb(_) => BusParamKey::MasterReverb,
        }
    }
}

/// Everything that only exists while a rendering context is open
struct Session {
    ctx: AudioContext,
    routing: RoutingTable,
    notes: NoteManager,
    clips: ClipScheduler,
    metronome: MetronomeScheduler,
    /// Click players feed this, straight into the destination
    metronome_bus: NodeId,
    cleanup: CleanupQueue,
}

impl Session {
    fn apply(&mut self, param: BusParam) {
        let ctx = &mut self.ctx;
        match param {
            BusParam::TrackEq(id, eq) => self.routing.set_track_eq(ctx, id, eq),
            BusParam::TrackReverb(id, reverb) => self.routing.set_track_reverb(ctx, id, reverb),
            BusParam::MasterEq(eq) => self.routing.set_master_eq(ctx, eq),
            BusParam::MasterReverb(reverb) => self.routing.set_master_reverb(ctx, reverb),
        }
    }

    /// Remove every clip player and voice along with their cleanup deadlines
    fn stop_scheduled(&mut self) -> usize {
        let stopped = self.clips.stop_all(&mut self.ctx) + self.notes.stop_all(&mut self.ctx);
        self.cleanup.retain(|action| matches!(action, CleanupAction::Tick(_)));
        stopped
    }

    /// Silence everything scheduled: players, voices and pending clicks
    fn stop_playback(&mut self) {
        let stopped = self.stop_scheduled();
        self.metronome.reset(&mut self.ctx);
        if stopped > 0 {
            log::debug!("Stopped {} sources and notes", stopped);
        }
    }

    fn stop_track(&mut self, id: TrackId) {
        self.clips.stop_track(&mut self.ctx, id);
        self.notes.stop_track(&mut self.ctx, id);
    }

    /// Create routing for every track in the snapshot, apply mute/solo/volume
    /// and tear down tracks that are no longer there
    fn sync_tracks(&mut self, tracks: &[Track]) {
        let now = self.ctx.current_time();
        let any_solo = any_soloed(tracks);

        for track in tracks {
            let gain = track.effective_gain(any_solo);
            self.routing.ensure_track(&mut self.ctx, track.id, gain);
            self.routing.set_track_gain(&mut self.ctx, track.id, gain, now);
        }

        let present: HashSet<TrackId> = tracks.iter().map(|t| t.id).collect();
        let removed: Vec<TrackId> = self.routing.track_ids().filter(|id| !present.contains(id)).collect();
        for id in removed {
            self.stop_track(id);
            self.routing.teardown_track(&mut self.ctx, id);
        }
    }

    fn handle_event(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::SourceEnded(node) => {
                let _ = self.clips.source_ended(&mut self.ctx, node)
                    || self.notes.oscillator_ended(&mut self.ctx, node)
                    || self.metronome.release(&mut self.ctx, node);
            }
        }
    }

    fn run_cleanup(&mut self, now: f64) {
        while let Some(action) = self.cleanup.pop_due(now) {
            match action {
                CleanupAction::Note(id) => {
                    self.notes.release(&mut self.ctx, id);
                }
                CleanupAction::Source { track, node } => {
                    self.clips.release(&mut self.ctx, track, node);
                }
                CleanupAction::Tick(node) => {
                    self.metronome.release(&mut self.ctx, node);
                }
            }
        }
    }
}

/// Public control surface of the engine
///
/// All methods are called from one control thread. Rendering happens on the
/// output driver's thread; nothing here blocks on it.
pub struct AudioEngine {
    config: EngineConfig,
    output: Box<dyn OutputDriver>,
    session: Option<Session>,
    clock: TransportClock,
    bpm: f64,
    metronome_enabled: bool,
    synths: HashMap<TrackId, SynthParams>,
    arpeggiators: HashMap<TrackId, ArpeggiatorParams>,
    deferred: DeferredQueue<BusParamKey, BusParam>,
    /// Track ids of the last snapshot
    known_tracks: HashSet<TrackId>,
}

impl AudioEngine {
    /// Create an engine that will render through `output` once warmed up
    pub fn new(config: EngineConfig, output: Box<dyn OutputDriver>) -> Self {
        let bpm = if config.default_bpm.is_finite() && config.default_bpm > 0.0 {
            config.default_bpm
        } else {
            120.0
        };
        Self {
            config,
            output,
            session: None,
            clock: TransportClock::new(),
            bpm,
            metronome_enabled: false,
            synths: HashMap::new(),
            arpeggiators: HashMap::new(),
            deferred: DeferredQueue::new(),
            known_tracks: HashSet::new(),
        }
    }

    /// Engine on the default output device
    pub fn with_cpal(config: EngineConfig) -> Self {
        Self::new(config, Box::new(CpalOutput::new()))
    }

    /// Engine without a device; audio is pulled through the returned handle
    pub fn headless(config: EngineConfig) -> (Self, HeadlessHandle) {
        let output = HeadlessOutput::new(config.sample_rate);
        let handle = output.handle();
        (Self::new(config, Box::new(output)), handle)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the rendering context and start output
    ///
    /// Parameter changes made before this are applied now, once each.
    pub fn warm_up(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let sample_rate = self.output.sample_rate()?;
        let (mut ctx, renderer) = AudioContext::new(sample_rate, &self.config);
        let routing = RoutingTable::new(&mut ctx, &self.config);

        let metronome_bus = ctx.add_node(Box::new(GainNode::new(1.0)));
        let destination = ctx.destination();
        ctx.connect(metronome_bus, destination);

        let mut metronome = MetronomeScheduler::new(sample_rate, self.config.lookahead_secs);
        metronome.set_enabled(self.metronome_enabled);

        self.output.start(renderer)?;
        log::info!("Audio context running at {} Hz", sample_rate);

        let mut session = Session {
            ctx,
            routing,
            notes: NoteManager::new(self.config.cleanup_grace_secs),
            clips: ClipScheduler::new(),
            metronome,
            metronome_bus,
            cleanup: CleanupQueue::new(),
        };

        let deferred = self.deferred.drain();
        if !deferred.is_empty() {
            log::debug!("Applying {} parameter changes made before warm-up", deferred.len());
        }
        for (_, param) in deferred {
            session.apply(param);
        }

        self.session = Some(session);
        Ok(())
    }

    /// Resume output, creating the context first if needed
    pub fn resume(&mut self) -> Result<()> {
        if self.session.is_none() {
            return self.warm_up();
        }
        self.output.resume()
    }

    /// Stop output and drop the context with every node in it
    pub fn close(&mut self) {
        self.output.stop();
        if self.session.take().is_some() {
            log::info!("Audio context closed");
        }
        self.clock = TransportClock::new();
    }

    pub fn is_warm(&self) -> bool {
        self.session.is_some()
    }

    /// Audio-clock time, 0 before warm-up
    pub fn current_time(&self) -> f64 {
        self.session.as_ref().map(|s| s.ctx.current_time()).unwrap_or(0.0)
    }

    pub fn transport_state(&self) -> TransportState {
        self.clock.state()
    }

    /// Timeline position under the playhead right now
    pub fn playhead(&self) -> f64 {
        self.clock.timeline_at(self.current_time())
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// How often `poll` should be called
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(1))
    }

    /// Replace everything scheduled with the clips of `tracks` from `playhead` on
    ///
    /// Routing is created for new tracks and track gains are brought up to
    /// date even when the transport isn't playing; sources are only started
    /// while it is.
    pub fn schedule_all_clips_from_playhead(&mut self, tracks: &[Track], playhead: f64) {
        let Some(session) = self.session.as_mut() else {
            log::debug!("Ignoring schedule request before warm-up");
            return;
        };

        session.stop_scheduled();
        session.sync_tracks(tracks);
        self.known_tracks = tracks.iter().map(|t| t.id).collect();

        if !self.clock.is_playing() {
            return;
        }

        let now = session.ctx.current_time();
        let playhead = playhead.max(0.0);
        self.clock.seek(now, playhead);
        // The beat cursor belongs to the old anchor
        session.metronome.reset(&mut session.ctx);

        let grace = self.config.cleanup_grace_secs;
        let seconds_per_beat = 60.0 / self.bpm;
        let default_synth = SynthParams::default();

        for track in tracks {
            let input = match session.routing.track(track.id) {
                Some(routing) => routing.bus.input,
                None => continue,
            };

            for clip in &track.clips {
                match clip {
                    Clip::Audio(audio) => {
                        let Some(buffer) = audio.buffer.as_ref() else {
                            continue;
                        };
                        let Some(plan) = plan_audio_clip(audio, buffer.duration(), playhead, &self.clock, now)
                        else {
                            continue;
                        };
                        session.clips.schedule_audio(
                            &mut session.ctx,
                            &mut session.cleanup,
                            track.id,
                            input,
                            buffer.clone(),
                            plan,
                            grace,
                        );
                    }
                    Clip::Midi(midi) => {
                        let mut notes = sanitize_notes(&midi.notes);
                        if let Some(arp) = self.arpeggiators.get(&track.id).filter(|a| a.enabled) {
                            notes = arpeggiate(&notes, arp, midi.duration / seconds_per_beat);
                        }
                        let plans = plan_midi_clip(midi, &notes, self.bpm, playhead, &self.clock, now);
                        if plans.is_empty() {
                            continue;
                        }

                        // Track synth settings win over the clip's own
                        let synth = self.synths.get(&track.id);
                        let (waveform, note_gain, bus_gain) = match synth {
                            Some(params) => (params.waveform, 1.0, params.gain),
                            None => (midi.waveform, midi.gain, 1.0),
                        };
                        let envelope = synth.unwrap_or(&default_synth);

                        let output = session.routing.synth_output(&mut session.ctx, track.id, bus_gain);
                        session.routing.set_synth_gain(&mut session.ctx, track.id, bus_gain, now);

                        for plan in plans {
                            session.notes.start_note(
                                &mut session.ctx,
                                &mut session.cleanup,
                                NoteRequest {
                                    track: track.id,
                                    output,
                                    frequency: note_to_frequency(plan.pitch),
                                    waveform,
                                    velocity: plan.velocity as f32 / 127.0,
                                    gain: note_gain,
                                    start: plan.clock_start,
                                    end: plan.clock_end,
                                    attack: envelope.attack_secs(),
                                    release: envelope.release_secs(),
                                },
                            );
                        }
                    }
                }
            }
        }

        log::debug!(
            "Scheduled {} sources and {} notes from {:.3}s",
            session.clips.len(),
            session.notes.len(),
            playhead
        );
    }

    /// Bring mute/solo/volume up to date without rescheduling anything
    pub fn update_track_gains(&mut self, tracks: &[Track]) {
        if let Some(session) = self.session.as_mut() {
            session.sync_tracks(tracks);
        }
        self.forget_removed_tracks(tracks);
    }

    /// Drop queued parameters of tracks that were in the last snapshot and
    /// aren't any more; ids never seen keep theirs until the track appears
    fn forget_removed_tracks(&mut self, tracks: &[Track]) {
        let present: HashSet<TrackId> = tracks.iter().map(|t| t.id).collect();
        let removed: HashSet<TrackId> = self.known_tracks.difference(&present).copied().collect();
        if !removed.is_empty() {
            self.deferred.remove_where(|key| match key {
                BusParamKey::TrackEq(id) | BusParamKey::TrackReverb(id) => removed.contains(id),
                BusParamKey::MasterEq | BusParamKey::MasterReverb => false,
            });
        }
        self.known_tracks = present;
    }

    fn set_bus_param(&mut self, param: BusParam) {
        match self.session.as_mut() {
            Some(session) => session.apply(param),
            None => self.deferred.push(param.key(), param),
        }
    }

    pub fn set_track_eq(&mut self, id: TrackId, eq: EqParams) {
        self.set_bus_param(BusParam::TrackEq(id, eq));
    }

    pub fn set_master_eq(&mut self, eq: EqParams) {
        self.set_bus_param(BusParam::MasterEq(eq));
    }

    pub fn set_track_reverb(&mut self, id: TrackId, reverb: ReverbParams) {
        self.set_bus_param(BusParam::TrackReverb(id, reverb));
    }

    pub fn set_master_reverb(&mut self, reverb: ReverbParams) {
        self.set_bus_param(BusParam::MasterReverb(reverb));
    }

    /// Set a track's synth; sounding and scheduled notes follow without restarting
    pub fn set_track_synth(&mut self, id: TrackId, params: SynthParams) {
        if let Some(session) = self.session.as_mut() {
            let now = session.ctx.current_time();
            session.routing.set_synth_gain(&mut session.ctx, id, params.gain, now);
            let retargeted = session.notes.retarget_track(&mut session.ctx, id, &params, 1.0, now);
            if retargeted > 0 {
                log::debug!("Retargeted {} notes on track {}", retargeted, id);
            }
        }
        self.synths.insert(id, params);
    }

    /// Used the next time the track's MIDI clips are scheduled
    pub fn set_track_arpeggiator(&mut self, id: TrackId, params: ArpeggiatorParams) {
        self.arpeggiators.insert(id, params);
    }

    pub fn clear_track_arpeggiator(&mut self, id: TrackId) {
        self.arpeggiators.remove(&id);
    }

    /// Change the tempo; non-positive or non-finite values are ignored
    pub fn set_bpm(&mut self, bpm: f64) {
        if !(bpm.is_finite() && bpm > 0.0) {
            log::warn!("Ignoring invalid tempo {}", bpm);
            return;
        }
        if bpm == self.bpm {
            return;
        }
        self.bpm = bpm;
        if let Some(session) = self.session.as_mut() {
            session.metronome.reset(&mut session.ctx);
        }
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.metronome_enabled = enabled;
        if let Some(session) = self.session.as_mut() {
            session.metronome.set_enabled(enabled);
            if !enabled {
                session.metronome.reset(&mut session.ctx);
            }
        }
    }

    pub fn metronome_enabled(&self) -> bool {
        self.metronome_enabled
    }

    /// Start the transport with `playhead` under the playhead, warming up if needed
    pub fn on_transport_start(&mut self, playhead: f64) -> Result<()> {
        self.warm_up()?;
        if let Some(session) = self.session.as_mut() {
            let now = session.ctx.current_time();
            self.clock.start(now, playhead);
            session.metronome.reset(&mut session.ctx);
        }
        self.poll();
        Ok(())
    }

    /// Freeze the playhead and silence scheduled audio; routing stays up
    pub fn on_transport_pause(&mut self) {
        let now = self.current_time();
        self.clock.pause(now);
        if let Some(session) = self.session.as_mut() {
            session.stop_playback();
        }
    }

    /// Silence everything and return to the start of the timeline
    pub fn on_transport_stop(&mut self) {
        let now = self.current_time();
        self.clock.stop(now);
        if let Some(session) = self.session.as_mut() {
            session.stop_playback();
        }
    }

    /// Move the playhead; the metronome follows from the new position
    pub fn on_transport_seek(&mut self, playhead: f64) {
        let now = self.current_time();
        self.clock.seek(now, playhead);
        if let Some(session) = self.session.as_mut() {
            session.metronome.reset(&mut session.ctx);
        }
    }

    /// Meter level of a track, 0 for unknown tracks
    pub fn track_level(&self, id: TrackId) -> f32 {
        let tap = self.session.as_ref().and_then(|s| s.routing.tap(id));
        meter::level(tap.map(Arc::as_ref))
    }

    pub fn track_levels_stereo(&self, id: TrackId) -> (f32, f32) {
        let tap = self.session.as_ref().and_then(|s| s.routing.tap(id));
        meter::levels_stereo(tap.map(Arc::as_ref))
    }

    pub fn master_level(&self) -> f32 {
        let tap = self.session.as_ref().map(|s| &s.routing.master().tap);
        meter::level(tap.map(Arc::as_ref))
    }

    /// The coarse scheduling tick
    ///
    /// Collects renderer events and retired nodes, releases sources and notes
    /// whose cleanup deadline has passed and schedules metronome clicks up to
    /// the lookahead horizon. Call every `poll_interval`.
    pub fn poll(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        for event in session.ctx.poll_events() {
            session.handle_event(event);
        }

        let now = session.ctx.current_time();
        session.run_cleanup(now);

        session.metronome.poll(
            &mut session.ctx,
            session.metronome_bus,
            &self.clock,
            self.bpm,
            &mut session.cleanup,
            self.config.cleanup_grace_secs,
        );
    }

    /// Routing table, once warmed up
    pub fn routing(&self) -> Option<&RoutingTable> {
        self.session.as_ref().map(|s| &s.routing)
    }

    /// Live nodes in the graph, excluding the destination
    pub fn node_count(&self) -> usize {
        self.session.as_ref().map(|s| s.ctx.node_count()).unwrap_or(0)
    }

    /// Buffer players currently scheduled
    pub fn source_count(&self) -> usize {
        self.session.as_ref().map(|s| s.clips.len()).unwrap_or(0)
    }

    /// Synth voices currently registered
    pub fn note_count(&self) -> usize {
        self.session.as_ref().map(|s| s.notes.len()).unwrap_or(0)
    }

    /// Amplitude of every registered voice of a track at the current time
    pub fn note_amplitudes(&self, id: TrackId) -> Vec<f32> {
        match self.session.as_ref() {
            Some(session) => {
                let now = session.ctx.current_time();
                session.notes.notes_for_track(id).map(|n| n.amplitude_at(now)).collect()
            }
            None => Vec::new(),
        }
    }

    /// Metronome clicks scheduled and not yet cleaned up
    pub fn pending_clicks(&self) -> usize {
        self.session.as_ref().map(|s| s.metronome.pending()).unwrap_or(0)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.output.stop();
    }
}
