use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::context::AudioContext;
use super::effects::{EqBand, EqParams, ReverbParams};
use super::impulse::ImpulseCache;
use super::nodes::{
    AnalyserNode, ConvolverNode, DelayNode, FilterNode, GainNode, LevelTap, NodeId, NodeMessage,
};
use super::track::TrackId;
use crate::config::EngineConfig;

/// Parallel dry/wet reverb stage of a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverbBundle {
    pub dry: NodeId,
    pub pre_delay: NodeId,
    pub convolver: NodeId,
    pub wet: NodeId,
}

impl ReverbBundle {
    fn nodes(&self) -> [NodeId; 4] {
        [self.dry, self.pre_delay, self.convolver, self.wet]
    }
}

/// What a bus's insert section should contain for a set of parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChainPlan {
    /// Filters in signal order
    pub filters: Vec<EqBand>,
    pub reverb: Option<ReverbParams>,
}

impl ChainPlan {
    pub fn from_params(eq: &EqParams, reverb: &ReverbParams) -> Self {
        Self {
            filters: eq.active_bands().copied().collect(),
            reverb: reverb.enabled.then_some(*reverb),
        }
    }

    /// Nothing between input and gain
    pub fn is_bypass(&self) -> bool {
        self.filters.is_empty() && self.reverb.is_none()
    }
}

/// Node bundle of one bus: input → filters → [dry ‖ pre-delay → convolver → wet] → gain → analyser → output
#[derive(Debug)]
pub struct BusRouting {
    pub input: NodeId,
    pub chain: Vec<NodeId>,
    pub reverb: Option<ReverbBundle>,
    pub gain: NodeId,
    pub analyser: NodeId,
    pub tap: Arc<LevelTap>,
    pub eq: EqParams,
    pub reverb_params: ReverbParams,
    gain_target: f32,
}

impl BusRouting {
    fn new(ctx: &mut AudioContext, output: NodeId, meter_window: usize, gain: f32) -> Self {
        let tap = Arc::new(LevelTap::new());
        let input = ctx.add_node(Box::new(GainNode::new(1.0)));
        let gain_node = ctx.add_node(Box::new(GainNode::new(gain)));
        let analyser = ctx.add_node(Box::new(AnalyserNode::new(meter_window, tap.clone())));

        ctx.connect(input, gain_node);
        ctx.connect(gain_node, analyser);
        ctx.connect(analyser, output);

        Self {
            input,
            chain: Vec::new(),
            reverb: None,
            gain: gain_node,
            analyser,
            tap,
            eq: EqParams::default(),
            reverb_params: ReverbParams::default(),
            gain_target: gain,
        }
    }

    /// Replace the insert section with a freshly built one
    fn rebuild(&mut self, ctx: &mut AudioContext, impulses: &mut ImpulseCache) {
        let plan = ChainPlan::from_params(&self.eq, &self.reverb_params);
        let sample_rate = ctx.sample_rate();

        ctx.disconnect(self.input);
        for node in self.chain.drain(..) {
            ctx.remove_node(node);
        }
        if let Some(reverb) = self.reverb.take() {
            for node in reverb.nodes() {
                ctx.remove_node(node);
            }
        }

        let mut last = self.input;
        for band in &plan.filters {
            let filter = ctx.add_node(Box::new(FilterNode::new(band, sample_rate)));
            ctx.connect(last, filter);
            self.chain.push(filter);
            last = filter;
        }

        match plan.reverb {
            Some(params) => {
                let impulse = impulses.get(params.decay_secs);
                let bundle = ReverbBundle {
                    dry: ctx.add_node(Box::new(GainNode::new(params.dry()))),
                    pre_delay: ctx.add_node(Box::new(DelayNode::new(
                        params.pre_delay_ms as f64 / 1000.0,
                        sample_rate,
                    ))),
                    convolver: ctx.add_node(Box::new(ConvolverNode::new(&impulse))),
                    wet: ctx.add_node(Box::new(GainNode::new(params.wet()))),
                };
                ctx.connect(last, bundle.dry);
                ctx.connect(bundle.dry, self.gain);
                ctx.connect(last, bundle.pre_delay);
                ctx.connect(bundle.pre_delay, bundle.convolver);
                ctx.connect(bundle.convolver, bundle.wet);
                ctx.connect(bundle.wet, self.gain);
                self.reverb = Some(bundle);
            }
            None => ctx.connect(last, self.gain),
        }
    }

    /// Ramp the bus gain to `gain`, doing nothing if it's already the target
    fn set_gain(&mut self, ctx: &mut AudioContext, gain: f32, now: f64, smoothing: f64) {
        if gain == self.gain_target {
            return;
        }
        ctx.message(self.gain, NodeMessage::CancelScheduledValues(now));
        ctx.message(
            self.gain,
            NodeMessage::SetValueAtTime {
                value: self.gain_target,
                time: now,
            },
        );
        ctx.message(
            self.gain,
            NodeMessage::LinearRampToValueAtTime {
                value: gain,
                time: now + smoothing,
            },
        );
        self.gain_target = gain;
    }

    pub fn gain_target(&self) -> f32 {
        self.gain_target
    }

    /// Every node this bus owns
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![self.input];
        nodes.extend(&self.chain);
        if let Some(reverb) = &self.reverb {
            nodes.extend(reverb.nodes());
        }
        nodes.push(self.gain);
        nodes.push(self.analyser);
        nodes
    }

    fn teardown(&mut self, ctx: &mut AudioContext) {
        for node in self.nodes() {
            ctx.remove_node(node);
        }
        self.chain.clear();
        self.reverb = None;
    }
}

/// Routing of one track: its bus plus the synth voice summing point
#[derive(Debug)]
pub struct TrackRouting {
    pub bus: BusRouting,
    /// Gain every synth voice of the track feeds; created on first MIDI use
    pub synth_out: Option<NodeId>,
    synth_gain: f32,
}

/// Track id → node bundle, plus the master bus
pub struct RoutingTable {
    master: BusRouting,
    tracks: BTreeMap<TrackId, TrackRouting>,
    pending_eq: HashMap<TrackId, EqParams>,
    pending_reverb: HashMap<TrackId, ReverbParams>,
    impulses: ImpulseCache,
    meter_window: usize,
    gain_smoothing: f64,
}

impl RoutingTable {
    /// Build the master bus into the context destination
    pub fn new(ctx: &mut AudioContext, config: &EngineConfig) -> Self {
        let destination = ctx.destination();
        let master = BusRouting::new(ctx, destination, config.meter_window_frames, 1.0);

        Self {
            master,
            tracks: BTreeMap::new(),
            pending_eq: HashMap::new(),
            pending_reverb: HashMap::new(),
            impulses: ImpulseCache::new(ctx.sample_rate()),
            meter_window: config.meter_window_frames,
            gain_smoothing: config.gain_smoothing_secs.max(0.0),
        }
    }

    pub fn master(&self) -> &BusRouting {
        &self.master
    }

    pub fn track(&self, id: TrackId) -> Option<&TrackRouting> {
        self.tracks.get(&id)
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.keys().copied()
    }

    pub fn impulse_count(&self) -> usize {
        self.impulses.len()
    }

    /// Level tap of a track bus
    pub fn tap(&self, id: TrackId) -> Option<&Arc<LevelTap>> {
        self.tracks.get(&id).map(|t| &t.bus.tap)
    }

    pub fn has_pending(&self, id: TrackId) -> bool {
        self.pending_eq.contains_key(&id) || self.pending_reverb.contains_key(&id)
    }

    /// Create the track's routing if it doesn't exist yet
    ///
    /// A new bus starts at `gain` so a muted track is silent from its first frame.
    pub fn ensure_track(&mut self, ctx: &mut AudioContext, id: TrackId, gain: f32) -> &mut TrackRouting {
        match self.tracks.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                log::debug!("Creating routing for track {}", id);
                let mut bus = BusRouting::new(ctx, self.master.input, self.meter_window, gain);

                // Parameters that arrived before the track existed
                let eq = self.pending_eq.remove(&id);
                let reverb = self.pending_reverb.remove(&id);
                if eq.is_some() || reverb.is_some() {
                    if let Some(eq) = eq {
                        bus.eq = eq;
                    }
                    if let Some(reverb) = reverb {
                        bus.reverb_params = reverb;
                    }
                    bus.rebuild(ctx, &mut self.impulses);
                }

                entry.insert(TrackRouting {
                    bus,
                    synth_out: None,
                    synth_gain: 1.0,
                })
            }
        }
    }

    /// Remove every node and pending parameter of a track
    ///
    /// Returns false if there was nothing to tear down.
    pub fn teardown_track(&mut self, ctx: &mut AudioContext, id: TrackId) -> bool {
        let had_pending = self.pending_eq.remove(&id).is_some() | self.pending_reverb.remove(&id).is_some();
        match self.tracks.remove(&id) {
            Some(mut routing) => {
                log::debug!("Tearing down routing for track {}", id);
                if let Some(synth_out) = routing.synth_out.take() {
                    ctx.remove_node(synth_out);
                }
                routing.bus.teardown(ctx);
                true
            }
            None => had_pending,
        }
    }

    pub fn set_track_eq(&mut self, ctx: &mut AudioContext, id: TrackId, eq: EqParams) {
        match self.tracks.get_mut(&id) {
            Some(routing) => {
                routing.bus.eq = eq;
                routing.bus.rebuild(ctx, &mut self.impulses);
            }
            None => {
                self.pending_eq.insert(id, eq);
            }
        }
    }

    pub fn set_track_reverb(&mut self, ctx: &mut AudioContext, id: TrackId, reverb: ReverbParams) {
        match self.tracks.get_mut(&id) {
            Some(routing) => {
                routing.bus.reverb_params = reverb;
                routing.bus.rebuild(ctx, &mut self.impulses);
            }
            None => {
                self.pending_reverb.insert(id, reverb);
            }
        }
    }

    pub fn set_master_eq(&mut self, ctx: &mut AudioContext, eq: EqParams) {
        self.master.eq = eq;
        self.master.rebuild(ctx, &mut self.impulses);
    }

    pub fn set_master_reverb(&mut self, ctx: &mut AudioContext, reverb: ReverbParams) {
        self.master.reverb_params = reverb;
        self.master.rebuild(ctx, &mut self.impulses);
    }

    /// Drive a track's bus gain, smoothing the change
    pub fn set_track_gain(&mut self, ctx: &mut AudioContext, id: TrackId, gain: f32, now: f64) {
        let smoothing = self.gain_smoothing;
        if let Some(routing) = self.tracks.get_mut(&id) {
            routing.bus.set_gain(ctx, gain, now, smoothing);
        }
    }

    /// The track's synth summing node, created and wired into the track input on first use
    pub fn synth_output(&mut self, ctx: &mut AudioContext, id: TrackId, gain: f32) -> NodeId {
        let routing = self.ensure_track(ctx, id, 1.0);
        match routing.synth_out {
            Some(node) => node,
            None => {
                let node = ctx.add_node(Box::new(GainNode::new(gain)));
                ctx.connect(node, routing.bus.input);
                routing.synth_out = Some(node);
                routing.synth_gain = gain;
                node
            }
        }
    }

    /// Change the level of a track's synth bus without touching sounding notes
    pub fn set_synth_gain(&mut self, ctx: &mut AudioContext, id: TrackId, gain: f32, now: f64) {
        let smoothing = self.gain_smoothing;
        let Some(routing) = self.tracks.get_mut(&id) else {
            return;
        };
        let Some(node) = routing.synth_out else {
            return;
        };
        if routing.synth_gain == gain {
            return;
        }
        ctx.message(node, NodeMessage::CancelScheduledValues(now));
        ctx.message(
            node,
            NodeMessage::SetValueAtTime {
                value: routing.synth_gain,
                time: now,
            },
        );
        ctx.message(
            node,
            NodeMessage::LinearRampToValueAtTime {
                value: gain,
                time: now + smoothing,
            },
        );
        routing.synth_gain = gain;
    }

    /// Follow a bus from its input and check it reaches `target`
    ///
    /// Every node on the way must have somewhere to send its signal.
    pub fn reaches(ctx: &AudioContext, bus: &BusRouting, target: NodeId) -> bool {
        let mut frontier = vec![bus.input];
        let mut visited = Vec::new();
        while let Some(node) = frontier.pop() {
            if node == target {
                continue;
            }
            if visited.contains(&node) {
                continue;
            }
            visited.push(node);
            let next = ctx.downstream(node);
            if next.is_empty() {
                return false;
            }
            frontier.extend_from_slice(next);
        }
        visited.contains(&bus.analyser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBuffer;
    use crate::audio::effects::FilterType;
    use crate::audio::nodes::BufferSourceNode;
    use crate::audio::render::Renderer;

    fn setup() -> (AudioContext, Renderer, RoutingTable) {
        let config = EngineConfig::default();
        let (mut ctx, renderer) = AudioContext::new(48000, &config);
        let table = RoutingTable::new(&mut ctx, &config);
        (ctx, renderer, table)
    }

    fn two_band_eq() -> EqParams {
        EqParams {
            enabled: true,
            bands: vec![
                EqBand {
                    filter_type: FilterType::Highpass,
                    frequency: 80.0,
                    ..EqBand::default()
                },
                EqBand {
                    filter_type: FilterType::Peaking,
                    gain_db: 3.0,
                    ..EqBand::default()
                },
            ],
        }
    }

    fn reverb_on() -> ReverbParams {
        ReverbParams {
            enabled: true,
            wet: 0.25,
            decay_secs: 0.5,
            pre_delay_ms: 10.0,
        }
    }

    #[test]
    fn test_plan_from_params() {
        let plan = ChainPlan::from_params(&EqParams::default(), &ReverbParams::default());
        assert!(plan.is_bypass());

        let plan = ChainPlan::from_params(&two_band_eq(), &reverb_on());
        assert_eq!(plan.filters.len(), 2);
        assert_eq!(plan.filters[0].filter_type, FilterType::Highpass);
        assert!(plan.reverb.is_some());
    }

    #[test]
    fn test_new_track_is_bypass() {
        let (mut ctx, _renderer, mut table) = setup();
        let master_input = table.master().input;
        let routing = table.ensure_track(&mut ctx, 7, 1.0);

        assert_eq!(ctx.downstream(routing.bus.input), &[routing.bus.gain]);
        assert_eq!(ctx.downstream(routing.bus.gain), &[routing.bus.analyser]);
        assert_eq!(ctx.downstream(routing.bus.analyser), &[master_input]);

        // A second call reuses the same nodes
        let input = routing.bus.input;
        assert_eq!(table.ensure_track(&mut ctx, 7, 1.0).bus.input, input);
    }

    #[test]
    fn test_new_track_starts_at_its_gain() {
        let (mut ctx, mut renderer, mut table) = setup();
        let input = table.ensure_track(&mut ctx, 2, 0.0).bus.input;
        table.set_track_gain(&mut ctx, 2, 0.0, 0.0);
        assert_eq!(table.track(2).unwrap().bus.gain_target(), 0.0);

        let buffer = Arc::new(AudioBuffer::from_mono(&[0.5; 256], 48000));
        let source = ctx.add_node(Box::new(BufferSourceNode::new(buffer, 0.0, 0.0, 1.0, 48000)));
        ctx.connect(source, input);

        let mut out = vec![0.0; 2 * 128];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_rebuild_wires_chain_and_reverb() {
        let (mut ctx, _renderer, mut table) = setup();
        table.ensure_track(&mut ctx, 1, 1.0);
        table.set_track_eq(&mut ctx, 1, two_band_eq());
        table.set_track_reverb(&mut ctx, 1, reverb_on());

        let bus = &table.track(1).unwrap().bus;
        let reverb = bus.reverb.unwrap();
        assert_eq!(bus.chain.len(), 2);
        assert_eq!(ctx.downstream(bus.input), &[bus.chain[0]]);
        assert_eq!(ctx.downstream(bus.chain[0]), &[bus.chain[1]]);
        assert_eq!(ctx.downstream(bus.chain[1]), &[reverb.dry, reverb.pre_delay]);
        assert_eq!(ctx.downstream(reverb.pre_delay), &[reverb.convolver]);
        assert_eq!(ctx.downstream(reverb.wet), &[bus.gain]);
        assert_eq!(ctx.upstream(bus.gain), {
            let mut feeds = vec![reverb.dry, reverb.wet];
            feeds.sort_unstable();
            feeds
        });
        assert!(RoutingTable::reaches(&ctx, bus, table.master().input));
    }

    #[test]
    fn test_rebuild_back_to_bypass_drops_old_nodes() {
        let (mut ctx, _renderer, mut table) = setup();
        table.ensure_track(&mut ctx, 1, 1.0);
        table.set_track_eq(&mut ctx, 1, two_band_eq());
        table.set_track_reverb(&mut ctx, 1, reverb_on());
        let old = table.track(1).unwrap().bus.nodes();

        table.set_track_eq(&mut ctx, 1, EqParams::default());
        table.set_track_reverb(&mut ctx, 1, ReverbParams::default());

        let bus = &table.track(1).unwrap().bus;
        assert_eq!(ctx.downstream(bus.input), &[bus.gain]);
        assert_eq!(ctx.upstream(bus.gain), vec![bus.input]);
        for node in old {
            if node != bus.input && node != bus.gain && node != bus.analyser {
                assert!(!ctx.is_live(node));
            }
        }
    }

    #[test]
    fn test_pending_params_applied_on_creation() {
        let (mut ctx, _renderer, mut table) = setup();
        table.set_track_eq(&mut ctx, 3, two_band_eq());
        assert!(table.has_pending(3));
        assert!(table.track(3).is_none());

        table.ensure_track(&mut ctx, 3, 1.0);

        assert!(!table.has_pending(3));
        assert_eq!(table.track(3).unwrap().bus.chain.len(), 2);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (mut ctx, _renderer, mut table) = setup();
        let baseline = ctx.node_count();
        table.ensure_track(&mut ctx, 1, 1.0);
        table.set_track_reverb(&mut ctx, 1, reverb_on());
        table.synth_output(&mut ctx, 1, 0.5);

        assert!(table.teardown_track(&mut ctx, 1));
        assert!(!table.teardown_track(&mut ctx, 1));

        assert_eq!(ctx.node_count(), baseline);
        assert!(table.track(1).is_none());
        assert!(ctx.upstream(table.master().input).is_empty());
    }

    #[test]
    fn test_synth_output_feeds_track_input() {
        let (mut ctx, _renderer, mut table) = setup();
        let out = table.synth_output(&mut ctx, 4, 0.8);
        let input = table.track(4).unwrap().bus.input;

        assert_eq!(ctx.downstream(out), &[input]);
        assert_eq!(table.synth_output(&mut ctx, 4, 0.2), out);
    }

    #[test]
    fn test_reverb_rebuilds_share_impulse() {
        let (mut ctx, _renderer, mut table) = setup();
        table.ensure_track(&mut ctx, 1, 1.0);
        table.ensure_track(&mut ctx, 2, 1.0);
        table.set_track_reverb(&mut ctx, 1, reverb_on());
        table.set_track_reverb(&mut ctx, 2, reverb_on());
        table.set_master_reverb(&mut ctx, reverb_on());

        assert_eq!(table.impulse_count(), 1);
        assert!(RoutingTable::reaches(&ctx, table.master(), ctx.destination()));
    }
}
