use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, NodeIndexable};
use petgraph::Direction;
use rtrb::{Consumer, Producer};

use super::nodes::{AudioNode, GainNode, NodeId, RenderQuantum, RENDER_QUANTUM};
use crate::command::{AudioEvent, Command};

/// Id of the graph's output node; everything audible ends up here
pub const DESTINATION: NodeId = 0;

/// A node together with its output buffer, as stored in the render graph
pub struct RenderNode {
    pub id: NodeId,
    pub node: Box<dyn AudioNode>,
    /// Interleaved stereo output of the last quantum
    output: Vec<f32>,
    ended_reported: bool,
}

impl RenderNode {
    pub fn new(id: NodeId, node: Box<dyn AudioNode>) -> Self {
        Self {
            id,
            node,
            output: vec![0.0; RENDER_QUANTUM * 2],
            ended_reported: false,
        }
    }
}

impl std::fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderNode")
            .field("id", &self.id)
            .field("node", &self.node.node_type())
            .finish()
    }
}

/// Audio-thread half of the rendering context
///
/// Owns the node graph. Each quantum it applies pending commands, processes
/// nodes in topological order and hands the destination's output to the
/// driver. Removed nodes are sent back to the control thread to be dropped
/// there.
pub struct Renderer {
    graph: StableGraph<RenderNode, ()>,
    ids: HashMap<NodeId, NodeIndex>,
    /// Processing order, recomputed only when the topology changes
    order: Vec<NodeIndex>,
    order_dirty: bool,
    /// Unresolved inputs per node index while ordering
    in_degree: Vec<usize>,
    destination: NodeIndex,

    commands: Consumer<Command>,
    events: Producer<AudioEvent>,
    garbage: Producer<RenderNode>,
    /// Removed nodes waiting for room in the garbage ring
    retired: Vec<RenderNode>,

    sample_rate: u32,
    frames_rendered: u64,
    clock: Arc<AtomicU64>,

    /// Summed input of the node being processed
    scratch: Vec<f32>,
    /// Rendered quantum not yet handed to the driver
    carry: Vec<f32>,
    carry_pos: usize,
}

impl Renderer {
    pub(crate) fn new(
        sample_rate: u32,
        max_nodes: usize,
        commands: Consumer<Command>,
        events: Producer<AudioEvent>,
        garbage: Producer<RenderNode>,
        clock: Arc<AtomicU64>,
    ) -> Self {
        let mut graph = StableGraph::with_capacity(max_nodes, max_nodes * 2);
        let destination = graph.add_node(RenderNode::new(DESTINATION, Box::new(GainNode::new(1.0))));
        let mut ids = HashMap::with_capacity(max_nodes);
        ids.insert(DESTINATION, destination);

        Self {
            graph,
            ids,
            order: Vec::with_capacity(max_nodes),
            order_dirty: true,
            in_degree: Vec::with_capacity(max_nodes),
            destination,
            commands,
            events,
            garbage,
            retired: Vec::with_capacity(max_nodes),
            sample_rate,
            frames_rendered: 0,
            clock,
            scratch: vec![0.0; RENDER_QUANTUM * 2],
            carry: vec![0.0; RENDER_QUANTUM * 2],
            carry_pos: RENDER_QUANTUM * 2,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of live nodes, including the destination
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Fill an interleaved stereo buffer of any length
    pub fn render(&mut self, output: &mut [f32]) {
        let mut written = 0;
        while written < output.len() {
            if self.carry_pos >= self.carry.len() {
                self.render_quantum();
                self.carry_pos = 0;
            }
            let n = (output.len() - written).min(self.carry.len() - self.carry_pos);
            output[written..written + n].copy_from_slice(&self.carry[self.carry_pos..self.carry_pos + n]);
            written += n;
            self.carry_pos += n;
        }
    }

    /// Removed nodes not yet handed back to the control thread
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    fn render_quantum(&mut self) {
        self.flush_retired();
        self.apply_commands();

        if self.order_dirty {
            self.update_order();
            self.order_dirty = false;
        }

        let quantum = RenderQuantum {
            start_time: self.frames_rendered as f64 / self.sample_rate as f64,
            sample_rate: self.sample_rate,
            frames: RENDER_QUANTUM,
        };

        for i in 0..self.order.len() {
            let idx = self.order[i];

            self.scratch.fill(0.0);
            for edge in self.graph.edges_directed(idx, Direction::Incoming) {
                let source = &self.graph[edge.source()].output;
                for (dst, src) in self.scratch.iter_mut().zip(source.iter()) {
                    *dst += src;
                }
            }

            let RenderNode {
                id,
                node,
                output,
                ended_reported,
            } = &mut self.graph[idx];
            node.process(&self.scratch, output, &quantum);

            if !*ended_reported && node.is_finished() {
                *ended_reported = true;
                let _ = self.events.push(AudioEvent::SourceEnded(*id));
            }
        }

        self.carry.copy_from_slice(&self.graph[self.destination].output);
        self.frames_rendered += RENDER_QUANTUM as u64;
        self.clock.store(self.frames_rendered, Ordering::Release);
    }

    /// Kahn's algorithm over the preallocated order and in-degree buffers
    fn update_order(&mut self) {
        self.order.clear();
        self.in_degree.clear();
        self.in_degree.resize(NodeIndexable::node_bound(&self.graph), 0);

        for idx in self.graph.node_indices() {
            let degree = self.graph.edges_directed(idx, Direction::Incoming).count();
            self.in_degree[idx.index()] = degree;
            if degree == 0 {
                self.order.push(idx);
            }
        }

        let mut head = 0;
        while head < self.order.len() {
            let idx = self.order[head];
            head += 1;
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target();
                let degree = &mut self.in_degree[target.index()];
                *degree -= 1;
                if *degree == 0 {
                    self.order.push(target);
                }
            }
        }

        // Nodes on a cycle still get processed, after everything else
        if self.order.len() < self.graph.node_count() {
            for idx in self.graph.node_indices() {
                if self.in_degree[idx.index()] > 0 {
                    self.order.push(idx);
                }
            }
        }
    }

    fn retire(&mut self, node: RenderNode) {
        if let Err(rtrb::PushError::Full(node)) = self.garbage.push(node) {
            if self.retired.len() < self.retired.capacity() {
                self.retired.push(node);
            }
            // Otherwise the node is dropped here
        }
    }

    fn flush_retired(&mut self) {
        while let Some(node) = self.retired.pop() {
            if let Err(rtrb::PushError::Full(node)) = self.garbage.push(node) {
                self.retired.push(node);
                return;
            }
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                Command::AddNode(node) => {
                    let id = node.id;
                    let idx = self.graph.add_node(node);
                    self.ids.insert(id, idx);
                    self.order_dirty = true;
                }
                Command::RemoveNode(id) => {
                    if id == DESTINATION {
                        continue;
                    }
                    if let Some(idx) = self.ids.remove(&id) {
                        if let Some(node) = self.graph.remove_node(idx) {
                            self.retire(node);
                        }
                        self.order_dirty = true;
                    }
                }
                Command::Connect(from, to) => {
                    if let (Some(&a), Some(&b)) = (self.ids.get(&from), self.ids.get(&to)) {
                        if self.graph.find_edge(a, b).is_none() {
                            self.graph.add_edge(a, b, ());
                            self.order_dirty = true;
                        }
                    }
                }
                Command::Disconnect(from) => {
                    if let Some(&idx) = self.ids.get(&from) {
                        while let Some(edge) = self
                            .graph
                            .edges_directed(idx, Direction::Outgoing)
                            .next()
                            .map(|e| e.id())
                        {
                            self.graph.remove_edge(edge);
                            self.order_dirty = true;
                        }
                    }
                }
                Command::Message(id, message) => {
                    if let Some(&idx) = self.ids.get(&id) {
                        self.graph[idx].node.handle(message);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBuffer;
    use crate::audio::context::AudioContext;
    use crate::audio::nodes::BufferSourceNode;
    use crate::config::EngineConfig;

    #[test]
    fn test_sources_added_late_render_first() {
        let (mut ctx, mut renderer) = AudioContext::new(48000, &EngineConfig::default());
        let gain = ctx.add_node(Box::new(GainNode::new(0.5)));
        ctx.connect(gain, ctx.destination());
        let buffer = Arc::new(AudioBuffer::from_mono(&[1.0; 256], 48000));
        let source = ctx.add_node(Box::new(BufferSourceNode::new(buffer, 0.0, 0.0, 1.0, 48000)));
        ctx.connect(source, gain);

        let mut out = vec![0.0; 2 * RENDER_QUANTUM];
        renderer.render(&mut out);
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cycle_still_renders() {
        let (mut ctx, mut renderer) = AudioContext::new(48000, &EngineConfig::default());
        let a = ctx.add_node(Box::new(GainNode::new(0.5)));
        let b = ctx.add_node(Box::new(GainNode::new(0.5)));
        ctx.connect(a, b);
        ctx.connect(b, a);
        ctx.connect(b, ctx.destination());

        let mut out = vec![1.0; 2 * RENDER_QUANTUM];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(renderer.node_count(), 3);
    }

    #[test]
    fn test_removed_nodes_wait_for_garbage_room() {
        let config = EngineConfig {
            max_nodes: 4,
            ..EngineConfig::default()
        };
        let (mut ctx, mut renderer) = AudioContext::new(48000, &config);
        let nodes: Vec<NodeId> = (0..6).map(|_| ctx.add_node(Box::new(GainNode::new(1.0)))).collect();
        let mut out = vec![0.0; 2 * RENDER_QUANTUM];
        renderer.render(&mut out);

        for node in nodes {
            ctx.remove_node(node);
        }
        renderer.render(&mut out);
        assert_eq!(renderer.retired_count(), 2);

        ctx.poll_events();
        renderer.render(&mut out);
        assert_eq!(renderer.retired_count(), 0);
        assert_eq!(renderer.node_count(), 1);
    }
}
