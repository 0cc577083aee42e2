use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use super::nodes::{AudioNode, NodeId, NodeMessage};
use super::render::{RenderNode, Renderer, DESTINATION};
use crate::command::{AudioEvent, Command};
use crate::config::EngineConfig;

/// Control-thread half of the rendering context
///
/// Hands out node ids, mirrors the graph's edges and pushes commands to the
/// renderer. Every operation on a node that is already gone is a no-op.
pub struct AudioContext {
    sample_rate: u32,
    commands: Producer<Command>,
    /// Commands that didn't fit in the ring, sent in order on the next call
    backlog: VecDeque<Command>,
    backlog_warned: bool,
    events: Consumer<AudioEvent>,
    garbage: Consumer<RenderNode>,
    clock: Arc<AtomicU64>,
    next_id: NodeId,
    live: HashSet<NodeId>,
    edges: HashMap<NodeId, Vec<NodeId>>,
}

impl AudioContext {
    /// Create a context and the renderer it drives
    pub fn new(sample_rate: u32, config: &EngineConfig) -> (Self, Renderer) {
        let (command_tx, command_rx) = RingBuffer::<Command>::new(config.command_queue_capacity.max(1));
        let (event_tx, event_rx) = RingBuffer::<AudioEvent>::new(config.event_queue_capacity.max(1));
        let (garbage_tx, garbage_rx) = RingBuffer::<RenderNode>::new(config.max_nodes.max(1));
        let clock = Arc::new(AtomicU64::new(0));

        let renderer = Renderer::new(
            sample_rate,
            config.max_nodes,
            command_rx,
            event_tx,
            garbage_tx,
            clock.clone(),
        );

        let mut live = HashSet::new();
        live.insert(DESTINATION);

        let context = Self {
            sample_rate,
            commands: command_tx,
            backlog: VecDeque::new(),
            backlog_warned: false,
            events: event_rx,
            garbage: garbage_rx,
            clock,
            next_id: DESTINATION + 1,
            live,
            edges: HashMap::new(),
        };

        (context, renderer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The node whose output goes to the device
    pub fn destination(&self) -> NodeId {
        DESTINATION
    }

    /// Audio-clock time in seconds: frames rendered so far
    pub fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    /// Move a node into the render graph
    pub fn add_node(&mut self, node: Box<dyn AudioNode>) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        self.send(Command::AddNode(RenderNode::new(id, node)));
        id
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if !self.is_live(from) || !self.is_live(to) {
            return;
        }
        let targets = self.edges.entry(from).or_default();
        if targets.contains(&to) {
            return;
        }
        targets.push(to);
        self.send(Command::Connect(from, to));
    }

    /// Remove all outgoing connections of `from`
    pub fn disconnect(&mut self, from: NodeId) {
        if !self.is_live(from) {
            return;
        }
        if let Some(targets) = self.edges.remove(&from) {
            if !targets.is_empty() {
                self.send(Command::Disconnect(from));
            }
        }
    }

    /// Remove a node along with its connections
    pub fn remove_node(&mut self, id: NodeId) {
        if id == DESTINATION || !self.live.remove(&id) {
            return;
        }
        self.edges.remove(&id);
        for targets in self.edges.values_mut() {
            targets.retain(|&t| t != id);
        }
        self.send(Command::RemoveNode(id));
    }

    pub fn message(&mut self, id: NodeId, message: NodeMessage) {
        if self.is_live(id) {
            self.send(Command::Message(id, message));
        }
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.live.contains(&id)
    }

    /// Nodes `id` currently feeds
    pub fn downstream(&self, id: NodeId) -> &[NodeId] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes currently feeding `id`
    pub fn upstream(&self, id: NodeId) -> Vec<NodeId> {
        let mut sources: Vec<NodeId> = self
            .edges
            .iter()
            .filter(|(_, targets)| targets.contains(&id))
            .map(|(&from, _)| from)
            .collect();
        sources.sort_unstable();
        sources
    }

    /// Live nodes, excluding the destination
    pub fn node_count(&self) -> usize {
        self.live.len() - 1
    }

    /// Flush backlog, free retired nodes and collect renderer events
    pub fn poll_events(&mut self) -> Vec<AudioEvent> {
        self.flush_backlog();
        while let Ok(node) = self.garbage.pop() {
            drop(node);
        }

        let mut events = Vec::new();
        while let Ok(event) = self.events.pop() {
            events.push(event);
        }
        events
    }

    fn send(&mut self, command: Command) {
        self.flush_backlog();
        if !self.backlog.is_empty() {
            self.backlog.push_back(command);
            return;
        }
        if let Err(rtrb::PushError::Full(command)) = self.commands.push(command) {
            if !self.backlog_warned {
                log::warn!("Command queue full, buffering commands until the renderer catches up");
                self.backlog_warned = true;
            }
            self.backlog.push_back(command);
        }
    }

    fn flush_backlog(&mut self) {
        while let Some(command) = self.backlog.pop_front() {
            if let Err(rtrb::PushError::Full(command)) = self.commands.push(command) {
                self.backlog.push_front(command);
                return;
            }
        }
        self.backlog_warned = false;
    }
}
