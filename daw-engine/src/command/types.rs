use crate::audio::nodes::{NodeId, NodeMessage};
use crate::audio::render::RenderNode;

/// Commands sent from the control thread to the audio thread
#[derive(Debug)]
pub enum Command {
    /// Insert a node built on the control side
    AddNode(RenderNode),
    /// Remove a node and every edge touching it
    RemoveNode(NodeId),
    /// Route the first node's output into the second node's input
    Connect(NodeId, NodeId),
    /// Drop every outgoing connection of a node
    Disconnect(NodeId),
    /// Forward a control message to a node
    Message(NodeId, NodeMessage),
}

/// Events sent from the audio thread back to the control thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEvent {
    /// A source node played to its end or reached its stop time
    SourceEnded(NodeId),
}
