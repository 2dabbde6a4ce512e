//! Node abstraction for the frame graph
//!
//! A node is a named unit with typed sinks (inputs) and sources (outputs).
//! Port tags are small integers that only mean something to the node type
//! that declares them; the static [`PortMap`] tables translate names used in
//! connection text to those tags.

use crate::blender::Step;
use crate::graph::NodeContext;
use crate::intent::Intent;
use crate::param::ParamSet;
use crate::value::{PortId, PortMap, Signal};
use serde_json::Value;

/// Index of a node in its graph, in registration order
pub type NodeId = usize;

/// One end of a connection: a graph node or the engine host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Host,
    Node(NodeId),
}

/// Name of the parameter every node may use to scale engine agency
pub const AGENCY_FACTOR_PARAM: &str = "AgencyFactor";

/// Core trait for graph nodes
///
/// `update` runs once per frame in registration order. Values a node emits
/// are delivered synchronously to every connected sink, so a consumer
/// registered after its producer sees the fresh value in the same frame,
/// while one registered before sees it a frame late.
pub trait Node: Send {
    /// Unique name within the loaded configuration
    fn name(&self) -> &str;

    /// Registry key this node was built from
    fn type_name(&self) -> &'static str;

    fn sinks(&self) -> PortMap {
        &[]
    }

    fn sources(&self) -> PortMap {
        &[]
    }

    /// Per-frame work; may emit on any source
    fn update(&mut self, _ctx: &mut NodeContext<'_, '_>) {}

    /// A value arrived on sink `port`
    ///
    /// Unknown tags must be ignored (optionally logged), never treated as
    /// fatal.
    fn receive(&mut self, _port: PortId, _signal: &Signal, _ctx: &mut NodeContext<'_, '_>) {}

    /// Steer parameters toward targets derived from the active intent
    fn apply_intent(&mut self, _intent: &Intent, _strength: f32, _step: Step) {}

    fn params(&self) -> Option<&ParamSet> {
        None
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet> {
        None
    }

    /// Multiplier applied to engine agency for this node, 0..1
    fn agency_factor(&self) -> f32 {
        self.params()
            .and_then(|p| p.get(AGENCY_FACTOR_PARAM))
            .map(|p| p.value().clamp(0.0, 1.0))
            .unwrap_or(1.0)
    }

    /// True if the node fired a discrete event during the current frame
    fn triggered_this_frame(&self) -> bool {
        false
    }

    /// State to carry across a config reload under the same name
    fn capture_state(&self) -> Value {
        self.params().map(ParamSet::capture).unwrap_or(Value::Null)
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(params) = self.params_mut() {
            params.restore(state);
        }
    }
}
