//! Frame graph: nodes, connections and synchronous delivery
//!
//! Nodes live in registration order. Each frame every node updates once,
//! in that order; anything it emits is delivered immediately to every
//! connected sink, which may itself emit further. Delivery to a node that
//! is already mid-call (a feedback loop back into itself) is dropped with a
//! warning, so loops settle to one pass per frame instead of recursing.
//!
//! In a two-node loop (`A -> B -> A`) this means the value B sends back to
//! A while A is still updating or receiving is lost for that frame; A never
//! sees it, not even on the next frame. A cycle only carries a value around
//! if some node stores it and re-emits it from its own next `update`.
//!
//! Connections come from a line-oriented text form:
//!
//! ```text
//! # source.Port -> sink.Port, empty node name = engine host
//! Random.Float -> Scale.float
//! Scale.float -> .AgencyAuto
//! ```

use crate::blender::Step;
use crate::host::{self, Host};
use crate::intent::Intent;
use crate::node::{Endpoint, Node, NodeId};
use crate::value::{port_id, port_name, PortId, Signal};
use lazy_static::lazy_static;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error, warn};

/// Deepest chain of synchronous emits before delivery is cut
pub const MAX_EMIT_DEPTH: usize = 64;

/// Sink names with this suffix may only be set from config
pub const CONFIG_TIME_SUFFIX: &str = "PreScaleExp";

lazy_static! {
    static ref CONNECTION_LINE: Regex =
        Regex::new(r"^(?P<src>[^.]*)\.(?P<sport>.+?)\s*->\s*(?P<dst>[^.]*)\.(?P<dport>.+)$").unwrap();
}

/// A resolved directed edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    pub source: Endpoint,
    pub source_port: PortId,
    pub sink: Endpoint,
    pub sink_port: PortId,
}

/// One parsed line of connection text, names not yet resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub source: String,
    pub source_port: String,
    pub sink: String,
    pub sink_port: String,
}

/// Parse `source.Port -> sink.Port`
///
/// Returns None for blank lines, comments and lines missing the arrow or a
/// dot on either side.
pub fn parse_connection_line(line: &str) -> Option<ConnectionSpec> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let Some(caps) = CONNECTION_LINE.captures(line) else {
        debug!("Skipping malformed connection line: {}", line);
        return None;
    };
    Some(ConnectionSpec {
        source: caps["src"].trim().to_string(),
        source_port: caps["sport"].trim().to_string(),
        sink: caps["dst"].trim().to_string(),
        sink_port: caps["dport"].trim().to_string(),
    })
}

/// Why a connection could not be established
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectError {
    /// Sink is set from config only
    ConfigTimeSink(String),
    UnknownNode(String),
    UnknownSourcePort { node: String, port: String },
    UnknownSinkPort { node: String, port: String },
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::ConfigTimeSink(port) => write!(
                f,
                "Disallowed connection to config-time sink '{}' (set it in the node config instead)",
                port
            ),
            ConnectError::UnknownNode(name) => write!(f, "Unknown node name: {}", name),
            ConnectError::UnknownSourcePort { node, port } => {
                write!(f, "Unknown source port '{}' on '{}'", port, display_name(node))
            }
            ConnectError::UnknownSinkPort { node, port } => {
                write!(f, "Unknown sink port '{}' on '{}'", port, display_name(node))
            }
        }
    }
}

impl std::error::Error for ConnectError {}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "host"
    } else {
        name
    }
}

type Routes = HashMap<(Endpoint, PortId), Vec<(Endpoint, PortId)>>;

/// Borrowed view of a graph used while delivering one frame's values
pub(crate) struct Router<'g> {
    slots: &'g mut [Option<Box<dyn Node>>],
    routes: &'g Routes,
    host: &'g mut Host,
    time: f32,
    step: Step,
    depth: usize,
}

impl<'g> Router<'g> {
    fn emit(&mut self, from: Endpoint, port: PortId, signal: Signal) {
        let routes = self.routes;
        let Some(targets) = routes.get(&(from, port)) else {
            return;
        };
        if self.depth >= MAX_EMIT_DEPTH {
            warn!("Emit depth limit reached at {:?} port {}; value dropped", from, port);
            return;
        }
        self.depth += 1;
        for &(sink, sink_port) in targets {
            self.deliver(sink, sink_port, &signal);
        }
        self.depth -= 1;
    }

    fn deliver(&mut self, sink: Endpoint, port: PortId, signal: &Signal) {
        match sink {
            Endpoint::Host => {
                if let Some(recalled) = self.host.receive(port, signal, self.time, self.step) {
                    self.emit(Endpoint::Host, host::SOURCE_MEMORY, Signal::Image(recalled));
                }
            }
            Endpoint::Node(id) => {
                let Some(mut node) = self.slots.get_mut(id).and_then(Option::take) else {
                    warn!(
                        "Dropped {} for node {}: node is busy (feedback loop)",
                        signal.kind(),
                        id
                    );
                    return;
                };
                let agency = self.host.agency() * node.agency_factor();
                let mut ctx = NodeContext {
                    router: &mut *self,
                    id,
                    agency,
                };
                node.receive(port, signal, &mut ctx);
                self.slots[id] = Some(node);
            }
        }
    }
}

/// What a node sees while updating or receiving
pub struct NodeContext<'r, 'g> {
    router: &'r mut Router<'g>,
    id: NodeId,
    agency: f32,
}

impl NodeContext<'_, '_> {
    /// Push a value to everything connected to source `port`
    pub fn emit(&mut self, port: PortId, signal: Signal) {
        let from = Endpoint::Node(self.id);
        self.router.emit(from, port, signal);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Engine agency scaled by this node's agency factor
    pub fn agency(&self) -> f32 {
        self.agency
    }

    /// Frame-stamped blender step
    pub fn step(&self) -> Step {
        self.router.step
    }

    pub fn dt(&self) -> f32 {
        self.router.step.dt
    }

    /// Engine running time in seconds
    pub fn time(&self) -> f32 {
        self.router.time
    }
}

/// Nodes and connections of one loaded configuration
#[derive(Default)]
pub struct Graph {
    slots: Vec<Option<Box<dyn Node>>>,
    names: HashMap<String, NodeId>,
    connections: Vec<Connection>,
    routes: Routes,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; names must be unique
    pub fn add_node(&mut self, node: Box<dyn Node>) -> Option<NodeId> {
        let name = node.name().to_string();
        if name.is_empty() {
            error!("Node of type {} has an empty name; the empty name is the host", node.type_name());
            return None;
        }
        if self.names.contains_key(&name) {
            error!("Duplicate node name: {}", name);
            return None;
        }
        let id = self.slots.len();
        debug!("Added node {} ({}) as #{}", name, node.type_name(), id);
        self.slots.push(Some(node));
        self.names.insert(name, id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.slots.get(id).and_then(|s| s.as_deref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut (dyn Node + 'static)> {
        self.slots.get_mut(id).and_then(|s| s.as_deref_mut())
    }

    pub fn node_by_name(&self, name: &str) -> Option<&dyn Node> {
        self.id_of(name).and_then(|id| self.node(id))
    }

    pub fn node_by_name_mut(&mut self, name: &str) -> Option<&mut (dyn Node + 'static)> {
        let id = self.id_of(name)?;
        self.node_mut(id)
    }

    /// Nodes in registration order
    pub fn nodes(&self) -> impl Iterator<Item = &dyn Node> {
        self.slots.iter().filter_map(|s| s.as_deref())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Name of an endpoint for logs ("host" for the engine)
    pub fn endpoint_name(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Host => "host",
            Endpoint::Node(id) => self.node(id).map(|n| n.name()).unwrap_or("?"),
        }
    }

    fn endpoint(&self, name: &str) -> Result<Endpoint, ConnectError> {
        if name.is_empty() {
            return Ok(Endpoint::Host);
        }
        self.id_of(name)
            .map(Endpoint::Node)
            .ok_or_else(|| ConnectError::UnknownNode(name.to_string()))
    }

    fn source_port(&self, endpoint: Endpoint, name: &str) -> Option<PortId> {
        match endpoint {
            Endpoint::Host => host::source_id(name),
            Endpoint::Node(id) => self.node(id).and_then(|n| port_id(n.sources(), name)),
        }
    }

    fn sink_port(&self, endpoint: Endpoint, name: &str) -> Option<PortId> {
        match endpoint {
            Endpoint::Host => host::sink_id(name),
            Endpoint::Node(id) => self.node(id).and_then(|n| port_id(n.sinks(), name)),
        }
    }

    /// Human-readable `source.Port -> sink.Port`
    pub fn describe(&self, c: &Connection) -> String {
        let source_port = match c.source {
            Endpoint::Host => port_name(host::SOURCES, c.source_port),
            Endpoint::Node(id) => self.node(id).and_then(|n| port_name(n.sources(), c.source_port)),
        };
        let sink_port = match c.sink {
            Endpoint::Host => host::sink_name(c.sink_port),
            Endpoint::Node(id) => self.node(id).and_then(|n| port_name(n.sinks(), c.sink_port)),
        };
        format!(
            "{}.{} -> {}.{}",
            self.endpoint_name(c.source),
            source_port.unwrap_or("?"),
            self.endpoint_name(c.sink),
            sink_port.unwrap_or("?")
        )
    }

    /// Add a resolved connection; exact duplicates are ignored
    pub fn connect(&mut self, connection: Connection) {
        if self.connections.contains(&connection) {
            debug!("Ignoring duplicate connection {}", self.describe(&connection));
            return;
        }
        self.routes
            .entry((connection.source, connection.source_port))
            .or_default()
            .push((connection.sink, connection.sink_port));
        self.connections.push(connection);
    }

    /// Resolve names to a connection and add it
    pub fn connect_spec(&mut self, spec: &ConnectionSpec) -> Result<Connection, ConnectError> {
        if spec.sink_port.ends_with(CONFIG_TIME_SUFFIX) {
            return Err(ConnectError::ConfigTimeSink(spec.sink_port.clone()));
        }
        let source = self.endpoint(&spec.source)?;
        let sink = self.endpoint(&spec.sink)?;
        let source_port =
            self.source_port(source, &spec.source_port)
                .ok_or_else(|| ConnectError::UnknownSourcePort {
                    node: spec.source.clone(),
                    port: spec.source_port.clone(),
                })?;
        let sink_port = self
            .sink_port(sink, &spec.sink_port)
            .ok_or_else(|| ConnectError::UnknownSinkPort {
                node: spec.sink.clone(),
                port: spec.sink_port.clone(),
            })?;

        let connection = Connection {
            source,
            source_port,
            sink,
            sink_port,
        };
        self.connect(connection);
        Ok(connection)
    }

    /// Resolve a sink by names; the empty node name is the host
    pub fn resolve_sink(&self, node: &str, port: &str) -> Result<(Endpoint, PortId), ConnectError> {
        let sink = self.endpoint(node)?;
        let port_id = self
            .sink_port(sink, port)
            .ok_or_else(|| ConnectError::UnknownSinkPort {
                node: node.to_string(),
                port: port.to_string(),
            })?;
        Ok((sink, port_id))
    }

    /// Establish every valid line of connection text
    ///
    /// Bad lines are logged and skipped so a partial graph still runs.
    /// Returns the number of connections made.
    pub fn add_connections(&mut self, text: &str) -> usize {
        let mut made = 0;
        for spec in text.lines().filter_map(parse_connection_line) {
            match self.connect_spec(&spec) {
                Ok(_) => made += 1,
                Err(e) => error!("Connection {}.{} -> {}.{}: {}", spec.source, spec.source_port, spec.sink, spec.sink_port, e),
            }
        }
        made
    }

    /// Run one frame: every node updates once in registration order
    ///
    /// Returns the ids of nodes that fired a trigger this frame.
    pub fn update(&mut self, host: &mut Host, time: f32, step: Step) -> Vec<NodeId> {
        let mut fired = Vec::new();
        let mut router = Router {
            slots: &mut self.slots,
            routes: &self.routes,
            host,
            time,
            step,
            depth: 0,
        };

        for id in 0..router.slots.len() {
            let Some(mut node) = router.slots[id].take() else {
                continue;
            };
            let agency = router.host.agency() * node.agency_factor();
            if let Some(params) = node.params_mut() {
                params.set_agency(agency);
            }
            {
                let mut ctx = NodeContext {
                    router: &mut router,
                    id,
                    agency,
                };
                node.update(&mut ctx);
            }
            if let Some(params) = node.params_mut() {
                params.tick_all(step);
            }
            if node.triggered_this_frame() {
                fired.push(id);
            }
            router.slots[id] = Some(node);
        }
        fired
    }

    /// Push a value into a sink from outside the graph (content producers)
    pub fn inject(
        &mut self,
        host: &mut Host,
        sink: Endpoint,
        port: PortId,
        signal: Signal,
        time: f32,
        step: Step,
    ) {
        let mut router = Router {
            slots: &mut self.slots,
            routes: &self.routes,
            host,
            time,
            step,
            depth: 0,
        };
        router.deliver(sink, port, &signal);
    }

    pub fn apply_intent(&mut self, intent: &Intent, strength: f32, step: Step) {
        for node in self.slots.iter_mut().flatten() {
            node.apply_intent(intent, strength, step);
        }
    }

    /// Non-empty node states keyed by node name
    pub fn capture_states(&self) -> HashMap<String, Value> {
        self.nodes()
            .filter_map(|n| {
                let state = n.capture_state();
                (!state.is_null()).then(|| (n.name().to_string(), state))
            })
            .collect()
    }

    /// Groups of endpoints that feed back into themselves
    ///
    /// Loops are legal (the busy-node rule bounds them) but usually worth a
    /// look when authoring.
    pub fn feedback_cycles(&self) -> Vec<Vec<String>> {
        let mut g: DiGraph<Endpoint, ()> = DiGraph::new();
        let mut index: HashMap<Endpoint, NodeIndex> = HashMap::new();
        let mut node_index = |g: &mut DiGraph<Endpoint, ()>, e: Endpoint| {
            *index.entry(e).or_insert_with(|| g.add_node(e))
        };
        for c in &self.connections {
            let a = node_index(&mut g, c.source);
            let b = node_index(&mut g, c.sink);
            g.add_edge(a, b, ());
        }

        tarjan_scc(&g)
            .into_iter()
            .filter(|scc| scc.len() > 1 || g.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut names: Vec<String> = scc
                    .into_iter()
                    .map(|i| self.endpoint_name(g[i]).to_string())
                    .collect();
                names.sort();
                names
            })
            .collect()
    }
}
