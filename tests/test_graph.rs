/// Graph wiring and frame delivery, driven through the public API
///
/// Built-in nodes come from the registry the way a loaded config builds
/// them; `Recorder` is a node defined out here to observe what arrives and
/// when.

use marksynth::blender::Step;
use marksynth::config::{ConfigValue, NodeConfig};
use marksynth::graph::{ConnectError, Graph, NodeContext};
use marksynth::host::Host;
use marksynth::memory_bank::MemoryBank;
use marksynth::node::{Endpoint, Node};
use marksynth::registry::{NodeRegistry, Resources};
use marksynth::value::{PortId, PortMap, Signal};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<Option<f32>>>>;

/// Logs the last float it has seen each time it updates, and forwards
/// every float it receives plus one
struct Recorder {
    name: String,
    last: Option<f32>,
    log: Log,
}

impl Recorder {
    fn boxed(name: &str, log: &Log) -> Box<dyn Node> {
        Box::new(Self {
            name: name.to_string(),
            last: None,
            log: log.clone(),
        })
    }
}

impl Node for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        "Recorder"
    }

    fn sinks(&self) -> PortMap {
        &[("In", 1)]
    }

    fn sources(&self) -> PortMap {
        &[("Next", 1)]
    }

    fn update(&mut self, _ctx: &mut NodeContext<'_, '_>) {
        self.log.lock().unwrap().push(self.last);
    }

    fn receive(&mut self, _port: PortId, signal: &Signal, ctx: &mut NodeContext<'_, '_>) {
        if let Some(v) = signal.as_float() {
            self.last = Some(v);
            ctx.emit(1, Signal::Float(v + 1.0));
        }
    }
}

fn config(entries: &[(&str, f64)]) -> NodeConfig {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), ConfigValue::Num(*v)))
        .collect()
}

/// Helper: constant RandomFloat source named `name`
fn constant(name: &str, value: f64) -> Box<dyn Node> {
    NodeRegistry::with_builtins()
        .create(
            "RandomFloat",
            name,
            &config(&[("seed", 1.0), ("Min", value), ("Max", value)]),
            &Resources::new(),
        )
        .unwrap()
}

fn step(frame: u64) -> Step {
    Step::for_frame(1.0 / 60.0, frame, Default::default())
}

fn run_frame(graph: &mut Graph, host: &mut Host, frame: u64) -> Vec<usize> {
    host.begin_frame();
    let fired = graph.update(host, frame as f32 / 60.0, step(frame));
    host.tick(step(frame));
    host.end_frame();
    fired
}

#[test]
fn test_consumer_before_producer_sees_value_next_frame() {
    let early_log: Log = Default::default();
    let late_log: Log = Default::default();
    let mut graph = Graph::new();
    graph.add_node(Recorder::boxed("Early", &early_log));
    graph.add_node(constant("Source", 0.25));
    graph.add_node(Recorder::boxed("Late", &late_log));
    assert_eq!(
        graph.add_connections("Source.Float -> Early.In\nSource.Float -> Late.In"),
        2
    );

    let mut host = Host::new(MemoryBank::with_seed(1), 0.0);
    run_frame(&mut graph, &mut host, 0);
    run_frame(&mut graph, &mut host, 1);

    assert_eq!(*early_log.lock().unwrap(), vec![None, Some(0.25)]);
    assert_eq!(*late_log.lock().unwrap(), vec![Some(0.25), Some(0.25)]);
}

#[test]
fn test_chain_through_builtins_into_host_agency() {
    let registry = NodeRegistry::with_builtins();
    let mut graph = Graph::new();
    graph.add_node(constant("Source", 0.8));
    graph.add_node(
        registry
            .create("MultiplyAdd", "Half", &config(&[("Multiplier", 0.5)]), &Resources::new())
            .unwrap(),
    );
    let made = graph.add_connections(
        "Source.Float -> Half.float\n\
         Half.float -> .AgencyAuto\n",
    );
    assert_eq!(made, 2);

    let mut host = Host::new(MemoryBank::with_seed(1), 0.1);
    assert!((host.agency() - 0.1).abs() < 1e-6);
    run_frame(&mut graph, &mut host, 0);
    // 0.1 manual + 0.4 auto from the frame just finished
    assert!((host.agency() - 0.5).abs() < 1e-5);
}

#[test]
fn test_loop_between_nodes_is_bounded() {
    let log: Log = Default::default();
    let mut graph = Graph::new();
    graph.add_node(Recorder::boxed("Ping", &log));
    graph.add_node(Recorder::boxed("Pong", &log));
    graph.add_connections("Ping.Next -> Pong.In\nPong.Next -> Ping.In");
    assert_eq!(graph.feedback_cycles().len(), 1);

    let mut host = Host::new(MemoryBank::with_seed(1), 0.0);
    graph.inject(&mut host, Endpoint::Node(0), 1, Signal::Float(1.0), 0.0, step(0));
    // Ping forwards 2.0 to Pong, whose 3.0 back to busy Ping is dropped
    run_frame(&mut graph, &mut host, 0);
    assert_eq!(*log.lock().unwrap(), vec![Some(1.0), Some(2.0)]);
}

#[test]
fn test_two_node_loop_return_value_is_lost() {
    let log: Log = Default::default();
    let mut graph = Graph::new();
    graph.add_node(Recorder::boxed("Ping", &log));
    graph.add_node(Recorder::boxed("Pong", &log));
    graph.add_connections("Ping.Next -> Pong.In\nPong.Next -> Ping.In");

    let mut host = Host::new(MemoryBank::with_seed(1), 0.0);
    graph.inject(&mut host, Endpoint::Node(0), 1, Signal::Float(1.0), 0.0, step(0));
    for frame in 0..3 {
        run_frame(&mut graph, &mut host, frame);
    }
    // Pong's 3.0 never reaches Ping on any later frame either
    assert_eq!(
        *log.lock().unwrap(),
        vec![Some(1.0), Some(2.0), Some(1.0), Some(2.0), Some(1.0), Some(2.0)]
    );
}

#[test]
fn test_unknown_endpoints_are_reported() {
    let log: Log = Default::default();
    let mut graph = Graph::new();
    graph.add_node(Recorder::boxed("Only", &log));

    assert_eq!(
        graph.resolve_sink("Missing", "In"),
        Err(ConnectError::UnknownNode("Missing".to_string()))
    );
    assert!(matches!(
        graph.resolve_sink("Only", "Out"),
        Err(ConnectError::UnknownSinkPort { .. })
    ));
    assert_eq!(graph.resolve_sink("Only", "In"), Ok((Endpoint::Node(0), 1)));
    assert_eq!(graph.resolve_sink("", "AgencyAuto").map(|(e, _)| e), Ok(Endpoint::Host));

    // Lines naming unknown nodes or ports are skipped, the rest still load
    assert_eq!(graph.add_connections("Only.Next -> Ghost.In\nOnly.Next -> Only.In"), 1);
}

#[test]
fn test_every_builtin_type_constructs() {
    let registry = NodeRegistry::with_builtins();
    let mut resources = Resources::new();
    resources.insert("image", Arc::new(marksynth::raster::Raster::filled(4, 4, [9, 9, 9, 255])));

    let mut graph = Graph::new();
    for type_name in registry.type_names() {
        let node = registry
            .create(type_name, type_name, &NodeConfig::new(), &resources)
            .unwrap_or_else(|| panic!("{} did not construct", type_name));
        assert_eq!(node.type_name(), type_name);
        assert!(graph.add_node(node).is_some());
    }

    let mut host = Host::new(MemoryBank::with_seed(2), 0.0);
    for frame in 0..30 {
        run_frame(&mut graph, &mut host, frame);
    }
    assert_eq!(graph.len(), registry.type_names().count());
}
