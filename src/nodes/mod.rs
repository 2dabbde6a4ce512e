/// Built-in node types
///
/// # Node Categories
///
/// ## Sources (no sinks)
/// - [`random_float::RandomFloatNode`] - Uniform random floats at a configurable rate
/// - [`still_image::StillImageNode`] - Emits a raster supplied as a resource
///
/// ## Processing
/// - [`multiply_add::MultiplyAddNode`] - `value * multiplier + adder` with blended coefficients
/// - [`vector_magnitude::VectorMagnitudeNode`] - Mean/max vector length per frame, normalised and smoothed
///
/// ## Control
/// - [`agency_controller::AgencyControllerNode`] - Turns signal activity into auto agency and rationed triggers
pub mod agency_controller;
pub mod multiply_add;
pub mod random_float;
pub mod still_image;
pub mod vector_magnitude;

pub use agency_controller::AgencyControllerNode;
pub use multiply_add::MultiplyAddNode;
pub use random_float::RandomFloatNode;
pub use still_image::StillImageNode;
pub use vector_magnitude::VectorMagnitudeNode;

use crate::registry::NodeRegistry;

/// Register every built-in type under its config name
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry.register(multiply_add::TYPE_NAME, |name, config, _| {
        Some(Box::new(MultiplyAddNode::from_config(name, config)))
    });
    registry.register(vector_magnitude::TYPE_NAME, |name, config, _| {
        Some(Box::new(VectorMagnitudeNode::from_config(name, config)))
    });
    registry.register(random_float::TYPE_NAME, |name, config, _| {
        Some(Box::new(RandomFloatNode::from_config(name, config)))
    });
    registry.register(agency_controller::TYPE_NAME, |name, config, _| {
        Some(Box::new(AgencyControllerNode::from_config(name, config)))
    });
    registry.register(still_image::TYPE_NAME, |name, config, resources| {
        StillImageNode::from_config(name, config, resources).map(|n| Box::new(n) as _)
    });
}

/// Graph harness for node tests
#[cfg(test)]
pub(crate) mod test_support {
    use crate::blender::Step;
    use crate::graph::{Graph, NodeContext};
    use crate::host::Host;
    use crate::memory_bank::MemoryBank;
    use crate::node::{Node, NodeId};
    use crate::value::{PortId, PortMap, Signal};
    use std::sync::{Arc, Mutex};

    pub type Shared = Arc<Mutex<Vec<(PortId, Signal)>>>;

    /// Emits whatever is queued in `outbox` on update; records what it receives
    pub struct Tap {
        name: String,
        outbox: Shared,
        inbox: Shared,
    }

    impl Node for Tap {
        fn name(&self) -> &str {
            &self.name
        }

        fn type_name(&self) -> &'static str {
            "Tap"
        }

        fn sinks(&self) -> PortMap {
            &[("In", 1), ("In2", 2)]
        }

        fn sources(&self) -> PortMap {
            &[("Out", 1), ("Out2", 2), ("Out3", 3)]
        }

        fn update(&mut self, ctx: &mut NodeContext<'_, '_>) {
            let queued: Vec<(PortId, Signal)> = self.outbox.lock().unwrap().drain(..).collect();
            for (port, signal) in queued {
                ctx.emit(port, signal);
            }
        }

        fn receive(&mut self, port: PortId, signal: &Signal, _ctx: &mut NodeContext<'_, '_>) {
            self.inbox.lock().unwrap().push((port, signal.clone()));
        }
    }

    pub struct Rig {
        pub graph: Graph,
        pub host: Host,
        pub frame: u64,
        pub time: f32,
        pub dt: f32,
    }

    impl Rig {
        pub fn new() -> Self {
            let mut host = Host::new(MemoryBank::with_seed(1), 0.0);
            host.memory_mut().allocate(4, 4);
            Self {
                graph: Graph::new(),
                host,
                frame: 0,
                time: 0.0,
                dt: 1.0 / 60.0,
            }
        }

        pub fn add(&mut self, node: impl Node + 'static) -> NodeId {
            self.graph.add_node(Box::new(node)).unwrap()
        }

        /// Add a tap; returns (outbox, inbox)
        pub fn tap(&mut self, name: &str) -> (Shared, Shared) {
            let outbox: Shared = Default::default();
            let inbox: Shared = Default::default();
            self.add(Tap {
                name: name.to_string(),
                outbox: outbox.clone(),
                inbox: inbox.clone(),
            });
            (outbox, inbox)
        }

        pub fn connect(&mut self, text: &str) {
            let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
            assert_eq!(self.graph.add_connections(text), lines, "bad test wiring");
        }

        pub fn run_frame(&mut self) -> Vec<NodeId> {
            self.host.begin_frame();
            let step = Step::for_frame(self.dt, self.frame, Default::default());
            let fired = self.graph.update(&mut self.host, self.time, step);
            self.host.tick(step);
            self.host.end_frame();
            self.frame += 1;
            self.time += self.dt;
            fired
        }
    }

    /// Float values received, in order
    pub fn floats(inbox: &Shared) -> Vec<(PortId, f32)> {
        inbox
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(p, s)| s.as_float().map(|v| (*p, v)))
            .collect()
    }
}
