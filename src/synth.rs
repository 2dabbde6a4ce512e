//! The engine: one loaded configuration driven frame by frame
//!
//! A [`Synth`] owns the node graph, the host endpoint (agency, background,
//! memory bank) and the intent controller. Each [`Synth::update`] runs:
//!
//! 1. intent activations advance and the active intent is reblended;
//! 2. the host and every node steer toward the active intent;
//! 3. every node updates once, in registration order, with synchronous
//!    delivery of whatever it emits;
//! 4. host blenders tick and deferred memory saves run;
//! 5. nodes that fired a trigger are latched as a register shift, and the
//!    frame's auto agency becomes next frame's.
//!
//! Configurations can be swapped at any time. Parameter manual values are
//! cached by node name when a configuration is unloaded, so a node that
//! reappears under the same name resumes its adjustments.
//!
//! Each configuration also has its own eight [snapshot](crate::snapshot)
//! slots, read from the snapshot folder when it loads.

use crate::blender::{BiasSettings, Step};
use crate::config::{ConfigResult, SynthConfig};
use crate::graph::{parse_connection_line, ConnectError, Graph};
use crate::host::Host;
use crate::intent::{Intent, IntentController};
use crate::memory_bank::{BankResult, MemoryBank, NUM_SLOTS};
use crate::registry::{NodeRegistry, Resources};
use crate::snapshot::{Snapshot, SnapshotManager};
use crate::value::Signal;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest step the engine clock advances by in one frame
pub const MAX_FRAME_DT: f32 = 0.066;

/// What a configuration load produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    pub nodes: usize,
    /// Node names that could not be built
    pub skipped_nodes: Vec<String>,
    pub connections: usize,
    /// Connection lines that parsed (well-formed, not comments)
    pub connection_lines: usize,
    /// Nodes whose cached state was reapplied
    pub restored: usize,
}

impl LoadReport {
    /// Parsed connection lines that did not resolve
    pub fn unresolved_connections(&self) -> usize {
        self.connection_lines.saturating_sub(self.connections)
    }
}

pub struct Synth {
    name: String,
    graph: Graph,
    host: Host,
    intents: IntentController,
    state_cache: HashMap<String, Value>,
    bias: BiasSettings,
    memory_folder: Option<PathBuf>,
    snapshots: SnapshotManager,
    snapshot_folder: Option<PathBuf>,
    loaded: bool,
    paused: bool,
    time: f32,
    frame: u64,
}

impl Default for Synth {
    fn default() -> Self {
        Self::new(MemoryBank::new())
    }
}

impl Synth {
    pub fn new(bank: MemoryBank) -> Self {
        Self {
            name: String::new(),
            graph: Graph::new(),
            host: Host::new(bank, 0.0),
            intents: IntentController::new(),
            state_cache: HashMap::new(),
            bias: BiasSettings::default(),
            memory_folder: None,
            snapshots: SnapshotManager::new(),
            snapshot_folder: None,
            loaded: false,
            paused: false,
            time: 0.0,
            frame: 0,
        }
    }

    /// Build the graph a configuration describes
    ///
    /// Only structural problems (see [`SynthConfig::validate`]) are errors.
    /// Unknown node types and bad connection lines are logged and skipped
    /// so a partially broken configuration still runs.
    pub fn load(
        &mut self,
        config: &SynthConfig,
        registry: &NodeRegistry,
        resources: &Resources,
    ) -> ConfigResult<LoadReport> {
        config.validate()?;
        if self.loaded {
            self.unload();
        }

        info!("Loading config '{}'", config.name);
        self.name = config.name.clone();
        self.bias = config.blending;
        self.configure_host(config);

        let mut report = LoadReport::default();
        for spec in &config.nodes {
            let Some(node) = registry.create(&spec.kind, &spec.name, &spec.config, resources) else {
                report.skipped_nodes.push(spec.name.clone());
                continue;
            };
            let Some(id) = self.graph.add_node(node) else {
                report.skipped_nodes.push(spec.name.clone());
                continue;
            };
            if let Some(state) = self.state_cache.get(&spec.name) {
                if let Some(node) = self.graph.node_mut(id) {
                    node.restore_state(state);
                    report.restored += 1;
                    debug!("Restored cached state for {}", spec.name);
                }
            }
        }
        report.nodes = self.graph.len();

        report.connection_lines = config
            .connections
            .lines()
            .filter_map(parse_connection_line)
            .count();
        report.connections = self.graph.add_connections(&config.connections);

        self.intents.set_presets(config.intent_presets());
        for (index, spec) in config.intents.iter().take(self.intents.len()).enumerate() {
            self.intents.set_speed(index, spec.speed);
            self.intents.snap_activation(index, spec.activation);
        }
        self.intents.set_strength(config.intent_strength);
        self.load_snapshots(config);

        self.loaded = true;
        info!(
            "Loaded '{}': {} nodes, {} connections, {} intents",
            self.name,
            report.nodes,
            report.connections,
            self.intents.len()
        );
        if !report.skipped_nodes.is_empty() {
            warn!("Skipped nodes: {}", report.skipped_nodes.join(", "));
        }
        Ok(report)
    }

    fn configure_host(&mut self, config: &SynthConfig) {
        self.host.agency_state_mut().set_manual(config.agency);
        self.host.restore_background_color(config.background_color);

        let memory = &config.memory;
        let size = (memory.width, memory.height);
        let bank = self.host.memory().bank();
        let bank_ready = bank.is_allocated() && bank.size() == size;
        if !bank_ready {
            self.host.memory_mut().allocate(memory.width, memory.height);
        }
        if let Some(seed) = memory.seed {
            self.host.memory_mut().bank_mut().reseed(seed);
        }
        self.host.memory_mut().set_emit_min_interval(memory.emit_min_interval);

        // Memories follow the folder, not the configuration
        if memory.folder != self.memory_folder || !bank_ready {
            self.memory_folder = memory.folder.clone();
            if let Some(folder) = &self.memory_folder {
                if let Err(e) = self.host.memory_mut().bank_mut().load_all_from_folder(folder) {
                    warn!("Could not load memories from {}: {}", folder.display(), e);
                }
            }
        }
    }

    fn load_snapshots(&mut self, config: &SynthConfig) {
        self.snapshot_folder = config.snapshot_folder.clone();
        match &self.snapshot_folder {
            Some(folder) => {
                if let Err(e) = self.snapshots.load_from_file(folder, &config.name) {
                    warn!("Could not load snapshots for '{}': {}", config.name, e);
                }
            }
            None => self.snapshots.clear(),
        }
    }

    /// Tear down the graph, caching node states by name
    pub fn unload(&mut self) {
        if !self.loaded {
            return;
        }
        let states = self.graph.capture_states();
        debug!("Caching state for {} nodes", states.len());
        self.state_cache.extend(states);
        self.graph = Graph::new();
        self.intents.set_presets(Vec::new());
        self.loaded = false;
        info!("Unloaded '{}'", self.name);
    }

    /// Replace the running configuration
    ///
    /// The new configuration is validated before anything is torn down, so
    /// a rejected configuration leaves the old one running.
    pub fn switch_config(
        &mut self,
        config: &SynthConfig,
        registry: &NodeRegistry,
        resources: &Resources,
    ) -> ConfigResult<LoadReport> {
        self.load(config, registry, resources)
    }

    /// Advance one frame of `dt` seconds
    pub fn update(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_FRAME_DT) } else { 0.0 };
        self.time += dt;
        let step = Step::for_frame(dt, self.frame, self.bias);

        self.host.begin_frame();

        self.intents.update(dt);
        let strength = self.intents.effective_strength();
        if strength > 0.0 {
            let intent = self.intents.active_intent();
            self.host.apply_intent(intent, strength, step);
            self.graph.apply_intent(intent, strength, step);
        }

        let fired = self.graph.update(&mut self.host, self.time, step);
        self.host.tick(step);

        self.host.agency_state_mut().latch_register_shift(&fired, self.time);
        self.host.end_frame();
        self.frame += 1;
    }

    /// Push a value into a sink from outside the graph
    ///
    /// Content producers use this for the host `Composite` sink, and the
    /// operator surface for one-off triggers such as `MemorySave`.
    pub fn send(&mut self, node: &str, port: &str, signal: Signal) -> Result<(), ConnectError> {
        let (sink, port_id) = self.graph.resolve_sink(node, port)?;
        // Unstamped: a between-frames value must not use up the next frame
        let step = Step {
            dt: 0.0,
            frame: None,
            bias: self.bias,
        };
        self.graph.inject(&mut self.host, sink, port_id, signal, self.time, step);
        Ok(())
    }

    /// Write memories to the configured folder
    ///
    /// Returns Ok(false) when there is no folder or some slot failed.
    pub fn save_memories(&self) -> BankResult<bool> {
        match &self.memory_folder {
            Some(folder) => self.host.memory().bank().save_all_to_folder(folder),
            None => Ok(false),
        }
    }

    /// Capture the named nodes (every node when `selected` is empty)
    pub fn capture_snapshot(&self, name: &str, selected: &[&str]) -> Snapshot {
        SnapshotManager::capture(name, &self.graph, selected)
    }

    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> BTreeSet<String> {
        self.snapshots.apply(&mut self.graph, snapshot)
    }

    /// Apply the snapshot stored in `index`; None when the slot is empty
    pub fn apply_snapshot_slot(&mut self, index: usize) -> Option<BTreeSet<String>> {
        let snapshot = self.snapshots.slot(index)?.clone();
        Some(self.snapshots.apply(&mut self.graph, &snapshot))
    }

    pub fn undo_snapshot(&mut self) -> BTreeSet<String> {
        self.snapshots.undo(&mut self.graph)
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn snapshots_mut(&mut self) -> &mut SnapshotManager {
        &mut self.snapshots
    }

    /// Write this configuration's snapshot slots to the snapshot folder
    ///
    /// Returns Ok(false) when there is no folder.
    pub fn save_snapshots(&self) -> ConfigResult<bool> {
        match &self.snapshot_folder {
            Some(folder) => {
                self.snapshots.save_to_file(folder, &self.name)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn pause(&mut self) {
        if !self.paused {
            info!("Paused at {:.2}s", self.time);
        }
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            info!("Resumed at {:.2}s", self.time);
        }
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine running time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn agency(&self) -> f32 {
        self.host.agency()
    }

    pub fn set_manual_agency(&mut self, value: f32) {
        self.host.agency_state_mut().set_manual(value);
    }

    /// Head a named preset's activation toward `value`
    pub fn set_intent_activation(&mut self, name: &str, value: f32) -> bool {
        match self.intents.index_of(name) {
            Some(index) => {
                self.intents.set_activation(index, value);
                true
            }
            None => {
                warn!("No intent named '{}'", name);
                false
            }
        }
    }

    pub fn active_intent(&self) -> &Intent {
        self.intents.active_intent()
    }

    pub fn intents(&self) -> &IntentController {
        &self.intents
    }

    pub fn intents_mut(&mut self) -> &mut IntentController {
        &mut self.intents
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn memory_folder(&self) -> Option<&Path> {
        self.memory_folder.as_deref()
    }

    /// Cached state for a node name not currently loaded (or stale)
    pub fn cached_state(&self, name: &str) -> Option<&Value> {
        self.state_cache.get(name)
    }

    /// One-line status for periodic logging
    pub fn status_line(&self) -> String {
        let bank = self.host.memory().bank();
        format!(
            "t={:.1}s agency={:.2} intent=[{}] x{:.2} memories={}/{}",
            self.time,
            self.agency(),
            self.intents.active_intent(),
            self.intents.effective_strength(),
            bank.occupied_count(),
            NUM_SLOTS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValue, IntentSpec, NodeSpec};

    fn node(name: &str, kind: &str, config: &[(&str, f64)]) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            kind: kind.to_string(),
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), ConfigValue::Num(*v)))
                .collect(),
        }
    }

    fn config() -> SynthConfig {
        SynthConfig {
            name: "test".to_string(),
            connections: "Random.Float -> Scale.float\n\
                          Scale.float -> .AgencyAuto\n\
                          Random.Nope -> Scale.float\n"
                .to_string(),
            nodes: vec![
                node("Random", "RandomFloat", &[("seed", 1.0), ("Min", 0.5), ("Max", 0.5)]),
                node("Scale", "MultiplyAdd", &[]),
                node("Ghost", "NoSuchType", &[]),
            ],
            ..SynthConfig::default()
        }
    }

    fn synth() -> Synth {
        Synth::new(MemoryBank::with_seed(3))
    }

    #[test]
    fn test_load_report() {
        let mut s = synth();
        let report = s.load(&config(), &NodeRegistry::with_builtins(), &Resources::new()).unwrap();
        assert_eq!(report.nodes, 2);
        assert_eq!(report.skipped_nodes, vec!["Ghost".to_string()]);
        assert_eq!(report.connection_lines, 3);
        assert_eq!(report.connections, 2);
        assert_eq!(report.unresolved_connections(), 1);
        assert!(s.host().memory().bank().is_allocated());
    }

    #[test]
    fn test_auto_agency_lags_one_frame() {
        let mut s = synth();
        s.load(&config(), &NodeRegistry::with_builtins(), &Resources::new()).unwrap();
        assert_eq!(s.agency(), 0.0);
        s.update(1.0 / 60.0);
        // 0.5 * 1 + 0, contributed during the frame, visible after it
        assert!((s.agency() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_time_capped_and_paused() {
        let mut s = synth();
        s.load(&config(), &NodeRegistry::with_builtins(), &Resources::new()).unwrap();
        s.update(1.0);
        assert!((s.time() - MAX_FRAME_DT).abs() < 1e-6);
        s.pause();
        s.update(0.01);
        assert_eq!(s.frame(), 1);
        s.resume();
        s.update(0.01);
        assert_eq!(s.frame(), 2);
        s.update(f32::NAN);
        assert!((s.time() - MAX_FRAME_DT - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_state_survives_switch() {
        let registry = NodeRegistry::with_builtins();
        let mut s = synth();
        s.load(&config(), &registry, &Resources::new()).unwrap();
        s.graph_mut()
            .node_by_name_mut("Scale")
            .unwrap()
            .params_mut()
            .unwrap()
            .get_mut("Multiplier")
            .unwrap()
            .set_manual(2.0);

        let mut other = config();
        other.nodes.retain(|n| n.name != "Scale");
        s.switch_config(&other, &registry, &Resources::new()).unwrap();
        assert!(s.graph().node_by_name("Scale").is_none());
        assert!(s.cached_state("Scale").is_some());

        s.switch_config(&config(), &registry, &Resources::new()).unwrap();
        let scale = s.graph().node_by_name("Scale").unwrap();
        assert_eq!(scale.params().unwrap().get("Multiplier").unwrap().value(), 2.0);
    }

    #[test]
    fn test_invalid_switch_keeps_running_config() {
        let registry = NodeRegistry::with_builtins();
        let mut s = synth();
        s.load(&config(), &registry, &Resources::new()).unwrap();
        let mut bad = config();
        bad.nodes[1].name = "Random".to_string();
        assert!(s.switch_config(&bad, &registry, &Resources::new()).is_err());
        assert!(s.is_loaded());
        assert_eq!(s.graph().len(), 2);
    }

    #[test]
    fn test_intents_snap_to_initial_activation() {
        let mut c = config();
        c.intents.push(IntentSpec {
            name: "calm".to_string(),
            energy: 0.2,
            density: 0.0,
            structure: 1.0,
            chaos: 0.0,
            granularity: 0.0,
            activation: 1.0,
            speed: 0.5,
        });
        let mut s = synth();
        s.load(&c, &NodeRegistry::with_builtins(), &Resources::new()).unwrap();
        assert_eq!(s.intents().effective_strength(), 1.0);
        assert!((s.active_intent().structure - 1.0).abs() < 1e-6);
        assert!(s.set_intent_activation("calm", 0.0));
        assert!(!s.set_intent_activation("nope", 1.0));
    }

    #[test]
    fn test_send_to_host_sink() {
        let mut s = synth();
        s.load(&config(), &NodeRegistry::with_builtins(), &Resources::new()).unwrap();
        let image = std::sync::Arc::new(crate::raster::Raster::filled(300, 300, [1, 2, 3, 255]));
        s.send("", "Composite", Signal::Image(image)).unwrap();
        s.send("", "MemorySave", Signal::Float(1.0)).unwrap();
        assert_eq!(s.host().memory().bank().occupied_count(), 1);
        assert!(matches!(
            s.send("", "Nope", Signal::Float(1.0)),
            Err(ConnectError::UnknownSinkPort { .. })
        ));
    }
}
