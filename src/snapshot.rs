//! Named snapshots of node parameters
//!
//! A [`Snapshot`] holds the captured manual values of a chosen set of nodes
//! (each node's [`Node::capture_state`](crate::node::Node::capture_state)).
//! The [`SnapshotManager`] keeps eight slots of them per configuration,
//! applies them back onto a running graph with a single level of undo, and
//! persists the slots as one JSON file per configuration name.
//!
//! ```text
//! { "version": "1.0",
//!   "snapshots": { "0": { "name": "calm", "timestamp": 1700000000,
//!                         "mods": { "Scale": { "Multiplier": 0.5 } } } } }
//! ```

use crate::config::{ConfigError, ConfigResult};
use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

pub const NUM_SNAPSHOT_SLOTS: usize = 8;

const FILE_VERSION: &str = "1.0";

/// Captured node states, keyed by node name
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    /// Seconds since the Unix epoch at capture
    pub timestamp: u64,
    pub mods: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.mods.keys().map(String::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: String,
    snapshots: BTreeMap<String, Snapshot>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Eight snapshot slots plus the state needed to undo the last apply
#[derive(Clone, Debug, Default)]
pub struct SnapshotManager {
    slots: [Option<Snapshot>; NUM_SNAPSHOT_SLOTS],
    undo: Option<Snapshot>,
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the named nodes of `graph`; an empty selection takes every
    /// node that has state
    ///
    /// Selected names with no such node, or whose node has no parameters,
    /// are left out.
    pub fn capture(name: &str, graph: &Graph, selected: &[&str]) -> Snapshot {
        let mut mods = BTreeMap::new();
        if selected.is_empty() {
            mods.extend(graph.capture_states());
        } else {
            for node_name in selected {
                let Some(node) = graph.node_by_name(node_name) else {
                    warn!("Snapshot '{}': no node named '{}'", name, node_name);
                    continue;
                };
                let state = node.capture_state();
                if !state.is_null() {
                    mods.insert(node_name.to_string(), state);
                }
            }
        }
        debug!("Captured snapshot '{}' over {} nodes", name, mods.len());
        Snapshot {
            name: name.to_string(),
            timestamp: now_secs(),
            mods,
        }
    }

    /// Restore every node the snapshot names, remembering their current
    /// state for [`undo`](Self::undo)
    ///
    /// Returns the names of the nodes that were changed. Nodes missing from
    /// the graph are skipped with a warning. An apply that changes nothing
    /// keeps the previous undo state.
    pub fn apply(&mut self, graph: &mut Graph, snapshot: &Snapshot) -> BTreeSet<String> {
        let mut previous = BTreeMap::new();
        for name in snapshot.node_names() {
            if let Some(node) = graph.node_by_name(name) {
                previous.insert(name.to_string(), node.capture_state());
            }
        }

        let affected = restore_into(graph, &snapshot.mods);
        if !affected.is_empty() {
            self.undo = Some(Snapshot {
                name: format!("before {}", snapshot.name),
                timestamp: now_secs(),
                mods: previous,
            });
        }
        info!("Applied snapshot '{}' to {} nodes", snapshot.name, affected.len());
        affected
    }

    /// Put back the states the last [`apply`](Self::apply) replaced
    pub fn undo(&mut self, graph: &mut Graph) -> BTreeSet<String> {
        match self.undo.take() {
            Some(previous) => {
                let affected = restore_into(graph, &previous.mods);
                info!("Undid snapshot: restored {} nodes", affected.len());
                affected
            }
            None => BTreeSet::new(),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo.is_some()
    }

    pub fn save_to_slot(&mut self, index: usize, snapshot: Snapshot) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(snapshot);
                true
            }
            None => {
                error!("Invalid snapshot slot index: {}", index);
                false
            }
        }
    }

    pub fn slot(&self, index: usize) -> Option<&Snapshot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn is_slot_occupied(&self, index: usize) -> bool {
        self.slot(index).is_some()
    }

    pub fn clear_slot(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => {
                error!("Invalid snapshot slot index: {}", index);
                false
            }
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// First slot other than `except` holding a snapshot called `name`
    pub fn find_name_in_other_slot(&self, name: &str, except: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .find(|(i, s)| *i != except && s.as_ref().map_or(false, |s| s.name == name))
            .map(|(i, _)| i)
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
        self.undo = None;
    }

    pub fn file_path(folder: &Path, config_name: &str) -> PathBuf {
        folder.join(format!("{}.json", config_name))
    }

    /// Write the occupied slots to `<folder>/<config_name>.json`
    pub fn save_to_file(&self, folder: &Path, config_name: &str) -> ConfigResult<()> {
        fs::create_dir_all(folder)?;
        let file = SnapshotFile {
            version: FILE_VERSION.to_string(),
            snapshots: self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.clone().map(|s| (i.to_string(), s)))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ConfigError::SerdeError(e.to_string()))?;
        let path = Self::file_path(folder, config_name);
        fs::write(&path, json)?;
        info!("Saved {} snapshots to {}", file.snapshots.len(), path.display());
        Ok(())
    }

    /// Replace every slot with the contents of the configuration's file
    ///
    /// Slots and undo are cleared first. Returns Ok(false) when there is no
    /// file. Entries with a bad slot key are skipped.
    pub fn load_from_file(&mut self, folder: &Path, config_name: &str) -> ConfigResult<bool> {
        self.clear();
        let path = Self::file_path(folder, config_name);
        if !path.exists() {
            debug!("No snapshot file at {}", path.display());
            return Ok(false);
        }

        let content = fs::read_to_string(&path)?;
        let file: SnapshotFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        if file.version != FILE_VERSION {
            warn!("Snapshot file {} has version {}", path.display(), file.version);
        }

        for (key, snapshot) in file.snapshots {
            match key.parse::<usize>() {
                Ok(index) if index < NUM_SNAPSHOT_SLOTS => self.slots[index] = Some(snapshot),
                _ => warn!("Skipping snapshot with bad slot key '{}'", key),
            }
        }
        info!("Loaded {} snapshots from {}", self.occupied_count(), path.display());
        Ok(true)
    }
}

fn restore_into(graph: &mut Graph, mods: &BTreeMap<String, Value>) -> BTreeSet<String> {
    let mut affected = BTreeSet::new();
    for (name, state) in mods {
        match graph.node_by_name_mut(name) {
            Some(node) => {
                node.restore_state(state);
                affected.insert(name.clone());
            }
            None => warn!("Snapshot names missing node '{}', skipping", name),
        }
    }
    affected
}
