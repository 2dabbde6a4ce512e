//! Node factory keyed by type name
//!
//! The registry is ordinary state built once at startup and passed to the
//! loader; nothing about it is global. Constructors receive the node name,
//! its config map and a bag of shared resources (images, tables, anything a
//! node type needs that does not fit in a config string).

use crate::config::NodeConfig;
use crate::node::Node;
use crate::param::ParamSet;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, warn};

/// Builds a node, or returns None after logging why it could not
pub type NodeConstructor = Box<dyn Fn(&str, &NodeConfig, &Resources) -> Option<Box<dyn Node>> + Send + Sync>;

/// String-keyed shared payloads for node constructors
#[derive(Default)]
pub struct Resources {
    items: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.items.insert(key.to_string(), Box::new(value));
    }

    /// Typed lookup; None if missing or of another type
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.items.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Default)]
pub struct NodeRegistry {
    constructors: BTreeMap<String, NodeConstructor>,
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in node type
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtins(&mut registry);
        registry
    }

    /// Add or replace a constructor
    pub fn register<F>(&mut self, type_name: &str, constructor: F)
    where
        F: Fn(&str, &NodeConfig, &Resources) -> Option<Box<dyn Node>> + Send + Sync + 'static,
    {
        if self
            .constructors
            .insert(type_name.to_string(), Box::new(constructor))
            .is_some()
        {
            warn!("Node type {} registered twice; keeping the latest", type_name);
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build a node; unknown types log an error and return None
    pub fn create(
        &self,
        type_name: &str,
        name: &str,
        config: &NodeConfig,
        resources: &Resources,
    ) -> Option<Box<dyn Node>> {
        let Some(constructor) = self.constructors.get(type_name) else {
            error!("Unknown node type '{}' for node '{}'", type_name, name);
            return None;
        };
        let node = constructor(name, config, resources);
        if node.is_none() {
            error!("Failed to create node '{}' of type '{}'", name, type_name);
        }
        node
    }
}

/// Apply config entries that name parameters as manual baselines
///
/// Entries that do not name a parameter are left for the node's own
/// handling. Returns the number applied.
pub fn apply_param_overrides(params: &mut ParamSet, config: &NodeConfig) -> usize {
    let mut applied = 0;
    for (key, value) in config {
        if params.resolve(key).is_none() {
            continue;
        }
        match params.set_from_str(key, &value.as_text()) {
            Ok(()) => {
                debug!("Config override {} = {}", key, value.as_text());
                applied += 1;
            }
            Err(e) => warn!("{}", e),
        }
    }
    applied
}
