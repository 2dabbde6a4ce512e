//! Named float parameters backed by blenders
//!
//! Nodes keep their tunables in a [`ParamSet`]. Each entry has a name, a
//! declared range and a [`ParameterBlender`]; the set maps names to
//! indices the same way for config overrides, cached state and diagnostics.

use crate::blender::{BlendConfig, ParameterBlender, Step};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Parameter lookup / parse failure
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    /// No parameter with this name
    Unknown(String),
    /// Value string could not be parsed as a float
    InvalidValue { name: String, value: String },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::Unknown(name) => write!(f, "Unknown parameter: {}", name),
            ParamError::InvalidValue { name, value } => {
                write!(f, "Invalid value '{}' for parameter {}", value, name)
            }
        }
    }
}

impl std::error::Error for ParamError {}

/// A float parameter with a manual baseline and its blender
#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    default: f32,
    blender: ParameterBlender<f32>,
}

impl Parameter {
    pub fn new(name: &str, default: f32, min: f32, max: f32) -> Self {
        Self::with_config(name, default, min, max, BlendConfig::SCALAR)
    }

    pub fn with_config(name: &str, default: f32, min: f32, max: f32, config: BlendConfig) -> Self {
        Self {
            name: name.to_string(),
            default,
            blender: ParameterBlender::new(default, min, max, config),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Blended output
    pub fn value(&self) -> f32 {
        self.blender.value()
    }

    pub fn manual(&self) -> f32 {
        self.blender.manual()
    }

    pub fn min(&self) -> f32 {
        self.blender.min()
    }

    pub fn max(&self) -> f32 {
        self.blender.max()
    }

    pub fn blender(&self) -> &ParameterBlender<f32> {
        &self.blender
    }

    pub fn blender_mut(&mut self) -> &mut ParameterBlender<f32> {
        &mut self.blender
    }

    /// Operator edit
    pub fn set_manual(&mut self, value: f32) {
        self.blender.set_manual(value);
    }

    /// Parse and apply a manual value from text (config overrides)
    ///
    /// Config values are baselines, so the output snaps to them.
    pub fn set_from_str(&mut self, text: &str) -> Result<(), ParamError> {
        let value: f32 = text
            .trim()
            .parse()
            .map_err(|_| ParamError::InvalidValue {
                name: self.name.clone(),
                value: text.to_string(),
            })?;
        self.blender.restore_manual(value);
        self.blender.sync_to_manual();
        Ok(())
    }

    pub fn update_auto(&mut self, value: f32, agency: f32, step: Step) {
        self.blender.update_auto(value, agency, step);
    }

    pub fn update_intent(&mut self, value: f32, strength: f32, label: Option<&str>, step: Step) {
        self.blender.update_intent(value, strength, label, step);
    }
}

/// Ordered parameters of one node, addressable by index or name
#[derive(Clone, Debug, Default)]
pub struct ParamSet {
    params: Vec<Parameter>,
    name_to_index: HashMap<String, usize>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its index
    pub fn add(&mut self, param: Parameter) -> usize {
        let index = self.params.len();
        self.name_to_index.insert(param.name.to_lowercase(), index);
        self.params.push(param);
        index
    }

    pub fn with(mut self, param: Parameter) -> Self {
        self.add(param);
        self
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.params.iter_mut()
    }

    /// Resolve a name: exact (case-insensitive) first, then unique prefix
    pub fn resolve(&self, name: &str) -> Option<usize> {
        let name_lower = name.to_lowercase();
        if let Some(&index) = self.name_to_index.get(&name_lower) {
            return Some(index);
        }

        let mut matches = self
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.name.to_lowercase().starts_with(&name_lower));
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.resolve(name).map(|i| &self.params[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.resolve(name).map(move |i| &mut self.params[i])
    }

    /// Apply a textual manual value to a named parameter
    pub fn set_from_str(&mut self, name: &str, text: &str) -> Result<(), ParamError> {
        match self.get_mut(name) {
            Some(param) => param.set_from_str(text),
            None => Err(ParamError::Unknown(name.to_string())),
        }
    }

    /// Advance every blender that did not move this frame
    pub fn tick_all(&mut self, step: Step) {
        for p in &mut self.params {
            p.blender.tick(step);
        }
    }

    /// Push the live agency into every blender
    pub fn set_agency(&mut self, agency: f32) {
        for p in &mut self.params {
            p.blender.set_agency(agency);
        }
    }

    /// Manual values keyed by name
    pub fn capture(&self) -> Value {
        let map: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), Value::from(p.manual() as f64)))
            .collect();
        Value::Object(map)
    }

    /// Reapply manual values captured earlier; unknown names are ignored
    pub fn restore(&mut self, state: &Value) -> usize {
        let Some(map) = state.as_object() else {
            return 0;
        };
        let mut restored = 0;
        for (name, value) in map {
            let Some(v) = value.as_f64() else { continue };
            if let Some(&index) = self.name_to_index.get(&name.to_lowercase()) {
                let blender = &mut self.params[index].blender;
                blender.restore_manual(v as f32);
                blender.sync_to_manual();
                restored += 1;
            }
        }
        restored
    }
}

impl Index<usize> for ParamSet {
    type Output = Parameter;

    fn index(&self, index: usize) -> &Parameter {
        &self.params[index]
    }
}

impl IndexMut<usize> for ParamSet {
    fn index_mut(&mut self, index: usize) -> &mut Parameter {
        &mut self.params[index]
    }
}
