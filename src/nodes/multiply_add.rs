/// MultiplyAdd node - scales and offsets a float stream
///
/// `float` out = `float` in * Multiplier + Adder. Both coefficients are
/// blended parameters, so a connection into `Multiplier` or `Adder` moves
/// them autonomously in proportion to agency while the config value stays
/// the manual baseline.
use crate::blender::Step;
use crate::config::NodeConfig;
use crate::graph::NodeContext;
use crate::intent::Intent;
use crate::mapping::{IntentMap, Mapping};
use crate::node::{Node, AGENCY_FACTOR_PARAM};
use crate::param::{ParamSet, Parameter};
use crate::registry::apply_param_overrides;
use crate::value::{PortId, PortMap, Signal};
use tracing::error;

pub const TYPE_NAME: &str = "MultiplyAdd";

pub const SINK_MULTIPLIER: PortId = 10;
pub const SINK_ADDER: PortId = 11;
pub const SINK_FLOAT: PortId = 20;
pub const SOURCE_FLOAT: PortId = 30;

const MULTIPLIER: usize = 0;
const ADDER: usize = 1;

/// Intent changes below this strength are not worth the blend work
const MIN_INTENT_STRENGTH: f32 = 0.01;

pub struct MultiplyAddNode {
    name: String,
    params: ParamSet,
}

impl MultiplyAddNode {
    pub fn new(name: &str) -> Self {
        let params = ParamSet::new()
            .with(Parameter::new("Multiplier", 1.0, -4.0, 4.0))
            .with(Parameter::new("Adder", 0.0, -1.0, 1.0))
            .with(Parameter::new(AGENCY_FACTOR_PARAM, 1.0, 0.0, 1.0));
        Self {
            name: name.to_string(),
            params,
        }
    }

    /// Build with parameter overrides taken from config
    pub fn from_config(name: &str, config: &NodeConfig) -> Self {
        let mut node = Self::new(name);
        apply_param_overrides(&mut node.params, config);
        node
    }

    pub fn multiplier(&self) -> f32 {
        self.params[MULTIPLIER].value()
    }

    pub fn adder(&self) -> f32 {
        self.params[ADDER].value()
    }
}

impl Node for MultiplyAddNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn sinks(&self) -> PortMap {
        &[
            ("Multiplier", SINK_MULTIPLIER),
            ("Adder", SINK_ADDER),
            ("float", SINK_FLOAT),
        ]
    }

    fn sources(&self) -> PortMap {
        &[("float", SOURCE_FLOAT)]
    }

    fn receive(&mut self, port: PortId, signal: &Signal, ctx: &mut NodeContext<'_, '_>) {
        let Some(v) = signal.as_float() else {
            error!("{}: expected a float, got {}", self.name, signal.kind());
            return;
        };
        match port {
            SINK_MULTIPLIER => self.params[MULTIPLIER].update_auto(v, ctx.agency(), ctx.step()),
            SINK_ADDER => self.params[ADDER].update_auto(v, ctx.agency(), ctx.step()),
            SINK_FLOAT => {
                let out = v * self.multiplier() + self.adder();
                ctx.emit(SOURCE_FLOAT, Signal::Float(out));
            }
            _ => error!("{}: unknown sink {}", self.name, port),
        }
    }

    fn apply_intent(&mut self, intent: &Intent, strength: f32, step: Step) {
        if strength < MIN_INTENT_STRENGTH {
            return;
        }
        let m = IntentMap::new(intent);
        m.e().exp(&mut self.params[MULTIPLIER], strength, 2.0, step);

        let offset = m.d().get() * 0.6 + m.g().get() * 0.4;
        Mapping::new(offset, "D*0.6+G*0.4").exp(&mut self.params[ADDER], strength, 2.0, step);
    }

    fn params(&self) -> Option<&ParamSet> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet> {
        Some(&mut self.params)
    }
}
