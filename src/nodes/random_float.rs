/// RandomFloat node - uniform random floats at a fractional rate
///
/// `CreatedPerUpdate` may be fractional: the remainder carries into the
/// next frame, so 0.25 emits one value every fourth frame and 2.5 emits two
/// and three on alternate frames. Each value is uniform in `Min..Max`.
use crate::config::NodeConfig;
use crate::graph::NodeContext;
use crate::node::Node;
use crate::param::{ParamSet, Parameter};
use crate::registry::apply_param_overrides;
use crate::value::{PortId, PortMap, Signal};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub const TYPE_NAME: &str = "RandomFloat";

pub const SOURCE_FLOAT: PortId = 1;

const PER_UPDATE: usize = 0;
const MIN: usize = 1;
const MAX: usize = 2;

pub struct RandomFloatNode {
    name: String,
    params: ParamSet,
    rng: StdRng,
    carry: f32,
}

impl RandomFloatNode {
    /// Seeded from entropy unless `seed` is given
    pub fn new(name: &str, seed: Option<u64>) -> Self {
        let params = ParamSet::new()
            .with(Parameter::new("CreatedPerUpdate", 1.0, 0.0, 100.0))
            .with(Parameter::new("Min", 0.0, 0.0, 1.0))
            .with(Parameter::new("Max", 1.0, 0.0, 1.0));
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            name: name.to_string(),
            params,
            rng,
            carry: 0.0,
        }
    }

    pub fn from_config(name: &str, config: &NodeConfig) -> Self {
        let seed = config
            .get("seed")
            .and_then(|v| v.as_f64())
            .map(|s| s.max(0.0) as u64);
        if let Some(seed) = seed {
            debug!("{}: seeded with {}", name, seed);
        }
        let mut node = Self::new(name, seed);
        apply_param_overrides(&mut node.params, config);
        node
    }

    /// How many values to emit this frame
    fn take_count(&mut self) -> usize {
        self.carry += self.params[PER_UPDATE].value().max(0.0);
        let whole = self.carry.floor();
        self.carry -= whole;
        whole as usize
    }
}

impl Node for RandomFloatNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn sources(&self) -> PortMap {
        &[("Float", SOURCE_FLOAT)]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_, '_>) {
        let count = self.take_count();
        let min = self.params[MIN].value();
        let max = self.params[MAX].value();
        for _ in 0..count {
            let v = min + self.rng.gen::<f32>() * (max - min);
            ctx.emit(SOURCE_FLOAT, Signal::Float(v));
        }
    }

    fn params(&self) -> Option<&ParamSet> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet> {
        Some(&mut self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValue;
    use crate::nodes::test_support::{floats, Rig};

    fn config(pairs: &[(&str, f64)]) -> NodeConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ConfigValue::Num(*v)))
            .collect()
    }

    #[test]
    fn test_fractional_rate_carries() {
        let mut node = RandomFloatNode::from_config("r", &config(&[("CreatedPerUpdate", 0.25)]));
        let counts: Vec<usize> = (0..8).map(|_| node.take_count()).collect();
        assert_eq!(counts, vec![0, 0, 0, 1, 0, 0, 0, 1]);

        let mut node = RandomFloatNode::from_config("r", &config(&[("CreatedPerUpdate", 2.5)]));
        let counts: Vec<usize> = (0..4).map(|_| node.take_count()).collect();
        assert_eq!(counts, vec![2, 3, 2, 3]);
    }

    #[test]
    fn test_values_in_range_and_seeded() {
        let run = || {
            let mut rig = Rig::new();
            rig.add(RandomFloatNode::from_config(
                "r",
                &config(&[("seed", 42.0), ("Min", 0.2), ("Max", 0.4), ("CreatedPerUpdate", 3.0)]),
            ));
            let (_, inbox) = rig.tap("out");
            rig.connect("r.Float -> out.In");
            for _ in 0..10 {
                rig.run_frame();
            }
            floats(&inbox)
        };

        let first = run();
        assert_eq!(first.len(), 30);
        assert!(first.iter().all(|(_, v)| (0.2..=0.4).contains(v)));
        assert_eq!(first, run());
    }

    #[test]
    fn test_zero_rate_emits_nothing() {
        let mut rig = Rig::new();
        rig.add(RandomFloatNode::from_config("r", &config(&[("CreatedPerUpdate", 0.0)])));
        let (_, inbox) = rig.tap("out");
        rig.connect("r.Float -> out.In");
        for _ in 0..5 {
            rig.run_frame();
        }
        assert!(floats(&inbox).is_empty());
    }
}
