/// VectorMagnitude node - per-frame mean and max length of incoming vectors
///
/// Every vector received during a frame contributes the length of its
/// selected components. On update the frame's mean and max are normalised
/// into 0..1 against the `Min`/`Max` parameters, smoothed, and emitted on
/// `MeanScalar` and `MaxScalar`. A frame with no input lets both states
/// decay toward zero.
///
/// The `Components` config entry picks which components count:
/// `xy`, `zw`, `xyz` or `xyzw` (default `zw`, the velocity half of a
/// point-velocity vec4).
use crate::config::NodeConfig;
use crate::graph::NodeContext;
use crate::node::Node;
use crate::param::{ParamSet, Parameter};
use crate::registry::apply_param_overrides;
use crate::value::{PortId, PortMap, Signal};
use tracing::{error, warn};

pub const TYPE_NAME: &str = "VectorMagnitude";

pub const SINK_VEC2: PortId = 10;
pub const SINK_VEC3: PortId = 11;
pub const SINK_VEC4: PortId = 12;
/// Alias of `Vec4` for point-velocity streams
pub const SINK_POINT_VELOCITY: PortId = 12;

pub const SOURCE_MEAN: PortId = 20;
pub const SOURCE_MAX: PortId = 21;

const MIN: usize = 0;
const MAX: usize = 1;
const MEAN_SMOOTHING: usize = 2;
const MAX_SMOOTHING: usize = 3;
const DECAY: usize = 4;

/// Which vector components contribute to the length
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Components {
    Xy,
    #[default]
    Zw,
    Xyz,
    Xyzw,
}

impl Components {
    /// Case-insensitive parse; None for anything unrecognised
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "xy" => Some(Components::Xy),
            "zw" => Some(Components::Zw),
            "xyz" => Some(Components::Xyz),
            "xyzw" => Some(Components::Xyzw),
            _ => None,
        }
    }

    /// Length of `v` using the components this selection allows
    ///
    /// Requests a vector cannot satisfy fall back: a vec2 always uses xy,
    /// a vec3 uses xyz only when asked for it, a vec4 defaults to zw.
    pub fn magnitude(self, v: &[f32]) -> f32 {
        let picked: &[f32] = match (v.len(), self) {
            (2, _) => &v[0..2],
            (3, Components::Xyz) => &v[0..3],
            (3, _) => &v[0..2],
            (4, Components::Xy) => &v[0..2],
            (4, Components::Xyzw) => v,
            (4, _) => &v[2..4],
            _ => v,
        };
        picked.iter().map(|c| c * c).sum::<f32>().sqrt()
    }
}

pub struct VectorMagnitudeNode {
    name: String,
    params: ParamSet,
    components: Components,

    sum: f32,
    count: u32,
    frame_max: f32,

    mean_state: f32,
    max_state: f32,
}

impl VectorMagnitudeNode {
    pub fn new(name: &str, components: Components) -> Self {
        let params = ParamSet::new()
            .with(Parameter::new("Min", 0.0, 0.0, 1.0))
            .with(Parameter::new("Max", 0.02, 0.00001, 1.0))
            .with(Parameter::new("MeanSmoothing", 0.9, 0.0, 1.0))
            .with(Parameter::new("MaxSmoothing", 0.85, 0.0, 1.0))
            .with(Parameter::new("DecayWhenNoInput", 0.95, 0.0, 1.0));
        Self {
            name: name.to_string(),
            params,
            components,
            sum: 0.0,
            count: 0,
            frame_max: 0.0,
            mean_state: 0.0,
            max_state: 0.0,
        }
    }

    pub fn from_config(name: &str, config: &NodeConfig) -> Self {
        let components = match config.get("Components").or_else(|| config.get("components")) {
            Some(value) => {
                let text = value.as_text();
                Components::parse(&text).unwrap_or_else(|| {
                    warn!("{}: unknown Components '{}', using zw", name, text);
                    Components::default()
                })
            }
            None => Components::default(),
        };
        let mut node = Self::new(name, components);
        apply_param_overrides(&mut node.params, config);
        node
    }

    pub fn components(&self) -> Components {
        self.components
    }

    /// Smoothed normalised mean
    pub fn mean(&self) -> f32 {
        self.mean_state
    }

    /// Smoothed normalised max
    pub fn max(&self) -> f32 {
        self.max_state
    }

    fn accumulate(&mut self, magnitude: f32) {
        if !magnitude.is_finite() {
            return;
        }
        self.sum += magnitude;
        self.count += 1;
        self.frame_max = self.frame_max.max(magnitude);
    }

    fn normalise(&self, v: f32) -> f32 {
        let min = self.params[MIN].value();
        let mut max = self.params[MAX].value();
        if max <= min {
            max = min + 1e-6;
        }
        ((v - min) / (max - min)).clamp(0.0, 1.0)
    }
}

fn smooth(state: f32, target: f32, smoothing: f32) -> f32 {
    let s = smoothing.clamp(0.0, 1.0);
    state * s + target * (1.0 - s)
}

impl Node for VectorMagnitudeNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn sinks(&self) -> PortMap {
        &[
            ("Vec2", SINK_VEC2),
            ("Vec3", SINK_VEC3),
            ("Vec4", SINK_VEC4),
            ("PointVelocity", SINK_POINT_VELOCITY),
        ]
    }

    fn sources(&self) -> PortMap {
        &[("MeanScalar", SOURCE_MEAN), ("MaxScalar", SOURCE_MAX)]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_, '_>) {
        let (mean, max) = if self.count > 0 {
            (self.sum / self.count as f32, self.frame_max)
        } else {
            let decay = self.params[DECAY].value().clamp(0.0, 1.0);
            self.mean_state *= decay;
            self.max_state *= decay;
            (0.0, 0.0)
        };
        self.sum = 0.0;
        self.count = 0;
        self.frame_max = 0.0;

        let mean = self.normalise(mean);
        let max = self.normalise(max);
        self.mean_state = smooth(self.mean_state, mean, self.params[MEAN_SMOOTHING].value());
        self.max_state = smooth(self.max_state, max, self.params[MAX_SMOOTHING].value());

        ctx.emit(SOURCE_MEAN, Signal::Float(self.mean_state));
        ctx.emit(SOURCE_MAX, Signal::Float(self.max_state));
    }

    fn receive(&mut self, port: PortId, signal: &Signal, _ctx: &mut NodeContext<'_, '_>) {
        let magnitude = match (port, signal) {
            (SINK_VEC2, Signal::Vec2(v)) => self.components.magnitude(v),
            (SINK_VEC3, Signal::Vec3(v)) => self.components.magnitude(v),
            (SINK_VEC4, Signal::Vec4(v)) => self.components.magnitude(v),
            (SINK_VEC2 | SINK_VEC3 | SINK_VEC4, other) => {
                error!("{}: sink {} got {}", self.name, port, other.kind());
                return;
            }
            _ => {
                error!("{}: unknown sink {}", self.name, port);
                return;
            }
        };
        self.accumulate(magnitude);
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
    use crate::nodes::test_support::{floats, Rig, Shared};

    #[test]
    fn test_component_selection() {
        let v4 = [3.0, 4.0, 0.6, 0.8];
        assert!((Components::Zw.magnitude(&v4) - 1.0).abs() < 1e-5);
        assert_eq!(Components::Xy.magnitude(&v4), 5.0);
        assert!((Components::Xyzw.magnitude(&v4) - 26.0f32.sqrt()).abs() < 1e-5);
        // xyz on a vec4 falls back to zw
        assert!((Components::Xyz.magnitude(&v4) - 1.0).abs() < 1e-5);

        let v3 = [3.0, 4.0, 12.0];
        assert_eq!(Components::Xyz.magnitude(&v3), 13.0);
        assert_eq!(Components::Zw.magnitude(&v3), 5.0);
        assert_eq!(Components::Xyzw.magnitude(&[3.0, 4.0]), 5.0);
    }

    #[test]
    fn test_components_from_config() {
        assert_eq!(Components::parse(" XYZ "), Some(Components::Xyz));
        assert_eq!(Components::parse("w"), None);

        let mut config = NodeConfig::new();
        config.insert("Components".to_string(), ConfigValue::from("xy"));
        config.insert("Max".to_string(), ConfigValue::Num(1.0));
        let node = VectorMagnitudeNode::from_config("vm", &config);
        assert_eq!(node.components(), Components::Xy);
        assert_eq!(node.params[MAX].value(), 1.0);

        let node = VectorMagnitudeNode::from_config("vm", &NodeConfig::new());
        assert_eq!(node.components(), Components::Zw);
    }

    fn rig_with(config: &NodeConfig, sink: &str) -> (Rig, Shared, Shared) {
        let mut rig = Rig::new();
        let (outbox, _) = rig.tap("points");
        rig.add(VectorMagnitudeNode::from_config("vm", config));
        let (_, inbox) = rig.tap("out");
        rig.connect(&format!(
            "points.Out -> vm.{}\nvm.MeanScalar -> out.In\nvm.MaxScalar -> out.In2",
            sink
        ));
        (rig, outbox, inbox)
    }

    fn last_on(inbox: &Shared, port: PortId) -> f32 {
        floats(inbox)
            .iter()
            .rev()
            .find(|(p, _)| *p == port)
            .map(|(_, v)| *v)
            .unwrap()
    }

    #[test]
    fn test_mean_and_max_converge() {
        let mut config = NodeConfig::new();
        config.insert("Components".to_string(), ConfigValue::from("xy"));
        config.insert("Max".to_string(), ConfigValue::Num(1.0));
        let (mut rig, outbox, inbox) = rig_with(&config, "Vec2");

        for _ in 0..200 {
            {
                let mut q = outbox.lock().unwrap();
                q.push((1, Signal::Vec2([0.2, 0.0])));
                q.push((1, Signal::Vec2([0.0, 0.6])));
            }
            rig.run_frame();
        }

        let mean = last_on(&inbox, 1);
        let max = last_on(&inbox, 2);
        assert!((mean - 0.4).abs() < 1e-3, "mean {}", mean);
        assert!((max - 0.6).abs() < 1e-3, "max {}", max);
    }

    #[test]
    fn test_decay_without_input() {
        let mut config = NodeConfig::new();
        config.insert("Max".to_string(), ConfigValue::Num(1.0));
        let (mut rig, outbox, inbox) = rig_with(&config, "PointVelocity");

        for _ in 0..100 {
            outbox.lock().unwrap().push((1, Signal::Vec4([9.0, 9.0, 0.5, 0.0])));
            rig.run_frame();
        }
        let held = last_on(&inbox, 1);
        assert!((held - 0.5).abs() < 1e-3, "mean {}", held);

        rig.run_frame();
        // Decay and smoothing toward zero both apply on an empty frame
        let once = last_on(&inbox, 1);
        assert!((once - held * 0.95 * 0.9).abs() < 1e-4, "mean {}", once);

        for _ in 0..60 {
            rig.run_frame();
        }
        assert!(last_on(&inbox, 1) < 1e-3);
        assert!(last_on(&inbox, 2) < 1e-3);
    }

    #[test]
    fn test_normalise_degenerate_range() {
        let mut config = NodeConfig::new();
        config.insert("Min".to_string(), ConfigValue::Num(0.5));
        config.insert("Max".to_string(), ConfigValue::Num(0.1));
        let node = VectorMagnitudeNode::from_config("vm", &config);
        assert_eq!(node.normalise(0.4), 0.0);
        assert_eq!(node.normalise(0.6), 1.0);
    }

    #[test]
    fn test_wrong_kind_ignored() {
        let (mut rig, outbox, inbox) = rig_with(&NodeConfig::new(), "Vec2");
        outbox.lock().unwrap().push((1, Signal::Float(3.0)));
        rig.run_frame();
        // Still emits, as an empty frame
        assert_eq!(floats(&inbox), vec![(1, 0.0), (2, 0.0)]);
    }
}
