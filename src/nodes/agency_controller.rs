/// AgencyController node - activity-driven auto agency and rationed events
///
/// A `Characteristic` stream (any 0..1 signal describing the material)
/// charges a budget in proportion to how fast it changes. The budget decays
/// slowly, is shaped into `AutoAgency`, and pays for discrete `Trigger`
/// events when a `Pulse` crosses the threshold. Wire `AutoAgency` into the
/// host's `AgencyAuto` sink and `Trigger` into whatever should react.
///
/// ```text
/// stimulus = smooth(|Δ smooth(characteristic)|)
/// budget   = clamp(budget + ChargeGain * stimulus - DecayPerSec * dt, 0, 1)
/// auto     = AutoAgencyScale * budget ^ AutoAgencyGamma
/// ```
use crate::blender::smooth_to;
use crate::config::NodeConfig;
use crate::graph::NodeContext;
use crate::node::Node;
use crate::param::{ParamSet, Parameter};
use crate::registry::apply_param_overrides;
use crate::value::{PortId, PortMap, Signal};
use tracing::{debug, error};

pub const TYPE_NAME: &str = "AgencyController";

pub const SINK_CHARACTERISTIC: PortId = 10;
pub const SINK_PULSE: PortId = 20;

pub const SOURCE_AUTO_AGENCY: PortId = 10;
pub const SOURCE_TRIGGER: PortId = 20;

/// Longest frame step the controller integrates over
const MAX_DT: f32 = 0.1;

const CHARACTERISTIC_SMOOTH_SEC: usize = 0;
const STIMULUS_SMOOTH_SEC: usize = 1;
const CHARGE_GAIN: usize = 2;
const DECAY_PER_SEC: usize = 3;
const AUTO_AGENCY_SCALE: usize = 4;
const AUTO_AGENCY_GAMMA: usize = 5;
const PULSE_THRESHOLD: usize = 6;
const EVENT_COST: usize = 7;
const COOLDOWN_SEC: usize = 8;

/// Smoother where a non-positive time constant jumps straight to target
fn approach(current: f32, target: f32, dt: f32, tau: f32) -> f32 {
    if tau <= 0.0 {
        return target;
    }
    smooth_to(current, target, dt.max(0.0), tau)
}

pub struct AgencyControllerNode {
    name: String,
    params: ParamSet,

    characteristic_max: f32,
    pulse_max: f32,

    characteristic_smooth: f32,
    characteristic_prev: f32,
    stimulus: f32,
    budget: f32,
    auto_agency: f32,

    triggered: bool,
    last_trigger: Option<f32>,
}

impl AgencyControllerNode {
    pub fn new(name: &str) -> Self {
        let params = ParamSet::new()
            .with(Parameter::new("CharacteristicSmoothSec", 0.35, 0.0, 5.0))
            .with(Parameter::new("StimulusSmoothSec", 0.10, 0.0, 5.0))
            .with(Parameter::new("ChargeGain", 2.0, 0.0, 50.0))
            .with(Parameter::new("DecayPerSec", 0.12, 0.0, 2.0))
            .with(Parameter::new("AutoAgencyScale", 0.6, 0.0, 1.0))
            .with(Parameter::new("AutoAgencyGamma", 0.7, 0.1, 3.0))
            .with(Parameter::new("PulseThreshold", 0.8, 0.0, 1.0))
            .with(Parameter::new("EventCost", 0.2, 0.0, 1.0))
            .with(Parameter::new("CooldownSec", 1.5, 0.0, 10.0));
        Self {
            name: name.to_string(),
            params,
            characteristic_max: 0.0,
            pulse_max: 0.0,
            characteristic_smooth: 0.0,
            characteristic_prev: 0.0,
            stimulus: 0.0,
            budget: 0.0,
            auto_agency: 0.0,
            triggered: false,
            last_trigger: None,
        }
    }

    pub fn from_config(name: &str, config: &NodeConfig) -> Self {
        let mut node = Self::new(name);
        apply_param_overrides(&mut node.params, config);
        node
    }

    pub fn budget(&self) -> f32 {
        self.budget
    }

    pub fn stimulus(&self) -> f32 {
        self.stimulus
    }

    pub fn auto_agency(&self) -> f32 {
        self.auto_agency
    }

    pub fn characteristic(&self) -> f32 {
        self.characteristic_smooth
    }

    /// Seconds since the last trigger, infinite if none yet
    pub fn seconds_since_trigger(&self, now: f32) -> f32 {
        self.last_trigger.map_or(f32::INFINITY, |t| now - t)
    }

    fn p(&self, index: usize) -> f32 {
        self.params[index].value()
    }

    fn integrate(&mut self, dt: f32) {
        let raw = self.characteristic_max.clamp(0.0, 1.0);
        self.characteristic_max = 0.0;

        self.characteristic_smooth = approach(
            self.characteristic_smooth,
            raw,
            dt,
            self.p(CHARACTERISTIC_SMOOTH_SEC),
        );
        let stimulus_raw = (self.characteristic_smooth - self.characteristic_prev).abs();
        self.characteristic_prev = self.characteristic_smooth;
        self.stimulus = approach(self.stimulus, stimulus_raw, dt, self.p(STIMULUS_SMOOTH_SEC));

        let charge = self.p(CHARGE_GAIN) * self.stimulus;
        let decay = self.p(DECAY_PER_SEC) * dt;
        self.budget = (self.budget + charge - decay).clamp(0.0, 1.0);

        let gamma = self.p(AUTO_AGENCY_GAMMA).max(0.1);
        self.auto_agency = (self.p(AUTO_AGENCY_SCALE) * self.budget.powf(gamma)).clamp(0.0, 1.0);
    }

    /// Spend budget on an event if the pulse, budget and cooldown allow it
    fn gate_pulse(&mut self, now: f32) -> bool {
        let pulse = self.pulse_max;
        self.pulse_max = 0.0;

        let cost = self.p(EVENT_COST);
        if pulse <= self.p(PULSE_THRESHOLD) || self.budget < cost {
            return false;
        }
        if self.seconds_since_trigger(now) < self.p(COOLDOWN_SEC) {
            debug!("{}: pulse {:.2} inside cooldown", self.name, pulse);
            return false;
        }
        self.last_trigger = Some(now);
        self.budget = (self.budget - cost).max(0.0);
        true
    }
}

impl Node for AgencyControllerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn sinks(&self) -> PortMap {
        &[("Characteristic", SINK_CHARACTERISTIC), ("Pulse", SINK_PULSE)]
    }

    fn sources(&self) -> PortMap {
        &[("AutoAgency", SOURCE_AUTO_AGENCY), ("Trigger", SOURCE_TRIGGER)]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_, '_>) {
        self.triggered = false;
        let dt = ctx.dt().clamp(0.0, MAX_DT);

        self.integrate(dt);
        ctx.emit(SOURCE_AUTO_AGENCY, Signal::Float(self.auto_agency));

        if self.gate_pulse(ctx.time()) {
            self.triggered = true;
            ctx.emit(SOURCE_TRIGGER, Signal::Float(1.0));
        }
    }

    fn receive(&mut self, port: PortId, signal: &Signal, _ctx: &mut NodeContext<'_, '_>) {
        let Some(v) = signal.as_float() else {
            error!("{}: expected a float, got {}", self.name, signal.kind());
            return;
        };
        match port {
            SINK_CHARACTERISTIC => self.characteristic_max = self.characteristic_max.max(v),
            SINK_PULSE => self.pulse_max = self.pulse_max.max(v),
            _ => error!("{}: float receive for unknown sink {}", self.name, port),
        }
    }

    fn params(&self) -> Option<&ParamSet> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet> {
        Some(&mut self.params)
    }

    fn triggered_this_frame(&self) -> bool {
        self.triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::test_support::{floats, Rig};

    #[test]
    fn test_steady_input_builds_no_budget() {
        let mut node = AgencyControllerNode::new("ac");
        for _ in 0..1200 {
            node.characteristic_max = 0.5;
            node.integrate(1.0 / 60.0);
        }
        // Once the smoother settles the stimulus fades and decay wins
        assert!(node.stimulus() < 1e-4);
        assert_eq!(node.budget(), 0.0);
        assert_eq!(node.auto_agency(), 0.0);
    }

    #[test]
    fn test_changing_input_charges_budget() {
        let mut node = AgencyControllerNode::new("ac");
        for i in 0..120 {
            node.characteristic_max = if (i / 10) % 2 == 0 { 1.0 } else { 0.0 };
            node.integrate(1.0 / 60.0);
        }
        assert!(node.budget() > 0.5, "budget {}", node.budget());
        let expected = 0.6 * node.budget().powf(0.7);
        assert!((node.auto_agency() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_zero_time_constant_jumps() {
        assert_eq!(approach(0.0, 0.7, 0.016, 0.0), 0.7);
        assert_eq!(approach(0.2, 0.7, 0.0, 0.5), 0.2);
    }

    #[test]
    fn test_pulse_gating() {
        let mut node = AgencyControllerNode::new("ac");
        node.budget = 0.5;

        node.pulse_max = 0.5;
        assert!(!node.gate_pulse(0.0), "below threshold");

        node.pulse_max = 0.9;
        assert!(node.gate_pulse(0.0));
        assert!((node.budget() - 0.3).abs() < 1e-6);
        assert_eq!(node.seconds_since_trigger(1.0), 1.0);

        node.pulse_max = 0.9;
        assert!(!node.gate_pulse(1.0), "cooldown");

        node.pulse_max = 0.9;
        assert!(node.gate_pulse(1.5));
        assert!((node.budget() - 0.1).abs() < 1e-6);

        node.pulse_max = 0.9;
        assert!(!node.gate_pulse(10.0), "budget exhausted");
    }

    #[test]
    fn test_trigger_reported_to_graph() {
        let mut rig = Rig::new();
        let (outbox, _) = rig.tap("src");
        let id = rig.add(AgencyControllerNode::new("ac"));
        let (_, inbox) = rig.tap("out");
        rig.connect(
            "src.Out -> ac.Characteristic\n\
             src.Out2 -> ac.Pulse\n\
             ac.AutoAgency -> out.In\n\
             ac.Trigger -> out.In2\n\
             ac.AutoAgency -> .AgencyAuto",
        );

        let mut fired_frames = Vec::new();
        for frame in 0..240 {
            {
                let mut q = outbox.lock().unwrap();
                let level = if (frame / 8) % 2 == 0 { 1.0 } else { 0.0 };
                q.push((1, Signal::Float(level)));
                q.push((2, Signal::Float(1.0)));
            }
            if rig.run_frame().contains(&id) {
                fired_frames.push(frame);
            }
        }

        let triggers: Vec<f32> = floats(&inbox)
            .into_iter()
            .filter(|(p, _)| *p == 2)
            .map(|(_, v)| v)
            .collect();
        assert!(!triggers.is_empty());
        assert_eq!(triggers.len(), fired_frames.len());
        // 240 frames at 60fps is four seconds; 1.5s cooldown allows three
        assert!(fired_frames.len() <= 3);
        assert!(rig.host.agency() > 0.0);
    }
}
