//! Manual / autonomous / intent blending for a single parameter
//!
//! A [`ParameterBlender`] sits between three sources of truth for a value:
//!
//! - the **manual** baseline an operator sets,
//! - an **autonomous** stream arriving over a connection, weighted by agency,
//! - an **intent** target derived from the active intent, weighted by strength.
//!
//! The weighted target is first rate-limited (the value never moves more
//! than `rate_per_sec * dt` in one step) and then approached with a one-pole
//! exponential smoother:
//!
//! ```text
//! limited = current + clamp(target - current, -rate * dt, rate * dt)
//! alpha   = 1 - exp(-dt / max(tau, MIN_TIME_CONSTANT))
//! current = current + (limited - current) * alpha
//! ```
//!
//! Colour parameters use their own, faster constants ([`BlendConfig::COLOR`]).

use crate::value::Rgba;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest time constant used by any smoother (seconds)
pub const MIN_TIME_CONSTANT: f32 = 1e-4;

/// How long after a manual edit the manual value keeps full priority
pub const MANUAL_ACTIVE_SEC: f32 = 0.5;

/// Rate limit and smoothing constants for one parameter
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendConfig {
    /// Maximum change per second (per channel for colours)
    pub rate_per_sec: f32,
    /// One-pole smoothing time constant in seconds
    pub smooth_tau: f32,
}

impl BlendConfig {
    /// Geometric and behavioural parameters
    pub const SCALAR: BlendConfig = BlendConfig {
        rate_per_sec: 4.0,
        smooth_tau: 0.3,
    };

    /// Colours track faster so hue shifts never lag visibly
    pub const COLOR: BlendConfig = BlendConfig {
        rate_per_sec: 8.0,
        smooth_tau: 0.1,
    };

    pub fn new(rate_per_sec: f32, smooth_tau: f32) -> Self {
        Self {
            rate_per_sec: rate_per_sec.max(0.0),
            smooth_tau,
        }
    }
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self::SCALAR
    }
}

/// Engine-wide manual bias behaviour
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasSettings {
    /// Time constant for the bias to fall back after a manual edit
    pub manual_bias_decay_sec: f32,
    /// Share of the human side that always stays manual
    pub base_manual_bias: f32,
}

impl Default for BiasSettings {
    fn default() -> Self {
        Self {
            manual_bias_decay_sec: 0.8,
            base_manual_bias: 0.1,
        }
    }
}

/// Time step handed to a blender
///
/// Steps stamped with a frame number integrate at most once per frame: a
/// second update in the same frame only records its inputs. Unstamped steps
/// (`Step::new`) always integrate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    pub dt: f32,
    pub frame: Option<u64>,
    pub bias: BiasSettings,
}

impl Step {
    pub fn new(dt: f32) -> Self {
        Self {
            dt,
            frame: None,
            bias: BiasSettings::default(),
        }
    }

    pub fn for_frame(dt: f32, frame: u64, bias: BiasSettings) -> Self {
        Self {
            dt,
            frame: Some(frame),
            bias,
        }
    }
}

/// One-pole coefficient for a step of `dt` seconds
///
/// Zero or negative `dt` yields 0 so nothing moves while time is paused.
pub fn smoothing_alpha(dt: f32, tau: f32) -> f32 {
    if !(dt > 0.0) {
        return 0.0;
    }
    1.0 - (-dt / tau.max(MIN_TIME_CONSTANT)).exp()
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Exponential approach of a plain float
pub fn smooth_to(current: f32, target: f32, dt: f32, tau: f32) -> f32 {
    current + (target - current) * smoothing_alpha(dt, tau)
}

/// Value types a blender can drive
pub trait Blendable: Copy + PartialEq + fmt::Debug {
    fn lerp_to(self, other: Self, t: f32) -> Self;

    /// Combine the three sources, always passed as `(auto, w_auto)`,
    /// `(manual, w_manual)`, `(intent, w_intent)` with weights already
    /// normalised. Continuous types take the weighted sum.
    fn mix3(a: (Self, f32), b: (Self, f32), c: (Self, f32)) -> Self;

    /// Move toward `target` by at most `max_step` per component
    fn step_toward(self, target: Self, max_step: f32) -> Self;

    fn clamp_between(self, min: Self, max: Self) -> Self;
}

fn step_scalar(current: f32, target: f32, max_step: f32) -> f32 {
    current + (target - current).clamp(-max_step, max_step)
}

fn clamp_scalar(v: f32, min: f32, max: f32) -> f32 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    v.clamp(lo, hi)
}

impl Blendable for f32 {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        lerp(self, other, t)
    }

    fn mix3(a: (Self, f32), b: (Self, f32), c: (Self, f32)) -> Self {
        a.0 * a.1 + b.0 * b.1 + c.0 * c.1
    }

    fn step_toward(self, target: Self, max_step: f32) -> Self {
        step_scalar(self, target, max_step)
    }

    fn clamp_between(self, min: Self, max: Self) -> Self {
        clamp_scalar(self, min, max)
    }
}

impl Blendable for Rgba {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        Rgba::new(
            lerp(self.r, other.r, t),
            lerp(self.g, other.g, t),
            lerp(self.b, other.b, t),
            lerp(self.a, other.a, t),
        )
    }

    // Alpha is blended like every other channel.
    fn mix3(a: (Self, f32), b: (Self, f32), c: (Self, f32)) -> Self {
        Rgba::new(
            f32::mix3((a.0.r, a.1), (b.0.r, b.1), (c.0.r, c.1)),
            f32::mix3((a.0.g, a.1), (b.0.g, b.1), (c.0.g, c.1)),
            f32::mix3((a.0.b, a.1), (b.0.b, b.1), (c.0.b, c.1)),
            f32::mix3((a.0.a, a.1), (b.0.a, b.1), (c.0.a, c.1)),
        )
    }

    fn step_toward(self, target: Self, max_step: f32) -> Self {
        Rgba::new(
            step_scalar(self.r, target.r, max_step),
            step_scalar(self.g, target.g, max_step),
            step_scalar(self.b, target.b, max_step),
            step_scalar(self.a, target.a, max_step),
        )
    }

    fn clamp_between(self, min: Self, max: Self) -> Self {
        Rgba::new(
            clamp_scalar(self.r, min.r, max.r),
            clamp_scalar(self.g, min.g, max.g),
            clamp_scalar(self.b, min.b, max.b),
            clamp_scalar(self.a, min.a, max.a),
        )
    }
}

/// Position on a circle in turns, kept in `[0, 1)`
///
/// Hue and rotation parameters blend along the shortest arc, so a move from
/// 0.95 to 0.05 passes through 0.0 instead of sweeping back across 0.5.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Angle(pub f32);

impl Angle {
    pub fn new(turns: f32) -> Self {
        Angle(wrap_turns(turns))
    }

    /// Signed shortest distance to `other`, in `[-0.5, 0.5)`
    pub fn delta_to(self, other: Angle) -> f32 {
        (other.0 - self.0 + 0.5).rem_euclid(1.0) - 0.5
    }
}

fn wrap_turns(v: f32) -> f32 {
    if !v.is_finite() {
        return 0.0;
    }
    let w = v.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negatives
    if w >= 1.0 {
        0.0
    } else {
        w
    }
}

impl Blendable for Angle {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        Angle::new(self.0 + self.delta_to(other) * t)
    }

    // Manual joins auto first, then intent joins that pair.
    fn mix3(a: (Self, f32), b: (Self, f32), c: (Self, f32)) -> Self {
        let human = b.1 / (a.1 + b.1 + 1e-6);
        let pair = a.0.lerp_to(b.0, human);
        pair.lerp_to(c.0, c.1 / (a.1 + b.1 + c.1 + 1e-6))
    }

    fn step_toward(self, target: Self, max_step: f32) -> Self {
        Angle::new(self.0 + self.delta_to(target).clamp(-max_step, max_step))
    }

    fn clamp_between(self, min: Self, max: Self) -> Self {
        Angle(clamp_scalar(wrap_turns(self.0), min.0, max.0))
    }
}

/// Discrete values never interpolate: the heaviest source wins outright
impl Blendable for i32 {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        if t > 0.0 {
            other
        } else {
            self
        }
    }

    // Ties go to manual, then intent.
    fn mix3(a: (Self, f32), b: (Self, f32), c: (Self, f32)) -> Self {
        if b.1 >= a.1 && b.1 >= c.1 {
            b.0
        } else if c.1 >= a.1 {
            c.0
        } else {
            a.0
        }
    }

    fn step_toward(self, target: Self, _max_step: f32) -> Self {
        target
    }

    fn clamp_between(self, min: Self, max: Self) -> Self {
        self.clamp(min.min(max), max.max(min))
    }
}

/// Fixed-size vectors (vec2, vec4) blend each component independently
impl<const N: usize> Blendable for [f32; N] {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        std::array::from_fn(|i| lerp(self[i], other[i], t))
    }

    fn mix3(a: (Self, f32), b: (Self, f32), c: (Self, f32)) -> Self {
        std::array::from_fn(|i| f32::mix3((a.0[i], a.1), (b.0[i], b.1), (c.0[i], c.1)))
    }

    fn step_toward(self, target: Self, max_step: f32) -> Self {
        std::array::from_fn(|i| step_scalar(self[i], target[i], max_step))
    }

    fn clamp_between(self, min: Self, max: Self) -> Self {
        std::array::from_fn(|i| clamp_scalar(self[i], min[i], max[i]))
    }
}

/// Normalised share of each source in the current target
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Weights {
    pub auto: f32,
    pub manual: f32,
    pub intent: f32,
}

/// Dual-source (plus intent) smoothing and rate limiting for one value
#[derive(Clone, Debug)]
pub struct ParameterBlender<T: Blendable> {
    manual: T,
    min: T,
    max: T,
    value: T,
    auto_value: T,
    intent_value: T,
    agency: f32,
    intent_strength: f32,
    has_auto: bool,
    has_intent: bool,
    manual_bias: f32,
    since_manual: f32,
    config: BlendConfig,
    weights: Weights,
    label: Option<String>,
    last_frame: Option<u64>,
}

impl<T: Blendable> ParameterBlender<T> {
    /// Blender starting at rest on the manual value
    pub fn new(manual: T, min: T, max: T, config: BlendConfig) -> Self {
        let manual = manual.clamp_between(min, max);
        Self {
            manual,
            min,
            max,
            value: manual,
            auto_value: manual,
            intent_value: manual,
            agency: 0.0,
            intent_strength: 0.0,
            has_auto: false,
            has_intent: false,
            manual_bias: 0.0,
            since_manual: f32::INFINITY,
            config,
            weights: Weights {
                auto: 0.0,
                manual: 1.0,
                intent: 0.0,
            },
            label: None,
            last_frame: None,
        }
    }

    /// Current blended output
    pub fn value(&self) -> T {
        self.value
    }

    pub fn manual(&self) -> T {
        self.manual
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    pub fn config(&self) -> BlendConfig {
        self.config
    }

    pub fn set_config(&mut self, config: BlendConfig) {
        self.config = config;
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn agency(&self) -> f32 {
        self.agency
    }

    pub fn manual_bias(&self) -> f32 {
        self.manual_bias
    }

    /// Diagnostic description of the last intent mapping
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn has_received_auto(&self) -> bool {
        self.has_auto
    }

    pub fn has_received_intent(&self) -> bool {
        self.has_intent
    }

    /// Operator edit: the manual value takes full priority for a moment
    pub fn set_manual(&mut self, manual: T) {
        self.manual = manual.clamp_between(self.min, self.max);
        self.since_manual = 0.0;
        self.manual_bias = 1.0;
    }

    /// Replace the manual value without counting as an operator edit
    pub fn restore_manual(&mut self, manual: T) {
        self.manual = manual.clamp_between(self.min, self.max);
    }

    /// Keep the live agency current without delivering a value
    pub fn set_agency(&mut self, agency: f32) {
        self.agency = agency.clamp(0.0, 1.0);
    }

    /// Feed a new autonomous value
    ///
    /// Out-of-range values are clamped, never rejected. Nodes that receive
    /// several values for one parameter in a frame combine them first.
    pub fn update_auto(&mut self, value: T, agency: f32, step: Step) {
        self.auto_value = value.clamp_between(self.min, self.max);
        self.agency = agency.clamp(0.0, 1.0);
        self.has_auto = true;
        self.integrate(step);
    }

    /// Feed a new intent-derived target; `strength` plays the role of agency
    pub fn update_intent(&mut self, value: T, strength: f32, label: Option<&str>, step: Step) {
        self.intent_value = value.clamp_between(self.min, self.max);
        self.intent_strength = strength.clamp(0.0, 1.0);
        self.has_intent = true;
        if let Some(label) = label {
            self.label = Some(label.to_string());
        }
        self.integrate(step);
    }

    /// Advance without new input (manual edits and decays still apply)
    pub fn tick(&mut self, step: Step) {
        self.integrate(step);
    }

    /// Snap every internal state to the manual value (after a config load)
    pub fn sync_to_manual(&mut self) {
        self.value = self.manual;
        self.auto_value = self.manual;
        self.intent_value = self.manual;
    }

    fn compute_weights(&mut self) {
        // Unconnected parameters stay under human control.
        let agency = if self.has_auto { self.agency } else { 0.0 };
        let human = 1.0 - agency;
        let intent_strength = if self.has_intent {
            self.intent_strength
        } else {
            0.0
        };
        let manual_human = lerp(1.0 - intent_strength, 1.0, self.manual_bias);

        let mut w = Weights {
            auto: agency,
            manual: human * manual_human,
            intent: human * (1.0 - manual_human),
        };
        let sum = w.auto + w.manual + w.intent;
        if sum > 1e-6 {
            w.auto /= sum;
            w.manual /= sum;
            w.intent /= sum;
        }
        self.weights = w;
    }

    fn integrate(&mut self, step: Step) {
        if let Some(frame) = step.frame {
            if self.last_frame == Some(frame) {
                self.compute_weights();
                return;
            }
            // A zero-length step moves nothing, so it must not claim the frame
            if step.dt > 0.0 {
                self.last_frame = Some(frame);
            }
        }

        let dt = if step.dt.is_finite() { step.dt.max(0.0) } else { 0.0 };

        self.since_manual += dt;
        if self.since_manual < MANUAL_ACTIVE_SEC {
            self.manual_bias = 1.0;
        } else {
            self.manual_bias = smooth_to(
                self.manual_bias,
                step.bias.base_manual_bias,
                dt,
                step.bias.manual_bias_decay_sec,
            );
        }

        self.compute_weights();
        if dt == 0.0 {
            return;
        }

        let target = T::mix3(
            (self.auto_value, self.weights.auto),
            (self.manual, self.weights.manual),
            (self.intent_value, self.weights.intent),
        )
        .clamp_between(self.min, self.max);

        let limited = self
            .value
            .step_toward(target, self.config.rate_per_sec * dt);
        let alpha = smoothing_alpha(dt, self.config.smooth_tau);
        self.value = self
            .value
            .lerp_to(limited, alpha)
            .clamp_between(self.min, self.max);
    }
}
