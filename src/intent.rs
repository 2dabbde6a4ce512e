//! Intent presets and their weighted blend
//!
//! An [`Intent`] is a named point in a five dimensional artistic space
//! (energy, density, structure, chaos, granularity), each dimension in 0..1.
//! The [`IntentController`] tracks up to [`MAX_INTENTS`] presets, smooths
//! each preset's activation toward its target and derives the active
//! intent as the normalised weighted average of all presets.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Most presets tracked at once
pub const MAX_INTENTS: usize = 7;

/// Weights at or below this are treated as zero
pub const WEIGHT_EPSILON: f32 = 1e-4;

/// Default activation transition speed
pub const DEFAULT_SPEED: f32 = 0.5;

/// A named five dimensional artistic state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub energy: f32,
    pub density: f32,
    pub structure: f32,
    pub chaos: f32,
    pub granularity: f32,
}

impl Intent {
    /// Create a preset; dimensions are clamped to 0..1
    pub fn new(name: &str, energy: f32, density: f32, structure: f32, chaos: f32, granularity: f32) -> Self {
        Self {
            name: name.to_string(),
            energy: energy.clamp(0.0, 1.0),
            density: density.clamp(0.0, 1.0),
            structure: structure.clamp(0.0, 1.0),
            chaos: chaos.clamp(0.0, 1.0),
            granularity: granularity.clamp(0.0, 1.0),
        }
    }

    /// The zero vector (no intent influence)
    pub fn zero(name: &str) -> Self {
        Self::new(name, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn dims(&self) -> [f32; 5] {
        [self.energy, self.density, self.structure, self.chaos, self.granularity]
    }

    fn set_dims(&mut self, d: [f32; 5]) {
        self.energy = d[0];
        self.density = d[1];
        self.structure = d[2];
        self.chaos = d[3];
        self.granularity = d[4];
    }

    /// Overwrite this intent with the normalised weighted average of `weighted`
    ///
    /// Weights at or below [`WEIGHT_EPSILON`] are ignored. If nothing carries
    /// weight the result is the zero vector.
    pub fn set_weighted_blend<'a, I>(&mut self, weighted: I)
    where
        I: IntoIterator<Item = (&'a Intent, f32)>,
    {
        let active: Vec<(&Intent, f32)> = weighted
            .into_iter()
            .filter(|(_, w)| *w > WEIGHT_EPSILON)
            .collect();
        let total: f32 = active.iter().map(|(_, w)| *w).sum();

        if total < WEIGHT_EPSILON {
            self.set_dims([0.0; 5]);
            return;
        }

        let mut blended = [0.0f32; 5];
        for (intent, weight) in active {
            let w = weight / total;
            for (acc, d) in blended.iter_mut().zip(intent.dims()) {
                *acc += d * w;
            }
        }
        self.set_dims(blended);
    }

    /// Weighted blend into a new intent named `name`
    pub fn weighted_blend<'a, I>(name: &str, weighted: I) -> Intent
    where
        I: IntoIterator<Item = (&'a Intent, f32)>,
    {
        let mut out = Intent::zero(name);
        out.set_weighted_blend(weighted);
        out
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "E{:.2} D{:.2} C{:.2} S{:.2} G{:.2}",
            self.energy, self.density, self.chaos, self.structure, self.granularity
        )
    }
}

/// One preset together with its smoothed activation
#[derive(Clone, Debug, PartialEq)]
pub struct IntentActivation {
    pub intent: Intent,
    /// Current (smoothed) activation, 0..1
    pub activation: f32,
    /// Where the activation is heading, 0..1
    pub target: f32,
    /// Transition speed multiplier
    pub speed: f32,
}

impl IntentActivation {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            activation: 0.0,
            target: 0.0,
            speed: DEFAULT_SPEED,
        }
    }

    /// Exponential approach of the activation toward its target. A speed of
    /// zero holds the activation where it is.
    pub fn advance(&mut self, dt: f32) {
        if !(dt > 0.0) {
            return;
        }
        let alpha = 1.0 - (-dt * self.speed * 4.0).exp();
        self.activation += (self.target - self.activation) * alpha;
    }
}

/// Performer-facing control over the preset set
#[derive(Clone, Debug)]
pub struct IntentController {
    activations: Vec<IntentActivation>,
    strength: f32,
    active: Intent,
}

impl Default for IntentController {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentController {
    pub fn new() -> Self {
        Self {
            activations: Vec::new(),
            strength: 1.0,
            active: Intent::zero("Active Intent"),
        }
    }

    /// Replace the preset set, keeping at most [`MAX_INTENTS`]
    pub fn set_presets(&mut self, presets: Vec<Intent>) {
        if presets.len() > MAX_INTENTS {
            warn!(
                "Received {} intents, limiting to {}",
                presets.len(),
                MAX_INTENTS
            );
        }
        self.activations = presets
            .into_iter()
            .take(MAX_INTENTS)
            .map(IntentActivation::new)
            .collect();
        self.recompute();
        info!("Set {} intent presets", self.activations.len());
    }

    pub fn activations(&self) -> &[IntentActivation] {
        &self.activations
    }

    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// Master strength, clamped to 0..1
    pub fn set_strength(&mut self, value: f32) {
        self.strength = value.clamp(0.0, 1.0);
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// Set where a preset's activation should head; it moves there over time
    pub fn set_activation(&mut self, index: usize, value: f32) {
        match self.activations.get_mut(index) {
            Some(a) => a.target = value.clamp(0.0, 1.0),
            None => warn!(
                "set_activation: index {} out of range (have {} intents)",
                index,
                self.activations.len()
            ),
        }
    }

    /// Jump a preset's activation straight to `value`
    pub fn snap_activation(&mut self, index: usize, value: f32) {
        match self.activations.get_mut(index) {
            Some(a) => {
                let v = value.clamp(0.0, 1.0);
                a.target = v;
                a.activation = v;
                self.recompute();
            }
            None => warn!(
                "snap_activation: index {} out of range (have {} intents)",
                index,
                self.activations.len()
            ),
        }
    }

    pub fn set_speed(&mut self, index: usize, speed: f32) {
        if let Some(a) = self.activations.get_mut(index) {
            a.speed = speed.max(0.0);
        }
    }

    /// Find a preset by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.activations.iter().position(|a| a.intent.name == name)
    }

    /// Smooth all activations and recompute the active intent
    pub fn update(&mut self, dt: f32) {
        for a in &mut self.activations {
            a.advance(dt);
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        let weighted = self.activations.iter().map(|a| (&a.intent, a.activation));
        self.active.set_weighted_blend(weighted);
    }

    pub fn active_intent(&self) -> &Intent {
        &self.active
    }

    /// Strength dependent blends should use
    ///
    /// Ramps in with the summed activation and never exceeds the master
    /// strength.
    pub fn effective_strength(&self) -> f32 {
        let total: f32 = self.activations.iter().map(|a| a.activation).sum();
        self.strength * total.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> Intent {
        Intent::new("calm", 0.1, 0.2, 0.8, 0.0, 0.3)
    }

    fn wild() -> Intent {
        Intent::new("wild", 0.9, 0.8, 0.1, 1.0, 0.7)
    }

    #[test]
    fn test_new_clamps_dimensions() {
        let i = Intent::new("x", 1.5, -0.5, 0.5, 0.5, 0.5);
        assert_eq!(i.energy, 1.0);
        assert_eq!(i.density, 0.0);
    }

    #[test]
    fn test_weighted_blend_normalises() {
        let (a, b) = (calm(), wild());
        let out = Intent::weighted_blend("mix", [(&a, 1.0), (&b, 3.0)]);
        assert!((out.energy - (0.1 * 0.25 + 0.9 * 0.75)).abs() < 1e-6);
        assert!((out.chaos - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_blend_stays_in_hull() {
        let (a, b) = (calm(), wild());
        for w in [0.01, 0.3, 0.5, 2.0, 100.0] {
            let out = Intent::weighted_blend("mix", [(&a, w), (&b, 1.0)]);
            for ((o, x), y) in out.dims().iter().zip(a.dims()).zip(b.dims()) {
                assert!(*o >= x.min(y) - 1e-6 && *o <= x.max(y) + 1e-6);
            }
        }
    }

    #[test]
    fn test_weighted_blend_all_zero_weights() {
        let (a, b) = (calm(), wild());
        let out = Intent::weighted_blend("mix", [(&a, 0.0), (&b, 0.00005)]);
        assert_eq!(out.dims(), [0.0; 5]);
    }

    #[test]
    fn test_display() {
        let i = Intent::new("x", 0.5, 0.2, 0.8, 0.1, 0.3);
        assert_eq!(format!("{}", i), "E0.50 D0.20 C0.10 S0.80 G0.30");
    }

    #[test]
    fn test_set_presets_truncates() {
        let mut c = IntentController::new();
        let presets: Vec<Intent> = (0..9).map(|i| Intent::zero(&format!("p{}", i))).collect();
        c.set_presets(presets);
        assert_eq!(c.len(), MAX_INTENTS);
        assert_eq!(c.index_of("p6"), Some(6));
        assert_eq!(c.index_of("p7"), None);
    }

    #[test]
    fn test_activation_clamped_and_out_of_range_ignored() {
        let mut c = IntentController::new();
        c.set_presets(vec![calm()]);
        c.set_activation(0, 3.0);
        assert_eq!(c.activations()[0].target, 1.0);
        c.set_activation(5, 1.0);
        c.set_strength(-1.0);
        assert_eq!(c.strength(), 0.0);
    }

    #[test]
    fn test_activation_smoothing_monotonic() {
        let mut c = IntentController::new();
        c.set_presets(vec![calm()]);
        c.set_activation(0, 1.0);

        let mut prev = 0.0;
        for _ in 0..120 {
            c.update(1.0 / 60.0);
            let a = c.activations()[0].activation;
            assert!(a > prev, "activation must strictly increase");
            assert!(a < 1.0, "activation must not overshoot");
            prev = a;
        }
        // alpha per step with speed 0.5: 1 - exp(-1/60 * 2); after 2 s ≈ 1 - e^-4
        assert!((prev - (1.0 - (-4.0f32).exp())).abs() < 1e-3);
    }

    #[test]
    fn test_zero_speed_freezes_activation() {
        let mut c = IntentController::new();
        c.set_presets(vec![calm(), wild()]);
        c.snap_activation(0, 0.3);
        c.set_speed(0, 0.0);
        c.set_speed(1, -2.0);
        c.set_activation(0, 1.0);
        c.set_activation(1, 1.0);
        for _ in 0..600 {
            c.update(1.0 / 60.0);
        }
        assert_eq!(c.activations()[0].activation, 0.3);
        assert_eq!(c.activations()[1].activation, 0.0);
        assert_eq!(c.activations()[1].speed, 0.0);
    }

    #[test]
    fn test_effective_strength() {
        let mut c = IntentController::new();
        c.set_presets(vec![calm(), wild()]);
        c.set_strength(0.8);
        assert_eq!(c.effective_strength(), 0.0);

        c.snap_activation(0, 0.5);
        assert!((c.effective_strength() - 0.4).abs() < 1e-6);

        c.snap_activation(1, 1.0);
        assert!((c.effective_strength() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_active_intent_follows_activations() {
        let mut c = IntentController::new();
        c.set_presets(vec![calm(), wild()]);
        assert_eq!(c.active_intent().dims(), [0.0; 5]);

        c.snap_activation(1, 1.0);
        assert_eq!(c.active_intent().dims(), wild().dims());
    }
}
