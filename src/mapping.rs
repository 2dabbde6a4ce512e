//! Intent dimension -> parameter target mappings
//!
//! A [`Mapping`] is a 0..1 value read from the active intent plus a label
//! describing how it was derived. Mappings combine by multiplication and
//! inversion, then land on a parameter through one of the shaping helpers,
//! which also record the label on the parameter's blender:
//!
//! ```text
//! let m = IntentMap::new(intent);
//! (m.e() * m.g()).exp(&mut params[SIZE], strength, 2.0, step);
//! ```

use crate::blender::{lerp, Step};
use crate::intent::Intent;
use crate::param::Parameter;
use std::ops::Mul;

/// Share of the range a full-up "around manual" mapping can add
pub const AROUND_UP_FRACTION: f32 = 0.5;
/// Share of the range a full-down "around manual" mapping can remove
pub const AROUND_DOWN_FRACTION: f32 = 0.7;
/// Curve exponent for `exp_around`
pub const AROUND_EXPONENT: f32 = 2.0;

/// `min..max` linearly by `v`
pub fn lin(v: f32, min: f32, max: f32) -> f32 {
    lerp(min, max, v)
}

/// `min..max` along `v^exponent` (v clamped to 0..1)
pub fn exp_map(v: f32, min: f32, max: f32, exponent: f32) -> f32 {
    lerp(min, max, v.clamp(0.0, 1.0).powf(exponent))
}

/// `max..min` linearly by `v`
pub fn inv(v: f32, min: f32, max: f32) -> f32 {
    lerp(max, min, v)
}

/// `max..min` along `v^exponent`
pub fn inv_exp(v: f32, min: f32, max: f32, exponent: f32) -> f32 {
    lerp(max, min, v.clamp(0.0, 1.0).powf(exponent))
}

/// Move away from `manual` by a bounded band of the range
///
/// 0.5 leaves the manual value untouched; 1 adds up to `up * range`, 0
/// removes up to `down * range`, both along `|2v - 1|^exponent`.
pub fn around_manual(v: f32, manual: f32, min: f32, max: f32, up: f32, down: f32, exponent: f32) -> f32 {
    let lo = min.min(max);
    let hi = min.max(max);
    let range = hi - lo;
    if !(range > 1e-12) {
        return manual.clamp(lo, hi);
    }

    let signed = (v.clamp(0.0, 1.0) - 0.5) * 2.0;
    let dist = signed.abs();
    let curved = if exponent == 1.0 { dist } else { dist.powf(exponent) };
    let manual = manual.clamp(lo, hi);

    let result = if signed >= 0.0 {
        manual + curved * up.max(0.0) * range
    } else {
        manual - curved * down.max(0.0) * range
    };
    result.clamp(lo, hi)
}

/// A labelled 0..1 value derived from intent dimensions
#[derive(Clone, Debug, PartialEq)]
pub struct Mapping {
    value: f32,
    label: String,
}

impl Mapping {
    pub fn new(value: f32, label: &str) -> Self {
        Self {
            value,
            label: label.to_string(),
        }
    }

    pub fn get(&self) -> f32 {
        self.value
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `1 - value`
    pub fn inv(&self) -> Mapping {
        Mapping {
            value: 1.0 - self.value,
            label: format!("1-{}", self.label),
        }
    }

    /// Linear over the parameter's own range
    pub fn lin(&self, param: &mut Parameter, strength: f32, step: Step) {
        let target = lin(self.value, param.min(), param.max());
        param.update_intent(target, strength, Some(&format!("{} -> lin", self.label)), step);
    }

    /// Linear over an explicit range
    pub fn lin_in(&self, param: &mut Parameter, strength: f32, min: f32, max: f32, step: Step) {
        let target = lin(self.value, min, max);
        let label = format!("{} -> lin [{}, {}]", self.label, fmt(min), fmt(max));
        param.update_intent(target, strength, Some(&label), step);
    }

    /// Curved over the parameter's own range
    pub fn exp(&self, param: &mut Parameter, strength: f32, exponent: f32, step: Step) {
        let target = exp_map(self.value, param.min(), param.max(), exponent);
        let label = format!("{} -> exp({})", self.label, fmt(exponent));
        param.update_intent(target, strength, Some(&label), step);
    }

    /// Curved over an explicit range
    pub fn exp_in(&self, param: &mut Parameter, strength: f32, min: f32, max: f32, exponent: f32, step: Step) {
        let target = exp_map(self.value, min, max, exponent);
        let label = format!(
            "{} -> exp({}) [{}, {}]",
            self.label,
            fmt(exponent),
            fmt(min),
            fmt(max)
        );
        param.update_intent(target, strength, Some(&label), step);
    }

    /// Linear band around the manual value
    pub fn lin_around(&self, param: &mut Parameter, strength: f32, step: Step) {
        self.around(param, strength, 1.0, step);
    }

    /// Curved band around the manual value
    pub fn exp_around(&self, param: &mut Parameter, strength: f32, step: Step) {
        self.around(param, strength, AROUND_EXPONENT, step);
    }

    fn around(&self, param: &mut Parameter, strength: f32, exponent: f32, step: Step) {
        let target = around_manual(
            self.value,
            param.manual(),
            param.min(),
            param.max(),
            AROUND_UP_FRACTION,
            AROUND_DOWN_FRACTION,
            exponent,
        );
        let kind = if exponent == 1.0 {
            "linAround".to_string()
        } else {
            format!("expAround({})", fmt(exponent))
        };
        let label = format!(
            "{} -> {} up={} down={}",
            self.label,
            kind,
            fmt(AROUND_UP_FRACTION),
            fmt(AROUND_DOWN_FRACTION)
        );
        param.update_intent(target, strength, Some(&label), step);
    }
}

impl Mul for Mapping {
    type Output = Mapping;

    fn mul(self, other: Mapping) -> Mapping {
        Mapping {
            value: self.value * other.value,
            label: format!("{}*{}", self.label, other.label),
        }
    }
}

fn fmt(v: f32) -> String {
    let s = format!("{:.2}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Dimension accessors over an intent
#[derive(Clone, Copy, Debug)]
pub struct IntentMap<'a> {
    intent: &'a Intent,
}

impl<'a> IntentMap<'a> {
    pub fn new(intent: &'a Intent) -> Self {
        Self { intent }
    }

    pub fn e(&self) -> Mapping {
        Mapping::new(self.intent.energy, "E")
    }

    pub fn d(&self) -> Mapping {
        Mapping::new(self.intent.density, "D")
    }

    pub fn s(&self) -> Mapping {
        Mapping::new(self.intent.structure, "S")
    }

    pub fn c(&self) -> Mapping {
        Mapping::new(self.intent.chaos, "C")
    }

    pub fn g(&self) -> Mapping {
        Mapping::new(self.intent.granularity, "G")
    }

    pub fn intent(&self) -> &Intent {
        self.intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shaping_functions() {
        assert_eq!(lin(0.25, 0.0, 4.0), 1.0);
        assert_eq!(exp_map(0.5, 0.0, 1.0, 2.0), 0.25);
        assert_eq!(exp_map(2.0, 0.0, 1.0, 2.0), 1.0);
        assert_eq!(inv(0.25, 0.0, 4.0), 3.0);
        assert_eq!(inv_exp(0.5, 0.0, 1.0, 2.0), 0.75);
    }

    #[test]
    fn test_around_manual() {
        // Centre leaves manual alone
        assert!((around_manual(0.5, 0.4, 0.0, 1.0, 0.5, 0.7, 1.0) - 0.4).abs() < 1e-6);
        // Full up adds half the range, clamped
        assert!((around_manual(1.0, 0.4, 0.0, 1.0, 0.5, 0.7, 1.0) - 0.9).abs() < 1e-6);
        assert_eq!(around_manual(1.0, 0.8, 0.0, 1.0, 0.5, 0.7, 1.0), 1.0);
        // Full down removes 70% of the range, clamped at min
        assert_eq!(around_manual(0.0, 0.4, 0.0, 1.0, 0.5, 0.7, 1.0), 0.0);
        // Degenerate range
        assert_eq!(around_manual(1.0, 3.0, 2.0, 2.0, 0.5, 0.7, 1.0), 2.0);
    }

    #[test]
    fn test_mapping_combinators() {
        let intent = Intent::new("x", 0.5, 0.2, 0.8, 0.4, 0.5);
        let m = IntentMap::new(&intent);
        let product = m.e() * m.g();
        assert!((product.get() - 0.25).abs() < 1e-6);
        assert_eq!(product.label(), "E*G");
        assert_eq!(m.s().inv().label(), "1-S");
        assert!((m.s().inv().get() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mapping_drives_parameter() {
        let intent = Intent::new("x", 1.0, 0.0, 0.0, 0.0, 0.0);
        let m = IntentMap::new(&intent);
        let mut p = Parameter::new("Multiplier", 1.0, -4.0, 4.0);
        for _ in 0..600 {
            m.e().exp(&mut p, 1.0, 2.0, Step::new(1.0 / 60.0));
        }
        assert_eq!(p.blender().label(), Some("E -> exp(2)"));
        // 90% intent, 10% manual after the bias settles
        assert!((p.value() - (0.9 * 4.0 + 0.1 * 1.0)).abs() < 0.05, "value = {}", p.value());
    }
}
