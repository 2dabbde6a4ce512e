//! Engine-wide agency and register-shift bookkeeping
//!
//! Agency is the share of control handed to autonomous inputs. The
//! performer sets a manual level; nodes may add to it through the host
//! `AgencyAuto` sink. Those contributions are max-aggregated during a frame
//! and only take effect on the next one, so the result never depends on the
//! order nodes update in.

use crate::node::NodeId;
use tracing::debug;

/// Node ids retained per register shift
pub const MAX_REGISTER_SHIFT_IDS: usize = 8;

/// Latched record of the last frame where any node fired a trigger
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegisterShift {
    /// Number of nodes that fired
    pub count: usize,
    /// First few node ids that fired, in update order
    pub ids: Vec<NodeId>,
    /// Engine time of the shift
    pub time: f32,
}

#[derive(Clone, Debug, Default)]
pub struct AgencyState {
    manual: f32,
    auto_this_frame: f32,
    auto_prev: f32,
    last_shift: Option<RegisterShift>,
}

impl AgencyState {
    pub fn new(manual: f32) -> Self {
        Self {
            manual: manual.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Performer agency, clamped to 0..1
    pub fn set_manual(&mut self, value: f32) {
        self.manual = value.clamp(0.0, 1.0);
    }

    pub fn manual(&self) -> f32 {
        self.manual
    }

    /// Effective agency for this frame
    pub fn agency(&self) -> f32 {
        (self.manual + self.auto_prev).clamp(0.0, 1.0)
    }

    /// Auto contribution currently in effect (from the previous frame)
    pub fn auto_aggregate(&self) -> f32 {
        self.auto_prev
    }

    /// Record an `AgencyAuto` value for next frame
    pub fn contribute_auto(&mut self, value: f32) {
        self.auto_this_frame = self.auto_this_frame.max(value.clamp(0.0, 1.0));
    }

    pub fn begin_frame(&mut self) {
        self.auto_this_frame = 0.0;
    }

    pub fn end_frame(&mut self) {
        self.auto_prev = self.auto_this_frame;
    }

    /// Record which nodes fired this frame; an empty list keeps the old latch
    pub fn latch_register_shift(&mut self, fired: &[NodeId], time: f32) {
        if fired.is_empty() {
            return;
        }
        let ids: Vec<NodeId> = fired.iter().copied().take(MAX_REGISTER_SHIFT_IDS).collect();
        debug!("Register shift: {} node(s) fired at {:.2}s", fired.len(), time);
        self.last_shift = Some(RegisterShift {
            count: fired.len(),
            ids,
            time,
        });
    }

    pub fn last_register_shift(&self) -> Option<&RegisterShift> {
        self.last_shift.as_ref()
    }

    /// Seconds since the last shift, infinite if there never was one
    pub fn seconds_since_register_shift(&self, now: f32) -> f32 {
        match &self.last_shift {
            Some(shift) => now - shift.time,
            None => f32::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_applies_next_frame() {
        let mut a = AgencyState::new(0.2);
        a.begin_frame();
        a.contribute_auto(0.3);
        a.contribute_auto(0.1);
        assert_eq!(a.agency(), 0.2);
        a.end_frame();
        assert!((a.agency() - 0.5).abs() < 1e-6);

        // Nothing contributed: falls back after one frame
        a.begin_frame();
        assert!((a.agency() - 0.5).abs() < 1e-6);
        a.end_frame();
        assert_eq!(a.agency(), 0.2);
    }

    #[test]
    fn test_agency_clamped() {
        let mut a = AgencyState::new(0.9);
        a.begin_frame();
        a.contribute_auto(5.0);
        a.end_frame();
        assert_eq!(a.auto_aggregate(), 1.0);
        assert_eq!(a.agency(), 1.0);
        a.set_manual(-1.0);
        assert_eq!(a.manual(), 0.0);
    }

    #[test]
    fn test_register_shift_latch() {
        let mut a = AgencyState::new(0.0);
        assert!(a.last_register_shift().is_none());
        assert_eq!(a.seconds_since_register_shift(3.0), f32::INFINITY);

        let fired: Vec<NodeId> = (0..10).collect();
        a.latch_register_shift(&fired, 2.0);
        a.latch_register_shift(&[], 3.0);

        let shift = a.last_register_shift().unwrap();
        assert_eq!(shift.count, 10);
        assert_eq!(shift.ids.len(), MAX_REGISTER_SHIFT_IDS);
        assert_eq!(shift.ids[0], 0);
        assert!((a.seconds_since_register_shift(3.5) - 1.5).abs() < 1e-6);
    }
}
