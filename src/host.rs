//! The engine host: the empty-named endpoint of the graph
//!
//! Connection text addresses the host with an empty node name
//! (`Random.Float -> .MemoryEmit`). The host owns engine-wide state nodes
//! feed into: agency, the background colour, the latest composite content
//! and the memory bank.

use crate::agency::AgencyState;
use crate::blender::{BlendConfig, ParameterBlender, Step};
use crate::intent::Intent;
use crate::memory_bank::MemoryBank;
use crate::memory_controller::{self, MemoryBankController, MEMORY_SINKS};
use crate::raster::Raster;
use crate::value::{port_id, port_name, PortId, PortMap, Rgba, Signal};
use std::sync::Arc;
use tracing::{info, warn};

pub const SINK_BACKGROUND_COLOR: PortId = 100;
pub const SINK_COMPOSITE: PortId = 101;
pub const SINK_RESET_RANDOMNESS: PortId = 200;
pub const SINK_AGENCY_AUTO: PortId = 201;

pub const SOURCE_MEMORY: PortId = 10;

/// Host sinks other than the memory bank's
pub const SINKS: PortMap = &[
    ("BackgroundColor", SINK_BACKGROUND_COLOR),
    ("Composite", SINK_COMPOSITE),
    ("ResetRandomness", SINK_RESET_RANDOMNESS),
    ("AgencyAuto", SINK_AGENCY_AUTO),
];

pub const SOURCES: PortMap = &[("Memory", SOURCE_MEMORY)];

pub fn sink_id(name: &str) -> Option<PortId> {
    port_id(SINKS, name).or_else(|| port_id(MEMORY_SINKS, name))
}

pub fn sink_name(id: PortId) -> Option<&'static str> {
    port_name(SINKS, id).or_else(|| port_name(MEMORY_SINKS, id))
}

pub fn source_id(name: &str) -> Option<PortId> {
    port_id(SOURCES, name)
}

pub struct Host {
    agency: AgencyState,
    memory: MemoryBankController,
    background: ParameterBlender<Rgba>,
    composite: Option<Arc<Raster>>,
}

impl Host {
    pub fn new(bank: MemoryBank, manual_agency: f32) -> Self {
        Self {
            agency: AgencyState::new(manual_agency),
            memory: MemoryBankController::new(bank),
            background: ParameterBlender::new(
                Rgba::BLACK,
                Rgba::new(0.0, 0.0, 0.0, 0.0),
                Rgba::WHITE,
                BlendConfig::COLOR,
            ),
            composite: None,
        }
    }

    /// Effective engine agency this frame
    pub fn agency(&self) -> f32 {
        self.agency.agency()
    }

    pub fn agency_state(&self) -> &AgencyState {
        &self.agency
    }

    pub fn agency_state_mut(&mut self) -> &mut AgencyState {
        &mut self.agency
    }

    pub fn memory(&self) -> &MemoryBankController {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryBankController {
        &mut self.memory
    }

    pub fn background_color(&self) -> Rgba {
        self.background.value()
    }

    pub fn background(&self) -> &ParameterBlender<Rgba> {
        &self.background
    }

    /// Operator edit of the background colour
    pub fn set_background_color(&mut self, color: Rgba) {
        self.background.set_manual(color);
    }

    /// Background colour from config: a baseline, not an edit
    pub fn restore_background_color(&mut self, color: Rgba) {
        self.background.restore_manual(color);
        self.background.sync_to_manual();
    }

    /// Latest content handed to the `Composite` sink
    pub fn composite(&self) -> Option<&Arc<Raster>> {
        self.composite.as_ref()
    }

    pub fn set_composite(&mut self, content: Arc<Raster>) {
        self.composite = Some(content);
    }

    pub fn begin_frame(&mut self) {
        self.agency.begin_frame();
    }

    pub fn end_frame(&mut self) {
        self.agency.end_frame();
    }

    pub fn apply_intent(&mut self, intent: &Intent, strength: f32, step: Step) {
        self.memory.apply_intent(intent, strength, step);
    }

    /// Advance host blenders and run deferred memory saves
    pub fn tick(&mut self, step: Step) {
        let agency = self.agency();
        self.background.set_agency(agency);
        self.background.tick(step);
        let composite = self.composite.clone();
        self.memory.update(composite.as_deref(), agency, step);
    }

    /// Handle a value arriving on a host sink
    ///
    /// Returns content recalled from memory, which the caller emits on the
    /// `Memory` source.
    pub fn receive(&mut self, port: PortId, signal: &Signal, now: f32, step: Step) -> Option<Arc<Raster>> {
        match port {
            SINK_BACKGROUND_COLOR => match signal.as_color() {
                Some(color) => {
                    let agency = self.agency();
                    self.background.update_auto(color, agency, step);
                }
                None => warn!("BackgroundColor expects a color, got {}", signal.kind()),
            },
            SINK_COMPOSITE => match signal.as_image() {
                Some(image) => self.composite = Some(image.clone()),
                None => warn!("Composite expects an image, got {}", signal.kind()),
            },
            SINK_RESET_RANDOMNESS => match signal.as_float() {
                Some(v) => {
                    let seed = (v * 10.0).max(0.0) as u64;
                    self.memory.bank_mut().reseed(seed);
                    info!("Randomness reset with seed {}", seed);
                }
                None => warn!("ResetRandomness expects a float, got {}", signal.kind()),
            },
            SINK_AGENCY_AUTO => match signal.as_float() {
                Some(v) => self.agency.contribute_auto(v),
                None => warn!("AgencyAuto expects a float, got {}", signal.kind()),
            },
            p if memory_controller::is_memory_sink(p) => match signal.as_float() {
                Some(v) => {
                    let agency = self.agency();
                    let composite = self.composite.clone();
                    return self
                        .memory
                        .handle_sink(p, v, composite.as_deref(), agency, now, step);
                }
                None => warn!("{} expects a float, got {}", sink_name(p).unwrap_or("Memory"), signal.kind()),
            },
            _ => warn!("Host received {} on unknown sink {}", signal.kind(), port),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blender::BiasSettings;
    use crate::memory_controller::{SINK_MEMORY_EMIT, SINK_MEMORY_SAVE};

    fn host() -> Host {
        let mut h = Host::new(MemoryBank::with_seed(5), 0.0);
        h.memory_mut().allocate(2, 2);
        h
    }

    #[test]
    fn test_port_tables() {
        assert_eq!(sink_id("BackgroundColor"), Some(100));
        assert_eq!(sink_id("MemoryClearAll"), Some(311));
        assert_eq!(sink_id("Nope"), None);
        assert_eq!(source_id("Memory"), Some(10));
        assert_eq!(sink_name(305), Some("MemoryEmitRandomNew"));
    }

    #[test]
    fn test_background_follows_agency() {
        let mut h = host();
        h.agency_state_mut().set_manual(1.0);
        let red = Signal::Color(Rgba::new(1.0, 0.0, 0.0, 1.0));
        for frame in 0..120 {
            h.receive(SINK_BACKGROUND_COLOR, &red, 0.0, Step::for_frame(1.0 / 60.0, frame, BiasSettings::default()));
        }
        let c = h.background_color();
        assert!((c.r - 1.0).abs() < 0.01 && c.g < 0.01);

        h.agency_state_mut().set_manual(0.0);
        for frame in 120..240 {
            h.receive(SINK_BACKGROUND_COLOR, &red, 0.0, Step::for_frame(1.0 / 60.0, frame, BiasSettings::default()));
        }
        assert!(h.background_color().r < 0.01);
    }

    #[test]
    fn test_memory_save_needs_composite_then_recalls() {
        let mut h = host();
        let step = Step::new(1.0 / 60.0);
        h.receive(SINK_MEMORY_SAVE, &Signal::Float(1.0), 0.0, step);
        assert_eq!(h.memory().bank().occupied_count(), 0);

        let content = Arc::new(Raster::filled(4, 4, [9, 9, 9, 255]));
        h.receive(SINK_COMPOSITE, &Signal::Image(content), 0.0, step);
        h.receive(SINK_MEMORY_SAVE, &Signal::Float(1.0), 0.0, step);
        assert_eq!(h.memory().bank().occupied_count(), 1);

        let recalled = h.receive(SINK_MEMORY_EMIT, &Signal::Float(1.0), 1.0, step);
        assert_eq!(recalled.unwrap().pixel(0, 0), Some([9, 9, 9, 255]));
    }

    #[test]
    fn test_wrong_kind_ignored() {
        let mut h = host();
        let step = Step::new(0.0);
        assert!(h.receive(SINK_AGENCY_AUTO, &Signal::Text("x".into()), 0.0, step).is_none());
        assert!(h.receive(999, &Signal::Float(1.0), 0.0, step).is_none());
        h.receive(SINK_AGENCY_AUTO, &Signal::Float(0.4), 0.0, step);
        h.end_frame();
        assert!((h.agency() - 0.4).abs() < 1e-6);
    }
}
