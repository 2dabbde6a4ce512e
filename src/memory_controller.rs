//! Host-side driver for the memory bank
//!
//! Translates the host's memory sinks into bank operations, keeps the
//! save/emit selection controls as blended parameters and rate limits
//! recall so a noisy trigger cannot flood the `Memory` source.

use crate::blender::Step;
use crate::intent::Intent;
use crate::memory_bank::{MemoryBank, PixelFormat, NUM_SLOTS};
use crate::mapping::lin;
use crate::param::{ParamSet, Parameter};
use crate::raster::Raster;
use crate::value::PortId;
use std::sync::Arc;
use tracing::{info, warn};

pub const SINK_MEMORY_SAVE: PortId = 300;
pub const SINK_MEMORY_SAVE_SLOT: PortId = 301;
pub const SINK_MEMORY_EMIT: PortId = 302;
pub const SINK_MEMORY_EMIT_SLOT: PortId = 303;
pub const SINK_MEMORY_EMIT_RANDOM: PortId = 304;
pub const SINK_MEMORY_EMIT_RANDOM_NEW: PortId = 305;
pub const SINK_MEMORY_EMIT_RANDOM_OLD: PortId = 306;
pub const SINK_MEMORY_SAVE_CENTRE: PortId = 307;
pub const SINK_MEMORY_SAVE_WIDTH: PortId = 308;
pub const SINK_MEMORY_EMIT_CENTRE: PortId = 309;
pub const SINK_MEMORY_EMIT_WIDTH: PortId = 310;
pub const SINK_MEMORY_CLEAR_ALL: PortId = 311;

/// Default seconds between two recalls
pub const EMIT_MIN_INTERVAL_SEC: f32 = 0.1;

const SAVE_CENTRE: usize = 0;
const SAVE_WIDTH: usize = 1;
const EMIT_CENTRE: usize = 2;
const EMIT_WIDTH: usize = 3;

/// Sink names and tags contributed to the host port table
pub const MEMORY_SINKS: &[(&str, PortId)] = &[
    ("MemorySave", SINK_MEMORY_SAVE),
    ("MemorySaveSlot", SINK_MEMORY_SAVE_SLOT),
    ("MemoryEmit", SINK_MEMORY_EMIT),
    ("MemoryEmitSlot", SINK_MEMORY_EMIT_SLOT),
    ("MemoryEmitRandom", SINK_MEMORY_EMIT_RANDOM),
    ("MemoryEmitRandomNew", SINK_MEMORY_EMIT_RANDOM_NEW),
    ("MemoryEmitRandomOld", SINK_MEMORY_EMIT_RANDOM_OLD),
    ("MemorySaveCentre", SINK_MEMORY_SAVE_CENTRE),
    ("MemorySaveWidth", SINK_MEMORY_SAVE_WIDTH),
    ("MemoryEmitCentre", SINK_MEMORY_EMIT_CENTRE),
    ("MemoryEmitWidth", SINK_MEMORY_EMIT_WIDTH),
    ("MemoryClearAll", SINK_MEMORY_CLEAR_ALL),
];

/// True for tags in the memory sink range
pub fn is_memory_sink(port: PortId) -> bool {
    (SINK_MEMORY_SAVE..=SINK_MEMORY_CLEAR_ALL).contains(&port)
}

fn slot_from_value(value: f32) -> usize {
    (value as i64).rem_euclid(NUM_SLOTS as i64) as usize
}

pub struct MemoryBankController {
    bank: MemoryBank,
    params: ParamSet,
    emit_min_interval: f32,
    last_emit_time: Option<f32>,
    legacy_warning_logged: bool,
}

impl Default for MemoryBankController {
    fn default() -> Self {
        Self::new(MemoryBank::new())
    }
}

impl MemoryBankController {
    pub fn new(bank: MemoryBank) -> Self {
        let params = ParamSet::new()
            .with(Parameter::new("MemorySaveCentre", 1.0, 0.0, 1.0))
            .with(Parameter::new("MemorySaveWidth", 0.0, 0.0, 1.0))
            .with(Parameter::new("MemoryEmitCentre", 0.5, 0.0, 1.0))
            .with(Parameter::new("MemoryEmitWidth", 1.0, 0.0, 1.0));
        Self {
            bank,
            params,
            emit_min_interval: EMIT_MIN_INTERVAL_SEC,
            last_emit_time: None,
            legacy_warning_logged: false,
        }
    }

    /// Memories are stored opaque
    pub fn allocate(&mut self, width: u32, height: u32) {
        self.bank.allocate(width, height, PixelFormat::Rgb8);
    }

    pub fn bank(&self) -> &MemoryBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut MemoryBank {
        &mut self.bank
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    pub fn set_emit_min_interval(&mut self, seconds: f32) {
        self.emit_min_interval = seconds.max(0.0);
    }

    pub fn save_centre(&self) -> f32 {
        self.params[SAVE_CENTRE].value()
    }

    pub fn save_width(&self) -> f32 {
        self.params[SAVE_WIDTH].value()
    }

    pub fn emit_centre(&self) -> f32 {
        self.params[EMIT_CENTRE].value()
    }

    pub fn emit_width(&self) -> f32 {
        self.params[EMIT_WIDTH].value()
    }

    fn rate_limited(&mut self, content: Option<Arc<Raster>>, now: f32) -> Option<Arc<Raster>> {
        let content = content?;
        if let Some(last) = self.last_emit_time {
            if now - last < self.emit_min_interval {
                return None;
            }
        }
        self.last_emit_time = Some(now);
        Some(content)
    }

    fn warn_legacy_once(&mut self) {
        if !self.legacy_warning_logged {
            self.legacy_warning_logged = true;
            warn!("MemorySaveCentre/Width only affect which slot MemorySave overwrites");
        }
    }

    /// Handle one host memory sink value
    ///
    /// `composite` is the content saves crop from; `now` is engine time.
    /// Returns recalled content to emit on the host `Memory` source.
    pub fn handle_sink(
        &mut self,
        port: PortId,
        value: f32,
        composite: Option<&Raster>,
        agency: f32,
        now: f32,
        step: Step,
    ) -> Option<Arc<Raster>> {
        match port {
            SINK_MEMORY_SAVE => {
                if value > 0.5 {
                    match composite {
                        Some(source) => {
                            let (centre, width) = (self.save_centre(), self.save_width());
                            self.bank.save(source, centre, width);
                        }
                        None => warn!("MemorySave ignored: no composite content yet"),
                    }
                }
                None
            }
            SINK_MEMORY_SAVE_SLOT => {
                let slot = slot_from_value(value);
                match composite {
                    Some(source) => self.bank.save_to_slot(source, slot),
                    None => self.bank.request_save_to_slot(slot),
                }
                None
            }
            SINK_MEMORY_EMIT => {
                if value > 0.5 {
                    let content = self.bank.select(self.emit_centre(), self.emit_width());
                    return self.rate_limited(content, now);
                }
                None
            }
            SINK_MEMORY_EMIT_SLOT => {
                let content = self.bank.get(slot_from_value(value));
                self.rate_limited(content, now)
            }
            SINK_MEMORY_EMIT_RANDOM => {
                if value > 0.0 {
                    let content = self.bank.select_random();
                    return self.rate_limited(content, now);
                }
                None
            }
            SINK_MEMORY_EMIT_RANDOM_NEW => {
                if value > 0.5 {
                    let content = self
                        .bank
                        .select_weighted_recent(self.emit_centre(), self.emit_width());
                    return self.rate_limited(content, now);
                }
                None
            }
            SINK_MEMORY_EMIT_RANDOM_OLD => {
                if value > 0.5 {
                    let content = self
                        .bank
                        .select_weighted_old(self.emit_centre(), self.emit_width());
                    return self.rate_limited(content, now);
                }
                None
            }
            SINK_MEMORY_SAVE_CENTRE => {
                self.warn_legacy_once();
                self.params[SAVE_CENTRE].update_auto(value, agency, step);
                None
            }
            SINK_MEMORY_SAVE_WIDTH => {
                self.warn_legacy_once();
                self.params[SAVE_WIDTH].update_auto(value, agency, step);
                None
            }
            SINK_MEMORY_EMIT_CENTRE => {
                self.params[EMIT_CENTRE].update_auto(value, agency, step);
                None
            }
            SINK_MEMORY_EMIT_WIDTH => {
                self.params[EMIT_WIDTH].update_auto(value, agency, step);
                None
            }
            SINK_MEMORY_CLEAR_ALL => {
                if value > 0.5 {
                    self.bank.clear_all();
                    self.legacy_warning_logged = false;
                    info!("Memory bank cleared");
                }
                None
            }
            _ => None,
        }
    }

    /// Intent steers recall breadth and recency, and how predictable saves are
    pub fn apply_intent(&mut self, intent: &Intent, strength: f32, step: Step) {
        let emit_width = lin(intent.chaos, 0.2, 1.0);
        self.params[EMIT_WIDTH].update_intent(emit_width, strength, Some("C -> lin [0.2, 1]"), step);

        let emit_centre = lin(intent.energy, 0.3, 0.9);
        self.params[EMIT_CENTRE].update_intent(emit_centre, strength, Some("E -> lin [0.3, 0.9]"), step);

        let save_width = lin(intent.structure, 0.5, 0.0);
        self.params[SAVE_WIDTH].update_intent(save_width, strength, Some("S -> lin [0.5, 0]"), step);
    }

    /// Per-frame housekeeping: run deferred saves, advance idle blenders
    pub fn update(&mut self, composite: Option<&Raster>, agency: f32, step: Step) {
        if let Some(source) = composite {
            self.bank.process_pending_save(source);
        }
        self.params.set_agency(agency);
        self.params.tick_all(step);
    }
}
