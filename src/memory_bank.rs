//! Memory bank: a fixed set of content slots with biased random recall
//!
//! The bank archives crops of rendered content during a performance and
//! hands them back later under centre/width selection. Slots can be
//! cleared individually, so "recency" is tracked by an explicit save
//! order (oldest first) rather than by slot number.
//!
//! Invariants:
//! - every occupied slot appears exactly once in the save order
//! - every index in the save order is an occupied slot
//! - `occupied_count() == save_order().len()`
//!
//! Index selection maps `centre` in 0..1 onto `0..=max_index`, adds a
//! uniform perturbation of half-width `width * max_index / 2`, rounds and
//! clamps. Saving uses `max_index = existing` while a free slot remains, so
//! landing one past the end claims a fresh slot; anything else overwrites
//! the slot at that save-order position and makes it most recent.

use crate::raster::Raster;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Number of slots
pub const NUM_SLOTS: usize = 8;

/// Memory bank failure
#[derive(Debug)]
pub enum BankError {
    /// Used before `allocate`
    NotAllocated,
    /// IO error
    IoError(std::io::Error),
    /// Slot file could not be encoded or decoded
    SerdeError(String),
}

impl fmt::Display for BankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankError::NotAllocated => write!(f, "Memory bank not allocated"),
            BankError::IoError(e) => write!(f, "IO error: {}", e),
            BankError::SerdeError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BankError {}

impl From<std::io::Error> for BankError {
    fn from(e: std::io::Error) -> Self {
        BankError::IoError(e)
    }
}

impl From<bincode::Error> for BankError {
    fn from(e: bincode::Error) -> Self {
        BankError::SerdeError(e.to_string())
    }
}

/// Result type for memory bank persistence
pub type BankResult<T> = Result<T, BankError>;

/// Pixel layout of stored slots
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Keep source alpha
    #[default]
    Rgba8,
    /// Opaque: alpha forced to 255 on capture
    Rgb8,
}

/// File holding slot `slot` inside `folder`
pub fn slot_file_path(folder: &Path, slot: usize) -> PathBuf {
    folder.join(format!("slot-{}.bin", slot))
}

fn uniform(rng: &mut StdRng, lo: f32, hi: f32) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Fixed-capacity content store with save-order tracking
pub struct MemoryBank {
    width: u32,
    height: u32,
    format: PixelFormat,
    allocated: bool,
    slots: [Option<Arc<Raster>>; NUM_SLOTS],
    save_order: Vec<usize>,
    pending_save: Option<usize>,
    rng: StdRng,
}

impl Default for MemoryBank {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBank {
    /// Unallocated bank seeded from entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Unallocated bank with a reproducible random stream
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::default(),
            allocated: false,
            slots: Default::default(),
            save_order: Vec::with_capacity(NUM_SLOTS),
            pending_save: None,
            rng,
        }
    }

    /// Restart the random stream
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Fix the slot size and format; clears any previous occupancy
    pub fn allocate(&mut self, width: u32, height: u32, format: PixelFormat) {
        self.width = width;
        self.height = height;
        self.format = format;
        self.allocated = true;
        self.slots = Default::default();
        self.save_order.clear();
        self.pending_save = None;
        debug!("Memory bank allocated {}x{} {:?}", width, height, format);
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Slot dimensions
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn occupied_count(&self) -> usize {
        self.save_order.len()
    }

    /// Occupied slots, oldest first
    pub fn save_order(&self) -> &[usize] {
        &self.save_order
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        slot < NUM_SLOTS && self.slots[slot].is_some()
    }

    /// Content of a slot, if occupied
    pub fn get(&self, slot: usize) -> Option<Arc<Raster>> {
        self.slots.get(slot).and_then(|s| s.clone())
    }

    pub fn pending_save(&self) -> Option<usize> {
        self.pending_save
    }

    fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    fn mark_most_recent(&mut self, slot: usize) {
        self.save_order.retain(|&s| s != slot);
        self.save_order.push(slot);
    }

    /// Map centre/width onto `0..=max_index`
    pub fn select_slot_index(&mut self, centre: f32, width: f32, max_index: usize) -> usize {
        if max_index == 0 {
            return 0;
        }
        let max = max_index as f32;
        let target = centre * max;
        let half_spread = width * max * 0.5;
        let selected = target + uniform(&mut self.rng, -half_spread, half_spread);
        (selected.round().max(0.0) as usize).min(max_index)
    }

    /// Centre/width selection pulled toward one end by a squared random bias
    pub fn select_slot_index_weighted(
        &mut self,
        centre: f32,
        width: f32,
        prefer_recent: bool,
        max_index: usize,
    ) -> usize {
        if max_index == 0 {
            return 0;
        }
        let max = max_index as f32;
        let target = centre * max;
        let half_spread = width * max * 0.5;
        let base = target + uniform(&mut self.rng, -half_spread, half_spread);

        let bias = uniform(&mut self.rng, 0.0, 1.0);
        let bias = bias * bias;
        let extreme = if prefer_recent { max } else { 0.0 };
        let weighted = base + (extreme - base) * bias * 0.5;
        (weighted.round().max(0.0) as usize).min(max_index)
    }

    /// Save a random crop of `source` at a centre/width-selected position
    ///
    /// Returns the slot written, or None if the bank is not allocated.
    pub fn save(&mut self, source: &Raster, centre: f32, width: f32) -> Option<usize> {
        if !self.allocated {
            error!("Cannot save: memory bank not allocated");
            return None;
        }

        let existing = self.save_order.len();
        let has_free = existing < NUM_SLOTS;
        let max_index = if has_free {
            existing
        } else {
            existing.saturating_sub(1)
        };

        let index = self.select_slot_index(centre, width, max_index);

        let slot = if has_free && index == existing {
            self.first_free_slot()
        } else if self.save_order.is_empty() {
            self.first_free_slot()
        } else {
            let index = index.min(existing - 1);
            Some(self.save_order[index])
        };

        let Some(slot) = slot else {
            error!("Cannot save: no free slot available");
            return None;
        };

        self.save_to_slot(source, slot);
        Some(slot)
    }

    /// Save a random crop of `source` into `slot` and make it most recent
    pub fn save_to_slot(&mut self, source: &Raster, slot: usize) {
        if !self.allocated {
            error!("Cannot save: memory bank not allocated");
            return;
        }
        if slot >= NUM_SLOTS {
            error!("Invalid slot index: {}", slot);
            return;
        }
        let (max_x, max_y) = source.max_crop_origin(self.width, self.height);
        let x = self.rng.gen_range(0..=max_x);
        let y = self.rng.gen_range(0..=max_y);
        self.store(source, slot, x, y);
    }

    /// Save the crop of `source` at `origin` (clamped) into `slot`
    pub fn save_to_slot_crop(&mut self, source: &Raster, slot: usize, origin: (u32, u32)) {
        if !self.allocated {
            error!("Cannot save: memory bank not allocated");
            return;
        }
        if slot >= NUM_SLOTS {
            error!("Invalid slot index: {}", slot);
            return;
        }
        self.store(source, slot, origin.0, origin.1);
    }

    fn store(&mut self, source: &Raster, slot: usize, x: u32, y: u32) {
        let mut crop = source.crop(x, y, self.width, self.height);
        if self.format == PixelFormat::Rgb8 {
            crop.make_opaque();
        }
        self.slots[slot] = Some(Arc::new(crop));
        self.mark_most_recent(slot);
    }

    /// Defer a save into `slot` until the next `process_pending_save`
    pub fn request_save_to_slot(&mut self, slot: usize) {
        if slot >= NUM_SLOTS {
            error!("Invalid slot index: {}", slot);
            return;
        }
        self.pending_save = Some(slot);
    }

    /// Perform a deferred save, returning the slot written
    pub fn process_pending_save(&mut self, source: &Raster) -> Option<usize> {
        let slot = self.pending_save.take()?;
        self.save_to_slot(source, slot);
        self.is_occupied(slot).then_some(slot)
    }

    fn pick(&self, index: usize) -> Option<Arc<Raster>> {
        let index = index.min(self.save_order.len().checked_sub(1)?);
        self.get(self.save_order[index])
    }

    /// Centre/width recall over the save order
    pub fn select(&mut self, centre: f32, width: f32) -> Option<Arc<Raster>> {
        let max_index = self.save_order.len().checked_sub(1)?;
        let index = self.select_slot_index(centre, width, max_index);
        self.pick(index)
    }

    /// Recall with an occasional pull toward the most recent saves
    pub fn select_weighted_recent(&mut self, centre: f32, width: f32) -> Option<Arc<Raster>> {
        let max_index = self.save_order.len().checked_sub(1)?;
        let index = self.select_slot_index_weighted(centre, width, true, max_index);
        self.pick(index)
    }

    /// Recall with an occasional pull toward the oldest saves
    pub fn select_weighted_old(&mut self, centre: f32, width: f32) -> Option<Arc<Raster>> {
        let max_index = self.save_order.len().checked_sub(1)?;
        let index = self.select_slot_index_weighted(centre, width, false, max_index);
        self.pick(index)
    }

    /// Uniform recall among occupied slots
    pub fn select_random(&mut self) -> Option<Arc<Raster>> {
        let len = self.save_order.len();
        if len == 0 {
            return None;
        }
        let index = self.rng.gen_range(0..len);
        self.pick(index)
    }

    /// Empty one slot; clearing an empty slot is a no-op
    pub fn clear(&mut self, slot: usize) {
        if slot >= NUM_SLOTS {
            return;
        }
        self.slots[slot] = None;
        self.save_order.retain(|&s| s != slot);
        if self.pending_save == Some(slot) {
            self.pending_save = None;
        }
    }

    pub fn clear_all(&mut self) {
        self.slots = Default::default();
        self.save_order.clear();
        self.pending_save = None;
    }

    /// Write each occupied slot to `folder/slot-{i}.bin`
    ///
    /// Files of unoccupied slots are removed so cleared memories never come
    /// back on the next load. Individual write failures are logged and
    /// reported as `Ok(false)` after every slot has been attempted.
    pub fn save_all_to_folder(&self, folder: &Path) -> BankResult<bool> {
        if !self.allocated {
            error!("Cannot save memories: memory bank not allocated");
            return Err(BankError::NotAllocated);
        }
        fs::create_dir_all(folder)?;

        let mut ok = true;
        for (slot, content) in self.slots.iter().enumerate() {
            let path = slot_file_path(folder, slot);
            match content {
                Some(raster) => {
                    if let Err(e) = write_raster(&path, raster) {
                        error!("Failed to save memory {}: {}", path.display(), e);
                        ok = false;
                    }
                }
                None => {
                    if path.exists() {
                        if let Err(e) = fs::remove_file(&path) {
                            warn!("Failed to remove stale memory {}: {}", path.display(), e);
                        }
                    }
                }
            }
        }

        info!("Saved memories to folder: {}", folder.display());
        Ok(ok)
    }

    /// Replace the bank's contents with the slot files in `folder`
    ///
    /// Missing files leave their slot empty. Loaded slots enter the save
    /// order in slot order. Returns whether anything was loaded.
    pub fn load_all_from_folder(&mut self, folder: &Path) -> BankResult<bool> {
        if !self.allocated {
            error!("Cannot load memories: memory bank not allocated");
            return Err(BankError::NotAllocated);
        }

        self.clear_all();

        if !folder.exists() {
            info!("No memory folder found: {}", folder.display());
            return Ok(false);
        }

        for slot in 0..NUM_SLOTS {
            let path = slot_file_path(folder, slot);
            if !path.exists() {
                continue;
            }
            let raster = match read_raster(&path) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Failed to load memory {}: {}", path.display(), e);
                    continue;
                }
            };
            let mut raster = if raster.width() != self.width || raster.height() != self.height {
                raster.resized(self.width, self.height)
            } else {
                raster
            };
            if self.format == PixelFormat::Rgb8 {
                raster.make_opaque();
            }
            self.slots[slot] = Some(Arc::new(raster));
            self.save_order.push(slot);
        }

        let loaded = !self.save_order.is_empty();
        if loaded {
            info!(
                "Loaded {} memories from folder: {}",
                self.save_order.len(),
                folder.display()
            );
        }
        Ok(loaded)
    }
}

fn write_raster(path: &Path, raster: &Raster) -> BankResult<()> {
    let file = fs::File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), raster)?;
    Ok(())
}

fn read_raster(path: &Path) -> BankResult<Raster> {
    let file = fs::File::open(path)?;
    let raster: Raster = bincode::deserialize_from(BufReader::new(file))?;
    Raster::from_pixels(raster.width(), raster.height(), raster.pixels().to_vec())
        .ok_or_else(|| BankError::SerdeError(format!("corrupt raster in {}", path.display())))
}
