/// Memory bank save-order and persistence behaviour
///
/// The slot chosen by a centre/width save depends on how many slots are
/// occupied and whether a free one exists. These tests pin down the
/// boundary between "take a new free slot" and "overwrite by position".

use marksynth::memory_bank::{slot_file_path, MemoryBank, PixelFormat, NUM_SLOTS};
use marksynth::raster::Raster;

/// Helper: allocated 8x8 bank with a fixed random stream
fn bank() -> MemoryBank {
    let mut bank = MemoryBank::with_seed(11);
    bank.allocate(8, 8, PixelFormat::Rgba8);
    bank
}

/// Helper: 32x32 source filled with one shade
fn source(shade: u8) -> Raster {
    Raster::filled(32, 32, [shade, shade, shade, 255])
}

/// Helper: five saves at centre 1.0, then clear slot 2
fn five_saved_then_clear_two() -> MemoryBank {
    let mut bank = bank();
    for i in 0..5 {
        assert_eq!(bank.save(&source(i as u8), 1.0, 0.0), Some(i));
    }
    assert_eq!(bank.save_order(), &[0, 1, 2, 3, 4]);
    bank.clear(2);
    assert_eq!(bank.save_order(), &[0, 1, 3, 4]);
    bank
}

#[test]
fn test_centre_one_takes_free_slot_after_clear() {
    let mut bank = five_saved_then_clear_two();

    // Index maps to one past the last position and a slot is free
    assert_eq!(bank.save(&source(50), 1.0, 0.0), Some(2));
    assert_eq!(bank.save_order(), &[0, 1, 3, 4, 2]);
    assert_eq!(bank.get(2).unwrap().pixel(0, 0), Some([50, 50, 50, 255]));
}

#[test]
fn test_centre_near_one_overwrites_by_position() {
    let mut bank = five_saved_then_clear_two();

    // 0.8 * 4 = 3.2 rounds to position 3, which holds slot 4
    assert_eq!(bank.save(&source(60), 0.8, 0.0), Some(4));
    assert_eq!(bank.save_order(), &[0, 1, 3, 4]);
    assert!(!bank.is_occupied(2));

    // 0.9 * 4 = 3.6 rounds to 4 == occupied count, so the free slot is used
    assert_eq!(bank.save(&source(70), 0.9, 0.0), Some(2));
    assert_eq!(bank.save_order(), &[0, 1, 3, 4, 2]);
}

#[test]
fn test_overwrite_moves_slot_to_most_recent() {
    let mut bank = five_saved_then_clear_two();

    // Position 0 is the oldest save, slot 0
    assert_eq!(bank.save(&source(80), 0.0, 0.0), Some(0));
    assert_eq!(bank.save_order(), &[1, 3, 4, 0]);
    assert_eq!(bank.occupied_count(), 4);
}

#[test]
fn test_full_bank_never_exceeds_capacity() {
    let mut bank = bank();
    for i in 0..(NUM_SLOTS * 3) {
        let slot = bank.save(&source(i as u8), 0.5, 1.0).unwrap();
        assert!(slot < NUM_SLOTS);
    }
    assert_eq!(bank.occupied_count(), NUM_SLOTS);

    let mut order = bank.save_order().to_vec();
    order.sort_unstable();
    assert_eq!(order, (0..NUM_SLOTS).collect::<Vec<_>>());
}

#[test]
fn test_folder_round_trip_keeps_occupancy() {
    let dir = tempfile::tempdir().unwrap();
    let mut saved = five_saved_then_clear_two();
    assert!(saved.save_all_to_folder(dir.path()).unwrap());
    assert!(!slot_file_path(dir.path(), 2).exists());

    let mut loaded = MemoryBank::with_seed(5);
    loaded.allocate(8, 8, PixelFormat::Rgba8);
    assert!(loaded.load_all_from_folder(dir.path()).unwrap());
    assert_eq!(loaded.occupied_count(), 4);
    for slot in 0..NUM_SLOTS {
        assert_eq!(loaded.is_occupied(slot), saved.is_occupied(slot), "slot {}", slot);
    }

    // Clearing and saving again removes the stale file
    saved.clear(3);
    saved.save_all_to_folder(dir.path()).unwrap();
    loaded.load_all_from_folder(dir.path()).unwrap();
    assert!(!loaded.is_occupied(3));
    assert_eq!(loaded.occupied_count(), 3);
}

#[test]
fn test_slot_files_are_raw_rasters() {
    let dir = tempfile::tempdir().unwrap();
    let saved = five_saved_then_clear_two();
    saved.save_all_to_folder(dir.path()).unwrap();

    let slot = saved.save_order()[0];
    let path = slot_file_path(dir.path(), slot);
    assert_eq!(path.file_name().unwrap(), format!("slot-{}.bin", slot).as_str());
    let bytes = std::fs::read(&path).unwrap();
    // Not a PNG: the raster is stored as-is, pixels included
    assert_ne!(&bytes[..4], b"\x89PNG");
    assert!(bytes.len() >= 8 * 8 * 4);
}

#[test]
fn test_load_resizes_to_bank_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut big = MemoryBank::with_seed(1);
    big.allocate(16, 16, PixelFormat::Rgba8);
    big.save_to_slot(&source(200), 6);
    big.save_all_to_folder(dir.path()).unwrap();

    let mut small = bank();
    small.load_all_from_folder(dir.path()).unwrap();
    let content = small.get(6).unwrap();
    assert_eq!((content.width(), content.height()), (8, 8));
    assert_eq!(content.pixel(3, 3), Some([200, 200, 200, 255]));
}

#[test]
fn test_missing_folder_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut bank = five_saved_then_clear_two();
    assert!(!bank.load_all_from_folder(&dir.path().join("absent")).unwrap());
    assert_eq!(bank.occupied_count(), 0);
}
