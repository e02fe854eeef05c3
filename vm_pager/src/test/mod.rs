/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::{
    modules::{
        backing_store::{BackingStoreModule, FaultSwitch, FaultyBackingStore, MemoryBackingStore},
        frame_allocator::PoolFrameAllocator,
    },
    Pager, SectorId, VmConfig, SECTOR_SIZE,
};

mod eviction;

pub(crate) type TestPager = Pager<PoolFrameAllocator, MemoryBackingStore>;
pub(crate) type FaultyTestPager = Pager<PoolFrameAllocator, FaultyBackingStore<MemoryBackingStore>>;

pub(crate) fn get_test_pager(frames: usize, file_sectors: u32, swap_slots: usize) -> TestPager {
    Pager::new(
        PoolFrameAllocator::new(frames),
        MemoryBackingStore::new(file_sectors, swap_slots),
        VmConfig::default(),
    )
}

pub(crate) fn get_faulty_test_pager(
    frames: usize,
    file_sectors: u32,
    swap_slots: usize,
) -> (FaultyTestPager, FaultSwitch) {
    let switch = FaultSwitch::new();
    let store = FaultyBackingStore::new(
        MemoryBackingStore::new(file_sectors, swap_slots),
        switch.clone(),
    );

    (
        Pager::new(PoolFrameAllocator::new(frames), store, VmConfig::default()),
        switch,
    )
}

/// Deterministic content of byte `i` of a test file
pub(crate) fn file_byte(i: usize) -> u8 {
    (i * 7 + (i / SECTOR_SIZE) * 13) as u8
}

/// Writes `bytes` bytes of [`file_byte`] content to the sectors starting at `first`
pub(crate) fn fill_file<B: BackingStoreModule>(store: &mut B, first: SectorId, bytes: usize) {
    let mut sector = [0u8; SECTOR_SIZE];
    let sectors = (bytes + SECTOR_SIZE - 1) / SECTOR_SIZE;

    for s in 0..sectors {
        for (i, byte) in sector.iter_mut().enumerate() {
            *byte = file_byte(s * SECTOR_SIZE + i);
        }
        store.write_sector(first.offset(s), &sector).unwrap();
    }
}

/// Reads `bytes` bytes starting at sector `first`
pub(crate) fn read_file<B: BackingStoreModule>(store: &mut B, first: SectorId, bytes: usize) -> Vec<u8> {
    let sectors = (bytes + SECTOR_SIZE - 1) / SECTOR_SIZE;
    let mut data = vec![0u8; sectors * SECTOR_SIZE];

    for (s, chunk) in data.chunks_mut(SECTOR_SIZE).enumerate() {
        store.read_sector(first.offset(s), chunk).unwrap();
    }
    data.truncate(bytes);

    data
}
