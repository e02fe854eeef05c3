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

use super::{BackingStoreModule, SwapArea};
use crate::address::{SectorId, SECTORS_PER_PAGE, SECTOR_SIZE};

/// A backing store that keeps all sectors in RAM.
///
/// Sectors `[0, file_sectors)` are the file region, the swap region follows directly after.
/// Every read and write is counted so callers can check which I/O actually happened.
pub struct MemoryBackingStore {
    data: Vec<u8>,
    swap: SwapArea,
    file_sectors: u32,
    read_count: usize,
    write_count: usize,
}

impl MemoryBackingStore {
    pub fn new(file_sectors: u32, swap_slots: usize) -> Self {
        let total_sectors = file_sectors as usize + swap_slots * SECTORS_PER_PAGE;

        Self {
            data: vec![0; total_sectors * SECTOR_SIZE],
            swap: SwapArea::new(SectorId(file_sectors), swap_slots),
            file_sectors,
            read_count: 0,
            write_count: 0,
        }
    }

    /// Number of sectors that belong to the file region
    pub fn file_sectors(&self) -> u32 {
        self.file_sectors
    }

    pub fn read_count(&self) -> usize {
        self.read_count
    }

    pub fn write_count(&self) -> usize {
        self.write_count
    }

    pub fn swap_slots_in_use(&self) -> usize {
        self.swap.used_slots()
    }

    fn range(&self, sector: SectorId) -> core::ops::Range<usize> {
        let start = sector.0 as usize * SECTOR_SIZE;
        debug_assert!(
            start + SECTOR_SIZE <= self.data.len(),
            "illegal access, sector: {}, sector_count: {}",
            sector.0,
            self.sector_count()
        );

        start..start + SECTOR_SIZE
    }
}

impl BackingStoreModule for MemoryBackingStore {
    fn read_sector(&mut self, sector: SectorId, dest: &mut [u8]) -> Result<(), ()> {
        debug_assert_eq!(dest.len(), SECTOR_SIZE);
        let range = self.range(sector);
        dest.copy_from_slice(self.data.get(range).ok_or(())?);
        self.read_count += 1;

        Ok(())
    }

    fn write_sector(&mut self, sector: SectorId, src: &[u8]) -> Result<(), ()> {
        debug_assert_eq!(src.len(), SECTOR_SIZE);
        let range = self.range(sector);
        self.data.get_mut(range).ok_or(())?.copy_from_slice(src);
        self.write_count += 1;

        Ok(())
    }

    fn alloc_swap_slot(&mut self) -> Option<SectorId> {
        self.swap.allocate()
    }

    fn free_swap_slot(&mut self, slot: SectorId) {
        self.swap.free(slot)
    }

    fn sector_count(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }
}

#[cfg(test)]
mod test {
    use super::MemoryBackingStore;
    use crate::modules::backing_store::test::{
        test_backing_store_keeps_tail_of_last_sector, test_backing_store_normal,
        test_backing_store_partial_page, test_backing_store_swap_slots,
    };

    #[test]
    fn test_memory_store_normal() {
        test_backing_store_normal(MemoryBackingStore::new(64, 4), 64);
    }

    #[test]
    fn test_memory_store_swap_slots() {
        test_backing_store_swap_slots(MemoryBackingStore::new(64, 5), 64, 5);
    }

    #[test]
    fn test_memory_store_partial_page() {
        test_backing_store_partial_page(MemoryBackingStore::new(16, 0));
    }

    #[test]
    fn test_memory_store_keeps_tail_of_last_sector() {
        test_backing_store_keeps_tail_of_last_sector(MemoryBackingStore::new(16, 0));
    }
}
