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

mod faulty;
mod file_store;
mod memory_store;
mod swap_area;

pub use faulty::{FaultSwitch, FaultyBackingStore};
pub use file_store::FileBackingStore;
pub use memory_store::MemoryBackingStore;
pub use swap_area::SwapArea;

use crate::address::{SectorId, PAGE_SIZE, SECTOR_SIZE};
use crate::util::div_ceil;

/// Sector addressed storage used for swap slots and for file backed pages.
///
/// The sectors of executables and mapped files are owned by the file system,
/// only the swap region is allocated through this module.
pub trait BackingStoreModule {
    /// Reads sector `sector` into `dest`, which is exactly [`SECTOR_SIZE`] bytes big.
    ///
    /// If this call fails, it could be that already some data was written to `dest`.
    fn read_sector(&mut self, sector: SectorId, dest: &mut [u8]) -> Result<(), ()>;

    /// Writes `src`, which is exactly [`SECTOR_SIZE`] bytes big, to sector `sector`.
    fn write_sector(&mut self, sector: SectorId, src: &[u8]) -> Result<(), ()>;

    /// Allocates one page sized run of swap sectors and returns its first sector.
    ///
    /// Returns `None` if the swap area is full.
    fn alloc_swap_slot(&mut self) -> Option<SectorId>;

    /// Returns a swap slot previously handed out by [`BackingStoreModule::alloc_swap_slot`].
    fn free_swap_slot(&mut self, slot: SectorId);

    /// Total number of sectors of this device (file region and swap region)
    fn sector_count(&self) -> u32;
}

/// Reads the first `length` bytes of the page stored at `first` into `dest`.
///
/// Sectors are read as a whole, the remainder of `dest` after the last
/// read sector is zero filled.
pub(crate) fn read_page<B: BackingStoreModule>(
    store: &mut B,
    first: SectorId,
    length: usize,
    dest: &mut [u8],
) -> Result<(), ()> {
    debug_assert_eq!(dest.len(), PAGE_SIZE);
    debug_assert!(length <= PAGE_SIZE);

    let sectors = div_ceil(length, SECTOR_SIZE);
    for (i, chunk) in dest.chunks_mut(SECTOR_SIZE).enumerate() {
        if i < sectors {
            store.read_sector(first.offset(i), chunk)?;
        } else {
            chunk.fill(0);
        }
    }

    // bytes of the last sector that are behind `length` don't belong to this page
    dest[length..].fill(0);

    Ok(())
}

/// Writes the first `length` bytes of `src` to the sectors starting at `first`.
///
/// If `length` ends inside a sector, the bytes of that sector behind `length`
/// keep their stored content.
pub(crate) fn write_page<B: BackingStoreModule>(
    store: &mut B,
    first: SectorId,
    length: usize,
    src: &[u8],
) -> Result<(), ()> {
    debug_assert_eq!(src.len(), PAGE_SIZE);
    debug_assert!(length <= PAGE_SIZE);

    let full = length / SECTOR_SIZE;
    for (i, chunk) in src.chunks(SECTOR_SIZE).take(full).enumerate() {
        store.write_sector(first.offset(i), chunk)?;
    }

    let tail = length % SECTOR_SIZE;
    if tail != 0 {
        let start = full * SECTOR_SIZE;
        let mut sector = [0u8; SECTOR_SIZE];
        store.read_sector(first.offset(full), &mut sector)?;
        sector[..tail].copy_from_slice(&src[start..start + tail]);
        store.write_sector(first.offset(full), &sector)?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use super::{read_page, write_page, BackingStoreModule};
    use crate::address::{SectorId, PAGE_SIZE, SECTORS_PER_PAGE, SECTOR_SIZE};

    pub(crate) fn gen_number(i: usize) -> u8 {
        (i * 3 + (i % 3) * 7 + (i % 11) * 51) as u8
    }

    /// test if write saves all data and read restores all of it
    pub(crate) fn test_backing_store_normal<B: BackingStoreModule>(mut store: B, file_sectors: u32) {
        let mut source = [0u8; SECTOR_SIZE];
        for sector in 0..file_sectors {
            for (i, byte) in source.iter_mut().enumerate() {
                *byte = gen_number(i + sector as usize);
            }
            store.write_sector(SectorId(sector), &source).unwrap();
        }

        let mut dest = [0u8; SECTOR_SIZE];
        for sector in 0..file_sectors {
            store.read_sector(SectorId(sector), &mut dest).unwrap();
            for (i, byte) in dest.iter().enumerate() {
                assert_eq!(*byte, gen_number(i + sector as usize));
            }
        }
    }

    /// test that swap slots are handed out once, lie behind the file region and can be reused
    pub(crate) fn test_backing_store_swap_slots<B: BackingStoreModule>(
        mut store: B,
        file_sectors: u32,
        swap_slots: usize,
    ) {
        let mut slots = vec![];
        while let Some(slot) = store.alloc_swap_slot() {
            assert!(slot.0 >= file_sectors, "swap slot overlaps file region");
            assert!(slot.0 + SECTORS_PER_PAGE as u32 <= store.sector_count());
            assert!(!slots.contains(&slot), "slot handed out twice");
            slots.push(slot);
        }
        assert_eq!(slots.len(), swap_slots);

        let freed = slots.remove(swap_slots / 2);
        store.free_swap_slot(freed);
        assert_eq!(store.alloc_swap_slot(), Some(freed));
        assert_eq!(store.alloc_swap_slot(), None);
    }

    pub(crate) fn test_backing_store_partial_page<B: BackingStoreModule>(mut store: B) {
        let mut page = [0u8; PAGE_SIZE];
        for (i, byte) in page.iter_mut().enumerate() {
            *byte = gen_number(i);
        }

        // only two and a half sectors of content
        let length = 2 * SECTOR_SIZE + SECTOR_SIZE / 2;
        write_page(&mut store, SectorId(0), length, &page).unwrap();

        let mut dest = [0xffu8; PAGE_SIZE];
        read_page(&mut store, SectorId(0), length, &mut dest).unwrap();
        assert_eq!(&dest[..length], &page[..length]);
        assert!(dest[length..].iter().all(|b| *b == 0));
    }

    pub(crate) fn test_backing_store_keeps_tail_of_last_sector<B: BackingStoreModule>(mut store: B) {
        let old = [0xaau8; SECTOR_SIZE];
        for sector in 0..SECTORS_PER_PAGE {
            store.write_sector(SectorId(sector as u32), &old).unwrap();
        }

        let page = [0x55u8; PAGE_SIZE];
        let length = SECTOR_SIZE + 100;
        write_page(&mut store, SectorId(0), length, &page).unwrap();

        let mut dest = [0u8; SECTOR_SIZE];
        store.read_sector(SectorId(0), &mut dest).unwrap();
        assert!(dest.iter().all(|b| *b == 0x55));

        // the file continues behind the page content
        store.read_sector(SectorId(1), &mut dest).unwrap();
        assert!(dest[..100].iter().all(|b| *b == 0x55));
        assert!(dest[100..].iter().all(|b| *b == 0xaa));

        store.read_sector(SectorId(2), &mut dest).unwrap();
        assert!(dest.iter().all(|b| *b == 0xaa));
    }
}
