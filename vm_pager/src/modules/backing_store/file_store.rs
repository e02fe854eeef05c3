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

use std::{
    fs::{remove_file, File},
    io::{Read, Seek, Write},
    mem::ManuallyDrop,
    path::Path,
};

use super::{BackingStoreModule, SwapArea};
use crate::address::{SectorId, SECTORS_PER_PAGE, SECTOR_SIZE};

/// A backing store that lives inside a host file.
///
/// Layout is the same as with [`MemoryBackingStore`](super::MemoryBackingStore):
/// file region first, swap region behind it.
pub struct FileBackingStore {
    /// underlying device file
    file: ManuallyDrop<File>,

    /// path of file, save for deleting file later
    file_path: String,

    /// cached device size in sectors, so no `metadata` call necessary
    sector_count: u32,

    swap: SwapArea,
}

impl FileBackingStore {
    /// Creates a new device file with `file_sectors` sectors of file region and `swap_slots` swap slots
    pub fn new(filepath: String, file_sectors: u32, swap_slots: usize) -> std::io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(filepath.clone())?;

        let sector_count = file_sectors + (swap_slots * SECTORS_PER_PAGE) as u32;
        file.set_len(sector_count as u64 * SECTOR_SIZE as u64)?;

        Ok(Self {
            file: ManuallyDrop::new(file),
            file_path: filepath,
            sector_count,
            swap: SwapArea::new(SectorId(file_sectors), swap_slots),
        })
    }

    fn seek_to(&mut self, sector: SectorId) -> Result<(), ()> {
        debug_assert!(
            sector.0 < self.sector_count,
            "illegal access, sector: {}, sector_count: {}",
            sector.0,
            self.sector_count
        );

        self.file
            .seek(std::io::SeekFrom::Start(sector.0 as u64 * SECTOR_SIZE as u64))
            .map_err(|_| ())?;

        Ok(())
    }
}

impl BackingStoreModule for FileBackingStore {
    fn read_sector(&mut self, sector: SectorId, dest: &mut [u8]) -> Result<(), ()> {
        debug_assert_eq!(dest.len(), SECTOR_SIZE);

        self.seek_to(sector)?;
        self.file.read_exact(dest).map_err(|_| ())?;

        Ok(())
    }

    fn write_sector(&mut self, sector: SectorId, src: &[u8]) -> Result<(), ()> {
        debug_assert_eq!(src.len(), SECTOR_SIZE);

        self.seek_to(sector)?;
        self.file.write_all(src).map_err(|_| ())?;

        Ok(())
    }

    fn alloc_swap_slot(&mut self) -> Option<SectorId> {
        self.swap.allocate()
    }

    fn free_swap_slot(&mut self, slot: SectorId) {
        self.swap.free(slot)
    }

    fn sector_count(&self) -> u32 {
        self.sector_count
    }
}

impl Drop for FileBackingStore {
    fn drop(&mut self) {
        // drop and close file before removing
        // note that after this call, file should never be accessed again...
        unsafe {
            ManuallyDrop::drop(&mut self.file);
        }

        if Path::new(self.file_path.as_str()).exists() {
            let _ = remove_file(self.file_path.as_str());
        }
    }
}
