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

use crate::address::{SectorId, SECTORS_PER_PAGE};
use crate::util::bit_array::BitArray;

/// Page granular slot bookkeeping of the swap region of a device.
///
/// The region starts at sector `base` and holds `slots` page sized slots.
pub struct SwapArea {
    base: SectorId,
    used: BitArray,
}

impl SwapArea {
    pub fn new(base: SectorId, slots: usize) -> Self {
        Self {
            base,
            used: BitArray::new(slots),
        }
    }

    /// Number of sectors covered by this swap area
    pub fn sector_span(&self) -> usize {
        self.used.len() * SECTORS_PER_PAGE
    }

    pub fn allocate(&mut self) -> Option<SectorId> {
        let index = self.used.first_unset()?;
        self.used.set(true, index);

        Some(self.base.offset(index * SECTORS_PER_PAGE))
    }

    pub fn free(&mut self, slot: SectorId) {
        debug_assert!(slot >= self.base, "{} is not part of the swap area", slot);
        let relative = (slot.0 - self.base.0) as usize;
        debug_assert_eq!(relative % SECTORS_PER_PAGE, 0, "{} is not a slot start", slot);

        let index = relative / SECTORS_PER_PAGE;
        debug_assert!(self.used.is_set(index), "double free of swap slot {}", slot);
        self.used.set(false, index);
    }

    pub fn used_slots(&self) -> usize {
        self.used.count_set()
    }
}
