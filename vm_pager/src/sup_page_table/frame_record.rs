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

use super::frame_state::{FrameState, Position};
use crate::address::{ImageKey, PageKey, PhysFrame, SectorId, VirtAddr};

/// Description of the content of one page and of where it currently lives.
///
/// A record is referenced by one page entry per address space that maps it
/// (its sharers). Only shareable records (read-only executable content) ever
/// have more than one sharer.
#[derive(Debug)]
pub struct FrameRecord {
    /// Page aligned user address the frame is mapped at, `None` if not resident
    pub(crate) mapped_address: Option<VirtAddr>,

    /// Physical frame, only set while resident
    pub(crate) phys: Option<PhysFrame>,

    /// Bytes of real content, the rest of the page is zero
    pub(crate) length: usize,

    pub(crate) state: FrameState,

    /// Where the content lives if it is not resident, `None` if there is no valid sector
    pub(crate) backing_sector: Option<SectorId>,

    /// Sector of the original content inside the executable or mapped file
    pub(crate) origin_sector: Option<SectorId>,

    /// Writable executable content was modified and evicted at least once,
    /// so the image does not hold the current content anymore
    pub(crate) diverged: bool,

    /// Key inside the share index, only set for shareable executable content
    pub(crate) image: Option<ImageKey>,

    /// One back reference per address space that maps this frame
    pub(crate) sharers: Vec<PageKey>,

    /// Number of open pins, the frame is excluded from eviction while this is not zero
    pins: usize,

    /// An I/O transition (page in or write back) is in flight
    pub(crate) busy: bool,
}

impl FrameRecord {
    pub(crate) fn new(
        owner: PageKey,
        length: usize,
        state: FrameState,
        backing_sector: Option<SectorId>,
    ) -> Self {
        let origin_sector = if state.position() == Position::OnDisk {
            backing_sector
        } else {
            None
        };

        Self {
            mapped_address: None,
            phys: None,
            length,
            state,
            backing_sector,
            origin_sector,
            diverged: false,
            image: None,
            sharers: vec![owner],
            pins: 0,
            busy: false,
        }
    }

    pub fn mapped_address(&self) -> Option<VirtAddr> {
        self.mapped_address
    }

    pub fn phys(&self) -> Option<PhysFrame> {
        self.phys
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn backing_sector(&self) -> Option<SectorId> {
        self.backing_sector
    }

    pub fn image(&self) -> Option<ImageKey> {
        self.image
    }

    pub fn sharers(&self) -> &[PageKey] {
        &self.sharers
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.state.position().is_resident()
    }

    /// Resident and neither pinned nor in the middle of I/O
    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.is_resident() && !self.state.is_pinned() && !self.busy
    }

    /// The swap slot that this record owns exclusively
    pub(crate) fn owned_swap_slot(&self) -> Option<SectorId> {
        if self.state.position() == Position::InSwap {
            self.backing_sector
        } else {
            None
        }
    }

    pub(crate) fn pin(&mut self) {
        self.pins += 1;
        self.state.set_pinned(true);
    }

    pub(crate) fn unpin(&mut self) {
        debug_assert!(self.pins > 0, "unbalanced unpin");
        self.pins = self.pins.saturating_sub(1);
        self.state.set_pinned(self.pins != 0);
    }

    /// Removes `key` from the sharers, returns `false` if it was not a sharer
    pub(crate) fn remove_sharer(&mut self, key: PageKey) -> bool {
        match self.sharers.iter().position(|sharer| *sharer == key) {
            Some(index) => {
                self.sharers.swap_remove(index);
                true
            }
            None => false,
        }
    }
}
