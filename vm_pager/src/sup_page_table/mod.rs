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

mod frame_record;
mod frame_state;
mod page_entry;
mod propagation;
mod share_index;


pub use frame_record::FrameRecord;
pub use frame_state::{FrameState, Origin, Position};
pub use page_entry::PageEntry;
pub use propagation::PteBit;

use std::collections::HashMap;

use log::trace;
use share_index::ShareIndex;

use crate::address::{AddressSpaceId, FrameId, ImageKey, PageKey, PhysFrame, SectorId, PAGE_SIZE};
use crate::error::VmError;
use crate::modules::replacement::VictimCandidates;
use crate::page_directory::PageDirectories;

/// Resources that became free after the last sharer of a frame was removed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReleasedFrame {
    /// Physical frame that has to be given back to the frame allocator
    pub phys: Option<PhysFrame>,

    /// Swap slot that has to be given back to the backing store
    pub swap_slot: Option<SectorId>,
}

/// Supplemental page table: maps every registered page to the frame record
/// describing its content, and tracks the records themselves.
///
/// Records live in an arena indexed by [`FrameId`], released slots are reused.
#[derive(Default)]
pub struct SupPageTable {
    entries: HashMap<PageKey, PageEntry>,
    frames: Vec<Option<FrameRecord>>,
    free_slots: Vec<usize>,
    share_index: ShareIndex,
}

impl SupPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry registered for `key`
    pub fn lookup(&self, key: PageKey) -> Option<&PageEntry> {
        self.entries.get(&key)
    }

    /// Number of registered pages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn frame(&self, frame: FrameId) -> Option<&FrameRecord> {
        self.frames.get(frame.0)?.as_ref()
    }

    pub(crate) fn frame_mut(&mut self, frame: FrameId) -> Option<&mut FrameRecord> {
        self.frames.get_mut(frame.0)?.as_mut()
    }

    /// Looks up `key` and the frame record behind it
    pub fn record_of(&self, key: PageKey) -> Result<(FrameId, &FrameRecord), VmError> {
        let entry = self.lookup(key).ok_or(VmError::NotFound(key))?;
        let record = self.frame(entry.frame()).ok_or(VmError::NotFound(key))?;

        Ok((entry.frame(), record))
    }

    /// Number of slots in the frame arena (used and unused)
    pub fn frame_slots(&self) -> usize {
        self.frames.len()
    }

    /// Number of frame records (pages shared by multiple address spaces count once)
    pub fn frame_count(&self) -> usize {
        self.frames.len() - self.free_slots.len()
    }

    pub fn resident_frames(&self) -> usize {
        self.frames
            .iter()
            .flatten()
            .filter(|record| record.is_resident())
            .count()
    }

    /// All registered keys of `asid`, in ascending page order
    pub fn keys_of(&self, asid: AddressSpaceId) -> Vec<PageKey> {
        let mut keys: Vec<PageKey> = self
            .entries
            .keys()
            .filter(|key| key.asid == asid)
            .copied()
            .collect();
        keys.sort();

        keys
    }

    fn insert_frame(&mut self, record: FrameRecord) -> FrameId {
        match self.free_slots.pop() {
            Some(slot) => {
                debug_assert!(self.frames[slot].is_none());
                self.frames[slot] = Some(record);
                FrameId(slot)
            }
            None => {
                self.frames.push(Some(record));
                FrameId(self.frames.len() - 1)
            }
        }
    }

    /// Registers `key` with a new, exclusively owned frame record.
    ///
    /// `length` is the number of bytes of real content, the rest of the page is zero.
    /// Pages that start out on disk or in swap need a `backing_sector`.
    pub fn add(
        &mut self,
        key: PageKey,
        length: usize,
        state: FrameState,
        backing_sector: Option<SectorId>,
    ) -> Result<FrameId, VmError> {
        if self.entries.contains_key(&key) {
            return Err(VmError::DuplicateKey(key));
        }

        let position = state.position();
        if position.is_resident() {
            // content is always materialized by a fault
            return Err(VmError::InvalidTransition {
                from: position,
                to: position,
            });
        }

        if matches!(position, Position::OnDisk | Position::InSwap) && backing_sector.is_none() {
            return Err(VmError::MissingBackingSector(key));
        }

        debug_assert!(length <= PAGE_SIZE);
        let length = length.min(PAGE_SIZE);

        let frame = self.insert_frame(FrameRecord::new(key, length, state, backing_sector));
        self.entries.insert(key, PageEntry::new(key, frame));
        trace!("Registered {} as frame {:?} ({:?})", key, frame, state);

        #[cfg(debug_assertions)]
        self.check_integrity();

        Ok(frame)
    }

    /// Registers `key` as an additional sharer of `frame`.
    ///
    /// Only read-only executable frames that are not pinned can be shared.
    pub fn shared_add(&mut self, key: PageKey, frame: FrameId) -> Result<(), VmError> {
        if self.entries.contains_key(&key) {
            return Err(VmError::DuplicateKey(key));
        }

        let record = self
            .frame_mut(frame)
            .ok_or(VmError::IneligibleForSharing)?;

        if !record.state.is_shareable() || record.state.is_pinned() || record.busy {
            return Err(VmError::IneligibleForSharing);
        }

        record.sharers.push(key);
        let sharers = record.sharers.len();
        self.entries.insert(key, PageEntry::new(key, frame));
        trace!("{} attached to frame {:?}, {} sharers", key, frame, sharers);

        #[cfg(debug_assertions)]
        self.check_integrity();

        Ok(())
    }

    /// Makes `frame` findable by other address spaces loading `image`.
    ///
    /// Returns `false` if the image page is already registered with another frame.
    pub fn register_shareable(&mut self, frame: FrameId, image: ImageKey) -> Result<bool, VmError> {
        let record = self
            .frame_mut(frame)
            .ok_or(VmError::IneligibleForSharing)?;
        if !record.state.is_shareable() {
            return Err(VmError::IneligibleForSharing);
        }

        if self.share_index.insert(image, frame) {
            if let Some(record) = self.frame_mut(frame) {
                record.image = Some(image);
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Frame that currently holds `image`, if any
    pub fn shareable_frame(&self, image: ImageKey) -> Option<FrameId> {
        self.share_index.get(image)
    }

    /// Removes the page of `key`.
    ///
    /// If it was the last sharer, the frame record is dropped and the resources
    /// it held are returned. The caller hands them back to the frame allocator
    /// and the backing store.
    pub fn find_and_delete(
        &mut self,
        dirs: &mut PageDirectories,
        key: PageKey,
    ) -> Result<ReleasedFrame, VmError> {
        let entry = *self.lookup(key).ok_or(VmError::NotFound(key))?;
        self.delete(dirs, entry)
    }

    /// Removes `entry`, see [`SupPageTable::find_and_delete`]
    pub fn delete(
        &mut self,
        dirs: &mut PageDirectories,
        entry: PageEntry,
    ) -> Result<ReleasedFrame, VmError> {
        let key = entry.key();
        let frame = entry.frame();

        match self.entries.get(&key) {
            Some(registered) if *registered == entry => {}
            _ => return Err(VmError::NotFound(key)),
        }

        let record = self.frame_mut(frame).ok_or(VmError::NotFound(key))?;
        debug_assert!(!record.busy, "deleting a frame with I/O in flight");

        let removed = record.remove_sharer(key);
        debug_assert!(removed);
        let last = record.sharers.is_empty();

        self.entries.remove(&key);
        dirs.remove_pte(key);

        if !last {
            trace!("Detached {} from shared frame {:?}", key, frame);

            #[cfg(debug_assertions)]
            self.check_integrity();

            return Ok(ReleasedFrame::default());
        }

        let record = self.frames[frame.0].take().ok_or(VmError::NotFound(key))?;
        self.free_slots.push(frame.0);
        if let Some(image) = record.image {
            self.share_index.remove(image, frame);
        }

        trace!("Deleted {} and frame {:?}", key, frame);

        #[cfg(debug_assertions)]
        self.check_integrity();

        Ok(ReleasedFrame {
            phys: record.phys,
            swap_slot: record.owned_swap_slot(),
        })
    }

    /// Moves `frame` into memory at `phys`.
    ///
    /// Works for content that was in swap, on disk or not materialized yet.
    /// The backing sector falls back to the origin sector, so the caller has to
    /// take the swap slot out of the record before and free it afterwards.
    /// No sharer is mapped yet, see [`SupPageTable::set_memory_map`].
    pub fn set_swap_in(&mut self, frame: FrameId, phys: PhysFrame) -> Result<(), VmError> {
        let record = self
            .frame_mut(frame)
            .ok_or(VmError::InvalidTransition {
                from: Position::ZeroFill,
                to: Position::InMemory,
            })?;

        record.state.set_position(Position::InMemory)?;
        record.phys = Some(phys);
        record.backing_sector = record.origin_sector;

        Ok(())
    }

    /// Moves the resident `frame` out of memory.
    ///
    /// The frame is now at `sector`: inside the swap area, or on disk if
    /// `now_on_disk`. Every sharer's translation is invalidated. Returns
    /// the physical frame, which the caller releases.
    pub fn set_swap_out(
        &mut self,
        dirs: &mut PageDirectories,
        frame: FrameId,
        sector: Option<SectorId>,
        now_on_disk: bool,
    ) -> Result<PhysFrame, VmError> {
        let to = if now_on_disk {
            Position::OnDisk
        } else {
            Position::InSwap
        };

        let record = self
            .frame_mut(frame)
            .ok_or(VmError::InvalidTransition {
                from: Position::ZeroFill,
                to,
            })?;

        let Some(phys) = record.phys else {
            return Err(VmError::InvalidTransition {
                from: record.state.position(),
                to,
            });
        };

        record.state.set_position(to)?;
        record.phys = None;
        record.mapped_address = None;
        record.backing_sector = sector;

        let record = &self.frames[frame.0];
        if let Some(record) = record {
            propagation::set_pte_list(record, dirs, false);
        }

        #[cfg(debug_assertions)]
        self.check_integrity();

        Ok(phys)
    }

    /// Installs the physical frame for `key`.
    ///
    /// If the frame is not resident yet it is moved into memory at `phys` first.
    /// Afterwards the page table entry of `key` translates to the frame.
    pub fn set_memory_map(
        &mut self,
        dirs: &mut PageDirectories,
        key: PageKey,
        phys: PhysFrame,
    ) -> Result<(), VmError> {
        let frame = self.lookup(key).ok_or(VmError::NotFound(key))?.frame();

        let resident = self.frame(frame).map(FrameRecord::is_resident);
        if resident == Some(false) {
            self.set_swap_in(frame, phys)?;
        }

        let record = self.frame_mut(frame).ok_or(VmError::NotFound(key))?;
        debug_assert_eq!(record.phys, Some(phys));
        if record.mapped_address.is_none() {
            record.mapped_address = Some(key.vpage.base());
        }

        let writable = !record.state.is_read_only();
        let pte = dirs
            .pte_or_default(key)
            .ok_or(VmError::UnknownAddressSpace(key.asid))?;
        pte.install(phys, writable);

        #[cfg(debug_assertions)]
        self.check_integrity();

        Ok(())
    }

    /// Sets or clears the accessed bit of every sharer of `frame`
    pub fn set_access(
        &self,
        dirs: &mut PageDirectories,
        frame: FrameId,
        value: bool,
    ) -> Result<(), VmError> {
        self.scan_and_set(dirs, frame, PteBit::Accessed, value)
            .map(|_| ())
    }

    /// Sets or clears the dirty bit of every sharer of `frame`
    pub fn set_dirty(
        &self,
        dirs: &mut PageDirectories,
        frame: FrameId,
        value: bool,
    ) -> Result<(), VmError> {
        self.scan_and_set(dirs, frame, PteBit::Dirty, value)
            .map(|_| ())
    }

    /// Makes the translation of every sharer of `frame` valid or invalid
    pub fn set_pte_list(
        &self,
        dirs: &mut PageDirectories,
        frame: FrameId,
        present: bool,
    ) -> Result<(), VmError> {
        let record = self.frame(frame).ok_or(VmError::InvalidTransition {
            from: Position::ZeroFill,
            to: Position::InMemory,
        })?;
        if present && !record.is_resident() {
            return Err(VmError::InvalidTransition {
                from: record.state.position(),
                to: Position::InMemory,
            });
        }

        propagation::set_pte_list(record, dirs, present);
        Ok(())
    }

    /// Sets `bit` of every sharer of `frame` to `value`.
    ///
    /// Returns whether the bit was set in the entry of any sharer before.
    pub fn scan_and_set(
        &self,
        dirs: &mut PageDirectories,
        frame: FrameId,
        bit: PteBit,
        value: bool,
    ) -> Result<bool, VmError> {
        if bit == PteBit::Present {
            let was_present = self.is_present_anywhere(dirs, frame);
            self.set_pte_list(dirs, frame, value)?;
            return Ok(was_present);
        }

        let record = self.frame(frame).ok_or(VmError::InvalidTransition {
            from: Position::ZeroFill,
            to: Position::InMemory,
        })?;

        Ok(propagation::scan_and_set(record, dirs, bit, value))
    }

    /// Was any sharer of `frame` written to since the dirty bits were last cleared?
    pub fn is_dirty(&self, dirs: &PageDirectories, frame: FrameId) -> bool {
        self.frame(frame)
            .is_some_and(|record| propagation::any_set(record, dirs, PteBit::Dirty))
    }

    fn is_present_anywhere(&self, dirs: &PageDirectories, frame: FrameId) -> bool {
        self.frame(frame)
            .is_some_and(|record| propagation::any_set(record, dirs, PteBit::Present))
    }

    /// Sharers of `frame` whose translation is currently valid
    pub fn mapped_sharers(&self, dirs: &PageDirectories, frame: FrameId) -> Vec<PageKey> {
        self.frame(frame)
            .map(|record| propagation::present_sharers(record, dirs))
            .unwrap_or_default()
    }

    /// Makes the translation of `keys` to the resident `frame` valid again
    pub fn remap_sharers(
        &self,
        dirs: &mut PageDirectories,
        frame: FrameId,
        keys: &[PageKey],
    ) -> Result<(), VmError> {
        let record = self.frame(frame).ok_or(VmError::InvalidTransition {
            from: Position::ZeroFill,
            to: Position::InMemory,
        })?;
        if !record.is_resident() {
            return Err(VmError::InvalidTransition {
                from: record.state.position(),
                to: Position::InMemory,
            });
        }

        propagation::revalidate(record, dirs, keys);
        Ok(())
    }

    /// Sweep view for the replacement policy, frames in `skip` are never offered
    pub(crate) fn victim_candidates<'a>(
        &'a self,
        dirs: &'a mut PageDirectories,
        skip: &'a [FrameId],
    ) -> FrameTableView<'a> {
        FrameTableView {
            table: self,
            dirs,
            skip,
        }
    }

    /// Checks if the registry is consistent
    ///
    /// Panics if that is not the case.
    #[cfg(debug_assertions)]
    pub(crate) fn check_integrity(&self) {
        for (key, entry) in self.entries.iter() {
            assert_eq!(*key, entry.key());
            let record = self
                .frame(entry.frame())
                .unwrap_or_else(|| panic!("entry {} points to a free frame slot", key));
            assert!(record.sharers.contains(key), "{} is missing as sharer", key);
        }

        for (slot, record) in self.frames.iter().enumerate() {
            let Some(record) = record else {
                assert!(self.free_slots.contains(&slot));
                continue;
            };

            assert!(!record.sharers.is_empty(), "frame {} has no sharers", slot);
            if record.sharers.len() > 1 {
                assert!(record.state.is_shareable(), "frame {} is shared but not shareable", slot);
            }
            for key in record.sharers.iter() {
                assert_eq!(self.entries.get(key).map(|e| e.frame()), Some(FrameId(slot)));
            }

            assert_eq!(record.is_resident(), record.phys.is_some());
            assert_eq!(
                record.is_resident(),
                record.mapped_address.is_some(),
                "frame {} has a wrong mapped address",
                slot
            );
            if let Some(image) = record.image {
                assert_eq!(self.share_index.get(image), Some(FrameId(slot)));
            }
        }

        assert!(self.share_index.len() <= self.frame_count());
    }
}

/// Borrowed view onto the frame table and the page directories, swept by the replacement policy
pub(crate) struct FrameTableView<'a> {
    table: &'a SupPageTable,
    dirs: &'a mut PageDirectories,
    skip: &'a [FrameId],
}

impl VictimCandidates for FrameTableView<'_> {
    fn slot_count(&self) -> usize {
        self.table.frame_slots()
    }

    fn is_evictable(&self, frame: FrameId) -> bool {
        !self.skip.contains(&frame)
            && self
                .table
                .frame(frame)
                .is_some_and(FrameRecord::is_evictable)
    }

    fn test_and_clear_accessed(&mut self, frame: FrameId) -> bool {
        self.table
            .scan_and_set(self.dirs, frame, PteBit::Accessed, false)
            .unwrap_or(false)
    }
}
