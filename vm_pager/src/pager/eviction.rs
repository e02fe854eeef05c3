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

use log::{debug, error, warn};
use parking_lot::MutexGuard;

use super::{Pager, PagerGuard};
use crate::address::{FrameId, PageKey, PhysFrame, SectorId, PAGE_SIZE};
use crate::error::VmError;
use crate::modules::backing_store::{write_page, BackingStoreModule};
use crate::modules::frame_allocator::FrameAllocatorModule;
use crate::modules::replacement::ReplacementModule;
use crate::sup_page_table::{Origin, PteBit};

/// Where the content of an evicted frame goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvictionTarget {
    /// The sector still holds the content, nothing has to be written
    Discard(SectorId),

    /// Write the content back to its file sector
    WriteBack(SectorId),

    /// Write the whole page to a fresh swap slot
    Swap,
}

impl EvictionTarget {
    fn decide(
        origin: Origin,
        read_only: bool,
        dirty: bool,
        diverged: bool,
        origin_sector: Option<SectorId>,
    ) -> Self {
        match (origin, origin_sector) {
            (Origin::MemoryMappedFile, Some(sector)) if dirty => EvictionTarget::WriteBack(sector),
            (Origin::MemoryMappedFile, Some(sector)) => EvictionTarget::Discard(sector),
            (Origin::Executable, Some(sector)) if !diverged && (read_only || !dirty) => {
                EvictionTarget::Discard(sector)
            }
            _ => EvictionTarget::Swap,
        }
    }
}

impl<F: FrameAllocatorModule, B: BackingStoreModule, R: ReplacementModule> Pager<F, B, R> {
    /// Evicts one frame selected by the replacement policy.
    ///
    /// Returns `false` if no frame could be evicted, because every resident
    /// frame is pinned or would need a swap slot while the swap area is full.
    pub fn evict(&self) -> Result<bool, VmError> {
        let mut guard = self.inner.lock();
        self.evict_any(&mut guard)
    }

    /// Evicts the page of `key`, does nothing if it is not resident
    pub fn evict_page(&self, key: PageKey) -> Result<(), VmError> {
        let mut guard = self.inner.lock();
        self.wait_until_idle(&mut guard, key)?;

        let (frame, record) = guard.table.record_of(key)?;
        if !record.is_resident() {
            return Ok(());
        }
        if record.state().is_pinned() {
            return Err(VmError::Pinned(key));
        }

        if self.evict_victim(&mut guard, frame)? {
            Ok(())
        } else {
            Err(VmError::OutOfMemory)
        }
    }

    /// Evicts a frame so an allocation can succeed, returns the freed frame.
    ///
    /// The frame is acquired before the lock is released, so no other thread can take it.
    pub(super) fn evict_for_allocation(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
    ) -> Result<Option<PhysFrame>, VmError> {
        if self.evict_any(guard)? {
            Ok(guard.allocator.acquire_frame())
        } else {
            Ok(None)
        }
    }

    /// Evicts victims of the replacement policy until one of them is out of memory.
    ///
    /// Victims that need a swap slot while the swap area is full stay resident
    /// and are not offered again in this pass.
    fn evict_any(&self, guard: &mut PagerGuard<'_, F, R>) -> Result<bool, VmError> {
        let mut swap_bound = Vec::new();

        while let Some(victim) = self.select_victim(guard, &swap_bound) {
            if self.evict_victim(guard, victim)? {
                return Ok(true);
            }
            swap_bound.push(victim);
        }

        Ok(false)
    }

    fn select_victim(&self, guard: &mut PagerGuard<'_, F, R>, skip: &[FrameId]) -> Option<FrameId> {
        let inner = &mut **guard;
        let mut candidates = inner.table.victim_candidates(&mut inner.dirs, skip);

        inner.replacement.select_victim(&mut candidates)
    }

    /// Evicts `victim`, returns `false` if it stays resident because the swap area is full
    fn evict_victim(&self, guard: &mut PagerGuard<'_, F, R>, victim: FrameId) -> Result<bool, VmError> {
        let evicted = self.with_pinned(guard, victim, |guard| self.evict_frame(guard, victim))?;
        if evicted {
            guard.stats.evictions += 1;
        }

        Ok(evicted)
    }

    /// Moves the resident `frame` out of memory and releases its physical frame.
    ///
    /// Must run inside a pin scope of `frame`. Returns `false` without changes
    /// if the frame needs a swap slot and there is none. On failure the frame
    /// stays resident and the sharers that had a valid translation get it back.
    fn evict_frame(&self, guard: &mut PagerGuard<'_, F, R>, frame: FrameId) -> Result<bool, VmError> {
        let (origin, read_only, diverged, origin_sector, length, phys) = {
            let record = guard
                .table
                .frame(frame)
                .ok_or(VmError::OutOfMemory)?;
            let phys = record.phys().ok_or(VmError::InvalidTransition {
                from: record.state().position(),
                to: record.state().position(),
            })?;

            (
                record.state().origin(),
                record.state().is_read_only(),
                record.diverged,
                record.origin_sector,
                record.length(),
                phys,
            )
        };

        let inner = &mut **guard;
        let dirty = inner.table.is_dirty(&inner.dirs, frame);
        let target = EvictionTarget::decide(origin, read_only, dirty, diverged, origin_sector);

        let swap_slot = match target {
            EvictionTarget::Swap => match self.store.lock().alloc_swap_slot() {
                Some(slot) => Some(slot),
                None => {
                    warn!("Swap is full, can not evict frame {:?}", frame);
                    return Ok(false);
                }
            },
            _ => None,
        };

        // every sharer faults from now on
        let mapped = inner.table.mapped_sharers(&inner.dirs, frame);
        inner.table.set_pte_list(&mut inner.dirs, frame, false)?;
        inner
            .table
            .scan_and_set(&mut inner.dirs, frame, PteBit::Dirty, false)?;
        debug!("Evicting frame {:?} ({:?}, dirty: {}) to {:?}", frame, origin, dirty, target);

        let (sector, on_disk) = match (target, swap_slot) {
            (EvictionTarget::Discard(sector), _) => {
                guard.stats.discards += 1;
                (sector, true)
            }
            (EvictionTarget::WriteBack(sector), _) => {
                if let Err(err) = self.write_frame(guard, phys, sector, length) {
                    self.restore_mappings(guard, frame, &mapped, dirty);
                    return Err(err);
                }

                guard.stats.write_backs += 1;
                (sector, true)
            }
            (EvictionTarget::Swap, Some(slot)) => {
                if let Err(err) = self.write_frame(guard, phys, slot, PAGE_SIZE) {
                    self.store.lock().free_swap_slot(slot);
                    self.restore_mappings(guard, frame, &mapped, dirty);
                    return Err(err);
                }

                guard.stats.swap_outs += 1;
                (slot, false)
            }
            (EvictionTarget::Swap, None) => {
                self.restore_mappings(guard, frame, &mapped, dirty);
                return Ok(false);
            }
        };

        let inner = &mut **guard;
        let phys = inner
            .table
            .set_swap_out(&mut inner.dirs, frame, Some(sector), on_disk)?;
        if !on_disk && origin == Origin::Executable {
            // the image does not hold the content of this page anymore
            if let Some(record) = inner.table.frame_mut(frame) {
                record.diverged = true;
            }
        }

        inner.allocator.release_frame(phys);
        self.io_done.notify_all();

        Ok(true)
    }

    /// Writes the first `length` bytes of `phys` to the sectors starting at `sector`,
    /// with the bookkeeping lock released
    fn write_frame(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        phys: PhysFrame,
        sector: SectorId,
        length: usize,
    ) -> Result<(), VmError> {
        let buf = guard.allocator.frame(phys).to_vec();

        let res = MutexGuard::unlocked(guard, || {
            let mut store = self.store.lock();
            write_page(&mut *store, sector, length, &buf)
        });

        res.map_err(|()| {
            error!("Could not write {:?} to {}", phys, sector);
            VmError::Io
        })
    }

    /// Undoes the invalidation of a failed eviction for the sharers in `mapped`
    fn restore_mappings(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        frame: FrameId,
        mapped: &[PageKey],
        dirty: bool,
    ) {
        let inner = &mut **guard;
        let restored = inner
            .table
            .remap_sharers(&mut inner.dirs, frame, mapped)
            .and_then(|()| inner.table.set_dirty(&mut inner.dirs, frame, dirty));

        debug_assert!(restored.is_ok());
    }

    /// Writes the resident page of `key` back to its file if any sharer modified it
    pub(super) fn write_back_if_dirty(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        key: PageKey,
    ) -> Result<(), VmError> {
        self.wait_until_idle(guard, key)?;

        let (frame, record) = guard.table.record_of(key)?;
        if record.state().origin() != Origin::MemoryMappedFile {
            return Ok(());
        }
        let (Some(phys), Some(sector)) = (record.phys(), record.origin_sector) else {
            return Ok(());
        };
        let length = record.length();

        let inner = &mut **guard;
        if !inner.table.is_dirty(&inner.dirs, frame) {
            return Ok(());
        }

        self.with_pinned(guard, frame, |guard| {
            let inner = &mut **guard;
            inner.table.set_dirty(&mut inner.dirs, frame, false)?;

            if let Err(err) = self.write_frame(guard, phys, sector, length) {
                let inner = &mut **guard;
                inner.table.set_dirty(&mut inner.dirs, frame, true)?;
                return Err(err);
            }

            guard.stats.write_backs += 1;
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use super::EvictionTarget;
    use crate::address::SectorId;
    use crate::sup_page_table::Origin;

    #[test]
    fn test_eviction_target() {
        let sector = Some(SectorId(8));

        // read-only code is never written
        assert_eq!(
            EvictionTarget::decide(Origin::Executable, true, false, false, sector),
            EvictionTarget::Discard(SectorId(8))
        );
        // clean data of the image can be reloaded from it
        assert_eq!(
            EvictionTarget::decide(Origin::Executable, false, false, false, sector),
            EvictionTarget::Discard(SectorId(8))
        );
        assert_eq!(
            EvictionTarget::decide(Origin::Executable, false, true, false, sector),
            EvictionTarget::Swap
        );
        assert_eq!(
            EvictionTarget::decide(Origin::Executable, false, false, true, sector),
            EvictionTarget::Swap
        );
        // bss has no sector
        assert_eq!(
            EvictionTarget::decide(Origin::Executable, false, false, false, None),
            EvictionTarget::Swap
        );

        assert_eq!(
            EvictionTarget::decide(Origin::MemoryMappedFile, false, true, false, sector),
            EvictionTarget::WriteBack(SectorId(8))
        );
        assert_eq!(
            EvictionTarget::decide(Origin::MemoryMappedFile, false, false, false, sector),
            EvictionTarget::Discard(SectorId(8))
        );

        assert_eq!(
            EvictionTarget::decide(Origin::Stack, false, false, false, None),
            EvictionTarget::Swap
        );
    }
}
