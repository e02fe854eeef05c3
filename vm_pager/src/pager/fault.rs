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

use log::{error, trace, warn};
use parking_lot::MutexGuard;

use super::{Pager, PagerGuard};
use crate::address::{AddressSpaceId, FrameId, PageKey, PhysFrame, SectorId, VirtAddr, PAGE_SIZE};
use crate::error::VmError;
use crate::modules::backing_store::{read_page, BackingStoreModule};
use crate::modules::frame_allocator::FrameAllocatorModule;
use crate::modules::replacement::ReplacementModule;
use crate::sup_page_table::Position;

/// A page fault as reported by the trap handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// Faulting user address
    pub addr: VirtAddr,

    /// The access was a write
    pub write: bool,

    /// User stack pointer at the time of the fault, used to detect stack growth
    pub stack_pointer: Option<VirtAddr>,
}

impl Fault {
    pub fn read(addr: VirtAddr) -> Self {
        Self {
            addr,
            write: false,
            stack_pointer: None,
        }
    }

    pub fn write(addr: VirtAddr) -> Self {
        Self {
            addr,
            write: true,
            stack_pointer: None,
        }
    }
}

impl<F: FrameAllocatorModule, B: BackingStoreModule, R: ReplacementModule> Pager<F, B, R> {
    /// Resolves a page fault of `asid`.
    ///
    /// On success the page is resident, the page table entry of `asid`
    /// translates to the returned frame and the faulting access can be retried.
    pub fn handle_fault(&self, asid: AddressSpaceId, fault: Fault) -> Result<PhysFrame, VmError> {
        let mut guard = self.inner.lock();
        self.resolve_fault(&mut guard, asid, fault)
            .map(|(_, phys)| phys)
    }

    pub(super) fn resolve_fault(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        asid: AddressSpaceId,
        fault: Fault,
    ) -> Result<(FrameId, PhysFrame), VmError> {
        let key = PageKey::containing(asid, fault.addr);
        guard.stats.faults += 1;
        trace!("Fault at {}:{} (write: {})", asid, fault.addr, fault.write);

        if !guard.dirs.contains(asid) {
            return Err(VmError::UnknownAddressSpace(asid));
        }

        loop {
            let (frame, read_only, busy, phys) = match guard.table.record_of(key) {
                Ok((frame, record)) => (
                    frame,
                    record.state().is_read_only(),
                    record.busy,
                    record.phys(),
                ),
                Err(VmError::NotFound(_)) if self.is_stack_growth(&fault) => {
                    self.declare_stack_page(guard, key)?;
                    continue;
                }
                Err(err) => return Err(err),
            };

            if fault.write && read_only {
                return Err(VmError::ProtectionViolation(fault.addr));
            }

            if busy {
                // another thread loads or evicts this frame right now
                self.io_done.wait(guard);
                continue;
            }

            if let Some(phys) = phys {
                if guard.dirs.pte(key).and_then(|pte| pte.translate()) == Some(phys) {
                    return Ok((frame, phys));
                }

                // resident for another sharer
                let inner = &mut **guard;
                inner.table.set_memory_map(&mut inner.dirs, key, phys)?;
                trace!("Installed resident {:?} for {}", phys, key);
                return Ok((frame, phys));
            }

            let phys = self.page_in(guard, key, frame)?;
            return Ok((frame, phys));
        }
    }

    fn is_stack_growth(&self, fault: &Fault) -> bool {
        if !self.in_stack_window(fault.addr) {
            return false;
        }

        match fault.stack_pointer {
            Some(sp) => fault.addr.0 + self.config.stack_slack >= sp.0,
            None => true,
        }
    }

    /// Materializes the non-resident `frame` and maps it for `key`
    fn page_in(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        key: PageKey,
        frame: FrameId,
    ) -> Result<PhysFrame, VmError> {
        self.with_pinned(guard, frame, |guard| {
            let phys = self.acquire_frame(guard)?;

            let loaded = self.fill_frame(guard, key, frame, phys);
            let swap_slot = match loaded {
                Ok(swap_slot) => swap_slot,
                Err(err) => {
                    guard.allocator.release_frame(phys);
                    return Err(err);
                }
            };

            let inner = &mut **guard;
            if let Err(err) = inner.table.set_memory_map(&mut inner.dirs, key, phys) {
                inner.allocator.release_frame(phys);
                return Err(err);
            }

            if let Some(slot) = swap_slot {
                self.store.lock().free_swap_slot(slot);
            }
            trace!("Paged in {} to {:?}", key, phys);

            Ok(phys)
        })
    }

    /// Fills `phys` with the content of `frame`.
    ///
    /// Returns the swap slot that held the content, it is freed once the frame is mapped.
    fn fill_frame(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        key: PageKey,
        frame: FrameId,
        phys: PhysFrame,
    ) -> Result<Option<SectorId>, VmError> {
        let (_, record) = guard.table.record_of(key)?;
        debug_assert_eq!(guard.table.lookup(key).map(|e| e.frame()), Some(frame));

        let position = record.state().position();
        let backing_sector = record.backing_sector();
        let swap_slot = record.owned_swap_slot();
        let length = match position {
            // swap always holds whole pages
            Position::InSwap => PAGE_SIZE,
            _ => record.length(),
        };

        match position {
            Position::ZeroFill => {
                // frames are handed out zeroed
                guard.stats.zero_fills += 1;
                Ok(None)
            }
            Position::OnDisk | Position::InSwap => {
                let sector = backing_sector.ok_or(VmError::MissingBackingSector(key))?;

                let mut buf = vec![0u8; PAGE_SIZE];
                let res = MutexGuard::unlocked(guard, || {
                    let mut store = self.store.lock();
                    read_page(&mut *store, sector, length, &mut buf)
                });
                if res.is_err() {
                    error!("Could not read {} from {}", key, sector);
                    return Err(VmError::Io);
                }

                guard.allocator.frame_mut(phys).copy_from_slice(&buf);
                if position == Position::InSwap {
                    guard.stats.swap_ins += 1;
                } else {
                    guard.stats.file_loads += 1;
                }

                Ok(swap_slot)
            }
            Position::InMemory => Err(VmError::InvalidTransition {
                from: Position::InMemory,
                to: Position::InMemory,
            }),
        }
    }

    /// Acquires a free frame, evicting one if there is none.
    ///
    /// If no resident frame can be evicted, because it is pinned or the swap
    /// area is full, waits once for that to change before giving up with
    /// [`VmError::OutOfMemory`].
    pub(super) fn acquire_frame(&self, guard: &mut PagerGuard<'_, F, R>) -> Result<PhysFrame, VmError> {
        if let Some(phys) = guard.allocator.acquire_frame() {
            return Ok(phys);
        }
        if let Some(phys) = self.evict_for_allocation(guard)? {
            return Ok(phys);
        }

        warn!(
            "No evictable frame, waiting {:?} before retrying",
            self.config.oom_retry_wait
        );
        self.io_done.wait_for(guard, self.config.oom_retry_wait);

        if let Some(phys) = guard.allocator.acquire_frame() {
            return Ok(phys);
        }
        if let Some(phys) = self.evict_for_allocation(guard)? {
            return Ok(phys);
        }

        warn!("Out of memory: no resident frame can be evicted");
        Err(VmError::OutOfMemory)
    }

    /// Copies `buf.len()` bytes at `addr` of `asid` into `buf`, faulting pages in as needed
    pub fn read_user(&self, asid: AddressSpaceId, addr: VirtAddr, buf: &mut [u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < buf.len() {
            let cur = addr.offset(done);
            let offset = cur.page_offset();
            let chunk = (PAGE_SIZE - offset).min(buf.len() - done);

            let mut guard = self.inner.lock();
            let phys = self.access(&mut guard, asid, Fault::read(cur))?;
            buf[done..done + chunk].copy_from_slice(&guard.allocator.frame(phys)[offset..offset + chunk]);

            done += chunk;
        }

        Ok(())
    }

    /// Copies `data` to `addr` of `asid`, faulting pages in as needed
    pub fn write_user(&self, asid: AddressSpaceId, addr: VirtAddr, data: &[u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < data.len() {
            let cur = addr.offset(done);
            let offset = cur.page_offset();
            let chunk = (PAGE_SIZE - offset).min(data.len() - done);

            let mut guard = self.inner.lock();
            let phys = self.access(&mut guard, asid, Fault::write(cur))?;
            guard.allocator.frame_mut(phys)[offset..offset + chunk]
                .copy_from_slice(&data[done..done + chunk]);

            done += chunk;
        }

        Ok(())
    }

    /// Translates `fault.addr` like the MMU would: sets the accessed (and dirty)
    /// bit of a valid translation, or resolves a fault if there is none.
    fn access(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        asid: AddressSpaceId,
        fault: Fault,
    ) -> Result<PhysFrame, VmError> {
        let key = PageKey::containing(asid, fault.addr);

        let translated = match guard.dirs.pte(key) {
            Some(pte) => match pte.translate() {
                Some(_) if fault.write && !pte.flags().is_writable() => {
                    return Err(VmError::ProtectionViolation(fault.addr));
                }
                phys => phys,
            },
            None => None,
        };

        let phys = match translated {
            Some(phys) => phys,
            None => self.resolve_fault(guard, asid, fault)?.1,
        };

        if let Some(pte) = guard.dirs.pte_mut(key) {
            pte.flags.set_accessed(true);
            if fault.write {
                pte.flags.set_dirty(true);
            }
        }

        Ok(phys)
    }
}
