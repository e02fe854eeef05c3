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

use super::{Fault, Pager, PagerGuard};
use crate::address::{AddressSpaceId, FrameId, PageKey, PhysFrame, VirtAddr};
use crate::error::VmError;
use crate::modules::backing_store::BackingStoreModule;
use crate::modules::frame_allocator::FrameAllocatorModule;
use crate::modules::replacement::ReplacementModule;

impl<F: FrameAllocatorModule, B: BackingStoreModule, R: ReplacementModule> Pager<F, B, R> {
    /// Runs `f` with `frame` pinned and marked busy.
    ///
    /// The pin is released whatever `f` returns, waiting threads are woken up afterwards.
    pub(super) fn with_pinned<'g, T>(
        &self,
        guard: &mut PagerGuard<'g, F, R>,
        frame: FrameId,
        f: impl FnOnce(&mut PagerGuard<'g, F, R>) -> Result<T, VmError>,
    ) -> Result<T, VmError> {
        if let Some(record) = guard.table.frame_mut(frame) {
            record.pin();
            record.busy = true;
        }

        let res = f(guard);

        if let Some(record) = guard.table.frame_mut(frame) {
            record.busy = false;
            record.unpin();
        }
        self.io_done.notify_all();

        res
    }

    /// Faults the page at `addr` in and keeps it resident until the returned guard is dropped
    pub fn pin_page(
        &self,
        asid: AddressSpaceId,
        addr: VirtAddr,
        write: bool,
    ) -> Result<PinnedPage<'_, F, B, R>, VmError> {
        let fault = Fault {
            addr,
            write,
            stack_pointer: None,
        };

        let mut guard = self.inner.lock();
        let (frame, phys) = self.resolve_fault(&mut guard, asid, fault)?;
        if let Some(record) = guard.table.frame_mut(frame) {
            record.pin();
        }

        Ok(PinnedPage {
            pager: self,
            key: PageKey::containing(asid, addr),
            frame,
            phys,
        })
    }
}

/// A page that can not be evicted while this guard lives
pub struct PinnedPage<'a, F: FrameAllocatorModule, B: BackingStoreModule, R: ReplacementModule> {
    pager: &'a Pager<F, B, R>,
    key: PageKey,
    frame: FrameId,
    phys: PhysFrame,
}

impl<F: FrameAllocatorModule, B: BackingStoreModule, R: ReplacementModule> PinnedPage<'_, F, B, R> {
    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn phys(&self) -> PhysFrame {
        self.phys
    }
}

impl<F: FrameAllocatorModule, B: BackingStoreModule, R: ReplacementModule> Drop
    for PinnedPage<'_, F, B, R>
{
    fn drop(&mut self) {
        let mut inner = self.pager.inner.lock();

        // deletion of a pinned page is refused, so the record is still ours
        if let Some(record) = inner.table.frame_mut(self.frame) {
            debug_assert!(record.sharers().contains(&self.key));
            record.unpin();
        }

        self.pager.io_done.notify_all();
    }
}
