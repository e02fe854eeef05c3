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

mod eviction;
mod fault;
mod pin;
mod stats;

pub use fault::Fault;
pub use pin::PinnedPage;
pub use stats::PagerStats;

use std::collections::HashMap;

use log::{debug, info};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::address::{
    AddressSpaceId, FrameId, ImageKey, PageKey, PhysFrame, SectorId, VirtAddr, VirtPage,
    PAGE_SIZE, SECTORS_PER_PAGE,
};
use crate::error::VmError;
use crate::modules::backing_store::BackingStoreModule;
use crate::modules::frame_allocator::FrameAllocatorModule;
use crate::modules::replacement::{ClockReplacementModule, ReplacementModule};
use crate::page_directory::{PageDirectories, PageTableEntry};
use crate::sup_page_table::{FrameState, Origin, Position, ReleasedFrame, SupPageTable};
use crate::util::div_ceil;
use crate::VmConfig;

/// Handle of one memory mapped file region, returned by [`Pager::map_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(u32);

/// One page of an executable image that is declared with [`Pager::load_executable_page`]
#[derive(Debug, Clone, Copy)]
pub struct ExecutablePage {
    /// Image and page index inside the image, used to find a frame to share
    pub image: ImageKey,

    /// First sector of the page inside the image
    pub sector: SectorId,

    /// Bytes to read from the image, `0` declares a zero filled (bss) page
    pub length: usize,

    pub read_only: bool,
}

/// Snapshot of the state of one registered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub frame: FrameId,
    pub state: FrameState,
    pub phys: Option<PhysFrame>,
    pub backing_sector: Option<SectorId>,
    pub length: usize,
    pub mapped_address: Option<VirtAddr>,
    pub sharers: Vec<PageKey>,
}

#[derive(Clone, Copy)]
struct MmapRegion {
    asid: AddressSpaceId,
    first: VirtPage,
    pages: usize,
}

struct PagerInner<F: FrameAllocatorModule, R: ReplacementModule> {
    table: SupPageTable,
    dirs: PageDirectories,
    allocator: F,
    replacement: R,
    stats: PagerStats,
    mappings: HashMap<MapId, MmapRegion>,
    next_map: u32,
}

type PagerGuard<'a, F, R> = MutexGuard<'a, PagerInner<F, R>>;

/// Demand paging for many address spaces on top of one frame pool and one backing store.
///
/// All bookkeeping (supplemental page table, frame table, page directories, frame pool)
/// is guarded by one lock. Backing store I/O runs with this lock released while the
/// frame that is read or written is pinned and marked busy.
///
/// Lock order: the bookkeeping lock is always taken before the backing store lock.
pub struct Pager<
    F: FrameAllocatorModule,
    B: BackingStoreModule,
    R: ReplacementModule = ClockReplacementModule,
> {
    inner: Mutex<PagerInner<F, R>>,
    store: Mutex<B>,

    /// Notified whenever a frame stops being busy or pinned, or a frame is released
    io_done: Condvar,

    config: VmConfig,
}

impl<F: FrameAllocatorModule, B: BackingStoreModule, R: ReplacementModule> Pager<F, B, R> {
    pub fn new(allocator: F, store: B, config: VmConfig) -> Self {
        info!(
            "Creating pager with {} frames and {} sectors",
            allocator.capacity(),
            store.sector_count()
        );

        Self {
            inner: Mutex::new(PagerInner {
                table: SupPageTable::new(),
                dirs: PageDirectories::default(),
                allocator,
                replacement: R::new(),
                stats: PagerStats::default(),
                mappings: HashMap::new(),
                next_map: 0,
            }),
            store: Mutex::new(store),
            io_done: Condvar::new(),
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Locks and returns the backing store.
    ///
    /// Do not call any other method of this pager while holding the guard.
    pub fn backing_store(&self) -> MutexGuard<'_, B> {
        self.store.lock()
    }

    pub fn stats(&self) -> PagerStats {
        self.inner.lock().stats
    }

    /// Number of frames that hold page content right now
    pub fn resident_frames(&self) -> usize {
        self.inner.lock().table.resident_frames()
    }

    /// Number of frames the frame allocator can hand out without evicting
    pub fn free_frames(&self) -> usize {
        self.inner.lock().allocator.free_frames()
    }

    pub fn create_address_space(&self) -> AddressSpaceId {
        let asid = self.inner.lock().dirs.create();
        debug!("Created address space {}", asid);

        asid
    }

    /// Removes every page of `asid` and its page directory.
    ///
    /// Dirty pages of memory mapped files are written back first. Fails with
    /// [`VmError::Pinned`] without removing anything while a page of `asid` is pinned.
    pub fn destroy_address_space(&self, asid: AddressSpaceId) -> Result<(), VmError> {
        let regions: Vec<MapId> = {
            let mut inner = self.inner.lock();
            if !inner.dirs.contains(asid) {
                return Err(VmError::UnknownAddressSpace(asid));
            }
            let keys = inner.table.keys_of(asid);
            self.ensure_unpinned(&mut inner, &keys)?;

            inner
                .mappings
                .iter()
                .filter(|(_, region)| region.asid == asid)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in regions {
            self.unmap_file(id)?;
        }

        let mut guard = self.inner.lock();
        let keys = guard.table.keys_of(asid);
        for key in keys {
            match self.delete_page(&mut guard, key) {
                Ok(()) | Err(VmError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        guard.dirs.destroy(asid);
        debug!("Destroyed address space {}", asid);

        #[cfg(debug_assertions)]
        guard.table.check_integrity();

        Ok(())
    }

    /// Registers a lazy page, see [`SupPageTable::add`]
    pub fn add(
        &self,
        key: PageKey,
        length: usize,
        state: FrameState,
        backing_sector: Option<SectorId>,
    ) -> Result<FrameId, VmError> {
        let mut inner = self.inner.lock();
        if !inner.dirs.contains(key.asid) {
            return Err(VmError::UnknownAddressSpace(key.asid));
        }

        inner.table.add(key, length, state, backing_sector)
    }

    /// Declares one page of an executable image at `vpage` of `asid`.
    ///
    /// Read-only pages attach to the frame of another address space that loaded
    /// the same image page, if there is one that can be shared. Returns `true`
    /// in that case and `false` if a new frame record was created.
    pub fn load_executable_page(
        &self,
        asid: AddressSpaceId,
        vpage: VirtPage,
        page: ExecutablePage,
    ) -> Result<bool, VmError> {
        let key = PageKey::new(asid, vpage);
        let mut inner = self.inner.lock();
        if !inner.dirs.contains(asid) {
            return Err(VmError::UnknownAddressSpace(asid));
        }

        if page.length == 0 {
            let state = FrameState::new(Position::ZeroFill, Origin::Executable, page.read_only);
            inner.table.add(key, PAGE_SIZE, state, None)?;
            debug!("Declared zero filled executable page {}", key);
            return Ok(false);
        }

        if page.read_only {
            if let Some(frame) = inner.table.shareable_frame(page.image) {
                match inner.table.shared_add(key, frame) {
                    Ok(()) => {
                        inner.stats.shared_attaches += 1;
                        debug!("Declared {} as sharer of frame {:?}", key, frame);
                        return Ok(true);
                    }
                    // fall back to an exclusive frame
                    Err(VmError::IneligibleForSharing) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        let state = FrameState::new(Position::OnDisk, Origin::Executable, page.read_only);
        let frame = inner.table.add(key, page.length, state, Some(page.sector))?;
        if page.read_only {
            inner.table.register_shareable(frame, page.image)?;
        }
        debug!("Declared executable page {} at {}", key, page.sector);

        Ok(false)
    }

    /// Maps `length` bytes of a file, starting at `first_sector`, to `addr`.
    ///
    /// The file content is loaded on demand. Pages are writable, modified pages
    /// are written back to the file on eviction and on [`Pager::unmap_file`].
    pub fn map_file(
        &self,
        asid: AddressSpaceId,
        addr: VirtAddr,
        first_sector: SectorId,
        length: usize,
    ) -> Result<MapId, VmError> {
        if !addr.is_page_aligned() {
            return Err(VmError::Misaligned(addr));
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.dirs.contains(asid) {
            return Err(VmError::UnknownAddressSpace(asid));
        }

        let pages = div_ceil(length, PAGE_SIZE);
        let keys: Vec<PageKey> = (0..pages)
            .map(|i| PageKey::new(asid, VirtPage(addr.page().0 + i)))
            .collect();

        // the region must not overlap any declared page
        if let Some(key) = keys.iter().find(|key| inner.table.lookup(**key).is_some()) {
            return Err(VmError::DuplicateKey(*key));
        }

        let state = FrameState::new(Position::OnDisk, Origin::MemoryMappedFile, false);
        for (i, key) in keys.iter().enumerate() {
            let page_length = (length - i * PAGE_SIZE).min(PAGE_SIZE);
            let sector = first_sector.offset(i * SECTORS_PER_PAGE);
            inner.table.add(*key, page_length, state, Some(sector))?;
        }

        let id = MapId(inner.next_map);
        inner.next_map += 1;
        inner.mappings.insert(
            id,
            MmapRegion {
                asid,
                first: addr.page(),
                pages,
            },
        );
        debug!(
            "Mapped {} bytes at {} to {}:{} as {:?}",
            length, first_sector, asid, addr, id
        );

        Ok(id)
    }

    /// Removes a memory mapped region, modified pages are written back to the file.
    ///
    /// Fails with [`VmError::Pinned`] and keeps the region while one of its pages is pinned.
    pub fn unmap_file(&self, id: MapId) -> Result<(), VmError> {
        let mut guard = self.inner.lock();
        let region = *guard
            .mappings
            .get(&id)
            .ok_or(VmError::UnknownMapping(id))?;

        let keys: Vec<PageKey> = (0..region.pages)
            .map(|i| PageKey::new(region.asid, VirtPage(region.first.0 + i)))
            .collect();
        self.ensure_unpinned(&mut guard, &keys)?;

        // another thread may have unmapped the region while we waited
        if guard.mappings.remove(&id).is_none() {
            return Err(VmError::UnknownMapping(id));
        }

        let mut result = Ok(());
        for key in keys {
            // the page goes away in any case, a failed write back is reported afterwards
            if let Err(err) = self.write_back_if_dirty(&mut guard, key) {
                result = result.and(Err(err));
            }

            match self.delete_page(&mut guard, key) {
                Ok(()) | Err(VmError::NotFound(_)) => {}
                Err(err) => result = result.and(Err(err)),
            }
        }

        debug!("Unmapped {:?}", id);
        result
    }

    /// Declares a zero filled stack page that contains `addr`
    pub fn grow_stack(&self, asid: AddressSpaceId, addr: VirtAddr) -> Result<(), VmError> {
        let mut guard = self.inner.lock();
        if !guard.dirs.contains(asid) {
            return Err(VmError::UnknownAddressSpace(asid));
        }
        if !self.in_stack_window(addr) {
            return Err(VmError::NotFound(PageKey::containing(asid, addr)));
        }

        self.declare_stack_page(&mut guard, PageKey::containing(asid, addr))
    }

    fn declare_stack_page(
        &self,
        guard: &mut PagerGuard<'_, F, R>,
        key: PageKey,
    ) -> Result<(), VmError> {
        let state = FrameState::new(Position::ZeroFill, Origin::Stack, false);
        guard.table.add(key, PAGE_SIZE, state, None)?;
        debug!("Stack of {} grew to {}", key.asid, key.vpage.base());

        Ok(())
    }

    fn in_stack_window(&self, addr: VirtAddr) -> bool {
        let top = self.config.stack_top.0;
        let bottom = top.saturating_sub(self.config.max_stack_pages * PAGE_SIZE);

        (bottom..top).contains(&addr.0)
    }

    /// Removes the page of `key`, see [`SupPageTable::find_and_delete`]
    ///
    /// Waits for a running page in or write back of that page to finish.
    /// A page whose frame is pinned is not removed, see [`VmError::Pinned`].
    pub fn find_and_delete(&self, key: PageKey) -> Result<(), VmError> {
        let mut guard = self.inner.lock();
        self.delete_page(&mut guard, key)
    }

    fn delete_page(&self, guard: &mut PagerGuard<'_, F, R>, key: PageKey) -> Result<(), VmError> {
        self.wait_until_idle(guard, key)?;

        // a pin guard may still hand out the physical frame
        let (_, record) = guard.table.record_of(key)?;
        if record.state().is_pinned() {
            return Err(VmError::Pinned(key));
        }

        let inner = &mut **guard;
        let released = inner.table.find_and_delete(&mut inner.dirs, key)?;
        self.release(inner, released);

        Ok(())
    }

    /// Gives the resources of a dropped frame record back
    fn release(&self, inner: &mut PagerInner<F, R>, released: ReleasedFrame) {
        if let Some(phys) = released.phys {
            inner.allocator.release_frame(phys);
            self.io_done.notify_all();
        }
        if let Some(slot) = released.swap_slot {
            self.store.lock().free_swap_slot(slot);
        }
    }

    /// Fails with [`VmError::Pinned`] if the frame of one of `keys` is pinned,
    /// keys that are not registered are skipped
    fn ensure_unpinned(&self, guard: &mut PagerGuard<'_, F, R>, keys: &[PageKey]) -> Result<(), VmError> {
        for key in keys.iter().copied() {
            match self.wait_until_idle(guard, key) {
                Ok(()) => {}
                Err(VmError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }

            let (_, record) = guard.table.record_of(key)?;
            if record.state().is_pinned() {
                return Err(VmError::Pinned(key));
            }
        }

        Ok(())
    }

    /// Blocks while the frame of `key` has I/O in flight
    fn wait_until_idle(&self, guard: &mut PagerGuard<'_, F, R>, key: PageKey) -> Result<(), VmError> {
        loop {
            let (_, record) = guard.table.record_of(key)?;
            if !record.busy {
                return Ok(());
            }

            self.io_done.wait(guard);
        }
    }

    /// Returns a snapshot of the page registered for `key`
    pub fn page_info(&self, key: PageKey) -> Option<PageInfo> {
        let inner = self.inner.lock();
        let (frame, record) = inner.table.record_of(key).ok()?;

        Some(PageInfo {
            frame,
            state: record.state(),
            phys: record.phys(),
            backing_sector: record.backing_sector(),
            length: record.length(),
            mapped_address: record.mapped_address(),
            sharers: record.sharers().to_vec(),
        })
    }

    /// Returns a copy of the page table entry of `key`
    pub fn pte(&self, key: PageKey) -> Option<PageTableEntry> {
        self.inner.lock().dirs.pte(key).copied()
    }

    /// All registered pages of `asid`, in ascending order
    pub fn pages_of(&self, asid: AddressSpaceId) -> Vec<PageKey> {
        self.inner.lock().table.keys_of(asid)
    }

    /// Checks if the bookkeeping is consistent
    ///
    /// Panics if that is not the case.
    #[cfg(debug_assertions)]
    pub fn check_integrity(&self) {
        let inner = self.inner.lock();
        inner.table.check_integrity();

        let resident = inner.table.resident_frames();
        assert_eq!(
            resident + inner.allocator.free_frames(),
            inner.allocator.capacity(),
            "frames leaked"
        );
    }
}
