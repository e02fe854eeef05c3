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

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use super::BackingStoreModule;
use crate::address::SectorId;

/// Shared handle to switch failures of a [`FaultyBackingStore`] on and off
/// after the store was handed over to a pager.
#[derive(Clone, Default)]
pub struct FaultSwitch {
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FaultSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn reads_fail(&self) -> bool {
        self.fail_reads.load(Ordering::SeqCst)
    }

    fn writes_fail(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

/// Wraps another backing store and fails its reads or writes on request
pub struct FaultyBackingStore<S: BackingStoreModule> {
    inner: S,
    switch: FaultSwitch,
}

impl<S: BackingStoreModule> FaultyBackingStore<S> {
    pub fn new(storage: S, switch: FaultSwitch) -> Self {
        Self {
            inner: storage,
            switch,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: BackingStoreModule> BackingStoreModule for FaultyBackingStore<S> {
    fn read_sector(&mut self, sector: SectorId, dest: &mut [u8]) -> Result<(), ()> {
        if self.switch.reads_fail() {
            return Err(());
        }
        self.inner.read_sector(sector, dest)
    }

    fn write_sector(&mut self, sector: SectorId, src: &[u8]) -> Result<(), ()> {
        if self.switch.writes_fail() {
            return Err(());
        }
        self.inner.write_sector(sector, src)
    }

    fn alloc_swap_slot(&mut self) -> Option<SectorId> {
        self.inner.alloc_swap_slot()
    }

    fn free_swap_slot(&mut self, slot: SectorId) {
        self.inner.free_swap_slot(slot)
    }

    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }
}

#[cfg(test)]
mod test {
    use super::{FaultSwitch, FaultyBackingStore};
    use crate::address::{SectorId, SECTOR_SIZE};
    use crate::modules::backing_store::{BackingStoreModule, MemoryBackingStore};

    #[test]
    fn test_faulty_store_switch() {
        let switch = FaultSwitch::new();
        let mut store = FaultyBackingStore::new(MemoryBackingStore::new(4, 1), switch.clone());
        let mut buffer = [7u8; SECTOR_SIZE];

        store.write_sector(SectorId(1), &buffer).unwrap();

        switch.set_fail_writes(true);
        store.write_sector(SectorId(1), &buffer).expect_err("writes should fail");
        store.read_sector(SectorId(1), &mut buffer).unwrap();

        switch.set_fail_reads(true);
        store.read_sector(SectorId(1), &mut buffer).expect_err("reads should fail");

        switch.set_fail_reads(false);
        switch.set_fail_writes(false);
        buffer.fill(0);
        store.read_sector(SectorId(1), &mut buffer).unwrap();
        assert!(buffer.iter().all(|b| *b == 7));
        assert_eq!(store.inner().write_count(), 1);
    }
}
