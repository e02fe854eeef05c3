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

use std::collections::HashMap;

use crate::address::{AddressSpaceId, PageKey, PhysFrame, VirtPage};

const PRESENT: u8 = 1 << 0;
const WRITABLE: u8 = 1 << 1;
const ACCESSED: u8 = 1 << 2;
const DIRTY: u8 = 1 << 3;

/*
The bit usage is as follows:
|Bit|Usage|
0    Present (translation is valid, accesses don't fault)
1    Writable
2    Accessed (set by every access, cleared by the clock sweep)
3    Dirty (set by every write)
4-7  [Unused]
*/

/// Hardware flags of one page table entry
#[derive(Clone, Copy, PartialEq, Default, Debug)]
pub struct PteFlags {
    bit_list: u8,
}

macro_rules! generate_functions {
    ($bit: ident, $get_name: ident, $set_name: ident) => {
        #[inline]
        pub fn $get_name(&self) -> bool {
            self.is_set($bit)
        }

        #[inline]
        pub fn $set_name(&mut self, val: bool) {
            self.set($bit, val);
        }
    };
}

impl PteFlags {
    #[inline]
    fn is_set(&self, bitmask: u8) -> bool {
        (self.bit_list & bitmask) != 0
    }

    #[inline]
    fn set(&mut self, bitmask: u8, state: bool) {
        if state {
            // set
            self.bit_list |= bitmask;
        } else {
            // unset
            self.bit_list &= !bitmask;
        }
    }

    generate_functions!(PRESENT, is_present, set_present);
    generate_functions!(WRITABLE, is_writable, set_writable);
    generate_functions!(ACCESSED, is_accessed, set_accessed);
    generate_functions!(DIRTY, is_dirty, set_dirty);
}

/// One entry of a simulated page table
#[derive(Clone, Copy, Debug, Default)]
pub struct PageTableEntry {
    pub(crate) frame: Option<PhysFrame>,
    pub(crate) flags: PteFlags,
}

impl PageTableEntry {
    pub fn frame(&self) -> Option<PhysFrame> {
        self.frame
    }

    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    /// Installs a valid translation to `frame`, access bits start out cleared
    pub(crate) fn install(&mut self, frame: PhysFrame, writable: bool) {
        self.frame = Some(frame);
        self.flags = PteFlags::default();
        self.flags.set_present(true);
        self.flags.set_writable(writable);
    }

    /// Makes an invalidated translation valid again without touching the access history
    pub(crate) fn revalidate(&mut self, frame: PhysFrame, writable: bool) {
        self.frame = Some(frame);
        self.flags.set_present(true);
        self.flags.set_writable(writable);
    }

    /// Removes the translation, the next access faults
    pub(crate) fn invalidate(&mut self) {
        self.frame = None;
        self.flags.set_present(false);
    }

    /// Returns the frame if the translation is valid
    pub(crate) fn translate(&self) -> Option<PhysFrame> {
        if self.flags.is_present() {
            self.frame
        } else {
            None
        }
    }
}

/// Page table of one address space
#[derive(Default)]
pub struct PageDirectory {
    entries: HashMap<VirtPage, PageTableEntry>,
}

impl PageDirectory {
    pub fn entry(&self, vpage: VirtPage) -> Option<&PageTableEntry> {
        self.entries.get(&vpage)
    }

    pub(crate) fn entry_mut(&mut self, vpage: VirtPage) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(&vpage)
    }

    /// Returns the entry of `vpage`, creates an invalid one if there is none yet
    pub(crate) fn entry_or_default(&mut self, vpage: VirtPage) -> &mut PageTableEntry {
        self.entries.entry(vpage).or_default()
    }

    pub(crate) fn remove(&mut self, vpage: VirtPage) -> Option<PageTableEntry> {
        self.entries.remove(&vpage)
    }

    /// Number of entries with a valid translation
    pub fn present_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.flags.is_present())
            .count()
    }
}

/// All page directories known to the pager, one per address space
#[derive(Default)]
pub struct PageDirectories {
    spaces: HashMap<AddressSpaceId, PageDirectory>,
    next_id: u32,
}

impl PageDirectories {
    pub(crate) fn create(&mut self) -> AddressSpaceId {
        let asid = AddressSpaceId(self.next_id);
        self.next_id += 1;
        self.spaces.insert(asid, PageDirectory::default());

        asid
    }

    pub(crate) fn destroy(&mut self, asid: AddressSpaceId) -> Option<PageDirectory> {
        self.spaces.remove(&asid)
    }

    pub fn contains(&self, asid: AddressSpaceId) -> bool {
        self.spaces.contains_key(&asid)
    }

    pub fn get(&self, asid: AddressSpaceId) -> Option<&PageDirectory> {
        self.spaces.get(&asid)
    }

    pub fn pte(&self, key: PageKey) -> Option<&PageTableEntry> {
        self.spaces.get(&key.asid)?.entry(key.vpage)
    }

    pub(crate) fn pte_mut(&mut self, key: PageKey) -> Option<&mut PageTableEntry> {
        self.spaces.get_mut(&key.asid)?.entry_mut(key.vpage)
    }

    pub(crate) fn pte_or_default(&mut self, key: PageKey) -> Option<&mut PageTableEntry> {
        Some(self.spaces.get_mut(&key.asid)?.entry_or_default(key.vpage))
    }

    pub(crate) fn remove_pte(&mut self, key: PageKey) -> Option<PageTableEntry> {
        self.spaces.get_mut(&key.asid)?.remove(key.vpage)
    }
}

#[cfg(test)]
mod test {
    use super::{PageDirectories, PteFlags};
    use crate::address::{PageKey, PhysFrame, VirtPage};

    #[test]
    fn test_pte_flags_are_independent() {
        let mut flags = PteFlags::default();
        flags.set_accessed(true);
        flags.set_dirty(true);
        assert!(flags.is_accessed() && flags.is_dirty());
        assert!(!flags.is_present() && !flags.is_writable());

        flags.set_accessed(false);
        assert!(!flags.is_accessed());
        assert!(flags.is_dirty());
    }

    #[test]
    fn test_install_and_invalidate() {
        let mut dirs = PageDirectories::default();
        let asid = dirs.create();
        let key = PageKey::new(asid, VirtPage(7));

        assert!(dirs.pte(key).is_none());

        let pte = dirs.pte_or_default(key).unwrap();
        pte.install(PhysFrame(3), false);
        pte.flags.set_accessed(true);
        assert_eq!(dirs.pte(key).unwrap().translate(), Some(PhysFrame(3)));
        assert_eq!(dirs.get(asid).unwrap().present_count(), 1);

        dirs.pte_mut(key).unwrap().invalidate();
        assert_eq!(dirs.pte(key).unwrap().translate(), None);
        // access history survives invalidation
        assert!(dirs.pte(key).unwrap().flags().is_accessed());

        assert!(dirs.destroy(asid).is_some());
        assert!(dirs.pte_or_default(key).is_none());
    }
}
