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

use core::fmt;

use static_assertions::const_assert;

/// Size of one virtual page and one physical frame in bytes
pub const PAGE_SIZE: usize = 4096;

/// Size of one sector of the backing store in bytes
pub const SECTOR_SIZE: usize = 512;

/// How many consecutive sectors hold one page
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

const_assert!(PAGE_SIZE % SECTOR_SIZE == 0);
const_assert!(PAGE_SIZE.is_power_of_two());

/// Identifies one address space (one process) inside the pager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressSpaceId(pub(crate) u32);

impl AddressSpaceId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AddressSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as{}", self.0)
    }
}

/// A user virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
    #[inline]
    pub fn page(&self) -> VirtPage {
        VirtPage(self.0 / PAGE_SIZE)
    }

    #[inline]
    pub fn page_offset(&self) -> usize {
        self.0 % PAGE_SIZE
    }

    #[inline]
    pub fn is_page_aligned(&self) -> bool {
        self.page_offset() == 0
    }

    #[inline]
    pub fn offset(&self, bytes: usize) -> VirtAddr {
        VirtAddr(self.0 + bytes)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A virtual page number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtPage(pub usize);

impl VirtPage {
    /// First address of this page
    #[inline]
    pub fn base(&self) -> VirtAddr {
        VirtAddr(self.0 * PAGE_SIZE)
    }

    #[inline]
    pub fn next(&self) -> VirtPage {
        VirtPage(self.0 + 1)
    }
}

/// Registry key of one page: unique across all address spaces that share one registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub asid: AddressSpaceId,
    pub vpage: VirtPage,
}

impl PageKey {
    pub fn new(asid: AddressSpaceId, vpage: VirtPage) -> Self {
        Self { asid, vpage }
    }

    /// Key of the page that contains `addr`
    pub fn containing(asid: AddressSpaceId, addr: VirtAddr) -> Self {
        Self::new(asid, addr.page())
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asid, self.vpage.base())
    }
}

/// Index of one sector on the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectorId(pub u32);

impl SectorId {
    #[inline]
    pub fn offset(&self, sectors: usize) -> SectorId {
        SectorId(self.0 + sectors as u32)
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sector {}", self.0)
    }
}

/// Handle of one physical frame handed out by a [`FrameAllocatorModule`](crate::modules::frame_allocator::FrameAllocatorModule)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysFrame(pub(crate) usize);

impl PhysFrame {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Index of a frame record inside the frame table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub(crate) usize);

/// Identity of an executable image (e.g. the inode of the binary)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u32);

/// Key of the share index: one page of one executable image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    pub image: ImageId,
    pub page: usize,
}
