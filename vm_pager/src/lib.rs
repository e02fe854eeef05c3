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

mod address;
mod error;
mod page_directory;
mod pager;
mod sup_page_table;
mod util;
mod vm_config;

#[cfg(test)]
mod test;

pub use address::{
    AddressSpaceId, FrameId, ImageId, ImageKey, PageKey, PhysFrame, SectorId, VirtAddr, VirtPage,
    PAGE_SIZE, SECTORS_PER_PAGE, SECTOR_SIZE,
};
pub use error::VmError;
pub use page_directory::{PageDirectories, PageDirectory, PageTableEntry, PteFlags};
pub use pager::{ExecutablePage, Fault, MapId, PageInfo, Pager, PagerStats, PinnedPage};
pub use sup_page_table::{
    FrameRecord, FrameState, Origin, PageEntry, Position, PteBit, ReleasedFrame, SupPageTable,
};
pub use vm_config::VmConfig;
pub mod modules;
