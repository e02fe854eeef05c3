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

use thiserror::Error;

use crate::address::{AddressSpaceId, PageKey, VirtAddr};
use crate::pager::MapId;
use crate::sup_page_table::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmError {
    /// `add`/`shared_add` on a key that is already registered
    #[error("page {0} is already registered")]
    DuplicateKey(PageKey),

    /// no page is registered for this key (a segmentation violation when raised by a fault)
    #[error("no page registered for {0}")]
    NotFound(PageKey),

    /// the target frame can not be shared (not read-only executable, or pinned)
    #[error("frame is not eligible for sharing")]
    IneligibleForSharing,

    /// the backing store failed to read or write a sector
    #[error("backing store i/o error")]
    Io,

    /// no frame could be evicted (every resident frame is pinned) or swap is full
    #[error("out of memory: no evictable frame")]
    OutOfMemory,

    #[error("invalid frame transition from {from:?} to {to:?}")]
    InvalidTransition { from: Position, to: Position },

    /// write access to a read-only page
    #[error("write to read-only page at {0}")]
    ProtectionViolation(VirtAddr),

    /// a page that lives on disk or in swap was declared without a sector
    #[error("page {0} has no backing sector")]
    MissingBackingSector(PageKey),

    /// the page is pinned and can not be evicted or removed right now
    #[error("page {0} is pinned")]
    Pinned(PageKey),

    #[error("unknown memory mapping {0:?}")]
    UnknownMapping(MapId),

    #[error("unknown address space {0}")]
    UnknownAddressSpace(AddressSpaceId),

    #[error("address {0} is not page aligned")]
    Misaligned(VirtAddr),
}
