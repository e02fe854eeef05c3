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

use core::time::Duration;

use crate::address::VirtAddr;

pub struct VmConfig {
    /// How long to wait for a pinned frame to become evictable
    /// before an allocation fails with out of memory
    pub oom_retry_wait: Duration,

    /// One past the highest stack address of every address space
    pub stack_top: VirtAddr,

    /// Maximum number of pages the stack may grow to
    pub max_stack_pages: usize,

    /// How many bytes below the stack pointer a fault still counts as stack growth
    /// (`push` style instructions fault before the stack pointer is updated)
    pub stack_slack: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            oom_retry_wait: Duration::from_millis(10),
            stack_top: VirtAddr(0xc000_0000),
            max_stack_pages: 2048,
            stack_slack: 32,
        }
    }
}
