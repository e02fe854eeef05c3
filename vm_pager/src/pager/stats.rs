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

/// Event counters of a [`Pager`](super::Pager)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagerStats {
    pub faults: usize,
    pub zero_fills: usize,
    pub file_loads: usize,
    pub swap_ins: usize,
    pub swap_outs: usize,
    pub write_backs: usize,
    pub discards: usize,
    pub shared_attaches: usize,
    pub evictions: usize,
}

impl fmt::Display for PagerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "faults:          {}", self.faults)?;
        writeln!(f, "zero fills:      {}", self.zero_fills)?;
        writeln!(f, "file loads:      {}", self.file_loads)?;
        writeln!(f, "swap ins:        {}", self.swap_ins)?;
        writeln!(f, "swap outs:       {}", self.swap_outs)?;
        writeln!(f, "write backs:     {}", self.write_backs)?;
        writeln!(f, "discards:        {}", self.discards)?;
        writeln!(f, "shared attaches: {}", self.shared_attaches)?;
        write!(f, "evictions:       {}", self.evictions)
    }
}
