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

use crate::address::{FrameId, PageKey};

/// Per address space handle of a page, refers to the frame record that holds its content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    key: PageKey,
    frame: FrameId,
}

impl PageEntry {
    pub(crate) fn new(key: PageKey, frame: FrameId) -> Self {
        Self { key, frame }
    }

    #[inline]
    pub fn key(&self) -> PageKey {
        self.key
    }

    #[inline]
    pub fn frame(&self) -> FrameId {
        self.frame
    }
}
