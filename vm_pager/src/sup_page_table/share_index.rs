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

use crate::address::{FrameId, ImageKey};

/// Finds the frame record that already holds a page of an executable image,
/// so other address spaces running the same image can attach to it.
#[derive(Default)]
pub(crate) struct ShareIndex {
    frames: HashMap<ImageKey, FrameId>,
}

impl ShareIndex {
    pub(crate) fn get(&self, image: ImageKey) -> Option<FrameId> {
        self.frames.get(&image).copied()
    }

    /// Registers `frame` for `image`, an existing registration is kept
    ///
    /// Returns `true` if `frame` is now the registered frame.
    pub(crate) fn insert(&mut self, image: ImageKey, frame: FrameId) -> bool {
        *self.frames.entry(image).or_insert(frame) == frame
    }

    /// Removes the registration of `image` if it still points to `frame`
    pub(crate) fn remove(&mut self, image: ImageKey, frame: FrameId) {
        if self.get(image) == Some(frame) {
            self.frames.remove(&image);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }
}
