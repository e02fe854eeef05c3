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

use super::FrameAllocatorModule;
use crate::address::{PhysFrame, PAGE_SIZE};
use crate::util::bit_array::BitArray;

/// Fixed pool of frames that stands in for the physical user pool
pub struct PoolFrameAllocator {
    memory: Vec<u8>,

    /// stack of free frames, lowest frame on top
    free_list: Vec<PhysFrame>,

    /// set for every frame that is currently handed out
    in_use: BitArray,
}

impl PoolFrameAllocator {
    pub fn new(frames: usize) -> Self {
        Self {
            memory: vec![0; frames * PAGE_SIZE],
            free_list: (0..frames).rev().map(PhysFrame).collect(),
            in_use: BitArray::new(frames),
        }
    }

    #[inline]
    fn range(frame: PhysFrame) -> core::ops::Range<usize> {
        let start = frame.0 * PAGE_SIZE;
        start..start + PAGE_SIZE
    }
}

impl FrameAllocatorModule for PoolFrameAllocator {
    fn acquire_frame(&mut self) -> Option<PhysFrame> {
        let frame = self.free_list.pop()?;
        self.in_use.set(true, frame.0);
        self.memory[Self::range(frame)].fill(0);

        Some(frame)
    }

    fn release_frame(&mut self, frame: PhysFrame) {
        debug_assert!(self.in_use.is_set(frame.0), "double free of frame {}", frame.0);
        self.in_use.set(false, frame.0);
        self.free_list.push(frame);
    }

    fn frame(&self, frame: PhysFrame) -> &[u8] {
        debug_assert!(self.in_use.is_set(frame.0), "frame {} is not acquired", frame.0);
        &self.memory[Self::range(frame)]
    }

    fn frame_mut(&mut self, frame: PhysFrame) -> &mut [u8] {
        debug_assert!(self.in_use.is_set(frame.0), "frame {} is not acquired", frame.0);
        &mut self.memory[Self::range(frame)]
    }

    fn capacity(&self) -> usize {
        self.in_use.len()
    }

    fn free_frames(&self) -> usize {
        self.free_list.len()
    }
}
