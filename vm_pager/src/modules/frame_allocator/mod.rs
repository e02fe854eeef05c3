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

mod pool;

pub use pool::PoolFrameAllocator;

use crate::address::PhysFrame;

/// Raw physical frame allocator.
///
/// Frames are [`PAGE_SIZE`](crate::address::PAGE_SIZE) bytes big and are handed out zeroed.
pub trait FrameAllocatorModule {
    /// Acquires a zeroed frame, returns `None` if no free frame is left
    fn acquire_frame(&mut self) -> Option<PhysFrame>;

    /// Returns `frame` to this allocator
    fn release_frame(&mut self, frame: PhysFrame);

    /// Contents of an acquired frame
    fn frame(&self, frame: PhysFrame) -> &[u8];

    /// Mutable contents of an acquired frame
    fn frame_mut(&mut self, frame: PhysFrame) -> &mut [u8];

    /// Total number of frames managed by this allocator
    fn capacity(&self) -> usize;

    /// Number of frames that can be acquired right now
    fn free_frames(&self) -> usize;
}
