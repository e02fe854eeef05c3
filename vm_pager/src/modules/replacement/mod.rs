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

mod clock;

pub use clock::ClockReplacementModule;

use crate::address::FrameId;

/// View onto the frame table that a [`ReplacementModule`] sweeps over
pub trait VictimCandidates {
    /// Number of slots in the frame table, valid frame ids are `[0, slot_count)`
    fn slot_count(&self) -> usize;

    /// Is `frame` resident and neither pinned nor in the middle of I/O?
    fn is_evictable(&self, frame: FrameId) -> bool;

    /// Returns whether any sharer accessed `frame` since the last call
    /// and clears the accessed bit of all sharers.
    fn test_and_clear_accessed(&mut self, frame: FrameId) -> bool;
}

/// Page replacement policy
pub trait ReplacementModule {
    fn new() -> Self;

    /// Selects the next frame to evict, returns `None` if no frame is evictable
    fn select_victim<C: VictimCandidates>(&mut self, candidates: &mut C) -> Option<FrameId>;
}
