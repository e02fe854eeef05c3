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

use super::{ReplacementModule, VictimCandidates};
use crate::address::FrameId;

/// Second chance replacement: frames that were accessed since the hand passed
/// them last time get their accessed bit cleared and are skipped once.
pub struct ClockReplacementModule {
    hand: usize,
}

impl ReplacementModule for ClockReplacementModule {
    fn new() -> Self {
        Self { hand: 0 }
    }

    fn select_victim<C: VictimCandidates>(&mut self, candidates: &mut C) -> Option<FrameId> {
        let slot_count = candidates.slot_count();
        if slot_count == 0 {
            return None;
        }

        if self.hand >= slot_count {
            self.hand = 0;
        }

        // every frame is visited at most twice: once to clear its accessed bit,
        // once to pick it
        for _ in 0..2 * slot_count {
            let frame = FrameId(self.hand);
            self.hand = (self.hand + 1) % slot_count;

            if candidates.is_evictable(frame) && !candidates.test_and_clear_accessed(frame) {
                return Some(frame);
            }
        }

        None
    }
}
