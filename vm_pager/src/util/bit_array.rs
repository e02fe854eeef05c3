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

use super::div_ceil;

pub(crate) struct BitArray {
    arr: Vec<u8>,
    bits: usize,
}

impl BitArray {
    /// Creates a new bit array with `bits` bits, all unset
    pub(crate) fn new(bits: usize) -> Self {
        BitArray {
            arr: vec![0; div_ceil(bits, 8)],
            bits,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bits
    }

    pub(crate) fn set(&mut self, value: bool, index: usize) {
        debug_assert!(index < self.bits, "index {} out of bounds", index);
        let arr_index = index / 8;
        let internal_index = index % 8;

        let item = &mut self.arr[arr_index];
        if value {
            // set bit
            *item |= 1u8 << internal_index;
        } else {
            // unset bit
            *item &= !(1u8 << internal_index);
        }
    }

    pub(crate) fn is_set(&self, index: usize) -> bool {
        let arr_index = index / 8;
        let internal_index = index % 8;

        let item = self.arr[arr_index];
        (item & (1u8 << internal_index)) != 0
    }

    /// Returns the index of the first unset bit
    pub(crate) fn first_unset(&self) -> Option<usize> {
        for (arr_index, item) in self.arr.iter().enumerate() {
            if *item == u8::MAX {
                continue;
            }

            let index = arr_index * 8 + item.trailing_ones() as usize;
            if index < self.bits {
                return Some(index);
            }
        }

        None
    }

    pub(crate) fn count_set(&self) -> usize {
        self.arr.iter().map(|item| item.count_ones() as usize).sum()
    }
}
