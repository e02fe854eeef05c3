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

use crate::error::VmError;

/// Where the content of a frame currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    InMemory,
    InSwap,
    /// inside the executable image or the mapped file it originates from
    OnDisk,
    /// not materialized yet, first touch synthesizes zeros
    ZeroFill,
}

impl Position {
    #[inline]
    pub fn is_resident(&self) -> bool {
        *self == Position::InMemory
    }

    /// Is `self -> to` a legal transition?
    ///
    /// Once materialized, a page can never go back to zero fill.
    pub fn can_become(&self, to: Position) -> bool {
        use Position::*;

        matches!(
            (*self, to),
            (ZeroFill, InMemory)
                | (OnDisk, InMemory)
                | (InSwap, InMemory)
                | (InMemory, InSwap)
                | (InMemory, OnDisk)
        )
    }
}

/// What a frame was created for, decides where eviction writes it back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Executable,
    MemoryMappedFile,
    Stack,
}

/// State of a frame record.
///
/// All four parts can be queried independently.
/// The origin is fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    position: Position,
    origin: Origin,
    read_only: bool,
    pinned: bool,
}

impl FrameState {
    pub const fn new(position: Position, origin: Origin, read_only: bool) -> Self {
        Self {
            position,
            origin,
            read_only,
            pinned: false,
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Only unmodifiable executable content may be mapped by more than one address space
    #[inline]
    pub fn is_shareable(&self) -> bool {
        self.read_only && self.origin == Origin::Executable
    }

    pub(crate) fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    /// Moves to `to`, fails without changing anything if the transition is not allowed
    pub(crate) fn set_position(&mut self, to: Position) -> Result<(), VmError> {
        if !self.position.can_become(to) {
            return Err(VmError::InvalidTransition {
                from: self.position,
                to,
            });
        }

        self.position = to;
        Ok(())
    }
}
