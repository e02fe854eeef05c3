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

use super::frame_record::FrameRecord;
use crate::address::PageKey;
use crate::page_directory::{PageDirectories, PageTableEntry};

/// Page table entry bits that are kept in sync across all sharers of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PteBit {
    Accessed,
    Dirty,
    Present,
}

fn get_bit(pte: &PageTableEntry, bit: PteBit) -> bool {
    match bit {
        PteBit::Accessed => pte.flags.is_accessed(),
        PteBit::Dirty => pte.flags.is_dirty(),
        PteBit::Present => pte.flags.is_present(),
    }
}

/// Sets `bit` of every sharer's entry to `value` and returns whether it was set for any of them.
///
/// Setting [`PteBit::Present`] installs the translation to the frame's physical
/// frame (only possible while the frame is resident), clearing it invalidates
/// the translation.
pub(crate) fn scan_and_set(
    record: &FrameRecord,
    dirs: &mut PageDirectories,
    bit: PteBit,
    value: bool,
) -> bool {
    let writable = !record.state.is_read_only();
    let mut was_set = false;

    for key in record.sharers.iter() {
        let pte = match bit {
            PteBit::Present if value => dirs.pte_or_default(*key),
            _ => dirs.pte_mut(*key),
        };
        let Some(pte) = pte else {
            continue;
        };

        was_set |= get_bit(pte, bit);

        match bit {
            PteBit::Accessed => pte.flags.set_accessed(value),
            PteBit::Dirty => pte.flags.set_dirty(value),
            PteBit::Present => match (value, record.phys) {
                (true, Some(phys)) => pte.revalidate(phys, writable),
                (true, None) => debug_assert!(false, "frame is not resident"),
                (false, _) => pte.invalidate(),
            },
        }
    }

    was_set
}

/// Returns whether `bit` is set in the entry of any sharer, without changing anything
pub(crate) fn any_set(record: &FrameRecord, dirs: &PageDirectories, bit: PteBit) -> bool {
    record
        .sharers
        .iter()
        .filter_map(|key| dirs.pte(*key))
        .any(|pte| get_bit(pte, bit))
}

/// Sharers whose translation is valid right now
pub(crate) fn present_sharers(record: &FrameRecord, dirs: &PageDirectories) -> Vec<PageKey> {
    record
        .sharers
        .iter()
        .filter(|key| dirs.pte(**key).is_some_and(|pte| pte.flags.is_present()))
        .copied()
        .collect()
}

/// Makes the translation of those `keys` that are sharers of the resident `record` valid again
pub(crate) fn revalidate(record: &FrameRecord, dirs: &mut PageDirectories, keys: &[PageKey]) {
    let Some(phys) = record.phys else {
        debug_assert!(false, "frame is not resident");
        return;
    };
    let writable = !record.state.is_read_only();

    for key in keys.iter().filter(|key| record.sharers.contains(key)) {
        if let Some(pte) = dirs.pte_mut(*key) {
            pte.revalidate(phys, writable);
        }
    }
}

/// Makes the translation of every sharer valid (`present == true`) or invalid
pub(crate) fn set_pte_list(record: &FrameRecord, dirs: &mut PageDirectories, present: bool) {
    scan_and_set(record, dirs, PteBit::Present, present);
}

#[cfg(test)]
mod test {
    use super::{any_set, scan_and_set, set_pte_list, PteBit};
    use crate::address::{PageKey, PhysFrame, VirtPage, PAGE_SIZE};
    use crate::page_directory::PageDirectories;
    use crate::sup_page_table::frame_record::FrameRecord;
    use crate::sup_page_table::{FrameState, Origin, Position};

    fn shared_record(dirs: &mut PageDirectories, spaces: usize) -> FrameRecord {
        let keys: Vec<PageKey> = (0..spaces)
            .map(|_| PageKey::new(dirs.create(), VirtPage(16)))
            .collect();

        let mut record = FrameRecord::new(
            keys[0],
            PAGE_SIZE,
            FrameState::new(Position::InMemory, Origin::Executable, true),
            None,
        );
        record.sharers = keys;
        record.phys = Some(PhysFrame(2));
        record
    }

    #[test]
    fn test_present_reaches_every_sharer() {
        let mut dirs = PageDirectories::default();
        let record = shared_record(&mut dirs, 3);

        set_pte_list(&record, &mut dirs, true);
        for key in record.sharers() {
            let pte = dirs.pte(*key).unwrap();
            assert_eq!(pte.translate(), Some(PhysFrame(2)));
            assert!(!pte.flags().is_writable());
        }

        set_pte_list(&record, &mut dirs, false);
        assert!(!any_set(&record, &dirs, PteBit::Present));
    }

    #[test]
    fn test_scan_and_clear_accessed() {
        let mut dirs = PageDirectories::default();
        let record = shared_record(&mut dirs, 3);
        set_pte_list(&record, &mut dirs, true);

        assert!(!scan_and_set(&record, &mut dirs, PteBit::Accessed, false));

        // one sharer touched the page
        dirs.pte_mut(record.sharers()[1])
            .unwrap()
            .flags
            .set_accessed(true);
        assert!(any_set(&record, &dirs, PteBit::Accessed));
        assert!(scan_and_set(&record, &mut dirs, PteBit::Accessed, false));
        assert!(!any_set(&record, &dirs, PteBit::Accessed));
    }

    #[test]
    fn test_invalidation_keeps_dirty_history() {
        let mut dirs = PageDirectories::default();
        let record = shared_record(&mut dirs, 2);
        set_pte_list(&record, &mut dirs, true);
        dirs.pte_mut(record.sharers()[0]).unwrap().flags.set_dirty(true);

        set_pte_list(&record, &mut dirs, false);
        assert!(any_set(&record, &dirs, PteBit::Dirty));

        set_pte_list(&record, &mut dirs, true);
        assert!(any_set(&record, &dirs, PteBit::Dirty));
    }
}
