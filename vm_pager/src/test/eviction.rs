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

use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::{fill_file, get_test_pager};
use crate::{
    ExecutablePage, Fault, FrameState, ImageId, ImageKey, Origin, PageKey, Position, SectorId,
    VirtAddr, VirtPage, VmError, PAGE_SIZE, SECTORS_PER_PAGE,
};

const STACK: FrameState = FrameState::new(Position::ZeroFill, Origin::Stack, false);

fn stack_page(i: usize) -> VirtPage {
    VirtPage(0x1000 + i)
}

#[test]
fn test_swap_round_trip() {
    let pager = get_test_pager(2, 0, 8);
    let asid = pager.create_address_space();
    let mut rng = SmallRng::seed_from_u64(42);

    let mut pages = vec![];
    for i in 0..5 {
        pager
            .add(PageKey::new(asid, stack_page(i)), PAGE_SIZE, STACK, None)
            .unwrap();

        let mut content = vec![0u8; PAGE_SIZE];
        rng.fill(&mut content[..]);
        pager.write_user(asid, stack_page(i).base(), &content).unwrap();
        pages.push(content);
    }

    // only two pages fit into memory
    assert_eq!(pager.resident_frames(), 2);
    assert!(pager.stats().swap_outs >= 3);
    assert_eq!(pager.backing_store().swap_slots_in_use(), 3);

    for (i, content) in pages.iter().enumerate() {
        let mut back = vec![0u8; PAGE_SIZE];
        pager.read_user(asid, stack_page(i).base(), &mut back).unwrap();
        assert_eq!(&back, content, "page {} changed after swap", i);
    }

    assert!(pager.stats().swap_ins >= 3);
    // swap slots are given back on swap in, three pages are out again
    assert_eq!(pager.backing_store().swap_slots_in_use(), 3);
    pager.check_integrity();
}

#[test]
fn test_swapped_page_state() {
    let pager = get_test_pager(1, 0, 2);
    let asid = pager.create_address_space();
    let first = PageKey::new(asid, stack_page(0));
    let second = PageKey::new(asid, stack_page(1));
    pager.add(first, PAGE_SIZE, STACK, None).unwrap();
    pager.add(second, PAGE_SIZE, STACK, None).unwrap();

    pager.write_user(asid, first.vpage.base(), &[7; 32]).unwrap();
    pager.write_user(asid, second.vpage.base(), &[9; 32]).unwrap();

    let info = pager.page_info(first).unwrap();
    assert_eq!(info.state.position(), Position::InSwap);
    assert_eq!(info.phys, None);
    assert_eq!(info.mapped_address, None);
    assert!(info.backing_sector.is_some());
    assert_eq!(pager.pte(first).unwrap().translate(), None);

    // the swap slot is freed and the backing sector dropped on swap in
    pager.evict_page(second).unwrap();
    pager.handle_fault(asid, Fault::read(first.vpage.base())).unwrap();
    let info = pager.page_info(first).unwrap();
    assert_eq!(info.state.position(), Position::InMemory);
    assert_eq!(info.backing_sector, None);
    assert_eq!(pager.backing_store().swap_slots_in_use(), 1);
}

#[test]
fn test_pinned_frames_are_never_evicted() {
    let pager = get_test_pager(2, 0, 8);
    let asid = pager.create_address_space();
    for i in 0..3 {
        pager
            .add(PageKey::new(asid, stack_page(i)), PAGE_SIZE, STACK, None)
            .unwrap();
    }

    let pin_a = pager.pin_page(asid, stack_page(0).base(), true).unwrap();
    let pin_b = pager.pin_page(asid, stack_page(1).base(), false).unwrap();
    assert_eq!(pin_a.key(), PageKey::new(asid, stack_page(0)));

    assert_eq!(
        pager.handle_fault(asid, Fault::read(stack_page(2).base())),
        Err(VmError::OutOfMemory)
    );
    assert_eq!(pager.evict(), Ok(false));
    assert_eq!(
        pager.evict_page(PageKey::new(asid, stack_page(1))),
        Err(VmError::Pinned(PageKey::new(asid, stack_page(1))))
    );

    // nothing changed for the pinned pages
    assert_eq!(
        pager.page_info(pin_a.key()).unwrap().phys,
        Some(pin_a.phys())
    );
    assert_eq!(
        pager.page_info(pin_b.key()).unwrap().phys,
        Some(pin_b.phys())
    );
    assert_eq!(
        pager
            .page_info(PageKey::new(asid, stack_page(2)))
            .unwrap()
            .state
            .position(),
        Position::ZeroFill
    );

    drop(pin_b);
    pager.handle_fault(asid, Fault::read(stack_page(2).base())).unwrap();
    assert_eq!(
        pager.page_info(pin_a.key()).unwrap().phys,
        Some(pin_a.phys())
    );
    assert!(pager
        .page_info(pin_a.key())
        .unwrap()
        .state
        .is_pinned());

    drop(pin_a);
    assert!(!pager
        .page_info(PageKey::new(asid, stack_page(0)))
        .unwrap()
        .state
        .is_pinned());
    pager.check_integrity();
}

#[test]
fn test_clock_gives_second_chance() {
    let pager = get_test_pager(2, 0, 8);
    let asid = pager.create_address_space();
    let a = PageKey::new(asid, stack_page(0));
    let b = PageKey::new(asid, stack_page(1));
    pager.add(a, PAGE_SIZE, STACK, None).unwrap();
    pager.add(b, PAGE_SIZE, STACK, None).unwrap();

    pager.write_user(asid, a.vpage.base(), &[1]).unwrap();
    pager.write_user(asid, b.vpage.base(), &[2]).unwrap();

    // both were accessed, the first sweep only clears the accessed bits
    assert_eq!(pager.evict(), Ok(true));
    assert!(pager.page_info(a).unwrap().phys.is_none());
    assert!(pager.page_info(b).unwrap().phys.is_some());

    // a is used again, b was not touched since the sweep
    let mut buf = [0u8; 1];
    pager.read_user(asid, a.vpage.base(), &mut buf).unwrap();
    assert_eq!(buf, [1]);

    assert_eq!(pager.evict(), Ok(true));
    assert!(pager.page_info(a).unwrap().phys.is_some());
    assert!(pager.page_info(b).unwrap().phys.is_none());
    assert_eq!(pager.stats().evictions, 2);
}

#[test]
fn test_writable_executable_diverges() {
    let pager = get_test_pager(4, 32, 4);
    let asid = pager.create_address_space();
    fill_file(&mut *pager.backing_store(), SectorId(0), PAGE_SIZE);
    let key = PageKey::new(asid, VirtPage(0x20));

    pager
        .load_executable_page(
            asid,
            key.vpage,
            ExecutablePage {
                image: ImageKey {
                    image: ImageId(2),
                    page: 0,
                },
                sector: SectorId(0),
                length: PAGE_SIZE,
                read_only: false,
            },
        )
        .unwrap();

    // clean data page: discarded, reloaded from the image
    let mut buf = [0u8; 8];
    pager.read_user(asid, key.vpage.base(), &mut buf).unwrap();
    let writes = pager.backing_store().write_count();
    pager.evict_page(key).unwrap();
    let info = pager.page_info(key).unwrap();
    assert_eq!(info.state.position(), Position::OnDisk);
    assert_eq!(info.backing_sector, Some(SectorId(0)));
    assert_eq!(pager.backing_store().write_count(), writes);

    // dirty data page: goes to swap, never to the image
    pager.write_user(asid, key.vpage.base(), b"modified").unwrap();
    pager.evict_page(key).unwrap();
    let info = pager.page_info(key).unwrap();
    assert_eq!(info.state.position(), Position::InSwap);
    let slot = info.backing_sector.unwrap();
    assert!(slot.0 >= 32, "swapped page has to live in the swap region");
    assert_eq!(
        pager.backing_store().write_count(),
        writes + SECTORS_PER_PAGE
    );

    // from now on the image is outdated, even a clean page goes to swap
    pager.read_user(asid, key.vpage.base(), &mut buf).unwrap();
    assert_eq!(&buf, b"modified");
    assert_eq!(pager.page_info(key).unwrap().backing_sector, Some(SectorId(0)));
    pager.evict_page(key).unwrap();
    assert_eq!(
        pager.page_info(key).unwrap().state.position(),
        Position::InSwap
    );
    pager.read_user(asid, key.vpage.base(), &mut buf).unwrap();
    assert_eq!(&buf, b"modified");
}

#[test]
fn test_full_swap_reports_out_of_memory() {
    let pager = get_test_pager(1, 0, 0);
    let asid = pager.create_address_space();
    let a = PageKey::new(asid, stack_page(0));
    let b = PageKey::new(asid, stack_page(1));
    pager.add(a, PAGE_SIZE, STACK, None).unwrap();
    pager.add(b, PAGE_SIZE, STACK, None).unwrap();

    pager.write_user(asid, a.vpage.base(), b"keep me").unwrap();
    assert_eq!(
        pager.write_user(asid, b.vpage.base(), b"no room"),
        Err(VmError::OutOfMemory)
    );

    // the victim stays resident and mapped
    let info = pager.page_info(a).unwrap();
    assert_eq!(info.state.position(), Position::InMemory);
    assert!(!info.state.is_pinned());
    assert!(pager.pte(a).unwrap().translate().is_some());
    assert!(pager.pte(a).unwrap().flags().is_dirty());

    let mut buf = [0u8; 7];
    pager.read_user(asid, a.vpage.base(), &mut buf).unwrap();
    assert_eq!(&buf, b"keep me");
    pager.check_integrity();
}

#[test]
fn test_full_swap_evicts_clean_code() {
    let pager = get_test_pager(2, SECTORS_PER_PAGE as u32, 0);
    fill_file(&mut *pager.backing_store(), SectorId(0), PAGE_SIZE);
    let asid = pager.create_address_space();
    let a = PageKey::new(asid, stack_page(0));
    let b = PageKey::new(asid, stack_page(1));
    let code = PageKey::new(asid, VirtPage(0x8000));
    pager.add(a, PAGE_SIZE, STACK, None).unwrap();
    pager.add(b, PAGE_SIZE, STACK, None).unwrap();
    let page = ExecutablePage {
        image: ImageKey {
            image: ImageId(1),
            page: 0,
        },
        sector: SectorId(0),
        length: PAGE_SIZE,
        read_only: true,
    };
    pager.load_executable_page(asid, code.vpage, page).unwrap();

    pager.write_user(asid, a.vpage.base(), b"dirty stack").unwrap();
    let mut buf = [0u8; 16];
    pager.read_user(asid, code.vpage.base(), &mut buf).unwrap();

    // the stack frame has nowhere to go, the code frame is dropped instead
    pager.write_user(asid, b.vpage.base(), b"new").unwrap();
    assert_eq!(
        pager.page_info(code).unwrap().state.position(),
        Position::OnDisk
    );
    assert_eq!(pager.page_info(a).unwrap().state.position(), Position::InMemory);
    assert!(pager.pte(a).unwrap().translate().is_some());
    assert!(pager.pte(a).unwrap().flags().is_dirty());
    assert_eq!(pager.stats().discards, 1);
    assert_eq!(pager.stats().swap_outs, 0);

    let mut buf = [0u8; 11];
    pager.read_user(asid, a.vpage.base(), &mut buf).unwrap();
    assert_eq!(&buf, b"dirty stack");
    pager.check_integrity();
}

#[test]
fn test_pinned_page_is_not_deleted() {
    let pager = get_test_pager(1, 16, 2);
    let asid = pager.create_address_space();
    let a = PageKey::new(asid, stack_page(0));
    let b = PageKey::new(asid, stack_page(1));
    pager.add(a, PAGE_SIZE, STACK, None).unwrap();
    pager.add(b, PAGE_SIZE, STACK, None).unwrap();
    pager
        .map_file(asid, VirtAddr(0x4000_0000), SectorId(0), PAGE_SIZE)
        .unwrap();

    let pin = pager.pin_page(asid, a.vpage.base(), true).unwrap();
    assert_eq!(pager.find_and_delete(a), Err(VmError::Pinned(a)));
    assert_eq!(pager.destroy_address_space(asid), Err(VmError::Pinned(a)));

    // the frame still belongs to the pinned page
    assert_eq!(pager.page_info(a).unwrap().phys, Some(pin.phys()));
    assert_eq!(
        pager.handle_fault(asid, Fault::read(b.vpage.base())),
        Err(VmError::OutOfMemory)
    );
    assert_eq!(pager.pages_of(asid).len(), 3);

    drop(pin);
    pager.find_and_delete(a).unwrap();
    assert_eq!(pager.free_frames(), 1);
    let phys = pager.handle_fault(asid, Fault::read(b.vpage.base())).unwrap();
    assert_eq!(pager.page_info(b).unwrap().phys, Some(phys));

    pager.destroy_address_space(asid).unwrap();
    assert_eq!(pager.free_frames(), 1);
    pager.check_integrity();
}

#[test]
fn test_evict_page_of_lazy_page_is_noop() {
    let pager = get_test_pager(1, 0, 1);
    let asid = pager.create_address_space();
    let key = PageKey::new(asid, stack_page(0));
    pager.add(key, PAGE_SIZE, STACK, None).unwrap();

    assert_eq!(pager.evict_page(key), Ok(()));
    assert_eq!(pager.stats().evictions, 0);

    let missing = PageKey::new(asid, stack_page(1));
    assert_eq!(pager.evict_page(missing), Err(VmError::NotFound(missing)));
    assert_eq!(pager.evict(), Ok(false));

    pager
        .handle_fault(asid, Fault::write(VirtAddr(key.vpage.base().0 + 1)))
        .unwrap();
    assert_eq!(pager.evict(), Ok(true));
}
