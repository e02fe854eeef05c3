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

use std::error::Error;

use env_logger::{Builder, Env};
use log::info;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use vm_pager::{
    modules::{
        backing_store::{BackingStoreModule, FileBackingStore},
        frame_allocator::PoolFrameAllocator,
    },
    AddressSpaceId, ExecutablePage, Fault, ImageId, ImageKey, Pager, SectorId, VirtAddr, VirtPage,
    VmConfig, PAGE_SIZE, SECTORS_PER_PAGE, SECTOR_SIZE,
};

const FRAMES: usize = 8;
const SWAP_SLOTS: usize = 64;
const PROCESSES: usize = 3;

const CODE_PAGES: usize = 4;
const DATA_PAGES: usize = 2;
const FILE_SECTORS: u32 = ((CODE_PAGES + PROCESSES * DATA_PAGES) * SECTORS_PER_PAGE) as u32;

const CODE_BASE: VirtPage = VirtPage(0x8048);
const DATA_BASE: VirtAddr = VirtAddr(0x4000_0000);

type DemoPager = Pager<PoolFrameAllocator, FileBackingStore>;

fn main() -> Result<(), Box<dyn Error>> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_module_path(false)
        .init();

    let store = FileBackingStore::new("pager_demo.data".into(), FILE_SECTORS, SWAP_SLOTS)?;
    let pager: DemoPager = Pager::new(PoolFrameAllocator::new(FRAMES), store, VmConfig::default());
    write_image(&pager)?;

    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let processes = (0..PROCESSES)
        .map(|i| spawn_process(&pager, i))
        .collect::<Result<Vec<_>, _>>()?;

    for _ in 0..2000 {
        let asid = processes[rng.gen_range(0..PROCESSES)];
        match rng.gen_range(0..4) {
            0 => {
                // instruction fetch from the shared code
                let page = VirtPage(CODE_BASE.0 + rng.gen_range(0..CODE_PAGES));
                pager.handle_fault(asid, Fault::read(page.base()))?;
            }
            1 => {
                let offset = rng.gen_range(0..DATA_PAGES * PAGE_SIZE - 8);
                let value: u64 = rng.gen();
                pager.write_user(asid, DATA_BASE.offset(offset), &value.to_le_bytes())?;
            }
            _ => {
                // push onto a stack of up to 16 pages
                let top = pager.config().stack_top;
                let depth = rng.gen_range(1..16 * PAGE_SIZE);
                let addr = VirtAddr(top.0 - depth);
                let fault = Fault {
                    addr,
                    write: true,
                    stack_pointer: Some(addr),
                };
                pager.handle_fault(asid, fault)?;
                pager.write_user(asid, addr, &[rng.gen::<u8>()])?;
            }
        }
    }

    info!("Statistics after workload: {}", pager.stats());
    for asid in processes {
        info!("{} has {} pages", asid, pager.pages_of(asid).len());
        pager.destroy_address_space(asid)?;
    }
    info!("Statistics after teardown: {}", pager.stats());

    Ok(())
}

/// Fills the code pages of the image with recognizable content
fn write_image(pager: &DemoPager) -> Result<(), Box<dyn Error>> {
    let mut store = pager.backing_store();
    for s in 0..CODE_PAGES * SECTORS_PER_PAGE {
        let sector = [s as u8; SECTOR_SIZE];
        store
            .write_sector(SectorId(s as u32), &sector)
            .map_err(|()| "could not write image")?;
    }

    Ok(())
}

/// Creates an address space with the shared code, a private data mapping and a stack
fn spawn_process(pager: &DemoPager, index: usize) -> Result<AddressSpaceId, Box<dyn Error>> {
    let asid = pager.create_address_space();

    for p in 0..CODE_PAGES {
        let page = ExecutablePage {
            image: ImageKey {
                image: ImageId(1),
                page: p,
            },
            sector: SectorId((p * SECTORS_PER_PAGE) as u32),
            length: PAGE_SIZE,
            read_only: true,
        };
        pager.load_executable_page(asid, VirtPage(CODE_BASE.0 + p), page)?;
    }

    let data_sector = SectorId(((CODE_PAGES + index * DATA_PAGES) * SECTORS_PER_PAGE) as u32);
    pager.map_file(asid, DATA_BASE, data_sector, DATA_PAGES * PAGE_SIZE)?;
    pager.grow_stack(asid, VirtAddr(pager.config().stack_top.0 - 1))?;

    Ok(asid)
}
