pub mod arch;
pub mod consts;
mod dump;
pub mod error;
pub mod paging;
pub mod pool;
pub mod virt;

use core::{fmt, ops::DerefMut};

use arch::{TranslationBase, Ttbr0Shadow};
use consts::FRAME_SIZE;
use error::MapResult;
use paging::{Granule, MemoryAttr, Translation};
use pool::TablePool;

/// One block of a region decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub phys: u64,
    pub virt: u64,
    pub granule: Granule,
}

/// Splits a region into blocks, largest granule first.
///
/// Both addresses start from their containing page. A granule is used when it fits in
/// what is left of the region and both page addresses are aligned to it. A tail shorter
/// than a page still gets a whole page.
#[derive(Debug, Clone)]
pub struct RegionBlocks {
    phys: u64,
    virt: u64,
    remaining: u64,
}

impl RegionBlocks {
    pub fn new(phys: u64, virt: u64, size: u64) -> Self {
        let lead = Self::lead(virt);
        Self {
            phys: phys & !(FRAME_SIZE as u64 - 1),
            virt: virt - lead,
            remaining: if size == 0 { 0 } else { size.saturating_add(lead) },
        }
    }

    /// Bytes mapped beyond the requested `size` once both ends are widened to pages.
    pub fn excess(virt: u64, size: u64) -> u64 {
        if size == 0 {
            return 0;
        }
        let page = FRAME_SIZE as u64;
        let lead = Self::lead(virt);
        let tail = size.saturating_add(lead) % page;
        lead + if tail == 0 { 0 } else { page - tail }
    }

    fn lead(virt: u64) -> u64 {
        virt % FRAME_SIZE as u64
    }
}

impl Iterator for RegionBlocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.remaining == 0 {
            return None;
        }

        let granule = Granule::ALL
            .into_iter()
            .find(|g| {
                self.remaining >= g.size() && g.is_aligned(self.phys) && g.is_aligned(self.virt)
            })
            .unwrap_or(Granule::KiB4);

        let block = Block {
            phys: self.phys,
            virt: self.virt,
            granule,
        };

        self.phys = self.phys.wrapping_add(granule.size());
        self.virt = self.virt.wrapping_add(granule.size());
        self.remaining = self.remaining.saturating_sub(granule.size());

        Some(block)
    }
}

/// Installs mappings into the hierarchy rooted at the translation base register.
pub struct Mapper<M, T = Ttbr0Shadow> {
    pool: TablePool<M>,
    base: T,
}

impl<M: DerefMut<Target = [u8]>, T: TranslationBase> Mapper<M, T> {
    pub fn new(pool: TablePool<M>, base: T) -> Self {
        Self { pool, base }
    }

    /// Physical address of the root table.
    pub fn root(&self) -> u64 {
        self.base.root() & paging::TABLE_ADDR_MASK
    }

    /// Maps a single 1GiB, 2MiB or 4KiB block.
    pub fn map_block(&mut self, phys: u64, virt: u64, size: u64, attr: MemoryAttr) -> MapResult {
        let root = self.base.root();
        paging::map_block(&mut self.pool, root, phys, virt, size, attr)
    }

    /// Maps `size` bytes at `virt` to `phys`.
    ///
    /// Stops at the first failing block; blocks mapped before it stay mapped.
    pub fn map_region(&mut self, phys: u64, virt: u64, size: u64, attr: MemoryAttr) -> MapResult {
        log::debug!(
            "Mapping region {virt:#x}+{size:#x} -> {phys:#x} (attr={})",
            attr.index()
        );

        let excess = RegionBlocks::excess(virt, size);
        if excess != 0 {
            log::warn!(
                "Region {virt:#x}+{size:#x} is not page aligned, {excess:#x} extra bytes get mapped"
            );
        }

        for block in RegionBlocks::new(phys, virt, size) {
            self.map_block(block.phys, block.virt, block.granule.size(), attr)?;
        }

        Ok(())
    }

    pub fn translate(&self, virt: u64) -> Option<Translation> {
        paging::translate(&self.pool, self.base.root(), virt)
    }

    /// Writes the hierarchy below `table_pa` to `out`. Diagnostic only.
    pub fn dump<W: fmt::Write>(&self, table_pa: u64, out: &mut W) {
        dump::dump(&self.pool, table_pa, 0, out);
    }

    pub fn dump_root<W: fmt::Write>(&self, out: &mut W) {
        self.dump(self.root(), out);
    }

    pub fn pool(&self) -> &TablePool<M> {
        &self.pool
    }

    pub fn into_pool(self) -> TablePool<M> {
        self.pool
    }
}

/// A [`Mapper`] behind a spin lock, for when more than one core may map.
pub struct SharedMapper<M, T = Ttbr0Shadow> {
    mapper: spin::Mutex<Mapper<M, T>>,
}

impl<M: DerefMut<Target = [u8]>, T: TranslationBase> SharedMapper<M, T> {
    pub const fn new(mapper: Mapper<M, T>) -> Self {
        Self {
            mapper: spin::Mutex::new(mapper),
        }
    }

    pub fn map_region(&self, phys: u64, virt: u64, size: u64, attr: MemoryAttr) -> MapResult {
        self.mapper.lock().map_region(phys, virt, size, attr)
    }

    pub fn map_block(&self, phys: u64, virt: u64, size: u64, attr: MemoryAttr) -> MapResult {
        self.mapper.lock().map_block(phys, virt, size, attr)
    }

    pub fn translate(&self, virt: u64) -> Option<Translation> {
        self.mapper.lock().translate(virt)
    }

    pub fn lock(&self) -> spin::MutexGuard<'_, Mapper<M, T>> {
        self.mapper.lock()
    }

    pub fn into_inner(self) -> Mapper<M, T> {
        self.mapper.into_inner()
    }
}
