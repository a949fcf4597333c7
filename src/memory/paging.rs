use core::ops::DerefMut;
use modular_bitfield::prelude::*;

use super::{
    arch::barrier,
    consts::{FRAME_SIZE, INDEX_MASK, L1_SHIFT, L2_SHIFT, L3_SHIFT, MAX_VA, NUM_LEVELS, PA_MASK},
    error::{MapError, MapResult},
    pool::TablePool,
};

/// Mask selecting the table address out of a table descriptor or TTBR value.
pub const TABLE_ADDR_MASK: u64 = PA_MASK & !(FRAME_SIZE as u64 - 1);

/// Inner shareable.
const SH_INNER: u8 = 0b11;

/// Index into MAIR_EL1 selecting the memory type of a mapping.
///
/// The value is opaque to the mapper. Only the low 3 bits fit in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryAttr(u8);

impl MemoryAttr {
    pub const NORMAL: Self = Self(0);
    pub const DEVICE: Self = Self(1);

    pub const fn new(index: u8) -> Self {
        Self(index & 0b111)
    }

    pub const fn index(self) -> u8 {
        self.0
    }
}

impl From<u8> for MemoryAttr {
    fn from(index: u8) -> Self {
        Self::new(index)
    }
}

/// Stage 1 translation table descriptor, 4KiB granule.
#[bitfield(bits = 64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub valid: bool,
    /// Table at levels 1 and 2, page at level 3.
    pub table: bool,
    pub attr_index: B3,
    pub ns: bool,
    pub ap: B2,
    pub sh: B2,
    pub af: bool,
    pub ng: bool,
    /// Output address bits [47:12].
    pub output: B36,
    #[skip(getters, setters)]
    res0: B4,
    pub contiguous: bool,
    pub pxn: bool,
    pub uxn: bool,
    #[skip(getters, setters)]
    reserved_for_software: B9,
}

/// Decoded view of a [`PageEntry`] at a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Invalid,
    /// Physical address of the next level table.
    Table(u64),
    Block { output: u64, attr: MemoryAttr },
}

impl PageEntry {
    pub fn from_raw(raw: u64) -> Self {
        Self::from_bytes(raw.to_le_bytes())
    }

    pub fn raw(self) -> u64 {
        u64::from_le_bytes(self.into_bytes())
    }

    pub fn is_valid(&self) -> bool {
        self.valid()
    }

    pub fn output_address(&self) -> u64 {
        self.output() << L3_SHIFT
    }

    /// Table descriptor linking to the table at `table_pa`.
    pub fn table_descriptor(table_pa: u64) -> Self {
        Self::new()
            .with_valid(true)
            .with_table(true)
            .with_output((table_pa & TABLE_ADDR_MASK) >> L3_SHIFT)
    }

    /// Block (levels 1 and 2) or page (level 3) descriptor mapping `phys`.
    ///
    /// `phys` is rounded down to the granule and clipped to 48 bits.
    pub fn leaf_descriptor(phys: u64, granule: Granule, attr: MemoryAttr) -> Self {
        let output = phys & !(granule.size() - 1) & PA_MASK;
        Self::new()
            .with_valid(true)
            .with_table(granule == Granule::KiB4)
            .with_attr_index(attr.index())
            .with_sh(SH_INNER)
            .with_af(true)
            .with_output(output >> L3_SHIFT)
    }

    /// Interpret this entry as found in a level `level` table (1 to 3).
    pub fn decode(self, level: usize) -> Descriptor {
        if !self.is_valid() {
            return Descriptor::Invalid;
        }

        if self.table() && level < NUM_LEVELS {
            return Descriptor::Table(self.output_address());
        }

        Descriptor::Block {
            output: self.output_address(),
            attr: MemoryAttr::new(self.attr_index()),
        }
    }
}

/// One of the three block sizes a descriptor can map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granule {
    GiB1,
    MiB2,
    KiB4,
}

impl Granule {
    /// Largest first, in walk order.
    pub const ALL: [Self; NUM_LEVELS] = [Self::GiB1, Self::MiB2, Self::KiB4];

    pub const fn shift(self) -> u32 {
        match self {
            Self::GiB1 => L1_SHIFT,
            Self::MiB2 => L2_SHIFT,
            Self::KiB4 => L3_SHIFT,
        }
    }

    pub const fn size(self) -> u64 {
        1 << self.shift()
    }

    /// Level of the table holding descriptors of this size.
    pub const fn level(self) -> usize {
        match self {
            Self::GiB1 => 1,
            Self::MiB2 => 2,
            Self::KiB4 => 3,
        }
    }

    pub fn from_size(size: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|granule| granule.size() == size)
    }

    /// Table index of `virt` at this granule's level.
    pub const fn index(self, virt: u64) -> usize {
        ((virt >> self.shift()) & INDEX_MASK) as usize
    }

    pub const fn is_aligned(self, addr: u64) -> bool {
        addr & (self.size() - 1) == 0
    }
}

/// Result of walking the hierarchy for one virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub phys: u64,
    pub attr: MemoryAttr,
    pub granule: Granule,
}

/// root - Physical address of the level 1 table (as held in TTBR0).
/// phys - The physical address.
/// virt - The virtual address.
/// size - One of the granule sizes.
/// attr - Memory attribute index of the mapping.
pub fn map_block<M: DerefMut<Target = [u8]>>(
    pool: &mut TablePool<M>,
    root: u64,
    phys: u64,
    virt: u64,
    size: u64,
    attr: MemoryAttr,
) -> MapResult {
    if virt >= MAX_VA {
        return Err(MapError::VaInvalid(virt));
    }

    let granule = Granule::from_size(size).ok_or(MapError::SizeBad(size))?;

    // The block must not reach into the reserved window either
    let block_end = (virt & !(granule.size() - 1)) + granule.size();
    if block_end > MAX_VA {
        return Err(MapError::VaInvalid(virt));
    }

    let mut table = pool.table_at(root & TABLE_ADDR_MASK)?;

    // Traverse the hierarchy (the root is expected to exist, the rest can be created)
    for level in Granule::ALL {
        let index = level.index(virt);
        let entry = pool.entry(table, index);

        match entry.decode(level.level()) {
            Descriptor::Invalid if level == granule => {
                let leaf = PageEntry::leaf_descriptor(phys, granule, attr);
                pool.set_entry(table, index, leaf);
                barrier();

                log::debug!(
                    "mapped {:#x} -> {:#x} | {:?} | attr={}",
                    leaf.output_address(),
                    virt & !(granule.size() - 1),
                    granule,
                    attr.index()
                );
                return Ok(());
            }
            Descriptor::Invalid => {
                let child = pool.allocate_table()?;
                pool.set_entry(table, index, PageEntry::table_descriptor(pool.table_pa(child)));
                barrier();

                table = child;
            }
            _ if level == granule => return Err(MapError::EntryInUse(virt)),
            Descriptor::Block { .. } => return Err(MapError::EntryIsBlock(virt)),
            Descriptor::Table(next) => table = pool.table_at(next)?,
        }
    }

    unreachable!("walk always stops at the {granule:?} level")
}

/// Convert a virtual address to a physical address by walking the hierarchy.
/// Returns None when no valid leaf governs `virt`.
pub fn translate<M: DerefMut<Target = [u8]>>(
    pool: &TablePool<M>,
    root: u64,
    virt: u64,
) -> Option<Translation> {
    let mut table = pool.table_at(root & TABLE_ADDR_MASK).ok()?;

    for level in Granule::ALL {
        match pool.entry(table, level.index(virt)).decode(level.level()) {
            Descriptor::Invalid => return None,
            Descriptor::Table(next) => table = pool.table_at(next).ok()?,
            Descriptor::Block { output, attr } => {
                return Some(Translation {
                    phys: output + (virt & (level.size() - 1)),
                    attr,
                    granule: level,
                })
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_descriptor_layout() {
        let block = PageEntry::leaf_descriptor(0x8000_0000, Granule::MiB2, MemoryAttr::NORMAL);
        assert_eq!(block.raw(), 0x8000_0701);

        let page = PageEntry::leaf_descriptor(0x1000, Granule::KiB4, MemoryAttr::new(1));
        assert_eq!(page.raw(), 0x1707);
    }

    #[test]
    fn leaf_output_is_masked_to_granule_and_width() {
        let phys = 0xffff_4123_4567_8000;
        let block = PageEntry::leaf_descriptor(phys, Granule::GiB1, MemoryAttr::NORMAL);
        assert_eq!(block.output_address(), 0x4123_4000_0000);

        let block = PageEntry::leaf_descriptor(0x20_1234, Granule::MiB2, MemoryAttr::NORMAL);
        assert_eq!(block.output_address(), 0x20_0000);
    }

    #[test]
    fn table_descriptor_layout() {
        let entry = PageEntry::table_descriptor(0x4020_1000);
        assert_eq!(entry.raw(), 0x4020_1003);
        assert_eq!(entry.decode(1), Descriptor::Table(0x4020_1000));
    }

    #[test]
    fn decode_by_level() {
        assert_eq!(PageEntry::from_raw(0).decode(1), Descriptor::Invalid);
        assert_eq!(PageEntry::from_raw(0x1002).decode(2), Descriptor::Invalid);

        let attr = MemoryAttr::new(3);
        assert_eq!(
            PageEntry::from_raw(0x4000_070d).decode(1),
            Descriptor::Block { output: 0x4000_0000, attr }
        );
        // Level 3 reuses the table bit to mean "page"
        assert_eq!(
            PageEntry::from_raw(0x5707).decode(3),
            Descriptor::Block { output: 0x5000, attr: MemoryAttr::new(1) }
        );
    }

    #[test]
    fn attr_index_is_three_bits() {
        assert_eq!(MemoryAttr::new(9).index(), 1);
        assert_eq!(MemoryAttr::from(7).index(), 7);
    }

    #[test]
    fn granule_geometry() {
        assert_eq!(Granule::from_size(0x4000_0000), Some(Granule::GiB1));
        assert_eq!(Granule::from_size(0x20_0000), Some(Granule::MiB2));
        assert_eq!(Granule::from_size(0x1000), Some(Granule::KiB4));
        assert_eq!(Granule::from_size(0x2000), None);
        assert_eq!(Granule::from_size(0), None);

        let virt = (5 << 30) | (7 << 21) | (9 << 12) | 0x123;
        assert_eq!(Granule::GiB1.index(virt), 5);
        assert_eq!(Granule::MiB2.index(virt), 7);
        assert_eq!(Granule::KiB4.index(virt), 9);
    }
}
