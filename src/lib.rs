//! Early boot translation table setup for a three level, 4KiB granule, 48-bit PA MMU.

pub mod memory;

pub use memory::{
    arch::{barrier, TranslationBase, Ttbr0Shadow},
    error::{MapError, MapResult},
    paging::{Descriptor, Granule, MemoryAttr, PageEntry, Translation},
    pool::{PoolConfig, TableId, TablePool},
    Block, Mapper, RegionBlocks, SharedMapper,
};
