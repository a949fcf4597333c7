use thiserror::Error;

/// Errors returned while installing mappings.
///
/// Every variant is definitive: none of them can be fixed by retrying the same call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// The virtual address lies in the reserved top window or beyond the lower half.
    #[error("virtual address {0:#x} is outside the mappable range")]
    VaInvalid(u64),

    /// The block size is not one of 1GiB, 2MiB or 4KiB.
    #[error("block size {0:#x} is not a translation granule")]
    SizeBad(u64),

    /// An entry already maps this address at the requested granule.
    #[error("virtual address {0:#x} is already mapped at this granule")]
    EntryInUse(u64),

    /// A coarser block already covers this address.
    #[error("virtual address {0:#x} is covered by a larger block")]
    EntryIsBlock(u64),

    /// The table pool is exhausted.
    #[error("no translation tables left in the pool")]
    OutOfTables,

    /// A table descriptor points outside the memory backing the pool.
    #[error("table at {0:#x} is not backed by the table pool")]
    ForeignTable(u64),
}

pub type MapResult<T = ()> = Result<T, MapError>;
