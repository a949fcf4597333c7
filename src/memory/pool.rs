use core::ops::{DerefMut, Range};

use super::{
    consts::{ENTRIES_PER_TABLE, FRAME_SIZE, NUM_BOOT_TABLES, NUM_POOL_TABLES, TABLE_WINDOW_PA},
    error::{MapError, MapResult},
    paging::PageEntry,
};

const ENTRY_SIZE: usize = core::mem::size_of::<u64>();

/// Layout of the translation table window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Physical address of the first boot table (the root).
    pub base_pa: u64,
    /// Tables set up by the boot code before the pool starts.
    pub boot_tables: usize,
    /// Tables the allocator may hand out.
    pub capacity: usize,
}

impl PoolConfig {
    /// Bytes of memory backing the whole window.
    pub const fn window_size(&self) -> usize {
        (self.boot_tables + self.capacity) * FRAME_SIZE
    }

    pub const fn root_pa(&self) -> u64 {
        self.base_pa
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_pa: TABLE_WINDOW_PA,
            boot_tables: NUM_BOOT_TABLES,
            capacity: NUM_POOL_TABLES,
        }
    }
}

/// Arena index of a translation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(usize);

impl TableId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Fixed window of translation tables with a bump cursor over the pool part.
///
/// Tables are never freed or moved once handed out.
pub struct TablePool<M> {
    mem: M,
    config: PoolConfig,
    cursor: usize,
}

impl<M: DerefMut<Target = [u8]>> TablePool<M> {
    /// `mem` backs the window starting at `config.base_pa`. The boot tables in it are used as is.
    pub fn new(mem: M, config: PoolConfig) -> Self {
        assert!(
            mem.len() >= config.window_size(),
            "Table window needs {:#x} bytes, got {:#x}",
            config.window_size(),
            mem.len()
        );
        assert!(
            config.base_pa % FRAME_SIZE as u64 == 0,
            "Table window is not aligned"
        );
        assert!(config.boot_tables > 0, "Table window has no root table");

        Self {
            mem,
            config,
            cursor: 0,
        }
    }

    /// Hands out the next table, zero filled.
    ///
    /// The caller links it into a parent entry and issues the barrier.
    pub fn allocate_table(&mut self) -> MapResult<TableId> {
        if self.cursor == self.config.capacity {
            log::error!("Table pool exhausted ({} tables)", self.config.capacity);
            return Err(MapError::OutOfTables);
        }

        let table = TableId(self.config.boot_tables + self.cursor);
        self.mem[Self::table_range(table)].fill(0);
        self.cursor += 1;

        log::trace!(
            "Allocated table {} at {:#x} ({} left)",
            table.0,
            self.table_pa(table),
            self.remaining()
        );
        Ok(table)
    }

    pub fn table_pa(&self, table: TableId) -> u64 {
        self.config.base_pa + (table.0 * FRAME_SIZE) as u64
    }

    /// Finds the table at `pa`. Only boot tables and already issued pool tables resolve.
    pub fn table_at(&self, pa: u64) -> MapResult<TableId> {
        let offset = pa
            .checked_sub(self.config.base_pa)
            .filter(|offset| offset % FRAME_SIZE as u64 == 0)
            .ok_or(MapError::ForeignTable(pa))?;

        let index = usize::try_from(offset / FRAME_SIZE as u64)
            .map_err(|_| MapError::ForeignTable(pa))?;
        if index >= self.config.boot_tables + self.cursor {
            return Err(MapError::ForeignTable(pa));
        }

        Ok(TableId(index))
    }

    pub fn entry(&self, table: TableId, index: usize) -> PageEntry {
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes.copy_from_slice(&self.mem[Self::entry_range(table, index)]);
        PageEntry::from_raw(u64::from_le_bytes(bytes))
    }

    pub fn set_entry(&mut self, table: TableId, index: usize, entry: PageEntry) {
        self.mem[Self::entry_range(table, index)].copy_from_slice(&entry.raw().to_le_bytes());
    }

    /// Tables handed out so far.
    pub fn allocated(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn remaining(&self) -> usize {
        self.config.capacity - self.cursor
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn into_inner(self) -> M {
        self.mem
    }

    fn table_range(table: TableId) -> Range<usize> {
        let start = table.0 * FRAME_SIZE;
        start..start + FRAME_SIZE
    }

    fn entry_range(table: TableId, index: usize) -> Range<usize> {
        assert!(index < ENTRIES_PER_TABLE, "Entry index {index} out of range");
        let start = table.0 * FRAME_SIZE + index * ENTRY_SIZE;
        start..start + ENTRY_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: PoolConfig = PoolConfig {
        base_pa: 0x4020_0000,
        boot_tables: 1,
        capacity: 2,
    };

    fn pool() -> TablePool<Vec<u8>> {
        TablePool::new(vec![0u8; CONFIG.window_size()], CONFIG)
    }

    #[test]
    fn allocates_after_boot_tables() {
        let mut pool = pool();
        let table = pool.allocate_table().unwrap();

        assert_eq!(table.index(), 1);
        assert_eq!(pool.table_pa(table), 0x4020_1000);
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.remaining(), 1);
    }

    #[test]
    fn allocation_zero_fills() {
        let mut mem = vec![0xffu8; CONFIG.window_size()];
        mem[..FRAME_SIZE].fill(0);
        let mut pool = TablePool::new(mem, CONFIG);

        let table = pool.allocate_table().unwrap();
        assert!((0..ENTRIES_PER_TABLE).all(|i| pool.entry(table, i).raw() == 0));
    }

    #[test]
    fn exhaustion_keeps_cursor() {
        let mut pool = pool();
        pool.allocate_table().unwrap();
        pool.allocate_table().unwrap();

        assert_eq!(pool.allocate_table(), Err(MapError::OutOfTables));
        assert_eq!(pool.allocate_table(), Err(MapError::OutOfTables));
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn resolves_only_issued_tables() {
        let mut pool = pool();
        assert_eq!(pool.table_at(0x4020_0000).unwrap().index(), 0);
        assert_eq!(
            pool.table_at(0x4020_1000),
            Err(MapError::ForeignTable(0x4020_1000))
        );

        pool.allocate_table().unwrap();
        assert_eq!(pool.table_at(0x4020_1000).unwrap().index(), 1);

        for pa in [0x4010_0000, 0x4020_0800, 0x4020_2000] {
            assert_eq!(pool.table_at(pa), Err(MapError::ForeignTable(pa)));
        }
    }

    #[test]
    fn entries_round_trip_through_memory() {
        let mut pool = pool();
        let root = pool.table_at(CONFIG.root_pa()).unwrap();
        pool.set_entry(root, 511, PageEntry::table_descriptor(0x4020_1000));

        assert_eq!(pool.entry(root, 511).raw(), 0x4020_1003);
        assert_eq!(pool.entry(root, 510).raw(), 0);
        let mem = pool.into_inner();
        assert_eq!(&mem[511 * 8..512 * 8], &0x4020_1003u64.to_le_bytes());
    }
}
