pub const FRAME_SIZE: usize = 0x1000;
pub const ENTRIES_PER_TABLE: usize = 512;
pub const NUM_LEVELS: usize = 3;

/// Bits of virtual address consumed per level.
pub const LEVEL_SHIFT: u32 = 9;
pub const INDEX_MASK: u64 = (1 << LEVEL_SHIFT) - 1;

pub const L1_SHIFT: u32 = 30;
pub const L2_SHIFT: u32 = 21;
pub const L3_SHIFT: u32 = 12;

/// Legal physical address width (48 bits).
pub const PA_MASK: u64 = (1 << 48) - 1;

/// Top of the lower VA range minus the 2MiB window reserved for boot code.
pub const MAX_VA: u64 = (1 << (L1_SHIFT + LEVEL_SHIFT)) - (1 << (L3_SHIFT + LEVEL_SHIFT));

// Translation table window set up by the boot code
pub const TABLE_WINDOW_PA: u64 = 0x4020_0000;
pub const NUM_BOOT_TABLES: usize = 4;
pub const NUM_POOL_TABLES: usize = ENTRIES_PER_TABLE - NUM_BOOT_TABLES;

// Boot memory map used by the demo binary
pub const RAM_START: u64 = 0x4000_0000;
pub const RAM_SIZE: u64 = 0x4000_0000;
pub const UART_START: u64 = 0x0900_0000;
pub const UART_SIZE: u64 = 0x1000;
pub const GIC_START: u64 = 0x0800_0000;
pub const GIC_SIZE: u64 = 0x2_0000;
pub const HIGH_RAM_START: u64 = 0x8000_0000;
pub const HIGH_RAM_SIZE: u64 = 0x20_1400;

pub const ATTR_NORMAL: u8 = 0;
pub const ATTR_DEVICE: u8 = 1;
