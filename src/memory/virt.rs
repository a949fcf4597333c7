use std::{
    fs::OpenOptions,
    io::{Result, Seek, Write},
    path::Path,
};

use memmap::{MmapMut, MmapOptions};

fn create_memory_file(path: &Path, size: usize) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;

    // Set the size of the file to the desired memory size
    file.set_len(size as u64)?;

    // Clear whatever a previous run left behind
    file.rewind()?;
    file.write_all(&vec![0u8; size])?;

    Ok(())
}

/// Simulated physical memory backed by the file at `path`, zero filled.
pub fn init_physical_memory(path: impl AsRef<Path>, size: usize) -> Result<MmapMut> {
    let path = path.as_ref();
    create_memory_file(path, size)?;
    log::debug!("Created memory file {} ({size:#x} bytes)", path.display());

    let file = OpenOptions::new().read(true).write(true).open(path)?;

    // Nothing else maps this file while the mapping is alive
    unsafe { MmapOptions::new().len(size).map_mut(&file) }
}

/// Simulated physical memory without a backing file.
pub fn anonymous_memory(size: usize) -> Result<MmapMut> {
    MmapMut::map_anon(size)
}
