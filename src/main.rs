mod logging;

use std::error::Error;

use boot_mmu::{
    memory::{consts::*, virt},
    Mapper, MemoryAttr, PoolConfig, SharedMapper, TablePool, Ttbr0Shadow,
};

fn main() -> Result<(), Box<dyn Error>> {
    logging::init()?;

    let config = PoolConfig::default();
    let mem = virt::init_physical_memory("mem.img", config.window_size())?;
    log::info!(
        "* Initiated table window at {:#x} ({} pool tables).",
        config.base_pa,
        config.capacity
    );

    // The boot code leaves an empty root in the first boot table and loads it into TTBR0
    let ttbr0 = Ttbr0Shadow::new(config.root_pa());
    let mapper = SharedMapper::new(Mapper::new(TablePool::new(mem, config), ttbr0));

    map_boot_regions(&mapper)?;
    log::info!("* Mapped boot regions.");

    let mapper = mapper.into_inner();
    log::info!(
        "* Used {} of {} tables.",
        mapper.pool().allocated(),
        mapper.pool().capacity()
    );

    let mut out = String::new();
    mapper.dump_root(&mut out);
    print!("{out}");

    Ok(())
}

fn map_boot_regions<M>(mapper: &SharedMapper<M>) -> Result<(), Box<dyn Error>>
where
    M: core::ops::DerefMut<Target = [u8]>,
{
    let normal = MemoryAttr::new(ATTR_NORMAL);
    let device = MemoryAttr::new(ATTR_DEVICE);

    // Identity map RAM (it holds the table window)
    mapper.map_region(RAM_START, RAM_START, RAM_SIZE, normal)?;
    log::info!("Mapped RAM.");

    mapper.map_region(GIC_START, GIC_START, GIC_SIZE, device)?;
    log::info!("Mapped GIC.");

    mapper.map_region(UART_START, UART_START, UART_SIZE, device)?;
    log::info!("Mapped UART.");

    // Not page sized, the tail gets a whole page
    mapper.map_region(HIGH_RAM_START, HIGH_RAM_START, HIGH_RAM_SIZE, normal)?;
    log::info!("Mapped high RAM.");

    Ok(())
}
