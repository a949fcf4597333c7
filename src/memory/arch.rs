//! Translation base register access and memory ordering.

/// Source of the root table address (TTBR0).
pub trait TranslationBase {
    /// Raw register value. The table address sits in bits [47:12].
    fn root(&self) -> u64;
}

/// TTBR0 value as loaded by the boot code, for running outside of EL1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttbr0Shadow(u64);

impl Ttbr0Shadow {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl TranslationBase for Ttbr0Shadow {
    fn root(&self) -> u64 {
        self.0
    }
}

/// The live TTBR0_EL1 register.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Ttbr0El1;

#[cfg(target_arch = "aarch64")]
impl TranslationBase for Ttbr0El1 {
    fn root(&self) -> u64 {
        let value: u64;
        unsafe {
            core::arch::asm!(
                "mrs {}, ttbr0_el1",
                out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }
}

/// Makes preceding table writes visible before anything that depends on them.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn barrier() {
    unsafe { core::arch::asm!("dsb sy", options(nostack, preserves_flags)) }
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn barrier() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
