use core::{fmt::Debug, ops::Range};

/// Software Generated Interrupts.
pub const SGI_RANGE: Range<u32> = 0..16;
/// Private Peripheral Interrupts, banked per vCPU.
pub const PPI_RANGE: Range<u32> = 16..32;
/// Shared Peripheral Interrupts. The upper bound is the architectural one,
/// a VM only exposes `VgicConfig::nr_irqs` of them.
pub const SPI_RANGE: Range<u32> = 32..1020;

pub const NR_SGIS: usize = 16;
/// IRQs below this number live in the per-vCPU private region.
pub const NR_PRIVATE_IRQS: usize = 32;
/// GICv2 target registers carry one bit per CPU interface.
pub const MAX_CPUS: usize = 8;
/// Reverse-map sentinel: the IRQ is not held by any list register.
pub const LR_EMPTY: u8 = 0xff;

/// Distributor window size.
pub const DIST_SIZE: u64 = 0x1000;
/// CPU interface window size.
pub const CPU_SIZE: u64 = 0x2000;

/// GIC interrupt ID.
#[derive(Copy, Clone, Eq, Ord, PartialOrd, PartialEq, Hash)]
pub struct IntId(u32);

impl IntId {
    /// Create a new `IntId` from a raw value, unchecked.
    #[cfg(test)]
    pub(crate) const fn raw(id: u32) -> Self {
        Self(id)
    }

    /// SGI number `sgi`, panics if it is not in 0..16.
    pub const fn sgi(sgi: u32) -> Self {
        assert!(sgi < SGI_RANGE.end, "Invalid SGI number");
        Self(SGI_RANGE.start + sgi)
    }

    /// PPI number `ppi`, panics if it is not in 0..16.
    pub const fn ppi(ppi: u32) -> Self {
        assert!(ppi < PPI_RANGE.end - PPI_RANGE.start, "Invalid PPI number");
        Self(PPI_RANGE.start + ppi)
    }

    /// SPI number `spi`, panics if the resulting ID is out of the SPI range.
    pub const fn spi(spi: u32) -> Self {
        assert!(spi < SPI_RANGE.end - SPI_RANGE.start, "Invalid SPI number");
        Self(SPI_RANGE.start + spi)
    }

    pub const fn is_sgi(&self) -> bool {
        self.0 < SGI_RANGE.end
    }

    pub const fn is_private(&self) -> bool {
        self.0 < PPI_RANGE.end
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for IntId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_sgi() {
            write!(f, "SGI {}", self.0 - SGI_RANGE.start)
        } else if self.is_private() {
            write!(f, "PPI {}", self.0 - PPI_RANGE.start)
        } else {
            write!(f, "SPI {}", self.0 - SPI_RANGE.start)
        }
    }
}

impl From<IntId> for u32 {
    fn from(value: IntId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Edge,
    Level,
}
