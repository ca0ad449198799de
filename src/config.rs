use crate::{
    define::{MAX_CPUS, NR_PRIVATE_IRQS},
    error::{Result, VgicError},
    gich::{self, HypervisorRegs},
};

/// Static shape of a virtual GIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VgicConfig {
    /// Number of interrupt lines the guest sees, including the 32 private ones.
    pub nr_irqs: usize,
    /// Number of hardware list registers per CPU.
    pub nr_list_regs: usize,
    /// Width of a guest physical address, bounds the address windows.
    pub phys_addr_bits: u32,
}

impl Default for VgicConfig {
    fn default() -> Self {
        Self {
            nr_irqs: 128,
            nr_list_regs: 4,
            phys_addr_bits: 40,
        }
    }
}

impl VgicConfig {
    pub fn nr_irqs(mut self, nr_irqs: usize) -> Self {
        self.nr_irqs = nr_irqs;
        self
    }

    pub fn nr_list_regs(mut self, nr: usize) -> Self {
        self.nr_list_regs = nr;
        self
    }

    pub fn phys_addr_bits(mut self, bits: u32) -> Self {
        self.phys_addr_bits = bits;
        self
    }

    /// Take the list register count from `GICH_VTR`.
    pub fn with_hw_list_regs(self, gich: &HypervisorRegs) -> Self {
        self.nr_list_regs(gich::nr_list_registers(gich))
    }

    pub fn nr_shared_irqs(&self) -> usize {
        self.nr_irqs - NR_PRIVATE_IRQS
    }

    /// Mask of valid guest physical address bits.
    pub fn phys_mask(&self) -> u64 {
        (1u64 << self.phys_addr_bits) - 1
    }

    pub fn validate(&self) -> Result {
        if self.nr_irqs % 32 != 0 || !(64..=1024).contains(&self.nr_irqs) {
            return Err(VgicError::InvalidIrqCount(self.nr_irqs));
        }
        if !(1..=64).contains(&self.nr_list_regs) {
            return Err(VgicError::InvalidListRegisterCount(self.nr_list_regs));
        }
        if !(32..=52).contains(&self.phys_addr_bits) {
            return Err(VgicError::InvalidAddressBits(self.phys_addr_bits));
        }
        Ok(())
    }

    pub(crate) fn validate_cpus(nr_cpus: usize) -> Result {
        if nr_cpus == 0 || nr_cpus > MAX_CPUS {
            return Err(VgicError::InvalidCpuCount(nr_cpus));
        }
        Ok(())
    }
}
