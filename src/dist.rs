//! Emulated distributor state.
//!
//! Everything in here is protected by the distributor lock held in
//! [`crate::Vgic`]. The pending oracle (`pending_on_cpu`) is recomputed from
//! the bitmaps by [`DistState::update_state`] after each mutation, never
//! patched in place.

use alloc::{vec, vec::Vec};

use log::debug;
use tock_registers::{LocalRegisterCopy, register_bitfields};

use crate::{
    bitmap::{BitIter, IrqBitmap, IrqBytemap, assign_bit},
    config::VgicConfig,
    define::{NR_PRIVATE_IRQS, NR_SGIS, Trigger},
};

register_bitfields! [
    u32,
    /// Software Generated Interrupt Register
    pub SGIR [
        /// SGI interrupt ID
        SGIINTID OFFSET(0) NUMBITS(4) [],
        /// CPU target list
        CPUTargetList OFFSET(16) NUMBITS(8) [],
        /// Target list filter
        TargetListFilter OFFSET(24) NUMBITS(2) [
            /// Forward to CPUs listed in CPUTargetList
            TargetList = 0,
            /// Forward to all CPUs except the requesting CPU
            AllOther = 0b01,
            /// Forward only to the requesting CPU
            Current = 0b10,
            Reserved = 0b11,
        ],
    ],
];

/// Bits per CPU in a target register byte.
const CPUTARGETS_BITS: usize = 8;
const IRQS_PER_ITARGETSR: usize = 4;

/// Per-vCPU pending shadow, the result of the last oracle computation.
#[derive(Debug, Clone)]
pub struct CpuPending {
    pub percpu: u32,
    pub shared: Vec<u32>,
}

pub struct DistState {
    nr_cpus: usize,
    nr_irqs: usize,
    pub enabled: bool,

    pub irq_enabled: IrqBitmap,
    pub irq_state: IrqBitmap,
    pub irq_active: IrqBitmap,
    pub irq_cfg: IrqBitmap,
    pub irq_priority: IrqBytemap,

    /// Per vCPU, which SPIs it owns. Written through `set_spi_target` only.
    irq_spi_target: Vec<Vec<u32>>,
    /// Owner of each SPI. Written through `set_spi_target` only.
    irq_spi_cpu: Vec<u8>,

    /// Per destination vCPU and SGI, the mask of requesters not yet delivered.
    pub irq_sgi_sources: Vec<[u8; NR_SGIS]>,

    pub pending: Vec<CpuPending>,
    pending_on_cpu: u32,
}

impl DistState {
    pub fn new(config: &VgicConfig, nr_cpus: usize) -> Self {
        let nr_irqs = config.nr_irqs;
        let shared_words = config.nr_shared_irqs() / 32;
        let mut irq_spi_target = vec![vec![0u32; shared_words]; nr_cpus];
        // Until the guest says otherwise every SPI goes to vCPU 0.
        irq_spi_target[0].fill(u32::MAX);

        Self {
            nr_cpus,
            nr_irqs,
            enabled: false,
            irq_enabled: IrqBitmap::new(nr_cpus, nr_irqs),
            irq_state: IrqBitmap::new(nr_cpus, nr_irqs),
            irq_active: IrqBitmap::new(nr_cpus, nr_irqs),
            irq_cfg: IrqBitmap::new(nr_cpus, nr_irqs),
            irq_priority: IrqBytemap::new(nr_cpus, nr_irqs),
            irq_spi_target,
            irq_spi_cpu: vec![0; config.nr_shared_irqs()],
            irq_sgi_sources: vec![[0; NR_SGIS]; nr_cpus],
            pending: vec![
                CpuPending {
                    percpu: 0,
                    shared: vec![0; shared_words],
                };
                nr_cpus
            ],
            pending_on_cpu: 0,
        }
    }

    pub fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    pub fn nr_irqs(&self) -> usize {
        self.nr_irqs
    }

    pub fn is_enabled(&self, cpu: usize, irq: usize) -> bool {
        self.irq_enabled.get(cpu, irq)
    }

    pub fn is_pending(&self, cpu: usize, irq: usize) -> bool {
        self.irq_state.get(cpu, irq)
    }

    pub fn is_active(&self, cpu: usize, irq: usize) -> bool {
        self.irq_active.get(cpu, irq)
    }

    pub fn trigger(&self, cpu: usize, irq: usize) -> Trigger {
        if self.irq_cfg.get(cpu, irq) {
            Trigger::Edge
        } else {
            Trigger::Level
        }
    }

    pub fn is_edge(&self, cpu: usize, irq: usize) -> bool {
        self.trigger(cpu, irq) == Trigger::Edge
    }

    /// Set or clear `irq` in the pending shadow of `cpu`.
    pub fn set_cpu_pending(&mut self, cpu: usize, irq: usize, val: bool) {
        let pending = &mut self.pending[cpu];
        if irq < NR_PRIVATE_IRQS {
            if val {
                pending.percpu |= 1 << irq;
            } else {
                pending.percpu &= !(1 << irq);
            }
        } else {
            assign_bit(&mut pending.shared, irq - NR_PRIVATE_IRQS, val);
        }
    }

    pub fn spi_target(&self, irq: usize) -> usize {
        self.irq_spi_cpu[irq - NR_PRIVATE_IRQS] as usize
    }

    /// Route shared `irq` to `cpu`. This is the only writer of both the owner
    /// table and the per-vCPU target bitmaps.
    pub fn set_spi_target(&mut self, irq: usize, cpu: usize) {
        debug_assert!(irq >= NR_PRIVATE_IRQS && irq < self.nr_irqs);
        debug_assert!(cpu < self.nr_cpus);
        let spi = irq - NR_PRIVATE_IRQS;
        self.irq_spi_cpu[spi] = cpu as u8;
        for (c, target) in self.irq_spi_target.iter_mut().enumerate() {
            assign_bit(target, spi, c == cpu);
        }
    }

    #[cfg(test)]
    pub fn is_spi_targeted_at(&self, cpu: usize, irq: usize) -> bool {
        let spi = irq - NR_PRIVATE_IRQS;
        self.irq_spi_target[cpu][spi / 32] & (1 << (spi % 32)) != 0
    }

    /// ITARGETSR word for the four shared IRQs starting at `irq`.
    pub fn target_reg(&self, irq: usize) -> u32 {
        let mut val = 0;
        for i in 0..IRQS_PER_ITARGETSR {
            let Some(&cpu) = self.irq_spi_cpu.get(irq + i - NR_PRIVATE_IRQS) else {
                break;
            };
            val |= 1 << (cpu as usize + i * CPUTARGETS_BITS);
        }
        val
    }

    /// Store an ITARGETSR word. The lowest set bit of each byte picks the
    /// owner, an empty byte means vCPU 0.
    pub fn set_target_reg(&mut self, val: u32, irq: usize) {
        for i in 0..IRQS_PER_ITARGETSR {
            if irq + i >= self.nr_irqs {
                break;
            }
            let byte = (val >> (i * CPUTARGETS_BITS)) & 0xff;
            let mut target = if byte == 0 {
                0
            } else {
                byte.trailing_zeros() as usize
            };
            if target >= self.nr_cpus {
                target = 0;
            }
            self.set_spi_target(irq + i, target);
        }
    }

    /// Recompute the pending shadow of `cpu` and report whether it has
    /// anything to deliver.
    pub fn compute_pending_for_vcpu(&mut self, cpu: usize) -> bool {
        let percpu = self.irq_state.cpu_view(cpu) & self.irq_enabled.cpu_view(cpu);

        let state = self.irq_state.shared_view();
        let enabled = self.irq_enabled.shared_view();
        let target = &self.irq_spi_target[cpu];
        let pending = &mut self.pending[cpu];
        pending.percpu = percpu;
        let mut any = percpu != 0;
        for (i, word) in pending.shared.iter_mut().enumerate() {
            *word = state[i] & enabled[i] & target[i];
            any |= *word != 0;
        }
        any
    }

    /// Recompute the pending oracle of every vCPU.
    pub fn update_state(&mut self) {
        if !self.enabled {
            // Nothing is forwarded, let every vCPU poll again instead of
            // sleeping on an interrupt that cannot come.
            self.pending_on_cpu = (1 << self.nr_cpus) - 1;
            return;
        }

        for cpu in 0..self.nr_cpus {
            if self.compute_pending_for_vcpu(cpu) {
                self.pending_on_cpu |= 1 << cpu;
            } else {
                self.pending_on_cpu &= !(1 << cpu);
            }
        }
    }

    pub fn pending_on_cpu(&self, cpu: usize) -> bool {
        self.pending_on_cpu & (1 << cpu) != 0
    }

    pub fn pending_cpus(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nr_cpus).filter(|&cpu| self.pending_on_cpu(cpu))
    }

    /// Flush and sync hand the oracle bit over directly once list registers
    /// have consumed, or failed to consume, the shadow.
    pub(crate) fn set_pending_on_cpu(&mut self, cpu: usize, val: bool) {
        if val {
            self.pending_on_cpu |= 1 << cpu;
        } else {
            self.pending_on_cpu &= !(1 << cpu);
        }
    }

    /// Decode a guest GICD_SGIR write from `requester` and mark the SGI
    /// pending on every selected vCPU.
    pub fn dispatch_sgi(&mut self, requester: usize, reg: u32) {
        let reg = LocalRegisterCopy::<u32, SGIR::Register>::new(reg);
        let sgi = reg.read(SGIR::SGIINTID) as usize;
        let online = ((1u32 << self.nr_cpus) - 1) as u8;

        let targets = match reg.read_as_enum(SGIR::TargetListFilter) {
            Some(SGIR::TargetListFilter::Value::TargetList) => {
                reg.read(SGIR::CPUTargetList) as u8 & online
            }
            Some(SGIR::TargetListFilter::Value::AllOther) => online & !(1 << requester),
            Some(SGIR::TargetListFilter::Value::Current) => 1 << requester,
            _ => {
                debug!("SGI{sgi} from CPU{requester} uses reserved filter, ignored");
                return;
            }
        };

        for cpu in BitIter::new(&[targets as u32]) {
            self.irq_state.set(cpu, sgi, true);
            self.irq_sgi_sources[cpu][sgi] |= 1 << requester;
            debug!("SGI{sgi} from CPU{requester} to CPU{cpu}");
        }
    }

    /// Drive the line of `irq` to `level`. `cpu` selects the bank for
    /// private IRQs. Returns whether the distributor state changed.
    pub fn set_irq_level(&mut self, cpu: usize, irq: usize, level: bool) -> bool {
        let edge = self.is_edge(cpu, irq);
        let state = self.irq_state.get(cpu, irq);

        // Level: only a change of level matters. Edge: only a rising edge
        // on an idle line.
        if (!edge && state == level) || (edge && (!level || state)) {
            return false;
        }

        debug!("IRQ{irq} level {level} on CPU{cpu}");
        self.irq_state.set(cpu, irq, level);
        self.update_state();
        true
    }

    /// The vCPU that delivers `irq` when raised through `cpu`'s bank.
    pub fn owner(&self, cpu: usize, irq: usize) -> usize {
        if irq < NR_PRIVATE_IRQS {
            cpu
        } else {
            self.spi_target(irq)
        }
    }
}
