//! Per-vCPU list register bookkeeping.
//!
//! A [`VgicCpu`] shadows the GICH state of one vCPU while it is scheduled
//! out. It is only ever touched by the thread running that vCPU, so it is
//! `Send` but not `Sync` and every mutation goes through `&mut self`.

use alloc::{vec, vec::Vec};
use core::{cell::Cell, marker::PhantomData};

use log::{trace, warn};
use tock_registers::{LocalRegisterCopy, interfaces::*};

use crate::{
    bitmap::BitIter,
    define::{LR_EMPTY, NR_PRIVATE_IRQS, NR_SGIS},
    dist::DistState,
    gich::{HCR, HypervisorRegs, ListRegister, MISR},
};

pub struct VgicCpu {
    id: usize,
    nr_lr: usize,
    /// Which IRQ sits in which list register, `LR_EMPTY` if none.
    pub(crate) irq_lr_map: Vec<u8>,
    pub(crate) lr: Vec<ListRegister>,
    /// List registers allocated to an IRQ, one bit each.
    pub(crate) lr_used: u64,

    pub(crate) hcr: LocalRegisterCopy<u32, HCR::Register>,
    pub(crate) vmcr: u32,
    pub(crate) misr: LocalRegisterCopy<u32, MISR::Register>,
    pub(crate) eisr: u64,
    pub(crate) elrsr: u64,
    pub(crate) apr: u32,

    _not_sync: PhantomData<Cell<()>>,
}

impl VgicCpu {
    pub(crate) fn new(id: usize, nr_lr: usize, nr_irqs: usize) -> Self {
        let mut cpu = Self {
            id,
            nr_lr,
            irq_lr_map: vec![LR_EMPTY; nr_irqs],
            lr: vec![ListRegister::empty(); nr_lr],
            lr_used: 0,
            hcr: LocalRegisterCopy::new(0),
            vmcr: 0,
            misr: LocalRegisterCopy::new(0),
            eisr: 0,
            elrsr: 0,
            apr: 0,
            _not_sync: PhantomData,
        };
        // Nothing queued yet, every list register reads as empty.
        cpu.elrsr = cpu.lr_mask();
        cpu.hcr.modify(HCR::En::SET);
        cpu
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn nr_list_regs(&self) -> usize {
        self.nr_lr
    }

    /// Shadow copies of the list registers.
    pub fn list_registers(&self) -> &[ListRegister] {
        &self.lr
    }

    /// The list register currently holding `irq`, if any.
    pub fn lr_for(&self, irq: usize) -> Option<usize> {
        match self.irq_lr_map.get(irq) {
            Some(&lr) if lr != LR_EMPTY => Some(lr as usize),
            _ => None,
        }
    }

    pub fn is_lr_used(&self, lr: usize) -> bool {
        self.lr_used & (1 << lr) != 0
    }

    /// Whether the underflow maintenance interrupt is requested, i.e. the
    /// last flush ran out of list registers.
    pub fn underflow_requested(&self) -> bool {
        self.hcr.is_set(HCR::UIE)
    }

    fn lr_mask(&self) -> u64 {
        if self.nr_lr >= 64 {
            u64::MAX
        } else {
            (1 << self.nr_lr) - 1
        }
    }

    fn lr_bits(&self, mask: u64) -> impl Iterator<Item = usize> + use<> {
        let mask = mask & self.lr_mask();
        (0..self.nr_lr).filter(move |&lr| mask & (1 << lr) != 0)
    }

    /// The list register already holding `irq` from `source`.
    ///
    /// The reverse map only remembers the newest list register of an SGI, an
    /// older one with a different source may still be live.
    fn find_lr(&self, irq: usize, source: u8) -> Option<usize> {
        let holds = |lr: usize| {
            self.is_lr_used(lr)
                && self.lr[lr].virtual_id() as usize == irq
                && self.lr[lr].source() == source
        };
        match self.lr_for(irq) {
            Some(lr) if self.lr[lr].source() == source => Some(lr),
            _ if irq < NR_SGIS => (0..self.nr_lr).find(|&lr| holds(lr)),
            _ => None,
        }
    }

    /// Put `irq` into a list register. `source` is the requesting CPU for
    /// SGIs and 0 for everything else.
    ///
    /// Returns `false` if every list register is taken.
    pub(crate) fn queue_irq(&mut self, dist: &DistState, source: u8, irq: usize) -> bool {
        assert!(source < 8, "Invalid SGI source: {source}");
        assert!(source == 0 || irq < NR_SGIS, "Only SGIs carry a source");

        trace!("Queue IRQ{irq} from CPU{source} on CPU{}", self.id);

        let lr = if let Some(lr) = self.find_lr(irq, source) {
            trace!("LR{lr} piggyback for IRQ{irq}");
            debug_assert!(self.is_lr_used(lr));
            self.lr[lr].mark_pending();
            lr
        } else {
            let Some(lr) = (0..self.nr_lr).find(|&lr| !self.is_lr_used(lr)) else {
                return false;
            };

            trace!("LR{lr} allocated for IRQ{irq}:{source}");
            self.lr[lr] = ListRegister::pending(source, irq as u32);
            self.irq_lr_map[irq] = lr as u8;
            self.lr_used |= 1 << lr;
            lr
        };

        // Level IRQs ask for an EOI maintenance interrupt, piggybacked or not.
        if !dist.is_edge(self.id, irq) {
            self.lr[lr].set_eoi(true);
        }
        true
    }

    /// Queue one list register per CPU that raised `sgi` here. Returns
    /// `true` once every source is delivered.
    pub(crate) fn queue_sgi(&mut self, dist: &mut DistState, sgi: usize) -> bool {
        let cpu = self.id;
        let mut sources = dist.irq_sgi_sources[cpu][sgi];

        for source in BitIter::new(&[sources as u32]) {
            if self.queue_irq(dist, source as u8, sgi) {
                sources &= !(1 << source);
            }
        }

        dist.irq_sgi_sources[cpu][sgi] = sources;
        if sources == 0 {
            dist.irq_state.set(cpu, sgi, false);
            dist.set_cpu_pending(cpu, sgi, false);
            return true;
        }
        false
    }

    /// Queue a PPI or SPI.
    pub(crate) fn queue_hwirq(&mut self, dist: &mut DistState, irq: usize) -> bool {
        let cpu = self.id;
        // Level IRQ still in the guest's hands.
        if dist.is_active(cpu, irq) {
            return true;
        }

        if !self.queue_irq(dist, 0, irq) {
            return false;
        }

        if dist.is_edge(cpu, irq) {
            dist.irq_state.set(cpu, irq, false);
            dist.set_cpu_pending(cpu, irq, false);
        } else {
            dist.irq_active.set(cpu, irq, true);
        }
        true
    }

    /// Move the pending shadow into list registers.
    pub(crate) fn flush(&mut self, dist: &mut DistState) {
        let cpu = self.id;
        let mut overflow = false;

        if dist.pending_on_cpu(cpu) {
            let pending = dist.pending[cpu].clone();

            for sgi in BitIter::new(&[pending.percpu & 0xffff]) {
                if !self.queue_sgi(dist, sgi) {
                    overflow = true;
                }
            }
            for ppi in BitIter::new(&[pending.percpu & 0xffff_0000]) {
                if !self.queue_hwirq(dist, ppi) {
                    overflow = true;
                }
            }
            for spi in BitIter::new(&pending.shared) {
                if !self.queue_hwirq(dist, spi + NR_PRIVATE_IRQS) {
                    overflow = true;
                }
            }
        }

        if overflow {
            trace!("CPU{cpu} out of list registers");
            self.hcr.modify(HCR::UIE::SET);
        } else {
            self.hcr.modify(HCR::UIE::CLEAR);
            dist.set_pending_on_cpu(cpu, false);
        }
    }

    /// Handle EOI and underflow notifications. Returns whether a level IRQ
    /// the guest just completed is still asserted.
    fn process_maintenance(&mut self, dist: &mut DistState) -> bool {
        let cpu = self.id;
        let mut level_pending = false;

        trace!("CPU{cpu} MISR = {:#x}", self.misr.get());

        if self.misr.is_set(MISR::EOI) {
            for lr in self.lr_bits(self.eisr) {
                let irq = self.lr[lr].virtual_id() as usize;
                if irq >= dist.nr_irqs() {
                    warn!("CPU{cpu} LR{lr} holds unknown IRQ{irq}");
                    continue;
                }

                dist.irq_active.set(cpu, irq, false);
                self.lr[lr].set_eoi(false);

                // Still asserted, deliver it again.
                if dist.is_pending(cpu, irq) {
                    dist.set_cpu_pending(cpu, irq, true);
                    level_pending = true;
                } else {
                    dist.set_cpu_pending(cpu, irq, false);
                }
            }
        }

        if self.misr.is_set(MISR::U) {
            self.hcr.modify(HCR::UIE::CLEAR);
        }

        level_pending
    }

    /// Reclaim the list registers the guest is done with.
    pub(crate) fn sync(&mut self, dist: &mut DistState) {
        let cpu = self.id;
        let level_pending = self.process_maintenance(dist);

        for lr in self.lr_bits(self.elrsr) {
            if !self.is_lr_used(lr) {
                continue;
            }
            self.lr_used &= !(1 << lr);

            let irq = self.lr[lr].virtual_id() as usize;
            // A newer LR may hold another source of the same SGI.
            if self.irq_lr_map.get(irq) == Some(&(lr as u8)) {
                self.irq_lr_map[irq] = LR_EMPTY;
            }
            self.lr[lr] = ListRegister::empty();
            trace!("CPU{cpu} LR{lr} reclaimed from IRQ{irq}");
        }

        let lr_busy = self.elrsr & self.lr_mask() != self.lr_mask();
        if level_pending || lr_busy {
            dist.set_pending_on_cpu(cpu, true);
        }
    }

    /// Capture the hypervisor interface state on exit from the guest and
    /// turn the virtual CPU interface off.
    pub fn save_state(&mut self, regs: &HypervisorRegs) {
        self.hcr.set(regs.HCR.get());
        self.vmcr = regs.VMCR.get();
        self.misr.set(regs.MISR.get());
        self.eisr = regs.EISR0.get() as u64 | (regs.EISR1.get() as u64) << 32;
        self.elrsr = regs.ELRSR0.get() as u64 | (regs.ELRSR1.get() as u64) << 32;
        self.apr = regs.APR.get();

        for (lr, reg) in self.lr.iter_mut().zip(regs.LR.iter()) {
            *lr = ListRegister::from_bits(reg.get());
        }

        regs.HCR.set(0);
    }

    /// Load the shadow state into the hypervisor interface before entering
    /// the guest.
    pub fn restore_state(&self, regs: &HypervisorRegs) {
        regs.HCR.set(self.hcr.get());
        regs.VMCR.set(self.vmcr);
        regs.APR.set(self.apr);

        for (lr, reg) in self.lr.iter().zip(regs.LR.iter()) {
            reg.set(lr.bits());
        }

        #[cfg(target_arch = "aarch64")]
        aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);
    }
}

impl core::fmt::Debug for VgicCpu {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VgicCpu")
            .field("id", &self.id)
            .field("lr_used", &format_args!("{:#x}", self.lr_used))
            .field("hcr", &format_args!("{:#x}", self.hcr.get()))
            .field("lr", &&self.lr[..])
            .finish()
    }
}
