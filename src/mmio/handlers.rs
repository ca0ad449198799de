use log::trace;
use tock_registers::{LocalRegisterCopy, register_bitfields};

use super::RegisterHandler;
use crate::{
    access::{AccessMode, MmioAccess, cfg_compress, cfg_expand, reg_access},
    define::NR_PRIVATE_IRQS,
    dist::DistState,
};

register_bitfields! [
    u32,
    CTLR [
        EnableGrp0 OFFSET(0) NUMBITS(1) [],
    ],
    TYPER [
        ITLinesNumber OFFSET(0) NUMBITS(5) [],
        CPUNumber OFFSET(5) NUMBITS(3) [],
    ],
    IIDR [
        Implementer OFFSET(0) NUMBITS(12) [],
        Revision OFFSET(12) NUMBITS(4) [],
        Variant OFFSET(16) NUMBITS(4) [],
        ProductId OFFSET(24) NUMBITS(8) [],
    ],
];

/// ARM as implementer.
const IMPLEMENTER_ARM: u32 = 0x43b;
const PRODUCT_ID: u32 = 0x4b;

/// GICD_CTLR, GICD_TYPER and GICD_IIDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Misc;

impl RegisterHandler for Misc {
    fn handle(
        &self,
        dist: &mut DistState,
        _vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        match offset & !3 {
            0x0 => {
                let mut reg = CTLR::EnableGrp0.val(dist.enabled as u32).value;
                reg_access(access, Some(&mut reg), offset, AccessMode::VALUE_VALUE);
                if access.is_write {
                    let ctlr = LocalRegisterCopy::<u32, CTLR::Register>::new(reg);
                    dist.enabled = ctlr.is_set(CTLR::EnableGrp0);
                    trace!("GICD_CTLR enable={}", dist.enabled);
                    dist.update_state();
                    return true;
                }
            }
            0x4 => {
                let mut reg = (TYPER::ITLinesNumber.val((dist.nr_irqs() / 32 - 1) as u32)
                    + TYPER::CPUNumber.val((dist.nr_cpus() - 1) as u32))
                .value;
                reg_access(access, Some(&mut reg), offset, AccessMode::VALUE_WI);
            }
            _ => {
                let mut reg = (IIDR::Implementer.val(IMPLEMENTER_ARM)
                    + IIDR::ProductId.val(PRODUCT_ID))
                .value;
                reg_access(access, Some(&mut reg), offset, AccessMode::VALUE_WI);
            }
        }
        false
    }
}

/// Registers that are not emulated: groups and active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RazWi;

impl RegisterHandler for RazWi {
    fn handle(&self, _: &mut DistState, _: usize, access: &mut MmioAccess, offset: u64) -> bool {
        reg_access(access, None, offset, AccessMode::RAZ_WI);
        false
    }
}

/// GICD_ISENABLER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetEnable;

impl RegisterHandler for SetEnable {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        let reg = dist.irq_enabled.reg(vcpu, offset);
        reg_access(access, Some(reg), offset, AccessMode::VALUE_SETBIT);
        if access.is_write {
            dist.update_state();
            return true;
        }
        false
    }
}

/// GICD_ICENABLER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearEnable;

impl RegisterHandler for ClearEnable {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        let reg = dist.irq_enabled.reg(vcpu, offset);
        reg_access(access, Some(&mut *reg), offset, AccessMode::VALUE_CLEARBIT);
        if access.is_write {
            if offset < 4 {
                // SGIs cannot be disabled.
                *reg |= 0xffff;
            }
            dist.update_state();
            return true;
        }
        false
    }
}

/// GICD_ISPENDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPending;

impl RegisterHandler for SetPending {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        let reg = dist.irq_state.reg(vcpu, offset);
        reg_access(access, Some(reg), offset, AccessMode::VALUE_SETBIT);
        if access.is_write {
            dist.update_state();
            return true;
        }
        false
    }
}

/// GICD_ICPENDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearPending;

impl RegisterHandler for ClearPending {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        let reg = dist.irq_state.reg(vcpu, offset);
        reg_access(access, Some(reg), offset, AccessMode::VALUE_CLEARBIT);
        if access.is_write {
            dist.update_state();
            return true;
        }
        false
    }
}

/// GICD_IPRIORITYR. Stored for the guest, not used for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority;

impl RegisterHandler for Priority {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        let reg = dist.irq_priority.reg(vcpu, offset);
        reg_access(access, Some(reg), offset, AccessMode::VALUE_VALUE);
        false
    }
}

/// GICD_ITARGETSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target;

impl RegisterHandler for Target {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        // Private IRQs always target the accessing CPU.
        if offset < NR_PRIVATE_IRQS as u64 {
            let mut roreg = 1u32 << vcpu;
            roreg |= roreg << 8;
            roreg |= roreg << 16;
            reg_access(access, Some(&mut roreg), offset, AccessMode::VALUE_WI);
            return false;
        }

        let irq = (offset & !3) as usize;
        let mut reg = dist.target_reg(irq);
        reg_access(access, Some(&mut reg), offset, AccessMode::VALUE_VALUE);
        if access.is_write {
            dist.set_target_reg(reg, irq);
            dist.update_state();
            return true;
        }
        false
    }
}

/// GICD_ICFGR. Only the edge/level bit of each field is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config;

impl RegisterHandler for Config {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        // Two ICFGR words per backing word.
        let reg = dist.irq_cfg.reg(vcpu, offset >> 1);
        let upper = offset & 4 != 0;
        let half = if upper { *reg >> 16 } else { *reg & 0xffff };
        let mut val = cfg_expand(half as u16);

        reg_access(access, Some(&mut val), offset, AccessMode::VALUE_VALUE);
        if access.is_write {
            if offset >> 1 < 4 {
                // Both private words: SGIs and PPIs are hardwired edge.
                *reg = !0;
                return false;
            }

            let val = cfg_compress(val) as u32;
            if upper {
                *reg = (*reg & 0xffff) | (val << 16);
            } else {
                *reg = (*reg & 0xffff_0000) | val;
            }
        }
        false
    }
}

/// GICD_SGIR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sgi;

impl RegisterHandler for Sgi {
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool {
        let mut reg = 0;
        reg_access(access, Some(&mut reg), offset, AccessMode::RAZ_VALUE);
        if access.is_write {
            dist.dispatch_sgi(vcpu, reg);
            dist.update_state();
            return true;
        }
        false
    }
}
