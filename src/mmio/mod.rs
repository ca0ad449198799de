//! Guest accesses to the emulated distributor window.

use enum_dispatch::enum_dispatch;

use crate::{access::MmioAccess, dist::DistState};

mod handlers;

pub use handlers::*;

/// Outcome of [`crate::Vgic::handle_mmio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioResult {
    /// The access was emulated, or turned into a guest data abort.
    Handled,
    /// Not ours, the caller should try another emulation path.
    NotHandled,
}

/// Emulation of one distributor register array.
#[enum_dispatch]
pub trait RegisterHandler {
    /// Perform `access` at `offset` bytes into the register array on behalf
    /// of `vcpu`. Returns `true` when pending state may have changed and
    /// vCPUs need a kick.
    fn handle(
        &self,
        dist: &mut DistState,
        vcpu: usize,
        access: &mut MmioAccess,
        offset: u64,
    ) -> bool;
}

#[enum_dispatch(RegisterHandler)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistRegister {
    Misc,
    RazWi,
    SetEnable,
    ClearEnable,
    SetPending,
    ClearPending,
    Priority,
    Target,
    Config,
    Sgi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioRange {
    pub offset: u64,
    pub len: u64,
    pub handler: DistRegister,
}

impl MmioRange {
    const fn new(offset: u64, len: u64, handler: DistRegister) -> Self {
        Self {
            offset,
            len,
            handler,
        }
    }
}

pub const GICD_CTLR: u64 = 0x000;
pub const GICD_IGROUPR: u64 = 0x080;
pub const GICD_ISENABLER: u64 = 0x100;
pub const GICD_ICENABLER: u64 = 0x180;
pub const GICD_ISPENDR: u64 = 0x200;
pub const GICD_ICPENDR: u64 = 0x280;
pub const GICD_ISACTIVER: u64 = 0x300;
pub const GICD_ICACTIVER: u64 = 0x380;
pub const GICD_IPRIORITYR: u64 = 0x400;
pub const GICD_ITARGETSR: u64 = 0x800;
pub const GICD_ICFGR: u64 = 0xc00;
pub const GICD_SGIR: u64 = 0xf00;

/// Register layout of a distributor with `nr_irqs` lines, in address order.
pub fn dist_ranges(nr_irqs: usize) -> [MmioRange; 12] {
    let bits = nr_irqs as u64 / 8;
    let bytes = nr_irqs as u64;
    [
        MmioRange::new(GICD_CTLR, 12, DistRegister::Misc(Misc)),
        MmioRange::new(GICD_IGROUPR, bits, DistRegister::RazWi(RazWi)),
        MmioRange::new(GICD_ISENABLER, bits, DistRegister::SetEnable(SetEnable)),
        MmioRange::new(GICD_ICENABLER, bits, DistRegister::ClearEnable(ClearEnable)),
        MmioRange::new(GICD_ISPENDR, bits, DistRegister::SetPending(SetPending)),
        MmioRange::new(GICD_ICPENDR, bits, DistRegister::ClearPending(ClearPending)),
        MmioRange::new(GICD_ISACTIVER, bits, DistRegister::RazWi(RazWi)),
        MmioRange::new(GICD_ICACTIVER, bits, DistRegister::RazWi(RazWi)),
        MmioRange::new(GICD_IPRIORITYR, bytes, DistRegister::Priority(Priority)),
        MmioRange::new(GICD_ITARGETSR, bytes, DistRegister::Target(Target)),
        MmioRange::new(GICD_ICFGR, bytes / 4, DistRegister::Config(Config)),
        MmioRange::new(GICD_SGIR, 4, DistRegister::Sgi(Sgi)),
    ]
}

/// The range holding the whole access `[addr, addr + len)` of a window at
/// `base`.
pub fn find_range(table: &[MmioRange], addr: u64, len: usize, base: u64) -> Option<&MmioRange> {
    let offset = addr.checked_sub(base)?;
    let end = offset.checked_add(len as u64)?;
    table
        .iter()
        .find(|r| offset >= r.offset && end <= r.offset + r.len)
}
