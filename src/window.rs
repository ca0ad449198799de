use core::fmt::Display;

use log::debug;

use crate::{
    define::{CPU_SIZE, DIST_SIZE},
    error::{Result, VgicError},
};

const PAGE_MASK: u64 = 0xfff;

/// The two guest physical windows of a virtual GICv2.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Distributor = 0,
    CpuInterface = 1,
}

impl WindowKind {
    pub const fn size(self) -> u64 {
        match self {
            WindowKind::Distributor => DIST_SIZE,
            WindowKind::CpuInterface => CPU_SIZE,
        }
    }

    const fn other(self) -> Self {
        match self {
            WindowKind::Distributor => WindowKind::CpuInterface,
            WindowKind::CpuInterface => WindowKind::Distributor,
        }
    }
}

impl TryFrom<u64> for WindowKind {
    type Error = VgicError;

    fn try_from(value: u64) -> Result<Self> {
        match value {
            0 => Ok(WindowKind::Distributor),
            1 => Ok(WindowKind::CpuInterface),
            _ => Err(VgicError::NoSuchWindowKind(value)),
        }
    }
}

impl Display for WindowKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WindowKind::Distributor => write!(f, "GICD"),
            WindowKind::CpuInterface => write!(f, "GICC"),
        }
    }
}

/// Write-once base addresses of the distributor and CPU interface.
#[derive(Debug, Clone, Default)]
pub struct AddrWindows {
    dist: Option<u64>,
    cpu: Option<u64>,
}

impl AddrWindows {
    pub const fn new() -> Self {
        Self {
            dist: None,
            cpu: None,
        }
    }

    pub fn get(&self, kind: WindowKind) -> Option<u64> {
        match kind {
            WindowKind::Distributor => self.dist,
            WindowKind::CpuInterface => self.cpu,
        }
    }

    fn slot(&mut self, kind: WindowKind) -> &mut Option<u64> {
        match kind {
            WindowKind::Distributor => &mut self.dist,
            WindowKind::CpuInterface => &mut self.cpu,
        }
    }

    /// Commit the base of `kind`. Nothing changes if any check fails.
    pub fn assign(&mut self, kind: WindowKind, addr: u64, phys_mask: u64) -> Result {
        let size = kind.size();

        if self.get(kind).is_some() {
            return Err(VgicError::AlreadyAssigned(kind));
        }
        let Some(end) = addr.checked_add(size) else {
            return Err(VgicError::Overflow { addr, size });
        };
        if addr & PAGE_MASK != 0 || addr & !phys_mask != 0 {
            return Err(VgicError::MisalignedOrTooLarge(addr));
        }

        let other = kind.other();
        if let Some(base) = self.get(other) {
            let other_end = base + other.size();
            if addr < other_end && base < end {
                return Err(VgicError::Overlapping(kind));
            }
        }

        debug!("{kind} window at [{addr:#x}, {end:#x})");
        *self.slot(kind) = Some(addr);
        Ok(())
    }

    /// Whether `[addr, addr + len)` lies entirely inside the window of `kind`.
    pub fn contains(&self, kind: WindowKind, addr: u64, len: usize) -> bool {
        let Some(base) = self.get(kind) else {
            return false;
        };
        match addr.checked_add(len as u64) {
            Some(end) => addr >= base && end <= base + kind.size(),
            None => false,
        }
    }
}
