#![no_std]

extern crate alloc;
extern crate core;

mod access;
mod bitmap;
mod config;
pub(crate) mod define;
mod dist;
mod error;
pub mod gich;
mod host;
mod mmio;
mod vcpu;
mod vgic;
mod window;

#[cfg(test)]
mod tests;

pub use access::MmioAccess;
pub use config::VgicConfig;
pub use define::{CPU_SIZE, DIST_SIZE, IntId, MAX_CPUS, Trigger};
pub use error::{Result, VgicError};
pub use gich::{HypervisorRegs, ListRegister};
pub use host::HostOps;
pub use mmio::MmioResult;
pub use vcpu::VgicCpu;
pub use vgic::Vgic;
pub use window::WindowKind;
