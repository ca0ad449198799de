use thiserror::Error;

use crate::window::WindowKind;

pub type Result<T = ()> = core::result::Result<T, VgicError>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VgicError {
    #[error("{0:?} window already assigned")]
    AlreadyAssigned(WindowKind),
    #[error("address {addr:#x} + size {size:#x} wraps around")]
    Overflow { addr: u64, size: u64 },
    #[error("address {0:#x} is not page aligned or exceeds the physical address range")]
    MisalignedOrTooLarge(u64),
    #[error("{0:?} window overlaps the other controller window")]
    Overlapping(WindowKind),
    #[error("no such address window kind: {0}")]
    NoSuchWindowKind(u64),
    #[error("invalid number of IRQs: {0}")]
    InvalidIrqCount(usize),
    #[error("invalid number of vCPUs: {0}")]
    InvalidCpuCount(usize),
    #[error("invalid number of list registers: {0}")]
    InvalidListRegisterCount(usize),
    #[error("invalid physical address width: {0} bits")]
    InvalidAddressBits(u32),
    #[error("vCPU {0} does not exist")]
    InvalidVcpu(usize),
    #[error("vCPU {0} interface already created")]
    VcpuAlreadyCreated(usize),
    #[error("{0:?} window has not been assigned")]
    AddressNotAssigned(WindowKind),
    #[error("controller already initialized")]
    AlreadyInitialized,
    #[error("failed to map the CPU interface: {0}")]
    CpuInterfaceMap(&'static str),
}
