//! GICv2 hypervisor interface (GICH) and list register encoding.

use core::fmt::Debug;

use tock_registers::{
    LocalRegisterCopy, interfaces::*, register_bitfields, register_structs, registers::*,
};

register_structs! {
    /// GIC Hypervisor Interface Control registers.
    #[allow(non_snake_case)]
    pub HypervisorRegs {
        /// Hypervisor Control Register
        (0x000 => pub HCR: ReadWrite<u32, HCR::Register>),
        /// VGIC Type Register
        (0x004 => pub VTR: ReadOnly<u32, VTR::Register>),
        /// Virtual Machine Control Register
        (0x008 => pub VMCR: ReadWrite<u32>),
        (0x00c => _reserved_1),
        /// Maintenance Interrupt Status Register
        (0x010 => pub MISR: ReadOnly<u32, MISR::Register>),
        (0x014 => _reserved_2),
        /// End of Interrupt Status Registers
        (0x020 => pub EISR0: ReadOnly<u32>),
        (0x024 => pub EISR1: ReadOnly<u32>),
        (0x028 => _reserved_3),
        /// Empty List Register Status Registers
        (0x030 => pub ELRSR0: ReadOnly<u32>),
        (0x034 => pub ELRSR1: ReadOnly<u32>),
        (0x038 => _reserved_4),
        /// Active Priorities Register
        (0x0f0 => pub APR: ReadWrite<u32>),
        (0x0f4 => _reserved_5),
        /// List Registers
        (0x100 => pub LR: [ReadWrite<u32, LR::Register>; 64]),
        (0x200 => @END),
    }
}

register_bitfields! [
    u32,
    /// Hypervisor Control Register
    pub HCR [
        /// Global enable bit for the virtual CPU interface
        En OFFSET(0) NUMBITS(1) [],
        /// Underflow Interrupt Enable
        UIE OFFSET(1) NUMBITS(1) [],
        /// List Register Entry Not Present Interrupt Enable
        LRENPIE OFFSET(2) NUMBITS(1) [],
        /// No Pending Interrupt Enable
        NPIE OFFSET(3) NUMBITS(1) [],
        /// EOI Count
        EOICount OFFSET(27) NUMBITS(5) [],
    ],

    /// VGIC Type Register
    pub VTR [
        /// Number of implemented List registers minus one
        ListRegs OFFSET(0) NUMBITS(6) [],
        /// Number of preemption bits implemented minus one
        PREbits OFFSET(26) NUMBITS(3) [],
        /// Number of priority bits implemented minus one
        PRIbits OFFSET(29) NUMBITS(3) [],
    ],

    /// Maintenance Interrupt Status Register
    pub MISR [
        /// EOI maintenance interrupt
        EOI OFFSET(0) NUMBITS(1) [],
        /// Underflow maintenance interrupt
        U OFFSET(1) NUMBITS(1) [],
        /// List Register Entry Not Present maintenance interrupt
        LRENP OFFSET(2) NUMBITS(1) [],
        /// No Pending maintenance interrupt
        NP OFFSET(3) NUMBITS(1) [],
    ],

    /// List Register
    pub LR [
        /// Virtual ID
        VirtualID OFFSET(0) NUMBITS(10) [],
        /// Source CPU of an SGI (when HW=0)
        CPUID OFFSET(10) NUMBITS(3) [],
        /// Raise a maintenance interrupt on EOI (when HW=0)
        EOI OFFSET(19) NUMBITS(1) [],
        /// Priority
        Priority OFFSET(23) NUMBITS(5) [],
        /// State
        State OFFSET(28) NUMBITS(2) [
            Invalid = 0b00,
            Pending = 0b01,
            Active = 0b10,
            PendingAndActive = 0b11,
        ],
        /// Group 1
        Grp1 OFFSET(30) NUMBITS(1) [],
        /// Hardware interrupt
        HW OFFSET(31) NUMBITS(1) [],
    ],
];

/// Number of list registers the hardware implements.
pub fn nr_list_registers(regs: &HypervisorRegs) -> usize {
    regs.VTR.read(VTR::ListRegs) as usize + 1
}

/// One list register value.
#[derive(Clone, Copy)]
pub struct ListRegister(LocalRegisterCopy<u32, LR::Register>);

impl ListRegister {
    pub fn empty() -> Self {
        Self(LocalRegisterCopy::new(0))
    }

    /// A pending software interrupt `irq`, `source` is the requesting CPU
    /// for SGIs and 0 otherwise.
    pub fn pending(source: u8, irq: u32) -> Self {
        assert!(source < 8, "Invalid SGI source: {source}");
        let mut lr = Self::empty();
        lr.0.write(
            LR::VirtualID.val(irq)
                + LR::CPUID.val(source as u32)
                + LR::State::Pending,
        );
        lr
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(LocalRegisterCopy::new(bits))
    }

    pub fn bits(&self) -> u32 {
        self.0.get()
    }

    pub fn virtual_id(&self) -> u32 {
        self.0.read(LR::VirtualID)
    }

    pub fn source(&self) -> u8 {
        self.0.read(LR::CPUID) as u8
    }

    pub fn eoi(&self) -> bool {
        self.0.is_set(LR::EOI)
    }

    pub fn set_eoi(&mut self, eoi: bool) {
        self.0.modify(if eoi { LR::EOI::SET } else { LR::EOI::CLEAR });
    }

    pub fn is_pending(&self) -> bool {
        self.0.read(LR::State) & 0b01 != 0
    }

    pub fn is_active(&self) -> bool {
        self.0.read(LR::State) & 0b10 != 0
    }

    /// Add the pending state, keeping an active one.
    pub fn mark_pending(&mut self) {
        let state = self.0.read(LR::State) | 0b01;
        self.0.modify(LR::State.val(state));
    }
}

impl PartialEq for ListRegister {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for ListRegister {}

impl Default for ListRegister {
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for ListRegister {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListRegister")
            .field("irq", &self.virtual_id())
            .field("source", &self.source())
            .field("pending", &self.is_pending())
            .field("active", &self.is_active())
            .field("eoi", &self.eoi())
            .finish()
    }
}
