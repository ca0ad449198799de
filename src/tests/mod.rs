extern crate std;

use core::cell::RefCell;
use std::vec::Vec;

use crate::{HostOps, IntId, MmioAccess, MmioResult, Vgic, VgicConfig, VgicCpu, WindowKind};

mod mmio;

pub const DIST_BASE: u64 = 0x0800_0000;
pub const CPU_BASE: u64 = 0x0801_0000;

/// Records everything the vGIC asks of the hypervisor.
#[derive(Default)]
pub struct MockHost {
    pub aborts: RefCell<Vec<(usize, u64)>>,
    pub kicks: RefCell<Vec<usize>>,
    pub mapped: RefCell<Option<(u64, u64)>>,
    pub fail_map: bool,
}

impl MockHost {
    pub fn take_kicks(&self) -> Vec<usize> {
        let mut kicks = self.kicks.take();
        kicks.sort_unstable();
        kicks.dedup();
        kicks
    }
}

impl HostOps for MockHost {
    fn inject_data_abort(&self, vcpu: usize, addr: u64) {
        self.aborts.borrow_mut().push((vcpu, addr));
    }

    fn kick_vcpu(&self, vcpu: usize) {
        self.kicks.borrow_mut().push(vcpu);
    }

    fn map_cpu_interface(&self, guest_addr: u64, size: u64) -> Result<(), &'static str> {
        if self.fail_map {
            return Err("no mapping");
        }
        *self.mapped.borrow_mut() = Some((guest_addr, size));
        Ok(())
    }
}

pub struct Harness {
    pub vgic: Vgic,
    pub cpus: Vec<VgicCpu>,
    pub host: MockHost,
}

impl Harness {
    pub fn new(nr_cpus: usize) -> Self {
        Self::with_config(VgicConfig::default(), nr_cpus)
    }

    pub fn with_config(config: VgicConfig, nr_cpus: usize) -> Self {
        let vgic = Vgic::new(config, nr_cpus).unwrap();
        let cpus = (0..nr_cpus).map(|id| vgic.create_vcpu(id).unwrap()).collect();
        let host = MockHost::default();
        vgic.set_address(WindowKind::Distributor, DIST_BASE).unwrap();
        vgic.set_address(WindowKind::CpuInterface, CPU_BASE).unwrap();
        vgic.init(&host).unwrap();
        Self { vgic, cpus, host }
    }

    pub fn write_len(&self, vcpu: usize, offset: u64, len: usize, val: u32) -> MmioResult {
        let mut access = MmioAccess::write(DIST_BASE + offset, len, val as u64);
        self.vgic.handle_mmio(&self.host, vcpu, &mut access)
    }

    pub fn write(&self, vcpu: usize, offset: u64, val: u32) {
        assert_eq!(self.write_len(vcpu, offset, 4, val), MmioResult::Handled);
    }

    pub fn read_len(&self, vcpu: usize, offset: u64, len: usize) -> u32 {
        let mut access = MmioAccess::read(DIST_BASE + offset, len);
        assert_eq!(
            self.vgic.handle_mmio(&self.host, vcpu, &mut access),
            MmioResult::Handled
        );
        access.data as u32
    }

    pub fn read(&self, vcpu: usize, offset: u64) -> u32 {
        self.read_len(vcpu, offset, 4)
    }

    pub fn enable_dist(&self) {
        self.write(0, 0x000, 1);
    }

    pub fn enable_irq(&self, vcpu: usize, irq: u32) {
        self.write(vcpu, 0x100 + (irq as u64 / 32) * 4, 1 << (irq % 32));
    }

    pub fn target_spi(&self, irq: u32, cpu: usize) {
        assert_eq!(
            self.write_len(0, 0x800 + irq as u64, 1, 1 << cpu),
            MmioResult::Handled
        );
    }

    /// Pretend the guest finished with the list registers in `done`:
    /// they become empty, and those asking for it report an EOI.
    pub fn guest_retire(&mut self, cpu: usize, done: u64) {
        let vcpu = &mut self.cpus[cpu];
        let mask = (1u64 << vcpu.nr_list_regs()) - 1;
        let done = done & vcpu.lr_used;
        let mut eisr = 0;
        for lr in 0..vcpu.nr_list_regs() {
            if done & (1 << lr) == 0 {
                continue;
            }
            if vcpu.lr[lr].eoi() {
                eisr |= 1 << lr;
            }
            vcpu.lr[lr] = crate::ListRegister::from_bits(vcpu.lr[lr].bits() & !(0b11 << 28));
        }
        vcpu.eisr = eisr;
        vcpu.elrsr = (!vcpu.lr_used | done) & mask;
        let mut misr = 0;
        if eisr != 0 {
            misr |= 1;
        }
        if vcpu.elrsr == mask {
            misr |= 1 << 1;
        }
        vcpu.misr.set(misr);
    }

    pub fn flush(&mut self, cpu: usize) {
        self.vgic.flush_hwstate(&mut self.cpus[cpu]);
    }

    pub fn sync(&mut self, cpu: usize) {
        self.vgic.sync_hwstate(&mut self.cpus[cpu]);
        let vcpu = &mut self.cpus[cpu];
        vcpu.misr.set(0);
        vcpu.eisr = 0;
    }
}

pub fn spi(irq: u32) -> IntId {
    IntId::spi(irq - 32)
}

#[test]
fn gich_block_size() {
    assert_eq!(size_of::<crate::HypervisorRegs>(), 0x200);
}

#[test]
#[should_panic]
fn test_sgi() {
    let id = IntId::sgi(40);
    assert!(id.is_sgi());
}

#[test]
#[should_panic]
fn test_ppi() {
    let id = IntId::ppi(17);
    assert!(id.is_private());
}

#[test]
fn intid_kinds() {
    assert!(IntId::sgi(15).is_sgi());
    assert!(IntId::ppi(0).is_private());
    assert!(!IntId::ppi(0).is_sgi());
    assert_eq!(IntId::spi(5).to_u32(), 37);
    assert!(!IntId::spi(0).is_private());
}

#[test]
fn list_register_count_from_vtr() {
    use std::boxed::Box;

    let mut block = Box::new([0u32; 0x200 / 4]);
    // GICH_VTR.ListRegs holds the count minus one.
    block[0x4 / 4] = 0x9000_0006;
    let regs = unsafe { &*(block.as_ptr() as *const crate::HypervisorRegs) };

    let config = VgicConfig::default().with_hw_list_regs(regs);
    assert_eq!(config.nr_list_regs, 7);
    let vgic = Vgic::new(config, 1).unwrap();
    assert_eq!(vgic.create_vcpu(0).unwrap().nr_list_regs(), 7);
}

#[test]
fn config_validation() {
    use crate::VgicError;

    assert_eq!(
        Vgic::new(VgicConfig::default().nr_irqs(100), 1).err(),
        Some(VgicError::InvalidIrqCount(100))
    );
    assert_eq!(
        Vgic::new(VgicConfig::default().nr_list_regs(0), 1).err(),
        Some(VgicError::InvalidListRegisterCount(0))
    );
    assert_eq!(
        Vgic::new(VgicConfig::default(), 9).err(),
        Some(VgicError::InvalidCpuCount(9))
    );
    assert_eq!(
        Vgic::new(VgicConfig::default().phys_addr_bits(64), 1).err(),
        Some(VgicError::InvalidAddressBits(64))
    );
}

#[test]
fn vcpu_creation() {
    use crate::VgicError;

    let vgic = Vgic::new(VgicConfig::default(), 2).unwrap();
    let cpu = vgic.create_vcpu(1).unwrap();
    assert_eq!(cpu.id(), 1);
    assert_eq!(cpu.list_registers().len(), 4);
    assert!(cpu.lr_for(20).is_none());
    assert_eq!(vgic.create_vcpu(1).err(), Some(VgicError::VcpuAlreadyCreated(1)));
    assert_eq!(vgic.create_vcpu(2).err(), Some(VgicError::InvalidVcpu(2)));

    for sgi in 0..16 {
        assert!(vgic.is_enabled(1, IntId::sgi(sgi)));
    }
    assert!(!vgic.is_enabled(1, IntId::ppi(0)));
    // Banked: CPU 0 has not been created yet.
    assert!(!vgic.is_enabled(0, IntId::sgi(0)));
}

#[test]
fn init_needs_both_windows() {
    use crate::VgicError;

    let host = MockHost::default();
    let vgic = Vgic::new(VgicConfig::default(), 1).unwrap();
    assert_eq!(
        vgic.init(&host),
        Err(VgicError::AddressNotAssigned(WindowKind::Distributor))
    );
    vgic.set_address(WindowKind::Distributor, DIST_BASE).unwrap();
    assert_eq!(
        vgic.init(&host),
        Err(VgicError::AddressNotAssigned(WindowKind::CpuInterface))
    );
    vgic.set_address(WindowKind::CpuInterface, CPU_BASE).unwrap();

    let failing = MockHost {
        fail_map: true,
        ..Default::default()
    };
    assert_eq!(
        vgic.init(&failing),
        Err(VgicError::CpuInterfaceMap("no mapping"))
    );
    assert!(!vgic.is_ready());

    vgic.init(&host).unwrap();
    assert!(vgic.is_ready());
    assert_eq!(*host.mapped.borrow(), Some((CPU_BASE, crate::CPU_SIZE)));
    assert_eq!(vgic.init(&host), Err(VgicError::AlreadyInitialized));

    for spi in 0..96 {
        assert_eq!(vgic.spi_target(IntId::spi(spi)), 0);
    }
}
