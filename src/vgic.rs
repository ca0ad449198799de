use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use log::{debug, trace, warn};
use spin::Mutex;

use crate::{
    IntId,
    access::MmioAccess,
    config::VgicConfig,
    define::{CPU_SIZE, NR_PRIVATE_IRQS, NR_SGIS},
    dist::DistState,
    error::{Result, VgicError},
    host::HostOps,
    mmio::{MmioRange, MmioResult, RegisterHandler, dist_ranges, find_range},
    vcpu::VgicCpu,
    window::{AddrWindows, WindowKind},
};

/// A virtual GICv2 shared by all vCPUs of one VM.
pub struct Vgic {
    config: VgicConfig,
    nr_cpus: usize,
    ranges: [MmioRange; 12],
    windows: Mutex<AddrWindows>,
    dist: Mutex<DistState>,
    /// vCPUs whose [`VgicCpu`] has been handed out.
    created: AtomicU32,
    ready: AtomicBool,
}

impl Vgic {
    pub fn new(config: VgicConfig, nr_cpus: usize) -> Result<Self> {
        config.validate()?;
        VgicConfig::validate_cpus(nr_cpus)?;

        debug!(
            "vGIC: {} IRQs, {} vCPUs, {} LRs",
            config.nr_irqs, nr_cpus, config.nr_list_regs
        );

        Ok(Self {
            config,
            nr_cpus,
            ranges: dist_ranges(config.nr_irqs),
            windows: Mutex::new(AddrWindows::new()),
            dist: Mutex::new(DistState::new(&config, nr_cpus)),
            created: AtomicU32::new(0),
            ready: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &VgicConfig {
        &self.config
    }

    pub fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Create the list register state of vCPU `id`. Each vCPU can be
    /// created once.
    pub fn create_vcpu(&self, id: usize) -> Result<VgicCpu> {
        if id >= self.nr_cpus {
            return Err(VgicError::InvalidVcpu(id));
        }
        let bit = 1 << id;
        if self.created.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return Err(VgicError::VcpuAlreadyCreated(id));
        }

        let mut dist = self.dist.lock();
        // SGIs are always enabled, private IRQs are edge triggered.
        *dist.irq_enabled.cpu_view_mut(id) |= (1 << NR_SGIS) - 1;
        *dist.irq_cfg.cpu_view_mut(id) = u32::MAX;
        drop(dist);

        debug!("vGIC: CPU{id} created");
        Ok(VgicCpu::new(id, self.config.nr_list_regs, self.config.nr_irqs))
    }

    pub fn set_address(&self, kind: WindowKind, addr: u64) -> Result {
        self.windows
            .lock()
            .assign(kind, addr, self.config.phys_mask())
    }

    /// [`Self::set_address`] with the window kind as a raw number, as it
    /// arrives from a configuration interface.
    pub fn set_address_raw(&self, kind: u64, addr: u64) -> Result {
        self.set_address(WindowKind::try_from(kind)?, addr)
    }

    pub fn address(&self, kind: WindowKind) -> Option<u64> {
        self.windows.lock().get(kind)
    }

    /// Bring the controller up once both windows are known.
    pub fn init(&self, host: &impl HostOps) -> Result {
        if self.is_ready() {
            return Err(VgicError::AlreadyInitialized);
        }

        let windows = self.windows.lock().clone();
        if windows.get(WindowKind::Distributor).is_none() {
            return Err(VgicError::AddressNotAssigned(WindowKind::Distributor));
        }
        let Some(cpu_base) = windows.get(WindowKind::CpuInterface) else {
            return Err(VgicError::AddressNotAssigned(WindowKind::CpuInterface));
        };

        let mut dist = self.dist.lock();
        if self.is_ready() {
            return Err(VgicError::AlreadyInitialized);
        }

        host.map_cpu_interface(cpu_base, CPU_SIZE)
            .map_err(VgicError::CpuInterfaceMap)?;

        for irq in NR_PRIVATE_IRQS..self.config.nr_irqs {
            dist.set_spi_target(irq, 0);
        }

        self.ready.store(true, Ordering::Release);
        debug!("vGIC: ready, GICC mapped at {cpu_base:#x}");
        Ok(())
    }

    /// Emulate a guest access that trapped on behalf of `vcpu`. For reads
    /// the result is left in `access.data`.
    pub fn handle_mmio(
        &self,
        host: &impl HostOps,
        vcpu: usize,
        access: &mut MmioAccess,
    ) -> MmioResult {
        if !self.is_ready() {
            return MmioResult::NotHandled;
        }

        let base = {
            let windows = self.windows.lock();
            match windows.get(WindowKind::Distributor) {
                Some(base) if windows.contains(WindowKind::Distributor, access.addr, access.len) => {
                    base
                }
                _ => return MmioResult::NotHandled,
            }
        };

        if access.len > 4 {
            debug!("vGIC: {}-byte access at {:#x}", access.len, access.addr);
            host.inject_data_abort(vcpu, access.addr);
            return MmioResult::Handled;
        }

        let Some(range) = find_range(&self.ranges, access.addr, access.len, base) else {
            warn!(
                "vGIC: unhandled {} at {:#x}",
                if access.is_write { "write" } else { "read" },
                access.addr
            );
            return MmioResult::NotHandled;
        };

        let offset = access.addr - base - range.offset;
        let mut dist = self.dist.lock();
        let updated = range.handler.handle(&mut dist, vcpu, access, offset);
        trace!(
            "vGIC: CPU{vcpu} {:?} +{offset:#x} {} {:#x}",
            range.handler,
            if access.is_write { "<-" } else { "->" },
            access.data
        );
        let kick: Vec<usize> = if updated {
            dist.pending_cpus().collect()
        } else {
            Vec::new()
        };
        drop(dist);

        for cpu in kick {
            host.kick_vcpu(cpu);
        }
        MmioResult::Handled
    }

    /// Fill the list registers of `cpu` before entering the guest.
    pub fn flush_hwstate(&self, cpu: &mut VgicCpu) {
        let mut dist = self.dist.lock();
        cpu.flush(&mut dist);
    }

    /// Process what the guest did with the list registers after an exit.
    pub fn sync_hwstate(&self, cpu: &mut VgicCpu) {
        let mut dist = self.dist.lock();
        cpu.sync(&mut dist);
    }

    pub fn vcpu_has_pending_irq(&self, cpu: usize) -> bool {
        self.dist.lock().pending_on_cpu(cpu)
    }

    fn check_irq(&self, cpu: usize, irq: IntId) {
        assert!(cpu < self.nr_cpus, "Invalid vCPU {cpu}");
        assert!(
            irq.index() < self.config.nr_irqs,
            "{irq:?} beyond {} IRQs",
            self.config.nr_irqs
        );
    }

    /// Drive the input line of `irq`. `cpu` selects the bank of a private
    /// IRQ and is ignored for SPIs.
    ///
    /// Returns whether the vCPU owning `irq` now has work and should be
    /// kicked.
    pub fn set_irq_level(&self, cpu: usize, irq: IntId, level: bool) -> bool {
        assert!(!irq.is_sgi(), "SGIs are raised through GICD_SGIR");
        self.check_irq(cpu, irq);
        let mut dist = self.dist.lock();
        if !dist.set_irq_level(cpu, irq.index(), level) {
            return false;
        }
        let owner = dist.owner(cpu, irq.index());
        dist.pending_on_cpu(owner)
    }

    pub fn set_line(&self, cpu: usize, irq: IntId) -> bool {
        self.set_irq_level(cpu, irq, true)
    }

    pub fn clear_line(&self, cpu: usize, irq: IntId) -> bool {
        self.set_irq_level(cpu, irq, false)
    }

    /// [`Self::set_irq_level`], kicking the owning vCPU when needed.
    pub fn inject_irq(&self, host: &impl HostOps, cpu: usize, irq: IntId, level: bool) {
        if self.set_irq_level(cpu, irq, level) {
            let owner = self.dist.lock().owner(cpu, irq.index());
            host.kick_vcpu(owner);
        }
    }

    pub fn is_enabled(&self, cpu: usize, irq: IntId) -> bool {
        self.check_irq(cpu, irq);
        self.dist.lock().is_enabled(cpu, irq.index())
    }

    pub fn is_pending(&self, cpu: usize, irq: IntId) -> bool {
        self.check_irq(cpu, irq);
        self.dist.lock().is_pending(cpu, irq.index())
    }

    pub fn is_active(&self, cpu: usize, irq: IntId) -> bool {
        self.check_irq(cpu, irq);
        self.dist.lock().is_active(cpu, irq.index())
    }

    /// Current owner of shared `irq`.
    pub fn spi_target(&self, irq: IntId) -> usize {
        assert!(!irq.is_private(), "{irq:?} is not shared");
        self.check_irq(0, irq);
        self.dist.lock().spi_target(irq.index())
    }

    pub fn is_distributor_enabled(&self) -> bool {
        self.dist.lock().enabled
    }

    #[cfg(test)]
    pub(crate) fn dist_for_test(&self) -> spin::MutexGuard<'_, DistState> {
        self.dist.lock()
    }
}
