/// Services the hypervisor provides to the virtual GIC.
pub trait HostOps {
    /// Deliver a synchronous data abort for `addr` to `vcpu`.
    fn inject_data_abort(&self, vcpu: usize, addr: u64);

    /// Make `vcpu` re-enter the flush path soon, waking it if it sleeps.
    fn kick_vcpu(&self, vcpu: usize);

    /// Map the physical GIC virtual CPU interface into the guest at
    /// `guest_addr`.
    fn map_cpu_interface(&self, guest_addr: u64, size: u64) -> Result<(), &'static str>;
}
