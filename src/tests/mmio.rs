use super::{DIST_BASE, Harness, spi};
use crate::{
    IntId, MmioAccess, MmioResult, Vgic, VgicConfig, WindowKind,
    mmio::{DistRegister, dist_ranges, find_range},
};

#[test]
fn range_table_layout() {
    let ranges = dist_ranges(128);
    assert_eq!(ranges[0].offset, 0x000);
    assert_eq!(ranges[0].len, 12);
    assert_eq!(ranges[2].offset, 0x100);
    assert_eq!(ranges[2].len, 16);
    assert_eq!(ranges[8].len, 128);
    assert_eq!(ranges[10].offset, 0xc00);
    assert_eq!(ranges[10].len, 32);
    assert_eq!(ranges[11].offset, 0xf00);

    for pair in ranges.windows(2) {
        assert!(pair[0].offset + pair[0].len <= pair[1].offset);
    }

    let hit = find_range(&ranges, DIST_BASE + 0x104, 4, DIST_BASE).unwrap();
    assert!(matches!(hit.handler, DistRegister::SetEnable(_)));
    // Straddles the end of ISENABLER.
    assert!(find_range(&ranges, DIST_BASE + 0x10e, 4, DIST_BASE).is_none());
    assert!(find_range(&ranges, DIST_BASE + 0x00c, 4, DIST_BASE).is_none());
    assert!(find_range(&ranges, DIST_BASE - 4, 4, DIST_BASE).is_none());
}

#[test]
fn identification() {
    let h = Harness::new(4);
    assert_eq!(h.read(0, 0x008), 0x4b00_043b);
    assert_eq!(h.read(0, 0x004), (3 << 5) | 3);

    // Read-only.
    h.write(0, 0x004, 0);
    assert_eq!(h.read(0, 0x004), 0x63);
}

#[test]
fn distributor_enable() {
    let h = Harness::new(1);
    assert_eq!(h.read(0, 0x000), 0);
    h.enable_dist();
    assert_eq!(h.read(0, 0x000), 1);
    assert!(h.vgic.is_distributor_enabled());
    h.write(0, 0x000, 0);
    assert!(!h.vgic.is_distributor_enabled());
}

#[test]
fn outside_the_window() {
    let h = Harness::new(1);
    let mut access = MmioAccess::read(DIST_BASE + 0x1000, 4);
    assert_eq!(
        h.vgic.handle_mmio(&h.host, 0, &mut access),
        MmioResult::NotHandled
    );
    let mut access = MmioAccess::read(DIST_BASE + 0xffe, 4);
    assert_eq!(
        h.vgic.handle_mmio(&h.host, 0, &mut access),
        MmioResult::NotHandled
    );
    // Hole between IIDR and IGROUPR.
    let mut access = MmioAccess::read(DIST_BASE + 0x10, 4);
    assert_eq!(
        h.vgic.handle_mmio(&h.host, 0, &mut access),
        MmioResult::NotHandled
    );
}

#[test]
fn no_distributor_configured() {
    let vgic = Vgic::new(VgicConfig::default(), 1).unwrap();
    let host = super::MockHost::default();
    let mut access = MmioAccess::read(DIST_BASE, 4);
    assert_eq!(
        vgic.handle_mmio(&host, 0, &mut access),
        MmioResult::NotHandled
    );
    vgic.set_address(WindowKind::Distributor, DIST_BASE).unwrap();
    // Windows alone are not enough, the controller has to be up.
    assert_eq!(
        vgic.handle_mmio(&host, 0, &mut access),
        MmioResult::NotHandled
    );
    vgic.set_address(WindowKind::CpuInterface, super::CPU_BASE).unwrap();
    vgic.init(&host).unwrap();
    assert_eq!(vgic.handle_mmio(&host, 0, &mut access), MmioResult::Handled);
}

#[test]
fn wide_access_aborts() {
    let h = Harness::new(2);
    let mut access = MmioAccess::write(DIST_BASE + 0x100, 8, u64::MAX);
    assert_eq!(
        h.vgic.handle_mmio(&h.host, 1, &mut access),
        MmioResult::Handled
    );
    assert_eq!(*h.host.aborts.borrow(), [(1, DIST_BASE + 0x100)]);
    assert!(!h.vgic.is_enabled(1, IntId::ppi(0)));
}

#[test]
fn raz_wi_registers() {
    let h = Harness::new(1);
    for offset in [0x080, 0x300, 0x380] {
        h.write(0, offset, u32::MAX);
        assert_eq!(h.read(0, offset), 0);
    }
}

#[test]
fn enable_banked_and_shared() {
    let h = Harness::new(2);
    h.enable_irq(0, 27);
    assert!(h.vgic.is_enabled(0, IntId::ppi(11)));
    assert!(!h.vgic.is_enabled(1, IntId::ppi(11)));

    h.enable_irq(1, 40);
    assert!(h.vgic.is_enabled(0, spi(40)));
    assert_eq!(h.read(0, 0x104), 1 << 8);

    h.write(0, 0x184, 1 << 8);
    assert!(!h.vgic.is_enabled(1, spi(40)));
}

#[test]
fn sgis_cannot_be_disabled() {
    let h = Harness::new(1);
    h.enable_irq(0, 27);
    assert_eq!(h.read(0, 0x100), 0xffff | (1 << 27));
    h.write(0, 0x180, u32::MAX);
    assert_eq!(h.read(0, 0x100), 0xffff);
}

#[test]
fn pending_set_clear() {
    let h = Harness::new(1);
    h.write(0, 0x204, 0b101);
    assert!(h.vgic.is_pending(0, spi(32)));
    assert!(h.vgic.is_pending(0, spi(34)));
    assert_eq!(h.read(0, 0x284), 0b101);
    h.write(0, 0x284, 0b001);
    assert!(!h.vgic.is_pending(0, spi(32)));
    assert_eq!(h.read(0, 0x204), 0b100);
}

#[test]
fn priority_bytes() {
    let h = Harness::new(2);
    assert_eq!(h.write_len(0, 0x400 + 5, 1, 0xa0), MmioResult::Handled);
    assert_eq!(h.read(0, 0x404), 0x0000_a000);
    // Banked per CPU for private IRQs.
    assert_eq!(h.read(1, 0x404), 0);

    h.write(1, 0x420, 0x1122_3344);
    assert_eq!(h.read_len(0, 0x422, 1), 0x22);
}

#[test]
fn private_targets_are_fixed() {
    let h = Harness::new(4);
    assert_eq!(h.read(2, 0x800), 0x0404_0404);
    assert_eq!(h.read(0, 0x81c), 0x0101_0101);
    h.write(2, 0x800, 0);
    assert_eq!(h.read(2, 0x800), 0x0404_0404);
}

#[test]
fn shared_target_lowest_bit_wins() {
    let h = Harness::new(4);
    assert_eq!(h.write_len(0, 0x800 + 33, 1, 0x00), MmioResult::Handled);
    assert_eq!(h.read_len(0, 0x800 + 33, 1), 0x01);

    assert_eq!(h.write_len(0, 0x800 + 33, 1, 0x0a), MmioResult::Handled);
    assert_eq!(h.read_len(0, 0x800 + 33, 1), 0x02);
    assert_eq!(h.vgic.spi_target(spi(33)), 1);

    // The neighbours in the same word are untouched.
    assert_eq!(h.read(0, 0x820), 0x0101_0201);

    h.write(0, 0x824, 0x0804_0201);
    assert_eq!(h.vgic.spi_target(spi(36)), 0);
    assert_eq!(h.vgic.spi_target(spi(37)), 1);
    assert_eq!(h.vgic.spi_target(spi(38)), 2);
    assert_eq!(h.vgic.spi_target(spi(39)), 3);
}

#[test]
fn target_beyond_last_cpu_falls_back() {
    let h = Harness::new(2);
    h.write(0, 0x820, 0x0000_0080);
    assert_eq!(h.vgic.spi_target(spi(32)), 0);
}

#[test]
fn private_config_is_edge() {
    let h = Harness::new(1);
    assert_eq!(h.read(0, 0xc00), 0xaaaa_aaaa);
    assert_eq!(h.read(0, 0xc04), 0xaaaa_aaaa);

    h.write(0, 0xc00, 0);
    assert_eq!(h.read(0, 0xc00), 0xaaaa_aaaa);

    // The PPI word is hardwired as well.
    h.write(0, 0xc04, 0);
    assert_eq!(h.read(0, 0xc04), 0xaaaa_aaaa);
    let dist = h.vgic.dist_for_test();
    assert!(dist.is_edge(0, 27));
    assert!(dist.is_edge(0, 16));
}

#[test]
fn shared_config() {
    let h = Harness::new(1);
    assert_eq!(h.read(0, 0xc08), 0);
    h.write(0, 0xc08, 0b11);
    assert_eq!(h.read(0, 0xc08), 0b10);
    h.write(0, 0xc0c, 1 << 31);
    assert_eq!(h.read(0, 0xc0c), 1 << 31);
    assert_eq!(h.read(0, 0xc08), 0b10);

    let dist = h.vgic.dist_for_test();
    assert!(dist.is_edge(0, 32));
    assert!(dist.is_edge(0, 63));
    assert!(!dist.is_edge(0, 33));
}

#[test]
fn sgir_reads_zero() {
    let h = Harness::new(1);
    assert_eq!(h.read(0, 0xf00), 0);
}

#[test]
fn sgi_target_list() {
    let h = Harness::new(4);
    h.enable_dist();
    h.host.take_kicks();

    h.write(0, 0xf00, (0b0110 << 16) | 5);
    assert!(!h.vgic.is_pending(0, IntId::sgi(5)));
    assert!(h.vgic.is_pending(1, IntId::sgi(5)));
    assert!(h.vgic.is_pending(2, IntId::sgi(5)));
    assert!(!h.vgic.is_pending(3, IntId::sgi(5)));
    assert_eq!(h.host.take_kicks(), [1, 2]);

    let dist = h.vgic.dist_for_test();
    assert_eq!(dist.irq_sgi_sources[1][5], 1);
    assert_eq!(dist.irq_sgi_sources[2][5], 1);
}

#[test]
fn sgi_empty_list_is_dropped() {
    let h = Harness::new(4);
    h.enable_dist();
    h.host.take_kicks();

    h.write(1, 0xf00, 3);
    for cpu in 0..4 {
        assert!(!h.vgic.is_pending(cpu, IntId::sgi(3)));
    }
    assert!(h.host.take_kicks().is_empty());
}

#[test]
fn sgi_to_others_and_self() {
    let h = Harness::new(3);
    h.enable_dist();

    h.write(1, 0xf00, (1 << 24) | 7);
    assert!(h.vgic.is_pending(0, IntId::sgi(7)));
    assert!(!h.vgic.is_pending(1, IntId::sgi(7)));
    assert!(h.vgic.is_pending(2, IntId::sgi(7)));
    assert_eq!(h.vgic.dist_for_test().irq_sgi_sources[2][7], 1 << 1);

    h.write(2, 0xf00, (2 << 24) | (0xff << 16) | 9);
    assert!(h.vgic.is_pending(2, IntId::sgi(9)));
    assert!(!h.vgic.is_pending(0, IntId::sgi(9)));
    assert!(!h.vgic.is_pending(1, IntId::sgi(9)));
}

#[test]
fn sgi_reserved_filter() {
    let h = Harness::new(2);
    h.enable_dist();
    h.write(0, 0xf00, (3 << 24) | (0b11 << 16) | 1);
    assert!(!h.vgic.is_pending(0, IntId::sgi(1)));
    assert!(!h.vgic.is_pending(1, IntId::sgi(1)));
}

#[test]
fn sgi_sources_accumulate() {
    let h = Harness::new(3);
    h.enable_dist();
    h.write(0, 0xf00, (0b100 << 16) | 2);
    h.write(1, 0xf00, (0b100 << 16) | 2);
    assert_eq!(h.vgic.dist_for_test().irq_sgi_sources[2][2], 0b11);
}
