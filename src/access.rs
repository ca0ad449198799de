//! Word-masked register access with GICv2 read/write semantics.

/// A trapped guest access to the emulated distributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioAccess {
    /// Guest physical address.
    pub addr: u64,
    /// Access width in bytes.
    pub len: usize,
    pub is_write: bool,
    /// Value written by the guest, or the value to return for a read.
    pub data: u64,
}

impl MmioAccess {
    pub fn read(addr: u64, len: usize) -> Self {
        Self {
            addr,
            len,
            is_write: false,
            data: 0,
        }
    }

    pub fn write(addr: u64, len: usize, data: u64) -> Self {
        Self {
            addr,
            len,
            is_write: true,
            data,
        }
    }

    fn mask(&self) -> u32 {
        debug_assert!((1..=4).contains(&self.len));
        if self.len >= 4 {
            u32::MAX
        } else {
            (1u32 << (self.len * 8)) - 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Value,
    /// Read as zero.
    Raz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Ignored,
    SetBit,
    ClearBit,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMode {
    pub read: ReadMode,
    pub write: WriteMode,
}

impl AccessMode {
    pub const RAZ_WI: Self = Self::new(ReadMode::Raz, WriteMode::Ignored);
    pub const VALUE_WI: Self = Self::new(ReadMode::Value, WriteMode::Ignored);
    pub const VALUE_SETBIT: Self = Self::new(ReadMode::Value, WriteMode::SetBit);
    pub const VALUE_CLEARBIT: Self = Self::new(ReadMode::Value, WriteMode::ClearBit);
    pub const VALUE_VALUE: Self = Self::new(ReadMode::Value, WriteMode::Value);
    pub const RAZ_VALUE: Self = Self::new(ReadMode::Raz, WriteMode::Value);

    pub const fn new(read: ReadMode, write: WriteMode) -> Self {
        Self { read, write }
    }
}

/// Apply `access` to the 32-bit register `reg` at byte `offset`.
///
/// Only the low two bits of `offset` matter, they select the byte lane the
/// access starts at. `reg == None` marks an unimplemented register and is
/// only valid together with [`AccessMode::RAZ_WI`].
pub fn reg_access(access: &mut MmioAccess, reg: Option<&mut u32>, offset: u64, mode: AccessMode) {
    let shift = ((offset & 3) * 8) as u32;
    let mask = access.mask();

    let Some(reg) = reg else {
        assert_eq!(
            mode,
            AccessMode::RAZ_WI,
            "unimplemented register must be RAZ/WI"
        );
        if !access.is_write {
            access.data = 0;
        }
        return;
    };

    if access.is_write {
        let data = ((access.data as u32) & mask) << shift;
        match mode.write {
            WriteMode::Ignored => {}
            WriteMode::SetBit => *reg |= data,
            WriteMode::ClearBit => *reg &= !data,
            WriteMode::Value => *reg = (*reg & !(mask << shift)) | data,
        }
    } else {
        let val = match mode.read {
            ReadMode::Raz => 0,
            ReadMode::Value => (*reg >> shift) & mask,
        };
        access.data = val as u64;
    }
}

/// Spread 16 configuration bits into the upper bit of each 2-bit ICFGR
/// field: bit `i` lands on bit `2 * i + 1`.
pub const fn cfg_expand(val: u16) -> u32 {
    let mut res = 0u32;
    let mut i = 0;
    while i < 16 {
        res |= (((val >> i) & 1) as u32) << (2 * i + 1);
        i += 1;
    }
    res
}

/// Inverse of [`cfg_expand`], the low bit of every field is dropped.
pub const fn cfg_compress(val: u32) -> u16 {
    let mut res = 0u16;
    let mut i = 0;
    while i < 16 {
        res |= (((val >> (2 * i + 1)) & 1) as u16) << i;
        i += 1;
    }
    res
}
