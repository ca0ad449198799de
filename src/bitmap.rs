//! Per-IRQ state storage.
//!
//! Every map is split in two regions: a private one banked per vCPU for
//! SGIs and PPIs, and a shared one for SPIs.

use alloc::{vec, vec::Vec};

use crate::define::NR_PRIVATE_IRQS;

/// One bit per IRQ.
#[derive(Debug, Clone)]
pub struct IrqBitmap {
    /// One word per vCPU, the 32 private IRQs fit exactly.
    private: Vec<u32>,
    shared: Vec<u32>,
}

impl IrqBitmap {
    pub fn new(nr_cpus: usize, nr_irqs: usize) -> Self {
        debug_assert!(nr_irqs >= NR_PRIVATE_IRQS && nr_irqs % 32 == 0);
        Self {
            private: vec![0; nr_cpus],
            shared: vec![0; (nr_irqs - NR_PRIVATE_IRQS) / 32],
        }
    }

    pub fn nr_irqs(&self) -> usize {
        NR_PRIVATE_IRQS + self.shared.len() * 32
    }

    pub fn get(&self, cpu: usize, irq: usize) -> bool {
        debug_assert!(irq < self.nr_irqs(), "IRQ {irq} out of range");
        if irq < NR_PRIVATE_IRQS {
            self.private[cpu] & (1 << irq) != 0
        } else {
            let irq = irq - NR_PRIVATE_IRQS;
            self.shared[irq / 32] & (1 << (irq % 32)) != 0
        }
    }

    pub fn set(&mut self, cpu: usize, irq: usize, val: bool) {
        debug_assert!(irq < self.nr_irqs(), "IRQ {irq} out of range");
        let (word, bit) = if irq < NR_PRIVATE_IRQS {
            (&mut self.private[cpu], irq)
        } else {
            let irq = irq - NR_PRIVATE_IRQS;
            (&mut self.shared[irq / 32], irq % 32)
        };
        if val {
            *word |= 1 << bit;
        } else {
            *word &= !(1 << bit);
        }
    }

    /// The private word of `cpu`.
    pub fn cpu_view(&self, cpu: usize) -> u32 {
        self.private[cpu]
    }

    pub fn cpu_view_mut(&mut self, cpu: usize) -> &mut u32 {
        &mut self.private[cpu]
    }

    pub fn shared_view(&self) -> &[u32] {
        &self.shared
    }

    /// Backing word of a one-bit-per-IRQ register at byte `offset`.
    pub fn reg(&mut self, cpu: usize, offset: u64) -> &mut u32 {
        let word = (offset >> 2) as usize;
        if word == 0 {
            &mut self.private[cpu]
        } else {
            &mut self.shared[word - 1]
        }
    }
}

/// One byte per IRQ, packed four to a word.
#[derive(Debug, Clone)]
pub struct IrqBytemap {
    /// Eight words per vCPU.
    private: Vec<u32>,
    shared: Vec<u32>,
}

const PRIVATE_BYTE_WORDS: usize = NR_PRIVATE_IRQS / 4;

impl IrqBytemap {
    pub fn new(nr_cpus: usize, nr_irqs: usize) -> Self {
        debug_assert!(nr_irqs >= NR_PRIVATE_IRQS && nr_irqs % 4 == 0);
        Self {
            private: vec![0; nr_cpus * PRIVATE_BYTE_WORDS],
            shared: vec![0; (nr_irqs - NR_PRIVATE_IRQS) / 4],
        }
    }

    /// Backing word of a one-byte-per-IRQ register at byte `offset`.
    pub fn reg(&mut self, cpu: usize, offset: u64) -> &mut u32 {
        let word = (offset >> 2) as usize;
        if word < PRIVATE_BYTE_WORDS {
            &mut self.private[cpu * PRIVATE_BYTE_WORDS + word]
        } else {
            &mut self.shared[word - PRIVATE_BYTE_WORDS]
        }
    }
}

/// Iterator over the set bits of a word slice, lowest first.
pub struct BitIter<'a> {
    words: &'a [u32],
    index: usize,
    current: u32,
}

impl<'a> BitIter<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            index: 0,
            current: words.first().copied().unwrap_or(0),
        }
    }
}

impl Iterator for BitIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.index * 32 + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

pub fn assign_bit(words: &mut [u32], bit: usize, val: bool) {
    if val {
        words[bit / 32] |= 1 << (bit % 32);
    } else {
        words[bit / 32] &= !(1 << (bit % 32));
    }
}
