/// Machine status
pub const MSTATUS: u16 = 0x300;
/// ISA and extensions
pub const MISA: u16 = 0x301;
/// Machine interrupt enable
pub const MIE: u16 = 0x304;
/// Machine trap-handler base address
pub const MTVEC: u16 = 0x305;
/// Scratch register for machine trap handlers
pub const MSCRATCH: u16 = 0x340;
/// Machine exception program counter
pub const MEPC: u16 = 0x341;
/// Machine trap cause
pub const MCAUSE: u16 = 0x342;
/// Machine bad address or instruction
pub const MTVAL: u16 = 0x343;
/// Machine interrupt pending
pub const MIP: u16 = 0x344;
/// Vendor ID
pub const MVENDORID: u16 = 0xF11;
/// Architecture ID
pub const MARCHID: u16 = 0xF12;
/// Implementation ID
pub const MIMPID: u16 = 0xF13;
/// Hardware thread ID
pub const MHARTID: u16 = 0xF14;

/// Global interrupt enable
pub const MSTATUS_MIE: u32 = 1 << 3;
/// Interrupt enable saved on trap entry
pub const MSTATUS_MPIE: u32 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CSRMode {
    ReadOnly = 0,
    ReadWrite = 1,
}

/// The 4096-entry control/status register file.
///
/// Every index is backed by a zero-initialized slot, so unknown CSRs simply
/// read and write memory.
#[derive(Debug, Clone)]
pub struct CSR {
    memory: Vec<u32>,
}

impl Default for CSR {
    fn default() -> Self {
        Self::new()
    }
}

impl CSR {
    pub fn new() -> Self {
        Self {
            memory: vec![0; 4096],
        }
    }

    pub fn memory(&self) -> &[u32] {
        &self.memory
    }

    /// Indices `0xC00..=0xFFF` are read-only.
    pub fn mode(csr: u16) -> CSRMode {
        match (csr >> 10) & 0b11 {
            0b11 => CSRMode::ReadOnly,
            _ => CSRMode::ReadWrite,
        }
    }

    pub fn get(&self, csr: u16) -> u32 {
        self.memory[(csr & 0xFFF) as usize]
    }

    /// Unconditional write, used by the hart itself for trap bookkeeping.
    pub fn set(&mut self, csr: u16, value: u32) {
        self.memory[(csr & 0xFFF) as usize] = value;
    }

    pub fn set_bits(&mut self, csr: u16, bits: u32) {
        let value = self.get(csr);

        self.set(csr, value | bits);
    }

    pub fn clear_bits(&mut self, csr: u16, bits: u32) {
        let value = self.get(csr);

        self.set(csr, value & !bits);
    }

    /// `csrrw`: returns the previous value; the write is dropped for
    /// read-only indices.
    pub fn read_write(&mut self, csr: u16, value: u32) -> u32 {
        let old_value = self.get(csr);

        if Self::mode(csr) == CSRMode::ReadWrite {
            self.set(csr, value);
        }

        old_value
    }

    /// `csrrs`: a zero mask skips the write entirely.
    pub fn read_set(&mut self, csr: u16, bits: u32) -> u32 {
        let old_value = self.get(csr);

        if bits != 0 && Self::mode(csr) == CSRMode::ReadWrite {
            self.set(csr, old_value | bits);
        }

        old_value
    }

    /// `csrrc`: a zero mask skips the write entirely.
    pub fn read_clear(&mut self, csr: u16, bits: u32) -> u32 {
        let old_value = self.get(csr);

        if bits != 0 && Self::mode(csr) == CSRMode::ReadWrite {
            self.set(csr, old_value & !bits);
        }

        old_value
    }
}
