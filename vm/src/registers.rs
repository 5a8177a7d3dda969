/// Hardwired to 0, ignores writes
pub const ZERO: Register = Register(0);
/// Return address for jumps
pub const RA: Register = Register(1);
/// Stack pointer
pub const SP: Register = Register(2);
/// Global pointer
pub const GP: Register = Register(3);
/// Thread pointer
pub const TP: Register = Register(4);
/// Temporary register 0
pub const T0: Register = Register(5);
/// Temporary register 1
pub const T1: Register = Register(6);
/// Temporary register 2
pub const T2: Register = Register(7);
/// Saved register 0 or frame pointer
pub const S0: Register = Register(8);
/// Saved register 1
pub const S1: Register = Register(9);
/// Return value or function argument 0
pub const A0: Register = Register(10);
/// Return value or function argument 1
pub const A1: Register = Register(11);
/// Function argument 2
pub const A2: Register = Register(12);
/// Function argument 3
pub const A3: Register = Register(13);
/// Function argument 4
pub const A4: Register = Register(14);
/// Function argument 5
pub const A5: Register = Register(15);
/// Function argument 6
pub const A6: Register = Register(16);
/// Function argument 7, syscall number
pub const A7: Register = Register(17);
/// Saved register 2
pub const S2: Register = Register(18);
/// Saved register 3
pub const S3: Register = Register(19);
/// Saved register 4
pub const S4: Register = Register(20);
/// Saved register 5
pub const S5: Register = Register(21);
/// Saved register 6
pub const S6: Register = Register(22);
/// Saved register 7
pub const S7: Register = Register(23);
/// Saved register 8
pub const S8: Register = Register(24);
/// Saved register 9
pub const S9: Register = Register(25);
/// Saved register 10
pub const S10: Register = Register(26);
/// Saved register 11
pub const S11: Register = Register(27);
/// Temporary register 3
pub const T3: Register = Register(28);
/// Temporary register 4
pub const T4: Register = Register(29);
/// Temporary register 5
pub const T5: Register = Register(30);
/// Temporary register 6
pub const T6: Register = Register(31);

/// Index into either the integer or the float register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Register(u8);

impl Register {
    pub const fn new(i: u8) -> Option<Self> {
        if i < 32 {
            Some(Self(i))
        } else {
            None
        }
    }

    /// Takes the low five bits of `bits`, so every field cut out of an
    /// instruction word maps to a valid register.
    pub const fn from_bits(bits: u32) -> Self {
        Self((bits & 0b11111) as u8)
    }

    /// Registers `x8..x15` addressed by the 3-bit fields of compressed
    /// instructions.
    pub const fn from_compressed(bits: u32) -> Self {
        Self((bits & 0b111) as u8 + 8)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

/// See [ASM Manual](https://github.com/riscv-non-isa/riscv-asm-manual/blob/main/riscv-asm.md#general-registers)
///
/// `x0` is a real slot here: writes land in it and [Registers::clear_zero]
/// restores it after every instruction.
#[derive(Debug, Clone)]
pub struct Registers {
    x: [u32; 32],
    f: [u64; 32],
    pc: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            x: [0; 32],
            f: [0; 32],
            pc: 0,
        }
    }
}

impl Registers {
    pub fn get(&self, register: Register) -> u32 {
        self.x[register.as_u8() as usize]
    }

    pub fn set(&mut self, register: Register, value: u32) {
        self.x[register.as_u8() as usize] = value;
    }

    pub fn clear_zero(&mut self) {
        self.x[0] = 0;
    }

    pub fn get_f(&self, register: Register) -> u64 {
        self.f[register.as_u8() as usize]
    }

    pub fn set_f(&mut self, register: Register, value: u64) {
        self.f[register.as_u8() as usize] = value;
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn pc_mut(&mut self) -> &mut u32 {
        &mut self.pc
    }
}
