use crate::registers::Register;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionR {
    pub rd: Register,
    pub rs1: Register,
    pub rs2: Register,
}

impl InstructionR {
    pub const fn new(rd: Register, rs1: Register, rs2: Register) -> Self {
        Self { rd, rs1, rs2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionI {
    pub rd: Register,
    pub rs1: Register,
    pub imm: i16,
}

impl InstructionI {
    pub const fn new(rd: Register, rs1: Register, imm: i16) -> Self {
        Self { rd, rs1, imm }
    }
}

/// Shift-immediate form; `shamt` is the 5-bit shift amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionShift {
    pub rd: Register,
    pub rs1: Register,
    pub shamt: u8,
}

impl InstructionShift {
    pub const fn new(rd: Register, rs1: Register, shamt: u8) -> Self {
        Self { rd, rs1, shamt }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionS {
    pub rs1: Register,
    pub rs2: Register,
    pub imm: i16,
}

impl InstructionS {
    pub const fn new(rs1: Register, rs2: Register, imm: i16) -> Self {
        Self { rs1, rs2, imm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionB {
    pub rs1: Register,
    pub rs2: Register,
    pub imm: i16,
}

impl InstructionB {
    pub const fn new(rs1: Register, rs2: Register, imm: i16) -> Self {
        Self { rs1, rs2, imm }
    }
}

/// `imm` already holds the upper 20 bits in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionU {
    pub rd: Register,
    pub imm: i32,
}

impl InstructionU {
    pub const fn new(rd: Register, imm: i32) -> Self {
        Self { rd, imm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionJ {
    pub rd: Register,
    pub imm: i32,
}

impl InstructionJ {
    pub const fn new(rd: Register, imm: i32) -> Self {
        Self { rd, imm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionCSR {
    pub rd: Register,
    pub rs1: Register,
    pub csr: u16,
}

impl InstructionCSR {
    pub const fn new(rd: Register, rs1: Register, csr: u16) -> Self {
        Self { rd, rs1, csr }
    }
}

/// CSR form whose `rs1` field is a 5-bit zero-extended immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionCSRImm {
    pub rd: Register,
    pub imm: u8,
    pub csr: u16,
}

impl InstructionCSRImm {
    pub const fn new(rd: Register, imm: u8, csr: u16) -> Self {
        Self { rd, imm, csr }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionFence {
    pub succ: u8,
    pub pred: u8,
    pub fm: u8,
}

impl InstructionFence {
    pub const fn new(succ: u8, pred: u8, fm: u8) -> Self {
        Self { succ, pred, fm }
    }
}

/// Read-modify-write operation of an `amo*.w` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AMOOp {
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    MinU,
    MaxU,
}

impl AMOOp {
    /// New memory value from the loaded word and `rs2`.
    pub const fn apply(self, loaded: u32, operand: u32) -> u32 {
        match self {
            AMOOp::Swap => operand,
            AMOOp::Add => loaded.wrapping_add(operand),
            AMOOp::Xor => loaded ^ operand,
            AMOOp::And => loaded & operand,
            AMOOp::Or => loaded | operand,
            AMOOp::Min => {
                if (loaded as i32) < (operand as i32) {
                    loaded
                } else {
                    operand
                }
            }
            AMOOp::Max => {
                if (loaded as i32) > (operand as i32) {
                    loaded
                } else {
                    operand
                }
            }
            AMOOp::MinU => {
                if loaded < operand {
                    loaded
                } else {
                    operand
                }
            }
            AMOOp::MaxU => {
                if loaded > operand {
                    loaded
                } else {
                    operand
                }
            }
        }
    }
}

/// A decoded instruction. Compressed encodings expand into the same variants.
///
/// For the float transport instructions `rd`/`rs2` name the `f` register
/// where the operation moves bits into or out of the float file.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Instruction {
    LUI(InstructionU),
    AUIPC(InstructionU),
    JAL(InstructionJ),
    JALR(InstructionI),
    BEQ(InstructionB),
    BNE(InstructionB),
    BLT(InstructionB),
    BGE(InstructionB),
    BLTU(InstructionB),
    BGEU(InstructionB),
    LB(InstructionI),
    LH(InstructionI),
    LW(InstructionI),
    LBU(InstructionI),
    LHU(InstructionI),
    SB(InstructionS),
    SH(InstructionS),
    SW(InstructionS),
    ADDI(InstructionI),
    SLTI(InstructionI),
    SLTIU(InstructionI),
    XORI(InstructionI),
    ORI(InstructionI),
    ANDI(InstructionI),
    SLLI(InstructionShift),
    SRLI(InstructionShift),
    SRAI(InstructionShift),
    ADD(InstructionR),
    SUB(InstructionR),
    SLL(InstructionR),
    SLT(InstructionR),
    SLTU(InstructionR),
    XOR(InstructionR),
    SRL(InstructionR),
    SRA(InstructionR),
    OR(InstructionR),
    AND(InstructionR),
    FENCE(InstructionFence),
    FENCE_I,
    ECALL,
    EBREAK,
    MRET,
    WFI,
    // Zicsr
    CSRRW(InstructionCSR),
    CSRRS(InstructionCSR),
    CSRRC(InstructionCSR),
    CSRRWI(InstructionCSRImm),
    CSRRSI(InstructionCSRImm),
    CSRRCI(InstructionCSRImm),
    // M
    MUL(InstructionR),
    MULH(InstructionR),
    MULHSU(InstructionR),
    MULHU(InstructionR),
    DIV(InstructionR),
    DIVU(InstructionR),
    REM(InstructionR),
    REMU(InstructionR),
    // A
    LR_W(InstructionR),
    SC_W(InstructionR),
    AMO_W(AMOOp, InstructionR),
    // Float register transport
    FLW(InstructionI),
    FLD(InstructionI),
    FSW(InstructionS),
    FSD(InstructionS),
    FMV_X_W(InstructionR),
    FMV_W_X(InstructionR),
}

#[cfg(test)]
mod tests {
    use super::AMOOp;

    #[test]
    fn amo_ops() {
        let minus_one = -1i32 as u32;

        assert_eq!(AMOOp::Swap.apply(1, 2), 2);
        assert_eq!(AMOOp::Add.apply(u32::MAX, 2), 1);
        assert_eq!(AMOOp::Xor.apply(0b1100, 0b1010), 0b0110);
        assert_eq!(AMOOp::Min.apply(minus_one, 1), minus_one);
        assert_eq!(AMOOp::Max.apply(minus_one, 1), 1);
        assert_eq!(AMOOp::MinU.apply(minus_one, 1), 1);
        assert_eq!(AMOOp::MaxU.apply(minus_one, 1), minus_one);
    }
}
