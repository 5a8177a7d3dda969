use crate::{
    isa::{
        AMOOp, Instruction, InstructionB, InstructionCSR, InstructionCSRImm, InstructionFence,
        InstructionI, InstructionJ, InstructionR, InstructionS, InstructionShift, InstructionU,
    },
    registers::Register,
    rvc,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IFUError {
    #[error("Unknown instruction '0x{instruction:0X}'")]
    UnknownInstruction { instruction: u32 },
}

/// Moves the `len`-bit field at `pos` to `target_pos`, zero-extended.
pub(crate) const fn cut_move(value: u32, len: u32, pos: u32, target_pos: u32) -> u32 {
    ((value >> pos) & ((1 << len) - 1)) << target_pos
}

/// Sign-extends the low `bits` bits of `value`.
pub(crate) const fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;

    ((value << shift) as i32) >> shift
}

/// Compressed encodings have anything but `0b11` in the low two bits.
pub const fn is_compressed(instruction: u32) -> bool {
    instruction & 0b11 != 0b11
}

const fn fetch_funct3(instruction: u32) -> u32 {
    (instruction >> 12) & 0b111
}

const fn fetch_funct7(instruction: u32) -> u32 {
    instruction >> 25
}

const fn fetch_rd(instruction: u32) -> Register {
    Register::from_bits(instruction >> 7)
}

const fn fetch_rs1(instruction: u32) -> Register {
    Register::from_bits(instruction >> 15)
}

const fn fetch_rs2(instruction: u32) -> Register {
    Register::from_bits(instruction >> 20)
}

const fn fetch_imm_i(instruction: u32) -> i16 {
    sign_extend(cut_move(instruction, 12, 20, 0), 12) as i16
}

const fn fetch_imm_s(instruction: u32) -> i16 {
    // [4:0]
    let mut result = cut_move(instruction, 5, 7, 0);
    // [11:5]
    result |= cut_move(instruction, 7, 25, 5);

    sign_extend(result, 12) as i16
}

const fn fetch_imm_b(instruction: u32) -> i16 {
    // [4:1]
    let mut result = cut_move(instruction, 4, 8, 1);
    // [10:5]
    result |= cut_move(instruction, 6, 25, 5);
    // [11]
    result |= cut_move(instruction, 1, 7, 11);
    // [12]
    result |= cut_move(instruction, 1, 31, 12);

    sign_extend(result, 13) as i16
}

const fn fetch_imm_u(instruction: u32) -> i32 {
    (instruction & 0xFFFF_F000) as i32
}

const fn fetch_imm_j(instruction: u32) -> i32 {
    // [10:1]
    let mut result = cut_move(instruction, 10, 21, 1);
    // [11]
    result |= cut_move(instruction, 1, 20, 11);
    // [19:12]
    result |= cut_move(instruction, 8, 12, 12);
    // [20]
    result |= cut_move(instruction, 1, 31, 20);

    sign_extend(result, 21)
}

const fn fetch_instruction_r(instruction: u32) -> InstructionR {
    InstructionR::new(
        fetch_rd(instruction),
        fetch_rs1(instruction),
        fetch_rs2(instruction),
    )
}

const fn fetch_instruction_i(instruction: u32) -> InstructionI {
    InstructionI::new(
        fetch_rd(instruction),
        fetch_rs1(instruction),
        fetch_imm_i(instruction),
    )
}

const fn fetch_instruction_shift(instruction: u32) -> InstructionShift {
    InstructionShift::new(
        fetch_rd(instruction),
        fetch_rs1(instruction),
        cut_move(instruction, 5, 20, 0) as u8,
    )
}

const fn fetch_instruction_csr(instruction: u32) -> InstructionCSR {
    InstructionCSR::new(
        fetch_rd(instruction),
        fetch_rs1(instruction),
        cut_move(instruction, 12, 20, 0) as u16,
    )
}

const fn fetch_instruction_csr_imm(instruction: u32) -> InstructionCSRImm {
    InstructionCSRImm::new(
        fetch_rd(instruction),
        cut_move(instruction, 5, 15, 0) as u8,
        cut_move(instruction, 12, 20, 0) as u16,
    )
}

const fn fetch_instruction_s(instruction: u32) -> InstructionS {
    InstructionS::new(
        fetch_rs1(instruction),
        fetch_rs2(instruction),
        fetch_imm_s(instruction),
    )
}

const fn fetch_instruction_b(instruction: u32) -> InstructionB {
    InstructionB::new(
        fetch_rs1(instruction),
        fetch_rs2(instruction),
        fetch_imm_b(instruction),
    )
}

const fn fetch_instruction_u(instruction: u32) -> InstructionU {
    InstructionU::new(fetch_rd(instruction), fetch_imm_u(instruction))
}

const fn fetch_instruction_j(instruction: u32) -> InstructionJ {
    InstructionJ::new(fetch_rd(instruction), fetch_imm_j(instruction))
}

const fn fetch_instruction_fence(instruction: u32) -> InstructionFence {
    InstructionFence::new(
        cut_move(instruction, 4, 20, 0) as u8,
        cut_move(instruction, 4, 24, 0) as u8,
        cut_move(instruction, 4, 28, 0) as u8,
    )
}

/// Instruction decoder for both encoding widths.
#[derive(Debug, Clone, Default)]
pub struct IFU;

impl IFU {
    pub fn fetch(&mut self, instruction: u32) -> Result<Instruction, IFUError> {
        let opcode = instruction & 0b111_1111;
        let unknown = IFUError::UnknownInstruction { instruction };

        match opcode {
            0b0110111 => Ok(Instruction::LUI(fetch_instruction_u(instruction))),
            0b0010111 => Ok(Instruction::AUIPC(fetch_instruction_u(instruction))),
            0b1101111 => Ok(Instruction::JAL(fetch_instruction_j(instruction))),
            0b1100111 => match fetch_funct3(instruction) {
                0b000 => Ok(Instruction::JALR(fetch_instruction_i(instruction))),
                _ => Err(unknown),
            },
            0b1100011 => {
                let branch = fetch_instruction_b(instruction);

                match fetch_funct3(instruction) {
                    0b000 => Ok(Instruction::BEQ(branch)),
                    0b001 => Ok(Instruction::BNE(branch)),
                    0b100 => Ok(Instruction::BLT(branch)),
                    0b101 => Ok(Instruction::BGE(branch)),
                    0b110 => Ok(Instruction::BLTU(branch)),
                    0b111 => Ok(Instruction::BGEU(branch)),
                    _ => Err(unknown),
                }
            }
            0b0000011 => {
                let load = fetch_instruction_i(instruction);

                match fetch_funct3(instruction) {
                    0b000 => Ok(Instruction::LB(load)),
                    0b001 => Ok(Instruction::LH(load)),
                    0b010 => Ok(Instruction::LW(load)),
                    0b100 => Ok(Instruction::LBU(load)),
                    0b101 => Ok(Instruction::LHU(load)),
                    _ => Err(unknown),
                }
            }
            0b0100011 => {
                let store = fetch_instruction_s(instruction);

                match fetch_funct3(instruction) {
                    0b000 => Ok(Instruction::SB(store)),
                    0b001 => Ok(Instruction::SH(store)),
                    0b010 => Ok(Instruction::SW(store)),
                    _ => Err(unknown),
                }
            }
            0b0010011 => {
                let funct3 = fetch_funct3(instruction);
                let funct7 = fetch_funct7(instruction);

                match (funct7, funct3) {
                    (_, 0b000) => Ok(Instruction::ADDI(fetch_instruction_i(instruction))),
                    (_, 0b010) => Ok(Instruction::SLTI(fetch_instruction_i(instruction))),
                    (_, 0b011) => Ok(Instruction::SLTIU(fetch_instruction_i(instruction))),
                    (_, 0b100) => Ok(Instruction::XORI(fetch_instruction_i(instruction))),
                    (_, 0b110) => Ok(Instruction::ORI(fetch_instruction_i(instruction))),
                    (_, 0b111) => Ok(Instruction::ANDI(fetch_instruction_i(instruction))),
                    (0b0000000, 0b001) => Ok(Instruction::SLLI(fetch_instruction_shift(instruction))),
                    (0b0000000, 0b101) => Ok(Instruction::SRLI(fetch_instruction_shift(instruction))),
                    (0b0100000, 0b101) => Ok(Instruction::SRAI(fetch_instruction_shift(instruction))),
                    _ => Err(unknown),
                }
            }
            0b0110011 => {
                let r = fetch_instruction_r(instruction);

                match (fetch_funct7(instruction), fetch_funct3(instruction)) {
                    (0b0000000, 0b000) => Ok(Instruction::ADD(r)),
                    (0b0100000, 0b000) => Ok(Instruction::SUB(r)),
                    (0b0000000, 0b001) => Ok(Instruction::SLL(r)),
                    (0b0000000, 0b010) => Ok(Instruction::SLT(r)),
                    (0b0000000, 0b011) => Ok(Instruction::SLTU(r)),
                    (0b0000000, 0b100) => Ok(Instruction::XOR(r)),
                    (0b0000000, 0b101) => Ok(Instruction::SRL(r)),
                    (0b0100000, 0b101) => Ok(Instruction::SRA(r)),
                    (0b0000000, 0b110) => Ok(Instruction::OR(r)),
                    (0b0000000, 0b111) => Ok(Instruction::AND(r)),
                    // M Extension
                    (0b0000001, 0b000) => Ok(Instruction::MUL(r)),
                    (0b0000001, 0b001) => Ok(Instruction::MULH(r)),
                    (0b0000001, 0b010) => Ok(Instruction::MULHSU(r)),
                    (0b0000001, 0b011) => Ok(Instruction::MULHU(r)),
                    (0b0000001, 0b100) => Ok(Instruction::DIV(r)),
                    (0b0000001, 0b101) => Ok(Instruction::DIVU(r)),
                    (0b0000001, 0b110) => Ok(Instruction::REM(r)),
                    (0b0000001, 0b111) => Ok(Instruction::REMU(r)),
                    _ => Err(unknown),
                }
            }
            // A Extension
            0b0101111 => {
                if fetch_funct3(instruction) != 0b010 {
                    return Err(unknown);
                }

                let r = fetch_instruction_r(instruction);
                let op = match instruction >> 27 {
                    0b00010 if r.rs2.as_u8() == 0 => return Ok(Instruction::LR_W(r)),
                    0b00011 => return Ok(Instruction::SC_W(r)),
                    0b00001 => AMOOp::Swap,
                    0b00000 => AMOOp::Add,
                    0b00100 => AMOOp::Xor,
                    0b01100 => AMOOp::And,
                    0b01000 => AMOOp::Or,
                    0b10000 => AMOOp::Min,
                    0b10100 => AMOOp::Max,
                    0b11000 => AMOOp::MinU,
                    0b11100 => AMOOp::MaxU,
                    _ => return Err(unknown),
                };

                Ok(Instruction::AMO_W(op, r))
            }
            0b0001111 => match fetch_funct3(instruction) {
                0b000 => Ok(Instruction::FENCE(fetch_instruction_fence(instruction))),
                0b001 => Ok(Instruction::FENCE_I),
                _ => Err(unknown),
            },
            0b1110011 => match fetch_funct3(instruction) {
                0b000 => match instruction >> 7 {
                    0x0000_0000 => Ok(Instruction::ECALL),
                    0x0000_2000 => Ok(Instruction::EBREAK),
                    0x0060_4000 => Ok(Instruction::MRET),
                    0x0020_A000 => Ok(Instruction::WFI),
                    _ => Err(unknown),
                },
                0b001 => Ok(Instruction::CSRRW(fetch_instruction_csr(instruction))),
                0b010 => Ok(Instruction::CSRRS(fetch_instruction_csr(instruction))),
                0b011 => Ok(Instruction::CSRRC(fetch_instruction_csr(instruction))),
                0b101 => Ok(Instruction::CSRRWI(fetch_instruction_csr_imm(instruction))),
                0b110 => Ok(Instruction::CSRRSI(fetch_instruction_csr_imm(instruction))),
                0b111 => Ok(Instruction::CSRRCI(fetch_instruction_csr_imm(instruction))),
                _ => Err(unknown),
            },
            // LOAD-FP
            0b0000111 => match fetch_funct3(instruction) {
                0b010 => Ok(Instruction::FLW(fetch_instruction_i(instruction))),
                0b011 => Ok(Instruction::FLD(fetch_instruction_i(instruction))),
                _ => Err(unknown),
            },
            // STORE-FP
            0b0100111 => match fetch_funct3(instruction) {
                0b010 => Ok(Instruction::FSW(fetch_instruction_s(instruction))),
                0b011 => Ok(Instruction::FSD(fetch_instruction_s(instruction))),
                _ => Err(unknown),
            },
            // OP-FP, only the bit moves between register files
            0b1010011 => {
                let r = fetch_instruction_r(instruction);

                if fetch_funct3(instruction) != 0 || r.rs2.as_u8() != 0 {
                    return Err(unknown);
                }

                match fetch_funct7(instruction) {
                    0b1110000 => Ok(Instruction::FMV_X_W(r)),
                    0b1111000 => Ok(Instruction::FMV_W_X(r)),
                    _ => Err(unknown),
                }
            }
            _ => Err(unknown),
        }
    }

    /// Expands a 16-bit encoding into its 32-bit equivalent.
    pub fn fetch_compressed(&mut self, instruction: u16) -> Result<Instruction, IFUError> {
        rvc::decode(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::{is_compressed, IFUError, IFU};
    use crate::{
        csr,
        isa::{
            AMOOp, Instruction, InstructionB, InstructionCSR, InstructionCSRImm, InstructionI,
            InstructionJ, InstructionR, InstructionS, InstructionShift, InstructionU,
        },
        registers::{A0, A1, A5, GP, RA, S0, SP, T0, T1, ZERO},
    };

    #[test]
    fn instruction_r() {
        let mut ifu = IFU;

        assert_eq!(
            ifu.fetch(0x003100b3),
            Ok(Instruction::ADD(InstructionR::new(RA, SP, GP)))
        );
        // mul a0, a0, a1
        assert_eq!(
            ifu.fetch(0x02b50533),
            Ok(Instruction::MUL(InstructionR::new(A0, A0, A1)))
        );
    }

    #[test]
    fn instruction_i() {
        let mut ifu = IFU;

        assert_eq!(
            ifu.fetch(0x7d008113),
            Ok(Instruction::ADDI(InstructionI::new(SP, RA, 2000)))
        );
        // addi a0, a0, -1
        assert_eq!(
            ifu.fetch(0xfff50513),
            Ok(Instruction::ADDI(InstructionI::new(A0, A0, -1)))
        );
        // srai a0, a0, 3
        assert_eq!(
            ifu.fetch(0x40355513),
            Ok(Instruction::SRAI(InstructionShift::new(A0, A0, 3)))
        );
    }

    #[test]
    fn instruction_s() {
        let mut ifu = IFU;

        assert_eq!(
            ifu.fetch(0xfef42623),
            Ok(Instruction::SW(InstructionS::new(S0, A5, -20)))
        );
    }

    #[test]
    fn instruction_b() {
        let mut ifu = IFU;

        assert_eq!(
            ifu.fetch(0x00208463),
            Ok(Instruction::BEQ(InstructionB::new(RA, SP, 8)))
        );
        // bne a0, zero, -4
        assert_eq!(
            ifu.fetch(0xfe051ee3),
            Ok(Instruction::BNE(InstructionB::new(A0, ZERO, -4)))
        );
    }

    #[test]
    fn instruction_u() {
        let mut ifu = IFU;

        assert_eq!(
            ifu.fetch(0x000320b7),
            Ok(Instruction::LUI(InstructionU::new(RA, 204800)))
        );
        // lui a0, 0xfffff
        assert_eq!(
            ifu.fetch(0xfffff537),
            Ok(Instruction::LUI(InstructionU::new(A0, -4096)))
        );
    }

    #[test]
    fn instruction_j() {
        let mut ifu = IFU;

        assert_eq!(
            ifu.fetch(0x004000ef),
            Ok(Instruction::JAL(InstructionJ::new(RA, 4)))
        );
        assert_eq!(
            ifu.fetch(0xffdff06f),
            Ok(Instruction::JAL(InstructionJ::new(ZERO, -4)))
        );
    }

    #[test]
    fn system() {
        let mut ifu = IFU;

        assert_eq!(ifu.fetch(0x00000073), Ok(Instruction::ECALL));
        assert_eq!(ifu.fetch(0x00100073), Ok(Instruction::EBREAK));
        assert_eq!(ifu.fetch(0x30200073), Ok(Instruction::MRET));
        assert_eq!(ifu.fetch(0x10500073), Ok(Instruction::WFI));
        // csrrw t0, mstatus, t1
        assert_eq!(
            ifu.fetch(0x300312f3),
            Ok(Instruction::CSRRW(InstructionCSR::new(T0, T1, csr::MSTATUS)))
        );
        // csrrsi zero, mie, 8
        assert_eq!(
            ifu.fetch(0x30446073),
            Ok(Instruction::CSRRSI(InstructionCSRImm::new(ZERO, 8, csr::MIE)))
        );
    }

    #[test]
    fn atomics() {
        let mut ifu = IFU;

        // lr.w a0, (a1)
        assert_eq!(
            ifu.fetch(0x1005a52f),
            Ok(Instruction::LR_W(InstructionR::new(A0, A1, ZERO)))
        );
        // sc.w a0, a0, (a1)
        assert_eq!(
            ifu.fetch(0x18a5a52f),
            Ok(Instruction::SC_W(InstructionR::new(A0, A1, A0)))
        );
        // amoadd.w a0, a0, (a1)
        assert_eq!(
            ifu.fetch(0x00a5a52f),
            Ok(Instruction::AMO_W(AMOOp::Add, InstructionR::new(A0, A1, A0)))
        );
        // amomaxu.w a0, a0, (a1)
        assert_eq!(
            ifu.fetch(0xe0a5a52f),
            Ok(Instruction::AMO_W(AMOOp::MaxU, InstructionR::new(A0, A1, A0)))
        );
    }

    #[test]
    fn float_transport() {
        let mut ifu = IFU;

        // fmv.x.w a0, ft0
        assert_eq!(
            ifu.fetch(0xe0000553),
            Ok(Instruction::FMV_X_W(InstructionR::new(A0, ZERO, ZERO)))
        );
        // flw ft0, 8(a0)
        assert_eq!(
            ifu.fetch(0x00852007),
            Ok(Instruction::FLW(InstructionI::new(ZERO, A0, 8)))
        );
        // fadd.s is not carried
        assert!(ifu.fetch(0x00107053).is_err());
    }

    #[test]
    fn unknown() {
        let mut ifu = IFU;

        assert_eq!(
            ifu.fetch(0xffffffff),
            Err(IFUError::UnknownInstruction {
                instruction: 0xffffffff
            })
        );
        assert!(is_compressed(0x4415));
        assert!(!is_compressed(0x00000073));
    }
}
