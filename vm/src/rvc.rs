//! Decoder for the 16-bit "C" encodings. Every compressed instruction is
//! expanded into the [Instruction] it abbreviates; immediates are gathered
//! from their scattered bit positions with [cut_move].

use crate::{
    ifu::{cut_move, sign_extend, IFUError},
    isa::{
        Instruction, InstructionB, InstructionI, InstructionJ, InstructionR, InstructionS,
        InstructionShift, InstructionU,
    },
    registers::{Register, RA, SP, ZERO},
};

/// `rd'`/`rs2'` at bits 4:2.
const fn c_rs2_short(op: u32) -> Register {
    Register::from_compressed(op >> 2)
}

/// `rs1'`/`rd'` at bits 9:7.
const fn c_rs1_short(op: u32) -> Register {
    Register::from_compressed(op >> 7)
}

const fn c_rd(op: u32) -> Register {
    Register::from_bits(op >> 7)
}

const fn c_rs2(op: u32) -> Register {
    Register::from_bits(op >> 2)
}

/// `c.lw`/`c.sw`/`c.flw`/`c.fsw`: uimm[5:3|2|6]
const fn c_sw_lw_off(op: u32) -> i16 {
    (cut_move(op, 3, 10, 3) | cut_move(op, 1, 6, 2) | cut_move(op, 1, 5, 6)) as i16
}

/// `c.ld`/`c.sd`/`c.fld`/`c.fsd`: uimm[5:3|7:6]
const fn c_sd_ld_off(op: u32) -> i16 {
    (cut_move(op, 3, 10, 3) | cut_move(op, 2, 5, 6)) as i16
}

/// `c.addi`/`c.li`/`c.andi`: imm[5|4:0], signed
const fn c_li_imm(op: u32) -> i32 {
    sign_extend(cut_move(op, 1, 12, 5) | cut_move(op, 5, 2, 0), 6)
}

/// Shift amount; bit 5 must be clear on RV32.
const fn c_shamt(op: u32) -> Option<u8> {
    if op & (1 << 12) != 0 {
        None
    } else {
        Some(cut_move(op, 5, 2, 0) as u8)
    }
}

/// `c.beqz`/`c.bnez`: offset[8|4:3] at 12:10, [7:6|2:1|5] at 6:2
const fn c_boff(op: u32) -> i16 {
    let mut off = cut_move(op, 1, 12, 8);
    off |= cut_move(op, 2, 10, 3);
    off |= cut_move(op, 2, 5, 6);
    off |= cut_move(op, 2, 3, 1);
    off |= cut_move(op, 1, 2, 5);

    sign_extend(off, 9) as i16
}

/// `c.j`/`c.jal`: offset[11|4|9:8|10|6|7|3:1|5] at 12:2
const fn c_joff(op: u32) -> i32 {
    let mut off = cut_move(op, 1, 12, 11);
    off |= cut_move(op, 1, 11, 4);
    off |= cut_move(op, 2, 9, 8);
    off |= cut_move(op, 1, 8, 10);
    off |= cut_move(op, 1, 7, 6);
    off |= cut_move(op, 1, 6, 7);
    off |= cut_move(op, 3, 3, 1);
    off |= cut_move(op, 1, 2, 5);

    sign_extend(off, 12)
}

/// `c.addi16sp`: nzimm[9] at 12, [4|6|8:7|5] at 6:2
const fn c_addisp_off(op: u32) -> i32 {
    let mut off = cut_move(op, 1, 12, 9);
    off |= cut_move(op, 1, 6, 4);
    off |= cut_move(op, 1, 5, 6);
    off |= cut_move(op, 2, 3, 7);
    off |= cut_move(op, 1, 2, 5);

    sign_extend(off, 10)
}

/// `c.lui`: nzimm[17] at 12, [16:12] at 6:2
const fn c_lui_imm(op: u32) -> i32 {
    sign_extend(cut_move(op, 1, 12, 17) | cut_move(op, 5, 2, 12), 18)
}

/// `c.addi4spn`: nzuimm[5:4|9:6|2|3] at 12:5
const fn c_addi4spn_off(op: u32) -> i16 {
    let mut off = cut_move(op, 2, 11, 4);
    off |= cut_move(op, 4, 7, 6);
    off |= cut_move(op, 1, 6, 2);
    off |= cut_move(op, 1, 5, 3);

    off as i16
}

/// `c.lwsp`/`c.flwsp`: uimm[5] at 12, [4:2|7:6] at 6:2
const fn c_lwsp_off(op: u32) -> i16 {
    (cut_move(op, 1, 12, 5) | cut_move(op, 3, 4, 2) | cut_move(op, 2, 2, 6)) as i16
}

/// `c.ldsp`/`c.fldsp`: uimm[5] at 12, [4:3|8:6] at 6:2
const fn c_ldsp_off(op: u32) -> i16 {
    (cut_move(op, 1, 12, 5) | cut_move(op, 2, 5, 3) | cut_move(op, 3, 2, 6)) as i16
}

/// `c.swsp`/`c.fswsp`: uimm[5:2|7:6] at 12:7
const fn c_swsp_off(op: u32) -> i16 {
    (cut_move(op, 4, 9, 2) | cut_move(op, 2, 7, 6)) as i16
}

/// `c.sdsp`/`c.fsdsp`: uimm[5:3|8:6] at 12:7
const fn c_sdsp_off(op: u32) -> i16 {
    (cut_move(op, 3, 10, 3) | cut_move(op, 3, 7, 6)) as i16
}

pub fn decode(instruction: u16) -> Result<Instruction, IFUError> {
    let op = instruction as u32;
    let unknown = IFUError::UnknownInstruction { instruction: op };
    let funct3 = op >> 13;

    match (op & 0b11, funct3) {
        // Quadrant 0
        (0b00, 0b000) => {
            let imm = c_addi4spn_off(op);

            if imm == 0 {
                return Err(unknown);
            }

            Ok(Instruction::ADDI(InstructionI::new(c_rs2_short(op), SP, imm)))
        }
        (0b00, 0b001) => Ok(Instruction::FLD(InstructionI::new(
            c_rs2_short(op),
            c_rs1_short(op),
            c_sd_ld_off(op),
        ))),
        (0b00, 0b010) => Ok(Instruction::LW(InstructionI::new(
            c_rs2_short(op),
            c_rs1_short(op),
            c_sw_lw_off(op),
        ))),
        (0b00, 0b011) => Ok(Instruction::FLW(InstructionI::new(
            c_rs2_short(op),
            c_rs1_short(op),
            c_sw_lw_off(op),
        ))),
        (0b00, 0b101) => Ok(Instruction::FSD(InstructionS::new(
            c_rs1_short(op),
            c_rs2_short(op),
            c_sd_ld_off(op),
        ))),
        (0b00, 0b110) => Ok(Instruction::SW(InstructionS::new(
            c_rs1_short(op),
            c_rs2_short(op),
            c_sw_lw_off(op),
        ))),
        (0b00, 0b111) => Ok(Instruction::FSW(InstructionS::new(
            c_rs1_short(op),
            c_rs2_short(op),
            c_sw_lw_off(op),
        ))),
        // Quadrant 1
        (0b01, 0b000) => {
            let rd = c_rd(op);

            Ok(Instruction::ADDI(InstructionI::new(rd, rd, c_li_imm(op) as i16)))
        }
        (0b01, 0b001) => Ok(Instruction::JAL(InstructionJ::new(RA, c_joff(op)))),
        (0b01, 0b010) => Ok(Instruction::ADDI(InstructionI::new(
            c_rd(op),
            ZERO,
            c_li_imm(op) as i16,
        ))),
        (0b01, 0b011) => {
            let rd = c_rd(op);

            if rd == SP {
                let imm = c_addisp_off(op);

                if imm == 0 {
                    return Err(unknown);
                }

                Ok(Instruction::ADDI(InstructionI::new(SP, SP, imm as i16)))
            } else {
                let imm = c_lui_imm(op);

                if imm == 0 {
                    return Err(unknown);
                }

                Ok(Instruction::LUI(InstructionU::new(rd, imm)))
            }
        }
        (0b01, 0b100) => {
            let rd = c_rs1_short(op);

            match cut_move(op, 2, 10, 0) {
                0b00 => c_shamt(op)
                    .map(|shamt| Instruction::SRLI(InstructionShift::new(rd, rd, shamt)))
                    .ok_or(unknown),
                0b01 => c_shamt(op)
                    .map(|shamt| Instruction::SRAI(InstructionShift::new(rd, rd, shamt)))
                    .ok_or(unknown),
                0b10 => Ok(Instruction::ANDI(InstructionI::new(
                    rd,
                    rd,
                    c_li_imm(op) as i16,
                ))),
                _ => {
                    if op & (1 << 12) != 0 {
                        return Err(unknown);
                    }

                    let r = InstructionR::new(rd, rd, c_rs2_short(op));

                    match cut_move(op, 2, 5, 0) {
                        0b00 => Ok(Instruction::SUB(r)),
                        0b01 => Ok(Instruction::XOR(r)),
                        0b10 => Ok(Instruction::OR(r)),
                        _ => Ok(Instruction::AND(r)),
                    }
                }
            }
        }
        (0b01, 0b101) => Ok(Instruction::JAL(InstructionJ::new(ZERO, c_joff(op)))),
        (0b01, 0b110) => Ok(Instruction::BEQ(InstructionB::new(
            c_rs1_short(op),
            ZERO,
            c_boff(op),
        ))),
        (0b01, 0b111) => Ok(Instruction::BNE(InstructionB::new(
            c_rs1_short(op),
            ZERO,
            c_boff(op),
        ))),
        // Quadrant 2
        (0b10, 0b000) => {
            let rd = c_rd(op);

            c_shamt(op)
                .map(|shamt| Instruction::SLLI(InstructionShift::new(rd, rd, shamt)))
                .ok_or(unknown)
        }
        (0b10, 0b001) => Ok(Instruction::FLD(InstructionI::new(
            c_rd(op),
            SP,
            c_ldsp_off(op),
        ))),
        (0b10, 0b010) => {
            let rd = c_rd(op);

            if rd == ZERO {
                return Err(unknown);
            }

            Ok(Instruction::LW(InstructionI::new(rd, SP, c_lwsp_off(op))))
        }
        (0b10, 0b011) => Ok(Instruction::FLW(InstructionI::new(
            c_rd(op),
            SP,
            c_lwsp_off(op),
        ))),
        (0b10, 0b100) => {
            let rd = c_rd(op);
            let rs2 = c_rs2(op);
            let link = op & (1 << 12) != 0;

            match (link, rd == ZERO, rs2 == ZERO) {
                // c.jr
                (false, false, true) => Ok(Instruction::JALR(InstructionI::new(ZERO, rd, 0))),
                (false, true, true) => Err(unknown),
                // c.mv
                (false, _, false) => Ok(Instruction::ADD(InstructionR::new(rd, ZERO, rs2))),
                (true, true, true) => Ok(Instruction::EBREAK),
                // c.jalr
                (true, false, true) => Ok(Instruction::JALR(InstructionI::new(RA, rd, 0))),
                // c.add
                (true, _, false) => Ok(Instruction::ADD(InstructionR::new(rd, rd, rs2))),
            }
        }
        (0b10, 0b101) => Ok(Instruction::FSD(InstructionS::new(
            SP,
            c_rs2(op),
            c_sdsp_off(op),
        ))),
        (0b10, 0b110) => Ok(Instruction::SW(InstructionS::new(
            SP,
            c_rs2(op),
            c_swsp_off(op),
        ))),
        (0b10, 0b111) => Ok(Instruction::FSW(InstructionS::new(
            SP,
            c_rs2(op),
            c_swsp_off(op),
        ))),
        _ => Err(unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::decode;
    use crate::{
        isa::{
            Instruction, InstructionB, InstructionI, InstructionJ, InstructionR, InstructionS,
            InstructionShift, InstructionU,
        },
        registers::{Register, A0, A1, A5, RA, S0, SP, ZERO},
    };

    #[test]
    fn quadrant_0() {
        // c.addi4spn s0, sp, 16
        assert_eq!(
            decode(0x0800),
            Ok(Instruction::ADDI(InstructionI::new(S0, SP, 16)))
        );
        // c.lw a0, 4(a1)
        assert_eq!(
            decode(0x41c8),
            Ok(Instruction::LW(InstructionI::new(A0, A1, 4)))
        );
        // c.sw a0, 4(a1)
        assert_eq!(
            decode(0xc1c8),
            Ok(Instruction::SW(InstructionS::new(A1, A0, 4)))
        );
        // c.fld fs0, 8(a0)
        assert_eq!(
            decode(0x2500),
            Ok(Instruction::FLD(InstructionI::new(S0, A0, 8)))
        );
        // The all-zero halfword is illegal.
        assert!(decode(0x0000).is_err());
    }

    #[test]
    fn quadrant_1() {
        // c.li s0, 5
        assert_eq!(
            decode(0x4415),
            Ok(Instruction::ADDI(InstructionI::new(S0, ZERO, 5)))
        );
        // c.addi s0, 3
        assert_eq!(
            decode(0x040d),
            Ok(Instruction::ADDI(InstructionI::new(S0, S0, 3)))
        );
        // c.addi16sp sp, -48
        assert_eq!(
            decode(0x7179),
            Ok(Instruction::ADDI(InstructionI::new(SP, SP, -48)))
        );
        // c.lui a5, 0x10 / c.lui a5, 0xfffff
        assert_eq!(
            decode(0x67c1),
            Ok(Instruction::LUI(InstructionU::new(A5, 0x10000)))
        );
        assert_eq!(
            decode(0x77fd),
            Ok(Instruction::LUI(InstructionU::new(A5, -4096)))
        );
        // c.srai a0, 1 / c.andi a0, -1 / c.sub a0, a1
        assert_eq!(
            decode(0x8505),
            Ok(Instruction::SRAI(InstructionShift::new(A0, A0, 1)))
        );
        assert_eq!(
            decode(0x997d),
            Ok(Instruction::ANDI(InstructionI::new(A0, A0, -1)))
        );
        assert_eq!(
            decode(0x8d0d),
            Ok(Instruction::SUB(InstructionR::new(A0, A0, A1)))
        );
    }

    #[test]
    fn control_flow() {
        // c.j -2
        assert_eq!(
            decode(0xbffd),
            Ok(Instruction::JAL(InstructionJ::new(ZERO, -2)))
        );
        // c.jal 16
        assert_eq!(
            decode(0x2801),
            Ok(Instruction::JAL(InstructionJ::new(RA, 16)))
        );
        // c.beqz s0, 8 / c.bnez a0, -4
        assert_eq!(
            decode(0xc401),
            Ok(Instruction::BEQ(InstructionB::new(S0, ZERO, 8)))
        );
        assert_eq!(
            decode(0xfd75),
            Ok(Instruction::BNE(InstructionB::new(A0, ZERO, -4)))
        );
        // c.jr ra
        assert_eq!(
            decode(0x8082),
            Ok(Instruction::JALR(InstructionI::new(ZERO, RA, 0)))
        );
        assert_eq!(decode(0x9002), Ok(Instruction::EBREAK));
    }

    #[test]
    fn quadrant_2() {
        // c.mv a0, a1 / c.add a0, a1
        assert_eq!(
            decode(0x852e),
            Ok(Instruction::ADD(InstructionR::new(A0, ZERO, A1)))
        );
        assert_eq!(
            decode(0x952e),
            Ok(Instruction::ADD(InstructionR::new(A0, A0, A1)))
        );
        // c.slli a0, 2
        assert_eq!(
            decode(0x050a),
            Ok(Instruction::SLLI(InstructionShift::new(A0, A0, 2)))
        );
        // c.swsp ra, 44(sp) / c.lwsp ra, 44(sp)
        assert_eq!(
            decode(0xd606),
            Ok(Instruction::SW(InstructionS::new(SP, RA, 44)))
        );
        assert_eq!(
            decode(0x50b2),
            Ok(Instruction::LW(InstructionI::new(RA, SP, 44)))
        );
        // c.flwsp ft0, 4(sp) / c.fsdsp fs0, 8(sp)
        assert_eq!(
            decode(0x6012),
            Ok(Instruction::FLW(InstructionI::new(ZERO, SP, 4)))
        );
        assert_eq!(
            decode(0xa422),
            Ok(Instruction::FSD(InstructionS::new(SP, S0, 8)))
        );
        // c.lwsp with rd = x0 is reserved
        assert!(decode(0x4002).is_err());
        assert_eq!(Register::new(8), Some(S0));
    }
}
