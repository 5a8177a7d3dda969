use crate::{
    csr::{self, CSR},
    devices::Devices,
    ifu::{is_compressed, IFU},
    isa::{
        Instruction, InstructionB, InstructionCSR, InstructionCSRImm, InstructionI, InstructionJ,
        InstructionR, InstructionS, InstructionShift, InstructionU,
    },
    mmu::MMU,
    prof,
    ram::RAM,
    registers::{Registers, A0, A7},
    trap::{self, HartState, Interrupt},
};

/// Linux `exit` syscall number.
pub const SYS_EXIT: u32 = 93;

/// Upper word of a NaN-boxed single-precision value.
const NAN_BOX: u64 = 0xFFFF_FFFF_0000_0000;

#[derive(Debug, Default, Clone)]
pub struct MachineInfo {
    pub vendor_id: u32,
    pub arch_id: u32,
    pub impl_id: u32,
    pub hart_id: u32,
}

#[derive(Debug, Clone)]
pub struct CPUConfig {
    pub machine_info: MachineInfo,
    /// Guest memory size in bytes, a power of two.
    pub memory_size: u32,
    pub reset_vector: u32,
}

const fn misa() -> u32 {
    let mut misa = 0;

    // A Extension
    misa |= 0b1 << 0;
    // C Extension
    misa |= 0b1 << 2;
    // I Extension
    misa |= 0b1 << 8;
    // M Extension
    misa |= 0b1 << 12;
    // 32-bit
    misa |= 1 << 30;

    misa
}

/// The hart: register files, the memory path and the trap state.
#[derive(Debug)]
pub struct CPU {
    pub registers: Registers,
    pub mmu: MMU,
    pub ifu: IFU,
    pub csr: CSR,
    pub state: HartState,
    reservation: Option<u32>,
    exit_code: Option<u32>,
}

impl CPU {
    pub fn new(config: CPUConfig, devices: Devices) -> Result<Self, anyhow::Error> {
        let ram = RAM::new(config.memory_size)?;
        let mut csr = CSR::new();
        let minfo = config.machine_info;

        csr.set(csr::MISA, misa());
        csr.set(csr::MVENDORID, minfo.vendor_id);
        csr.set(csr::MARCHID, minfo.arch_id);
        csr.set(csr::MIMPID, minfo.impl_id);
        csr.set(csr::MHARTID, minfo.hart_id);

        let mut registers = Registers::default();

        *registers.pc_mut() = config.reset_vector;

        Ok(Self {
            registers,
            mmu: MMU::new(ram, devices),
            ifu: IFU,
            csr,
            state: HartState::Running,
            reservation: None,
            exit_code: None,
        })
    }

    /// Set once the guest called `exit`.
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    pub fn reservation(&self) -> Option<u32> {
        self.reservation
    }

    pub fn raise_interrupt(&mut self, interrupt: Interrupt) {
        if trap::raise(&mut self.csr, self.registers.pc_mut(), interrupt) == HartState::Trapped {
            self.state = HartState::Trapped;
        }
    }

    pub fn clear_interrupt(&mut self, interrupt: Interrupt) {
        trap::clear(&mut self.csr, interrupt);
    }

    /// Resamples the timer and raises or clears the timer interrupt.
    pub fn check_timer(&mut self) {
        let clock = &mut self.mmu.devices_mut().clock;

        clock.update();

        if clock.expired() {
            self.raise_interrupt(Interrupt::MachineTimer);
        } else {
            self.clear_interrupt(Interrupt::MachineTimer);
        }
    }

    /// Executes up to `count` instructions, stopping early on guest exit.
    /// Returns how many were executed.
    pub fn run(&mut self, count: u64) -> u64 {
        let _span = prof::span!("CPU::run");

        for executed in 0..count {
            if self.exit_code.is_some() {
                return executed;
            }

            self.tick();
        }

        count
    }

    pub fn tick(&mut self) {
        let pc = self.registers.pc();
        let word = self.mmu.read32(pc);

        let (decoded, len) = if is_compressed(word) {
            (self.ifu.fetch_compressed(word as u16), 2)
        } else {
            (self.ifu.fetch(word), 4)
        };

        let npc = pc.wrapping_add(len);

        match decoded {
            Ok(instruction) => self.execute(instruction, pc, npc),
            Err(error) => {
                tracing::trace!(%error, pc, "ignoring instruction");
                *self.registers.pc_mut() = npc;
            }
        }

        self.registers.clear_zero();
    }

    fn effective_address(&self, base: crate::registers::Register, imm: i16) -> u32 {
        self.registers.get(base).wrapping_add_signed(imm as i32)
    }

    /// Drops the reservation if any byte of `[address, address + size)`
    /// lands on the reserved word once wrapped into memory.
    fn invalidate_reservation(&mut self, address: u32, size: u32) {
        let Some(reserved) = self.reservation else {
            return;
        };

        let mmu = &self.mmu;
        let overlaps = (0..size).any(|i| {
            let byte = mmu.physical_address(address.wrapping_add(i));

            (0..4).any(|j| mmu.physical_address(reserved.wrapping_add(j)) == byte)
        });

        if overlaps {
            self.reservation = None;
        }
    }

    fn store(&mut self, address: u32, value: u32, size: u32) {
        self.invalidate_reservation(address, size);

        match size {
            1 => self.mmu.write8(value, address),
            2 => self.mmu.write16(value, address),
            _ => self.mmu.write32(value, address),
        }
    }

    fn branch(&mut self, taken: bool, pc: u32, imm: i16) -> bool {
        if taken {
            *self.registers.pc_mut() = pc.wrapping_add_signed(imm as i32);
        }

        taken
    }

    fn execute(&mut self, instruction: Instruction, pc: u32, npc: u32) {
        match instruction {
            Instruction::LUI(InstructionU { rd, imm }) => {
                self.registers.set(rd, imm as u32);
            }
            Instruction::AUIPC(InstructionU { rd, imm }) => {
                self.registers.set(rd, pc.wrapping_add_signed(imm));
            }
            Instruction::JAL(InstructionJ { rd, imm }) => {
                self.registers.set(rd, npc);
                *self.registers.pc_mut() = pc.wrapping_add_signed(imm);

                return;
            }
            Instruction::JALR(InstructionI { rd, rs1, imm }) => {
                let target = self.effective_address(rs1, imm) & !1;

                self.registers.set(rd, npc);
                *self.registers.pc_mut() = target;

                return;
            }
            Instruction::BEQ(InstructionB { rs1, rs2, imm }) => {
                let taken = self.registers.get(rs1) == self.registers.get(rs2);

                if self.branch(taken, pc, imm) {
                    return;
                }
            }
            Instruction::BNE(InstructionB { rs1, rs2, imm }) => {
                let taken = self.registers.get(rs1) != self.registers.get(rs2);

                if self.branch(taken, pc, imm) {
                    return;
                }
            }
            Instruction::BLT(InstructionB { rs1, rs2, imm }) => {
                let taken = (self.registers.get(rs1) as i32) < (self.registers.get(rs2) as i32);

                if self.branch(taken, pc, imm) {
                    return;
                }
            }
            Instruction::BGE(InstructionB { rs1, rs2, imm }) => {
                let taken = (self.registers.get(rs1) as i32) >= (self.registers.get(rs2) as i32);

                if self.branch(taken, pc, imm) {
                    return;
                }
            }
            Instruction::BLTU(InstructionB { rs1, rs2, imm }) => {
                let taken = self.registers.get(rs1) < self.registers.get(rs2);

                if self.branch(taken, pc, imm) {
                    return;
                }
            }
            Instruction::BGEU(InstructionB { rs1, rs2, imm }) => {
                let taken = self.registers.get(rs1) >= self.registers.get(rs2);

                if self.branch(taken, pc, imm) {
                    return;
                }
            }
            Instruction::LB(InstructionI { rd, rs1, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let value = self.mmu.read8(addr) as u8 as i8 as i32;

                self.registers.set(rd, value as u32);
            }
            Instruction::LH(InstructionI { rd, rs1, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let value = self.mmu.read16(addr) as u16 as i16 as i32;

                self.registers.set(rd, value as u32);
            }
            Instruction::LW(InstructionI { rd, rs1, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let value = self.mmu.read32(addr);

                self.registers.set(rd, value);
            }
            Instruction::LBU(InstructionI { rd, rs1, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let value = self.mmu.read8(addr);

                self.registers.set(rd, value);
            }
            Instruction::LHU(InstructionI { rd, rs1, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let value = self.mmu.read16(addr);

                self.registers.set(rd, value);
            }
            Instruction::SB(InstructionS { rs1, rs2, imm }) => {
                let addr = self.effective_address(rs1, imm);

                self.store(addr, self.registers.get(rs2), 1);
            }
            Instruction::SH(InstructionS { rs1, rs2, imm }) => {
                let addr = self.effective_address(rs1, imm);

                self.store(addr, self.registers.get(rs2), 2);
            }
            Instruction::SW(InstructionS { rs1, rs2, imm }) => {
                let addr = self.effective_address(rs1, imm);

                self.store(addr, self.registers.get(rs2), 4);
            }
            Instruction::ADDI(InstructionI { rd, rs1, imm }) => {
                let result = self.effective_address(rs1, imm);

                self.registers.set(rd, result);
            }
            Instruction::SLTI(InstructionI { rd, rs1, imm }) => {
                let result = (self.registers.get(rs1) as i32) < imm as i32;

                self.registers.set(rd, result as u32);
            }
            Instruction::SLTIU(InstructionI { rd, rs1, imm }) => {
                let result = self.registers.get(rs1) < imm as i32 as u32;

                self.registers.set(rd, result as u32);
            }
            Instruction::XORI(InstructionI { rd, rs1, imm }) => {
                let result = self.registers.get(rs1) ^ imm as i32 as u32;

                self.registers.set(rd, result);
            }
            Instruction::ORI(InstructionI { rd, rs1, imm }) => {
                let result = self.registers.get(rs1) | imm as i32 as u32;

                self.registers.set(rd, result);
            }
            Instruction::ANDI(InstructionI { rd, rs1, imm }) => {
                let result = self.registers.get(rs1) & imm as i32 as u32;

                self.registers.set(rd, result);
            }
            Instruction::SLLI(InstructionShift { rd, rs1, shamt }) => {
                let result = self.registers.get(rs1).wrapping_shl(shamt as u32);

                self.registers.set(rd, result);
            }
            Instruction::SRLI(InstructionShift { rd, rs1, shamt }) => {
                let result = self.registers.get(rs1).wrapping_shr(shamt as u32);

                self.registers.set(rd, result);
            }
            Instruction::SRAI(InstructionShift { rd, rs1, shamt }) => {
                let result = (self.registers.get(rs1) as i32).wrapping_shr(shamt as u32);

                self.registers.set(rd, result as u32);
            }
            Instruction::ADD(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1).wrapping_add(self.registers.get(rs2));

                self.registers.set(rd, result);
            }
            Instruction::SUB(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1).wrapping_sub(self.registers.get(rs2));

                self.registers.set(rd, result);
            }
            Instruction::SLL(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1).wrapping_shl(self.registers.get(rs2));

                self.registers.set(rd, result);
            }
            Instruction::SLT(InstructionR { rd, rs1, rs2 }) => {
                let result = (self.registers.get(rs1) as i32) < (self.registers.get(rs2) as i32);

                self.registers.set(rd, result as u32);
            }
            Instruction::SLTU(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1) < self.registers.get(rs2);

                self.registers.set(rd, result as u32);
            }
            Instruction::XOR(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1) ^ self.registers.get(rs2);

                self.registers.set(rd, result);
            }
            Instruction::SRL(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1).wrapping_shr(self.registers.get(rs2));

                self.registers.set(rd, result);
            }
            Instruction::SRA(InstructionR { rd, rs1, rs2 }) => {
                let result = (self.registers.get(rs1) as i32).wrapping_shr(self.registers.get(rs2));

                self.registers.set(rd, result as u32);
            }
            Instruction::OR(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1) | self.registers.get(rs2);

                self.registers.set(rd, result);
            }
            Instruction::AND(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1) & self.registers.get(rs2);

                self.registers.set(rd, result);
            }
            Instruction::FENCE(_) | Instruction::FENCE_I => {}
            Instruction::EBREAK | Instruction::WFI => {}
            Instruction::ECALL => self.ecall(),
            Instruction::MRET => {
                self.state = trap::mret(&mut self.csr, self.registers.pc_mut());

                return;
            }
            // Zicsr
            Instruction::CSRRW(InstructionCSR { rd, rs1, csr }) => {
                let value = self.registers.get(rs1);

                self.registers.set(rd, self.csr.read_write(csr, value));
            }
            Instruction::CSRRS(InstructionCSR { rd, rs1, csr }) => {
                let bits = self.registers.get(rs1);

                self.registers.set(rd, self.csr.read_set(csr, bits));
            }
            Instruction::CSRRC(InstructionCSR { rd, rs1, csr }) => {
                let bits = self.registers.get(rs1);

                self.registers.set(rd, self.csr.read_clear(csr, bits));
            }
            Instruction::CSRRWI(InstructionCSRImm { rd, imm, csr }) => {
                self.registers.set(rd, self.csr.read_write(csr, imm as u32));
            }
            Instruction::CSRRSI(InstructionCSRImm { rd, imm, csr }) => {
                self.registers.set(rd, self.csr.read_set(csr, imm as u32));
            }
            Instruction::CSRRCI(InstructionCSRImm { rd, imm, csr }) => {
                self.registers.set(rd, self.csr.read_clear(csr, imm as u32));
            }
            // M Extension
            Instruction::MUL(InstructionR { rd, rs1, rs2 }) => {
                let result = self.registers.get(rs1).wrapping_mul(self.registers.get(rs2));

                self.registers.set(rd, result);
            }
            Instruction::MULH(InstructionR { rd, rs1, rs2 }) => {
                let rs1 = self.registers.get(rs1) as i32 as i64;
                let rs2 = self.registers.get(rs2) as i32 as i64;
                let result = (rs1.wrapping_mul(rs2) >> 32) as u32;

                self.registers.set(rd, result);
            }
            Instruction::MULHSU(InstructionR { rd, rs1, rs2 }) => {
                let rs1 = self.registers.get(rs1) as i32 as i64;
                let rs2 = self.registers.get(rs2) as u64 as i64;
                let result = (rs1.wrapping_mul(rs2) >> 32) as u32;

                self.registers.set(rd, result);
            }
            Instruction::MULHU(InstructionR { rd, rs1, rs2 }) => {
                let rs1 = self.registers.get(rs1) as u64;
                let rs2 = self.registers.get(rs2) as u64;
                let result = (rs1.wrapping_mul(rs2) >> 32) as u32;

                self.registers.set(rd, result);
            }
            Instruction::DIV(InstructionR { rd, rs1, rs2 }) => {
                let rs1 = self.registers.get(rs1) as i32;
                let rs2 = self.registers.get(rs2) as i32;
                let result = if rs2 == 0 { -1 } else { rs1.wrapping_div(rs2) };

                self.registers.set(rd, result as u32);
            }
            Instruction::DIVU(InstructionR { rd, rs1, rs2 }) => {
                let rs1 = self.registers.get(rs1);
                let rs2 = self.registers.get(rs2);
                let result = rs1.checked_div(rs2).unwrap_or(u32::MAX);

                self.registers.set(rd, result);
            }
            Instruction::REM(InstructionR { rd, rs1, rs2 }) => {
                let rs1 = self.registers.get(rs1) as i32;
                let rs2 = self.registers.get(rs2) as i32;
                let result = if rs2 == 0 { rs1 } else { rs1.wrapping_rem(rs2) };

                self.registers.set(rd, result as u32);
            }
            Instruction::REMU(InstructionR { rd, rs1, rs2 }) => {
                let rs1 = self.registers.get(rs1);
                let rs2 = self.registers.get(rs2);
                let result = rs1.checked_rem(rs2).unwrap_or(rs1);

                self.registers.set(rd, result);
            }
            // A Extension
            Instruction::LR_W(InstructionR { rd, rs1, .. }) => {
                let addr = self.registers.get(rs1);

                self.registers.set(rd, self.mmu.read32(addr));
                self.reservation = Some(self.mmu.physical_address(addr));
            }
            Instruction::SC_W(InstructionR { rd, rs1, rs2 }) => {
                let addr = self.registers.get(rs1);

                if self.reservation.take() == Some(self.mmu.physical_address(addr)) {
                    self.mmu.write32(self.registers.get(rs2), addr);
                    self.registers.set(rd, 0);
                } else {
                    self.registers.set(rd, 1);
                }
            }
            Instruction::AMO_W(op, InstructionR { rd, rs1, rs2 }) => {
                let addr = self.registers.get(rs1);
                let operand = self.registers.get(rs2);
                let loaded = self.mmu.read32(addr);

                self.store(addr, op.apply(loaded, operand), 4);
                self.registers.set(rd, loaded);
            }
            // Float register transport
            Instruction::FLW(InstructionI { rd, rs1, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let value = self.mmu.read32(addr) as u64;

                self.registers.set_f(rd, NAN_BOX | value);
            }
            Instruction::FLD(InstructionI { rd, rs1, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let low = self.mmu.read32(addr) as u64;
                let high = self.mmu.read32(addr.wrapping_add(4)) as u64;

                self.registers.set_f(rd, (high << 32) | low);
            }
            Instruction::FSW(InstructionS { rs1, rs2, imm }) => {
                let addr = self.effective_address(rs1, imm);

                self.store(addr, self.registers.get_f(rs2) as u32, 4);
            }
            Instruction::FSD(InstructionS { rs1, rs2, imm }) => {
                let addr = self.effective_address(rs1, imm);
                let value = self.registers.get_f(rs2);

                self.store(addr, value as u32, 4);
                self.store(addr.wrapping_add(4), (value >> 32) as u32, 4);
            }
            Instruction::FMV_X_W(InstructionR { rd, rs1, .. }) => {
                self.registers.set(rd, self.registers.get_f(rs1) as u32);
            }
            Instruction::FMV_W_X(InstructionR { rd, rs1, .. }) => {
                self.registers.set_f(rd, NAN_BOX | self.registers.get(rs1) as u64);
            }
        }

        *self.registers.pc_mut() = npc;
    }

    fn ecall(&mut self) {
        let syscall = self.registers.get(A7);

        if syscall == SYS_EXIT {
            let code = self.registers.get(A0);

            tracing::info!(code, "guest exited");
            self.exit_code = Some(code);
        } else {
            tracing::trace!(syscall, "unsupported syscall");
            self.registers.set(A0, 0);
        }
    }
}
