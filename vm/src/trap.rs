//! Machine-mode interrupt entry and return.

use crate::csr::{self, CSR, MSTATUS_MIE, MSTATUS_MPIE};

const INTERRUPT_BIT: u32 = 1 << 31;

/// Wired interrupt sources; the discriminant is the `mip`/`mie` bit and the
/// low bits of `mcause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    MachineSoftware = 3,
    MachineTimer = 7,
    MachineExternal = 11,
}

impl Interrupt {
    pub const fn source(self) -> u32 {
        self as u32
    }

    pub const fn mask(self) -> u32 {
        1 << self.source()
    }

    pub const fn cause(self) -> u32 {
        INTERRUPT_BIT | self.source()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HartState {
    #[default]
    Running,
    Trapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapVectorMode {
    Direct,
    Vectored,
}

/// Splits `mtvec` into its 4-byte aligned base and mode.
pub const fn trap_vector(mtvec: u32) -> (u32, TrapVectorMode) {
    let mode = match mtvec & 0b11 {
        1 => TrapVectorMode::Vectored,
        _ => TrapVectorMode::Direct,
    };

    (mtvec & !0b11, mode)
}

/// Marks `interrupt` pending and, if both the global and the per-source
/// enables are set, enters the trap handler. Returns the new hart state.
pub fn raise(csr: &mut CSR, pc: &mut u32, interrupt: Interrupt) -> HartState {
    csr.set_bits(csr::MIP, interrupt.mask());

    let mstatus = csr.get(csr::MSTATUS);
    let enabled = mstatus & MSTATUS_MIE != 0 && csr.get(csr::MIE) & interrupt.mask() != 0;

    if !enabled {
        return HartState::Running;
    }

    let mstatus = (mstatus & !(MSTATUS_MIE | MSTATUS_MPIE)) | ((mstatus & MSTATUS_MIE) << 4);

    csr.set(csr::MSTATUS, mstatus);
    csr.set(csr::MCAUSE, interrupt.cause());
    csr.set(csr::MEPC, *pc);

    let (base, mode) = trap_vector(csr.get(csr::MTVEC));

    *pc = match mode {
        TrapVectorMode::Direct => base,
        TrapVectorMode::Vectored => base.wrapping_add(4 * interrupt.source()),
    };

    tracing::trace!(?interrupt, pc = *pc, "interrupt taken");

    HartState::Trapped
}

/// Clears the pending bit of `interrupt`.
pub fn clear(csr: &mut CSR, interrupt: Interrupt) {
    csr.clear_bits(csr::MIP, interrupt.mask());
}

/// Returns from a machine trap: `pc = mepc`, `MIE = MPIE`, `MPIE = 1`.
pub fn mret(csr: &mut CSR, pc: &mut u32) -> HartState {
    let mstatus = csr.get(csr::MSTATUS);
    let mie = (mstatus & MSTATUS_MPIE) >> 4;

    csr.set(csr::MSTATUS, (mstatus & !MSTATUS_MIE) | mie | MSTATUS_MPIE);
    *pc = csr.get(csr::MEPC);

    HartState::Running
}

#[cfg(test)]
mod tests {
    use super::{mret, raise, trap_vector, HartState, Interrupt, TrapVectorMode};
    use crate::csr::{self, CSR, MSTATUS_MIE, MSTATUS_MPIE};

    #[test]
    fn masked_interrupt_only_pends() {
        let mut csr = CSR::new();
        let mut pc = 0x100;

        csr.set(csr::MIE, Interrupt::MachineTimer.mask());

        assert_eq!(raise(&mut csr, &mut pc, Interrupt::MachineTimer), HartState::Running);
        assert_eq!(pc, 0x100);
        assert_eq!(csr.get(csr::MIP), 1 << 7);
    }

    #[test]
    fn direct_entry_and_return() {
        let mut csr = CSR::new();
        let mut pc = 0x104;

        csr.set(csr::MSTATUS, MSTATUS_MIE);
        csr.set(csr::MIE, Interrupt::MachineTimer.mask());
        csr.set(csr::MTVEC, 0x800);

        assert_eq!(raise(&mut csr, &mut pc, Interrupt::MachineTimer), HartState::Trapped);
        assert_eq!(pc, 0x800);
        assert_eq!(csr.get(csr::MEPC), 0x104);
        assert_eq!(csr.get(csr::MCAUSE), 0x8000_0007);
        assert_eq!(csr.get(csr::MSTATUS), MSTATUS_MPIE);

        assert_eq!(mret(&mut csr, &mut pc), HartState::Running);
        assert_eq!(pc, 0x104);
        assert_eq!(csr.get(csr::MSTATUS), MSTATUS_MIE | MSTATUS_MPIE);
    }

    #[test]
    fn vectored_entry() {
        let mut csr = CSR::new();
        let mut pc = 0;

        csr.set(csr::MSTATUS, MSTATUS_MIE);
        csr.set(csr::MIE, Interrupt::MachineSoftware.mask());
        csr.set(csr::MTVEC, 0x801);

        raise(&mut csr, &mut pc, Interrupt::MachineSoftware);

        assert_eq!(trap_vector(0x801), (0x800, TrapVectorMode::Vectored));
        assert_eq!(pc, 0x800 + 4 * 3);
    }
}
