pub use cpu::CPU;
pub use scheduler::{FrameOutcome, MachineConfig, Scheduler};

pub mod cpu;
pub mod csr;
pub mod devices;
pub mod host;
pub mod ifu;
pub mod isa;
pub mod mmu;
pub mod prof;
pub mod ram;
pub mod registers;
pub mod rvc;
pub mod scheduler;
pub mod trap;
