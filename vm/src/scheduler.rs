use crate::{
    cpu::{CPUConfig, MachineInfo, CPU},
    devices::{disk::Disk, Devices},
    host::Host,
    prof,
};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Guest memory size in bytes, a power of two.
    pub memory_size: u32,
    pub reset_vector: u32,
    pub cpu_freq: u32,
    /// Upper bound for guest writes to the CPU frequency register.
    pub max_cpu_freq: u32,
    pub framerate: u32,
    /// Instruction batches per frame; the timer is checked after each one.
    pub sub_batches: u32,
    /// Audio chunks allowed to wait in the host queue.
    pub audio_inflight: usize,
    pub machine_info: MachineInfo,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: 64 * 1024 * 1024,
            reset_vector: 0,
            cpu_freq: 50_000_000,
            max_cpu_freq: 500_000_000,
            framerate: 60,
            sub_batches: 2,
            audio_inflight: 3,
            machine_info: MachineInfo::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Exited(u32),
    Closed,
}

/// Fixed-framerate main loop around a single hart.
#[derive(Debug)]
pub struct Scheduler {
    pub cpu: CPU,
    framerate: u32,
    sub_batches: u32,
    audio_inflight: usize,
    frame_period: Duration,
    frames: u64,
}

impl Scheduler {
    pub fn new(config: MachineConfig, host: Host, disk: Disk) -> Result<Self, anyhow::Error> {
        prof::start();

        let framerate = config.framerate.max(1);
        let devices = Devices::new(host, disk, config.cpu_freq, config.max_cpu_freq);
        let cpu = CPU::new(
            CPUConfig {
                machine_info: config.machine_info,
                memory_size: config.memory_size,
                reset_vector: config.reset_vector,
            },
            devices,
        )?;

        Ok(Self {
            cpu,
            framerate,
            sub_batches: config.sub_batches.max(1),
            audio_inflight: config.audio_inflight,
            frame_period: Duration::from_secs(1) / framerate,
            frames: 0,
        })
    }

    /// Copies `bytes` into guest memory at `address`.
    pub fn load(&mut self, address: u32, bytes: &[u8]) {
        self.cpu.mmu.ram_mut().write_bytes(bytes, address);
    }

    pub fn set_entry(&mut self, pc: u32) {
        *self.cpu.registers.pc_mut() = pc;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Instructions executed by each sub-batch at the current frequency.
    pub fn batch_size(&self) -> u64 {
        let cpu_freq = self.cpu.mmu.devices().cpu_freq() as u64;

        (cpu_freq / self.framerate as u64 / self.sub_batches as u64).max(1)
    }

    /// Runs frames until the guest exits or the display is closed, then
    /// shuts the devices down. Returns the guest exit code, 0 on close.
    pub fn run(&mut self) -> u32 {
        let code = loop {
            match self.run_frame() {
                FrameOutcome::Continue => continue,
                FrameOutcome::Exited(code) => break code,
                FrameOutcome::Closed => {
                    tracing::info!("display closed");
                    break 0;
                }
            }
        };

        self.cpu.mmu.devices_mut().shutdown();

        code
    }

    #[prof::instrument(level = "trace", skip(self))]
    pub fn run_frame(&mut self) -> FrameOutcome {
        let started = Instant::now();
        let mut executed = 0;

        for _ in 0..self.sub_batches {
            executed += self.cpu.run(self.batch_size());

            if let Some(code) = self.cpu.exit_code() {
                return FrameOutcome::Exited(code);
            }

            self.cpu.check_timer();
        }

        let (ram, devices) = self.cpu.mmu.split_mut();

        devices.frame(ram, self.framerate, self.audio_inflight);

        prof::plot!("instructions", executed as f64);
        prof::frame_mark();
        self.frames += 1;

        if devices.host.display.is_closed() {
            return FrameOutcome::Closed;
        }

        if let Some(remaining) = self.frame_period.checked_sub(started.elapsed()) {
            let held = devices.audio_in.suspend();

            std::thread::sleep(remaining);
            devices.audio_in.resume(held, ram);
        }

        FrameOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameOutcome, MachineConfig, Scheduler};
    use crate::{
        devices::disk::Disk,
        host::{Display, FrameBuffer, Host, HostError},
        registers::GP,
    };
    use hex_literal::hex;

    fn config() -> MachineConfig {
        MachineConfig {
            memory_size: 0x1_0000,
            cpu_freq: 6_000,
            framerate: 1_000,
            ..Default::default()
        }
    }

    fn load_words(scheduler: &mut Scheduler, program: &[u8]) {
        let bytes = program
            .chunks_exact(4)
            .flat_map(|word| [word[3], word[2], word[1], word[0]])
            .collect::<Vec<_>>();

        scheduler.load(0, &bytes);
    }

    #[test]
    fn batch_size() {
        let scheduler = Scheduler::new(config(), Host::headless(), Disk::absent()).unwrap();

        assert_eq!(scheduler.batch_size(), 3);
    }

    #[test]
    fn runs_until_exit() {
        let mut scheduler = Scheduler::new(config(), Host::headless(), Disk::absent()).unwrap();

        // addi x17, x0, 93
        // addi x3, x3, 1
        // addi x10, x0, 3
        // ecall
        // addi x3, x3, 1
        load_words(&mut scheduler, &hex!("05d00893 00118193 00300513 00000073 00118193"));

        assert_eq!(scheduler.run(), 3);
        assert_eq!(scheduler.cpu.registers.get(GP), 1);
        assert_eq!(scheduler.frames(), 0);
    }

    #[test]
    fn frames_advance() {
        let mut scheduler = Scheduler::new(config(), Host::headless(), Disk::absent()).unwrap();

        // jal x0, 0
        load_words(&mut scheduler, &hex!("0000006f"));

        assert_eq!(scheduler.run_frame(), FrameOutcome::Continue);
        assert_eq!(scheduler.run_frame(), FrameOutcome::Continue);
        assert_eq!(scheduler.frames(), 2);
        assert_eq!(scheduler.cpu.registers.pc(), 0);
    }

    #[test]
    fn entry_point() {
        let mut scheduler = Scheduler::new(config(), Host::headless(), Disk::absent()).unwrap();

        // addi x3, x0, 1
        // addi x17, x0, 93
        // ecall
        scheduler.load(0x100, &hex!("93011000 9308d005 73000000"));
        scheduler.set_entry(0x100);

        assert_eq!(scheduler.run(), 0);
        assert_eq!(scheduler.cpu.registers.get(GP), 1);
    }

    #[derive(Debug, Default)]
    struct ClosedDisplay;

    impl Display for ClosedDisplay {
        fn init(&mut self, _width: u32, _height: u32) -> Result<(), HostError> {
            Ok(())
        }

        fn exit(&mut self) {}

        fn lock(&mut self) -> Option<FrameBuffer<'_>> {
            None
        }

        fn unlock(&mut self) {}

        fn is_closed(&self) -> bool {
            true
        }
    }

    #[test]
    fn stops_when_display_closes() {
        let mut host = Host::headless();

        host.display = Box::new(ClosedDisplay);

        let mut scheduler = Scheduler::new(config(), host, Disk::absent()).unwrap();

        assert_eq!(scheduler.run(), 0);
        assert_eq!(scheduler.frames(), 1);
    }
}
