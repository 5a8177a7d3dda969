//! Memory-mapped device registers.
//!
//! Every address at or above [DEVICE_BASE] is routed here instead of guest
//! RAM. Scalar registers are matched by exact address, register blocks by
//! range and projected onto `(address - block) / 4`.

pub mod audio;
pub mod clock;
pub mod disk;
pub mod display;
pub mod lifecycle;

use crate::{
    host::{Host, Stream},
    ram::RAM,
};
use audio::{AudioIn, AudioOut};
use clock::Clock;
use disk::{Disk, SECTOR_SIZE};
use display::Video;
use std::time::Duration;

pub const DEVICE_BASE: u32 = 0xFF00_0000;

pub const STDIO: u32 = DEVICE_BASE;
pub const STDERR: u32 = DEVICE_BASE + 0x004;
pub const GETCH: u32 = DEVICE_BASE + 0x008;
pub const KBHIT: u32 = DEVICE_BASE + 0x00C;
pub const CLRSCR: u32 = DEVICE_BASE + 0x010;
pub const GOTOXY: u32 = DEVICE_BASE + 0x014;
pub const SLEEP: u32 = DEVICE_BASE + 0x018;
pub const REALTIME: u32 = DEVICE_BASE + 0x01C;
pub const MTIMECURL: u32 = DEVICE_BASE + 0x020;
pub const MTIMECURH: u32 = DEVICE_BASE + 0x024;
pub const MTIMECMPL: u32 = DEVICE_BASE + 0x028;
pub const MTIMECMPH: u32 = DEVICE_BASE + 0x02C;
pub const CPU_FREQ: u32 = DEVICE_BASE + 0x030;
pub const DISK_SECTOR_NUM: u32 = DEVICE_BASE + 0x040;
pub const DISK_SECTOR_SIZE: u32 = DEVICE_BASE + 0x044;
pub const DISK_SECTOR_IDX: u32 = DEVICE_BASE + 0x048;
pub const DISK_SECTOR_DAT: u32 = DEVICE_BASE + 0x04C;
pub const KEYBD1: u32 = DEVICE_BASE + 0x100;
pub const KEYBD4: u32 = DEVICE_BASE + 0x10C;
pub const MOUSE_XY: u32 = DEVICE_BASE + 0x110;
pub const MOUSE_BTN: u32 = DEVICE_BASE + 0x114;
pub const DISP_BASE: u32 = DEVICE_BASE + 0x200;
pub const AUDIO_OUT_BASE: u32 = DEVICE_BASE + 0x300;
pub const AUDIO_IN_BASE: u32 = DEVICE_BASE + 0x400;

/// Written to `STDIO`/`STDERR` to flush instead of printing a byte.
pub const FLUSH: u32 = 0xFFFF_FFFF;
/// Read from the console registers when no input is pending.
pub const EOF: u32 = 0xFFFF_FFFF;

/// Index into a register block, if `address` falls inside it.
fn block_index(address: u32, base: u32, registers: u32) -> Option<u32> {
    let index = address.checked_sub(base)? / 4;

    (index < registers).then_some(index)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputSnapshot {
    pub keys: [u32; 4],
    pub mouse_xy: u32,
    pub mouse_buttons: u32,
}

/// The device register bank together with the host collaborators it drives.
#[derive(Debug)]
pub struct Devices {
    pub host: Host,
    pub clock: Clock,
    pub disk: Disk,
    pub video: Video,
    pub audio_out: AudioOut,
    pub audio_in: AudioIn,
    input: InputSnapshot,
    cpu_freq: u32,
    max_cpu_freq: u32,
}

impl Devices {
    pub fn new(host: Host, disk: Disk, cpu_freq: u32, max_cpu_freq: u32) -> Self {
        Self {
            host,
            clock: Clock::new(),
            disk,
            video: Video::default(),
            audio_out: AudioOut::default(),
            audio_in: AudioIn::default(),
            input: InputSnapshot::default(),
            cpu_freq: cpu_freq.clamp(1, max_cpu_freq.max(1)),
            max_cpu_freq: max_cpu_freq.max(1),
        }
    }

    pub fn cpu_freq(&self) -> u32 {
        self.cpu_freq
    }

    pub fn set_cpu_freq(&mut self, value: u32) {
        self.cpu_freq = value.clamp(1, self.max_cpu_freq);
    }

    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    /// Pulls a fresh keyboard/mouse snapshot from the host.
    pub fn poll_input(&mut self) {
        let mouse = self.host.input.mouse();

        self.input = InputSnapshot {
            keys: self.host.input.keys(),
            mouse_xy: display::pack(mouse.x as u32, mouse.y as u32),
            mouse_buttons: mouse.buttons,
        };
    }

    /// Reads a `size`-byte register. Only the disk data register consumes
    /// exactly `size` bytes; every other register is a word truncated by
    /// the caller.
    pub fn read(&mut self, address: u32, size: usize) -> u32 {
        match address {
            STDIO => self.host.console.getc().map_or(EOF, u32::from),
            GETCH => self.host.console.getch().map_or(EOF, u32::from),
            KBHIT => self.host.console.kbhit() as u32,
            REALTIME => self.clock.realtime(),
            MTIMECURL => self.clock.update() as u32,
            MTIMECURH => (self.clock.mtimecur() >> 32) as u32,
            MTIMECMPL => self.clock.mtimecmp() as u32,
            MTIMECMPH => (self.clock.mtimecmp() >> 32) as u32,
            CPU_FREQ => self.cpu_freq,
            DISK_SECTOR_NUM => self.disk.sectors(),
            DISK_SECTOR_SIZE => SECTOR_SIZE,
            DISK_SECTOR_IDX => self.disk.index(),
            DISK_SECTOR_DAT => self.disk.read(size),
            KEYBD1..=KEYBD4 => self.input.keys[((address - KEYBD1) / 4) as usize],
            MOUSE_XY => self.input.mouse_xy,
            MOUSE_BTN => self.input.mouse_buttons,
            _ => {
                if let Some(index) = block_index(address, DISP_BASE, display::REGISTERS) {
                    self.video.read(index)
                } else if let Some(index) = block_index(address, AUDIO_OUT_BASE, audio::REGISTERS)
                {
                    self.audio_out.read(index)
                } else if let Some(index) = block_index(address, AUDIO_IN_BASE, audio::REGISTERS) {
                    self.audio_in.read(index)
                } else {
                    0
                }
            }
        }
    }

    pub fn write(&mut self, address: u32, value: u32, size: usize, ram: &mut RAM) {
        match address {
            STDIO | STDERR => {
                let stream = if address == STDIO {
                    Stream::Stdout
                } else {
                    Stream::Stderr
                };

                if value == FLUSH {
                    self.host.console.flush(stream);
                } else {
                    self.host.console.put(stream, value as u8);
                }
            }
            CLRSCR => self.host.console.clear(),
            GOTOXY => {
                let (x, y) = display::unpack(value);

                self.host.console.goto(x as u16, y as u16);
            }
            SLEEP => std::thread::sleep(Duration::from_millis(value as u64)),
            REALTIME => self.clock.set_realtime(value),
            MTIMECMPL => self.clock.set_mtimecmp_low(value),
            MTIMECMPH => self.clock.set_mtimecmp_high(value),
            CPU_FREQ => self.set_cpu_freq(value),
            DISK_SECTOR_IDX => self.disk.seek_sector(value),
            DISK_SECTOR_DAT => self.disk.write(value, size),
            _ => {
                if let Some(index) = block_index(address, DISP_BASE, display::REGISTERS) {
                    self.video
                        .write(index, value, ram, self.host.display.as_mut());
                } else if let Some(index) = block_index(address, AUDIO_OUT_BASE, audio::REGISTERS)
                {
                    self.audio_out
                        .write(index, value, self.host.audio.as_mut());
                } else if let Some(index) = block_index(address, AUDIO_IN_BASE, audio::REGISTERS) {
                    self.audio_in
                        .write(index, value, ram, self.host.audio.as_mut());
                } else {
                    tracing::trace!(address, value, "write to unmapped device register");
                }
            }
        }
    }

    /// End-of-frame work: refresh the display, drain the audio-out ring and
    /// take a new input snapshot.
    pub fn frame(&mut self, ram: &RAM, framerate: u32, inflight: usize) {
        self.video.refresh(ram, self.host.display.as_mut());
        self.audio_out
            .pump(ram, self.host.audio.as_mut(), framerate, inflight);
        self.poll_input();
    }

    pub fn shutdown(&mut self) {
        self.video.shutdown(self.host.display.as_mut());
        self.audio_out.shutdown(self.host.audio.as_mut());
        self.audio_in.shutdown(self.host.audio.as_mut());
        self.host.console.flush(Stream::Stdout);
        self.host.console.flush(Stream::Stderr);
        self.disk.flush();
    }
}
