use super::lifecycle::{next_state, DeviceState};
use crate::{host::Display, ram::RAM};

pub const WH: u32 = 0;
pub const ADDR: u32 = 1;
pub const REFRESH_XY: u32 = 2;
pub const REFRESH_WH: u32 = 3;
pub const REFRESH_DIV: u32 = 4;
pub const BITBLT_ADDR: u32 = 5;
pub const BITBLT_XY: u32 = 6;
pub const BITBLT_WH: u32 = 7;
pub const REGISTERS: u32 = 8;

const PIXEL_BYTES: u32 = 4;

/// Splits a `(hi << 16) | lo` register.
pub const fn unpack(value: u32) -> (u32, u32) {
    (value >> 16, value & 0xFFFF)
}

pub const fn pack(hi: u32, lo: u32) -> u32 {
    (hi << 16) | (lo & 0xFFFF)
}

/// Byte offset of pixel `(x, y)` in a framebuffer `width` pixels wide,
/// modulo 2^32.
const fn pixel_offset(x: u32, y: u32, width: u32) -> u32 {
    y.wrapping_mul(width)
        .wrapping_add(x)
        .wrapping_mul(PIXEL_BYTES)
}

/// Framebuffer descriptor, refresh scheduling and the bit-blt engine.
#[derive(Debug, Default)]
pub struct Video {
    registers: [u32; REGISTERS as usize],
    state: DeviceState<(u32, u32)>,
    frames: u32,
    pending: bool,
    row: Vec<u8>,
}

impl Video {
    pub fn state(&self) -> DeviceState<(u32, u32)> {
        self.state
    }

    pub fn read(&self, index: u32) -> u32 {
        self.registers.get(index as usize).copied().unwrap_or(0)
    }

    pub fn write(&mut self, index: u32, value: u32, ram: &mut RAM, display: &mut dyn Display) {
        let Some(register) = self.registers.get_mut(index as usize) else {
            return;
        };

        *register = value;

        match index {
            WH => {
                self.resize(value, display);
                // Reads back the active size, 0 while no surface exists.
                self.registers[WH as usize] = self
                    .state
                    .config()
                    .map_or(0, |(width, height)| pack(width, height));
            }
            REFRESH_DIV => {
                self.frames = 0;
                self.pending = value == 0;
            }
            BITBLT_WH => self.bitblt(ram),
            _ => {}
        }
    }

    fn resize(&mut self, value: u32, display: &mut dyn Display) {
        let (width, height) = unpack(value);
        let size = (width != 0 && height != 0).then_some((width, height));
        let (state, reinit) = next_state(self.state, size);

        if !reinit {
            return;
        }

        if self.state.config().is_some() {
            display.exit();
        }

        self.state = match state {
            DeviceState::Active((width, height)) => match display.init(width, height) {
                Ok(()) => {
                    tracing::debug!(width, height, "display initialized");

                    self.registers[REFRESH_XY as usize] = 0;
                    self.registers[REFRESH_WH as usize] = value;
                    self.pending = true;

                    DeviceState::Active((width, height))
                }
                Err(error) => {
                    tracing::warn!(%error, "display disabled");
                    DeviceState::Disabled
                }
            },
            other => other,
        };
    }

    /// Copies a `w*h` pixel rectangle stored contiguously at `BITBLT_ADDR` to
    /// `(x, y)` of the framebuffer, clipped to the display size. Guest
    /// addresses wrap like every other memory access.
    fn bitblt(&mut self, ram: &mut RAM) {
        let Some((width, height)) = self.state.config() else {
            return;
        };
        let (x, y) = unpack(self.registers[BITBLT_XY as usize]);
        let (w, h) = unpack(self.registers[BITBLT_WH as usize]);

        if x >= width || y >= height {
            return;
        }

        let copy_w = w.min(width - x);
        let copy_h = h.min(height - y);
        let source = self.registers[BITBLT_ADDR as usize];
        let target = self.registers[ADDR as usize];

        self.row.resize(copy_w as usize * PIXEL_BYTES as usize, 0);

        for row in 0..copy_h {
            let from = source.wrapping_add(row.wrapping_mul(w).wrapping_mul(PIXEL_BYTES));
            let to = target.wrapping_add(pixel_offset(x, y + row, width));

            ram.read_bytes(&mut self.row, from);
            ram.write_bytes(&self.row, to);
        }
    }

    /// Advances the refresh divisor by one frame and reports whether the
    /// refresh rectangle is due.
    fn due(&mut self) -> bool {
        let divisor = self.registers[REFRESH_DIV as usize];

        if divisor == 0 {
            return std::mem::take(&mut self.pending);
        }

        self.frames += 1;

        if self.frames >= divisor {
            self.frames = 0;
            true
        } else {
            false
        }
    }

    /// Pushes the refresh rectangle to the host surface if it is due.
    pub fn refresh(&mut self, ram: &RAM, display: &mut dyn Display) -> bool {
        let Some((width, height)) = self.state.config() else {
            return false;
        };

        if !self.due() {
            return false;
        }

        let (x, y) = unpack(self.registers[REFRESH_XY as usize]);
        let (w, h) = unpack(self.registers[REFRESH_WH as usize]);
        let base = self.registers[ADDR as usize];

        let Some(frame) = display.lock() else {
            return false;
        };

        let right = (x + w).min(width).min(frame.width);
        let bottom = (y + h).min(height).min(frame.height);

        for row in y..bottom {
            let line = row as usize * frame.stride;

            for column in x..right {
                let address = base.wrapping_add(pixel_offset(column, row, width));

                frame.pixels[line + column as usize] = ram.read_u32(address);
            }
        }

        display.unlock();

        true
    }

    pub fn shutdown(&mut self, display: &mut dyn Display) {
        if self.state.config().is_some() {
            display.exit();
        }

        self.state = DeviceState::Absent;
    }
}
