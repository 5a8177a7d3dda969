use crate::{
    devices::{Devices, DEVICE_BASE},
    ram::RAM,
};

/// Routes guest loads and stores either to RAM or to the device window.
///
/// Accesses never fail: RAM addresses wrap modulo the memory size and
/// unmapped device registers read as zero.
#[derive(Debug)]
pub struct MMU {
    ram: RAM,
    devices: Devices,
}

#[inline(always)]
const fn is_device(address: u32) -> bool {
    address >= DEVICE_BASE
}

impl MMU {
    pub fn new(ram: RAM, devices: Devices) -> Self {
        Self { ram, devices }
    }

    pub fn ram(&self) -> &RAM {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut RAM {
        &mut self.ram
    }

    pub fn devices(&self) -> &Devices {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut Devices {
        &mut self.devices
    }

    /// Both halves at once, for device work that touches guest memory.
    pub fn split_mut(&mut self) -> (&mut RAM, &mut Devices) {
        (&mut self.ram, &mut self.devices)
    }

    /// Location an access to `address` actually touches: RAM addresses are
    /// reduced modulo the memory size, device registers stay as they are.
    pub fn physical_address(&self, address: u32) -> u32 {
        if is_device(address) {
            address
        } else {
            address & self.ram.size().wrapping_sub(1)
        }
    }

    pub fn read8(&mut self, address: u32) -> u32 {
        if is_device(address) {
            self.devices.read(address, 1) & 0xFF
        } else {
            self.ram.read_u8(address) as u32
        }
    }

    pub fn read16(&mut self, address: u32) -> u32 {
        if is_device(address) {
            self.devices.read(address, 2) & 0xFFFF
        } else {
            self.ram.read_u16(address) as u32
        }
    }

    pub fn read32(&mut self, address: u32) -> u32 {
        if is_device(address) {
            self.devices.read(address, 4)
        } else {
            self.ram.read_u32(address)
        }
    }

    pub fn write8(&mut self, value: u32, address: u32) {
        if is_device(address) {
            self.devices.write(address, value & 0xFF, 1, &mut self.ram);
        } else {
            self.ram.write_u8(value as u8, address);
        }
    }

    pub fn write16(&mut self, value: u32, address: u32) {
        if is_device(address) {
            self.devices.write(address, value & 0xFFFF, 2, &mut self.ram);
        } else {
            self.ram.write_u16(value as u16, address);
        }
    }

    pub fn write32(&mut self, value: u32, address: u32) {
        if is_device(address) {
            self.devices.write(address, value, 4, &mut self.ram);
        } else {
            self.ram.write_u32(value, address);
        }
    }
}
