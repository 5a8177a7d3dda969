use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RAMError {
    #[error("Memory size should be power of two, but it is {size}")]
    InvalidSize { size: u32 },
    #[error("Failed to allocate {size} bytes of guest memory")]
    AllocationFailed { size: u32 },
}

/// Flat guest memory. Every address is masked by `size - 1` before it
/// touches the buffer, so accesses wrap around instead of failing.
#[derive(Debug, Clone)]
pub struct RAM {
    memory: Vec<u8>,
    mask: u32,
}

impl RAM {
    pub fn new(size: u32) -> Result<Self, RAMError> {
        if !size.is_power_of_two() {
            return Err(RAMError::InvalidSize { size });
        }

        let mut memory = Vec::new();

        memory
            .try_reserve_exact(size as usize)
            .map_err(|_| RAMError::AllocationFailed { size })?;
        memory.resize(size as usize, 0);

        Ok(Self {
            memory,
            mask: size - 1,
        })
    }

    pub fn size(&self) -> u32 {
        self.mask.wrapping_add(1)
    }

    pub fn as_slice(&self) -> &[u8] {
        self.memory.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.memory.as_mut_slice()
    }

    /// Start offset of an `len`-byte access if it fits without wrapping.
    fn contiguous(&self, address: u32, len: usize) -> Option<usize> {
        let start = (address & self.mask) as usize;

        (start + len <= self.memory.len()).then_some(start)
    }

    pub fn read_u8(&self, address: u32) -> u8 {
        self.memory[(address & self.mask) as usize]
    }

    pub fn read_u16(&self, address: u32) -> u16 {
        match self.contiguous(address, 2) {
            Some(start) => u16::from_le_bytes([self.memory[start], self.memory[start + 1]]),
            None => {
                u16::from_le_bytes([self.read_u8(address), self.read_u8(address.wrapping_add(1))])
            }
        }
    }

    pub fn read_u32(&self, address: u32) -> u32 {
        match self.contiguous(address, 4) {
            Some(start) => {
                let mut bytes = [0; 4];

                bytes.copy_from_slice(&self.memory[start..start + 4]);

                u32::from_le_bytes(bytes)
            }
            None => u32::from_le_bytes([
                self.read_u8(address),
                self.read_u8(address.wrapping_add(1)),
                self.read_u8(address.wrapping_add(2)),
                self.read_u8(address.wrapping_add(3)),
            ]),
        }
    }

    pub fn read_u64(&self, address: u32) -> u64 {
        let low = self.read_u32(address) as u64;
        let high = self.read_u32(address.wrapping_add(4)) as u64;

        low | (high << 32)
    }

    pub fn write_u8(&mut self, value: u8, address: u32) {
        self.memory[(address & self.mask) as usize] = value;
    }

    pub fn write_u16(&mut self, value: u16, address: u32) {
        self.write_bytes(&value.to_le_bytes(), address);
    }

    pub fn write_u32(&mut self, value: u32, address: u32) {
        self.write_bytes(&value.to_le_bytes(), address);
    }

    pub fn write_u64(&mut self, value: u64, address: u32) {
        self.write_u32(value as u32, address);
        self.write_u32((value >> 32) as u32, address.wrapping_add(4));
    }

    /// Copies `bytes` to `address`, wrapping at the end of memory.
    pub fn write_bytes(&mut self, bytes: &[u8], address: u32) {
        match self.contiguous(address, bytes.len()) {
            Some(start) => self.memory[start..start + bytes.len()].copy_from_slice(bytes),
            None => {
                for (i, byte) in bytes.iter().enumerate() {
                    self.write_u8(*byte, address.wrapping_add(i as u32));
                }
            }
        }
    }

    /// Fills `buffer` from `address`, wrapping at the end of memory.
    pub fn read_bytes(&self, buffer: &mut [u8], address: u32) {
        match self.contiguous(address, buffer.len()) {
            Some(start) => buffer.copy_from_slice(&self.memory[start..start + buffer.len()]),
            None => {
                for (i, byte) in buffer.iter_mut().enumerate() {
                    *byte = self.read_u8(address.wrapping_add(i as u32));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ram::{RAMError, RAM};

    #[test]
    fn invalid_size() {
        let ram = RAM::new(33);

        assert!(ram.is_err());
        assert_eq!(ram.unwrap_err(), RAMError::InvalidSize { size: 33 });
    }

    #[test]
    fn write_read() {
        let mut ram = RAM::new(32).unwrap();

        ram.write_u8(1, 0x1);
        assert_eq!(ram.read_u8(0x1), 1);

        // u16
        ram.write_u16(2, 0x0);
        assert_eq!(ram.read_u16(0x0), 2);
        ram.write_u16(4, 0x2);
        assert_eq!(ram.read_u16(0x2), 4);

        // u32
        ram.write_u32(8, 0x0);
        assert_eq!(ram.read_u32(0x0), 8);
        ram.write_u32(32, 0x8);
        assert_eq!(ram.read_u32(0x8), 32);
    }

    #[test]
    fn misaligned() {
        let mut ram = RAM::new(32).unwrap();

        for offset in 0..4 {
            ram.write_u32(0xDEADBEEF, 0x8 + offset);
            assert_eq!(ram.read_u32(0x8 + offset), 0xDEADBEEF);
        }

        ram.write_u32(0x11223344, 0x5);
        assert_eq!(ram.as_slice()[0x5..0x9], [0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn wraparound() {
        let mut ram = RAM::new(32).unwrap();

        ram.write_u32(0xAABBCCDD, 30);
        assert_eq!(ram.read_u16(30), 0xCCDD);
        assert_eq!(ram.read_u16(0), 0xAABB);
        assert_eq!(ram.read_u32(30 + 32 * 7), 0xAABBCCDD);

        ram.write_u8(0x5A, 0x1000_0003);
        assert_eq!(ram.read_u8(3), 0x5A);
    }
}
