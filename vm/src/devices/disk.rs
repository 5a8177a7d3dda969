use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};
use thiserror::Error;

pub const SECTOR_SIZE: u32 = 512;

#[derive(Debug, Error)]
pub enum DiskError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait DiskStream: Read + Write + Seek + std::fmt::Debug {}

impl<T: Read + Write + Seek + std::fmt::Debug> DiskStream for T {}

/// Sector-addressed disk image with a byte cursor.
///
/// Without a backing image every read yields 0 and writes are dropped.
#[derive(Debug, Default)]
pub struct Disk {
    stream: Option<Box<dyn DiskStream>>,
    sectors: u32,
    index: u32,
}

impl Disk {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DiskError> {
        let file: File = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self::from_stream(file, size))
    }

    pub fn from_stream(stream: impl DiskStream + 'static, size: u64) -> Self {
        Self {
            stream: Some(Box::new(stream)),
            sectors: (size / SECTOR_SIZE as u64) as u32,
            index: 0,
        }
    }

    pub fn is_present(&self) -> bool {
        self.stream.is_some()
    }

    pub fn sectors(&self) -> u32 {
        self.sectors
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn seek_sector(&mut self, index: u32) {
        self.index = index;

        if let Some(stream) = self.stream.as_mut() {
            let offset = index as u64 * SECTOR_SIZE as u64;

            if let Err(error) = stream.seek(SeekFrom::Start(offset)) {
                tracing::warn!(%error, index, "disk seek failed");
            }
        }
    }

    /// Reads `len` bytes (at most 4) at the cursor as a little-endian value.
    /// Bytes past the end of the image read as zero.
    pub fn read(&mut self, len: usize) -> u32 {
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };

        let mut bytes = [0; 4];
        let len = len.min(bytes.len());
        let mut filled = 0;

        while filled < len {
            match stream.read(&mut bytes[filled..len]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(error) => {
                    tracing::warn!(%error, "disk read failed");
                    break;
                }
            }
        }

        u32::from_le_bytes(bytes)
    }

    /// Writes the low `len` bytes (at most 4) of `value` at the cursor.
    pub fn write(&mut self, value: u32, len: usize) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let bytes = value.to_le_bytes();

        if let Err(error) = stream.write_all(&bytes[..len.min(bytes.len())]) {
            tracing::warn!(%error, "disk write failed");
        }
    }

    pub fn flush(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(error) = stream.flush() {
                tracing::warn!(%error, "disk flush failed");
            }
        }
    }
}

impl Drop for Disk {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::{Disk, SECTOR_SIZE};
    use std::io::Cursor;

    fn make_disk(sectors: usize) -> Disk {
        let mut image = vec![0u8; sectors * SECTOR_SIZE as usize];

        for (i, byte) in image.iter_mut().enumerate() {
            *byte = (i / SECTOR_SIZE as usize) as u8;
        }

        let size = image.len() as u64;

        Disk::from_stream(Cursor::new(image), size)
    }

    #[test]
    fn absent_disk() {
        let mut disk = Disk::absent();

        disk.seek_sector(3);
        disk.write(0xFF, 1);

        assert!(!disk.is_present());
        assert_eq!(disk.sectors(), 0);
        assert_eq!(disk.read(1), 0);
    }

    #[test]
    fn cursor_advances() {
        let mut disk = make_disk(4);

        assert_eq!(disk.sectors(), 4);

        disk.seek_sector(2);
        assert_eq!(disk.read(1), 2);
        assert_eq!(disk.read(2), 0x0202);

        disk.seek_sector(1);
        disk.write(0xAABBCCDD, 4);
        disk.seek_sector(1);
        assert_eq!(disk.read(4), 0xAABBCCDD);
        assert_eq!(disk.read(1), 1);
    }

    #[test]
    fn past_end_reads_zero() {
        let mut disk = make_disk(1);

        disk.seek_sector(1);
        assert_eq!(disk.read(4), 0);
    }
}
