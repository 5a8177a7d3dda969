use anyhow::{bail, Context};
use object::{Architecture, Object, ObjectSegment};
use std::path::Path;
use vm::Scheduler;

const ELF_MAGIC: &[u8] = b"\x7fELF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: u32,
    pub data: Vec<u8>,
}

/// A program ready to be copied into guest memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomImage {
    pub segments: Vec<Segment>,
    /// Replaces the reset vector when present.
    pub entry: Option<u32>,
}

impl RomImage {
    /// Raw images land at `base`; ELF images at their segment addresses.
    pub fn parse(bytes: &[u8], base: u32) -> anyhow::Result<Self> {
        if !bytes.starts_with(ELF_MAGIC) {
            return Ok(Self {
                segments: vec![Segment {
                    address: base,
                    data: bytes.to_vec(),
                }],
                entry: None,
            });
        }

        let file = object::File::parse(bytes).context("malformed ELF image")?;

        if file.architecture() != Architecture::Riscv32 {
            bail!("unsupported ELF architecture {:?}", file.architecture());
        }

        let mut segments = Vec::new();

        for segment in file.segments() {
            let data = segment.data().context("unreadable ELF segment")?;

            if data.is_empty() {
                continue;
            }

            segments.push(Segment {
                address: segment.address() as u32,
                data: data.to_vec(),
            });
        }

        Ok(Self {
            segments,
            entry: Some(file.entry() as u32),
        })
    }

    pub fn install(&self, scheduler: &mut Scheduler) {
        for segment in &self.segments {
            tracing::debug!(
                address = segment.address,
                len = segment.data.len(),
                "loading segment"
            );
            scheduler.load(segment.address, &segment.data);
        }

        if let Some(entry) = self.entry {
            scheduler.set_entry(entry);
        }
    }
}

/// Reads the ROM at `path`. An unreadable file is not fatal: the guest
/// starts from zeroed memory.
pub fn load(path: &Path, base: u32) -> anyhow::Result<Option<RomImage>> {
    match std::fs::read(path) {
        Ok(bytes) => RomImage::parse(&bytes, base)
            .with_context(|| format!("failed to load {}", path.display()))
            .map(Some),
        Err(error) => {
            tracing::warn!(%error, path = %path.display(), "ROM not loaded");
            Ok(None)
        }
    }
}
