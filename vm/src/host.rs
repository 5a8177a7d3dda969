//! Interfaces of the host-side collaborators the device bank drives: the
//! display surface, the audio card, the input snapshot and the console.
//!
//! Each trait has a `Null*` implementation that behaves like an absent device.

use crate::devices::audio::CaptureSink;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Host {device} is not available")]
    Unavailable { device: &'static str },
    #[error("Host {device} failed to initialize: {reason}")]
    InitFailed {
        device: &'static str,
        reason: String,
    },
}

/// Channel count and sample rate of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u8,
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Decodes a `(channels << 24) | samplerate` register; zero in either
    /// half means "off".
    pub fn from_register(value: u32) -> Option<Self> {
        let channels = (value >> 24) as u8;
        let sample_rate = value & 0x00FF_FFFF;

        if channels == 0 || sample_rate == 0 {
            None
        } else {
            Some(Self {
                channels,
                sample_rate,
            })
        }
    }

    /// Size in bytes of one interleaved 16-bit sample frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }
}

/// Locked view of the host pixel buffer. `stride` is in pixels.
#[derive(Debug)]
pub struct FrameBuffer<'a> {
    pub pixels: &'a mut [u32],
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MouseState {
    pub x: i32,
    pub y: i32,
    pub buttons: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

pub trait Display {
    fn init(&mut self, width: u32, height: u32) -> Result<(), HostError>;
    fn exit(&mut self);
    /// Locks the pixel buffer; `None` when no surface exists.
    fn lock(&mut self) -> Option<FrameBuffer<'_>>;
    /// Presents whatever was written since [Display::lock].
    fn unlock(&mut self);
    /// Set once the user closed the window.
    fn is_closed(&self) -> bool;
}

pub trait Audio {
    fn init(&mut self, format: AudioFormat) -> Result<(), HostError>;
    fn exit(&mut self);
    /// Queues one chunk of interleaved samples. Returns `false` if the device
    /// refused it.
    fn play(&mut self, samples: &[u8]) -> bool;
    /// Number of queued chunks not yet consumed by the device.
    fn queued(&self) -> usize;
    /// Starts capture into `sink`, or stops it when `format` is `None`.
    /// The sink is fed from the device's own callback thread.
    fn record(&mut self, format: Option<AudioFormat>, sink: CaptureSink) -> Result<(), HostError>;
}

pub trait Input {
    fn keys(&self) -> [u32; 4];
    fn mouse(&self) -> MouseState;
}

pub trait Console {
    fn put(&mut self, stream: Stream, byte: u8);
    fn flush(&mut self, stream: Stream);
    /// Buffered, non-blocking character read.
    fn getc(&mut self) -> Option<u8>;
    /// Raw, non-blocking key read.
    fn getch(&mut self) -> Option<u8>;
    fn kbhit(&mut self) -> bool;
    fn clear(&mut self);
    fn goto(&mut self, x: u16, y: u16);
}

/// The set of collaborators owned by the device bank.
pub struct Host {
    pub display: Box<dyn Display>,
    pub audio: Box<dyn Audio>,
    pub input: Box<dyn Input>,
    pub console: Box<dyn Console>,
}

impl Host {
    pub fn headless() -> Self {
        Self {
            display: Box::new(NullDisplay::default()),
            audio: Box::new(NullAudio),
            input: Box::new(NullInput),
            console: Box::new(NullConsole),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

/// Off-screen surface. Frames land in memory and are never shown.
#[derive(Debug, Default)]
pub struct NullDisplay {
    pixels: Vec<u32>,
    width: u32,
    height: u32,
    presented: u64,
}

impl NullDisplay {
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Display for NullDisplay {
    fn init(&mut self, width: u32, height: u32) -> Result<(), HostError> {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize];

        Ok(())
    }

    fn exit(&mut self) {
        self.pixels.clear();
        self.width = 0;
        self.height = 0;
    }

    fn lock(&mut self) -> Option<FrameBuffer<'_>> {
        if self.pixels.is_empty() {
            return None;
        }

        Some(FrameBuffer {
            pixels: &mut self.pixels,
            width: self.width,
            height: self.height,
            stride: self.width as usize,
        })
    }

    fn unlock(&mut self) {
        self.presented += 1;
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct NullAudio;

impl Audio for NullAudio {
    fn init(&mut self, _format: AudioFormat) -> Result<(), HostError> {
        Err(HostError::Unavailable { device: "audio" })
    }

    fn exit(&mut self) {}

    fn play(&mut self, _samples: &[u8]) -> bool {
        false
    }

    fn queued(&self) -> usize {
        0
    }

    fn record(&mut self, format: Option<AudioFormat>, _sink: CaptureSink) -> Result<(), HostError> {
        match format {
            Some(_) => Err(HostError::Unavailable { device: "audio" }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct NullInput;

impl Input for NullInput {
    fn keys(&self) -> [u32; 4] {
        [0; 4]
    }

    fn mouse(&self) -> MouseState {
        MouseState::default()
    }
}

#[derive(Debug, Default)]
pub struct NullConsole;

impl Console for NullConsole {
    fn put(&mut self, _stream: Stream, _byte: u8) {}

    fn flush(&mut self, _stream: Stream) {}

    fn getc(&mut self) -> Option<u8> {
        None
    }

    fn getch(&mut self) -> Option<u8> {
        None
    }

    fn kbhit(&mut self) -> bool {
        false
    }

    fn clear(&mut self) {}

    fn goto(&mut self, _x: u16, _y: u16) {}
}

#[cfg(test)]
mod tests {
    use super::{AudioFormat, Display, NullDisplay};

    #[test]
    fn audio_format_register() {
        assert_eq!(
            AudioFormat::from_register((2 << 24) | 44100),
            Some(AudioFormat {
                channels: 2,
                sample_rate: 44100
            })
        );
        assert_eq!(AudioFormat::from_register(44100), None);
        assert_eq!(AudioFormat::from_register(1 << 24), None);
    }

    #[test]
    fn null_display_surface() {
        let mut display = NullDisplay::default();

        assert!(display.lock().is_none());

        display.init(4, 2).unwrap();
        display.lock().unwrap().pixels[7] = 0xFF;
        display.unlock();

        assert_eq!(display.pixels()[7], 0xFF);
        assert_eq!(display.presented(), 1);
    }
}
