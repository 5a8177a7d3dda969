//! Audio ring buffers.
//!
//! The output ring lives in guest memory: the guest produces samples and
//! advances `TAIL`/`CURR`, the frame loop drains whole chunks into the host
//! device. The input ring is filled by the host capture callback on its own
//! thread, so its descriptor and bytes sit behind a mutex shared with
//! [CaptureSink].
//!
//! Guest protocol for the input ring: writing 1 to `LOCK` blocks until any
//! in-flight append has finished, then keeps the capture thread out until 0
//! is written. While held, the ring bytes are mirrored at `ADDR` in guest
//! memory and `HEAD`/`CURR` writes go straight to the shared descriptor.

use super::lifecycle::{next_state, DeviceState};
use crate::{
    host::{Audio, AudioFormat},
    ram::RAM,
};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

pub const FMT: u32 = 0;
pub const ADDR: u32 = 1;
pub const HEAD: u32 = 2;
pub const TAIL: u32 = 3;
pub const SIZE: u32 = 4;
pub const CURR: u32 = 5;
pub const LOCK: u32 = 6;
pub const REGISTERS: u32 = 7;

/// Largest input ring the guest may request.
pub const MAX_CAPTURE_SIZE: u32 = 1 << 24;

/// The register block shared by both directions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RingDescriptor {
    pub fmt: u32,
    pub addr: u32,
    pub head: u32,
    pub tail: u32,
    pub size: u32,
    pub curr: u32,
    pub lock: u32,
}

impl RingDescriptor {
    pub fn read(&self, index: u32) -> u32 {
        match index {
            FMT => self.fmt,
            ADDR => self.addr,
            HEAD => self.head,
            TAIL => self.tail,
            SIZE => self.size,
            CURR => self.curr,
            LOCK => self.lock,
            _ => 0,
        }
    }

    pub fn write(&mut self, index: u32, value: u32) {
        match index {
            FMT => self.fmt = value,
            ADDR => self.addr = value,
            HEAD => self.head = value,
            TAIL => self.tail = value,
            SIZE => self.size = value,
            CURR => self.curr = value,
            LOCK => self.lock = value,
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct AudioOut {
    ring: RingDescriptor,
    state: DeviceState<AudioFormat>,
    chunk: Vec<u8>,
}

impl AudioOut {
    pub fn ring(&self) -> &RingDescriptor {
        &self.ring
    }

    pub fn state(&self) -> DeviceState<AudioFormat> {
        self.state
    }

    pub fn read(&self, index: u32) -> u32 {
        self.ring.read(index)
    }

    pub fn write(&mut self, index: u32, value: u32, audio: &mut dyn Audio) {
        self.ring.write(index, value);

        if index == FMT {
            self.reconfigure(AudioFormat::from_register(value), audio);
        }
    }

    fn reconfigure(&mut self, format: Option<AudioFormat>, audio: &mut dyn Audio) {
        let (state, reinit) = next_state(self.state, format);

        if !reinit {
            return;
        }

        if self.state.config().is_some() {
            audio.exit();
        }

        self.state = match state {
            DeviceState::Active(format) => match audio.init(format) {
                Ok(()) => {
                    tracing::debug!(?format, "audio output initialized");
                    DeviceState::Active(format)
                }
                Err(error) => {
                    tracing::warn!(%error, "audio output disabled");
                    DeviceState::Disabled
                }
            },
            other => other,
        };
    }

    /// Sends every complete chunk queued by the guest to the host device,
    /// keeping at most `inflight` chunks queued there. A non-zero `LOCK`
    /// holds playback.
    pub fn pump(&mut self, ram: &RAM, audio: &mut dyn Audio, framerate: u32, inflight: usize) {
        let Some(format) = self.state.config() else {
            return;
        };

        let ring = &mut self.ring;

        if ring.lock != 0 || ring.size == 0 {
            return;
        }

        let samples = (format.sample_rate / framerate.max(1)).max(1) as usize;
        let chunk_len = (samples * format.frame_bytes()).min(ring.size as usize);

        self.chunk.resize(chunk_len, 0);

        while ring.curr as usize >= chunk_len && audio.queued() < inflight {
            let head = ring.head % ring.size;
            let first = chunk_len.min((ring.size - head) as usize);

            ram.read_bytes(&mut self.chunk[..first], ring.addr.wrapping_add(head));
            ram.read_bytes(&mut self.chunk[first..], ring.addr);

            if !audio.play(&self.chunk) {
                break;
            }

            ring.head = ((head as usize + chunk_len) % ring.size as usize) as u32;
            ring.curr -= chunk_len as u32;
        }
    }

    pub fn shutdown(&mut self, audio: &mut dyn Audio) {
        if self.state.config().is_some() {
            audio.exit();
        }

        self.state = DeviceState::Absent;
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    head: u32,
    tail: u32,
    curr: u32,
    data: Vec<u8>,
    guest_held: bool,
}

impl CaptureState {
    fn append(&mut self, samples: &[u8]) {
        let size = self.data.len();

        if size == 0 {
            return;
        }

        let samples = &samples[samples.len().saturating_sub(size)..];
        let len = samples.len() as u32;
        let overflow = (self.curr + len).saturating_sub(size as u32);

        // Oldest samples go first.
        self.head = (self.head + overflow) % size as u32;
        self.curr -= overflow;

        let tail = self.tail as usize % size;
        let first = samples.len().min(size - tail);

        self.data[tail..tail + first].copy_from_slice(&samples[..first]);
        self.data[..samples.len() - first].copy_from_slice(&samples[first..]);

        self.tail = ((tail + samples.len()) % size) as u32;
        self.curr += len;
    }

    /// Guest writes to `HEAD`/`TAIL` wrap into the ring and `CURR` saturates
    /// at its size, so the capture thread never sees an impossible ring.
    fn set_descriptor(&mut self, index: u32, value: u32) {
        let size = self.data.len() as u32;

        match index {
            HEAD => self.head = value.checked_rem(size).unwrap_or(0),
            TAIL => self.tail = value.checked_rem(size).unwrap_or(0),
            CURR => self.curr = value.min(size),
            _ => {}
        }
    }

    fn resize(&mut self, size: u32) {
        self.data = vec![0; size as usize];
        self.head = 0;
        self.tail = 0;
        self.curr = 0;
    }
}

/// Handle the host capture callback appends through.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    shared: Arc<(Mutex<CaptureState>, Condvar)>,
}

impl CaptureSink {
    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends captured samples, dropping the oldest bytes on overflow.
    /// Blocks while the guest holds the ring.
    pub fn append(&self, samples: &[u8]) {
        let (_, released) = &*self.shared;
        let mut state = self.lock();

        while state.guest_held {
            state = released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.append(samples);
    }

    fn set_held(&self, held: bool) {
        self.lock().guest_held = held;

        if !held {
            self.shared.1.notify_all();
        }
    }
}

#[derive(Debug, Default)]
pub struct AudioIn {
    sink: CaptureSink,
    fmt: u32,
    addr: u32,
    held: bool,
    state: DeviceState<AudioFormat>,
}

impl AudioIn {
    pub fn sink(&self) -> &CaptureSink {
        &self.sink
    }

    pub fn state(&self) -> DeviceState<AudioFormat> {
        self.state
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn read(&self, index: u32) -> u32 {
        match index {
            FMT => self.fmt,
            ADDR => self.addr,
            LOCK => self.held as u32,
            HEAD | TAIL | SIZE | CURR => {
                let state = self.sink.lock();

                match index {
                    HEAD => state.head,
                    TAIL => state.tail,
                    SIZE => state.data.len() as u32,
                    _ => state.curr,
                }
            }
            _ => 0,
        }
    }

    pub fn write(&mut self, index: u32, value: u32, ram: &mut RAM, audio: &mut dyn Audio) {
        match index {
            FMT => {
                self.fmt = value;
                self.reconfigure(AudioFormat::from_register(value), audio);
            }
            ADDR => self.addr = value,
            HEAD | TAIL | CURR => self.sink.lock().set_descriptor(index, value),
            SIZE => self.sink.lock().resize(value.min(MAX_CAPTURE_SIZE)),
            LOCK if value != 0 => self.acquire(ram),
            LOCK => self.release(),
            _ => {}
        }
    }

    fn reconfigure(&mut self, format: Option<AudioFormat>, audio: &mut dyn Audio) {
        let (state, reinit) = next_state(self.state, format);

        if !reinit {
            return;
        }

        self.state = match audio.record(state.config(), self.sink.clone()) {
            Ok(()) => {
                tracing::debug!(?format, "audio capture reconfigured");
                state
            }
            Err(error) => {
                tracing::warn!(%error, "audio capture disabled");
                DeviceState::Disabled
            }
        };
    }

    /// Takes the guest hold and mirrors the ring into guest memory.
    pub fn acquire(&mut self, ram: &mut RAM) {
        let mut state = self.sink.lock();

        state.guest_held = true;
        ram.write_bytes(&state.data, self.addr);

        self.held = true;
    }

    pub fn release(&mut self) {
        self.sink.set_held(false);
        self.held = false;
    }

    /// Lets the capture thread in while the frame loop sleeps; the hold is
    /// restored by [AudioIn::resume].
    pub fn suspend(&mut self) -> bool {
        let held = self.held;

        if held {
            self.release();
        }

        held
    }

    pub fn resume(&mut self, held: bool, ram: &mut RAM) {
        if held {
            self.acquire(ram);
        }
    }

    pub fn shutdown(&mut self, audio: &mut dyn Audio) {
        self.release();

        if self.state.config().is_some() {
            if let Err(error) = audio.record(None, self.sink.clone()) {
                tracing::warn!(%error, "failed to stop audio capture");
            }
        }

        self.state = DeviceState::Absent;
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioIn, AudioOut, CaptureSink, ADDR, CURR, FMT, HEAD, LOCK, SIZE, TAIL};
    use crate::{
        devices::lifecycle::DeviceState,
        host::{Audio, AudioFormat, HostError, NullAudio},
        ram::RAM,
    };
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    #[derive(Debug, Default)]
    struct RecordingAudio {
        inits: Vec<AudioFormat>,
        played: Vec<Vec<u8>>,
        recording: Option<AudioFormat>,
    }

    impl Audio for RecordingAudio {
        fn init(&mut self, format: AudioFormat) -> Result<(), HostError> {
            self.inits.push(format);
            Ok(())
        }

        fn exit(&mut self) {}

        fn play(&mut self, samples: &[u8]) -> bool {
            self.played.push(samples.to_vec());
            true
        }

        fn queued(&self) -> usize {
            self.played.len()
        }

        fn record(
            &mut self,
            format: Option<AudioFormat>,
            _sink: CaptureSink,
        ) -> Result<(), HostError> {
            self.recording = format;
            Ok(())
        }
    }

    const MONO_100HZ: u32 = (1 << 24) | 100;

    #[test]
    fn output_reinit_only_on_change() {
        let mut audio = RecordingAudio::default();
        let mut out = AudioOut::default();

        out.write(FMT, MONO_100HZ, &mut audio);
        out.write(FMT, MONO_100HZ, &mut audio);
        out.write(FMT, (2 << 24) | 100, &mut audio);

        assert_eq!(audio.inits.len(), 2);
    }

    #[test]
    fn output_init_failure_disables() {
        let mut out = AudioOut::default();

        out.write(FMT, MONO_100HZ, &mut NullAudio);

        assert_eq!(out.state(), DeviceState::Disabled);
    }

    #[test]
    fn pump_drains_whole_chunks() {
        let mut ram = RAM::new(256).unwrap();
        let mut audio = RecordingAudio::default();
        let mut out = AudioOut::default();

        for i in 0..16u8 {
            ram.write_u8(i, 0x40 + i as u32);
        }

        out.write(FMT, MONO_100HZ, &mut audio);
        out.write(ADDR, 0x40, &mut audio);
        out.write(SIZE, 16, &mut audio);
        out.write(HEAD, 12, &mut audio);
        out.write(CURR, 10, &mut audio);

        // 100 Hz / 25 fps = 4 mono samples = 8 bytes per chunk
        out.pump(&ram, &mut audio, 25, 4);

        assert_eq!(audio.played, vec![vec![12, 13, 14, 15, 0, 1, 2, 3]]);
        assert_eq!(out.read(HEAD), 4);
        assert_eq!(out.read(CURR), 2);
    }

    #[test]
    fn pump_honors_hold_and_inflight() {
        let ram = RAM::new(256).unwrap();
        let mut audio = RecordingAudio::default();
        let mut out = AudioOut::default();

        out.write(FMT, MONO_100HZ, &mut audio);
        out.write(SIZE, 64, &mut audio);
        out.write(CURR, 64, &mut audio);
        out.write(LOCK, 1, &mut audio);

        out.pump(&ram, &mut audio, 25, 4);
        assert!(audio.played.is_empty());

        out.write(LOCK, 0, &mut audio);
        out.pump(&ram, &mut audio, 25, 3);
        assert_eq!(audio.played.len(), 3);
        assert_eq!(out.read(CURR), 64 - 3 * 8);
    }

    #[test]
    fn capture_drops_oldest() {
        let mut ram = RAM::new(256).unwrap();
        let mut audio = RecordingAudio::default();
        let mut input = AudioIn::default();

        input.write(FMT, MONO_100HZ, &mut ram, &mut audio);
        input.write(SIZE, 8, &mut ram, &mut audio);

        assert_eq!(audio.recording, AudioFormat::from_register(MONO_100HZ));

        input.sink().append(&[1, 2, 3, 4, 5, 6]);
        input.sink().append(&[7, 8, 9, 10]);

        assert_eq!(input.read(CURR), 8);
        assert_eq!(input.read(HEAD), 2);
        assert_eq!(input.read(TAIL), 2);

        input.write(ADDR, 0x80, &mut ram, &mut audio);
        input.write(LOCK, 1, &mut ram, &mut audio);

        assert_eq!(ram.as_slice()[0x80..0x88], [9, 10, 3, 4, 5, 6, 7, 8]);

        input.write(LOCK, 0, &mut ram, &mut audio);
        input.write(FMT, 0, &mut ram, &mut audio);

        assert_eq!(audio.recording, None);
    }

    #[test]
    fn guest_descriptor_stays_in_ring() {
        let mut ram = RAM::new(256).unwrap();
        let mut audio = RecordingAudio::default();
        let mut input = AudioIn::default();

        input.write(SIZE, 8, &mut ram, &mut audio);
        input.write(CURR, 0xFFFF_FFFC, &mut ram, &mut audio);
        input.write(HEAD, 0xFFFF_FFFF, &mut ram, &mut audio);
        input.write(TAIL, 13, &mut ram, &mut audio);

        assert_eq!(input.read(CURR), 8);
        assert_eq!(input.read(HEAD), 7);
        assert_eq!(input.read(TAIL), 5);

        input.sink().append(&[1; 32]);

        assert_eq!(input.read(CURR), 8);
        assert_eq!(input.read(HEAD), 7);
        assert_eq!(input.read(TAIL), 5);
    }

    #[test]
    fn descriptor_without_ring() {
        let mut ram = RAM::new(256).unwrap();
        let mut audio = RecordingAudio::default();
        let mut input = AudioIn::default();

        input.write(HEAD, 3, &mut ram, &mut audio);
        input.write(CURR, 3, &mut ram, &mut audio);
        input.sink().append(&[1; 4]);

        assert_eq!(input.read(HEAD), 0);
        assert_eq!(input.read(CURR), 0);
    }

    #[test]
    fn held_ring_sees_only_complete_appends() {
        const CHUNK: usize = 16;
        const APPENDS: usize = 200;

        let mut ram = RAM::new(1 << 16).unwrap();
        let mut audio = RecordingAudio::default();
        let mut input = AudioIn::default();

        input.write(SIZE, 1 << 14, &mut ram, &mut audio);

        let sink = input.sink().clone();
        let done = Arc::new(AtomicBool::new(false));
        let producer = {
            let done = done.clone();

            thread::spawn(move || {
                for i in 0..APPENDS {
                    sink.append(&[i as u8; CHUNK]);
                }

                done.store(true, Ordering::SeqCst);
            })
        };

        let mut drained = 0;

        while !done.load(Ordering::SeqCst) {
            input.write(LOCK, 1, &mut ram, &mut audio);

            let curr = input.read(CURR) as usize;

            assert_eq!(curr % CHUNK, 0);
            thread::sleep(Duration::from_micros(200));
            assert_eq!(input.read(CURR) as usize, curr);

            let head = input.read(HEAD);

            input.write(HEAD, (head + curr as u32) % (1 << 14), &mut ram, &mut audio);
            input.write(CURR, 0, &mut ram, &mut audio);
            drained += curr;

            input.write(LOCK, 0, &mut ram, &mut audio);
            thread::sleep(Duration::from_micros(100));
        }

        producer.join().unwrap();

        assert_eq!(drained + input.read(CURR) as usize, CHUNK * APPENDS);
    }
}
