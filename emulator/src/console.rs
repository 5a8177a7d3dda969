use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{self, Clear, ClearType},
};
use std::{
    collections::VecDeque,
    io::{self, IsTerminal, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::JoinHandle,
    time::Duration,
};
use vm::host::{Console, Stream};

const INPUT_CAPACITY: usize = 256;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bytes typed on the terminal and not yet consumed by the guest.
#[derive(Debug, Default)]
pub struct InputQueue {
    bytes: VecDeque<u8>,
}

impl InputQueue {
    /// Drops `byte` when the queue is full.
    pub fn push(&mut self, byte: u8) {
        if self.bytes.len() < INPUT_CAPACITY {
            self.bytes.push_back(byte);
        }
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Byte a key press produces on a plain terminal.
pub fn key_byte(key: KeyEvent) -> Option<u8> {
    match key.code {
        KeyCode::Char(c) if c.is_ascii() => {
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                Some(c as u8 & 0x1F)
            } else {
                Some(c as u8)
            }
        }
        KeyCode::Enter => Some(b'\n'),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}

fn reader(queue: Arc<Mutex<InputQueue>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        let event = match event::poll(POLL_INTERVAL) {
            Ok(true) => event::read(),
            Ok(false) => continue,
            Err(error) => Err(error),
        };

        match event {
            Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                if let Some(byte) = key_byte(key) {
                    lock(&queue).push(byte);
                }
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, "console input stopped");
                break;
            }
        }
    }
}

fn lock(queue: &Mutex<InputQueue>) -> MutexGuard<'_, InputQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Terminal console. Keyboard input is collected by a background thread
/// that lives exactly as long as this value.
#[derive(Debug)]
pub struct TerminalConsole {
    queue: Arc<Mutex<InputQueue>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    raw: bool,
}

impl TerminalConsole {
    pub fn new() -> Self {
        let queue = Arc::new(Mutex::new(InputQueue::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let reader = if io::stdin().is_terminal() {
            let (queue, stop) = (queue.clone(), stop.clone());

            Some(std::thread::spawn(move || reader(queue, stop)))
        } else {
            None
        };

        Self {
            queue,
            stop,
            reader,
            stdout: Vec::new(),
            stderr: Vec::new(),
            raw: false,
        }
    }

    /// Raw mode delivers keys without waiting for a newline.
    fn set_raw(&mut self, raw: bool) {
        if self.raw == raw || self.reader.is_none() {
            return;
        }

        let result = if raw {
            terminal::enable_raw_mode()
        } else {
            terminal::disable_raw_mode()
        };

        match result {
            Ok(()) => self.raw = raw,
            Err(error) => tracing::warn!(%error, raw, "failed to switch terminal mode"),
        }
    }

    fn buffer(&mut self, stream: Stream) -> &mut Vec<u8> {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for TerminalConsole {
    fn put(&mut self, stream: Stream, byte: u8) {
        let raw = self.raw;
        let buffer = self.buffer(stream);

        if byte == b'\n' && raw {
            buffer.push(b'\r');
        }

        buffer.push(byte);

        if byte == b'\n' {
            self.flush(stream);
        }
    }

    fn flush(&mut self, stream: Stream) {
        let bytes = std::mem::take(self.buffer(stream));

        let result = match stream {
            Stream::Stdout => io::stdout()
                .write_all(&bytes)
                .and_then(|_| io::stdout().flush()),
            Stream::Stderr => io::stderr()
                .write_all(&bytes)
                .and_then(|_| io::stderr().flush()),
        };

        if let Err(error) = result {
            tracing::warn!(%error, ?stream, "console write failed");
        }
    }

    fn getc(&mut self) -> Option<u8> {
        self.set_raw(false);
        lock(&self.queue).pop()
    }

    fn getch(&mut self) -> Option<u8> {
        self.set_raw(true);
        lock(&self.queue).pop()
    }

    fn kbhit(&mut self) -> bool {
        self.set_raw(true);
        !lock(&self.queue).is_empty()
    }

    fn clear(&mut self) {
        self.flush(Stream::Stdout);

        if let Err(error) = execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0)) {
            tracing::warn!(%error, "failed to clear the terminal");
        }
    }

    fn goto(&mut self, x: u16, y: u16) {
        self.flush(Stream::Stdout);

        if let Err(error) = execute!(io::stdout(), MoveTo(x, y)) {
            tracing::warn!(%error, "failed to move the cursor");
        }
    }
}

impl Drop for TerminalConsole {
    fn drop(&mut self) {
        self.flush(Stream::Stdout);
        self.flush(Stream::Stderr);
        self.stop.store(true, Ordering::Relaxed);

        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::warn!("console reader panicked");
            }
        }

        self.set_raw(false);
    }
}
