use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic millisecond counter, timer compare value and the guest's view
/// of wall-clock time.
#[derive(Debug, Clone)]
pub struct Clock {
    boot: Instant,
    mtimecur: u64,
    mtimecmp: u64,
    realtime_offset: i64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

impl Clock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            mtimecur: 0,
            mtimecmp: u64::MAX,
            realtime_offset: 0,
        }
    }

    /// Resamples `mtimecur` from the host monotonic clock.
    pub fn update(&mut self) -> u64 {
        self.mtimecur = self.boot.elapsed().as_millis() as u64;
        self.mtimecur
    }

    pub fn mtimecur(&self) -> u64 {
        self.mtimecur
    }

    pub fn set_mtimecur(&mut self, value: u64) {
        self.mtimecur = value;
    }

    pub fn mtimecmp(&self) -> u64 {
        self.mtimecmp
    }

    pub fn set_mtimecmp(&mut self, value: u64) {
        self.mtimecmp = value;
    }

    pub fn set_mtimecmp_low(&mut self, value: u32) {
        self.mtimecmp = (self.mtimecmp & 0xFFFF_FFFF_0000_0000) | value as u64;
    }

    pub fn set_mtimecmp_high(&mut self, value: u32) {
        self.mtimecmp = (self.mtimecmp & 0x0000_0000_FFFF_FFFF) | ((value as u64) << 32);
    }

    pub fn expired(&self) -> bool {
        self.mtimecur >= self.mtimecmp
    }

    pub fn realtime(&self) -> u32 {
        unix_seconds().wrapping_add(self.realtime_offset) as u32
    }

    /// Shifts the guest clock so that it reads `value` now.
    pub fn set_realtime(&mut self, value: u32) {
        self.realtime_offset = value as i64 - unix_seconds();
    }
}
