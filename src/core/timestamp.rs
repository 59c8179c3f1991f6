use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};

use super::lock::lock_mutex;

/// File names sort lexically in creation order with this layout.
pub const FILE_STAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S_%6f";

/// Text burned into every persisted frame.
pub const OVERLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn utc_ns_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

pub fn format_file_stamp(at: &DateTime<Local>) -> String {
    at.format(FILE_STAMP_FORMAT).to_string()
}

const FILE_STAMP_LEN: usize = 26;

/// Parses the creation stamp out of a file stem such as
/// `2024_05_01_20_00_00_123456`; an `_N` collision suffix is ignored.
pub fn parse_file_stamp(stem: &str) -> Option<NaiveDateTime> {
    let base = stem.get(..FILE_STAMP_LEN)?;
    NaiveDateTime::parse_from_str(base, FILE_STAMP_FORMAT).ok()
}

/// Wall-clock source. Everything time dependent re-reads the clock instead of
/// counting elapsed time, so suspend/resume and clock jumps are picked up.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = lock_mutex(&self.now, "ManualClock::advance");
        *now += by;
    }

    pub fn set(&self, at: DateTime<Local>) {
        *lock_mutex(&self.now, "ManualClock::set") = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *lock_mutex(&self.now, "ManualClock::now")
    }
}
