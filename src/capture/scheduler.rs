use std::time::Duration;

use chrono::{NaiveTime, Timelike};

use crate::core::{Clock, ConfigError};

const HOURS_PER_DAY: u32 = 24;

/// Duty-cycle gate over the local hour of day.
#[derive(Debug, Clone)]
pub struct CaptureScheduler {
    active: [bool; HOURS_PER_DAY as usize],
}

impl CaptureScheduler {
    pub fn new(active_hours: &[u32]) -> Result<Self, ConfigError> {
        if active_hours.is_empty() {
            return Err(ConfigError::message("active_hours must not be empty"));
        }

        let mut active = [false; HOURS_PER_DAY as usize];
        for &hour in active_hours {
            if hour >= HOURS_PER_DAY {
                return Err(ConfigError::message(format!(
                    "active hour {} outside 0..=23",
                    hour
                )));
            }
            active[hour as usize] = true;
        }

        Ok(Self { active })
    }

    pub fn always() -> Self {
        Self {
            active: [true; HOURS_PER_DAY as usize],
        }
    }

    pub fn should_capture_at(&self, hour: u32) -> bool {
        self.active[(hour % HOURS_PER_DAY) as usize]
    }

    /// Reads the wall clock on every call.
    pub fn should_capture_now(&self, clock: &dyn Clock) -> bool {
        self.should_capture_at(clock.now().hour())
    }

    /// Time until the start of the next active hour; zero if `now` is active.
    pub fn time_until_active(&self, now: NaiveTime) -> Duration {
        let hour = now.hour();
        if self.should_capture_at(hour) {
            return Duration::ZERO;
        }

        let into_hour = u64::from(now.minute() * 60 + now.second());
        for step in 1..=HOURS_PER_DAY {
            if self.should_capture_at(hour + step) {
                return Duration::from_secs(u64::from(step) * 3600 - into_hour);
            }
        }

        Duration::ZERO
    }

    pub fn active_hours(&self) -> Vec<u32> {
        (0..HOURS_PER_DAY).filter(|&h| self.active[h as usize]).collect()
    }
}
