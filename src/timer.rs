//! Restartable countdown/count-up schedule used for refresh cadence and
//! elapsed-time display.
//!
//! A started timer fires its tick callback immediately and then at the
//! coarsest unit boundary that fits the remaining time: seconds below one
//! minute, minutes below one hour, hours below one day, days otherwise.
//! Countdowns fire the completion callback exactly once when they hit zero;
//! count-ups run until stopped.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    CountDown,
    CountUp,
}

/// A cancellable schedule handle. Restarting discards the previous schedule
/// without firing its completion callback; dropping the handle cancels any
/// pending tick.
pub struct Timer {
    task: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new() -> Self {
        Timer { task: None }
    }

    pub fn start(
        &mut self,
        direction: Direction,
        duration: Duration,
        on_tick: impl FnMut(String) + Send + 'static,
        on_complete: Option<Box<dyn FnOnce() + Send>>,
    ) {
        self.stop();
        let ms = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        self.task = Some(tokio::spawn(run_schedule(direction, ms, on_tick, on_complete)));
    }

    /// Cancels any pending tick. A no-op on an already-stopped timer.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Timer::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_schedule(
    direction: Direction,
    mut remaining_ms: u64,
    mut on_tick: impl FnMut(String),
    on_complete: Option<Box<dyn FnOnce() + Send>>,
) {
    loop {
        on_tick(format_value(remaining_ms));
        match direction {
            Direction::CountDown => {
                if remaining_ms == 0 {
                    break;
                }
                let step = step_down(remaining_ms);
                sleep(Duration::from_millis(step)).await;
                remaining_ms -= step;
            }
            Direction::CountUp => {
                let step = step_up(remaining_ms);
                sleep(Duration::from_millis(step)).await;
                remaining_ms += step;
            }
        }
    }
    if let Some(complete) = on_complete {
        complete();
    }
}

fn unit_for(ms: u64) -> (u64, &'static str) {
    if ms < MINUTE_MS {
        (SECOND_MS, "s")
    } else if ms < HOUR_MS {
        (MINUTE_MS, "m")
    } else if ms < DAY_MS {
        (HOUR_MS, "h")
    } else {
        (DAY_MS, "d")
    }
}

/// Coarsest-unit rendering, e.g. `90_000` ms -> `"1m"`.
pub fn format_value(ms: u64) -> String {
    let (unit, suffix) = unit_for(ms);
    format!("{}{}", ms / unit, suffix)
}

/// Time until the previous unit boundary when counting down; a full unit
/// when already aligned.
fn step_down(ms: u64) -> u64 {
    let (unit, _) = unit_for(ms);
    match ms % unit {
        0 => unit,
        rem => rem,
    }
}

/// Time until the next unit boundary when counting up.
fn step_up(ms: u64) -> u64 {
    let (unit, _) = unit_for(ms);
    unit - (ms % unit)
}
