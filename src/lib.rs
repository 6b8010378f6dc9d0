//! Key matrix calibration
//!
//! Keyboards built on the pico matrix scanner start out with a debug firmware that reports every
//! matrix position as its own MIDI note.  This crate walks an operator through pressing each key of
//! the instrument in turn, works out which matrix positions each one closes, and writes out the
//! note map the real firmware needs.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

pub mod capture;
pub mod emit;
pub mod event;
pub mod note;
pub mod operator;
pub mod session;
pub mod sim;
pub mod table;

pub use capture::{CaptureMode, CaptureOutcome, CapturedEvent, Inputs};
pub use emit::{Emitter, SensorLayout};
pub use event::{EventKind, EventSource, MidiEvent};
pub use operator::{OperatorInput, Token};
pub use session::{ExpectedKey, KeyResult, Session, SessionMapping, State};
pub use table::{AddressMode, Coord, LookupTable};

/// Something we can use to get time.  Ticks are milliseconds.
pub trait Timable {
    fn get_ticks(&self) -> u64;
    /// Wait for the given number of ticks.
    fn delay(&mut self, ticks: u64);
}

/// Wall clock time.
pub struct SystemTimer {
    start: Instant,
}

impl SystemTimer {
    pub fn new() -> SystemTimer {
        SystemTimer {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timable for SystemTimer {
    fn get_ticks(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn delay(&mut self, ticks: u64) {
        thread::sleep(Duration::from_millis(ticks));
    }
}

/// A flag raised when the operator interrupts the run (Ctrl-C).  Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Interrupt {
        Interrupt::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
