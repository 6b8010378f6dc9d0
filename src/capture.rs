//! Capturing the events for a single key.
//!
//! A key on the instrument may close more than one switch (the dual sensor boards have two per
//! key, and the order they close in gives the velocity).  A capture round collects every distinct
//! note that arrives while one key is being calibrated, in the order they arrived.
//!
//! There are two ways of deciding the round is over.  In confirm mode the operator presses Enter
//! once they have struck the key.  In timeout mode the round ends by itself once the notes stop
//! arriving.

use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    event::{EventSource, MidiEvent},
    operator::{OperatorInput, Token},
    Interrupt, Timable,
};

/// Default timing for timeout mode, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SETTLE_MS: u64 = 500;

/// Default interval between polls, in milliseconds.
pub const DEFAULT_POLL_MS: u64 = 10;

/// How a capture round is ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureMode {
    /// Ends when the operator enters a blank line, or `r` to retry.
    Confirm,
    /// Ends `settle_ms` after the most recent new note, or gives up after `timeout_ms` if
    /// nothing arrives at all.
    Timeout { timeout_ms: u64, settle_ms: u64 },
}

impl CaptureMode {
    pub fn timeout() -> CaptureMode {
        CaptureMode::Timeout {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "confirm" => Ok(CaptureMode::Confirm),
            "timeout" => Ok(CaptureMode::timeout()),
            _ => Err(format!("Unknown capture mode: {:?}", text)),
        }
    }
}

/// One note seen during a capture round.  `order` counts from zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub note: u8,
    pub channel: u8,
    pub order: usize,
}

impl CapturedEvent {
    /// Render as the note, with the channel only when it isn't zero.
    pub fn label(&self) -> String {
        if self.channel > 0 {
            format!("{} ch{}", self.note, self.channel)
        } else {
            format!("{}", self.note)
        }
    }
}

/// How a capture round ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CaptureOutcome {
    /// The round finished normally.  May be empty in confirm mode.
    Captured(Vec<CapturedEvent>),
    /// Timeout mode saw nothing at all.
    Timeout,
    /// The operator asked to redo this key.
    Retry,
    /// The run is being interrupted.
    Interrupted,
}

/// Everything a capture round reads from.
pub struct Inputs<S, I, T> {
    pub source: S,
    pub input: I,
    pub timer: T,
    pub interrupt: Interrupt,
    pub poll_ms: u64,
}

impl<S, I, T> Inputs<S, I, T>
where
    S: EventSource,
    I: OperatorInput,
    T: Timable,
{
    pub fn new(source: S, input: I, timer: T, interrupt: Interrupt) -> Self {
        Inputs {
            source,
            input,
            timer,
            interrupt,
            poll_ms: DEFAULT_POLL_MS,
        }
    }

    /// Run one capture round.
    pub fn capture_key(&mut self, mode: CaptureMode) -> CaptureOutcome {
        match mode {
            CaptureMode::Confirm => self.capture_confirm(),
            CaptureMode::Timeout {
                timeout_ms,
                settle_ms,
            } => self.capture_timeout(timeout_ms, settle_ms),
        }
    }

    fn capture_confirm(&mut self) -> CaptureOutcome {
        let mut events = Vec::new();

        loop {
            if self.interrupt.is_set() {
                return CaptureOutcome::Interrupted;
            }

            while let Some(ev) = self.source.poll() {
                record(&mut events, ev, |a, b| a.note == b.note && a.channel == b.channel);
            }

            if let Some(line) = self.input.poll_line() {
                match Token::parse(&line) {
                    Token::Confirm => return CaptureOutcome::Captured(events),
                    Token::Retry => {
                        println!("  Retrying...");
                        return CaptureOutcome::Retry;
                    }
                    _ => debug!("Ignoring input {:?} during capture", line),
                }
            }

            self.timer.delay(self.poll_ms);
        }
    }

    fn capture_timeout(&mut self, timeout_ms: u64, settle_ms: u64) -> CaptureOutcome {
        let mut events = Vec::new();
        let start = self.timer.get_ticks();
        let mut last = None;

        loop {
            if self.interrupt.is_set() {
                return CaptureOutcome::Interrupted;
            }

            while let Some(ev) = self.source.poll() {
                if record(&mut events, ev, |a, b| a.note == b.note) {
                    last = Some(self.timer.get_ticks());
                }
            }

            let now = self.timer.get_ticks();
            match last {
                None if now.saturating_sub(start) >= timeout_ms => return CaptureOutcome::Timeout,
                Some(at) if now.saturating_sub(at) >= settle_ms => {
                    return CaptureOutcome::Captured(events)
                }
                _ => (),
            }

            self.timer.delay(self.poll_ms);
        }
    }
}

/// Add `ev` to the round if it is a trigger not already matched by `same`.  Returns true if it
/// was added.
fn record<F>(events: &mut Vec<CapturedEvent>, ev: MidiEvent, same: F) -> bool
where
    F: Fn(&CapturedEvent, &CapturedEvent) -> bool,
{
    if !ev.is_trigger() {
        return false;
    }
    let captured = CapturedEvent {
        note: ev.note,
        channel: ev.channel,
        order: events.len(),
    };
    if events.iter().any(|e| same(e, &captured)) {
        return false;
    }
    println!("  Detected note {}", captured.label());
    events.push(captured);
    true
}
