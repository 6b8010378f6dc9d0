//! Scripted stand-ins for the MIDI port, the terminal and the clock.
//!
//! Everything shares one simulated clock, which only moves when something waits on it.  Events
//! and lines are released once the clock reaches their timestamp, so a whole calibration run can
//! be played back deterministically.

use std::{cell::Cell, collections::VecDeque, rc::Rc};

use crate::{
    event::{EventSource, MidiEvent},
    operator::OperatorInput,
    Timable,
};

/// A simulated millisecond clock.  Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn new() -> SimClock {
        SimClock::default()
    }

    pub fn now(&self) -> u64 {
        self.0.get()
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Timable for SimClock {
    fn get_ticks(&self) -> u64 {
        self.now()
    }

    fn delay(&mut self, ms: u64) {
        // Always move, so a zero poll interval can't hang a test.
        self.advance(ms.max(1));
    }
}

/// Events released at given times.
pub struct ScriptedSource {
    clock: SimClock,
    events: VecDeque<(u64, MidiEvent)>,
}

impl ScriptedSource {
    pub fn new(clock: &SimClock, events: &[(u64, MidiEvent)]) -> ScriptedSource {
        ScriptedSource {
            clock: clock.clone(),
            events: events.iter().copied().collect(),
        }
    }

    /// Number of events not yet delivered.
    pub fn pending(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ScriptedSource {
    fn poll(&mut self) -> Option<MidiEvent> {
        match self.events.front() {
            Some(&(at, ev)) if at <= self.clock.now() => {
                self.events.pop_front();
                Some(ev)
            }
            _ => None,
        }
    }
}

/// Operator lines released at given times.
pub struct ScriptedInput {
    clock: SimClock,
    lines: VecDeque<(u64, String)>,
}

impl ScriptedInput {
    pub fn new(clock: &SimClock, lines: &[(u64, &str)]) -> ScriptedInput {
        ScriptedInput {
            clock: clock.clone(),
            lines: lines.iter().map(|&(at, l)| (at, l.to_string())).collect(),
        }
    }

    pub fn pending(&self) -> usize {
        self.lines.len()
    }
}

impl OperatorInput for ScriptedInput {
    fn poll_line(&mut self) -> Option<String> {
        match self.lines.front() {
            Some((at, _)) if *at <= self.clock.now() => self.lines.pop_front().map(|(_, l)| l),
            _ => None,
        }
    }
}
