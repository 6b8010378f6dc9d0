//! The calibration session.
//!
//! The session walks through the expected keys in order, asking the operator to strike each one,
//! and records which matrix positions it triggered.  It is a small state machine:
//!
//! - `AwaitingKey(i)`: capturing for key `i`.  A retry stays here, a successful capture or a skip
//!   moves on to `i + 1` (or `Completed` after the last key).
//! - `Completed`: every key has a result.
//! - `Aborted`: the operator quit, or the run was interrupted.  The results gathered so far are
//!   kept, but the key in progress is dropped.

use std::fmt;

use log::{debug, info, warn};
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{
    capture::{CaptureMode, CaptureOutcome, CapturedEvent, Inputs},
    event::EventSource,
    operator::{wait_line, OperatorInput, Token},
    table::{AddressMode, Coord, LookupTable},
    Timable,
};

/// A key the operator will be asked to press.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpectedKey {
    pub name: String,
    pub note: u8,
}

impl ExpectedKey {
    pub fn new<S: Into<String>>(name: S, note: u8) -> ExpectedKey {
        ExpectedKey {
            name: name.into(),
            note,
        }
    }
}

/// The final result for one key.  Both lists are in capture order, and may be empty if the key
/// was skipped.  `positions` only holds the events that were found in the table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyResult {
    pub name: String,
    pub expected_note: u8,
    pub captured: Vec<CapturedEvent>,
    pub positions: Vec<Coord>,
}

impl KeyResult {
    pub fn skipped(key: &ExpectedKey) -> KeyResult {
        KeyResult {
            name: key.name.clone(),
            expected_note: key.note,
            captured: Vec::new(),
            positions: Vec::new(),
        }
    }
}

/// All of the results of a session, in the order the keys were calibrated.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionMapping {
    results: Vec<KeyResult>,
}

impl SessionMapping {
    pub fn new() -> SessionMapping {
        SessionMapping::default()
    }

    /// Add a result.  A later result for the same name replaces the earlier one in place.
    pub fn insert(&mut self, result: KeyResult) {
        match self.results.iter_mut().find(|r| r.name == result.name) {
            Some(slot) => *slot = result,
            None => self.results.push(result),
        }
    }

    pub fn get(&self, name: &str) -> Option<&KeyResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// The on-disk form of a single result.  The name is the map key.
#[derive(Serialize, Deserialize)]
struct Record {
    expected_midi_note: u8,
    captured_events: Vec<CapturedEvent>,
    matrix_positions: Vec<Coord>,
}

impl Serialize for SessionMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for r in &self.results {
            map.serialize_entry(
                &r.name,
                &Record {
                    expected_midi_note: r.expected_note,
                    captured_events: r.captured.clone(),
                    matrix_positions: r.positions.clone(),
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SessionMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MappingVisitor)
    }
}

struct MappingVisitor;

impl<'de> Visitor<'de> for MappingVisitor {
    type Value = SessionMapping;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of key names to results")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut mapping = SessionMapping::new();
        while let Some((name, rec)) = access.next_entry::<String, Record>()? {
            mapping.insert(KeyResult {
                name,
                expected_note: rec.expected_midi_note,
                captured: rec.captured_events,
                positions: rec.matrix_positions,
            });
        }
        Ok(mapping)
    }
}

/// Where the session is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    AwaitingKey(usize),
    Completed,
    Aborted,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, State::AwaitingKey(_))
    }
}

/// A session that has reached a terminal state.
#[derive(Debug)]
pub struct Finished {
    pub state: State,
    pub mapping: SessionMapping,
}

pub struct Session<'a> {
    keys: Vec<ExpectedKey>,
    table: &'a LookupTable,
    address: AddressMode,
    mode: CaptureMode,
    state: State,
    mapping: SessionMapping,
}

impl<'a> Session<'a> {
    pub fn new(
        keys: Vec<ExpectedKey>,
        table: &'a LookupTable,
        address: AddressMode,
        mode: CaptureMode,
    ) -> Session<'a> {
        let state = if keys.is_empty() {
            State::Completed
        } else {
            State::AwaitingKey(0)
        };
        Session {
            keys,
            table,
            address,
            mode,
            state,
            mapping: SessionMapping::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn mapping(&self) -> &SessionMapping {
        &self.mapping
    }

    /// Print the operator instructions for this session.
    pub fn show_instructions(&self) {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return,
        };
        println!("\n{}", "=".repeat(60));
        println!("MAPPING {} KEYS ({} to {})", self.keys.len(), first.name, last.name);
        println!("{}", "=".repeat(60));
        println!("\nInstructions:");
        println!("  1. Press the requested piano key");
        match self.mode {
            CaptureMode::Confirm => {
                println!("  2. Press Enter to confirm");
                println!("  3. Or type 'r' + Enter to retry");
            }
            CaptureMode::Timeout { settle_ms, .. } => {
                println!("  2. Release it; the key is recorded {}ms after the last note", settle_ms);
                println!("  3. If nothing arrives you can retry, skip or quit");
            }
        }
        println!("  4. Press Ctrl+C to quit and save partial results");
    }

    /// Run until the session reaches a terminal state.
    pub fn run<S, I, T>(mut self, io: &mut Inputs<S, I, T>) -> Finished
    where
        S: EventSource,
        I: OperatorInput,
        T: Timable,
    {
        while !self.state.is_terminal() {
            self.step(io);
        }
        info!("Session ended {:?} with {} keys", self.state, self.mapping.len());
        self.finish()
    }

    /// Hand over the results.
    pub fn finish(self) -> Finished {
        Finished {
            state: self.state,
            mapping: self.mapping,
        }
    }

    /// Perform a single transition.
    pub fn step<S, I, T>(&mut self, io: &mut Inputs<S, I, T>) -> State
    where
        S: EventSource,
        I: OperatorInput,
        T: Timable,
    {
        let index = match self.state {
            State::AwaitingKey(index) => index,
            state => return state,
        };
        let key = self.keys[index].clone();

        println!("\n[{}/{}] {} (MIDI note {})", index + 1, self.keys.len(), key.name, key.note);
        match self.mode {
            CaptureMode::Confirm => {
                println!("  Press key, then Enter to confirm (or 'r' + Enter to retry)")
            }
            CaptureMode::Timeout { .. } => println!("  Press key..."),
        }

        self.state = match io.capture_key(self.mode) {
            CaptureOutcome::Interrupted => State::Aborted,
            CaptureOutcome::Retry => State::AwaitingKey(index),
            CaptureOutcome::Captured(events) if !events.is_empty() => {
                let positions = self.resolve(&events);
                show_capture(&events, &positions);
                self.mapping.insert(KeyResult {
                    name: key.name,
                    expected_note: key.note,
                    captured: events,
                    positions,
                });
                self.next(index)
            }
            CaptureOutcome::Timeout | CaptureOutcome::Captured(_) => self.ask_empty(io, &key, index),
        };
        debug!("Key {} -> {:?}", index, self.state);
        self.state
    }

    /// Nothing was captured, so ask the operator what to do.
    fn ask_empty<S, I, T>(&mut self, io: &mut Inputs<S, I, T>, key: &ExpectedKey, index: usize) -> State
    where
        S: EventSource,
        I: OperatorInput,
        T: Timable,
    {
        loop {
            println!("  No notes captured. Retry (r), skip (s) or quit (q)?");
            let line = match wait_line(&mut io.input, &mut io.timer, &io.interrupt, io.poll_ms) {
                Some(line) => line,
                None => return State::Aborted,
            };
            match Token::parse(&line) {
                Token::Retry => return State::AwaitingKey(index),
                Token::Skip => {
                    info!("Skipping {}", key.name);
                    self.mapping.insert(KeyResult::skipped(key));
                    return self.next(index);
                }
                Token::Quit => {
                    println!("\nQuitting...");
                    return State::Aborted;
                }
                _ => println!("  Please answer r, s or q."),
            }
        }
    }

    fn next(&self, index: usize) -> State {
        if index + 1 < self.keys.len() {
            State::AwaitingKey(index + 1)
        } else {
            State::Completed
        }
    }

    /// Find the matrix position of each captured event, in order.  Events that are not in the
    /// table are warned about and dropped.
    pub fn resolve(&self, events: &[CapturedEvent]) -> Vec<Coord> {
        events
            .iter()
            .filter_map(|ev| {
                let code = self.address.code(ev.note, ev.channel);
                let pos = self.table.resolve(code);
                if pos.is_none() {
                    warn!("Note {} (code {}) not found in lookup table", ev.label(), code);
                }
                pos
            })
            .collect()
    }
}

fn show_capture(events: &[CapturedEvent], positions: &[Coord]) {
    match events {
        [one] => println!("  Single sensor: {}", one.label()),
        [first, second] => println!(
            "  Dual sensors: {} (first) -> {} (second)",
            first.label(),
            second.label()
        ),
        _ => println!("  Captured {} notes", events.len()),
    }
    if !positions.is_empty() {
        let text: Vec<String> = positions.iter().map(|p| p.to_string()).collect();
        println!("  Mapped to matrix positions: {}", text.join(" "));
    }
}
