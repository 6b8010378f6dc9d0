//! Calibration sessions played back against scripted input.
//!
//! Times in the scripts are milliseconds on the simulated clock.  Every script ends with the
//! input the session is waiting for, otherwise the session would poll forever.

use keymapper::{
    capture::CapturedEvent,
    emit::{load_mapping, render_firmware},
    sim::{ScriptedInput, ScriptedSource, SimClock},
    AddressMode, CaptureMode, Coord, Emitter, ExpectedKey, Inputs, Interrupt, KeyResult,
    LookupTable, MidiEvent, OperatorInput, SensorLayout, Session, SessionMapping, State,
};

fn ev(note: u8, channel: u8, order: usize) -> CapturedEvent {
    CapturedEvent { note, channel, order }
}

fn keys(names: &[(&str, u8)]) -> Vec<ExpectedKey> {
    names.iter().map(|&(n, note)| ExpectedKey::new(n, note)).collect()
}

fn inputs(
    events: &[(u64, MidiEvent)],
    lines: &[(u64, &str)],
) -> Inputs<ScriptedSource, ScriptedInput, SimClock> {
    let clock = SimClock::new();
    Inputs::new(
        ScriptedSource::new(&clock, events),
        ScriptedInput::new(&clock, lines),
        clock,
        Interrupt::new(),
    )
}

#[test]
fn single_key_end_to_end() {
    let table = LookupTable::debug_channel(12, 12);
    let session = Session::new(
        keys(&[("C2", 36)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let mut io = inputs(&[(0, MidiEvent::note_on(0, 0, 100))], &[(20, "")]);
    let finished = session.run(&mut io);

    assert_eq!(finished.state, State::Completed);
    assert_eq!(io.source.pending(), 0);
    assert_eq!(io.input.pending(), 0);
    let mut expected = SessionMapping::new();
    expected.insert(KeyResult {
        name: "C2".to_string(),
        expected_note: 36,
        captured: vec![ev(0, 0, 0)],
        positions: vec![Coord(0, 0)],
    });
    assert_eq!(finished.mapping, expected);

    let dir = tempfile::tempdir().unwrap();
    let emitter = Emitter {
        out_dir: dir.path().join("test_results"),
        c_file: dir.path().join("generated_note_map.c"),
        layout: SensorLayout::Dual,
        table: &table,
        address: AddressMode::Channel,
    };

    let maps = emitter.note_maps(&finished.mapping);
    for (i, map) in maps.iter().enumerate() {
        for (r, row) in map.cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if i == 0 && r == 0 && c == 0 {
                    assert_eq!(*cell, Some(36));
                } else {
                    assert_eq!(*cell, None, "map {} cell [{},{}]", i, r, c);
                }
            }
        }
    }

    let artifacts = emitter.emit(finished.mapping).unwrap();
    let text = std::fs::read_to_string(&artifacts.firmware).unwrap();
    assert_eq!(text, render_firmware(&maps));
    assert!(text.contains("/* Row  0*/  {        C2, NOTE_NONE,"));
    assert_eq!(text.matches("NOTE_NONE").count(), 2 * 144 - 1);

    let report = std::fs::read_to_string(&artifacts.report).unwrap();
    assert!(report.contains("**C2** (MIDI 36): Positions [0,0] [Single sensor: 0]"));

    assert_eq!(load_mapping(&artifacts.json).unwrap(), expected);
}

#[test]
fn skip_then_continue() {
    let table = LookupTable::debug_channel(12, 12);
    let mut session = Session::new(
        keys(&[("C2", 36), ("C#2", 37)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let mut io = inputs(
        &[(40, MidiEvent::note_on(1, 0, 90))],
        &[(10, ""), (20, "x"), (30, "S"), (50, "")],
    );

    assert_eq!(session.step(&mut io), State::AwaitingKey(1));
    assert_eq!(session.step(&mut io), State::Completed);

    let mapping = session.finish().mapping;
    assert_eq!(mapping.len(), 2);
    let c2 = mapping.get("C2").unwrap();
    assert!(c2.captured.is_empty());
    assert!(c2.positions.is_empty());
    assert_eq!(c2.expected_note, 36);
    assert_eq!(mapping.get("C#2").unwrap().positions, vec![Coord(0, 1)]);
}

#[test]
fn retry_discards_the_round() {
    let table = LookupTable::debug_channel(12, 12);
    let mut session = Session::new(
        keys(&[("C2", 36)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let mut io = inputs(
        &[
            (0, MidiEvent::note_on(5, 0, 90)),
            (20, MidiEvent::note_on(6, 0, 90)),
            (25, MidiEvent::note_on(6, 1, 90)),
        ],
        &[(10, "r"), (30, "")],
    );

    assert_eq!(session.step(&mut io), State::AwaitingKey(0));
    assert_eq!(session.step(&mut io), State::Completed);

    let result = session.mapping().get("C2").unwrap().clone();
    assert_eq!(result.captured, vec![ev(6, 0, 0), ev(6, 1, 1)]);
    assert_eq!(result.positions, vec![Coord(0, 6), Coord(11, 2)]);
}

#[test]
fn retry_from_the_empty_menu() {
    let table = LookupTable::debug_channel(12, 12);
    let session = Session::new(
        keys(&[("C2", 36)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let mut io = inputs(
        &[(30, MidiEvent::note_on(9, 0, 90))],
        &[(10, ""), (20, "r"), (40, "")],
    );
    let finished = session.run(&mut io);
    assert_eq!(finished.state, State::Completed);
    assert_eq!(finished.mapping.get("C2").unwrap().positions, vec![Coord(0, 9)]);
}

#[test]
fn quit_keeps_earlier_keys() {
    let table = LookupTable::debug_channel(12, 12);
    let session = Session::new(
        keys(&[("C2", 36), ("C#2", 37), ("D2", 38), ("D#2", 39)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let mut io = inputs(
        &[
            (0, MidiEvent::note_on(0, 0, 90)),
            (20, MidiEvent::note_on(1, 0, 90)),
        ],
        &[(10, ""), (30, ""), (40, ""), (50, "q")],
    );
    let finished = session.run(&mut io);

    assert_eq!(finished.state, State::Aborted);
    let names: Vec<&str> = finished.mapping.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["C2", "C#2"]);
}

/// Raises the interrupt when it reaches a `^C` line, as the Ctrl-C handler would.
struct CtrlC {
    inner: ScriptedInput,
    interrupt: Interrupt,
}

impl OperatorInput for CtrlC {
    fn poll_line(&mut self) -> Option<String> {
        match self.inner.poll_line() {
            Some(line) if line == "^C" => {
                self.interrupt.trigger();
                None
            }
            other => other,
        }
    }
}

#[test]
fn interrupt_drops_only_the_current_key() {
    let table = LookupTable::debug_channel(12, 12);
    let session = Session::new(
        keys(&[("C2", 36), ("C#2", 37), ("D2", 38)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let clock = SimClock::new();
    let interrupt = Interrupt::new();
    let mut io = Inputs::new(
        ScriptedSource::new(
            &clock,
            &[
                (0, MidiEvent::note_on(0, 0, 90)),
                (20, MidiEvent::note_on(1, 0, 90)),
            ],
        ),
        CtrlC {
            inner: ScriptedInput::new(&clock, &[(10, ""), (30, "^C")]),
            interrupt: interrupt.clone(),
        },
        clock,
        interrupt,
    );
    let finished = session.run(&mut io);

    assert_eq!(finished.state, State::Aborted);
    assert_eq!(finished.mapping.len(), 1);
    assert_eq!(finished.mapping.get("C2").unwrap().positions, vec![Coord(0, 0)]);
    assert!(finished.mapping.get("C#2").is_none());
}

#[test]
fn interrupt_at_the_menu() {
    let table = LookupTable::debug_channel(12, 12);
    let session = Session::new(
        keys(&[("C2", 36)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let clock = SimClock::new();
    let interrupt = Interrupt::new();
    let mut io = Inputs::new(
        ScriptedSource::new(&clock, &[]),
        CtrlC {
            inner: ScriptedInput::new(&clock, &[(10, ""), (20, "^C")]),
            interrupt: interrupt.clone(),
        },
        clock,
        interrupt,
    );
    let finished = session.run(&mut io);
    assert_eq!(finished.state, State::Aborted);
    assert!(finished.mapping.is_empty());
}

#[test]
fn unresolved_notes_are_kept_but_not_placed() {
    let table = LookupTable::debug_channel(12, 12);
    let session = Session::new(
        keys(&[("C2", 36)]),
        &table,
        AddressMode::Channel,
        CaptureMode::Confirm,
    );
    let mut io = inputs(
        &[
            (0, MidiEvent::note_on(100, 1, 90)),
            (5, MidiEvent::note_on(2, 0, 90)),
        ],
        &[(10, "")],
    );
    let finished = session.run(&mut io);
    let result = finished.mapping.get("C2").unwrap();
    assert_eq!(result.captured, vec![ev(100, 1, 0), ev(2, 0, 1)]);
    assert_eq!(result.positions, vec![Coord(0, 2)]);
}

#[test]
fn timed_session_with_wraparound() {
    let table = LookupTable::debug_wrap(12, 12);
    let session = Session::new(
        keys(&[("C2", 36), ("C#2", 37)]),
        &table,
        AddressMode::Wrap,
        CaptureMode::Timeout {
            timeout_ms: 3000,
            settle_ms: 500,
        },
    );
    // The first key arrives on channel 1, which wraparound addressing ignores.  The second key
    // never arrives, so it times out and is skipped.
    let mut io = inputs(&[(100, MidiEvent::note_on(20, 1, 90))], &[(4000, "s")]);
    let finished = session.run(&mut io);

    assert_eq!(finished.state, State::Completed);
    assert_eq!(finished.mapping.get("C2").unwrap().positions, vec![Coord(1, 8)]);
    assert!(finished.mapping.get("C#2").unwrap().captured.is_empty());

    let emitter = Emitter {
        out_dir: Default::default(),
        c_file: Default::default(),
        layout: SensorLayout::Single,
        table: &table,
        address: AddressMode::Wrap,
    };
    let maps = emitter.note_maps(&finished.mapping);
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].cells[1][8], Some(36));
}

#[test]
fn no_keys() {
    let table = LookupTable::debug_channel(12, 12);
    let session = Session::new(vec![], &table, AddressMode::Channel, CaptureMode::Confirm);
    let mut io = inputs(&[], &[]);
    let finished = session.run(&mut io);
    assert_eq!(finished.state, State::Completed);
    assert!(finished.mapping.is_empty());
}
