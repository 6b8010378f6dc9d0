//! MIDI note names.

use crate::session::ExpectedKey;

const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

// The firmware headers can't use '#' in identifiers.
const TOKENS: [&str; 12] = ["C", "Cs", "D", "Ds", "E", "F", "Fs", "G", "Gs", "A", "As", "B"];

/// Lowest and highest note of a 61-key keyboard, C2 to C7.
pub const FIRST_NOTE: u8 = 36;
pub const LAST_NOTE: u8 = 96;

fn octave(note: u8) -> i32 {
    note as i32 / 12 - 1
}

/// The usual display name of a note, such as `C#4` for 61.
pub fn note_name(note: u8) -> String {
    format!("{}{}", NAMES[note as usize % 12], octave(note))
}

/// The constant name used for a note in the firmware's note map, such as `Cs4` for 61.  The
/// lowest octave is written `_1`, giving `C_1` for note 0.
pub fn firmware_token(note: u8) -> String {
    let name = TOKENS[note as usize % 12];
    match octave(note) {
        -1 => format!("{}_1", name),
        oct => format!("{}{}", name, oct),
    }
}

/// The expected keys for every note from `first` to `last` inclusive.
pub fn key_sequence(first: u8, last: u8) -> Vec<ExpectedKey> {
    (first..=last)
        .map(|note| ExpectedKey::new(note_name(note), note))
        .collect()
}
