//! Events coming from the keyboard under test.

/// The kind of a MIDI channel message.  Only note on and off are distinguished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    Other,
}

/// A single decoded MIDI message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MidiEvent {
    pub kind: EventKind,
    pub note: u8,
    pub channel: u8,
    pub velocity: u8,
}

impl MidiEvent {
    pub fn note_on(note: u8, channel: u8, velocity: u8) -> MidiEvent {
        MidiEvent {
            kind: EventKind::NoteOn,
            note,
            channel,
            velocity,
        }
    }

    pub fn note_off(note: u8, channel: u8) -> MidiEvent {
        MidiEvent {
            kind: EventKind::NoteOff,
            note,
            channel,
            velocity: 0,
        }
    }

    /// Decode a raw MIDI message.  Returns None for anything too short to be a channel message.
    pub fn decode(bytes: &[u8]) -> Option<MidiEvent> {
        let (&status, data) = bytes.split_first()?;
        if status & 0x80 == 0 || status >= 0xf0 {
            // Running status and system messages are never produced by the firmware.
            return Some(MidiEvent {
                kind: EventKind::Other,
                note: 0,
                channel: 0,
                velocity: 0,
            });
        }
        let channel = status & 0x0f;
        let kind = match status & 0xf0 {
            0x90 => EventKind::NoteOn,
            0x80 => EventKind::NoteOff,
            _ => EventKind::Other,
        };
        let note = data.first().copied().unwrap_or(0) & 0x7f;
        let velocity = data.get(1).copied().unwrap_or(0) & 0x7f;
        if kind != EventKind::Other && data.len() < 2 {
            return None;
        }
        Some(MidiEvent {
            kind,
            note,
            channel,
            velocity,
        })
    }

    /// Is this a key being struck?  A note on with zero velocity is a release.
    pub fn is_trigger(&self) -> bool {
        self.kind == EventKind::NoteOn && self.velocity > 0
    }
}

/// A source of events that can be checked without blocking.
pub trait EventSource {
    /// Return the next pending event, if any.
    fn poll(&mut self) -> Option<MidiEvent>;
}

impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn poll(&mut self) -> Option<MidiEvent> {
        (**self).poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_note_on() {
        let ev = MidiEvent::decode(&[0x91, 5, 100]).unwrap();
        assert_eq!(ev, MidiEvent::note_on(5, 1, 100));
        assert!(ev.is_trigger());
    }

    #[test]
    fn zero_velocity_is_not_a_trigger() {
        let ev = MidiEvent::decode(&[0x90, 60, 0]).unwrap();
        assert_eq!(ev.kind, EventKind::NoteOn);
        assert!(!ev.is_trigger());
    }

    #[test]
    fn decode_others() {
        assert_eq!(MidiEvent::decode(&[0x80, 60, 64]).unwrap().kind, EventKind::NoteOff);
        assert_eq!(MidiEvent::decode(&[0xb0, 7, 100]).unwrap().kind, EventKind::Other);
        assert_eq!(MidiEvent::decode(&[0xf8]).unwrap().kind, EventKind::Other);
        assert_eq!(MidiEvent::decode(&[0x90, 60]), None);
        assert_eq!(MidiEvent::decode(&[]), None);
    }
}
