//! MIDI input ports, through midir.
//!
//! midir delivers messages on its own thread through a callback.  The callback only decodes and
//! forwards them over a channel, so the calibration loop can poll without blocking.

use std::sync::mpsc::{channel, Receiver};

use anyhow::{anyhow, Result};
use keymapper::{EventSource, MidiEvent};
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection};

const CLIENT_NAME: &str = "keymapper";

/// The names of the available input ports, in the order the backend reports them.
pub fn port_names() -> Result<Vec<String>> {
    let input = MidiInput::new(CLIENT_NAME)?;
    let names = input
        .ports()
        .iter()
        .filter_map(|p| input.port_name(p).ok())
        .collect();
    Ok(names)
}

/// An open input port.  The connection is closed when this is dropped.
pub struct MidiPort {
    name: String,
    conn: Option<MidiInputConnection<()>>,
    rx: Receiver<MidiEvent>,
}

impl MidiPort {
    pub fn open(name: &str) -> Result<MidiPort> {
        let mut input = MidiInput::new(CLIENT_NAME)?;
        input.ignore(Ignore::All);

        let port = input
            .ports()
            .into_iter()
            .find(|p| input.port_name(p).map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("MIDI port {:?} has gone away", name))?;

        let (tx, rx) = channel();
        let conn = input
            .connect(
                &port,
                "keymapper-in",
                move |_stamp, bytes, _| {
                    if let Some(ev) = MidiEvent::decode(bytes) {
                        // The receiver only goes away while closing.
                        let _ = tx.send(ev);
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("Unable to connect to {:?}: {}", name, e))?;

        info!("Opened MIDI port {:?}", name);
        Ok(MidiPort {
            name: name.to_string(),
            conn: Some(conn),
            rx,
        })
    }
}

impl EventSource for MidiPort {
    fn poll(&mut self) -> Option<MidiEvent> {
        let ev = self.rx.try_recv().ok()?;
        debug!("midi: {:?}", ev);
        Some(ev)
    }
}

impl Drop for MidiPort {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.close();
            println!("\nMIDI port {} closed.", self.name);
        }
    }
}
