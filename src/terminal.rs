//! Operator input from the terminal.
//!
//! termion's async stdin hands over whatever bytes have arrived so far.  They are gathered here
//! until a full line is available.

use std::io::Read;

use keymapper::OperatorInput;
use termion::AsyncReader;

pub struct Terminal {
    reader: AsyncReader,
    pending: Vec<u8>,
}

impl Terminal {
    pub fn new() -> Terminal {
        Terminal {
            reader: termion::async_stdin(),
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&line[..end]);
        Some(text.trim_end_matches('\r').to_string())
    }
}

impl OperatorInput for Terminal {
    fn poll_line(&mut self) -> Option<String> {
        if let Some(line) = self.take_line() {
            return Some(line);
        }
        let mut buf = [0u8; 64];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
            }
        }
        self.take_line()
    }
}
