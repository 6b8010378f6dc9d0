//! Operator input.
//!
//! The operator answers with whole lines.  The input has to be checked without blocking, since
//! the MIDI port needs to be watched at the same time.

use crate::{Interrupt, Timable};

/// A recognized operator answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Token {
    /// A blank line.
    Confirm,
    Retry,
    Skip,
    Quit,
    /// Anything else.
    Other,
}

impl Token {
    pub fn parse(line: &str) -> Token {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => Token::Confirm,
            "r" => Token::Retry,
            "s" => Token::Skip,
            "q" => Token::Quit,
            _ => Token::Other,
        }
    }
}

/// A line oriented input that can be polled.
pub trait OperatorInput {
    /// Return a complete line if one is available, without the line terminator.
    fn poll_line(&mut self) -> Option<String>;
}

impl<I: OperatorInput + ?Sized> OperatorInput for &mut I {
    fn poll_line(&mut self) -> Option<String> {
        (**self).poll_line()
    }
}

/// Wait for a full line from the operator.  Returns None if interrupted first.
pub fn wait_line<I, T>(input: &mut I, timer: &mut T, interrupt: &Interrupt, poll_ms: u64) -> Option<String>
where
    I: OperatorInput + ?Sized,
    T: Timable + ?Sized,
{
    loop {
        if interrupt.is_set() {
            return None;
        }
        if let Some(line) = input.poll_line() {
            return Some(line);
        }
        timer.delay(poll_ms);
    }
}
