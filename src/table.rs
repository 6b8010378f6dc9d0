//! Matrix lookup table.
//!
//! The firmware, when built with its debug mapping, reports every matrix position as a distinct
//! MIDI note.  This table is the inverse of that: given the position code recovered from an
//! incoming note, find the (row, column) in the key matrix that produced it.
//!
//! There are two ways the debug firmware has packed positions into notes.  The dual sensor boards
//! put positions 0-127 on channel 0 and the rest on channel 1.  The older single sensor builds
//! ignore the channel and just wrap the position at 128.  Only one of these is ever active for a
//! run, selected by [`AddressMode`].

use std::{fmt, fs::File, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A position code, as found in the table cells.
pub type PositionCode = u16;

/// Number of notes on a single MIDI channel.
pub const NOTES_PER_CHANNEL: u16 = 128;

/// Default matrix dimensions of the reference board.
pub const DEFAULT_ROWS: usize = 12;
pub const DEFAULT_COLS: usize = 12;

/// A (row, column) coordinate in the key matrix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Coord(pub u8, pub u8);

impl Coord {
    pub fn row(&self) -> usize {
        self.0 as usize
    }

    pub fn col(&self) -> usize {
        self.1 as usize
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.0, self.1)
    }
}

/// How a note and channel are combined into a [`PositionCode`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressMode {
    /// `code = note + 128 * channel`.
    Channel,
    /// Channel ignored, `code = note % 128`.
    Wrap,
}

impl AddressMode {
    pub fn code(&self, note: u8, channel: u8) -> PositionCode {
        match self {
            AddressMode::Channel => note as u16 + NOTES_PER_CHANNEL * channel as u16,
            AddressMode::Wrap => note as u16 % NOTES_PER_CHANNEL,
        }
    }
}

impl FromStr for AddressMode {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "channel" => Ok(AddressMode::Channel),
            "wrap" => Ok(AddressMode::Wrap),
            _ => Err(format!("Unknown addressing mode: {:?}", text)),
        }
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table has no rows")]
    Empty,
    #[error("row {row} has {len} columns, expected {expected}")]
    Ragged { row: usize, len: usize, expected: usize },
    #[error("table is too large: {rows}x{cols}")]
    TooLarge { rows: usize, cols: usize },
    #[error("code {code} appears at both {first} and {second}")]
    Duplicate {
        code: PositionCode,
        first: Coord,
        second: Coord,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table file error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A code that was found in more than one cell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Duplicate {
    pub code: PositionCode,
    pub first: Coord,
    pub second: Coord,
}

/// The R x C grid of position codes.  Cells holding `None` are not wired to anything.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LookupTable {
    rows: usize,
    cols: usize,
    cells: Vec<Option<PositionCode>>,
}

impl LookupTable {
    /// Build a table from explicit rows.  All rows must be the same length.
    pub fn from_rows(rows: Vec<Vec<Option<PositionCode>>>) -> Result<LookupTable, TableError> {
        let expected = match rows.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => return Err(TableError::Empty),
        };
        // Coordinates are stored as bytes.
        if rows.len() > 256 || expected > 256 {
            return Err(TableError::TooLarge {
                rows: rows.len(),
                cols: expected,
            });
        }

        let nrows = rows.len();
        let mut cells = Vec::with_capacity(nrows * expected);
        for (row, data) in rows.into_iter().enumerate() {
            if data.len() != expected {
                return Err(TableError::Ragged {
                    row,
                    len: data.len(),
                    expected,
                });
            }
            cells.extend(data);
        }

        Ok(LookupTable {
            rows: nrows,
            cols: expected,
            cells,
        })
    }

    /// The debug mapping used by the dual sensor firmware: each cell holds its own row-major
    /// index, so positions past 127 are reached through channel 1.
    pub fn debug_channel(rows: usize, cols: usize) -> LookupTable {
        Self::generate(rows, cols, |pos| pos as PositionCode)
    }

    /// The debug mapping used by the wraparound firmware.  The position wraps at 128, so on a
    /// 12x12 matrix the last 16 cells repeat the codes of the first 16.
    pub fn debug_wrap(rows: usize, cols: usize) -> LookupTable {
        Self::generate(rows, cols, |pos| (pos % NOTES_PER_CHANNEL as usize) as PositionCode)
    }

    /// The built in table matching an addressing mode.
    pub fn for_mode(mode: AddressMode, rows: usize, cols: usize) -> LookupTable {
        match mode {
            AddressMode::Channel => Self::debug_channel(rows, cols),
            AddressMode::Wrap => Self::debug_wrap(rows, cols),
        }
    }

    fn generate<F>(rows: usize, cols: usize, cell: F) -> LookupTable
    where
        F: Fn(usize) -> PositionCode,
    {
        let rows = rows.clamp(1, 256);
        let cols = cols.clamp(1, 256);
        LookupTable {
            rows,
            cols,
            cells: (0..rows * cols).map(|pos| Some(cell(pos))).collect(),
        }
    }

    /// Load a table from a JSON file.  The file holds an array of rows, each an array of
    /// integers, with `null` for unwired cells.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LookupTable, TableError> {
        let rows: Vec<Vec<Option<PositionCode>>> = serde_json::from_reader(File::open(path)?)?;
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The code stored at a given cell.
    pub fn get(&self, coord: Coord) -> Option<PositionCode> {
        if coord.row() >= self.rows || coord.col() >= self.cols {
            return None;
        }
        self.cells[coord.row() * self.cols + coord.col()]
    }

    /// Iterate over every wired cell, in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, PositionCode)> + '_ {
        let cols = self.cols;
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.map(|code| (Coord((i / cols) as u8, (i % cols) as u8), code))
        })
    }

    /// Find the matrix position holding `code`.  The first match in row-major order wins.
    pub fn resolve(&self, code: PositionCode) -> Option<Coord> {
        self.iter().find(|&(_, c)| c == code).map(|(coord, _)| coord)
    }

    /// Every cell whose code was already seen earlier in row-major order.
    pub fn validate(&self) -> Vec<Duplicate> {
        let mut seen: Vec<(PositionCode, Coord)> = Vec::new();
        let mut dups = Vec::new();
        for (coord, code) in self.iter() {
            match seen.iter().find(|(c, _)| *c == code) {
                Some(&(_, first)) => dups.push(Duplicate {
                    code,
                    first,
                    second: coord,
                }),
                None => seen.push((code, coord)),
            }
        }
        dups
    }

    /// Fail on the first duplicated code.
    pub fn check_injective(&self) -> Result<(), TableError> {
        match self.validate().first() {
            Some(d) => Err(TableError::Duplicate {
                code: d.code,
                first: d.first,
                second: d.second,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_table_resolves_every_code() {
        let table = LookupTable::debug_channel(12, 12);
        assert!(table.validate().is_empty());
        for (coord, code) in table.iter() {
            assert_eq!(table.resolve(code), Some(coord));
        }
        assert_eq!(table.resolve(0), Some(Coord(0, 0)));
        assert_eq!(table.resolve(131), Some(Coord(10, 11)));
        assert_eq!(table.resolve(143), Some(Coord(11, 11)));
        assert_eq!(table.resolve(144), None);
        assert_eq!(table.resolve(500), None);
    }

    #[test]
    fn channel_addressing() {
        let mode = AddressMode::Channel;
        assert_eq!(mode.code(5, 0), 5);
        assert_eq!(mode.code(0, 1), 128);
        assert_eq!(mode.code(15, 1), 143);
    }

    #[test]
    fn wrap_addressing_ignores_channel() {
        let mode = AddressMode::Wrap;
        assert_eq!(mode.code(5, 0), 5);
        assert_eq!(mode.code(5, 1), 5);
        assert_eq!(mode.code(127, 3), 127);
    }

    #[test]
    fn wrap_table_reports_duplicates() {
        let table = LookupTable::debug_wrap(12, 12);
        let dups = table.validate();
        assert_eq!(dups.len(), 16);
        assert_eq!(
            dups[0],
            Duplicate {
                code: 0,
                first: Coord(0, 0),
                second: Coord(10, 8),
            }
        );
        assert!(matches!(
            table.check_injective(),
            Err(TableError::Duplicate { code: 0, .. })
        ));
        // First match wins.
        assert_eq!(table.resolve(3), Some(Coord(0, 3)));
    }

    #[test]
    fn unwired_cells() {
        let table = LookupTable::from_rows(vec![vec![Some(7), None], vec![None, Some(2)]]).unwrap();
        assert_eq!(table.rows(), 2);
        assert_eq!(table.cols(), 2);
        assert_eq!(table.resolve(7), Some(Coord(0, 0)));
        assert_eq!(table.resolve(2), Some(Coord(1, 1)));
        assert_eq!(table.resolve(0), None);
        assert_eq!(table.get(Coord(0, 1)), None);
        assert_eq!(table.get(Coord(5, 5)), None);
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = LookupTable::from_rows(vec![vec![Some(1), Some(2)], vec![Some(3)]]).unwrap_err();
        assert!(matches!(err, TableError::Ragged { row: 1, len: 1, expected: 2 }));
        assert!(matches!(LookupTable::from_rows(vec![]), Err(TableError::Empty)));
    }

    #[test]
    fn load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        std::fs::write(&path, "[[0, 1, null], [2, 3, 4]]").unwrap();
        let table = LookupTable::load(&path).unwrap();
        assert_eq!(table.resolve(4), Some(Coord(1, 2)));
        assert_eq!(table.get(Coord(0, 2)), None);
    }
}
