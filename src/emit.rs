//! Writing out the results.
//!
//! A finished session produces three files:
//!
//! - `key_mapping.json`: the full mapping, which [`load_mapping`] can read back.
//! - `key_mapping.md`: a line per key for people to read.
//! - a C source file with the note map arrays, ready to paste into the firmware's `note_map.h`.

use std::{
    fmt::Write as _,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use log::info;
use thiserror::Error;

use crate::{
    note::firmware_token,
    session::{KeyResult, SessionMapping},
    table::{AddressMode, Coord, LookupTable},
};

pub const JSON_NAME: &str = "key_mapping.json";
pub const REPORT_NAME: &str = "key_mapping.md";

/// Cell value for a position with no key.
pub const NOTE_NONE: &str = "NOTE_NONE";

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json error on {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl EmitError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> EmitError + '_ {
        move |source| EmitError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> EmitError + '_ {
        move |source| EmitError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// How the firmware tells sensors apart.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SensorLayout {
    /// Two switches per key.  The first and second to close go in separate arrays.
    Dual,
    /// One array holding every position that was found.
    Single,
}

impl FromStr for SensorLayout {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "dual" => Ok(SensorLayout::Dual),
            "single" => Ok(SensorLayout::Single),
            _ => Err(format!("Unknown sensor layout: {:?}", text)),
        }
    }
}

/// One firmware array: its C name, and the note at each cell.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NoteMap {
    pub name: &'static str,
    pub comment: &'static str,
    pub cells: Vec<Vec<Option<u8>>>,
}

impl NoteMap {
    fn new(name: &'static str, comment: &'static str, rows: usize, cols: usize) -> NoteMap {
        NoteMap {
            name,
            comment,
            cells: vec![vec![None; cols]; rows],
        }
    }

    fn set(&mut self, pos: Coord, note: u8) {
        if let Some(cell) = self
            .cells
            .get_mut(pos.row())
            .and_then(|row| row.get_mut(pos.col()))
        {
            *cell = Some(note);
        }
    }
}

/// Writes the result files for a session.
pub struct Emitter<'a> {
    pub out_dir: PathBuf,
    pub c_file: PathBuf,
    pub layout: SensorLayout,
    pub table: &'a LookupTable,
    pub address: AddressMode,
}

/// Where the files were written.
#[derive(Debug)]
pub struct Artifacts {
    pub json: PathBuf,
    pub report: PathBuf,
    pub firmware: PathBuf,
}

impl<'a> Emitter<'a> {
    /// Write all three files.  The C file path is taken as is, the others go in `out_dir`.
    pub fn emit(&self, mapping: SessionMapping) -> Result<Artifacts, EmitError> {
        fs::create_dir_all(&self.out_dir).map_err(EmitError::io(&self.out_dir))?;

        let json = self.out_dir.join(JSON_NAME);
        save_mapping(&mapping, &json)?;
        println!("Saved JSON mapping to: {}", json.display());

        let report = self.out_dir.join(REPORT_NAME);
        write_text(&report, &render_report(&mapping))?;
        println!("Saved Markdown to: {}", report.display());

        if let Some(parent) = self.c_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(EmitError::io(parent))?;
            }
        }
        let maps = self.note_maps(&mapping);
        write_text(&self.c_file, &render_firmware(&maps))?;
        println!("Saved C code to: {}", self.c_file.display());

        info!("Wrote {} keys", mapping.len());
        Ok(Artifacts {
            json,
            report,
            firmware: self.c_file.clone(),
        })
    }

    /// Build the firmware arrays.  Each captured event is looked up again, so that in the dual
    /// layout an unresolved first sensor can't shift the second into the wrong array.
    pub fn note_maps(&self, mapping: &SessionMapping) -> Vec<NoteMap> {
        let (rows, cols) = (self.table.rows(), self.table.cols());
        let mut maps = match self.layout {
            SensorLayout::Dual => vec![
                NoteMap::new(
                    "first_sensor_map",
                    "First sensor (triggers first when key is pressed)",
                    rows,
                    cols,
                ),
                NoteMap::new(
                    "second_sensor_map",
                    "Second sensor (triggers after first sensor)",
                    rows,
                    cols,
                ),
            ],
            SensorLayout::Single => vec![NoteMap::new("note_map", "Matrix position to note", rows, cols)],
        };

        for result in mapping.iter() {
            for ev in &result.captured {
                let slot = match self.layout {
                    SensorLayout::Dual if ev.order < 2 => ev.order,
                    SensorLayout::Dual => continue,
                    SensorLayout::Single => 0,
                };
                let code = self.address.code(ev.note, ev.channel);
                if let Some(pos) = self.table.resolve(code) {
                    maps[slot].set(pos, result.expected_note);
                }
            }
        }
        maps
    }
}

fn write_text(path: &Path, text: &str) -> Result<(), EmitError> {
    fs::write(path, text).map_err(EmitError::io(path))
}

/// Write the mapping as JSON.
pub fn save_mapping(mapping: &SessionMapping, path: &Path) -> Result<(), EmitError> {
    let fd = File::create(path).map_err(EmitError::io(path))?;
    let mut fd = BufWriter::new(fd);
    serde_json::to_writer_pretty(&mut fd, mapping).map_err(EmitError::json(path))?;
    writeln!(fd).map_err(EmitError::io(path))?;
    fd.flush().map_err(EmitError::io(path))
}

/// Read back a mapping written by [`save_mapping`].
pub fn load_mapping(path: &Path) -> Result<SessionMapping, EmitError> {
    let fd = File::open(path).map_err(EmitError::io(path))?;
    serde_json::from_reader(fd).map_err(EmitError::json(path))
}

/// The Markdown report.
pub fn render_report(mapping: &SessionMapping) -> String {
    let mut out = String::new();
    out.push_str("# MIDI Key Mapping Results\n\n");
    out.push_str("Format: Key (MIDI note): Positions [Sensor order: first → second]\n\n");
    for result in mapping.iter() {
        out.push_str(&report_line(result));
        out.push('\n');
    }
    out
}

fn report_line(result: &KeyResult) -> String {
    let mut line = format!("**{}** (MIDI {}): ", result.name, result.expected_note);
    if result.positions.is_empty() {
        line.push_str("(no mapping)");
        return line;
    }
    let pos: Vec<String> = result.positions.iter().map(|p| p.to_string()).collect();
    let _ = write!(line, "Positions {}", pos.join(", "));
    match result.captured.as_slice() {
        [one] => {
            let _ = write!(line, " [Single sensor: {}]", one.label());
        }
        [first, second, ..] => {
            let _ = write!(
                line,
                " [Sensors: {} (1st) → {} (2nd)]",
                first.label(),
                second.label()
            );
        }
        [] => (),
    }
    line
}

/// The C source for the note maps.
pub fn render_firmware(maps: &[NoteMap]) -> String {
    let mut out = String::new();
    out.push_str("/*\n");
    out.push_str(" * Auto-generated note_map arrays\n");
    out.push_str(" *\n");
    for map in maps {
        let _ = writeln!(out, " * - {}: {}", map.name, map.comment);
    }
    out.push_str(" *\n");
    out.push_str(" * To use:\n");
    out.push_str(" * 1. Review this mapping\n");
    out.push_str(" * 2. Copy the arrays into note_map.h\n");
    out.push_str(" * 3. Comment out #define DEBUG_MAPPING in note_map.h\n");
    out.push_str(" * 4. Rebuild and flash firmware\n");
    out.push_str(" */\n");

    for map in maps {
        out.push('\n');
        render_map(&mut out, map);
    }
    out
}

fn render_map(out: &mut String, map: &NoteMap) {
    let cols = map.cells.first().map_or(0, |r| r.len());

    let _ = writeln!(out, "// {}", map.comment);
    let _ = writeln!(
        out,
        "static const uint8_t {}[NUM_DRIVE_PINS][NUM_READ_PINS] = {{",
        map.name
    );
    let heads: String = (0..cols).map(|c| format!("{:>10}", c)).collect();
    let _ = writeln!(out, "    //           Col:{}", heads);
    if cols == 12 {
        // Columns 0-10 are GPIO 12-22, column 11 is GPIO 26.
        let gpios: String = (12..23).chain(26..27).map(|g| format!("{:>10}", g)).collect();
        let _ = writeln!(out, "    //          GPIO:{}", gpios);
    }

    let last = map.cells.len().saturating_sub(1);
    for (row, cells) in map.cells.iter().enumerate() {
        let values: Vec<String> = cells
            .iter()
            .map(|cell| {
                let token = match cell {
                    Some(note) => firmware_token(*note),
                    None => NOTE_NONE.to_string(),
                };
                format!("{:>9}", token)
            })
            .collect();
        let sep = if row < last { "," } else { "" };
        let _ = writeln!(out, "    /* Row {:2}*/  {{ {} }}{}", row, values.join(", "), sep);
    }
    out.push_str("};\n");
}
