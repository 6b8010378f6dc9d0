//! Keyboard matrix mapping tool.
//!
//! Run against a keyboard flashed with the debug note mapping.  The tool asks for each key of the
//! instrument in turn, listens for the notes the firmware sends, and works out which matrix
//! positions belong to which key.  Results are written as JSON, a Markdown report, and a C note
//! map for the firmware.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};

use keymapper::{
    capture::{DEFAULT_POLL_MS, DEFAULT_SETTLE_MS, DEFAULT_TIMEOUT_MS},
    note::{self, FIRST_NOTE, LAST_NOTE},
    operator::wait_line,
    table::{DEFAULT_COLS, DEFAULT_ROWS},
    AddressMode, CaptureMode, Emitter, ExpectedKey, Inputs, Interrupt, LookupTable, OperatorInput,
    SensorLayout, Session, State, SystemTimer, Timable,
};

mod midi;
mod terminal;

use midi::MidiPort;
use terminal::Terminal;

/// Which firmware the keyboard is running.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Profile {
    /// Two sensors per key, positions past 127 on channel 1, confirm each key with Enter.
    Dual,
    /// One sensor per key, positions wrap at 128, keys are taken after a timeout.
    Timed,
}

impl Profile {
    fn defaults(self) -> (AddressMode, CaptureMode, SensorLayout) {
        match self {
            Profile::Dual => (AddressMode::Channel, CaptureMode::Confirm, SensorLayout::Dual),
            Profile::Timed => (AddressMode::Wrap, CaptureMode::timeout(), SensorLayout::Single),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "keymapper")]
#[command(about = "Map the keys of a MIDI instrument to key matrix positions", long_about = None)]
struct Cli {
    /// Firmware variant; sets the defaults for addressing, mode and layout.
    #[arg(long, value_enum, default_value = "dual")]
    profile: Profile,

    /// How notes are turned into positions: "channel" or "wrap".
    #[arg(long)]
    addressing: Option<AddressMode>,

    /// How a key is finished: "confirm" or "timeout".
    #[arg(long)]
    mode: Option<CaptureMode>,

    /// Firmware arrays to generate: "dual" or "single".
    #[arg(long)]
    layout: Option<SensorLayout>,

    /// Timeout mode: give up on a key after this long with no notes.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Timeout mode: finish a key this long after its last new note.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_SETTLE_MS)]
    settle_ms: u64,

    /// Interval between polls of the port and the terminal.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_POLL_MS)]
    poll_ms: u64,

    /// Matrix rows, for the built in table.
    #[arg(long, default_value_t = DEFAULT_ROWS)]
    rows: usize,

    /// Matrix columns, for the built in table.
    #[arg(long, default_value_t = DEFAULT_COLS)]
    cols: usize,

    /// Lookup table to use instead of the built in debug mapping (JSON array of rows).
    #[arg(long, value_name = "FILE")]
    table: Option<PathBuf>,

    /// Refuse to run with a table that holds the same code twice.
    #[arg(long)]
    strict_table: bool,

    /// First note to calibrate.
    #[arg(long, default_value_t = FIRST_NOTE, value_parser = clap::value_parser!(u8).range(0..128))]
    first_note: u8,

    /// Last note to calibrate.
    #[arg(long, default_value_t = LAST_NOTE, value_parser = clap::value_parser!(u8).range(0..128))]
    last_note: u8,

    /// Directory for the JSON and Markdown results.
    #[arg(short, long, value_name = "DIR", default_value = "test_results")]
    output_dir: PathBuf,

    /// Where to write the generated C note map.
    #[arg(long, value_name = "FILE", default_value = "generated_note_map.c")]
    c_file: PathBuf,

    /// List the MIDI input ports and exit.
    #[arg(long)]
    list_ports: bool,
}

/// Settings for a run, resolved from the command line.
#[derive(Debug)]
struct Config {
    address: AddressMode,
    mode: CaptureMode,
    layout: SensorLayout,
    poll_ms: u64,
    table: LookupTable,
    keys: Vec<ExpectedKey>,
    output_dir: PathBuf,
    c_file: PathBuf,
}

impl Config {
    fn from_cli(cli: &Cli) -> Result<Config> {
        let (address, mode, layout) = cli.profile.defaults();
        let address = cli.addressing.unwrap_or(address);
        let layout = cli.layout.unwrap_or(layout);
        let mode = match cli.mode.unwrap_or(mode) {
            CaptureMode::Confirm => CaptureMode::Confirm,
            CaptureMode::Timeout { .. } => CaptureMode::Timeout {
                timeout_ms: cli.timeout_ms,
                settle_ms: cli.settle_ms,
            },
        };

        if cli.first_note > cli.last_note {
            bail!(
                "First note {} is above last note {}",
                cli.first_note,
                cli.last_note
            );
        }

        let table = match &cli.table {
            Some(path) => LookupTable::load(path)
                .map_err(|e| anyhow!("Unable to load table {}: {}", path.display(), e))?,
            None => LookupTable::for_mode(address, cli.rows, cli.cols),
        };
        for dup in table.validate() {
            warn!(
                "Table code {} at {} repeats {}; the first one wins",
                dup.code, dup.second, dup.first
            );
        }
        if cli.strict_table {
            table.check_injective()?;
        }

        Ok(Config {
            address,
            mode,
            layout,
            poll_ms: cli.poll_ms,
            table,
            keys: note::key_sequence(cli.first_note, cli.last_note),
            output_dir: cli.output_dir.clone(),
            c_file: cli.c_file.clone(),
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.list_ports {
        for (i, name) in midi::port_names()?.iter().enumerate() {
            println!("  {}: {}", i, name);
        }
        return Ok(());
    }

    println!("{}", "=".repeat(60));
    println!("MIDI Key Mapping Tool");
    println!(
        "build {} {}",
        option_env!("GIT_COMMIT").unwrap_or("unknown"),
        option_env!("BUILD_TIMESTAMP").unwrap_or("")
    );
    println!("{}", "=".repeat(60));

    let config = Config::from_cli(&cli)?;
    info!(
        "Using {:?} addressing, {:?} capture, {:?} layout",
        config.address, config.mode, config.layout
    );

    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || {
        handler.trigger();
    })?;

    let names = midi::port_names()?;
    if names.is_empty() {
        println!("Make sure your MIDI keyboard is connected.");
        bail!("No MIDI input ports found");
    }

    let mut terminal = Terminal::new();
    let mut timer = SystemTimer::new();
    let name = match select_port(&names, &mut terminal, &mut timer, &interrupt, config.poll_ms) {
        Some(name) => name,
        None => {
            println!("\nExiting...");
            return Ok(());
        }
    };
    println!("Opening port: {}", name);
    let port = MidiPort::open(&name)?;

    let session = Session::new(config.keys.clone(), &config.table, config.address, config.mode);
    session.show_instructions();

    let mut io = Inputs::new(port, terminal, timer, interrupt.clone());
    io.poll_ms = config.poll_ms;
    let finished = session.run(&mut io);

    if interrupt.is_set() {
        println!("\n\nInterrupted by user. Saving partial results...");
    }

    if finished.mapping.is_empty() {
        println!("\nNo mapping data collected.");
        return Ok(());
    }

    let emitter = Emitter {
        out_dir: config.output_dir.clone(),
        c_file: config.c_file.clone(),
        layout: config.layout,
        table: &config.table,
        address: config.address,
    };
    let artifacts = emitter.emit(finished.mapping)?;

    if finished.state == State::Completed {
        println!("\n{}", "=".repeat(60));
        println!("MAPPING COMPLETE!");
        println!("{}", "=".repeat(60));
        println!("\nNext steps:");
        println!("1. Review {}", artifacts.firmware.display());
        println!("2. Copy the arrays into note_map.h");
        println!("3. Comment out #define DEBUG_MAPPING in note_map.h");
        println!("4. Rebuild and flash firmware");
    }

    Ok(())
}

/// Ask the operator which port to use.  Returns None if interrupted.
fn select_port<I, T>(
    names: &[String],
    input: &mut I,
    timer: &mut T,
    interrupt: &Interrupt,
    poll_ms: u64,
) -> Option<String>
where
    I: OperatorInput,
    T: Timable,
{
    println!("\nAvailable MIDI input ports:");
    for (i, name) in names.iter().enumerate() {
        println!("  {}: {}", i, name);
    }

    loop {
        println!("\nSelect port (0-{}):", names.len() - 1);
        let line = wait_line(input, timer, interrupt, poll_ms)?;
        match line.trim().parse::<usize>() {
            Ok(choice) if choice < names.len() => return Some(names[choice].clone()),
            _ => println!(
                "Invalid choice. Enter a number between 0 and {}",
                names.len() - 1
            ),
        }
    }
}
