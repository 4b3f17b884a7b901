//! Universal machine runner.
//!
//! Loads a program image and drives it against stdin/stdout.
//!
//! # Usage
//! ```text
//! um <program> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: Program image file (32-bit big-endian words)
//!
//! # Options
//! - `-i, --input <file>`: Replay the file's bytes as input before falling
//!   through to stdin
//! - `--echo-input`: Echo consumed input bytes into the output
//! - `-l, --limit <n>`: Stop after `n` executed instructions

use std::env;
use std::fs::File;
use std::io;
use std::process;
use um::byteio::{drive, ByteSink, ByteSource, ChainSource, StreamSink, StreamSource, TeeSource};
use um::machine::program::Program;
use um::machine::vm::{State, UniversalMachine};
use um::{error, info};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let program_path = &args[1];
    let mut input_path: Option<String> = None;
    let mut echo_input = false;
    let mut limit: Option<u64> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--input" | "-i") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                input_path = Some(args[i].clone());
                i += 1;
            }
            "--echo-input" => {
                echo_input = true;
                i += 1;
            }
            k @ ("--limit" | "-l") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                limit = Some(args[i].parse::<u64>().unwrap_or_else(|_| {
                    error!("invalid instruction limit: '{}'", args[i]);
                    process::exit(1);
                }));
                i += 1;
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let program = match Program::from_file(program_path) {
        Ok(program) => program,
        Err(err) => {
            error!("failed to load {program_path}: {err}");
            process::exit(1);
        }
    };
    info!("loaded {} words from {}", program.len(), program_path);

    let mut machine = UniversalMachine::new(program);

    let mut source: Box<dyn ByteSource> = Box::new(StreamSource::new(io::stdin()));
    if let Some(path) = input_path {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                error!("failed to open {path}: {err}");
                process::exit(1);
            }
        };
        source = Box::new(ChainSource::new(vec![
            Box::new(StreamSource::new(file)),
            source,
        ]));
    }
    if echo_input {
        source = Box::new(TeeSource::new(
            source,
            vec![Box::new(StreamSink::new(io::stdout()))],
        ));
    }
    let mut sink = StreamSink::new(io::stdout());

    let driven = match limit {
        Some(limit) => drive_limited(&mut machine, source.as_mut(), &mut sink, limit),
        None => drive(&mut machine, source.as_mut(), &mut sink),
    };
    if let Err(err) = driven {
        error!("io failure while driving the machine: {err}");
        process::exit(1);
    }

    match machine.state() {
        State::Halted => {}
        State::Failed(reason) => {
            error!(
                "machine failed after {} instructions: {reason}",
                machine.step_count()
            );
            process::exit(1);
        }
        State::Waiting => {
            info!("input exhausted after {} instructions", machine.step_count());
        }
        State::Idle => {
            info!(
                "instruction limit reached after {} instructions",
                machine.step_count()
            );
        }
    }
}

/// [`drive`] with a cap on the total number of executed instructions.
fn drive_limited(
    machine: &mut UniversalMachine,
    source: &mut dyn ByteSource,
    sink: &mut dyn ByteSink,
    limit: u64,
) -> io::Result<()> {
    loop {
        match machine.state() {
            State::Idle => {
                if machine.step_count() >= limit {
                    return Ok(());
                }
                for byte in machine.run_for(limit - machine.step_count()) {
                    sink.put_byte(byte)?;
                }
            }
            State::Waiting => match source.next_byte()? {
                Some(byte) => machine.supply_input(Some(byte)),
                None => return Ok(()),
            },
            State::Halted | State::Failed(_) => return Ok(()),
        }
    }
}

const USAGE: &str = "\
Universal Machine

USAGE:
    {program} <program> [OPTIONS]

ARGS:
    <program>    Program image file (32-bit big-endian words)

OPTIONS:
    -i, --input <file>    Replay the file's bytes as input before stdin
    --echo-input          Echo consumed input bytes into the output
    -l, --limit <n>       Stop after n executed instructions
    -h, --help            Print this help message

EXAMPLES:
    # Interactive session
    {program} umix.umz

    # Replay a recorded session, then hand over to the keyboard
    {program} umix.umz --input logs/session.in

    # Cap runaway programs
    {program} sandmark.umz --limit 100000000
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
