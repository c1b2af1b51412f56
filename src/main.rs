//! Rewards ledger CLI
//!
//! Replays a CSV file of platform operations through the ledger and writes
//! the final account states to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv --config policy.toml --journal journal.csv > accounts.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use rewards_ledger::{BatchProcessor, Config, LedgerError, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::process;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

struct Args {
    input: String,
    config: Option<String>,
    journal: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut input = None;
    let mut config = None;
    let mut journal = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().ok_or(LedgerError::MissingArgument)?),
            "--journal" => journal = Some(args.next().ok_or(LedgerError::MissingArgument)?),
            _ if input.is_none() => input = Some(arg),
            _ => return Err(LedgerError::UnexpectedArgument(arg)),
        }
    }

    Ok(Args {
        input: input.ok_or(LedgerError::MissingArgument)?,
        config,
        journal,
    })
}

fn run() -> Result<()> {
    let args = parse_args(env::args().skip(1))?;

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let file = File::open(&args.input)?;
    let reader = BufReader::new(file);

    let mut processor = BatchProcessor::new(&config);
    processor.process_csv(reader)?;

    if let Some(path) = &args.journal {
        processor.write_journal(BufWriter::new(File::create(path)?))?;
    }

    let stdout = io::stdout();
    let handle = stdout.lock();
    processor.write_accounts(handle)?;

    Ok(())
}
