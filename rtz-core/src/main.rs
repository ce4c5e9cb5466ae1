use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rtz_core::model::block::BlockId;
use rtz_core::model::entry::EntryStatus;
use rtz_core::model::project::{BlockTable, ContainerProfile, ScanRegion, SegmentStream};
use rtz_core::model::token::Charset;
use rtz_core::protocol;
use rtz_core::services::pipeline::CancelToken;
use rtz_core::services::{project, workflow};
use rtz_core::{Error, Result};

const EXIT_FATAL: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "rtz-core", version, about = "Text codec and injection engine for RTZ game text")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Register the container's blocks in the ledger
    Scan {
        container: PathBuf,
        #[command(flatten)]
        opts: ProfileArgs,
    },

    /// Write completed translations into a patched copy of the container
    Inject {
        container: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
        /// Move rejected completed entries to needs_review
        #[arg(long)]
        flag_review: bool,
        #[command(flatten)]
        opts: ProfileArgs,
    },

    /// Compare a patched container against the ledger
    Verify {
        patched: PathBuf,
        #[command(flatten)]
        opts: ProfileArgs,
    },

    /// Set the target text and status of one entry
    Assign {
        #[arg(long, value_parser = parse_block_id)]
        id: BlockId,
        #[arg(long)]
        target: String,
        #[arg(long, value_parser = parse_status, default_value = "in_progress")]
        status: EntryStatus,
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        opts: ProfileArgs,
    },

    /// Lint the ledger
    Qa {
        #[command(flatten)]
        opts: ProfileArgs,
    },

    /// Copy completed targets onto untranslated duplicates
    Propagate {
        #[command(flatten)]
        opts: ProfileArgs,
    },

    /// Guess the charset of a file region
    Detect {
        path: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        len: Option<usize>,
    },

    /// Serve the JSON-lines protocol on stdin/stdout
    Serve,
}

/// Profile selection; flags override fields read from `project.json`.
#[derive(Debug, Args)]
struct ProfileArgs {
    /// Project directory holding project.json
    #[arg(long)]
    project: Option<PathBuf>,
    /// Ledger file; defaults to the project's ledger.json
    #[arg(long)]
    ledger: Option<PathBuf>,
    #[arg(long, value_parser = parse_charset)]
    source_charset: Option<Charset>,
    #[arg(long, value_parser = parse_charset)]
    target_charset: Option<Charset>,
    #[arg(long, value_parser = parse_number::<u8>)]
    pad_byte: Option<u8>,
    /// Fill character encoded per charset; ' ' pads UTF-16LE with 20 00
    #[arg(long)]
    pad_char: Option<char>,
    #[arg(long)]
    allow_truncation: bool,
    #[arg(long, value_parser = parse_number::<usize>)]
    table_offset: Option<usize>,
    #[arg(long, value_parser = parse_number::<u32>, requires = "table_offset")]
    table_count: Option<u32>,
    #[arg(long, value_parser = parse_number::<usize>, conflicts_with = "table_offset")]
    scan_start: Option<usize>,
    #[arg(long, value_parser = parse_number::<usize>, conflicts_with = "table_offset")]
    scan_end: Option<usize>,
    /// Start of a length-prefixed segment stream
    #[arg(long, value_parser = parse_number::<usize>, conflicts_with_all = ["table_offset", "scan_start", "scan_end"])]
    segments_start: Option<usize>,
    /// Process blocks on one thread
    #[arg(long)]
    sequential: bool,
}

impl ProfileArgs {
    fn resolve(&self) -> Result<(ContainerProfile, PathBuf)> {
        let mut profile = match &self.project {
            Some(dir) => project::open_project(dir)?,
            None => ContainerProfile::default(),
        };

        if let Some(c) = self.source_charset {
            profile.source_charset = c;
        }
        if let Some(c) = self.target_charset {
            profile.target_charset = c;
        }
        if let Some(b) = self.pad_byte {
            profile.pad_byte = b;
        }
        if self.pad_char.is_some() {
            profile.pad_char = self.pad_char;
        }
        if let Some(offset) = self.table_offset {
            profile.table = Some(BlockTable {
                offset,
                count: self.table_count,
            });
            profile.scan_region = None;
            profile.segments = None;
        }
        if self.scan_start.is_some() || self.scan_end.is_some() {
            profile.table = None;
            profile.segments = None;
            profile.scan_region = Some(ScanRegion {
                start: self.scan_start.unwrap_or(0),
                end: self.scan_end,
            });
        }
        if let Some(start) = self.segments_start {
            profile.table = None;
            profile.scan_region = None;
            profile.segments = Some(SegmentStream { start });
        }
        profile.allow_truncation |= self.allow_truncation;
        profile.parallel &= !self.sequential;
        profile.validate().map_err(Error::Config)?;

        let ledger = self
            .ledger
            .clone()
            .unwrap_or_else(|| project::ledger_path(&profile));
        Ok((profile, ledger))
    }
}

fn parse_charset(s: &str) -> std::result::Result<Charset, String> {
    Charset::from_label(s).ok_or_else(|| format!("unknown charset {s:?}"))
}

fn parse_status(s: &str) -> std::result::Result<EntryStatus, String> {
    EntryStatus::parse(s).ok_or_else(|| format!("unknown status {s:?}"))
}

fn parse_block_id(s: &str) -> std::result::Result<BlockId, String> {
    s.parse()
}

/// Decimal or `0x`-prefixed hex.
fn parse_number<T>(s: &str) -> std::result::Result<T, String>
where
    T: TryFrom<u64>,
{
    let t = s.trim();
    let value = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => t.parse::<u64>(),
    }
    .map_err(|e| format!("{s:?}: {e}"))?;
    T::try_from(value).map_err(|_| format!("{s:?} is out of range"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn serve() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        let result = std::panic::catch_unwind(|| protocol::handle(&line));

        let response = match result {
            Ok(resp) => resp,
            Err(_) => serde_json::json!({
                "status": "error",
                "message": "internal core error"
            })
            .to_string(),
        };

        if writeln!(stdout, "{response}").is_err() {
            break;
        }

        let _ = stdout.flush();
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Cmd::Scan { container, opts } => {
            let (profile, ledger) = opts.resolve()?;
            print_json(&workflow::scan_file(&container, &ledger, &profile)?)?;
            Ok(0)
        }
        Cmd::Inject {
            container,
            output,
            flag_review,
            opts,
        } => {
            let (profile, ledger) = opts.resolve()?;
            let summary = workflow::inject_file(
                &container,
                &ledger,
                &output,
                &profile,
                flag_review,
                &CancelToken::new(),
            )?;
            print_json(&summary)?;
            Ok(summary.exit_code() as u8)
        }
        Cmd::Verify { patched, opts } => {
            let (profile, ledger) = opts.resolve()?;
            let discrepancies = workflow::verify_file(&patched, &ledger, &profile)?;
            print_json(&discrepancies)?;
            Ok(if discrepancies.is_empty() { 0 } else { 2 })
        }
        Cmd::Assign {
            id,
            target,
            status,
            notes,
            opts,
        } => {
            let (profile, ledger) = opts.resolve()?;
            let entry = workflow::assign_entry(&ledger, &profile, id, &target, status, notes.as_deref())?;
            print_json(&entry)?;
            Ok(0)
        }
        Cmd::Qa { opts } => {
            let (profile, ledger) = opts.resolve()?;
            print_json(&workflow::qa_file(&ledger, &profile)?)?;
            Ok(0)
        }
        Cmd::Propagate { opts } => {
            let (profile, ledger) = opts.resolve()?;
            let applied = workflow::propagate_file(&ledger, &profile)?;
            print_json(&serde_json::json!({ "applied": applied }))?;
            Ok(0)
        }
        Cmd::Detect { path, offset, len } => {
            print_json(&workflow::detect_file(&path, offset, len)?)?;
            Ok(0)
        }
        Cmd::Serve => {
            serve();
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    // stdout carries reports and protocol replies
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rtz_core=info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
