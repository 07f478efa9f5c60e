//! `PulseDB` operator CLI - inspect and maintain minute-store files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use pulsedb_core::{
    MinuteStore, Precision, SeriesUnit, SlotRecord, StoreOptions, SENTINEL_RAW,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PulseDB - persistent per-minute pulse-counter storage
#[derive(Parser, Debug)]
#[command(name = "pulsedb")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fixed-point precision the store file was created with
    #[arg(long, value_enum, global = true, default_value_t = PrecisionArg::Milli)]
    precision: PrecisionArg,

    /// Treat interpolated slots as overwritable instead of valid
    #[arg(long, global = true)]
    overwrite_allowed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the file header and slot occupancy
    Info {
        /// Store file to inspect
        file: PathBuf,
        /// Emit machine-readable JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Read the slot for one minute
    Get {
        /// Store file to read
        file: PathBuf,
        /// Minute to read, RFC 3339 (seconds are truncated)
        at: String,
    },
    /// List valid slots in a time range
    Dump {
        /// Store file to read
        file: PathBuf,
        /// Start of the range, RFC 3339; defaults to the file start
        #[arg(long)]
        from: Option<String>,
        /// End of the range, RFC 3339; defaults to the file end
        #[arg(long)]
        to: Option<String>,
        /// Maximum number of slots to print
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Emit machine-readable JSON instead of the table
        #[arg(long)]
        json: bool,
    },
    /// Consumption between two timestamps
    Sum {
        /// Store file to query
        file: PathBuf,
        /// Start of the range, RFC 3339
        begin: String,
        /// End of the range, RFC 3339
        end: String,
        /// Unit family the series is reported in
        #[arg(long, value_enum, default_value_t = UnitArg::Volumetric)]
        unit: UnitArg,
    },
    /// Write one reading, filling any gap since the previous one
    Set {
        /// Store file to write (created if missing)
        file: PathBuf,
        /// Minute of the reading, RFC 3339
        at: String,
        /// Cumulative raw pulse count
        raw: u64,
        /// Pulses per unit of the source meter
        #[arg(long, default_value_t = 1.0)]
        pulses_per_unit: f64,
        /// Currency per unit of the source meter
        #[arg(long, default_value_t = 1.0)]
        currency_per_unit: f64,
    },
    /// Reset every slot from a minute onward to the untouched state
    Reinit {
        /// Store file to rewrite
        file: PathBuf,
        /// First minute to clear, RFC 3339
        from: String,
    },
}

/// Mirror of [`Precision`] that clap can parse from the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum PrecisionArg {
    /// One scaled step per whole unit
    Whole,
    /// One scaled step per 0.001 unit
    Milli,
    /// One scaled step per 0.0001 unit
    TenthMilli,
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Whole => Precision::Whole,
            PrecisionArg::Milli => Precision::Milli,
            PrecisionArg::TenthMilli => Precision::TenthMilli,
        }
    }
}

/// Mirror of [`SeriesUnit`] that clap can parse from the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum UnitArg {
    /// Accumulating per-time unit (energy)
    PerTime,
    /// Volumetric unit (gas, water)
    Volumetric,
    /// Raw pulse counts (cannot be summed)
    Raw,
}

impl From<UnitArg> for SeriesUnit {
    fn from(arg: UnitArg) -> Self {
        match arg {
            UnitArg::PerTime => SeriesUnit::PerTime,
            UnitArg::Volumetric => SeriesUnit::Volumetric,
            UnitArg::Raw => SeriesUnit::Raw,
        }
    }
}

/// One slot prepared for display, scaled values already in decimal form.
#[derive(Serialize)]
struct SlotView {
    timestamp: DateTime<Utc>,
    /// `None` when the slot holds an interpolated value.
    raw: Option<u64>,
    energy: f64,
    cost: f64,
    quality: u16,
}

impl SlotView {
    fn new(record: &SlotRecord, precision: Precision) -> Self {
        Self {
            timestamp: record.timestamp,
            raw: (record.raw < SENTINEL_RAW).then_some(record.raw),
            energy: precision.to_decimal(record.energy),
            cost: precision.to_decimal(record.cost),
            quality: record.quality,
        }
    }
}

#[derive(Serialize)]
struct InfoView {
    path: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    file_id: String,
    slots: u64,
    measured: u64,
    interpolated: u64,
    untouched: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let options = StoreOptions {
        precision: args.precision.into(),
        overwrite_allowed: args.overwrite_allowed,
        ..StoreOptions::default()
    };

    match args.command {
        Command::Info { file, json } => cmd_info(&file, options, json),
        Command::Get { file, at } => cmd_get(&file, options, &at),
        Command::Dump {
            file,
            from,
            to,
            limit,
            json,
        } => cmd_dump(&file, options, from.as_deref(), to.as_deref(), limit, json),
        Command::Sum {
            file,
            begin,
            end,
            unit,
        } => cmd_sum(&file, options, &begin, &end, unit.into()),
        Command::Set {
            file,
            at,
            raw,
            pulses_per_unit,
            currency_per_unit,
        } => cmd_set(&file, options, &at, raw, pulses_per_unit, currency_per_unit),
        Command::Reinit { file, from } => cmd_reinit(&file, options, &from),
    }
}

fn cmd_info(file: &Path, options: StoreOptions, json: bool) -> Result<()> {
    let mut store = MinuteStore::open(file, options)?;
    let Some(header) = store.load_header()? else {
        bail!("no store file at {}", file.display());
    };

    let mut measured = 0u64;
    let mut interpolated = 0u64;
    let mut minute = header.start;
    while minute < header.end {
        if let Some(record) = store.get_value(minute)? {
            if record.raw < SENTINEL_RAW {
                measured += 1;
            } else if record.quality > 0 {
                interpolated += 1;
            }
        }
        minute += Duration::minutes(1);
    }
    let slots = header.slot_count();
    let untouched = slots - measured - interpolated;

    if json {
        let view = InfoView {
            path: file.display().to_string(),
            start: header.start,
            end: header.end,
            file_id: header.file_id.to_string(),
            slots,
            measured,
            interpolated,
            untouched,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("File:          {}", file.display());
        println!(
            "Range:         {} .. {}",
            header.start.to_rfc3339(),
            header.end.to_rfc3339()
        );
        println!("File id:       {}", header.file_id);
        println!("Slots:         {slots}");
        println!("Measured:      {measured}");
        println!("Interpolated:  {interpolated}");
        println!("Untouched:     {untouched}");
    }
    Ok(())
}

fn cmd_get(file: &Path, options: StoreOptions, at: &str) -> Result<()> {
    let at = parse_ts(at)?;
    let mut store = MinuteStore::open(file, options)?;
    match store.get_value(at)? {
        Some(record) if !record.is_untouched() => {
            print_slot_table(&[SlotView::new(&record, options.precision)]);
        }
        _ => println!("no value stored at {}", at.to_rfc3339()),
    }
    Ok(())
}

fn cmd_dump(
    file: &Path,
    options: StoreOptions,
    from: Option<&str>,
    to: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let from = from.map(parse_ts).transpose()?;
    let to = to.map(parse_ts).transpose()?;

    let mut store = MinuteStore::open(file, options)?;
    let Some(header) = store.load_header()? else {
        bail!("no store file at {}", file.display());
    };
    let lo = from.unwrap_or(header.start).max(header.start);
    let hi = to.unwrap_or(header.end).min(header.end);

    let mut rows = Vec::new();
    let mut minute = lo;
    while minute < hi && rows.len() < limit {
        if let Some(record) = store.get_value(minute)? {
            if record.is_valid(options.overwrite_allowed) {
                rows.push(SlotView::new(&record, options.precision));
            }
        }
        minute += Duration::minutes(1);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_slot_table(&rows);
    }
    Ok(())
}

fn cmd_sum(
    file: &Path,
    options: StoreOptions,
    begin: &str,
    end: &str,
    unit: SeriesUnit,
) -> Result<()> {
    let begin = parse_ts(begin)?;
    let end = parse_ts(end)?;
    let mut store = MinuteStore::open(file, options)?;
    let total = store.sum(begin, end, unit)?;
    println!("{total}");
    Ok(())
}

fn cmd_set(
    file: &Path,
    options: StoreOptions,
    at: &str,
    raw: u64,
    pulses_per_unit: f64,
    currency_per_unit: f64,
) -> Result<()> {
    let at = parse_ts(at)?;
    let mut store = MinuteStore::open(file, options)?;
    let written = store.set_value(at, raw, pulses_per_unit, currency_per_unit, None)?;
    store.close()?;
    match written {
        Some(record) => {
            println!(
                "stored {raw} at {} (energy {}, cost {})",
                record.timestamp.to_rfc3339(),
                options.precision.to_decimal(record.energy),
                options.precision.to_decimal(record.cost),
            );
            Ok(())
        }
        None => bail!(
            "reading was not stored: {} is outside the writable window or not \
             after the newest stored reading",
            at.to_rfc3339()
        ),
    }
}

fn cmd_reinit(file: &Path, options: StoreOptions, from: &str) -> Result<()> {
    let from = parse_ts(from)?;
    let mut store = MinuteStore::open(file, options)?;
    store.reinitialize_slots(from)?;
    store.close()?;
    println!("slots from {} onward reset to untouched", from.to_rfc3339());
    Ok(())
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid RFC 3339 timestamp '{s}'"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn print_slot_table(rows: &[SlotView]) {
    println!(
        "{:<25} {:>14} {:>16} {:>16} {:>8}",
        "TIMESTAMP", "RAW", "ENERGY", "COST", "QUALITY"
    );
    for row in rows {
        let raw = row.raw.map_or_else(|| "-".to_string(), |r| r.to_string());
        println!(
            "{:<25} {raw:>14} {:>16.4} {:>16.4} {:>8}",
            row.timestamp.to_rfc3339(),
            row.energy,
            row.cost,
            row.quality
        );
    }
}
