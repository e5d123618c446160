use std::collections::HashSet;
use std::io::{self, Write};
use std::process;

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use oid::{Config, Encoding, Kind, parse_oid};
use serde_json::json;

/// A simple utility for generating un/ordered IDs.
///
/// By default, an ID is the base 32 (Crockford) encoding of an 8 byte
/// nanosecond precision unix timestamp followed by 8 random bytes. The
/// timestamp prefix allows these IDs to be ordered.
#[derive(Debug, Parser)]
#[command(name = "oid", version)]
struct Cli {
    #[command(flatten)]
    emit: EmitOpts,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Args)]
struct EmitOpts {
    /// Bytes of randomness. UIDs use double this value, OIDs add 8 bytes of timestamp.
    #[arg(short = 'l', long = "len", default_value_t = 8, allow_negative_numbers = true)]
    len: i64,

    /// Use a cryptographically secure randomness generator.
    #[arg(long)]
    secure: bool,

    /// Use a hex (a-f0-9) dictionary instead of base32 (Crockford).
    #[arg(long)]
    hex: bool,

    /// Generate an unordered ID (UID) instead of an ordered ID (OID).
    #[arg(long, visible_alias = "uid", conflicts_with = "short")]
    unordered: bool,

    /// Generate a short unordered ID (SID) of only `len` bytes.
    #[arg(long)]
    short: bool,

    /// How many IDs to emit.
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Emit a JSON array instead of one ID per line.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode an ordered ID into its timestamp and entropy.
    Inspect(InspectOpts),
    /// Generate a burst of IDs and check ordering and uniqueness.
    Selftest,
}

#[derive(Debug, Args)]
struct InspectOpts {
    id: String,

    /// Bytes of randomness the ID was generated with.
    #[arg(short = 'l', long = "len", default_value_t = 8)]
    len: usize,

    /// The ID is hex encoded.
    #[arg(long)]
    hex: bool,

    #[arg(long)]
    json: bool,
}

impl EmitOpts {
    fn config(&self) -> Config {
        let kind = if self.short {
            Kind::Short
        } else if self.unordered {
            Kind::Unordered
        } else {
            Kind::Ordered
        };

        Config {
            length: self.len,
            secure: self.secure,
            hex: self.hex,
            kind,
            count: self.count,
        }
    }
}

fn run_emit(opts: &EmitOpts) -> Result<(), String> {
    let config = opts.config();
    let generator = config.generator();

    if opts.json {
        let ids = generator
            .next_n(config.kind, config.count)
            .map_err(|e| e.to_string())?;
        println!("{}", serde_json::to_string(&ids).map_err(|e| e.to_string())?);
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for _ in 0..config.count {
        let id = generator
            .generate(config.kind)
            .map_err(|e| e.to_string())?;
        writeln!(out, "{id}").map_err(|e| e.to_string())?;
    }
    out.flush().map_err(|e| e.to_string())
}

fn run_inspect(opts: &InspectOpts) -> Result<(), String> {
    let encoding = if opts.hex {
        Encoding::Hex
    } else {
        Encoding::Crockford32
    };
    let parsed = parse_oid(&opts.id, encoding, opts.len).map_err(|e| e.to_string())?;

    if opts.json {
        println!(
            "{}",
            serde_json::to_string(&parsed).map_err(|e| e.to_string())?
        );
    } else {
        println!("raw={}", parsed.raw);
        println!("timestamp={}", parsed.timestamp.to_rfc3339());
        println!("timestamp_nanos={}", parsed.timestamp_nanos);
        println!("entropy={}", hex::encode(&parsed.entropy));
    }

    Ok(())
}

fn run_selftest() -> Result<(), String> {
    let config = Config {
        count: 1000,
        ..Config::default()
    };
    let ids = config.emit().map_err(|e| e.to_string())?;

    let ordered = ids.windows(2).all(|w| w[0] < w[1]);
    let unique = ids.iter().collect::<HashSet<_>>().len() == ids.len();

    println!(
        "{}",
        json!({
            "ok": ordered && unique,
            "count": ids.len(),
            "ordered": ordered,
            "unique": unique,
            "encoding": config.encoding().as_str(),
            "kind": config.kind.as_str(),
        })
    );

    if ordered && unique {
        Ok(())
    } else {
        Err("selftest failed".to_string())
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let res = match &cli.command {
        Some(Command::Inspect(opts)) => run_inspect(opts),
        Some(Command::Selftest) => run_selftest(),
        None => run_emit(&cli.emit),
    };

    if let Err(err) = res {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}
