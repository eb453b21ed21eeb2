use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use dtf::{decode_file, DtfReader, Event, EventTable, FileHeader};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use time::macros::format_description;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Decode a DTF order-book capture and print its events")]
struct Args {
    /// DTF file to read
    #[arg(long, short = 'i', env = "DTF_FILE")]
    input: PathBuf,

    /// Sort by timestamp before printing (ties keep file order)
    #[arg(long, default_value_t = false)]
    sort: bool,

    /// Stop after this many events
    #[arg(long)]
    limit: Option<usize>,

    /// Only print trades
    #[arg(long, default_value_t = false)]
    trades_only: bool,

    /// One JSON object per line instead of text columns
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Decode while reading instead of loading the whole file (ignored with --sort)
    #[arg(long, default_value_t = false)]
    stream: bool,
}

fn print_header(h: &FileHeader) {
    info!(
        symbol = %h.symbol,
        declared_records = h.record_count,
        max_ts = h.max_timestamp,
        ref_ts = h.initial_ref_timestamp,
        ref_seq = h.initial_ref_seq,
        "DTF header"
    );
}

fn write_event<W: Write>(w: &mut W, ev: &Event, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *w, ev)?;
        writeln!(w)?;
        return Ok(());
    }
    let when = ev
        .datetime()
        .ok()
        .and_then(|dt| dt.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]")).ok())
        .unwrap_or_else(|| format!("{:.3}", ev.timestamp));
    let kind = if ev.is_trade { "TRADE" } else { "QUOTE" };
    let side = if ev.is_bid { "bid" } else { "ask" };
    writeln!(w, "{} seq={} {} {} price={} size={}", when, ev.sequence, kind, side, ev.price, ev.size)?;
    Ok(())
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let limit = args.limit.unwrap_or(usize::MAX);
    let keep = |ev: &Event| !args.trades_only || ev.is_trade;
    let mut printed = 0usize;

    if args.stream && !args.sort {
        let reader = DtfReader::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
        print_header(reader.header());
        for ev in reader {
            let ev = ev.with_context(|| format!("decode {:?}", args.input))?;
            if printed >= limit { break; }
            if keep(&ev) {
                write_event(&mut out, &ev, args.json)?;
                printed += 1;
            }
        }
    } else {
        let (header, events) = decode_file(&args.input).with_context(|| format!("decode {:?}", args.input))?;
        print_header(&header);
        let events = if args.sort { EventTable::from_events(events).into_vec() } else { events };
        for ev in events.iter().filter(|&ev| keep(ev)).take(limit) {
            write_event(&mut out, ev, args.json)?;
            printed += 1;
        }
    }
    out.flush()?;
    info!(printed, "done");
    Ok(())
}
