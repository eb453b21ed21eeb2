use anyhow::{Context, Result};
use clap::Parser;
use dtf::book::Book;
use dtf::DtfReader;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Replay a DTF capture and reconstruct the level-2 book")]
struct Args {
    /// Input DTF file
    #[arg(long, short = 'i', env = "DTF_FILE")]
    input: PathBuf,

    /// Dump top-of-book after each quote
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Number of levels to print when dumping
    #[arg(long, default_value_t = 5)]
    top: usize,

    /// Print trades as they are read
    #[arg(long, default_value_t = false)]
    print_trades: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let reader = DtfReader::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
    info!(symbol = %reader.header().symbol, declared = reader.header().record_count, "replaying");
    let mut book = Book::default();
    let mut events = 0usize;
    for ev in reader {
        let ev = ev.with_context(|| format!("decode {:?}", args.input))?;
        events += 1;
        book.apply(&ev);
        if ev.is_trade {
            if args.print_trades {
                println!(
                    "TRADE seq={} ts={:.3} side={} price={} size={}",
                    ev.sequence,
                    ev.timestamp,
                    if ev.is_bid { "bid" } else { "ask" },
                    ev.price,
                    ev.size
                );
            }
            continue;
        }
        if args.dump {
            let (tb, ta) = book.top(args.top);
            println!("seq={} ts={:.3} | top{} bids / asks:", ev.sequence, ev.timestamp, args.top);
            for i in 0..args.top.max(tb.len()).max(ta.len()) {
                let b = tb.get(i).map(|l| format!("{:>3}: {:>12.4} x {:>10}", i, l.price, l.size)).unwrap_or_else(|| format!("{:>3}: -", i));
                let a = ta.get(i).map(|l| format!("{:>12.4} x {:>10}", l.price, l.size)).unwrap_or_else(|| "-".to_string());
                println!("{} | {}", b, a);
            }
            println!("---");
        }
    }
    info!(events, trades = book.trades, bids = book.bids.len(), asks = book.asks.len(), spread = ?book.spread(), "replay finished");
    Ok(())
}
