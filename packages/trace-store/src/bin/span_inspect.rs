//! span-inspect - encode a JSON span and report its storage footprint
//!
//! Usage:
//!   span-inspect span.json [--config /path/to/config/dir] [--seed 7]
//!
//! Prints the encoded column size, the strategy chosen for every call event,
//! the unsalted and salted row keys, and the salt prefixes a reader scans.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use trace_store::span::StrategySlot;
use trace_store::{SpanCodec, SpanRecord, SpanWriter, TracePut, TraceStoreConfig};

#[derive(Parser)]
#[command(name = "span-inspect")]
#[command(about = "Inspect the encoded form of a trace span")]
struct Cli {
    /// JSON file holding one span
    span: PathBuf,

    /// Directory containing trace_store.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the secondary salt draw
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(dir) => TraceStoreConfig::read_from(dir)
            .with_context(|| format!("reading config from {}", dir.display()))?
            .unwrap_or_else(|| {
                tracing::warn!("no config in {}, using defaults", dir.display());
                TraceStoreConfig::default()
            }),
        None => TraceStoreConfig::default(),
    };

    let json = std::fs::read_to_string(&cli.span)
        .with_context(|| format!("reading {}", cli.span.display()))?;
    let span: SpanRecord = serde_json::from_str(&json).context("parsing span JSON")?;

    let encoded = SpanCodec::encode(&span)?;
    let decoded = SpanCodec::decode_detailed(&encoded)?;
    anyhow::ensure!(decoded.record == span, "decoded span differs from input");

    println!("span {} ({} events)", span.span_id, span.events.len());
    println!("  encoded: {} bytes", encoded.len());
    for (event, bits) in span.events.iter().zip(&decoded.bit_fields) {
        let strategies: Vec<String> = StrategySlot::ALL
            .iter()
            .map(|&slot| format!("{}={}", slot.name(), bits.strategy(slot)))
            .collect();
        println!(
            "  #{:<5} flags={:#06x} {}",
            event.sequence,
            bits.raw(),
            strategies.join(" ")
        );
    }

    let writer = SpanWriter::from_config(&config)?;
    let row_key = writer.row_key(&span)?;
    let put = match cli.seed {
        Some(seed) => writer.build_put_with(&span, &mut StdRng::seed_from_u64(seed))?,
        None => writer.build_put(&span)?,
    };
    let distributor = writer.distributor();

    for line in key_lines(&row_key, &put) {
        println!("  {}", line);
    }
    println!(
        "  bucket {} of {}, scan prefixes {:?}",
        distributor.bucket_of(&row_key),
        distributor.max_buckets(),
        distributor.all_possible_prefixes(&row_key)
    );
    Ok(())
}

fn key_lines(row_key: &[u8], put: &TracePut) -> Vec<String> {
    vec![
        format!("row key:    {}", hex::encode(row_key)),
        format!("salted key: {}", hex::encode(&put.row_key)),
        format!("qualifier:  {}", hex::encode(&put.qualifier)),
        format!("cell time:  {}", put.timestamp),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lines_are_lowercase_hex() {
        let put = TracePut {
            row_key: vec![0x0A, 0xFF, 0x00],
            qualifier: 1i64.to_be_bytes().to_vec(),
            timestamp: 1_700_000_000_050,
            value: Vec::new(),
        };
        let lines = key_lines(&[0xFF, 0x00], &put);
        assert_eq!(lines[0], "row key:    ff00");
        assert_eq!(lines[1], "salted key: 0aff00");
        assert_eq!(lines[2], "qualifier:  0000000000000001");
        assert_eq!(lines[3], "cell time:  1700000000050");
    }
}
