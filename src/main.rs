use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use midi2turtle::convert::convert_file;
use midi2turtle::corpus::{default_csv_path, CorpusConfig};
use midi2turtle::quantize::CompressionPolicy;

#[derive(Parser, Debug)]
#[command(name = "midi2turtle", about = "Convert MIDI files to turtle cell grids (CSV)")]
struct Opt {
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Convert a single MIDI file
    Convert {
        /// Path to the MIDI file
        midi: PathBuf,
        /// Timing compression
        #[arg(short, long, value_enum, default_value = "min-diff")]
        method: CompressionPolicy,
        /// Output CSV path (default: `<corpus>/csv/<code>/` when the input is under a `midi/`
        /// directory, else next to the input with a .csv extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert every file of one or more corpora
    Corpus {
        /// Corpus configuration file
        #[arg(short, long, default_value = "corpora.toml")]
        config: PathBuf,
        /// Corpora to convert (default: all configured)
        #[arg(long = "corpus")]
        names: Vec<String>,
        /// Timing compressions to run (default: the corpus's `methods`, else all three)
        #[arg(short, long, value_enum)]
        method: Vec<CompressionPolicy>,
    },
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    init_logging(opt.quiet);

    match opt.cmd {
        Cmd::Convert { midi, method, output } => {
            let output = output.unwrap_or_else(|| default_csv_path(&midi, method));
            let summary = convert_file(&midi, &output, method)?;
            println!(
                "{}: {} streams, {} steps",
                summary.csv_path.display(),
                summary.stream_count,
                summary.max_end + 1
            );
        }
        Cmd::Corpus { config, names, method } => {
            let cfg = CorpusConfig::load(&config)?;
            let names = if names.is_empty() { cfg.corpora.keys().cloned().collect() } else { names };

            let mut failed = 0;
            for name in &names {
                let Some(corpus) = cfg.corpora.get(name) else {
                    bail!("unknown corpus {name:?} in {}", config.display());
                };
                let methods = match (&method[..], &corpus.methods[..]) {
                    ([], []) => CompressionPolicy::ALL.to_vec(),
                    ([], configured) => configured.to_vec(),
                    (given, _) => given.to_vec(),
                };
                for policy in methods {
                    let report = corpus.convert(policy)?;
                    println!(
                        "{name} {}: {} converted, {} failed, log {}",
                        policy.code(),
                        report.entries.len(),
                        report.failures.len(),
                        report.log_path.display()
                    );
                    failed += report.failures.len();
                }
            }
            if failed > 0 {
                tracing::warn!(failed, "some files could not be converted");
            }
        }
    }

    Ok(())
}
