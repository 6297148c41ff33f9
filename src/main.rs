mod aggregate;
mod cli;
mod error;
mod extract;
mod locator;
mod model;
mod output;
mod samples;

use std::path::PathBuf;

use crate::error::Result;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

/// Extract metrics from compressor benchmark logs and tabulate them as LaTeX.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Number of threads for per-sample log extraction (default: all cores).
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// Abort the whole run on the first malformed or inconsistent log instead
    /// of skipping that sample.
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Total compressed size per method from a size listing.
    Sizes {
        /// Listing of `<size> <path>` lines grouped under `# <method>` headers.
        #[arg(value_hint = clap::ValueHint::FilePath)]
        listing: PathBuf,

        /// Method columns, in order.
        #[arg(
            long,
            value_delimiter = ',',
            default_values = ["Referee", "Quip", "Deez", "BAM", "SAM"]
        )]
        methods: Vec<String>,

        /// Rows are sorted by this method's total size.
        #[arg(long, default_value = "SAM")]
        sort_by: String,

        /// Row label replacement `FROM=TO`, applied when FROM occurs in the sample name.
        #[arg(
            long = "alias",
            value_parser = cli::parse_alias,
            default_values = ["P_aer=P. aeruginosa", "K562=K562"]
        )]
        aliases: Vec<(String, String)>,

        /// Where to write the per-type size summary.
        #[arg(long, default_value = "all_files.sizes.aggregated")]
        summary: PathBuf,

        /// Method whose sizes go into the summary.
        #[arg(long, default_value = "Referee")]
        summary_method: String,

        /// Also dump the aggregated metrics as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Share of each data type in the total size of one method.
    Breakdown {
        /// Size summary written by `sizes`.
        summary: PathBuf,

        method: String,

        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Wall-clock time of each tool per sample.
    Timings {
        /// Directory holding the `.comp.log`, `.dz_comp.log` and `.quip.log` files.
        #[arg(value_hint = clap::ValueHint::DirPath)]
        dir: PathBuf,

        #[arg(required = true)]
        stems: Vec<String>,

        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Sequence-only size and bits per base of each tool.
    Seq {
        /// Read lengths file: name, read length and aligned reads per sample.
        read_lengths: PathBuf,

        /// Path prefixes of the comparison tool logs, e.g. `data/SRR445718.`.
        #[arg(required = true)]
        prefixes: Vec<String>,

        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Bits per base, edits per read and sequence size across sweep values.
    Sweep {
        /// Listing with `*** <sample> z=<value>` sections.
        listing: PathBuf,

        /// Directory of the `.seq2.log` files (default: the listing's directory).
        #[arg(long)]
        log_dir: Option<PathBuf>,

        #[arg(long, default_value_t = 100)]
        read_len: u64,

        /// Write the sweep summary here instead of standard output.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Render a sweep summary as a LaTeX table.
    SweepTable { summary: PathBuf },

    /// Aligned and unaligned read counts from a data summary.
    Alignments {
        summary: PathBuf,

        /// Read lengths file used for the read length column.
        #[arg(long)]
        read_lengths: Option<PathBuf>,

        /// Samples sequenced as whole genomes; all others are RNA-seq.
        #[arg(long, value_delimiter = ',')]
        wgs: Vec<String>,

        /// Where to write `<sample> <aligned> <error rate> <depth>` lines.
        #[arg(short, long, default_value = "aligned_counts.txt")]
        output: PathBuf,

        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Compressed quality size of a Quip log, in MiB.
    QuipQuals { log: PathBuf },

    /// Per-stream quality compression from a Referee run log.
    QualDetails { log: PathBuf },
}

fn try_main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    cli::run(args)
}

fn main() -> miette::Result<()> {
    try_main().into_diagnostic()
}
