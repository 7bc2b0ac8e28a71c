use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::strand::StrandMode;

#[derive(Debug, Parser)]
#[command(version, about = "Infer 3'UTR boundaries from RNA-seq coverage", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Compute filtered coverage regions from a BAM alignment")]
    Coverage {
        #[arg(short, long)]
        /// BAM file to compute coverage from
        bam: PathBuf,

        #[arg(short, long, default_value_t, value_enum)]
        /// Whether to split coverage by strand
        strand: StrandMode,

        #[arg(short, long, default_value_t = 1)]
        /// Worker count passed to bamCoverage
        cpu: usize,

        #[arg(short, long, default_value = "tmp")]
        /// Working directory for intermediate files
        temp: PathBuf,

        #[arg(long)]
        /// Accept an empty region file instead of failing
        allow_empty: bool,
    },
    #[command(about = "Call 3'UTR intervals from coverage regions and stop codons")]
    Utrs {
        #[arg(long)]
        /// Filtered coverage regions from the coverage subcommand
        cov: PathBuf,

        #[arg(long)]
        /// Stop-codon intervals (BED, identifier in column 4)
        stop: PathBuf,

        #[arg(short, long)]
        /// Gene intervals (BED, gene identifier in column 4)
        genes: PathBuf,

        #[arg(short, long, default_value_t, value_enum)]
        /// Strand mode the coverage regions were produced with
        strand: StrandMode,

        #[arg(short, long)]
        /// Output path for the final 3'UTR intervals
        out: PathBuf,

        #[arg(short, long, default_value = "tmp")]
        /// Working directory for intermediate files
        temp: PathBuf,

        #[arg(long)]
        /// Accept an empty UTR file instead of failing
        allow_empty: bool,
    },
}
