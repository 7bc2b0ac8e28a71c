//! Coverage stage: turn a BAM alignment into filtered coverage regions.
//!
//! Indexes the alignment if needed, runs `bamCoverage` once (unstranded) or
//! once per strand (stranded), drops rows below the coverage threshold
//! in-process, and merges the survivors with `bedtools merge`. Stranded
//! passes are annotated with a `+`/`-` column and a row-number placeholder
//! identifier before merging, then concatenated into a single region file.
//!
//! Each step is recorded in the working-directory manifest, so re-invoking
//! the stage after a partial failure resumes instead of recomputing.

use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::Error;
use crate::manifest::Manifest;
use crate::runner;
use crate::strand::{ReadStrand, StrandMode};
use crate::validate::ensure_non_empty;

/// Minimum bedgraph coverage value for a row to enter the merge.
const COVERAGE_THRESHOLD: f64 = 2.0;

/// Final region file name inside the working directory.
const REGION_FILE: &str = "cov.reg.bed";

pub fn run(
    bam: &Path,
    mode: StrandMode,
    cpu: usize,
    temp: &Path,
    allow_empty: bool,
) -> Result<(), Error> {
    if !temp.exists() {
        info!("Creating working directory {}", temp.display());
        fs::create_dir_all(temp).map_err(|e| Error::io(e, temp))?;
    }
    let mut manifest = Manifest::load(temp);

    index_bam(bam, &mut manifest)?;

    let region_bed = temp.join(REGION_FILE);
    match mode {
        StrandMode::Unstranded => {
            let bedgraph = temp.join("cov.bedgraph");
            if !manifest.is_complete("bedgraph:unstranded", &bedgraph) {
                bam_coverage(bam, &bedgraph, cpu, None)?;
                manifest.record("bedgraph:unstranded")?;
            }
            if !manifest.is_complete("filter:unstranded", &region_bed) {
                filter_and_merge(&bedgraph, &region_bed, None)?;
                manifest.record("filter:unstranded")?;
            }
        }
        StrandMode::Stranded => {
            for strand in ReadStrand::BOTH {
                let bedgraph = temp.join(format!("{}.bedgraph", strand.stem()));
                let filtered = temp.join(format!("{}.reg.bed", strand.stem()));
                let graph_step = format!("bedgraph:{}", strand.filter_arg());
                let filter_step = format!("filter:{}", strand.filter_arg());

                if !manifest.is_complete(&graph_step, &bedgraph) {
                    bam_coverage(bam, &bedgraph, cpu, Some(strand))?;
                    manifest.record(&graph_step)?;
                }
                if !manifest.is_complete(&filter_step, &filtered) {
                    filter_and_merge(&bedgraph, &filtered, Some(strand))?;
                    manifest.record(&filter_step)?;
                }
            }
            if !manifest.is_complete("union-strands", &region_bed) {
                union_strands(temp, &region_bed)?;
                manifest.record("union-strands")?;
            }
        }
    }

    ensure_non_empty(&region_bed, allow_empty)?;
    info!("Coverage regions written to {}", region_bed.display());
    Ok(())
}

/// Create the `.bai` sibling index with `samtools index` if it is missing.
/// The index file belongs to samtools, so its presence alone is trusted.
fn index_bam(bam: &Path, manifest: &mut Manifest) -> Result<(), Error> {
    let bai = PathBuf::from(format!("{}.bai", bam.display()));
    if bai.exists() {
        info!("BAM index {} found, skipping indexing", bai.display());
        return Ok(());
    }
    runner::run(Command::new("samtools").arg("index").arg(bam))?;
    manifest.record("index-bam")
}

fn bam_coverage(
    bam: &Path,
    out: &Path,
    cpu: usize,
    strand: Option<ReadStrand>,
) -> Result<(), Error> {
    let mut cmd = Command::new("bamCoverage");
    cmd.arg("--skipNonCoveredRegions").arg("-b").arg(bam);
    if let Some(strand) = strand {
        cmd.arg("--filterRNAstrand").arg(strand.filter_arg());
    }
    cmd.arg("--outFileFormat")
        .arg("bedgraph")
        .arg("-p")
        .arg(cpu.to_string())
        .arg("-o")
        .arg(out);
    runner::run(&mut cmd)?;
    Ok(())
}

/// Threshold-filter a raw bedgraph and merge the survivors with
/// `bedtools merge` (fed on stdin), writing merged regions to `out`.
fn filter_and_merge(bedgraph: &Path, out: &Path, strand: Option<ReadStrand>) -> Result<(), Error> {
    let raw = fs::read(bedgraph).map_err(|e| Error::io(e, bedgraph))?;
    let passing = threshold_rows(&raw, strand)?;

    let mut cmd = Command::new("bedtools");
    cmd.arg("merge").arg("-i").arg("-").arg("-c");
    match strand {
        // aggregate summed coverage only
        None => cmd.arg("4").arg("-o").arg("sum"),
        // keep placeholder ids, summed coverage and the strand symbol
        Some(_) => cmd.arg("4,5,6").arg("-o").arg("distinct,sum,distinct"),
    };
    let merged = runner::run_with_stdin(&mut cmd, passing)?;
    fs::write(out, &merged.stdout).map_err(|e| Error::io(e, out))?;
    info!("Filtered and merged {} to {}", bedgraph.display(), out.display());
    Ok(())
}

/// Keep bedgraph rows whose coverage value meets [`COVERAGE_THRESHOLD`].
///
/// For a stranded pass each surviving row is widened from
/// `(chrom, start, end, value)` to
/// `(chrom, start, end, row-number, value, symbol)`. Row numbers are
/// 1-based over the raw input (not the survivors), serving as placeholder
/// identifiers that stay stable across threshold changes.
fn threshold_rows(raw: &[u8], strand: Option<ReadStrand>) -> Result<Vec<u8>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(raw);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(Vec::new());

    let mut row = csv::ByteRecord::new();
    let mut row_number: u64 = 0;
    while reader.read_byte_record(&mut row)? {
        row_number += 1;
        let value_field = row
            .get(3)
            .ok_or_else(|| Error::Record(format!("bedgraph row {} has no value column", row_number)))?;
        let value: f64 = std::str::from_utf8(value_field)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::Record(format!("bedgraph row {} has a non-numeric value", row_number))
            })?;
        if value < COVERAGE_THRESHOLD {
            continue;
        }
        match strand {
            None => writer.write_byte_record(&row)?,
            Some(strand) => {
                let mut annotated = csv::ByteRecord::new();
                annotated.push_field(&row[0]);
                annotated.push_field(&row[1]);
                annotated.push_field(&row[2]);
                annotated.push_field(row_number.to_string().as_bytes());
                annotated.push_field(value_field);
                annotated.push_field(strand.symbol().to_string().as_bytes());
                writer.write_byte_record(&annotated)?;
            }
        }
    }
    writer
        .into_inner()
        .map_err(|e| Error::Record(e.to_string()))
}

/// Concatenate the per-strand filtered files into the final region file.
fn union_strands(temp: &Path, out: &Path) -> Result<(), Error> {
    let mut combined = Vec::new();
    for strand in ReadStrand::BOTH {
        let part = temp.join(format!("{}.reg.bed", strand.stem()));
        combined.extend(fs::read(&part).map_err(|e| Error::io(e, &part))?);
    }
    fs::write(out, combined).map_err(|e| Error::io(e, out))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEDGRAPH: &[u8] = b"chr1\t0\t100\t1\nchr1\t100\t200\t2\nchr1\t200\t300\t5\nchr2\t0\t50\t1.5\n";

    #[test]
    fn test_threshold_keeps_only_covered_rows() {
        let kept = threshold_rows(BEDGRAPH, None).unwrap();
        let text = String::from_utf8(kept).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows, vec!["chr1\t100\t200\t2", "chr1\t200\t300\t5"]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let kept = threshold_rows(b"chr1\t0\t10\t2\n", None).unwrap();
        assert_eq!(kept, b"chr1\t0\t10\t2\n");
    }

    #[test]
    fn test_stranded_rows_are_annotated() {
        let kept = threshold_rows(BEDGRAPH, Some(ReadStrand::Reverse)).unwrap();
        let text = String::from_utf8(kept).unwrap();
        // row numbers count raw input rows, so the first survivor is row 2
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows, vec!["chr1\t100\t200\t2\t2\t-", "chr1\t200\t300\t3\t5\t-"]);
    }

    #[test]
    fn test_forward_symbol_in_annotation() {
        let kept = threshold_rows(b"chr1\t0\t10\t3\n", Some(ReadStrand::Forward)).unwrap();
        assert_eq!(kept, b"chr1\t0\t10\t1\t3\t+\n");
    }

    #[test]
    fn test_non_numeric_value_is_rejected() {
        let err = threshold_rows(b"chr1\t0\t10\tabc\n", None).unwrap_err();
        assert!(matches!(err, Error::Record(_)));
    }

    #[test]
    fn test_empty_bedgraph_yields_no_rows() {
        let kept = threshold_rows(b"", None).unwrap();
        assert!(kept.is_empty());
    }
}
