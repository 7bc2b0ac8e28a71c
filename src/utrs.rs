//! UTR stage: call candidate 3'UTR intervals from filtered coverage regions.
//!
//! Coverage regions are intersected with stop-codon intervals
//! (`bedtools intersect`) and each overlapping pair is sliced into the span
//! running downstream from the stop codon, with strand-aware coordinate
//! selection. Candidates whose identifier overlaps more than one distinct
//! gene are ambiguous and dropped from the final output.

use fnv::{FnvHashMap, FnvHashSet};
use log::info;
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::Error;
use crate::manifest::Manifest;
use crate::runner;
use crate::strand::StrandMode;
use crate::validate::ensure_non_empty;

/// Sliced candidate intervals inside the working directory.
const CANDIDATE_FILE: &str = "3utrs.bed";
/// Identifiers excluded for overlapping more than one gene.
const OFFENDING_FILE: &str = "ids.txt";

#[allow(clippy::too_many_arguments)]
pub fn run(
    cov: &Path,
    stop: &Path,
    genes: &Path,
    mode: StrandMode,
    out: &Path,
    temp: &Path,
    allow_empty: bool,
) -> Result<(), Error> {
    if !temp.exists() {
        info!("Creating working directory {}", temp.display());
        fs::create_dir_all(temp).map_err(|e| Error::io(e, temp))?;
    }
    let mut manifest = Manifest::load(temp);

    let candidates = temp.join(CANDIDATE_FILE);
    if !manifest.is_complete("slice", &candidates) {
        slice_regions(cov, stop, &candidates, mode)?;
        manifest.record("slice")?;
    }

    if !manifest.is_complete("dedupe", out) {
        drop_multi_gene_candidates(&candidates, genes, out, &temp.join(OFFENDING_FILE))?;
        manifest.record("dedupe")?;
    }

    ensure_non_empty(out, allow_empty)?;
    info!("3'UTR intervals written to {}", out.display());
    Ok(())
}

/// Intersect coverage regions with stop codons and slice each overlap into
/// a candidate 3'UTR interval.
fn slice_regions(cov: &Path, stop: &Path, out: &Path, mode: StrandMode) -> Result<(), Error> {
    let mut cmd = Command::new("bedtools");
    cmd.arg("intersect")
        .arg("-a")
        .arg(cov)
        .arg("-b")
        .arg(stop)
        .arg("-wa")
        .arg("-wb");
    if mode == StrandMode::Stranded {
        cmd.arg("-s");
    }
    let overlaps = runner::run(&mut cmd)?;
    let sliced = slice_rows(&overlaps.stdout, mode)?;
    fs::write(out, sliced).map_err(|e| Error::io(e, out))?;
    info!("Sliced candidate UTRs to {}", out.display());
    Ok(())
}

fn coord(row: &csv::ByteRecord, idx: usize) -> Result<i64, Error> {
    row.get(idx)
        .and_then(|f| std::str::from_utf8(f).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Record(format!("overlap row lacks coordinate column {}", idx + 1)))
}

fn field<'r>(row: &'r csv::ByteRecord, idx: usize) -> Result<&'r [u8], Error> {
    row.get(idx)
        .ok_or_else(|| Error::Record(format!("overlap row lacks column {}", idx + 1)))
}

/// Turn `bedtools intersect -wa -wb` output into candidate 3'UTR rows.
///
/// Unstranded overlaps pair a 4-column coverage region with a 6-column stop
/// codon: a `+` stop keeps (stop start, region end), a `-` stop keeps
/// (region start, stop end), and rows with end <= start are culled.
///
/// Stranded overlaps pair a 6-column coverage region with a 6-column stop
/// codon; the region's own strand picks the coordinates, the identifier
/// becomes `<region id>:<stop id>`, and rows additionally require start > 0.
fn slice_rows(overlaps: &[u8], mode: StrandMode) -> Result<Vec<u8>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(overlaps);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(Vec::new());

    let mut row = csv::ByteRecord::new();
    while reader.read_byte_record(&mut row)? {
        let (start, end, id, strand) = match mode {
            StrandMode::Unstranded => {
                let strand = field(&row, 9)?.to_vec();
                let (start, end) = if strand == b"+" {
                    (coord(&row, 5)?, coord(&row, 2)?)
                } else {
                    (coord(&row, 1)?, coord(&row, 6)?)
                };
                (start, end, field(&row, 7)?.to_vec(), strand)
            }
            StrandMode::Stranded => {
                let strand = field(&row, 5)?.to_vec();
                let (start, end) = if strand == b"+" {
                    (coord(&row, 7)?, coord(&row, 2)?)
                } else {
                    (coord(&row, 1)?, coord(&row, 7)?)
                };
                let mut id = field(&row, 3)?.to_vec();
                id.push(b':');
                id.extend_from_slice(field(&row, 9)?);
                (start, end, id, strand)
            }
        };

        if end <= start {
            continue;
        }
        if mode == StrandMode::Stranded && start <= 0 {
            continue;
        }

        let mut sliced = csv::ByteRecord::new();
        sliced.push_field(field(&row, 0)?);
        sliced.push_field(start.to_string().as_bytes());
        sliced.push_field(end.to_string().as_bytes());
        sliced.push_field(&id);
        sliced.push_field(b"0");
        sliced.push_field(&strand);
        writer.write_byte_record(&sliced)?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Record(e.to_string()))
}

/// Remove candidates whose identifier hits two or more distinct genes.
///
/// The offending identifiers are kept in `ids_out` as a diagnostic artifact.
fn drop_multi_gene_candidates(
    candidates: &Path,
    genes: &Path,
    out: &Path,
    ids_out: &Path,
) -> Result<(), Error> {
    let hits = runner::run(
        Command::new("bedtools")
            .arg("intersect")
            .arg("-a")
            .arg(candidates)
            .arg("-b")
            .arg(genes)
            .arg("-wa")
            .arg("-wb")
            .arg("-s"),
    )?;
    let offending = offending_ids(&hits.stdout)?;

    let mut id_list: Vec<&String> = offending.iter().collect();
    id_list.sort();
    let mut listing = String::new();
    for id in &id_list {
        listing.push_str(id);
        listing.push('\n');
    }
    fs::write(ids_out, listing).map_err(|e| Error::io(e, ids_out))?;

    let rows = fs::read(candidates).map_err(|e| Error::io(e, candidates))?;
    if offending.is_empty() {
        info!("No offending UTRs found");
        fs::write(out, rows).map_err(|e| Error::io(e, out))?;
        return Ok(());
    }
    info!("Excluding {} multi-gene candidate(s)", offending.len());
    let kept = exclude_offending(&rows, &offending)?;
    fs::write(out, kept).map_err(|e| Error::io(e, out))?;
    Ok(())
}

/// Identifiers from candidate-vs-gene overlaps that hit >= 2 distinct genes.
///
/// Counting distinct gene ids (not raw hits) means two overlaps against the
/// same gene do not flag a candidate.
fn offending_ids(hits: &[u8]) -> Result<FnvHashSet<String>, Error> {
    let mut genes_per_id: FnvHashMap<String, FnvHashSet<String>> = FnvHashMap::default();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(hits);
    let mut row = csv::ByteRecord::new();
    while reader.read_byte_record(&mut row)? {
        let id = String::from_utf8_lossy(field(&row, 3)?).into_owned();
        let gene = String::from_utf8_lossy(field(&row, 9)?).into_owned();
        genes_per_id.entry(id).or_default().insert(gene);
    }
    Ok(genes_per_id
        .into_iter()
        .filter(|(_, genes)| genes.len() > 1)
        .map(|(id, _)| id)
        .collect())
}

/// Copy candidate rows through, skipping those with an offending identifier.
fn exclude_offending(rows: &[u8], offending: &FnvHashSet<String>) -> Result<Vec<u8>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(rows);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(Vec::new());
    let mut row = csv::ByteRecord::new();
    while reader.read_byte_record(&mut row)? {
        let id = String::from_utf8_lossy(field(&row, 3)?);
        if !offending.contains(id.as_ref()) {
            writer.write_byte_record(&row)?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| Error::Record(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // coverage region (0,1000) at depth 5 overlapping a + stop codon at 500
    const PLUS_OVERLAP: &[u8] = b"chr1\t0\t1000\t5\tchr1\t500\t503\tstopA\t0\t+\n";
    // same region against a - stop codon
    const MINUS_OVERLAP: &[u8] = b"chr1\t0\t1000\t5\tchr1\t497\t500\tstopB\t0\t-\n";

    #[test]
    fn test_unstranded_plus_stop_keeps_downstream_span() {
        let sliced = slice_rows(PLUS_OVERLAP, StrandMode::Unstranded).unwrap();
        assert_eq!(sliced, b"chr1\t500\t1000\tstopA\t0\t+\n");
    }

    #[test]
    fn test_unstranded_minus_stop_keeps_upstream_span() {
        let sliced = slice_rows(MINUS_OVERLAP, StrandMode::Unstranded).unwrap();
        assert_eq!(sliced, b"chr1\t0\t500\tstopB\t0\t-\n");
    }

    #[test]
    fn test_unstranded_degenerate_span_is_culled() {
        // + stop codon at the very end of the coverage region: end == start
        let overlap = b"chr1\t0\t1000\t5\tchr1\t1000\t1003\tstopC\t0\t+\n";
        let sliced = slice_rows(overlap, StrandMode::Unstranded).unwrap();
        assert!(sliced.is_empty());
    }

    #[test]
    fn test_stranded_slice_builds_composite_id() {
        // 6-column stranded coverage region (id 7) against a - stop codon
        let overlap = b"chr1\t10\t1000\t7\t5\t-\tchr1\t497\t500\tstopB\t0\t-\n";
        let sliced = slice_rows(overlap, StrandMode::Stranded).unwrap();
        assert_eq!(sliced, b"chr1\t10\t497\t7:stopB\t0\t-\n");
    }

    #[test]
    fn test_stranded_zero_start_is_culled() {
        // a - strand region starting at 0 emits start == 0, which the
        // stranded path rejects
        let overlap = b"chr1\t0\t1000\t7\t5\t-\tchr1\t497\t500\tstopB\t0\t-\n";
        let sliced = slice_rows(overlap, StrandMode::Stranded).unwrap();
        assert!(sliced.is_empty());
    }

    #[test]
    fn test_stranded_plus_region_spans_stop_to_region_end() {
        let overlap = b"chr1\t100\t900\t3\t8\t+\tchr1\t400\t403\tstopD\t0\t+\n";
        let sliced = slice_rows(overlap, StrandMode::Stranded).unwrap();
        assert_eq!(sliced, b"chr1\t400\t900\t3:stopD\t0\t+\n");
    }

    #[test]
    fn test_multi_gene_ids_are_offending() {
        let hits = b"chr1\t500\t1000\tutr1\t0\t+\tchr1\t400\t600\tG1\t0\t+\n\
chr1\t500\t1000\tutr1\t0\t+\tchr1\t900\t1100\tG2\t0\t+\n\
chr1\t0\t200\tutr2\t0\t+\tchr1\t0\t300\tG3\t0\t+\n";
        let offending = offending_ids(hits).unwrap();
        assert!(offending.contains("utr1"));
        assert!(!offending.contains("utr2"));
    }

    #[test]
    fn test_repeat_hits_on_one_gene_are_not_offending() {
        let hits = b"chr1\t0\t200\tutr2\t0\t+\tchr1\t0\t100\tG3\t0\t+\n\
chr1\t0\t200\tutr2\t0\t+\tchr1\t150\t300\tG3\t0\t+\n";
        let offending = offending_ids(hits).unwrap();
        assert!(offending.is_empty());
    }

    #[test]
    fn test_offending_rows_are_excluded() {
        let rows = b"chr1\t500\t1000\tutr1\t0\t+\nchr1\t0\t200\tutr2\t0\t+\n";
        let mut offending = FnvHashSet::default();
        offending.insert("utr1".to_string());
        let kept = exclude_offending(rows, &offending).unwrap();
        assert_eq!(kept, b"chr1\t0\t200\tutr2\t0\t+\n");
    }

    #[test]
    fn test_no_offending_ids_keeps_everything() {
        let rows = b"chr1\t500\t1000\tutr1\t0\t+\nchr1\t0\t200\tutr2\t0\t+\n";
        let kept = exclude_offending(rows, &FnvHashSet::default()).unwrap();
        assert_eq!(kept.as_slice(), rows.as_slice());
    }
}
