use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}

// A `""` row is a decision entry with an empty metadata cell and must stay
// in place for the pairing pass; only records without fields are dropped.
fn has_fields(record: &StringRecord) -> bool {
    !record.is_empty()
}

/// Files matching a glob pattern, in path order
pub fn batch_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("Invalid batch pattern: {}", pattern))? {
        files.push(entry?);
    }
    files.sort();
    Ok(files)
}

/// Concatenate batch files into one.
///
/// With `has_headers`, the first line of every file is a header: the first
/// file's header is written if it is not blank and the rest are skipped.
/// Rows with blank cells are kept. Returns the number of data rows written.
pub fn merge_batches(pattern: &str, output: &Path, has_headers: bool) -> Result<usize> {
    let files = batch_files(pattern)?;
    if files.is_empty() {
        return Err(anyhow!("No batch files match pattern: {}", pattern));
    }

    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_path(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;

    let mut total_rows = 0;
    for (i, file) in files.iter().enumerate() {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(file)
            .with_context(|| format!("Failed to open batch file: {}", file.display()))?;

        let mut records = reader.records();
        if has_headers {
            match records.next().transpose()? {
                Some(header) if i == 0 && !is_blank(&header) => {
                    writer.write_record(&header)?;
                    info!(file = %file.display(), "header taken");
                }
                Some(_) if i == 0 => warn!(file = %file.display(), "first batch file has a blank header"),
                _ => {}
            }
        }

        let mut row_count = 0;
        for result in records {
            let record = result.with_context(|| format!("Failed to read row from: {}", file.display()))?;
            if !has_fields(&record) {
                continue;
            }
            writer.write_record(&record)?;
            row_count += 1;
        }

        info!(file = %file.display(), rows = row_count, "batch appended");
        total_rows += row_count;
    }

    writer.flush()?;
    Ok(total_rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineSummary {
    pub accepted_rows: usize,
    pub rejected_rows: usize,
}

fn append_rows(reader: &mut csv::Reader<File>, writer: &mut Writer<File>) -> Result<usize> {
    let mut count = 0;
    for result in reader.records() {
        let record = result?;
        if !has_fields(&record) {
            continue;
        }
        writer.write_record(&record)?;
        count += 1;
    }
    Ok(count)
}

/// Stack the clean rejected table under the clean accepted table.
/// A header mismatch is only warned about; the rows are appended anyway.
pub fn combine_clean(accepted: &Path, rejected: &Path, output: &Path) -> Result<CombineSummary> {
    let mut accepted_reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(accepted)
        .with_context(|| format!("Failed to open accepted file: {}", accepted.display()))?;
    let accepted_header = accepted_reader.headers()?.clone();
    if accepted_header.is_empty() {
        return Err(anyhow!("Accepted file has no header: {}", accepted.display()));
    }

    let mut rejected_reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(rejected)
        .with_context(|| format!("Failed to open rejected file: {}", rejected.display()))?;
    let rejected_header = rejected_reader.headers()?.clone();
    if !rejected_header.iter().eq(accepted_header.iter()) {
        warn!(
            accepted = ?accepted_header,
            rejected = ?rejected_header,
            "rejected header differs from accepted header, appending rows anyway"
        );
    }

    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_path(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    writer.write_record(&accepted_header)?;

    let accepted_rows = append_rows(&mut accepted_reader, &mut writer)?;
    let rejected_rows = append_rows(&mut rejected_reader, &mut writer)?;
    writer.flush()?;

    Ok(CombineSummary {
        accepted_rows,
        rejected_rows,
    })
}
