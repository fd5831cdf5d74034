use crate::meta;
use crate::models::{AdmissionRecord, Decision, ParsedMeta};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};
use std::path::Path;
use tracing::{debug, info};

/// Pair every decision row with the metadata cell of the row right after it.
///
/// A row is a decision header when it has at least four fields and the
/// fourth starts with "Accepted on" or "Rejected on". The following row is
/// only read for its first field; it is still checked as a header itself.
pub fn build_records<S: AsRef<str>>(rows: &[Vec<S>]) -> Vec<AdmissionRecord> {
    let mut records = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        if row.len() < 4 {
            continue;
        }
        let decision = match Decision::from_marker(row[3].as_ref()) {
            Some(decision) => decision,
            None => continue,
        };

        let meta = rows
            .get(i + 1)
            .and_then(|next| next.first())
            .map(|cell| cell.as_ref())
            .filter(|cell| !cell.trim().is_empty())
            .map(meta::parse_block)
            .unwrap_or_default();

        records.push(AdmissionRecord {
            university: row[0].as_ref().trim().to_string(),
            program: row[1].as_ref().trim().to_string(),
            decision,
            meta,
        });
    }

    debug!(rows = rows.len(), records = records.len(), "paired decision rows");
    records
}

/// Read a raw scrape: no header, rows of varying length
pub fn read_raw_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open raw scrape: {}", path.display()))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to read row from: {}", path.display()))?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    Ok(rows)
}

pub fn write_records(path: &Path, records: &[AdmissionRecord]) -> Result<()> {
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    writer.write_record(AdmissionRecord::HEADER)?;
    for record in records {
        writer.write_record(record.to_row())?;
    }

    writer.flush()?;
    info!(path = %path.display(), records = records.len(), "wrote admission records");
    Ok(())
}

/// Read a clean table produced by `write_records`.
/// Rows with an unrecognized decision are skipped.
pub fn read_records(path: &Path) -> Result<Vec<AdmissionRecord>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open records file: {}", path.display()))?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.with_context(|| format!("Failed to read row from: {}", path.display()))?;
        match AdmissionRecord::from_row(&row) {
            Some(record) => records.push(record),
            None => debug!(row = ?row, "skipping row without a decision"),
        }
    }

    Ok(records)
}

/// Raw scrape file in, clean table out. Returns the number of records written.
pub fn clean_file(input: &Path, output: &Path) -> Result<usize> {
    let rows = read_raw_rows(input)?;
    let records = build_records(&rows);
    write_records(output, &records)?;
    Ok(records.len())
}

fn is_complete(meta: &ParsedMeta) -> bool {
    meta.term.is_some() && meta.citizenship.is_some() && meta.gpa_raw.is_some() && meta.gre_total.is_some()
}

/// Keep only records usable for analysis: university, term, citizenship,
/// GPA and GRE total all present, and a numeric GPA in `(0, gpa_scale]`.
/// Returns the kept records and how many were dropped.
pub fn retain_complete(records: Vec<AdmissionRecord>, gpa_scale: f64) -> (Vec<AdmissionRecord>, usize) {
    let before = records.len();

    let kept: Vec<AdmissionRecord> = records
        .into_iter()
        .filter(|record| !record.university.is_empty() && is_complete(&record.meta))
        .filter(|record| {
            record
                .numeric_gpa()
                .map(|gpa| gpa > 0.0 && gpa <= gpa_scale)
                .unwrap_or(false)
        })
        .collect();

    let dropped = before - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Citizenship, GreScore};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_header_followed_by_meta_row() {
        let rows = vec![
            row(&["MIT", "Computer Science", "Masters", "Accepted on 1 Jan", ""]),
            row(&["F19\nInternational\nGPA 3.8\nGRE 324"]),
        ];

        let records = build_records(&rows);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.university, "MIT");
        assert_eq!(record.program, "Computer Science");
        assert_eq!(record.decision, Decision::Accepted);
        assert_eq!(record.meta.term.as_deref(), Some("F19"));
        assert_eq!(record.meta.citizenship, Some(Citizenship::International));
        assert_eq!(record.meta.gre_total, Some(324.0));
    }

    #[test]
    fn test_empty_meta_cell_leaves_fields_absent() {
        let rows = vec![
            row(&["MIT", "CS", "Masters", "Accepted on 1 Jan"]),
            row(&["", "F19"]),
        ];

        let records = build_records(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].meta, ParsedMeta::default());
    }

    #[test]
    fn test_whitespace_meta_cell_leaves_fields_absent() {
        let rows = vec![row(&["MIT", "CS", "Masters", "Rejected on 2 Feb"]), row(&["   \n  "])];

        let records = build_records(&rows);
        assert_eq!(records[0].decision, Decision::Rejected);
        assert_eq!(records[0].meta, ParsedMeta::default());
    }

    #[test]
    fn test_header_on_last_row() {
        let rows = vec![row(&[" Stanford ", " EE ", "PhD", "Rejected on 5 Mar"])];

        let records = build_records(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].university, "Stanford");
        assert_eq!(records[0].program, "EE");
        assert_eq!(records[0].meta, ParsedMeta::default());
    }

    #[test]
    fn test_consecutive_headers_are_both_evaluated() {
        let rows = vec![
            row(&["MIT", "CS", "Masters", "Accepted on 1 Jan"]),
            row(&["CMU", "CS", "Masters", "Rejected on 2 Jan"]),
            row(&["S20"]),
        ];

        let records = build_records(&rows);
        assert_eq!(records.len(), 2);
        // The first header reads the second header's first cell as its meta block
        assert_eq!(records[0].meta, ParsedMeta::default());
        assert_eq!(records[1].university, "CMU");
        assert_eq!(records[1].meta.term.as_deref(), Some("S20"));
    }

    #[test]
    fn test_short_and_unmarked_rows_are_skipped() {
        let rows = vec![
            row(&["MIT", "CS", "Accepted on 1 Jan"]),
            row(&["MIT", "CS", "Masters", "Wait listed on 1 Jan"]),
            row(&["F19"]),
        ];

        assert!(build_records(&rows).is_empty());
    }

    fn record(gpa: Option<&str>, gre_total: Option<f64>) -> AdmissionRecord {
        AdmissionRecord {
            university: "MIT".to_string(),
            program: "CS".to_string(),
            decision: Decision::Accepted,
            meta: ParsedMeta {
                term: Some("F19".to_string()),
                citizenship: Some(Citizenship::American),
                gpa_raw: gpa.map(str::to_string),
                gre_total,
                gre_quant: GreScore::Numeric(160.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_retain_complete() {
        let records = vec![
            record(Some("3.9"), Some(325.0)),
            record(Some("4.0"), Some(320.0)),
            record(Some("3.5"), None),
            record(Some("N/A"), Some(320.0)),
            record(Some("0"), Some(320.0)),
            record(Some("9.1"), Some(320.0)),
            record(None, Some(320.0)),
        ];

        let (kept, dropped) = retain_complete(records, 4.0);
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped, 5);
        assert_eq!(kept[0].meta.gpa_raw.as_deref(), Some("3.9"));
        assert_eq!(kept[1].meta.gpa_raw.as_deref(), Some("4.0"));
    }

    #[test]
    fn test_retain_complete_with_ten_point_scale() {
        let (kept, dropped) = retain_complete(vec![record(Some("9.1"), Some(320.0))], 10.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 0);
    }
}
