use crate::error::TableError;
use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;

/// A CSV file held as header names plus string rows.
/// Every row is padded or cut to the header length on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Missing-value count of one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMissing {
    pub column: String,
    pub missing_count: usize,
    pub missing_percent: f64,
}

impl ColumnMissing {
    /// The summary as a `column,missing_count,missing_percent` table
    pub fn to_table(summary: &[ColumnMissing]) -> Table {
        let rows = summary
            .iter()
            .map(|c| vec![c.column.clone(), c.missing_count.to_string(), format!("{:.2}", c.missing_percent)])
            .collect();
        Table::new(
            vec!["column".to_string(), "missing_count".to_string(), "missing_percent".to_string()],
            rows,
        )
    }
}

fn is_missing(cell: &str) -> bool {
    cell.trim().is_empty()
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        Self::from_path_with_delimiter(path, b',')
    }

    pub fn from_path_with_delimiter(path: &Path, delimiter: u8) -> Result<Self, TableError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect());
        }

        Ok(Self::new(headers, rows))
    }

    pub fn write(&self, path: &Path) -> Result<(), TableError> {
        let mut writer = WriterBuilder::new().from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Fails with the full list of missing columns and what is actually there
    pub fn require(&self, label: &str, columns: &[&str]) -> Result<(), TableError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| self.column_index(c).is_none())
            .map(|c| c.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TableError::MissingColumns {
                table: label.to_string(),
                missing,
                available: self.headers.clone(),
            })
        }
    }

    /// Keep only the given columns, in the given order
    pub fn select(&self, label: &str, columns: &[&str]) -> Result<Table, TableError> {
        self.require(label, columns)?;
        let indices: Vec<usize> = columns.iter().filter_map(|c| self.column_index(c)).collect();

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Table::new(columns.iter().map(|c| c.to_string()).collect(), rows))
    }

    /// Append a column computed from each row, or overwrite it if it exists
    pub fn set_column<F>(&mut self, name: &str, mut value: F)
    where
        F: FnMut(&[String]) -> String,
    {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    let cell = value(row.as_slice());
                    row[idx] = cell;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    let cell = value(row.as_slice());
                    row.push(cell);
                }
            }
        }
    }

    /// Missing count and percent (two decimals) per column, most missing first.
    /// An empty or whitespace-only cell counts as missing.
    pub fn missing_summary(&self) -> Vec<ColumnMissing> {
        let mut summary: Vec<ColumnMissing> = self
            .headers
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let missing_count = self.rows.iter().filter(|row| is_missing(&row[idx])).count();
                let missing_percent = if self.rows.is_empty() {
                    0.0
                } else {
                    (missing_count as f64 * 10000.0 / self.rows.len() as f64).round() / 100.0
                };
                ColumnMissing {
                    column: column.clone(),
                    missing_count,
                    missing_percent,
                }
            })
            .collect();

        summary.sort_by(|a, b| b.missing_percent.total_cmp(&a.missing_percent));
        summary
    }

    /// Drop every column whose missing fraction is above `threshold` (0 to 1).
    /// Returns the dropped column names.
    pub fn drop_missing_columns(&mut self, threshold: f64) -> Vec<String> {
        let total = self.rows.len();
        let keep: Vec<bool> = (0..self.headers.len())
            .map(|idx| {
                let missing = self.rows.iter().filter(|row| is_missing(&row[idx])).count();
                total == 0 || missing as f64 / total as f64 <= threshold
            })
            .collect();

        let dropped: Vec<String> = self
            .headers
            .iter()
            .zip(&keep)
            .filter(|(_, kept)| !**kept)
            .map(|(name, _)| name.clone())
            .collect();

        let retain = |cells: &mut Vec<String>| {
            let mut flags = keep.iter();
            cells.retain(|_| flags.next().copied().unwrap_or(true));
        };
        retain(&mut self.headers);
        for row in &mut self.rows {
            retain(row);
        }
        dropped
    }

    pub fn map_cells<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                *cell = f(cell);
            }
        }
    }
}
