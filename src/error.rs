#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("{table} table is missing columns {missing:?}. Columns: {available:?}")]
    MissingColumns {
        table: String,
        missing: Vec<String>,
        available: Vec<String>,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP request failed with status: {0}")]
    Status(reqwest::StatusCode),
    #[error("Invalid survey URL: {0}")]
    InvalidUrl(String),
}
