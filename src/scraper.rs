use crate::error::ScrapeError;
use crate::models::{Decision, ScrapeConfig};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

static RESULTS_TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table.tw-min-w-full").expect("valid selector"));
static BODY_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").expect("valid selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));

pub struct SurveyScraper {
    client: reqwest::Client,
    config: ScrapeConfig,
}

impl SurveyScraper {
    pub fn new(config: ScrapeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn page_url(&self, decision: Decision, page: u32) -> Result<reqwest::Url, ScrapeError> {
        let page = page.to_string();
        reqwest::Url::parse_with_params(
            &self.config.base_url,
            &[
                ("q", ""),
                ("sort", "newest"),
                ("institution", ""),
                ("program", self.config.program.as_str()),
                ("degree", self.config.degree.as_str()),
                ("season", ""),
                ("decision", decision.as_str()),
                ("page", page.as_str()),
            ],
        )
        .map_err(|e| ScrapeError::InvalidUrl(e.to_string()))
    }

    pub async fn fetch_page(&self, url: reqwest::Url) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScrapeError::Status(response.status()));
        }

        Ok(response.text().await?)
    }

    /// Fetch pages `start..=end` one at a time and collect the raw table rows.
    /// Pages that fail or carry no results table are logged and skipped.
    pub async fn scrape_pages(&self, decision: Decision, start: u32, end: u32) -> Result<Vec<Vec<String>>, ScrapeError> {
        let mut all_rows = Vec::new();

        for page in start..=end {
            let url = self.page_url(decision, page)?;
            info!(page, %url, "scraping page");

            let html = match self.fetch_page(url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(page, error = %e, "failed to fetch page, skipping");
                    continue;
                }
            };

            match scrape_html(&html) {
                Some(rows) if rows.is_empty() => info!(page, "no rows found"),
                Some(rows) => all_rows.extend(rows),
                None => warn!(page, "results table not found, skipping"),
            }

            if page < end {
                tokio::time::sleep(Duration::from_millis(self.config.delay_millis)).await;
            }
        }

        info!(rows = all_rows.len(), "scrape finished");
        Ok(all_rows)
    }
}

/// Text of a cell with one line per non-blank text node
fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Raw rows of the results table, or `None` when the page has no such table
pub fn scrape_html(html: &str) -> Option<Vec<Vec<String>>> {
    let document = Html::parse_document(html);
    let table = document.select(&RESULTS_TABLE).next()?;

    let rows = table
        .select(&BODY_ROWS)
        .map(|row| row.select(&CELLS).map(cell_text).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect();

    Some(rows)
}

/// Raw scrape output: no header, one CSV row per table row
pub fn write_raw_rows(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
