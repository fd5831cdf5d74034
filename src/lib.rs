//! Cleaning and joining of GradCafe admission result scrapes.
//!
//! The pipeline is: scrape raw survey rows, merge batch files, pair each
//! decision row with its metadata cell, filter incomplete records, then
//! join with a university ranking table on a normalized institution name.

pub mod batches;
pub mod error;
pub mod meta;
pub mod models;
pub mod normalize;
pub mod ranking;
pub mod records;
pub mod scraper;
pub mod table;

pub use error::{ScrapeError, TableError};
pub use meta::{parse, parse_block};
pub use models::{AdmissionRecord, Citizenship, Config, Decision, GreScore, ParsedMeta};
pub use normalize::normalize;
pub use ranking::{inner_join, left_join, JoinSettings, Unmatched};
pub use records::build_records;
pub use table::Table;
