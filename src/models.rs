use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub output_directory: Option<String>,
    pub scrape: ScrapeConfig,
    pub filter: FilterConfig,
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub program: String,
    pub degree: String,
    pub start_page: u32,
    pub end_page: u32,
    pub timeout_secs: u64,
    pub delay_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub key_column: String,
    pub rank_column: String,
    pub name_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    // Upper bound of the accepted GPA range (0, gpa_scale]
    pub gpa_scale: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_directory: Some("output".to_string()),
            scrape: ScrapeConfig {
                base_url: "https://www.thegradcafe.com/survey/".to_string(),
                program: "Computer Science".to_string(),
                degree: "Masters".to_string(),
                start_page: 1,
                end_page: 50,
                timeout_secs: 15,
                delay_millis: 1200,
            },
            filter: FilterConfig { gpa_scale: 4.0 },
            ranking: RankingConfig::default(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            key_column: "institution_clean".to_string(),
            rank_column: "Rank2025".to_string(),
            name_column: "Institution".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    pub fn output_dir(&self) -> &str {
        self.output_directory.as_deref().unwrap_or("output")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Citizenship {
    International,
    American,
}

impl Citizenship {
    pub fn from_line(line: &str) -> Option<Self> {
        match line {
            "International" => Some(Citizenship::International),
            "American" => Some(Citizenship::American),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Citizenship::International => "International",
            Citizenship::American => "American",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    /// Recognizes the "Accepted on ..." / "Rejected on ..." marker cell
    pub fn from_marker(cell: &str) -> Option<Self> {
        if cell.starts_with("Accepted on") {
            Some(Decision::Accepted)
        } else if cell.starts_with("Rejected on") {
            Some(Decision::Rejected)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accepted => "Accepted",
            Decision::Rejected => "Rejected",
        }
    }
}

/// Score cell text; whole scores keep a trailing `.0` (`324.0`)
pub fn score_cell(score: f64) -> String {
    if score.is_finite() && score.fract() == 0.0 {
        format!("{:.1}", score)
    } else {
        score.to_string()
    }
}

/// A GRE sub-score as it appeared in the scrape.
/// Non-numeric tokens are kept verbatim instead of being dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GreScore {
    Numeric(f64),
    Raw(String),
    #[default]
    Absent,
}

impl GreScore {
    pub fn from_token(token: &str) -> Self {
        match token.parse::<f64>() {
            Ok(score) => GreScore::Numeric(score),
            Err(_) => GreScore::Raw(token.to_string()),
        }
    }

    /// Reads a cell written by `to_cell` back; an empty cell is `Absent`
    pub fn from_cell(cell: &str) -> Self {
        if cell.is_empty() {
            GreScore::Absent
        } else {
            GreScore::from_token(cell)
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, GreScore::Absent)
    }

    pub fn to_cell(&self) -> String {
        match self {
            GreScore::Numeric(score) => score_cell(*score),
            GreScore::Raw(text) => text.clone(),
            GreScore::Absent => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedMeta {
    pub term: Option<String>,
    pub citizenship: Option<Citizenship>,
    pub gpa_raw: Option<String>,
    pub gre_total: Option<f64>,
    pub gre_quant: GreScore,
    pub gre_verbal: GreScore,
    pub gre_analytical: GreScore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionRecord {
    pub university: String,
    pub program: String,
    pub decision: Decision,
    pub meta: ParsedMeta,
}

impl AdmissionRecord {
    pub const HEADER: [&'static str; 10] = [
        "university",
        "program",
        "decision",
        "term",
        "citizenship",
        "gpa_raw",
        "gre_total",
        "gre_q",
        "gre_v",
        "gre_aw",
    ];

    pub fn to_row(&self) -> Vec<String> {
        let meta = &self.meta;
        vec![
            self.university.clone(),
            self.program.clone(),
            self.decision.as_str().to_string(),
            meta.term.clone().unwrap_or_default(),
            meta.citizenship.map(|c| c.as_str().to_string()).unwrap_or_default(),
            meta.gpa_raw.clone().unwrap_or_default(),
            meta.gre_total.map(score_cell).unwrap_or_default(),
            meta.gre_quant.to_cell(),
            meta.gre_verbal.to_cell(),
            meta.gre_analytical.to_cell(),
        ]
    }

    /// Rebuilds a record from a row of the clean output table.
    /// Returns `None` when the decision column is not recognized.
    pub fn from_row(row: &csv::StringRecord) -> Option<Self> {
        let cell = |i: usize| row.get(i).unwrap_or("").trim();
        let optional = |i: usize| {
            let value = cell(i);
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        };

        let decision = match cell(2) {
            "Accepted" => Decision::Accepted,
            "Rejected" => Decision::Rejected,
            _ => return None,
        };

        Some(Self {
            university: cell(0).to_string(),
            program: cell(1).to_string(),
            decision,
            meta: ParsedMeta {
                term: optional(3),
                citizenship: Citizenship::from_line(cell(4)),
                gpa_raw: optional(5),
                gre_total: cell(6).parse::<f64>().ok(),
                gre_quant: GreScore::from_cell(cell(7)),
                gre_verbal: GreScore::from_cell(cell(8)),
                gre_analytical: GreScore::from_cell(cell(9)),
            },
        })
    }

    pub fn numeric_gpa(&self) -> Option<f64> {
        self.meta.gpa_raw.as_deref().and_then(|g| g.trim().parse::<f64>().ok())
    }
}
