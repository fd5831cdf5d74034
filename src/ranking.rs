use crate::error::TableError;
use crate::models::RankingConfig;
use crate::normalize::{convert_rank, key_cell, normalize};
use crate::table::Table;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Columns `add_key_column` derives the institution key from
pub const INSTITUTION_COLUMNS: [&str; 4] = [
    "Institution",
    "university",
    "Undergrad Institution",
    "Undergraduate Institution",
];

/// Columns kept in the slim ranking table
pub const SLIM_COLUMNS: [&str; 5] = ["2025", "Institution", "Country / Territory", "Rank2025", "institution_clean"];

#[derive(Debug, Clone)]
pub struct JoinSettings {
    pub key_column: String,
    pub rank_column: String,
    pub name_columns: Vec<String>,
}

impl From<&RankingConfig> for JoinSettings {
    fn from(config: &RankingConfig) -> Self {
        let mut name_columns = vec![config.name_column.clone()];
        for column in INSTITUTION_COLUMNS {
            if column != config.name_column {
                name_columns.push(column.to_string());
            }
        }

        Self {
            key_column: config.key_column.clone(),
            rank_column: config.rank_column.clone(),
            name_columns,
        }
    }
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self::from(&RankingConfig::default())
    }
}

/// Join keys that found no partner, distinct and in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unmatched {
    pub admissions: Vec<String>,
    pub ranking: Vec<String>,
}

impl Unmatched {
    pub fn is_empty(&self) -> bool {
        self.admissions.is_empty() && self.ranking.is_empty()
    }

    pub fn write(&self, path: &std::path::Path) -> Result<(), TableError> {
        let mut rows = Vec::new();
        for key in &self.admissions {
            rows.push(vec!["admissions".to_string(), key.clone()]);
        }
        for key in &self.ranking {
            rows.push(vec!["ranking".to_string(), key.clone()]);
        }
        Table::new(vec!["side".to_string(), "institution_clean".to_string()], rows).write(path)
    }
}

/// Add the normalized key column to a table from its first institution-like column
pub fn add_key_column(table: &mut Table, label: &str, settings: &JoinSettings) -> Result<(), TableError> {
    let name_idx = settings
        .name_columns
        .iter()
        .find_map(|c| table.column_index(c))
        .ok_or_else(|| TableError::MissingColumns {
            table: label.to_string(),
            missing: settings.name_columns.clone(),
            available: table.headers().to_vec(),
        })?;

    table.set_column(&settings.key_column, |row| normalize(&row[name_idx]));
    Ok(())
}

/// Prepare a raw ranking export: dots for decimal commas, a `Rank<year>`
/// column for every year column, and the normalized key column.
pub fn prepare_ranking(table: &mut Table, settings: &JoinSettings) -> Result<(), TableError> {
    table.map_cells(|cell| cell.replace(',', "."));

    let year_columns: Vec<(usize, String)> = table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| h.len() == 4 && h.chars().all(|c| c.is_ascii_digit()))
        .map(|(i, h)| (i, format!("Rank{}", h)))
        .collect();

    for (idx, rank_column) in year_columns {
        table.set_column(&rank_column, |row| {
            convert_rank(&row[idx]).map(|r| r.to_string()).unwrap_or_default()
        });
    }

    add_key_column(table, "ranking", settings)
}

/// Per-row join key: the key column lowercased and trimmed.
/// A table without the key column fails fast; run `add_key_column` first.
fn join_keys(table: &Table, label: &str, settings: &JoinSettings) -> Result<(usize, Vec<String>), TableError> {
    let idx = table
        .column_index(&settings.key_column)
        .ok_or_else(|| TableError::MissingColumns {
            table: label.to_string(),
            missing: vec![settings.key_column.clone()],
            available: table.headers().to_vec(),
        })?;
    Ok((idx, table.rows().iter().map(|row| key_cell(&row[idx])).collect()))
}

fn rank_value(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
        .or_else(|| convert_rank(cell))
}

fn compare_ranks(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One ranking row per key. With a rank column the smallest rank wins and
/// equal ranks keep the earlier row; without one the first row wins.
/// Returns the kept row indices in rank order.
fn dedup_ranking(ranking: &Table, keys: &[String], settings: &JoinSettings) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ranking.len()).collect();

    if let Some(rank_idx) = ranking.column_index(&settings.rank_column) {
        let ranks: Vec<Option<f64>> = ranking.rows().iter().map(|row| rank_value(&row[rank_idx])).collect();
        order.sort_by(|&a, &b| compare_ranks(ranks[a], ranks[b]));
    }

    let mut seen = HashSet::new();
    order.into_iter().filter(|&i| seen.insert(keys[i].as_str())).collect()
}

struct JoinPlan {
    headers: Vec<String>,
    ranking_columns: Vec<usize>,
}

/// Admissions columns, then every ranking column except the key.
/// Clashing names get `_x` / `_y` suffixes.
fn plan_columns(admissions: &Table, ranking: &Table, ranking_key_idx: usize) -> JoinPlan {
    let mut left = admissions.headers().to_vec();
    let ranking_columns: Vec<usize> = (0..ranking.headers().len()).filter(|&i| i != ranking_key_idx).collect();

    let mut right = Vec::new();
    for &i in &ranking_columns {
        let name = &ranking.headers()[i];
        match left.iter().position(|l| l == name) {
            Some(pos) => {
                left[pos] = format!("{}_x", name);
                right.push(format!("{}_y", name));
            }
            None => right.push(name.clone()),
        }
    }

    left.extend(right);
    JoinPlan {
        headers: left,
        ranking_columns,
    }
}

struct Joined {
    table: Table,
    unmatched: Unmatched,
}

fn join(admissions: &Table, ranking: &Table, settings: &JoinSettings, keep_unmatched: bool) -> Result<Joined, TableError> {
    let (key_idx, admission_keys) = join_keys(admissions, "admissions", settings)?;
    let (ranking_key_idx, ranking_keys) = join_keys(ranking, "ranking", settings)?;

    let kept = dedup_ranking(ranking, &ranking_keys, settings);
    let by_key: HashMap<&str, usize> = kept.iter().map(|&i| (ranking_keys[i].as_str(), i)).collect();
    debug!(ranking_rows = ranking.len(), distinct = kept.len(), "deduplicated ranking table");

    let plan = plan_columns(admissions, ranking, ranking_key_idx);
    let mut rows = Vec::new();
    let mut unmatched = Unmatched::default();
    let mut seen_unmatched = HashSet::new();
    let mut matched_keys = HashSet::new();

    for (row, key) in admissions.rows().iter().zip(&admission_keys) {
        // Blank keys never match
        let partner = if key.is_empty() { None } else { by_key.get(key.as_str()).copied() };

        let mut out = row.clone();
        out[key_idx] = key.clone();

        match partner {
            Some(r) => {
                matched_keys.insert(key.as_str());
                out.extend(plan.ranking_columns.iter().map(|&c| ranking.rows()[r][c].clone()));
            }
            None => {
                if seen_unmatched.insert(key.as_str()) {
                    unmatched.admissions.push(key.clone());
                }
                if !keep_unmatched {
                    continue;
                }
                out.extend(plan.ranking_columns.iter().map(|_| String::new()));
            }
        }
        rows.push(out);
    }

    unmatched.ranking = kept
        .iter()
        .map(|&i| &ranking_keys[i])
        .filter(|key| !matched_keys.contains(key.as_str()))
        .cloned()
        .collect();

    Ok(Joined {
        table: Table::new(plan.headers, rows),
        unmatched,
    })
}

/// Only admissions rows whose key exists in the ranking table
pub fn inner_join(admissions: &Table, ranking: &Table, settings: &JoinSettings) -> Result<Table, TableError> {
    let joined = join(admissions, ranking, settings, false)?;
    info!(
        admissions = admissions.len(),
        ranking = ranking.len(),
        matched = joined.table.len(),
        "inner join complete"
    );
    Ok(joined.table)
}

/// Every admissions row, with empty ranking cells where no key matched.
/// Unmatched keys from both sides are returned alongside.
pub fn left_join(admissions: &Table, ranking: &Table, settings: &JoinSettings) -> Result<(Table, Unmatched), TableError> {
    let joined = join(admissions, ranking, settings, true)?;
    info!(
        admissions = admissions.len(),
        ranking = ranking.len(),
        unmatched_admissions = joined.unmatched.admissions.len(),
        unmatched_ranking = joined.unmatched.ranking.len(),
        "left join complete"
    );
    Ok((joined.table, joined.unmatched))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect(),
        )
    }

    fn admissions() -> Table {
        table(
            &["university", "decision", "institution_clean"],
            &[
                &["MIT", "Accepted", "massachusetts institute of technology"],
                &["Stanford", "Rejected", "stanford university"],
                &["Nowhere", "Rejected", "nowhere college"],
                &["MIT", "Rejected", " Massachusetts Institute of Technology "],
            ],
        )
    }

    fn ranking() -> Table {
        table(
            &["Institution", "Rank2025", "institution_clean"],
            &[
                &["Stanford University", "6", "stanford university"],
                &["MIT (duplicate)", "12", "massachusetts institute of technology"],
                &["MIT", "1", "massachusetts institute of technology"],
                &["Oxford", "3", "university of oxford"],
            ],
        )
    }

    #[test]
    fn test_inner_join_keeps_lowest_rank_duplicate() {
        let joined = inner_join(&admissions(), &ranking(), &JoinSettings::default()).unwrap();

        assert_eq!(
            joined.headers(),
            vec!["university", "decision", "institution_clean", "Institution", "Rank2025"]
        );
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.rows()[0][3], "MIT");
        assert_eq!(joined.rows()[0][4], "1");
        assert_eq!(joined.rows()[1][4], "6");
        assert_eq!(joined.rows()[2][4], "1");
        assert_eq!(joined.rows()[2][2], "massachusetts institute of technology");
    }

    #[test]
    fn test_inner_join_row_count_is_bounded() {
        let admissions = admissions();
        let ranking = ranking();
        let joined = inner_join(&admissions, &ranking, &JoinSettings::default()).unwrap();

        let distinct_ranking: HashSet<String> = ranking.rows().iter().map(|r| key_cell(&r[2])).collect();
        let matchable = admissions
            .rows()
            .iter()
            .filter(|r| distinct_ranking.contains(&key_cell(&r[2])))
            .count();
        assert!(joined.len() <= admissions.len());
        assert_eq!(joined.len(), matchable);
    }

    #[test]
    fn test_rank_ties_keep_first_row() {
        let ranking = table(
            &["Institution", "Rank2025", "institution_clean"],
            &[&["First", "5", "same"], &["Second", "5", "same"], &["Third", "", "same"]],
        );
        let admissions = table(&["university", "institution_clean"], &[&["x", "same"]]);

        let joined = inner_join(&admissions, &ranking, &JoinSettings::default()).unwrap();
        assert_eq!(joined.rows()[0][2], "First");
    }

    #[test]
    fn test_non_numeric_ranks_sort_last() {
        let ranking = table(
            &["Institution", "Rank2025", "institution_clean"],
            &[&["Unranked", "n/a", "same"], &["Ranked", "40", "same"]],
        );
        let admissions = table(&["university", "institution_clean"], &[&["x", "same"]]);

        let joined = inner_join(&admissions, &ranking, &JoinSettings::default()).unwrap();
        assert_eq!(joined.rows()[0][2], "Ranked");
    }

    #[test]
    fn test_without_rank_column_first_row_wins() {
        let ranking = table(&["Institution", "institution_clean"], &[&["A", "k"], &["B", "k"]]);
        let admissions = table(&["university", "institution_clean"], &[&["x", "k"]]);

        let joined = inner_join(&admissions, &ranking, &JoinSettings::default()).unwrap();
        assert_eq!(joined.rows()[0][2], "A");
    }

    #[test]
    fn test_left_join_reports_unmatched() {
        let (joined, unmatched) = left_join(&admissions(), &ranking(), &JoinSettings::default()).unwrap();

        assert_eq!(joined.len(), 4);
        assert_eq!(joined.rows()[2], vec!["Nowhere", "Rejected", "nowhere college", "", ""]);
        assert_eq!(unmatched.admissions, vec!["nowhere college"]);
        assert_eq!(unmatched.ranking, vec!["university of oxford"]);
    }

    #[test]
    fn test_missing_key_column_fails_fast() {
        let admissions = table(&["program", "decision"], &[&["CS", "Accepted"]]);
        let err = inner_join(&admissions, &ranking(), &JoinSettings::default()).unwrap_err();

        match err {
            TableError::MissingColumns { table, missing, available } => {
                assert_eq!(table, "admissions");
                assert_eq!(missing, vec!["institution_clean"]);
                assert_eq!(available, vec!["program", "decision"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_name_column_without_key_column_fails_fast() {
        let admissions = table(&["university", "decision"], &[&["Stanford University", "Accepted"]]);
        let ranking = table(&["Institution", "Rank2025"], &[&["Stanford University", "6"]]);

        match inner_join(&admissions, &ranking, &JoinSettings::default()).unwrap_err() {
            TableError::MissingColumns { table, missing, available } => {
                assert_eq!(table, "admissions");
                assert_eq!(missing, vec!["institution_clean"]);
                assert_eq!(available, vec!["university", "decision"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let keyed = table(&["institution_clean"], &[&["stanford university"]]);
        assert!(matches!(
            left_join(&keyed, &ranking, &JoinSettings::default()),
            Err(TableError::MissingColumns { ref table, .. }) if table == "ranking"
        ));
    }

    #[test]
    fn test_join_after_adding_key_columns() {
        let settings = JoinSettings::default();
        let mut admissions = table(&["university", "decision"], &[&["Stanford University", "Accepted"]]);
        let mut ranking = table(&["Institution", "Rank2025"], &[&["Stanford  University.", "6"]]);
        add_key_column(&mut admissions, "admissions", &settings).unwrap();
        add_key_column(&mut ranking, "ranking", &settings).unwrap();

        let joined = inner_join(&admissions, &ranking, &settings).unwrap();
        assert_eq!(
            joined.headers(),
            vec!["university", "decision", "institution_clean", "Institution", "Rank2025"]
        );
        assert_eq!(joined.rows()[0][2], "stanford university");
        assert_eq!(joined.rows()[0][4], "6");
    }

    #[test]
    fn test_clashing_columns_get_suffixes() {
        let admissions = table(&["university", "Country", "institution_clean"], &[&["x", "US", "k"]]);
        let ranking = table(&["Country", "institution_clean"], &[&["United States", "k"]]);

        let joined = inner_join(&admissions, &ranking, &JoinSettings::default()).unwrap();
        assert_eq!(joined.headers(), vec!["university", "Country_x", "institution_clean", "Country_y"]);
        assert_eq!(joined.rows()[0], vec!["x", "US", "k", "United States"]);
    }

    #[test]
    fn test_blank_keys_never_match() {
        let admissions = table(&["university", "institution_clean"], &[&["x", ""]]);
        let ranking = table(&["Institution", "institution_clean"], &[&["A", ""]]);

        assert!(inner_join(&admissions, &ranking, &JoinSettings::default()).unwrap().is_empty());
    }

    #[test]
    fn test_prepare_ranking() {
        let mut raw = table(
            &["2025", "2024", "Institution", "Score"],
            &[&["=2", "201-250", "Imperial College London", "98,5"]],
        );

        prepare_ranking(&mut raw, &JoinSettings::default()).unwrap();
        assert_eq!(
            raw.headers(),
            vec!["2025", "2024", "Institution", "Score", "Rank2025", "Rank2024", "institution_clean"]
        );
        assert_eq!(raw.rows()[0][3], "98.5");
        assert_eq!(raw.rows()[0][4], "2");
        assert_eq!(raw.rows()[0][5], "225.5");
        assert_eq!(raw.rows()[0][6], "imperial college london");
    }

    #[test]
    fn test_add_key_column_needs_a_name_column() {
        let mut t = table(&["program"], &[&["CS"]]);
        assert!(matches!(
            add_key_column(&mut t, "admissions", &JoinSettings::default()),
            Err(TableError::MissingColumns { .. })
        ));
    }
}
