use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use gradcafe_analyzer::models::{Config, Decision};
use gradcafe_analyzer::ranking::{self, JoinSettings};
use gradcafe_analyzer::scraper::{write_raw_rows, SurveyScraper};
use gradcafe_analyzer::table::{ColumnMissing, Table};
use gradcafe_analyzer::{batches, records};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn path_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("FILE")
        .help(help)
        .value_parser(value_parser!(PathBuf))
}

fn cli() -> Command {
    Command::new("gradcafe-analyzer")
        .version("0.1")
        .about("Cleans GradCafe admission results and joins them with university rankings")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("scrape")
                .about("Fetch survey result pages into a raw batch CSV")
                .arg(
                    Arg::new("decision")
                        .long("decision")
                        .value_parser(["Accepted", "Rejected"])
                        .default_value("Accepted"),
                )
                .arg(Arg::new("start").long("start").value_parser(value_parser!(u32)))
                .arg(Arg::new("end").long("end").value_parser(value_parser!(u32)))
                .arg(path_arg("output", "Raw batch output file")),
        )
        .subcommand(
            Command::new("merge-batches")
                .about("Concatenate batch CSV files matching a glob pattern")
                .arg(Arg::new("pattern").long("pattern").required(true).help("Glob, e.g. 'rejected_batch_*.csv'"))
                .arg(path_arg("output", "Merged output file").required(true))
                .arg(
                    Arg::new("headers")
                        .long("headers")
                        .action(ArgAction::SetTrue)
                        .help("Treat the first line of every batch file as a header"),
                ),
        )
        .subcommand(
            Command::new("clean")
                .about("Pair decision rows with their metadata and write the clean table")
                .arg(path_arg("input", "Raw scrape file").required(true))
                .arg(path_arg("output", "Clean output file").required(true)),
        )
        .subcommand(
            Command::new("combine")
                .about("Stack the clean rejected table under the clean accepted table")
                .arg(path_arg("accepted", "Clean accepted file").required(true))
                .arg(path_arg("rejected", "Clean rejected file").required(true))
                .arg(path_arg("output", "Combined output file").required(true)),
        )
        .subcommand(
            Command::new("filter")
                .about("Drop records with missing fields or an out-of-range GPA")
                .arg(path_arg("input", "Clean admissions file").required(true))
                .arg(path_arg("output", "Filtered output file").required(true))
                .arg(Arg::new("gpa-scale").long("gpa-scale").value_parser(value_parser!(f64))),
        )
        .subcommand(
            Command::new("normalize-names")
                .about("Add the normalized institution key column to a table")
                .arg(path_arg("input", "Input table").required(true))
                .arg(path_arg("output", "Output table").required(true)),
        )
        .subcommand(
            Command::new("prepare-ranking")
                .about("Convert a raw ranking export: numeric ranks and the institution key")
                .arg(path_arg("input", "Raw ranking export").required(true))
                .arg(path_arg("output", "Prepared ranking table").required(true))
                .arg(
                    Arg::new("delimiter")
                        .long("delimiter")
                        .default_value(";")
                        .help("Field delimiter of the raw export"),
                ),
        )
        .subcommand(
            Command::new("missing-summary")
                .about("Report the missing count and percent of every column")
                .arg(path_arg("input", "Input table").required(true))
                .arg(path_arg("output", "Summary CSV output")),
        )
        .subcommand(
            Command::new("drop-missing-columns")
                .about("Drop columns whose missing fraction is above a threshold")
                .arg(path_arg("input", "Input table").required(true))
                .arg(path_arg("output", "Output table").required(true))
                .arg(
                    Arg::new("threshold")
                        .long("threshold")
                        .value_parser(value_parser!(f64))
                        .default_value("0")
                        .help("Missing fraction from 0 to 1; 0 drops any column with a missing cell"),
                ),
        )
        .subcommand(
            Command::new("select-columns")
                .about("Keep a fixed list of columns, failing if any is absent")
                .arg(path_arg("input", "Input table").required(true))
                .arg(path_arg("output", "Output table").required(true))
                .arg(
                    Arg::new("columns")
                        .long("columns")
                        .value_delimiter(',')
                        .num_args(1..)
                        .help("Columns to keep, comma separated (default: the slim ranking columns)"),
                ),
        )
        .subcommand(join_command("join-inner", "Keep only admissions rows with a ranking match"))
        .subcommand(
            join_command("join-left", "Keep every admissions row and report unmatched keys")
                .arg(path_arg("unmatched", "Unmatched key list output")),
        )
}

fn join_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(path_arg("admissions", "Admissions table").required(true))
        .arg(path_arg("ranking", "Ranking table").required(true))
        .arg(path_arg("output", "Joined output file").required(true))
}

fn required_path<'a>(matches: &'a ArgMatches, name: &str) -> &'a Path {
    matches
        .get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .expect("required by clap")
}

fn load_config(config_file: &str) -> Result<Config> {
    if Path::new(config_file).exists() {
        info!(path = config_file, "loading configuration");
        Config::load_from_file(config_file).with_context(|| format!("Failed to load config: {}", config_file))
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        println!("⚠️  Review {} for scrape and ranking settings.", config_file);
        Ok(default_config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let matches = cli().get_matches();
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");
    let config = load_config(config_file)?;

    match matches.subcommand() {
        Some(("scrape", sub)) => run_scrape(&config, sub).await,
        Some(("merge-batches", sub)) => {
            let pattern = sub.get_one::<String>("pattern").expect("required by clap");
            let output = required_path(sub, "output");
            let rows = batches::merge_batches(pattern, output, sub.get_flag("headers"))?;
            println!("✅ Merged {} rows → {}", rows, output.display());
            Ok(())
        }
        Some(("clean", sub)) => {
            let output = required_path(sub, "output");
            let count = records::clean_file(required_path(sub, "input"), output)?;
            println!("✅ Wrote {} admission records → {}", count, output.display());
            Ok(())
        }
        Some(("combine", sub)) => {
            let output = required_path(sub, "output");
            let summary = batches::combine_clean(
                required_path(sub, "accepted"),
                required_path(sub, "rejected"),
                output,
            )?;
            println!(
                "✅ {} accepted + {} rejected = {} rows → {}",
                summary.accepted_rows,
                summary.rejected_rows,
                summary.accepted_rows + summary.rejected_rows,
                output.display()
            );
            Ok(())
        }
        Some(("filter", sub)) => {
            let gpa_scale = sub.get_one::<f64>("gpa-scale").copied().unwrap_or(config.filter.gpa_scale);
            let output = required_path(sub, "output");
            let all = records::read_records(required_path(sub, "input"))?;
            let (kept, dropped) = records::retain_complete(all, gpa_scale);
            records::write_records(output, &kept)?;
            println!("✅ Dropped {} incomplete records. Remaining: {}", dropped, kept.len());
            Ok(())
        }
        Some(("normalize-names", sub)) => {
            let settings = JoinSettings::from(&config.ranking);
            let mut table = Table::from_path(required_path(sub, "input"))?;
            ranking::add_key_column(&mut table, "input", &settings)?;
            table.write(required_path(sub, "output"))?;
            println!("✅ {} added → {}", settings.key_column, required_path(sub, "output").display());
            Ok(())
        }
        Some(("prepare-ranking", sub)) => {
            let settings = JoinSettings::from(&config.ranking);
            let delimiter = sub
                .get_one::<String>("delimiter")
                .and_then(|d| d.bytes().next())
                .unwrap_or(b';');
            let mut table = Table::from_path_with_delimiter(required_path(sub, "input"), delimiter)?;
            ranking::prepare_ranking(&mut table, &settings)?;
            table.write(required_path(sub, "output"))?;
            println!("✅ Prepared {} ranking rows", table.len());
            Ok(())
        }
        Some(("missing-summary", sub)) => {
            let table = Table::from_path(required_path(sub, "input"))?;
            let summary = table.missing_summary();
            println!("=== Missing values ({} rows) ===", table.len());
            for column in &summary {
                println!("{:<40} {:>8} {:>8.2}%", column.column, column.missing_count, column.missing_percent);
            }
            if let Some(output) = sub.get_one::<PathBuf>("output") {
                ColumnMissing::to_table(&summary).write(output)?;
                println!("✅ Missing value summary → {}", output.display());
            }
            Ok(())
        }
        Some(("drop-missing-columns", sub)) => {
            let threshold = sub.get_one::<f64>("threshold").copied().unwrap_or(0.0);
            let mut table = Table::from_path(required_path(sub, "input"))?;
            let dropped = table.drop_missing_columns(threshold);
            table.write(required_path(sub, "output"))?;
            println!("Columns removed (missing > {}): {:?}", threshold, dropped);
            println!("✅ Kept {} columns → {}", table.headers().len(), required_path(sub, "output").display());
            Ok(())
        }
        Some(("select-columns", sub)) => {
            let columns: Vec<&str> = match sub.get_many::<String>("columns") {
                Some(values) => values.map(String::as_str).collect(),
                None => ranking::SLIM_COLUMNS.to_vec(),
            };
            let table = Table::from_path(required_path(sub, "input"))?;
            let selected = table.select("input", &columns)?;
            selected.write(required_path(sub, "output"))?;
            println!(
                "✅ Saved {} rows x {} columns → {}",
                selected.len(),
                selected.headers().len(),
                required_path(sub, "output").display()
            );
            Ok(())
        }
        Some(("join-inner", sub)) => {
            let settings = JoinSettings::from(&config.ranking);
            let (admissions, ranking_table) = load_join_inputs(sub)?;
            let joined = ranking::inner_join(&admissions, &ranking_table, &settings)?;
            joined.write(required_path(sub, "output"))?;
            println!("Admissions rows: {}", admissions.len());
            println!("Ranking rows: {}", ranking_table.len());
            println!("✅ Matched rows (inner join): {}", joined.len());
            Ok(())
        }
        Some(("join-left", sub)) => {
            let settings = JoinSettings::from(&config.ranking);
            let (admissions, ranking_table) = load_join_inputs(sub)?;
            let (joined, unmatched) = ranking::left_join(&admissions, &ranking_table, &settings)?;
            joined.write(required_path(sub, "output"))?;

            let unmatched_path = sub
                .get_one::<PathBuf>("unmatched")
                .cloned()
                .unwrap_or_else(|| Path::new(config.output_dir()).join("unmatched_institutions.csv"));
            if let Some(parent) = unmatched_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            unmatched.write(&unmatched_path)?;

            println!("✅ Joined rows (left join): {}", joined.len());
            println!(
                "⚠️  Unmatched: {} admissions keys, {} ranking keys → {}",
                unmatched.admissions.len(),
                unmatched.ranking.len(),
                unmatched_path.display()
            );
            Ok(())
        }
        _ => unreachable!("subcommand required by clap"),
    }
}

fn load_join_inputs(sub: &ArgMatches) -> Result<(Table, Table)> {
    let admissions_path = required_path(sub, "admissions");
    let ranking_path = required_path(sub, "ranking");
    let admissions = Table::from_path(admissions_path)
        .with_context(|| format!("Failed to read admissions table: {}", admissions_path.display()))?;
    let ranking_table = Table::from_path(ranking_path)
        .with_context(|| format!("Failed to read ranking table: {}", ranking_path.display()))?;
    Ok((admissions, ranking_table))
}

async fn run_scrape(config: &Config, sub: &ArgMatches) -> Result<()> {
    let decision = match sub.get_one::<String>("decision").map(String::as_str) {
        Some("Rejected") => Decision::Rejected,
        _ => Decision::Accepted,
    };
    let start = sub.get_one::<u32>("start").copied().unwrap_or(config.scrape.start_page);
    let end = sub.get_one::<u32>("end").copied().unwrap_or(config.scrape.end_page);

    let output = match sub.get_one::<PathBuf>("output") {
        Some(path) => path.clone(),
        None => {
            let output_dir = config.output_dir();
            fs::create_dir_all(output_dir)?;
            Path::new(output_dir).join(format!(
                "{}_batch_{}-{}.csv",
                decision.as_str().to_lowercase(),
                start,
                end
            ))
        }
    };

    println!("========== BATCH START: {} → {} ==========", start, end);
    let scraper = SurveyScraper::new(config.scrape.clone());
    let rows = scraper.scrape_pages(decision, start, end).await?;

    write_raw_rows(&output, &rows)?;
    println!("✅ Saved {} rows → {}", rows.len(), output.display());
    Ok(())
}
