use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{MetricsFilter, QbankId, QuestionId};
use services::{Clock, DEFAULT_TIME_LIMIT, LazyCatalog, QuizOptions, QuizServices};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod interactive;

const DEFAULT_DB_URL: &str = "sqlite://quiz.sqlite3";
const DEFAULT_CACHE_PATH: &str = "quiz-cache.json";
const DEFAULT_QUESTION_COUNT: usize = 10;
const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidValue(quiz_core::Error),
    MissingQuestionId,
    MissingBank,
    MissingCatalog,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidValue(err) => write!(f, "{err}"),
            ArgsError::MissingQuestionId => write!(f, "flag requires a question id"),
            ArgsError::MissingBank => write!(f, "quiz requires --bank <id>"),
            ArgsError::MissingCatalog => {
                write!(f, "no question catalog given (use --catalog or QUIZ_CATALOG)")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<quiz_core::Error> for ArgsError {
    fn from(err: quiz_core::Error) -> Self {
        ArgsError::InvalidValue(err)
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- summary");
    eprintln!("  cargo run -p app -- reset");
    eprintln!("  cargo run -p app -- flag <question-id> [--off]");
    eprintln!("  cargo run -p app -- history [--limit <n>]");
    eprintln!(
        "  cargo run -p app -- quiz --bank <id> [--count <n>] [--tutor] [--timer [<secs>]] [--filter <kind>]..."
    );
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --db <sqlite_url>     default {DEFAULT_DB_URL}");
    eprintln!("  --cache <path>        default {DEFAULT_CACHE_PATH}");
    eprintln!("  --catalog <path>      JSON manifest of question banks");
    eprintln!();
    eprintln!("Filters: unused, used, correct, incorrect, omitted, flagged");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_CACHE_PATH, QUIZ_CATALOG, RUST_LOG");
}

/// Where the stores and the catalog live.
struct Settings {
    db_url: String,
    cache_path: PathBuf,
    catalog_path: Option<PathBuf>,
}

impl Settings {
    fn from_env() -> Self {
        Self {
            db_url: std::env::var("QUIZ_DB_URL")
                .ok()
                .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url),
            cache_path: std::env::var_os("QUIZ_CACHE_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH), PathBuf::from),
            catalog_path: std::env::var_os("QUIZ_CATALOG").map(PathBuf::from),
        }
    }

    /// Consume a common flag. Returns `false` if `arg` is not one.
    fn apply_flag(
        &mut self,
        arg: &str,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<bool, ArgsError> {
        match arg {
            "--db" => {
                let value = require_value(args, "--db")?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidDbUrl { raw: value });
                }
                self.db_url = normalize_sqlite_url(value);
            }
            "--cache" => self.cache_path = require_value(args, "--cache")?.into(),
            "--catalog" => self.catalog_path = Some(require_value(args, "--catalog")?.into()),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[derive(Debug)]
enum Command {
    Summary,
    Reset,
    Flag {
        question_id: QuestionId,
        flagged: bool,
    },
    History {
        limit: u32,
    },
    Quiz {
        bank: QbankId,
        options: QuizOptions,
        filters: Vec<MetricsFilter>,
    },
}

struct Args {
    settings: Settings,
    command: Command,
}

impl Args {
    /// Returns `Ok(None)` when help was requested.
    fn parse(argv: Vec<String>) -> Result<Option<Self>, ArgsError> {
        let mut args = argv.into_iter().peekable();
        let Some(name) = args.next() else {
            return Ok(None);
        };

        let mut settings = Settings::from_env();
        let command = match name.as_str() {
            "--help" | "-h" | "help" => return Ok(None),
            "summary" | "reset" => {
                while let Some(arg) = args.next() {
                    if !settings.apply_flag(&arg, &mut args)? {
                        return Err(ArgsError::UnknownArg(arg));
                    }
                }
                if name == "summary" {
                    Command::Summary
                } else {
                    Command::Reset
                }
            }
            "flag" => {
                let mut question_id = None;
                let mut flagged = true;
                while let Some(arg) = args.next() {
                    if settings.apply_flag(&arg, &mut args)? {
                        continue;
                    }
                    match arg.as_str() {
                        "--off" => flagged = false,
                        _ if question_id.is_none() && !arg.starts_with("--") => {
                            question_id = Some(arg.parse::<QuestionId>().map_err(quiz_core::Error::from)?);
                        }
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Command::Flag {
                    question_id: question_id.ok_or(ArgsError::MissingQuestionId)?,
                    flagged,
                }
            }
            "history" => {
                let mut limit = DEFAULT_HISTORY_LIMIT;
                while let Some(arg) = args.next() {
                    if settings.apply_flag(&arg, &mut args)? {
                        continue;
                    }
                    match arg.as_str() {
                        "--limit" => {
                            limit = parse_number(require_value(&mut args, "--limit")?, "--limit")?;
                        }
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Command::History { limit }
            }
            "quiz" => {
                let mut bank = None;
                let mut options = QuizOptions::new(DEFAULT_QUESTION_COUNT);
                let mut filters = Vec::new();
                while let Some(arg) = args.next() {
                    if settings.apply_flag(&arg, &mut args)? {
                        continue;
                    }
                    match arg.as_str() {
                        "--bank" => bank = Some(QbankId::new(require_value(&mut args, "--bank")?)),
                        "--count" => {
                            options.question_count =
                                parse_number(require_value(&mut args, "--count")?, "--count")?;
                        }
                        "--tutor" => options.tutor_mode = true,
                        "--timer" => {
                            let explicit = args.next_if(|next| !next.starts_with("--"));
                            let limit = match explicit {
                                Some(raw) => Duration::from_secs(parse_number(raw, "--timer")?),
                                None => DEFAULT_TIME_LIMIT,
                            };
                            options.time_limit = Some(limit);
                        }
                        "--filter" => {
                            let filter = require_value(&mut args, "--filter")?
                                .parse::<MetricsFilter>()
                                .map_err(quiz_core::Error::from)?;
                            filters.push(filter);
                        }
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Command::Quiz {
                    bank: bank.ok_or(ArgsError::MissingBank)?,
                    options,
                    filters,
                }
            }
            _ => return Err(ArgsError::UnknownArg(name)),
        };

        Ok(Some(Self { settings, command }))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info,storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?
    else {
        print_usage();
        return Ok(());
    };

    let Settings {
        db_url,
        cache_path,
        catalog_path,
    } = args.settings;
    let catalog_path = catalog_path.ok_or(ArgsError::MissingCatalog)?;
    let catalog = Arc::new(LazyCatalog::from_manifest(&catalog_path).await?);
    tracing::info!(catalog = %catalog_path.display(), banks = catalog.len(), "catalog loaded");

    // Open + migrate SQLite at startup. Keep this in the binary glue so services stay pure.
    prepare_sqlite_file(&db_url)?;
    let services = QuizServices::new_sqlite(&db_url, &cache_path, catalog, Clock::system()).await?;
    let metrics = services.metrics();

    match args.command {
        Command::Summary => {
            let summary = metrics.summarize().await;
            println!("questions  {}", summary.total());
            println!("unused     {}", summary.unused);
            println!("used       {}", summary.used);
            println!("correct    {}", summary.correct);
            println!("incorrect  {}", summary.incorrect);
            println!("omitted    {}", summary.omitted);
            println!("flagged    {}", summary.flagged);
        }
        Command::Reset => {
            metrics.reset_all().await;
            println!("All questions marked unused. Flags kept.");
        }
        Command::Flag {
            question_id,
            flagged,
        } => {
            metrics.set_flag(question_id, flagged).await;
            let state = if flagged { "flagged" } else { "unflagged" };
            println!("Question {question_id} {state}.");
        }
        Command::History { limit } => {
            let records = services.history().list_history(limit).await?;
            if records.is_empty() {
                println!("No quizzes taken yet.");
            }
            for record in records {
                println!(
                    "{}  {:<16} {:>3}/{:<3} ({:.0}%)",
                    record.date.format("%Y-%m-%d %H:%M"),
                    record.qbank_id.as_str(),
                    record.score,
                    record.total_questions,
                    record.ratio() * 100.0
                );
            }
        }
        Command::Quiz {
            bank,
            options,
            filters,
        } => {
            interactive::run_quiz(&services, &bank, options, &filters).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>, ArgsError> {
        Args::parse(args.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn quiz_flags_parse() {
        let args = parse(&[
            "quiz", "--bank", "cardio", "--count", "5", "--tutor", "--timer", "--filter", "flagged",
        ])
        .unwrap()
        .unwrap();
        let Command::Quiz {
            bank,
            options,
            filters,
        } = args.command
        else {
            panic!("expected quiz command");
        };
        assert_eq!(bank, QbankId::new("cardio"));
        assert_eq!(options.question_count, 5);
        assert!(options.tutor_mode);
        assert_eq!(options.time_limit, Some(DEFAULT_TIME_LIMIT));
        assert_eq!(filters, vec![MetricsFilter::Flagged]);
    }

    #[test]
    fn timer_takes_optional_seconds() {
        let args = parse(&["quiz", "--bank", "b", "--timer", "15", "--catalog", "c.json"])
            .unwrap()
            .unwrap();
        let Command::Quiz { options, .. } = args.command else {
            panic!("expected quiz command");
        };
        assert_eq!(options.time_limit, Some(Duration::from_secs(15)));
        assert_eq!(args.settings.catalog_path, Some(PathBuf::from("c.json")));
    }

    #[test]
    fn flag_requires_an_id() {
        assert!(matches!(
            parse(&["flag", "--off"]),
            Err(ArgsError::MissingQuestionId)
        ));
        let args = parse(&["flag", "42", "--off"]).unwrap().unwrap();
        assert!(matches!(
            args.command,
            Command::Flag { flagged: false, .. }
        ));
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            parse(&["flag", "abc"]),
            Err(ArgsError::InvalidValue(quiz_core::Error::ParseId(_)))
        ));
        assert!(matches!(
            parse(&["quiz", "--bank", "b", "--filter", "hard"]),
            Err(ArgsError::InvalidValue(quiz_core::Error::Filter(_)))
        ));
        assert!(matches!(
            parse(&["quiz", "--bank", "b", "--count", "many"]),
            Err(ArgsError::InvalidNumber { flag: "--count", .. })
        ));
    }

    #[test]
    fn help_and_unknown() {
        assert!(parse(&[]).unwrap().is_none());
        assert!(parse(&["--help"]).unwrap().is_none());
        assert!(matches!(parse(&["bogus"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(parse(&["quiz"]), Err(ArgsError::MissingBank)));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/quiz.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/quiz.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
