use std::fmt;

use chrono::NaiveDate;
use quiz_core::model::{Registration, Scope};
use quiz_core::stats::{ScopeStats, StatsView};
use services::{AppServices, Clock};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidDate { flag: &'static str, raw: String },
    InvalidScope { raw: String },
    InvalidQuestionId { raw: String },
    InvalidVerdict { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidDate { flag, raw } => {
                write!(f, "invalid {flag} value (expected YYYY-MM-DD): {raw}")
            }
            ArgsError::InvalidScope { raw } => write!(f, "unknown scope: {raw}"),
            ArgsError::InvalidQuestionId { raw } => write!(f, "invalid question id: {raw}"),
            ArgsError::InvalidVerdict { raw } => {
                write!(f, "expected `correct` or `wrong`, got: {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [options] [command]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  stats                                   Show progress statistics (default)");
    eprintln!("  answer <scope> <question-id> <correct|wrong>");
    eprintln!("  next <scope>                            Next question to practise");
    eprintln!("  reset <scope>                           Clear one scope's progress");
    eprintln!("  register <name> [--exam-date YYYY-MM-DD]");
    eprintln!("  migrate                                 Show the startup migration report");
    eprintln!();
    eprintln!("Scopes: basicLearning, lifeInsurance, propertyInsurance, casualtyInsurance,");
    eprintln!("        healthInsurance");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>      SQLite URL (default: sqlite://quiz.sqlite3)");
    eprintln!("  --today <YYYY-MM-DD>   Fixed date instead of the system clock");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_TODAY, QUIZ_LOG (tracing filter, default: info)");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Stats,
    Answer {
        scope: Scope,
        question_id: u32,
        is_correct: bool,
    },
    Next {
        scope: Scope,
    },
    Reset {
        scope: Scope,
    },
    Register {
        name: String,
        exam_date: Option<NaiveDate>,
    },
    Migrate,
}

struct Args {
    db_url: String,
    today: Option<NaiveDate>,
    command: Command,
}

fn parse_date(flag: &'static str, raw: String) -> Result<NaiveDate, ArgsError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ArgsError::InvalidDate { flag, raw })
}

fn parse_scope(raw: Option<String>) -> Result<Scope, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArgument { name: "scope" })?;
    raw.parse().map_err(|_| ArgsError::InvalidScope { raw })
}

impl Args {
    fn parse(argv: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url);
        let mut today = match std::env::var("QUIZ_TODAY") {
            Ok(raw) => Some(parse_date("QUIZ_TODAY", raw)?),
            Err(_) => None,
        };
        let mut exam_date = None;
        let mut positional = Vec::new();

        let mut args = argv;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--today" => {
                    let value = require_value(&mut args, "--today")?;
                    today = Some(parse_date("--today", value)?);
                }
                "--exam-date" => {
                    let value = require_value(&mut args, "--exam-date")?;
                    exam_date = Some(parse_date("--exam-date", value)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            None | Some("stats") => Command::Stats,
            Some("answer") => {
                let scope = parse_scope(positional.next())?;
                let raw_id = positional
                    .next()
                    .ok_or(ArgsError::MissingArgument { name: "question-id" })?;
                let question_id = raw_id
                    .parse()
                    .map_err(|_| ArgsError::InvalidQuestionId { raw: raw_id.clone() })?;
                let verdict = positional
                    .next()
                    .ok_or(ArgsError::MissingArgument { name: "correct|wrong" })?;
                let is_correct = match verdict.as_str() {
                    "correct" | "c" | "yes" => true,
                    "wrong" | "w" | "no" => false,
                    _ => return Err(ArgsError::InvalidVerdict { raw: verdict }),
                };
                Command::Answer {
                    scope,
                    question_id,
                    is_correct,
                }
            }
            Some("next") => Command::Next {
                scope: parse_scope(positional.next())?,
            },
            Some("reset") => Command::Reset {
                scope: parse_scope(positional.next())?,
            },
            Some("register") => Command::Register {
                name: positional
                    .next()
                    .ok_or(ArgsError::MissingArgument { name: "name" })?,
                exam_date,
            },
            Some("migrate") => Command::Migrate,
            Some(other) => return Err(ArgsError::UnknownCommand(other.to_string())),
        };

        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Self {
            db_url,
            today,
            command,
        })
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
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

fn init_logging() {
    let filter = EnvFilter::try_from_env("QUIZ_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_scope(label: &str, stats: &ScopeStats) -> String {
    let progress = stats
        .progress_percent
        .map(|p| format!(", {p}% through"))
        .unwrap_or_default();
    format!(
        "{label:<20} {correct}/{attempted} correct ({accuracy}%){progress}",
        correct = stats.correct,
        attempted = stats.attempted,
        accuracy = stats.accuracy,
    )
}

fn print_stats(view: &StatsView) {
    println!("{}", format_scope("overall", &view.overall));
    println!("{}", format_scope("today", &view.today));
    println!("{}", format_scope(Scope::BASIC_LEARNING, &view.basic));
    for category in &view.categories {
        println!("{}", format_scope(category.category.as_str(), &category.total));
    }
    match (view.outlook.predicted_score, view.outlook.pass_probability) {
        (Some(score), Some(probability)) => {
            println!("predicted score {score}%, pass probability {probability}%");
        }
        _ => println!("predicted score: answer more questions to unlock"),
    }
    if let Some(weakest) = view.weakest_category {
        println!("focus next: {weakest}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_logging();

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let clock = args.today.map_or_else(Clock::default_clock, Clock::fixed_on);
    let services = AppServices::new_sqlite(&args.db_url, clock).await?;
    info!(db = %args.db_url, fixed_date = clock.is_fixed(), "progress services ready");

    match args.command {
        Command::Stats => print_stats(&services.stats().await?),
        Command::Answer {
            scope,
            question_id,
            is_correct,
        } => {
            let outcome = services
                .tracker()
                .record_answer(scope, question_id, is_correct)
                .await?;
            if let Some(err) = &outcome.persist_error {
                eprintln!("warning: answer recorded for this session only ({err})");
            }
            let next = services.tracker().next_question(scope).await?;
            println!("recorded {scope} #{question_id}; next question: {next}");
        }
        Command::Next { scope } => {
            let next = services.tracker().next_question(scope).await?;
            println!("{next}");
        }
        Command::Reset { scope } => {
            services.tracker().reset_scope(scope).await?;
            println!("reset {scope}");
        }
        Command::Register { name, exam_date } => {
            let registration = Registration::new(name, exam_date)?;
            let record = services
                .transitions()
                .promote_to_registered(&registration)
                .await?;
            // Re-read to confirm the transition was committed.
            let stored = services.store().load().await?;
            if stored != record {
                return Err("registration did not persist; please retry".into());
            }
            println!(
                "registered {} (progress reset)",
                stored.user_info().display_name()
            );
        }
        Command::Migrate => match services.migration() {
            Some(report) if report.already_completed => {
                println!("migration already completed");
            }
            Some(report) => {
                println!("migration state: {:?}", report.state);
                println!("migrated: {}", report.migrated_keys.join(", "));
                println!("skipped (malformed): {}", report.skipped_keys.join(", "));
                println!("dropped categories: {}", report.dropped_categories.join(", "));
            }
            None => println!("migration failed; it will be retried on the next start"),
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::Category;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(args.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn parses_answer_command() {
        let args = parse(&["--db", "sqlite://x.db", "answer", "lifeInsurance", "12", "wrong"])
            .unwrap();
        assert_eq!(args.db_url, "sqlite://x.db");
        assert_eq!(
            args.command,
            Command::Answer {
                scope: Scope::Category(Category::Life),
                question_id: 12,
                is_correct: false,
            }
        );
    }

    #[test]
    fn register_takes_an_exam_date_flag() {
        let args = parse(&["register", "Aiko", "--exam-date", "2025-06-15"]).unwrap();
        assert_eq!(
            args.command,
            Command::Register {
                name: "Aiko".into(),
                exam_date: NaiveDate::from_ymd_opt(2025, 6, 15),
            }
        );
    }

    #[test]
    fn rejects_unknown_scopes_and_commands() {
        assert!(matches!(
            parse(&["next", "motor"]),
            Err(ArgsError::InvalidScope { .. })
        ));
        assert!(matches!(
            parse(&["launch"]),
            Err(ArgsError::UnknownCommand(_))
        ));
    }

    #[test]
    fn defaults_to_stats() {
        assert_eq!(parse(&[]).unwrap().command, Command::Stats);
    }
}
