//! Writes legacy-shaped blobs into a key-value database so a startup
//! migration can be exercised by hand.

use std::fmt;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    today: Option<NaiveDate>,
    malformed: bool,
    with_identity: bool,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidToday { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidToday { raw } => {
                write!(f, "invalid --today value (expected YYYY-MM-DD): {raw}")
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:quiz.sqlite3".into());
        let mut today = None;
        let mut malformed = false;
        let mut with_identity = true;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--today" => {
                    let value = require_value(&mut args, "--today")?;
                    let parsed = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .map_err(|_| ArgsError::InvalidToday { raw: value.clone() })?;
                    today = Some(parsed);
                }
                "--malformed" => malformed = true,
                "--no-identity" => with_identity = false,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            today,
            malformed,
            with_identity,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quiz.sqlite3)");
    eprintln!("  --today <YYYY-MM-DD>      Date used for the daily progress entries");
    eprintln!("  --malformed               Write an unparseable category statistics blob");
    eprintln!("  --no-identity             Skip the legacy user identity blob");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
    let yesterday = today - Duration::days(1);

    let category_stats = if args.malformed {
        "{\"categories\": [1, 2".to_string()
    } else {
        json!({
            "categories": {
                "category_1": { "solved": 42, "correct": 30, "accuracy": 12.5 },
                "cat2": { "solved": 18, "correct": 11 },
                "category_7": { "solved": 5, "correct": 5 }
            }
        })
        .to_string()
    };
    storage.kv.set("categoryStats", &category_stats).await?;

    let flat = json!({
        "total_questions_attempted": 120,
        "total_correct_answers": 87,
        "daily_progress": {
            (yesterday.format("%Y-%m-%d").to_string()): { "attempted": 15, "correct": 9 },
            (today.format("%Y-%m-%d").to_string()): { "attempted": 4, "correct": 3 }
        }
    });
    storage.kv.set("userStatistics", &flat.to_string()).await?;

    let snake = json!({
        "basic_learning": { "last_question": 118, "total_attempted": 110, "total_correct": 80 },
        "categories": {
            "cat3": { "last_question": 12, "total_attempted": 12, "total_correct": 6 }
        }
    });
    storage.kv.set("learning_progress", &snake.to_string()).await?;

    if args.with_identity {
        let identity = json!({
            "name": "Sample Learner",
            "examDate": (today + Duration::days(60)).format("%Y-%m-%d").to_string(),
            "isRegistered": false,
            "isDemoMode": true,
            "registrationDate": null
        });
        storage.kv.set("userInfo", &identity.to_string()).await?;
    }

    println!(
        "Seeded legacy progress blobs into {} (malformed category stats: {})",
        args.db_url, args.malformed
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
