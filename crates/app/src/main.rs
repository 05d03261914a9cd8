use std::collections::HashMap;
use std::fmt;

use lesson_core::model::LessonId;
use services::config::{ENV_CATALOG, ENV_DB_URL, ENV_STORE};
use services::{
    AdvanceOutcome, AppConfig, AppServices, Clock, LearnerSession, PersistHandle, StoreBackend,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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
    eprintln!("  cargo run -p app -- [--store <sqlite|memory|rest>] [--db <sqlite_url>] [--catalog <lessons.json>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --store sqlite");
    eprintln!("  --db sqlite://secured.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SECURED_STORE, SECURED_DB_URL, SECURED_CATALOG, SECURED_BCRYPT_COST,");
    eprintln!("  SECURED_REST_URL, SECURED_REST_KEY, SECURED_LOG (or RUST_LOG)");
}

/// Command-line values layered over the environment.
struct Overrides(HashMap<&'static str, String>);

impl Overrides {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut values = HashMap::new();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    values.insert(ENV_DB_URL, value);
                }
                "--store" => {
                    values.insert(ENV_STORE, require_value(args, "--store")?);
                }
                "--catalog" => {
                    values.insert(ENV_CATALOG, require_value(args, "--catalog")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(Self(values))
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:")
    {
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
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        // In-memory and `sqlite:file:` URLs need no file on disk.
        return Ok(());
    };
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

fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(services::config::DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_help() {
    println!("Commands:");
    println!("  signup <email> <password> <name...>");
    println!("  signin <email> <password>");
    println!("  signout");
    println!("  lessons            list lessons and your progress");
    println!("  open <lesson-id>   start a lesson");
    println!("  answer <n>         pick option n (1-based)");
    println!("  next               continue after the explanation");
    println!("  back               leave the current lesson");
    println!("  status             show score and streak");
    println!("  quit");
}

fn print_status(learner: &LearnerSession) {
    match learner.identity() {
        Some(who) => println!("Signed in as {} <{}>", who.display_name, who.email),
        None => println!("Not signed in"),
    }
    let ledger = learner.ledger();
    println!(
        "XP {} | streak {} | completed {}",
        ledger.score(),
        ledger.streak(),
        ledger.completed().len()
    );
}

fn print_lessons(learner: &LearnerSession) {
    for card in learner.lesson_cards() {
        let mark = if card.completed { "done" } else { "    " };
        println!("[{mark}] {:>2}. {} ({} XP)", card.id, card.title, card.points);
        println!("          {}", card.description);
    }
}

fn print_question(learner: &LearnerSession) {
    let quiz = learner.quiz();
    let (Some(lesson), Some(question), Some(progress)) =
        (quiz.lesson(), quiz.current_question(), quiz.progress())
    else {
        return;
    };

    println!();
    println!("{}", lesson.title());
    if quiz.shows_story() && !lesson.story().is_empty() {
        println!();
        println!("{}", lesson.story());
    }
    println!();
    println!("Question {} of {}", progress.number, progress.total);
    println!("{}", question.prompt());
    for (i, option) in question.options().iter().enumerate() {
        println!("  {}. {}", i + 1, option);
    }
}

/// Handle one input line. Returns `false` when the loop should stop.
async fn dispatch(
    learner: &mut LearnerSession,
    pending: &mut Vec<PersistHandle>,
    line: &str,
) -> bool {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return true;
    };
    let rest: Vec<&str> = words.collect();

    match (command, rest.as_slice()) {
        ("quit" | "exit", _) => return false,
        ("help", _) => print_help(),
        ("status", _) => print_status(learner),
        ("lessons", _) => print_lessons(learner),
        ("signup", [email, password, name @ ..]) => {
            match learner.sign_up(email, password, &name.join(" ")).await {
                Ok(_) => print_status(learner),
                Err(err) => println!("{err}"),
            }
        }
        ("signin", [email, password]) => match learner.sign_in(email, password).await {
            Ok(_) => print_status(learner),
            Err(err) => println!("{err}"),
        },
        ("signout", _) => {
            learner.sign_out().await;
            println!("Signed out");
        }
        ("open", [raw]) => match raw.parse::<u64>() {
            Ok(id) => match learner.open_lesson(LessonId::new(id)) {
                Ok(_) => print_question(learner),
                Err(err) => println!("{err}"),
            },
            Err(_) => println!("lesson id must be a number"),
        },
        ("answer", [raw]) => match raw.parse::<usize>() {
            Ok(n) if n >= 1 => match learner.select_answer(n - 1) {
                Ok(outcome) => {
                    if outcome.is_correct() {
                        println!("Correct!");
                    } else {
                        println!("Not quite. The answer was {}.", outcome.correct + 1);
                    }
                    if let Some(question) = learner.current_question() {
                        println!("{}", question.explanation());
                    }
                }
                Err(err) => println!("{err}"),
            },
            _ => println!("option must be a number starting at 1"),
        },
        ("next", _) => match learner.advance() {
            Ok(AdvanceOutcome::Next { .. }) => print_question(learner),
            Ok(AdvanceOutcome::Completed { event, persist }) => {
                println!("Lesson complete! +{} XP", event.points);
                print_status(learner);
                pending.extend(persist);
            }
            Err(err) => println!("{err}"),
        },
        ("back", _) => {
            if learner.exit_lesson() {
                println!("Left the lesson");
            }
        }
        _ => println!("unknown command; type `help`"),
    }
    true
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let overrides = Overrides::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = AppConfig::from_lookup(|key| overrides.lookup(key))?;
    init_tracing(&config.log_filter);

    // Keep file handling in the binary glue so services stay storage-agnostic.
    if let StoreBackend::Sqlite { url } = &mut config.store {
        *url = normalize_sqlite_url(std::mem::take(url));
        prepare_sqlite_file(url)?;
    }

    let services = AppServices::build(&config, Clock::system()).await?;
    let mut learner = services.learner_session();
    learner.restore_session().await;

    println!("Secured: financial literacy lessons. Type `help` for commands.");
    let mut pending = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !dispatch(&mut learner, &mut pending, line.trim()).await {
            break;
        }
    }

    // Let background progress writes land before exiting.
    for handle in pending {
        let outcome = handle.join().await;
        if !outcome.is_complete() {
            tracing::warn!(?outcome, "progress was not fully saved");
        }
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
