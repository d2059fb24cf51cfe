use std::fmt;

use services::{
    Clock, QuizQuestion, SessionCoordinator, SessionHistoryItem, SessionHistoryService,
    StatisticsService,
};
use storage::repository::{Storage, StorageError};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vocab_core::config::EngineConfig;
use vocab_core::model::{
    Collection, CollectionId, Direction, Interaction, ItemDraft, LearnerId,
};

const DEMO_WORDS: [(&str, &str, &str); 8] = [
    ("hola", "OH-lah", "hello"),
    ("gracias", "GRAH-syahs", "thank you"),
    ("gato", "GAH-toh", "cat"),
    ("perro", "PEH-rroh", "dog"),
    ("casa", "KAH-sah", "house"),
    ("libro", "LEE-broh", "book"),
    ("agua", "AH-gwah", "water"),
    ("manzana", "mahn-SAH-nah", "apple"),
];

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn parse_id(flag: &'static str, raw: String) -> Result<u64, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

struct Args {
    db_url: String,
    learner_id: LearnerId,
    collection_id: CollectionId,
    config_path: Option<String>,
    seed: Option<u64>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- demo    [options]  # seed a collection and run a session");
    eprintln!("  cargo run -p app -- stats   [options]  # print collection statistics");
    eprintln!("  cargo run -p app -- history [options]  # print recent sessions");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>        default sqlite:vocab.sqlite3");
    eprintln!("  --learner-id <id>        default 1");
    eprintln!("  --collection-id <id>     default 1");
    eprintln!("  --config <file.json>     engine configuration");
    eprintln!("  --seed <u64>             seed item selection and quiz shuffling");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  VOCAB_DB_URL, VOCAB_LEARNER_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Demo,
    Stats,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "demo" => Some(Self::Demo),
            "stats" => Some(Self::Stats),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("VOCAB_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("vocab.sqlite3".into()), normalize_sqlite_url);
        let mut learner_id = std::env::var("VOCAB_LEARNER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| LearnerId::new(1), LearnerId::new);
        let mut collection_id = CollectionId::new(1);
        let mut config_path = None;
        let mut seed = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--learner-id" => {
                    let value = require_value(args, "--learner-id")?;
                    learner_id = LearnerId::new(parse_id("--learner-id", value)?);
                }
                "--collection-id" => {
                    let value = require_value(args, "--collection-id")?;
                    collection_id = CollectionId::new(parse_id("--collection-id", value)?);
                }
                "--config" => config_path = Some(require_value(args, "--config")?),
                "--seed" => {
                    let value = require_value(args, "--seed")?;
                    seed = Some(parse_id("--seed", value)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            learner_id,
            collection_id,
            config_path,
            seed,
        })
    }

    fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config_path {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => EngineConfig::default(),
        };
        if self.seed.is_some() {
            config.selection.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
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

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut iter = argv.into_iter();

    let cmd = match iter.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let config = parsed.engine_config()?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    let clock = Clock::default();

    match cmd {
        Command::Demo => {
            ensure_demo_collection(&storage, &clock, parsed.learner_id, parsed.collection_id)
                .await?;
            let summary = run_demo_session(&storage, clock.clone(), config, &parsed).await?;
            print_json(&summary)?;
            let stats = StatisticsService::new(clock, &storage)
                .collection_stats(parsed.learner_id, parsed.collection_id)
                .await?;
            print_json(&stats)
        }
        Command::Stats => {
            let stats = StatisticsService::new(clock, &storage)
                .all_collection_stats(parsed.learner_id)
                .await?;
            print_json(&stats)
        }
        Command::History => {
            let history = SessionHistoryService::new(clock, storage.session_summaries.clone())
                .list_recent(parsed.learner_id, Some(parsed.collection_id), 30, 20)
                .await?;
            print_json(&history)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn ensure_demo_collection(
    storage: &Storage,
    clock: &Clock,
    learner_id: LearnerId,
    collection_id: CollectionId,
) -> Result<(), Box<dyn std::error::Error>> {
    match storage.collections.get_collection(collection_id).await {
        Ok(_) => return Ok(()),
        Err(StorageError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }

    let now = clock.now();
    let collection = Collection::new(
        collection_id,
        learner_id,
        "Spanish starter",
        Some("Demo collection".to_owned()),
        now,
    )?;
    storage.collections.upsert_collection(&collection).await?;
    for (prompt, aid, translation) in DEMO_WORDS {
        let item = ItemDraft::new(collection_id, prompt, aid, translation).validate(now)?;
        storage.items.insert_new_item(item).await?;
    }
    info!(%collection_id, items = DEMO_WORDS.len(), "demo collection created");
    Ok(())
}

/// Serve one batch, show each item, quiz it, and answer every third question wrong.
async fn run_demo_session(
    storage: &Storage,
    clock: Clock,
    config: EngineConfig,
    args: &Args,
) -> Result<SessionHistoryItem, Box<dyn std::error::Error>> {
    let coordinator = SessionCoordinator::new(clock, config, storage)?;
    let session_id = coordinator
        .open_session(args.learner_id, args.collection_id, Direction::PromptToTranslation)
        .await?;

    let batch = coordinator.serve_default_batch(session_id).await?;
    for (n, item) in batch.iter().enumerate() {
        coordinator
            .record_interaction(session_id, item.id(), Interaction::exposure(Some(4_000)))
            .await?;

        let question = coordinator.quiz_question(session_id, item.id()).await?;
        let response = demo_response(&question, n % 3 == 2);
        let result = coordinator
            .record_interaction(session_id, item.id(), question.to_interaction(&response, Some(2_500)))
            .await?;
        info!(
            item_id = %item.id(),
            prompt = item.prompt(),
            response = %response,
            stage = %result.record.mastery_stage(),
            difficulty = result.record.difficulty_score(),
            "answered"
        );
    }

    let summary = coordinator.close(session_id, None).await?;
    Ok(SessionHistoryItem::from_summary(&summary))
}

fn demo_response(question: &QuizQuestion, wrong: bool) -> String {
    if !wrong {
        return question.answer().to_owned();
    }
    question
        .options
        .iter()
        .find(|option| !question.is_correct(option))
        .cloned()
        .unwrap_or_else(|| "no idea".to_owned())
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

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
