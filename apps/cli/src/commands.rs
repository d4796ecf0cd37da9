//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use kbchat_core::{
    ChatReply, ChatSession, CorpusStore, GeminiClient, InstructionTemplate, NewDocument,
    ReplyOutcome,
};
use kbchat_ingest::{Corpus, load_corpus};
use kbchat_ranker::Ranker;
use kbchat_shared::{
    AppConfig, IngestMode, init_config, load_config, load_config_from, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbchat: answer questions from a personal travel-record corpus.
#[derive(Parser)]
#[command(
    name = "kbchat",
    version,
    about = "Chat over a corpus of blog posts and video transcripts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.kbchat/kbchat.toml).
    #[arg(long, global = true, env = "KBCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of source JSON files (overrides corpus.data_dir).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Fragment handling: merged or per-fragment (overrides corpus.ingest_mode).
    #[arg(long, global = true)]
    pub ingest_mode: Option<IngestMode>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load the corpus and report what was ingested and skipped.
    Ingest {
        /// Print statistics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rank the corpus for a query without calling the model.
    Search {
        /// Query text.
        query: String,

        /// Maximum number of results (overrides ranking.top_k).
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Ask a single question.
    Ask {
        /// Question text.
        message: String,
    },

    /// Start an interactive chat session.
    Chat,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbchat=info",
        1 => "kbchat=debug",
        _ => "kbchat=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&resolve_config(&cli)?),
        };
    }

    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Ingest { json } => cmd_ingest(&config, json),
        Command::Search { query, top_k } => cmd_search(&config, &query, top_k),
        Command::Ask { message } => cmd_ask(&config, &message).await,
        Command::Chat => cmd_chat(&config).await,
        Command::Config { .. } => Ok(()),
    }
}

/// Load the config file and apply CLI overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.corpus.data_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(mode) = cli.ingest_mode {
        config.corpus.ingest_mode = mode;
    }
    Ok(config)
}

fn load(config: &AppConfig) -> Result<Corpus> {
    let dir = Path::new(&config.corpus.data_dir);
    let corpus = load_corpus(dir, config.corpus.ingest_mode)?;
    if corpus.is_degraded() {
        eprintln!(
            "warning: no documents could be ingested from {} ({} file(s) skipped)",
            dir.display(),
            corpus.skipped().len()
        );
    }
    Ok(corpus)
}

fn new_session(config: &AppConfig) -> Result<ChatSession<GeminiClient>> {
    let client = GeminiClient::new(config.generation.clone())?;
    let template = InstructionTemplate::from_config(&config.generation)?;
    Ok(ChatSession::new(
        client,
        Ranker::new(&config.ranking),
        template,
    ))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_ingest(config: &AppConfig, json: bool) -> Result<()> {
    let corpus = load(config)?;
    let stats = corpus.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  Documents: {}", stats.documents);
    for (doc_type, count) in &stats.by_type {
        println!("    {doc_type:<10} {count}");
    }
    println!(
        "  Newest:    {}",
        stats
            .newest_date_code
            .map(kbchat_shared::format_date_code)
            .unwrap_or_else(|| "-".into())
    );
    println!("  Skipped:   {}", stats.skipped);
    for skip in corpus.skipped() {
        println!("    {skip}");
    }
    println!();
    Ok(())
}

fn cmd_search(config: &AppConfig, query: &str, top_k: Option<usize>) -> Result<()> {
    let corpus = load(config)?;
    let mut ranking = config.ranking.clone();
    if let Some(k) = top_k {
        if k == 0 {
            return Err(eyre!("--top-k must be at least 1"));
        }
        ranking.top_k = k;
    }

    let ranked = Ranker::new(&ranking).rank_scored(query, corpus.documents());
    info!(query, results = ranked.len(), "search complete");

    if ranked.is_empty() {
        println!("No matching documents.");
        return Ok(());
    }
    for (i, c) in ranked.iter().enumerate() {
        println!(
            "{:>2}. [{}] {} ({}, {})",
            i + 1,
            c.score,
            c.document.title,
            c.document.doc_type,
            c.document.recency_label()
        );
        if !c.document.url.is_empty() {
            println!("    {}", c.document.url);
        }
    }
    Ok(())
}

async fn cmd_ask(config: &AppConfig, message: &str) -> Result<()> {
    // Validate API key before doing anything
    validate_api_key(config)?;
    let corpus = load(config)?;
    let mut session = new_session(config)?;

    let spinner = spinner("Thinking...");
    let reply = session.send(&corpus, message).await;
    spinner.finish_and_clear();

    print_reply(&reply?);
    Ok(())
}

async fn cmd_chat(config: &AppConfig) -> Result<()> {
    let store = CorpusStore::new(load(config)?);
    let mut session = new_session(config)?;
    if let Err(e) = validate_api_key(config) {
        eprintln!("warning: {e} Questions will fail until it is set.");
    }

    println!(
        "kbchat: {} document(s) loaded. Type /help for commands.",
        store.snapshot().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match admin_command(&store, command) {
                AdminOutcome::Continue => continue,
                AdminOutcome::Reset => {
                    session.clear_history();
                    println!("History cleared.");
                    continue;
                }
                AdminOutcome::Quit => break,
            }
        }

        let snapshot = store.snapshot();
        let spinner = spinner("Thinking...");
        let reply = session.send(&snapshot, line).await;
        spinner.finish_and_clear();

        match reply {
            Ok(reply) => print_reply(&reply),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

enum AdminOutcome {
    Continue,
    Reset,
    Quit,
}

/// Handle a `/command` line in the chat loop.
fn admin_command(store: &CorpusStore, command: &str) -> AdminOutcome {
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));

    match name {
        "quit" | "exit" => return AdminOutcome::Quit,
        "reset" => return AdminOutcome::Reset,
        "help" => print_help(),
        "docs" => {
            let snapshot = store.snapshot();
            for doc in snapshot.documents() {
                println!(
                    "  {}  {} ({}, {})",
                    doc.id,
                    doc.title,
                    doc.doc_type,
                    doc.recency_label()
                );
            }
            println!("  {} document(s)", snapshot.len());
        }
        "skipped" => {
            let snapshot = store.snapshot();
            if snapshot.skipped().is_empty() {
                println!("  nothing skipped");
            }
            for skip in snapshot.skipped() {
                println!("  {skip}");
            }
        }
        "add" => match parse_add(rest) {
            Some(new) => match store.add(new) {
                Ok(doc) => println!("  added {} ({})", doc.title, doc.id),
                Err(e) => eprintln!("error: {e}"),
            },
            None => eprintln!("usage: /add <title> | <url> | <content> [| <type>]"),
        },
        "delete" => {
            if rest.is_empty() {
                eprintln!("usage: /delete <id>");
            } else {
                match store.delete(rest) {
                    Some(doc) => println!("  deleted {} ({})", doc.title, doc.id),
                    None => eprintln!("error: no document with id '{rest}'"),
                }
            }
        }
        other => eprintln!("unknown command '/{other}', try /help"),
    }
    AdminOutcome::Continue
}

/// Parse `title | url | content [| type]`.
fn parse_add(args: &str) -> Option<NewDocument> {
    let mut parts = args.splitn(4, '|').map(str::trim);
    let title = parts.next().filter(|s| !s.is_empty())?;
    let url = parts.next()?;
    let content = parts.next().filter(|s| !s.is_empty())?;
    let doc_type = parts.next().filter(|s| !s.is_empty());

    Some(NewDocument {
        title: title.to_string(),
        url: url.to_string(),
        content: content.to_string(),
        doc_type: doc_type.map(String::from),
    })
}

fn print_help() {
    println!("  /docs                                  list documents");
    println!("  /skipped                               list skipped sources");
    println!("  /add <title> | <url> | <content> [| <type>]");
    println!("  /delete <id>                           remove a document");
    println!("  /reset                                 clear conversation history");
    println!("  /quit                                  leave");
}

fn print_reply(reply: &ChatReply) {
    println!();
    println!("{}", reply.text);

    if reply.outcome == ReplyOutcome::Failed {
        println!();
        return;
    }
    if !reply.documents.is_empty() {
        println!();
        println!("  Records:");
        for doc in &reply.documents {
            println!("    - {} ({}) {}", doc.title, doc.recency_label(), doc.url);
        }
    }
    if !reply.grounding.is_empty() {
        println!();
        println!("  Web:");
        for source in &reply.grounding {
            match &source.title {
                Some(title) => println!("    - {title}: {}", source.uri),
                None => println!("    - {}", source.uri),
            }
        }
    }
    println!();
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
