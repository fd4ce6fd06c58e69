//! Playback CLI

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use playback::config::Config;
use playback::logging;
use playback::playback::{PlaybackRequestMap, SERIALIZE_VERSION};
use playback::storage::{FileStore, RecordingReader};

#[derive(Debug, Parser)]
#[command(name = "playback", version)]
struct Cli {
    /// Path to config TOML. Defaults are used when omitted.
    #[arg(long, global = true, env = "PLAYBACK_CONFIG")]
    config: Option<PathBuf>,
    /// Override log level (trace, debug, info, warn, error, off).
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the matchers and responses stored in a recording file.
    Inspect {
        /// Recording file
        file: PathBuf,
    },
    /// Print where the recording of a test is stored.
    Path {
        /// Spec file the test lives in
        spec_file: PathBuf,
        /// Test title
        title: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => Config::default(),
    };
    logging::init(&config.logging, cli.log_level.as_deref())?;

    match cli.command {
        Command::Inspect { file } => inspect(&file),
        Command::Path { spec_file, title } => {
            let cwd = std::env::current_dir().context("resolve current directory")?;
            let store = FileStore::from_config(&config, cwd);
            let spec_file = spec_file.to_string_lossy();
            println!("{}", store.path_for(&spec_file, &title)?.display());
            Ok(())
        }
    }
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let reader = RecordingReader::open(file).with_context(|| format!("open {}", file.display()))?;
    let document = reader.document()?;

    let version = document.get("version").and_then(serde_json::Value::as_u64);
    println!("File:    {}", file.display());
    println!(
        "Bytes:   {} stored, {} JSON{}",
        reader.header().payload_len,
        reader.payload().len(),
        if reader.header().is_deflated() { " (deflated)" } else { "" }
    );
    match version {
        Some(v) => println!("Version: {v}"),
        None => println!("Version: none"),
    }
    if version != Some(u64::from(SERIALIZE_VERSION)) {
        anyhow::bail!("unsupported document version; this build reads version {SERIALIZE_VERSION}");
    }

    let map = PlaybackRequestMap::from_document(file.to_string_lossy().into_owned(), "inspect", document)?;
    println!("Matchers: {}", map.matchers().len());

    for matcher in map.matchers() {
        println!();
        println!("{} {}  [{}]", matcher.method(), matcher.matcher(), matcher.id());
        let mut flags = vec![format!("at least {}", matcher.at_least())];
        if matcher.any_once() {
            flags.push("any once".to_string());
        }
        if !matcher.ignores().is_empty() {
            flags.push(format!("ignores {}", serde_json::to_string(matcher.ignores())?));
        }
        println!("  {}", flags.join(", "));

        for collection in matcher.collections() {
            let statuses: Vec<String> = collection
                .responses()
                .iter()
                .map(|r| r.status_code().to_string())
                .collect();
            println!(
                "  {} {} response(s) [{}]  {}",
                collection.id(),
                collection.responses().len(),
                statuses.join(", "),
                collection.url()
            );
        }
    }

    Ok(())
}
