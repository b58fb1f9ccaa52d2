//! CardScanner - Real-time trading card recognition
//!
//! Reads the name line of a card held in front of a webcam, matches it
//! against a card dictionary and reports each card once it is recognized.

mod analysis;
mod app;
mod capture;
mod config;
mod output;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::ScannerApp;
use crate::config::{AppConfig, OutputFile};
use crate::output::{pair_formats, OutputFormat};
use crate::storage::SqliteCatalog;

/// CardScanner - scan trading cards using OCR
#[derive(Parser, Debug)]
#[command(name = "card-scanner", version)]
#[command(about = "Scan trading cards with a webcam using OCR")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (defaults to config.toml in the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v: feedback, -vv: debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Card database
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Only use cards from this expansion (repeatable)
    #[arg(long = "expansion", global = true)]
    expansions: Vec<String>,

    /// Dictionary word list (.dic)
    #[arg(short, long, global = true)]
    dictionary: Option<PathBuf>,

    /// Beep when a card is detected
    #[arg(short, long)]
    beep: bool,

    /// Copy the card name to the clipboard
    #[arg(short, long)]
    clipboard: bool,

    /// Save detections to file(s)
    #[arg(short = 'o', long = "output-file", num_args = 1..)]
    output_files: Vec<PathBuf>,

    /// Format per output file, matched in order; the last one covers the rest
    #[arg(long = "output-format", value_enum, num_args = 1..)]
    output_formats: Vec<OutputFormat>,

    /// Write a preview of the capture to this PNG file
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Equal guesses needed, exclusive (8 means the 9th equal guess wins)
    #[arg(long)]
    min_suggestions: Option<u32>,

    /// Minimum length of a detected card name
    #[arg(long)]
    min_length: Option<usize>,

    /// Webcam number, device path or ffmpeg input
    #[arg(long)]
    webcam: Option<String>,

    /// Seconds to try guessing a card before starting over
    #[arg(long)]
    give_up_after: Option<f64>,

    /// Ignore reads with more candidate cards than this
    #[arg(long)]
    max_guesses: Option<usize>,

    /// Seconds to wait after a detection before reading again
    #[arg(long)]
    switch_time: Option<f64>,

    /// Replay images from a directory instead of using a webcam
    #[arg(long)]
    replay: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan cards (default)
    Scan,
    /// Import cards from a JSON list of {name, expansion, vendor_id}
    Import {
        /// JSON file
        file: PathBuf,
    },
    /// Write the dictionary for the cards in the database
    Dictionary,
    /// Print the effective configuration
    Config {
        /// Also save it as the default config file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = config::load_or_default(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    match &args.command {
        None | Some(Command::Scan) => scan(&config),
        Some(Command::Import { file }) => import(&config, file),
        Some(Command::Dictionary) => write_dictionary(&config),
        Some(Command::Config { write }) => show_config(&config, *write),
    }
}

/// Command line values take precedence over the config file
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(path) = &args.database {
        config.catalog.path = Some(path.clone());
    }
    if !args.expansions.is_empty() {
        config.catalog.expansions = args.expansions.clone();
    }
    if let Some(path) = &args.dictionary {
        config.dictionary.path = Some(path.clone());
    }

    if let Some(webcam) = &args.webcam {
        config.camera.device = webcam.clone();
    }
    if let Some(dir) = &args.replay {
        config.camera.replay_dir = Some(dir.clone());
    }

    let detector = &mut config.detector;
    if let Some(value) = args.min_suggestions {
        detector.min_suggestions = value;
    }
    if let Some(value) = args.min_length {
        detector.min_card_name = value;
    }
    if let Some(value) = args.give_up_after {
        detector.max_wait_secs = value;
    }
    if let Some(value) = args.max_guesses {
        detector.max_guesses = value;
    }
    if let Some(value) = args.switch_time {
        detector.switch_time_secs = value;
    }

    let output = &mut config.output;
    output.beep |= args.beep;
    output.clipboard |= args.clipboard;
    output.verbosity = output.verbosity.max(args.verbose);
    if let Some(path) = &args.preview {
        output.preview = Some(path.clone());
    }
    if !args.output_files.is_empty() {
        output.files = pair_formats(args.output_files.clone(), &args.output_formats)
            .into_iter()
            .map(|(path, format)| OutputFile { path, format })
            .collect();
    }
}

fn scan(config: &AppConfig) -> Result<()> {
    info!("CardScanner starting...");

    let observers = output::build_observers(&config.output)?;
    let mut app = ScannerApp::new(config, observers)?;

    let stop = app.stop_handle();
    if let Err(err) = ctrlc::set_handler(move || stop.stop()) {
        warn!("Failed to install Ctrl+C handler: {err}");
    }

    let stats = app.run()?;
    info!(
        "CardScanner finished: {} cards detected, {} not found, {} give-ups",
        stats.detections, stats.not_found, stats.give_ups
    );
    Ok(())
}

fn import(config: &AppConfig, file: &Path) -> Result<()> {
    let path = config.catalog.resolved_path()?;
    let mut catalog = SqliteCatalog::open(&path, &[])?;
    let inserted = catalog
        .import_json(file)
        .with_context(|| format!("Failed to import {:?}", file))?;

    println!(
        "Imported {} new cards into {} ({} cards total)",
        inserted,
        path.display(),
        catalog.len()
    );
    write_dictionary(config)
}

fn write_dictionary(config: &AppConfig) -> Result<()> {
    let catalog = SqliteCatalog::open(
        &config.catalog.resolved_path()?,
        &config.catalog.expansions,
    )?;
    let path = config.dictionary.resolved_path()?;
    let words = catalog.write_dictionary(&path)?;

    println!("Wrote {} words to {}", words, path.display());
    Ok(())
}

fn show_config(config: &AppConfig, write: bool) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);

    if write {
        let path = config::default_config_path()?;
        config::save_config(config, &path)?;
        println!("# saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "card-scanner",
            "-vv",
            "--beep",
            "-o",
            "a.csv",
            "b.csv",
            "--output-format",
            "debug_csv",
            "--min-suggestions",
            "4",
            "--webcam",
            "/dev/video2",
        ])
        .unwrap();

        assert_eq!(args.verbose, 2);
        assert!(args.beep);
        assert_eq!(args.output_files.len(), 2);
        assert_eq!(args.output_formats, vec![OutputFormat::DebugCsv]);
        assert!(args.command.is_none());

        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.detector.min_suggestions, 4);
        assert_eq!(config.camera.device, "/dev/video2");
        assert_eq!(config.output.verbosity, 2);
        assert!(config
            .output
            .files
            .iter()
            .all(|f| f.format == OutputFormat::DebugCsv));
    }

    #[test]
    fn test_import_subcommand() {
        let args = Args::try_parse_from(["card-scanner", "import", "cards.json", "--database", "x.sqlite"])
            .unwrap();
        assert!(matches!(args.command, Some(Command::Import { .. })));
        assert_eq!(args.database, Some(PathBuf::from("x.sqlite")));
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Args::try_parse_from(["card-scanner"]).unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.detector.min_suggestions, 8);
        assert!(!config.output.beep);
        assert!(config.output.files.is_empty());
    }
}
