//! Detection log files
//!
//! One CSV row per detected card. `deckbox_org_csv` can be imported on
//! deckbox.org as is; `debug_csv` records timings and vote counts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::analysis::{DetectionResult, Observer};

const DECKBOX_HEADER: [&str; 10] = [
    "Count",
    "Tradelist Count",
    "Name",
    "Foil",
    "Textless",
    "Promo",
    "Signed",
    "Edition",
    "Condition",
    "Language",
];

const DEBUG_HEADER: [&str; 5] = ["Name", "Slug", "Seconds", "Votes", "Candidates"];

/// Output file layout
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// deckbox.org inventory import
    #[default]
    #[value(name = "deckbox_org_csv")]
    DeckboxOrgCsv,
    /// Per-detection timing and votes
    #[value(name = "debug_csv")]
    DebugCsv,
}

impl OutputFormat {
    fn header(self) -> &'static [&'static str] {
        match self {
            Self::DeckboxOrgCsv => &DECKBOX_HEADER,
            Self::DebugCsv => &DEBUG_HEADER,
        }
    }

    fn row(self, result: &DetectionResult) -> Vec<String> {
        match self {
            Self::DeckboxOrgCsv => vec![
                "1".to_string(),
                "0".to_string(),
                result.card.name.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                "Near Mint".to_string(),
                "English".to_string(),
            ],
            Self::DebugCsv => vec![
                result.card.name.clone(),
                result.slug().to_string(),
                format!("{:.2}", result.elapsed.as_secs_f64()),
                result.tally.get(result.slug()).to_string(),
                result.tally.len().to_string(),
            ],
        }
    }
}

/// Pair each file with a format by position; the last format covers the rest
pub fn pair_formats(
    files: Vec<PathBuf>,
    formats: &[OutputFormat],
) -> Vec<(PathBuf, OutputFormat)> {
    let mut current = OutputFormat::default();
    files
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            if let Some(format) = formats.get(i) {
                current = *format;
            }
            (path, current)
        })
        .collect()
}

/// Quote a field when it contains a separator, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<W: Write>(out: &mut W, fields: &[impl AsRef<str>]) -> std::io::Result<()> {
    let line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{line}")?;
    out.flush()
}

/// Appends one row per detection to a CSV file
pub struct CsvFileObserver {
    path: PathBuf,
    format: OutputFormat,
    writer: BufWriter<File>,
    rows: usize,
}

impl CsvFileObserver {
    /// Create (truncate) `path` and write the header
    pub fn create(path: &Path, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {:?}", path))?;
        let mut writer = BufWriter::new(file);
        write_row(&mut writer, format.header())
            .with_context(|| format!("Failed to write header to {:?}", path))?;

        debug!("Writing {:?} rows to {:?}", format, path);
        Ok(Self {
            path: path.to_path_buf(),
            format,
            writer,
            rows: 0,
        })
    }
}

impl Observer for CsvFileObserver {
    fn name(&self) -> &str {
        "csv_file"
    }

    fn card_detected(&mut self, result: &DetectionResult) {
        let row = self.format.row(result);
        match write_row(&mut self.writer, row.as_slice()) {
            Ok(()) => self.rows += 1,
            Err(err) => warn!("Failed to write to {:?}: {}", self.path, err),
        }
    }

    fn detector_stopped(&mut self) {
        debug!("{} rows written to {:?}", self.rows, self.path);
    }
}
