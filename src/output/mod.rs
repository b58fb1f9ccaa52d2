//! Output Layer
//!
//! Observers reacting to detector events: console feedback, audio cue,
//! clipboard, CSV files, preview snapshots and logging.

pub mod beep;
pub mod clipboard;
pub mod csv_file;
pub mod log;
pub mod preview;
pub mod stdout;

use anyhow::Result;

pub use beep::BeepObserver;
pub use clipboard::ClipboardObserver;
pub use csv_file::{pair_formats, CsvFileObserver, OutputFormat};
pub use log::LogObserver;
pub use preview::PreviewObserver;
pub use stdout::StdoutObserver;

use crate::analysis::Observer;
use crate::config::OutputSettings;

/// Create the observers enabled in `settings`, in dispatch order
pub fn build_observers(settings: &OutputSettings) -> Result<Vec<Box<dyn Observer>>> {
    let mut observers: Vec<Box<dyn Observer>> = vec![Box::new(LogObserver)];

    if settings.beep {
        observers.push(Box::new(BeepObserver::new(
            settings.beep_sound.as_deref(),
            settings.beep_volume,
        )?));
    }
    if settings.clipboard {
        observers.push(Box::new(ClipboardObserver::new()));
    }
    if let Some(path) = &settings.preview {
        observers.push(Box::new(PreviewObserver::new(path)));
    }
    for file in &settings.files {
        observers.push(Box::new(CsvFileObserver::create(&file.path, file.format)?));
    }
    if settings.verbosity > 0 {
        observers.push(Box::new(StdoutObserver::new(settings.verbosity)));
    }

    Ok(observers)
}
