//! Clipboard output
//!
//! Copies the detected card name using the platform's clipboard tool.

use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::analysis::{DetectionResult, Observer};

/// Clipboard command for the current platform
fn clipboard_command(wayland: bool) -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "windows") {
        ("clip", &[])
    } else if cfg!(target_os = "macos") {
        ("pbcopy", &[])
    } else if wayland {
        ("wl-copy", &[])
    } else {
        ("xclip", &["-selection", "clipboard"])
    }
}

/// Copies detected card names to the system clipboard
pub struct ClipboardObserver {
    program: &'static str,
    args: &'static [&'static str],
}

impl ClipboardObserver {
    pub fn new() -> Self {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        let (program, args) = clipboard_command(wayland);
        debug!("Clipboard tool: {} {}", program, args.join(" "));
        Self { program, args }
    }

    fn copy(&self, text: &str) -> std::io::Result<()> {
        let mut child = Command::new(self.program)
            .args(self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(std::io::Error::other(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

impl Default for ClipboardObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ClipboardObserver {
    fn name(&self) -> &str {
        "clipboard"
    }

    fn card_detected(&mut self, result: &DetectionResult) {
        if let Err(err) = self.copy(&result.card.name) {
            warn!("Failed to copy {:?} to clipboard: {}", result.card.name, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_clipboard_tool() {
        assert_eq!(clipboard_command(true).0, "wl-copy");
        assert_eq!(
            clipboard_command(false),
            ("xclip", &["-selection", "clipboard"][..])
        );
    }

    #[test]
    fn test_missing_tool_is_an_error() {
        let observer = ClipboardObserver {
            program: "definitely-not-a-clipboard-tool",
            args: &[],
        };
        assert!(observer.copy("Shock").is_err());
    }
}
