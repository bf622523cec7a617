//! Progress reporting for batch runs.
//!
//! The batch driver reports through [`ProgressCallback`]; the CLI plugs in
//! an `indicatif` bar, tests use [`NoProgress`] or their own recorder.

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Errors only, no progress bar
    Quiet,
    /// Progress bar and summary
    #[default]
    Normal,
    /// Per-file messages
    Verbose,
    /// Per-channel and per-iteration detail
    VeryVerbose,
}

impl OutputMode {
    /// Create OutputMode from `-v` count and `-q`
    pub fn from_flags(verbosity: u8, quiet: bool) -> Self {
        if quiet {
            return OutputMode::Quiet;
        }
        match verbosity {
            0 => OutputMode::Normal,
            1 => OutputMode::Verbose,
            _ => OutputMode::VeryVerbose,
        }
    }

    /// Check if output should be shown at this mode
    pub fn should_show(&self, required: OutputMode) -> bool {
        use OutputMode::*;
        match (self, required) {
            (Quiet, _) => false,
            (Normal, Quiet | Normal) => true,
            (Verbose, Quiet | Normal | Verbose) => true,
            (VeryVerbose, _) => true,
            _ => false,
        }
    }

    /// Log level for the tracing subscriber
    pub fn log_level(&self) -> tracing::Level {
        match self {
            OutputMode::Quiet => tracing::Level::ERROR,
            OutputMode::Normal => tracing::Level::WARN,
            OutputMode::Verbose => tracing::Level::INFO,
            OutputMode::VeryVerbose => tracing::Level::DEBUG,
        }
    }
}

/// Batch progress events
pub trait ProgressCallback: Send + Sync {
    /// Batch is about to process `total` files
    fn on_start(&self, _total: usize) {}

    /// One file finished, successfully or not
    fn on_file_complete(&self, _path: &Path, _ok: bool) {}

    /// Batch finished
    fn on_finish(&self) {}
}

/// Progress sink that ignores everything
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

/// Terminal progress bar
#[derive(Debug)]
pub struct BatchProgress {
    bar: ProgressBar,
    mode: OutputMode,
}

impl BatchProgress {
    pub fn new(mode: OutputMode) -> Self {
        let bar = if mode.should_show(OutputMode::Normal) {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{msg:>10} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed}, eta {eta})",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message("Processing");
        Self { bar, mode }
    }
}

impl ProgressCallback for BatchProgress {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(200));
    }

    fn on_file_complete(&self, path: &Path, ok: bool) {
        if self.mode.should_show(OutputMode::Verbose) {
            let status = if ok { "Saved" } else { "Failed" };
            self.bar.println(format!("{}: {}", status, path.display()));
        }
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Outcome counts of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Processing Summary")?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "  Total files:  {}", self.total)?;
        writeln!(f, "  Succeeded:    {}", self.succeeded)?;
        writeln!(f, "  Errors:       {}", self.failed)?;
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_from_flags() {
        assert_eq!(OutputMode::from_flags(0, false), OutputMode::Normal);
        assert_eq!(OutputMode::from_flags(1, false), OutputMode::Verbose);
        assert_eq!(OutputMode::from_flags(2, false), OutputMode::VeryVerbose);
        assert_eq!(OutputMode::from_flags(9, false), OutputMode::VeryVerbose);
        assert_eq!(OutputMode::from_flags(3, true), OutputMode::Quiet);
    }

    #[test]
    fn test_output_mode_quiet() {
        let mode = OutputMode::Quiet;
        assert!(!mode.should_show(OutputMode::Quiet));
        assert!(!mode.should_show(OutputMode::Normal));
        assert!(!mode.should_show(OutputMode::Verbose));
    }

    #[test]
    fn test_output_mode_normal() {
        let mode = OutputMode::Normal;
        assert!(mode.should_show(OutputMode::Normal));
        assert!(!mode.should_show(OutputMode::Verbose));
        assert!(!mode.should_show(OutputMode::VeryVerbose));
    }

    #[test]
    fn test_output_mode_verbose() {
        let mode = OutputMode::Verbose;
        assert!(mode.should_show(OutputMode::Normal));
        assert!(mode.should_show(OutputMode::Verbose));
        assert!(!mode.should_show(OutputMode::VeryVerbose));
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(OutputMode::Quiet.log_level(), tracing::Level::ERROR);
        assert_eq!(OutputMode::default().log_level(), tracing::Level::WARN);
        assert_eq!(OutputMode::VeryVerbose.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_hidden_progress_counts() {
        let progress = BatchProgress::new(OutputMode::Quiet);
        progress.on_start(3);
        progress.on_file_complete(Path::new("a.png"), true);
        progress.on_file_complete(Path::new("b.png"), false);
        assert_eq!(progress.bar.position(), 2);
        assert_eq!(progress.bar.length(), Some(3));
        progress.on_finish();
    }

    #[test]
    fn test_summary_display() {
        let summary = BatchSummary {
            total: 3,
            succeeded: 2,
            failed: 1,
        };
        let text = summary.to_string();
        assert!(text.contains("Total files:  3"));
        assert!(text.contains("Succeeded:    2"));
        assert!(text.contains("Errors:       1"));
        assert!(summary.has_failures());
        assert!(!BatchSummary::default().has_failures());
    }
}
