//! # Terminal Output
//!
//! Rendering of the end-of-run summary printed by the CLI. Colors and emoji
//! follow the `--color` flag and the usual environment conventions:
//!
//! - `--color=always|never|auto`
//! - `NO_COLOR` disables colors when set to anything
//! - `CLICOLOR=0` disables colors, `CLICOLOR_FORCE=1` forces them
//! - `TERM=dumb` disables colors
//!
//! Progress itself is not rendered here; it goes through the
//! [`ExecUi`](crate::ui::ExecUi) sink.

use std::env;
use std::fmt::Write;

use console::style;

use crate::phases::BatchResult;
use crate::task::TaskStatus;

/// Whether colored output and emoji are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag against the environment.
    ///
    /// `auto` (and anything unrecognized) probes the environment and the
    /// terminal behind stdout.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    /// The emoji when colors are on, the plain marker otherwise
    pub fn marker<'a>(&self, emoji: &'a str, plain: &'a str) -> &'a str {
        if self.use_color {
            emoji
        } else {
            plain
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

fn status_marker(config: &OutputConfig, status: TaskStatus) -> String {
    let (emoji, plain) = match status {
        TaskStatus::Succeeded => ("✅", "[OK]"),
        TaskStatus::CacheHit => ("📦", "[CACHED]"),
        TaskStatus::Failed => ("❌", "[FAILED]"),
        TaskStatus::Skipped => ("⏭️ ", "[SKIPPED]"),
        TaskStatus::Queued | TaskStatus::Running => ("⏳", "[PENDING]"),
    };
    let marker = config.marker(emoji, plain);
    if !config.use_color {
        return marker.to_string();
    }
    match status {
        TaskStatus::Failed => style(marker).red().to_string(),
        TaskStatus::Skipped => style(marker).yellow().to_string(),
        _ => style(marker).green().to_string(),
    }
}

/// Render the end-of-run summary: one line per task, then the totals and
/// whatever was published.
pub fn render_summary(config: &OutputConfig, result: &BatchResult) -> String {
    let mut out = String::new();

    for outcome in &result.outcomes {
        let _ = write!(out, "{} {}", status_marker(config, outcome.status), outcome.task.label());
        if outcome.has_changes() {
            let _ = write!(out, " ({} file(s) changed)", outcome.changes.len());
        }
        if let Some(error) = &outcome.error {
            let _ = write!(out, ": {}", error);
        }
        out.push('\n');
    }

    let repos = &result.repositories;
    if !repos.unsupported.is_empty() || !repos.ignored.is_empty() {
        let _ = writeln!(
            out,
            "{} Skipped {} unsupported and {} ignored repositories",
            config.marker("⚠️ ", "[WARN]"),
            repos.unsupported.len(),
            repos.ignored.len()
        );
    }

    let _ = writeln!(out, "\n{}", result.report);

    if result.changeset_specs.is_empty() {
        let _ = writeln!(out, "No changes produced.");
    } else {
        let _ = writeln!(
            out,
            "{} {} changeset spec(s) in namespace {}",
            config.marker("📝", "[SPECS]"),
            result.changeset_specs.len(),
            result.namespace
        );
    }
    if let Some(batch_spec) = &result.batch_spec {
        let _ = writeln!(out, "Preview: {}", batch_spec.preview_url);
    }
    if let Some(url) = &result.batch_change_url {
        let _ = writeln!(out, "{} Applied: {}", config.marker("🚀", "[APPLIED]"), url);
    }
    for path in &result.log_files {
        let _ = writeln!(out, "Log kept: {}", path.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::test_support::task;
    use crate::task::{ExecutionReport, TaskOutcome};
    use crate::upload::BatchSpecRef;

    const PLAIN: OutputConfig = OutputConfig { use_color: false };

    #[test]
    fn test_color_flag() {
        assert!(OutputConfig::from_env_and_flag("always").use_color);
        assert!(!OutputConfig::from_env_and_flag("never").use_color);
        assert!(OutputConfig::from_env_and_flag("ALWAYS").use_color);
    }

    #[test]
    fn test_marker() {
        assert_eq!(OutputConfig { use_color: true }.marker("📦", "[CACHED]"), "📦");
        assert_eq!(PLAIN.marker("📦", "[CACHED]"), "[CACHED]");
    }

    #[test]
    fn test_summary_without_changes() {
        let outcomes = vec![TaskOutcome::new(task("a", &["true"]), TaskStatus::Succeeded, vec![], 0)];
        let result = BatchResult {
            report: ExecutionReport::from_outcomes(&outcomes),
            outcomes,
            ..Default::default()
        };

        let summary = render_summary(&PLAIN, &result);
        assert!(summary.starts_with("[OK] a\n"));
        assert!(summary.contains("1 succeeded, 0 cached, 0 failed, 0 skipped"));
        assert!(summary.contains("No changes produced."));
    }

    #[test]
    fn test_summary_with_published_batch() {
        let result = BatchResult {
            namespace: "me".to_string(),
            outcomes: vec![TaskOutcome::skipped(task("b", &["true"]))],
            batch_spec: Some(BatchSpecRef {
                id: "batch-1".to_string(),
                namespace: "me".to_string(),
                name: "x".to_string(),
                preview_url: "https://example.test/preview".to_string(),
            }),
            batch_change_url: Some("https://example.test/x".to_string()),
            ..Default::default()
        };

        let summary = render_summary(&PLAIN, &result);
        assert!(summary.contains("[SKIPPED] b"));
        assert!(summary.contains("Preview: https://example.test/preview"));
        assert!(summary.contains("[APPLIED] Applied: https://example.test/x"));
    }
}
