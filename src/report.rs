// Run report and the human-readable reporter.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crossterm::style::Stylize;
use tracing::debug;

use crate::dataset::SplitName;
use crate::events::{RunEvent, RunObserver};
use crate::uploader::UploadOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStatus {
    Processed,
    /// Image directory absent; no outcomes.
    Missing,
}

/// Per-split counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub split: SplitName,
    pub status: SplitStatus,
    pub uploaded: usize,
    pub failed: usize,
}

impl SplitSummary {
    pub fn total(&self) -> usize {
        self.uploaded + self.failed
    }
}

/// All outcomes of a run, in processing order.
///
/// Only the orchestrator appends to it; once returned it is read-only.
#[derive(Debug, Clone, Default)]
pub struct Report {
    outcomes: Vec<UploadOutcome>,
    splits: Vec<SplitSummary>,
}

impl Report {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_missing(&mut self, split: SplitName) {
        self.splits.push(SplitSummary {
            split,
            status: SplitStatus::Missing,
            uploaded: 0,
            failed: 0,
        });
    }

    /// Append a finished split. Counts are taken from the complete outcome
    /// list, after every worker for the split is done.
    pub(crate) fn push_split(
        &mut self,
        split: SplitName,
        outcomes: Vec<UploadOutcome>,
    ) -> &SplitSummary {
        let uploaded = outcomes.iter().filter(|o| o.is_uploaded()).count();
        let failed = outcomes.len() - uploaded;
        self.outcomes.extend(outcomes);
        self.splits.push(SplitSummary {
            split,
            status: SplitStatus::Processed,
            uploaded,
            failed,
        });
        &self.splits[self.splits.len() - 1]
    }

    pub fn outcomes(&self) -> &[UploadOutcome] {
        &self.outcomes
    }

    pub fn splits(&self) -> &[SplitSummary] {
        &self.splits
    }

    pub fn split(&self, name: SplitName) -> Option<&SplitSummary> {
        self.splits.iter().find(|s| s.split == name)
    }

    pub fn uploaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_uploaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.uploaded()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Renders outcomes and summaries as text lines. Never touches the report.
pub struct Reporter<W> {
    out: Mutex<W>,
    color: bool,
}

impl<W: Write + Send> Reporter<W> {
    pub fn new(out: W) -> Self {
        Reporter {
            out: Mutex::new(out),
            color: false,
        }
    }

    /// Colorize status markers with ANSI escapes.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// One line describing an asset's final outcome.
    pub fn outcome_line(&self, outcome: &UploadOutcome) -> String {
        let name = outcome.asset.display_name();
        if outcome.is_uploaded() {
            let label = if outcome.asset.annotation_path.is_some() {
                "(+ label)"
            } else {
                "(image only)"
            };
            let mut line = format!("{} {name}  {label}", self.paint_ok("✅"));
            if outcome.attempts > 1 {
                line.push_str(&format!(" after {} attempts", outcome.attempts));
            }
            if let Some(receipt) = &outcome.receipt {
                if receipt.duplicate {
                    line.push_str(" [duplicate]");
                }
                if let Some(link) = &receipt.link {
                    line.push_str(&format!(" {link}"));
                }
            }
            line
        } else {
            format!(
                "{} {name}: {} ({} attempts)",
                self.paint_err("❌"),
                outcome.last_error.as_deref().unwrap_or("unknown error"),
                outcome.attempts
            )
        }
    }

    /// Summary lines: one per split, then the totals.
    pub fn summary_lines(&self, report: &Report) -> Vec<String> {
        let mut lines = vec!["=== Summary ===".to_string()];
        for s in report.splits() {
            lines.push(match s.status {
                SplitStatus::Missing => format!("{}: skipped (missing)", s.split),
                SplitStatus::Processed => {
                    format!("{}: {} uploaded, {} failed", s.split, s.uploaded, s.failed)
                }
            });
        }
        let failed = report.failed();
        let failed_text = if failed > 0 {
            self.paint_err(&failed.to_string())
        } else {
            failed.to_string()
        };
        lines.push(format!(
            "Total: {} uploaded, {failed_text} failed",
            report.uploaded()
        ));
        lines
    }

    pub fn write_outcome(&self, outcome: &UploadOutcome) {
        self.line(&self.outcome_line(outcome));
    }

    pub fn write_summary(&self, report: &Report) {
        self.line("");
        for l in self.summary_lines(report) {
            self.line(&l);
        }
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{text}") {
            debug!("failed to write report line: {e}");
        }
    }

    fn paint_ok(&self, s: &str) -> String {
        if self.color {
            s.green().to_string()
        } else {
            s.to_string()
        }
    }

    fn paint_err(&self, s: &str) -> String {
        if self.color {
            s.red().to_string()
        } else {
            s.to_string()
        }
    }
}

impl<W: Write + Send> RunObserver for Reporter<W> {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::SplitStarted { split, assets } => {
                self.line(&format!("\n=== Uploading {split} ({assets} images) ==="));
            }
            RunEvent::SplitMissing(missing) => {
                self.line(&format!("⚠️ {missing}"));
            }
            RunEvent::AssetFinished(outcome) => self.write_outcome(outcome),
            RunEvent::SplitFinished(_) => {}
        }
    }
}
