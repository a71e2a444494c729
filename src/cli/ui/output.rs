use console::style;
use std::fmt::Display;

use crate::pipeline::{RunOutcome, StepId};

/// Styled terminal output for command handlers
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Indented `label: value` line
    pub fn field(&self, label: &str, value: impl Display) {
        println!("  {:<16} {}", style(format!("{}:", label)).dim(), value);
    }

    /// One pipeline step with a marker for done, next or pending
    pub fn step(&self, step: StepId, current: StepId) {
        let marker = if step < current {
            style("✓").green()
        } else if step == current {
            style("▶").cyan()
        } else {
            style("·").dim()
        };
        println!("  {} {}", marker, step.name());
    }

    pub fn outcome(&self, subject: &str, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed { report } => {
                self.success(&format!("{} complete, report at {}", subject, report.display()));
            }
            RunOutcome::Interrupted { resume_at } => {
                self.warning(&format!(
                    "{} interrupted before finishing {}; rerun with --resume",
                    subject,
                    resume_at.name()
                ));
            }
            RunOutcome::Failed { step, error } => {
                self.error(&format!("{} failed at {}: {}", subject, step.name(), error));
                self.info("State was saved; rerun with --resume after fixing the cause");
            }
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
