//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag.
//! When `--json` is enabled, results are printed as JSON on stdout and
//! nothing else is written there.

use std::fmt::Display;

use serde::Serialize;

use crate::core::conflict::ConflictReport;
use crate::core::model::{Commit, Content, ContentEntry, DiffEntry, Reference};
use crate::core::types::{CommitHash, ContentKey};

/// Characters of a hash shown in text output.
pub const SHORT_HASH: usize = 12;

/// How much lakeref writes besides results.
///
/// `--debug` does not change this; it raises the log level instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// `-q`: results only
    Quiet,
    #[default]
    Normal,
}

impl Verbosity {
    pub fn from_quiet(quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    pub fn is_quiet(self) -> bool {
        self == Verbosity::Quiet
    }
}

/// Status line on stdout, dropped under `-q`.
pub fn print(message: impl Display, verbosity: Verbosity) {
    if !verbosity.is_quiet() {
        println!("{message}");
    }
}

/// Failure line on stderr. Never suppressed.
pub fn error(message: impl Display) {
    eprintln!("{}", error_line(message));
}

fn error_line(message: impl Display) -> String {
    format!("error: {message}")
}

/// Warning on stderr, dropped under `-q`.
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if !verbosity.is_quiet() {
        eprintln!("{}", warning_line(message));
    }
}

fn warning_line(message: impl Display) -> String {
    format!("warning: {message}")
}

/// Supporting detail for a failure, on stderr, dropped under `-q`.
pub fn detail(message: impl Display, verbosity: Verbosity) {
    if !verbosity.is_quiet() {
        eprintln!("{message}");
    }
}

/// Print a value as pretty JSON.
pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format a reference as `kind name hash`.
pub fn format_reference(reference: &Reference) -> String {
    format!(
        "{:<6} {} {}",
        reference.kind().as_wire().to_lowercase(),
        reference.name(),
        reference.hash().short(SHORT_HASH)
    )
}

/// Format a commit as a one-line summary.
pub fn format_commit(commit: &Commit) -> String {
    let mut line = format!("{} {}", commit.hash.short(SHORT_HASH), commit.message());
    if let Some(author) = commit.author() {
        line.push_str(&format!(" ({})", author));
    }
    if commit.is_merge() {
        line.push_str(" [merge]");
    }
    line
}

/// Format a content listing row.
pub fn format_entry(entry: &ContentEntry) -> String {
    format!("{:<16} {}", entry.content_type, entry.key)
}

/// Format a diff row as `marker key`, e.g. `~ db.orders`.
pub fn format_diff(entry: &DiffEntry) -> String {
    let marker = entry.change().map_or('?', |c| c.symbol());
    format!("{} {}", marker, entry.key)
}

/// Format content as `key: json`.
pub fn format_content(key: &ContentKey, content: &Content) -> String {
    let body = serde_json::to_string(content).unwrap_or_else(|_| "<unprintable>".to_string());
    format!("{}: {}", key, body)
}

/// One indented line per item.
fn indented<T: Display>(items: &[T]) -> String {
    let lines: Vec<String> = items.iter().map(|item| format!("  {item}")).collect();
    lines.join("\n")
}

/// Format every conflict on its own line.
pub fn format_conflicts(report: &ConflictReport) -> String {
    indented(&report.conflicts)
}

/// Format hashes in short form, comma separated.
pub fn format_hashes(hashes: &[CommitHash]) -> String {
    hashes
        .iter()
        .map(|h| h.short(SHORT_HASH))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conflict::{RawConflict, RawConflictType};
    use crate::core::types::ReferenceName;

    #[test]
    fn only_quiet_and_normal() {
        assert!(Verbosity::from_quiet(true).is_quiet());
        assert_eq!(Verbosity::from_quiet(false), Verbosity::Normal);
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn stderr_prefixes() {
        assert_eq!(error_line("boom"), "error: boom");
        assert_eq!(warning_line("odd"), "warning: odd");
    }

    #[test]
    fn reference_line() {
        let main = Reference::branch(ReferenceName::main(), CommitHash::no_ancestor());
        assert_eq!(format_reference(&main), "branch main 2e1cfa82b035");
    }

    #[test]
    fn conflict_lines() {
        let key = ContentKey::new(["db", "t"]).unwrap();
        let report = ConflictReport::from_raw([RawConflict::new(
            RawConflictType::KeyExists,
            Some(key),
            "exists",
        )]);
        assert_eq!(format_conflicts(&report), "  db.t: key already exists (exists)");
    }

    #[test]
    fn diff_row_marks_change() {
        let entry = DiffEntry {
            key: ContentKey::new(["db", "orders"]).unwrap(),
            from: None,
            to: Some(Content::iceberg_table("s3://o", 1)),
        };
        assert_eq!(format_diff(&entry), "+ db.orders");
    }

    #[test]
    fn indents_each_item() {
        assert_eq!(indented(&["a", "b"]), "  a\n  b");
    }
}
