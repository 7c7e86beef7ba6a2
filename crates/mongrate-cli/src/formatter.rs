//! Output formatters for the status action.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use mongrate_core::status::HistoryEntry;
use mongrate_core::{Commit, StatusSnapshot};
use serde_json::json;

/// Number of commits listed by the status action.
pub const STATUS_COMMIT_LIMIT: usize = 20;

/// Output format for status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Everything the status action reports.
pub struct StatusView<'a> {
    pub repo: &'a str,
    pub migration_home: &'a str,
    pub database: &'a str,
    /// Where the status collection was read from.
    pub status_location: &'a str,
    pub commits: &'a [Commit],
    pub snapshot: &'a StatusSnapshot,
}

/// Render a status report.
pub fn format_status(view: &StatusView<'_>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_status_table(view),
        OutputFormat::Json => format_status_json(view),
    }
}

fn recorded(snapshot: &StatusSnapshot) -> Option<&str> {
    match snapshot {
        StatusSnapshot::Managed { commit, .. } => Some(commit.as_str()),
        StatusSnapshot::NotManaged => None,
    }
}

fn format_status_table(view: &StatusView<'_>) -> String {
    let mut out = String::new();
    out.push_str("Current git status\n------------------\n");
    out.push_str(&format!("git repo:       {}\n", view.repo));
    out.push_str(&format!("migration_home: {}\n", view.migration_home));
    out.push_str(&format_commits(view.commits, recorded(view.snapshot)));

    out.push_str("\n\nCurrent database status\n-----------------------\n");
    out.push_str(&format!("database: {}\n", view.database));
    out.push_str(&format!("status collection: {}\n", view.status_location));
    match view.snapshot {
        StatusSnapshot::NotManaged => out.push_str("status:   NOT MANAGED BY MONGRATE"),
        StatusSnapshot::Managed { commit, history } => {
            out.push_str(&format!("status:   managed, recorded commit {}\n", commit));
            out.push_str(&format_history(history));
        }
    }
    out
}

fn format_commits(commits: &[Commit], recorded: Option<&str>) -> String {
    let mut table = Table::new();
    table.set_header(vec!["#", "commit", "summary", ""]);

    for (index, commit) in commits.iter().take(STATUS_COMMIT_LIMIT).enumerate() {
        let marker = if Some(commit.id.as_str()) == recorded {
            "<- recorded"
        } else {
            ""
        };
        table.add_row(vec![
            Cell::new(index),
            Cell::new(&commit.id),
            Cell::new(&commit.summary),
            Cell::new(marker),
        ]);
    }

    let mut out = table.to_string();
    if commits.len() > STATUS_COMMIT_LIMIT {
        out.push_str(&format!(
            "\n... {} older commit(s)",
            commits.len() - STATUS_COMMIT_LIMIT
        ));
    }
    out
}

fn format_history(history: &[HistoryEntry]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["ts", "event", "detail"]);

    for entry in history {
        table.add_row(vec![
            Cell::new(entry.ts),
            Cell::new(&entry.event),
            Cell::new(entry.detail.to_string()),
        ]);
    }

    format!("{}\n{} history entr(ies)", table, history.len())
}

fn format_status_json(view: &StatusView<'_>) -> String {
    let database = match view.snapshot {
        StatusSnapshot::NotManaged => json!({ "status": "NOT MANAGED" }),
        StatusSnapshot::Managed { commit, history } => json!({
            "status": "MANAGED",
            "commit": commit,
            "history": history,
        }),
    };
    let commits: Vec<_> = view
        .commits
        .iter()
        .take(STATUS_COMMIT_LIMIT)
        .map(|c| json!({ "id": c.id, "summary": c.summary }))
        .collect();

    let value = json!({
        "git": {
            "repo": view.repo,
            "migration_home": view.migration_home,
            "commits": commits,
        },
        "database": {
            "url": view.database,
            "status_collection": view.status_location,
            "state": database,
        },
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}
