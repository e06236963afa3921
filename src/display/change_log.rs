//! Change log display formatting

use crate::audit::{summarize_payload, ChangeLogEntry};
use crate::uow::CommitReport;

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Format change-log entries as a list, one line each
pub fn format_change_log_list(entries: &[ChangeLogEntry]) -> String {
    if entries.is_empty() {
        return "No changes recorded.\n".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:19}  {:6}  {:16}  {:36}  {}\n",
        "Timestamp", "Action", "Kind", "Row", "Changes"
    ));
    output.push_str(&"-".repeat(100));
    output.push('\n');

    for entry in entries {
        let summary = summarize_payload(&entry.changed_data).unwrap_or_default();
        output.push_str(&format!(
            "{:19}  {:6}  {:16}  {:36}  {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            truncate(&entry.entity_kind, 16),
            entry.row_id,
            truncate(&summary, 60)
        ));
    }

    output.push_str(&format!("\n{} entr{}\n", entries.len(), if entries.len() == 1 { "y" } else { "ies" }));
    output
}

/// Format one entry with its full payload
pub fn format_change_log_details(entry: &ChangeLogEntry) -> String {
    let mut output = String::new();

    output.push_str(&format!("Change:    {}\n", entry.id.to_key()));
    output.push_str(&format!(
        "Timestamp: {}\n",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    ));
    output.push_str(&format!("Action:    {}\n", entry.action));
    output.push_str(&format!("Kind:      {}\n", entry.entity_kind));
    output.push_str(&format!("Row:       {}\n", entry.row_id));
    output.push_str(&format!("Success:   {}\n", entry.success));
    output.push_str("Data:\n");

    let payload = serde_json::to_string_pretty(&entry.changed_data)
        .unwrap_or_else(|_| entry.changed_data.to_string());
    for line in payload.lines() {
        output.push_str(&format!("  {}\n", line));
    }

    output
}

/// One-line summary of what a commit wrote
pub fn format_commit_report(report: &CommitReport) -> String {
    if report.is_empty() {
        return "Nothing to commit.".to_string();
    }

    format!(
        "Committed: {} inserted, {} updated, {} deleted ({} change-log entr{})",
        report.inserted,
        report.updated,
        report.deleted,
        report.entries.len(),
        if report.entries.len() == 1 { "y" } else { "ies" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_empty_list() {
        assert_eq!(format_change_log_list(&[]), "No changes recorded.\n");
    }

    #[test]
    fn test_list_and_details() {
        let mut row = Row::new();
        row.insert("name".into(), json!("b"));
        let entry = ChangeLogEntry::update("customers", "abc", row, Utc::now());

        let list = format_change_log_list(std::slice::from_ref(&entry));
        assert!(list.contains("UPDATE"));
        assert!(list.contains("name: \"b\""));
        assert!(list.contains("1 entry"));

        let details = format_change_log_details(&entry);
        assert!(details.contains("Kind:      customers"));
        assert!(details.contains("\"name\": \"b\""));
    }

    #[test]
    fn test_commit_report() {
        assert_eq!(format_commit_report(&CommitReport::default()), "Nothing to commit.");

        let report = CommitReport {
            inserted: 2,
            ..CommitReport::default()
        };
        assert_eq!(
            format_commit_report(&report),
            "Committed: 2 inserted, 0 updated, 0 deleted (0 change-log entries)"
        );
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("short", 8), "short");
    }
}
