//! CSV export
//!
//! One row per bug in store order. Fields containing commas, quotes or line
//! breaks are quoted, with inner quotes doubled. Rows end in CRLF.

use crate::Bug;
use chrono::SecondsFormat;

pub const CONTENT_TYPE: &str = "text/csv";
pub const FILENAME: &str = "bugs.csv";

/// Column headers, in output order
pub const HEADERS: &[&str] = &["ID", "Title", "Status", "Priority", "Assigned To", "Created At"];

const LINE_END: &str = "\r\n";

/// Escape a CSV field value
pub fn escape_field(value: &str) -> String {
    let needs_quoting = value.contains(',')
        || value.contains('"')
        || value.contains('\n')
        || value.contains('\r');

    if needs_quoting {
        let escaped = value.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

/// Field values of one bug, in `HEADERS` order
pub fn row_values(bug: &Bug) -> [String; 6] {
    [
        bug.id.to_string(),
        bug.title.clone(),
        bug.status.to_string(),
        bug.priority.to_string(),
        bug.assignee_name().to_string(),
        bug.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    ]
}

/// Render bugs as a complete CSV document
pub fn render(bugs: &[Bug]) -> String {
    let mut out = HEADERS.join(",");
    for bug in bugs {
        out.push_str(LINE_END);
        let row: Vec<String> = row_values(bug).iter().map(|v| escape_field(v)).collect();
        out.push_str(&row.join(","));
    }
    out
}
