//! Result list exports.

use crate::monitor::ResultItem;

/// Render results as CSV: a header line plus one row per item, every field
/// quoted with internal quotes doubled. None when the list is empty, so
/// callers can make exporting a no-op instead of writing a header-only file.
pub fn to_csv(items: &[ResultItem]) -> Option<String> {
    if items.is_empty() {
        return None;
    }

    let mut lines = Vec::with_capacity(items.len() + 1);
    lines.push("Title,URL,Source,Date,Description".to_string());

    for item in items {
        let date = item.date.to_rfc3339();
        let row = [
            item.title.as_str(),
            item.url.as_str(),
            item.source.as_str(),
            date.as_str(),
            item.description.as_str(),
        ]
        .iter()
        .map(|field| quote(field))
        .collect::<Vec<_>>()
        .join(",");
        lines.push(row);
    }

    Some(lines.join("\n"))
}

/// Newline-separated plain text block per item, for clipboard export.
pub fn to_plain_text(items: &[ResultItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "{}\n{}\n{}\n{}\n",
                item.title,
                item.url,
                item.description,
                item.date.to_rfc3339()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
