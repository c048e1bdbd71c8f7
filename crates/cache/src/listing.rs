// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory listing rendering.
//!
//! Listings are rendered once at artifact construction and cached like
//! any other payload. Dot-files are excluded; entries are sorted by name
//! with directories first.

use std::path::Path;

use loft_core::format_size;
use loft_http::mime_for_path;

/// One listed child, classified for rendering.
struct Row {
    name: String,
    is_dir: bool,
    /// Icon token: `folder` or `file`.
    icon: &'static str,
    /// Human-readable type: a MIME string or `directory`.
    kind: &'static str,
    size: String,
}

/// Render the listing page for `dir`. `rel` is the root-relative request
/// path used for the page title (empty for the root itself).
pub fn render(dir: &Path, rel: &str) -> std::io::Result<Vec<u8>> {
    let mut rows = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let is_dir = meta.is_dir();
        rows.push(Row {
            icon: if is_dir { "folder" } else { "file" },
            kind: if is_dir {
                "directory"
            } else {
                mime_for_path(Path::new(&name))
            },
            size: format_size(meta.len()),
            is_dir,
            name,
        });
    }
    // Directories first, then by name
    rows.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then(a.name.cmp(&b.name)));

    Ok(render_page(rel, &rows).into_bytes())
}

fn render_page(rel: &str, rows: &[Row]) -> String {
    let title = if rel.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rel.trim_end_matches('/'))
    };
    let title = escape(&title);

    let mut html = String::with_capacity(1024 + rows.len() * 128);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<title>Index of ");
    html.push_str(&title);
    html.push_str("</title>\n<style>\nbody { font-family: sans-serif; margin: 2em; }\ntable { border-collapse: collapse; }\ntd, th { padding: 0.2em 1em; text-align: left; }\ntd.icon-folder::before { content: \"\\1F4C1 \"; }\ntd.icon-file::before { content: \"\\1F4C4 \"; }\n</style>\n</head>\n<body>\n<h1>Index of ");
    html.push_str(&title);
    html.push_str("</h1>\n<table>\n<tr><th></th><th>Name</th><th>Type</th><th>Size</th></tr>\n<tr><td></td><td><a href=\"..\">..</a></td><td>directory</td><td></td></tr>\n");

    for row in rows {
        let name = escape(&row.name);
        html.push_str("<tr><td class=\"icon-");
        html.push_str(row.icon);
        html.push_str("\"></td><td><a href=\"");
        html.push_str(&name);
        if row.is_dir {
            html.push('/');
        }
        html.push_str("\">");
        html.push_str(&name);
        html.push_str("</a></td><td>");
        html.push_str(row.kind);
        html.push_str("</td><td>");
        html.push_str(&row.size);
        html.push_str("</td></tr>\n");
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// Minimal HTML escaping for names that land in markup.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "listing_tests.rs"]
mod tests;
