//! Outline text and its segmentation into slide sections.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Heading marker at the start of a line: `A.`, `12.`, `b.` or a Roman
/// numeral such as `IV.`.
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:[A-Za-z0-9]{1,2}|[IVXLCDM]+)\.").expect("heading pattern is valid")
});

/// A generated lecture outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub id: i64,
    pub name: String,
    pub text: String,
    /// Upload the outline was generated from, when known.
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Whether the outline has been committed to the saved table.
    pub saved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading marker including its period (`"II."`); empty for preamble text.
    pub header: String,
    pub body: String,
}

impl Section {
    /// First body line, used as the slide heading.
    pub fn title(&self) -> &str {
        self.body.lines().next().unwrap_or_default().trim()
    }

    /// Body without its first line.
    pub fn details(&self) -> &str {
        self.body
            .split_once('\n')
            .map_or("", |(_, rest)| rest.trim())
    }
}

/// Splits outline text into sections at heading lines.
///
/// The heading marker stays with the section it introduces. Whitespace-only
/// chunks are dropped. Text without any heading yields a single section
/// holding the trimmed input, so the result is never empty.
pub fn segment(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut header = "";
    let mut body_start = 0;

    for heading in HEADING.find_iter(text) {
        push_section(&mut sections, header, &text[body_start..heading.start()]);
        header = heading.as_str();
        body_start = heading.end();
    }
    push_section(&mut sections, header, &text[body_start..]);

    if sections.is_empty() {
        sections.push(Section {
            header: String::new(),
            body: text.trim().to_string(),
        });
    }
    sections
}

fn push_section(sections: &mut Vec<Section>, header: &str, chunk: &str) {
    let body = chunk.trim();
    if header.is_empty() && body.is_empty() {
        return;
    }
    sections.push(Section {
        header: header.to_string(),
        body: body.to_string(),
    });
}
