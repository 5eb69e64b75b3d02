//! Quiz and homework records passed between the gateway and the engine.

use std::path::Path;

use chrono::{DateTime, Utc};

/// An assignment as the instructor submitted it.
#[derive(Debug, Clone, Default)]
pub struct HomeworkUpload {
    pub title: String,
    pub due_date: Option<String>,
    pub description: Option<String>,
    pub attachment: Option<Attachment>,
}

/// A file sent along with an assignment.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// The student version of a generated assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedHomework {
    pub name: String,
    pub due_date: String,
    pub text: String,
}

/// File name an attachment is stored under: upload time in milliseconds,
/// then the last component of the sender's file name.
pub fn stored_file_name(uploaded_at: DateTime<Utc>, file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.starts_with('.'))
        .unwrap_or("homework");
    format!("{}-{base}", uploaded_at.timestamp_millis())
}
