//! Reply text for slides, polls and coursework.

use std::fmt::Write as _;

use classbot_core::coursework::ReleasedHomework;
use classbot_core::navigator::SlideView;
use classbot_core::poll::{QuestionView, TallyView, correct_answer};
use classbot_core::storage::{FolderSummary, Homework};
use classbot_core::symbols::{OPTION_SYMBOLS, option_label};

use crate::commands::usage_lines;

/// Telegram's limit for a single text message.
pub(crate) const MAX_MESSAGE_CHARS: usize = 4096;

pub(crate) fn help_text() -> String {
    let mut text = String::from(
        "Upload .txt or .md lecture notes, then use these commands:\n",
    );
    for (usage, description) in usage_lines() {
        let _ = write!(text, "\n{usage} - {description}");
    }
    text
}

pub(crate) fn slide_caption(view: &SlideView) -> String {
    format!("Slide {}/{}", view.index + 1, view.total)
}

pub(crate) fn question_text(view: &QuestionView) -> String {
    let mut text = format!("Question {}/{}\n{}\n", view.index + 1, view.total, view.prompt);
    for (index, option) in view.options.iter().enumerate() {
        let symbol = OPTION_SYMBOLS.get(index).copied().unwrap_or("");
        let label = option_label(index).unwrap_or('?');
        let _ = write!(text, "\n{symbol} {label}) {option}");
    }
    text
}

pub(crate) fn results_text(views: &[TallyView]) -> String {
    views
        .iter()
        .map(tally_text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn tally_text(view: &TallyView) -> String {
    let mut text = format!("Question {}: {}", view.index + 1, view.prompt);
    for (index, option) in view.options.iter().enumerate() {
        let label = option_label(index).unwrap_or('?');
        let _ = write!(
            text,
            "\n{label}) {option}: {} ({}%)",
            view.tally.count(index),
            view.tally.percentage(index)
        );
    }
    let _ = write!(
        text,
        "\nCorrect: {}\nVoters: {}",
        correct_answer(view),
        view.tally.total_voters
    );
    text
}

pub(crate) fn folders_text(folders: &[FolderSummary]) -> String {
    if folders.is_empty() {
        return "No saved folders yet. Use /saveslides <folder> during a presentation.".to_string();
    }
    let mut text = String::from("Saved folders:");
    for folder in folders {
        let _ = write!(
            text,
            "\n{} - {} slide(s), saved {}",
            folder.name,
            folder.slide_count,
            folder.saved_at.format("%Y-%m-%d %H:%M")
        );
    }
    text
}

pub(crate) fn homework_stored_text(homework: &Homework) -> String {
    let mut text = format!("Stored homework \"{}\"", homework.title);
    if let Some(due_date) = &homework.due_date {
        let _ = write!(text, ", due {due_date}");
    }
    if homework.file_path.is_some() {
        text.push_str(" with its file");
    }
    text.push('.');
    text
}

pub(crate) fn homework_list_text(homework: &[Homework]) -> String {
    if homework.is_empty() {
        return "No homework uploaded yet. Send a file captioned /homework upload <title>."
            .to_string();
    }
    let mut text = String::from("Homework:");
    for assignment in homework {
        let due = assignment.due_date.as_deref().unwrap_or("no due date");
        let _ = write!(text, "\n{} - due {due}", assignment.title);
        if let Some(description) = &assignment.description {
            let _ = write!(text, "\n  {description}");
        }
    }
    text
}

pub(crate) fn released_homework_text(homework: &ReleasedHomework) -> String {
    format!(
        "Homework: {}\nDue: {}\n\n{}",
        homework.name, homework.due_date, homework.text
    )
}

/// Splits `text` into chunks of at most [`MAX_MESSAGE_CHARS`] characters,
/// breaking on whitespace where possible.
pub(crate) fn split_message(text: &str) -> Vec<String> {
    split_at(text, MAX_MESSAGE_CHARS)
}

fn split_at(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();
    while rest.chars().count() > limit {
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(offset, _)| offset);
        let window = &rest[..hard_end];
        let end = window
            .rfind(char::is_whitespace)
            .filter(|offset| *offset > 0)
            .unwrap_or(hard_end);
        chunks.push(rest[..end].trim_end().to_string());
        rest = rest[end..].trim_start();
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
