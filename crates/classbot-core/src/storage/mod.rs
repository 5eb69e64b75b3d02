//! Durable storage collaborator.
//!
//! The engine only sees [`Storage`]; [`SqliteStorage`] is the production
//! implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::outline::Outline;
use crate::{SlideRef, UserId};

mod migrations;
mod sqlite;

pub use sqlite::SqliteStorage;

/// Uploaded lecture material with its extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub id: i64,
    pub file_name: String,
    pub file_path: Option<String>,
    pub text: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub file_name: String,
    pub file_path: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSummary {
    pub name: String,
    pub slide_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// A generated quiz, answers included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    pub id: i64,
    pub name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// An assignment the instructor uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Homework {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file_path: Option<String>,
    pub due_date: Option<String>,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHomework {
    pub title: String,
    pub description: Option<String>,
    pub file_path: Option<String>,
    pub due_date: Option<String>,
    pub uploaded_by: UserId,
}

/// A generated assignment, solutions included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedHomework {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub due_date: String,
    pub created_at: DateTime<Utc>,
}

pub trait Storage: Send + Sync {
    fn save_material(&self, material: NewMaterial) -> BoxFuture<'_, Result<Material>>;

    /// All materials in upload order.
    fn list_materials(&self) -> BoxFuture<'_, Result<Vec<Material>>>;

    /// Stores a freshly generated (pending) outline.
    fn record_generated_outline(
        &self,
        name: String,
        text: String,
        source: Option<String>,
    ) -> BoxFuture<'_, Result<Outline>>;

    /// Moves a pending outline into the saved table under `name`.
    fn commit_outline(&self, id: i64, name: String) -> BoxFuture<'_, Result<Outline>>;

    fn save_outline(
        &self,
        name: String,
        text: String,
        source: Option<String>,
    ) -> BoxFuture<'_, Result<Outline>>;

    /// Most recently saved outline.
    fn latest_outline(&self) -> BoxFuture<'_, Result<Option<Outline>>>;

    /// Stores `slide` at `ordinal` in the folder, replacing what was there.
    fn save_slide(
        &self,
        owner: UserId,
        folder: String,
        ordinal: usize,
        slide: SlideRef,
    ) -> BoxFuture<'_, Result<()>>;

    /// Replaces the whole folder with `slides` in one transaction and
    /// returns the slides it held before. On error the folder is untouched.
    fn replace_folder(
        &self,
        owner: UserId,
        folder: String,
        slides: Vec<SlideRef>,
    ) -> BoxFuture<'_, Result<Vec<SlideRef>>>;

    /// Slides of the folder ordered by ordinal; empty when unknown.
    fn list_slides(&self, owner: UserId, folder: String) -> BoxFuture<'_, Result<Vec<SlideRef>>>;

    fn list_folders(&self, owner: UserId) -> BoxFuture<'_, Result<Vec<FolderSummary>>>;

    fn save_poll_text(&self, name: String, content: String) -> BoxFuture<'_, Result<i64>>;

    fn save_quiz(&self, name: String, text: String) -> BoxFuture<'_, Result<Quiz>>;

    /// Newest quiz stored under `name`.
    fn find_quiz(&self, name: String) -> BoxFuture<'_, Result<Option<Quiz>>>;

    fn save_homework(&self, homework: NewHomework) -> BoxFuture<'_, Result<Homework>>;

    /// Uploaded assignments, newest first.
    fn list_homework(&self) -> BoxFuture<'_, Result<Vec<Homework>>>;

    fn save_generated_homework(
        &self,
        name: String,
        content: String,
        due_date: String,
    ) -> BoxFuture<'_, Result<GeneratedHomework>>;

    /// Newest generated assignment stored under `name`.
    fn find_generated_homework(
        &self,
        name: String,
    ) -> BoxFuture<'_, Result<Option<GeneratedHomework>>>;
}
