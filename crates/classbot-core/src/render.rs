//! Slide rendering collaborator.
//!
//! [`SvgSlideRenderer`] writes one SVG file per slide under
//! `<output_dir>/<owner>/`. Rendering the same slide index again
//! overwrites the same file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::future::BoxFuture;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, context};
use serde::Serialize;

use crate::outline::Section;
use crate::{SlideRef, UserId};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const LINE_HEIGHT: u32 = 36;
const WRAP_COLUMNS: usize = 72;
const MAX_BODY_LINES: usize = 13;
const ARCHIVE_DIR: &str = "folders";

/// Data shown on the title slide and in slide footers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideMetadata {
    pub class_name: String,
    pub instructor: String,
    pub title: String,
    pub source: Option<String>,
    pub date: String,
}

pub trait SlideRenderer: Send + Sync {
    fn render_title_slide(&self, owner: UserId, metadata: &SlideMetadata)
    -> BoxFuture<'_, Result<SlideRef>>;

    fn render_slide(
        &self,
        owner: UserId,
        index: usize,
        section: &Section,
        metadata: &SlideMetadata,
    ) -> BoxFuture<'_, Result<SlideRef>>;

    /// Copies `slides` into a fresh directory under `folder`, so neither
    /// later renders nor later saves can overwrite them.
    fn archive_deck(
        &self,
        owner: UserId,
        folder: &str,
        slides: &[SlideRef],
    ) -> BoxFuture<'_, Result<Vec<SlideRef>>>;

    /// Deletes archived copies no folder points to any more. Slides outside
    /// the archive are left alone.
    fn discard(&self, slides: Vec<SlideRef>) -> BoxFuture<'_, Result<()>>;
}

pub struct SvgSlideRenderer {
    env: Environment<'static>,
    output_dir: PathBuf,
}

impl SvgSlideRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_template("title.svg", include_str!("../templates/title.svg.j2"))
            .context("invalid title slide template")?;
        env.add_template("section.svg", include_str!("../templates/section.svg.j2"))
            .context("invalid section slide template")?;
        Ok(Self {
            env,
            output_dir: output_dir.into(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render_to_string(&self, template: &str, ctx: minijinja::Value) -> Result<String> {
        self.env
            .get_template(template)?
            .render(ctx)
            .with_context(|| format!("failed to render {template}"))
    }

    fn archive_root(&self, owner: UserId) -> PathBuf {
        self.output_dir.join(owner.to_string()).join(ARCHIVE_DIR)
    }

    fn is_archived(&self, path: &Path) -> bool {
        path.strip_prefix(&self.output_dir)
            .ok()
            .and_then(|rest| rest.components().nth(1))
            .is_some_and(|component| component.as_os_str() == ARCHIVE_DIR)
    }

    fn slide_path(&self, owner: UserId, index: usize) -> PathBuf {
        self.output_dir
            .join(owner.to_string())
            .join(format!("slide_{index}.svg"))
    }
}

impl SlideRenderer for SvgSlideRenderer {
    fn render_title_slide(
        &self,
        owner: UserId,
        metadata: &SlideMetadata,
    ) -> BoxFuture<'_, Result<SlideRef>> {
        let rendered = self.render_to_string(
            "title.svg",
            context! {
                width => WIDTH,
                height => HEIGHT,
                title => metadata.title,
                class_name => metadata.class_name,
                instructor => metadata.instructor,
                source => metadata.source,
                date => metadata.date,
            },
        );
        let path = self.slide_path(owner, 0);
        Box::pin(write_slide(path, rendered))
    }

    fn render_slide(
        &self,
        owner: UserId,
        index: usize,
        section: &Section,
        metadata: &SlideMetadata,
    ) -> BoxFuture<'_, Result<SlideRef>> {
        let rendered = self.render_to_string(
            "section.svg",
            context! {
                width => WIDTH,
                height => HEIGHT,
                line_height => LINE_HEIGHT,
                header => section.header,
                title => section.title(),
                lines => wrap_text(section.details(), WRAP_COLUMNS, MAX_BODY_LINES),
                class_name => metadata.class_name,
                index => index,
            },
        );
        let path = self.slide_path(owner, index);
        Box::pin(write_slide(path, rendered))
    }

    fn archive_deck(
        &self,
        owner: UserId,
        folder: &str,
        slides: &[SlideRef],
    ) -> BoxFuture<'_, Result<Vec<SlideRef>>> {
        let folder_dir = self.archive_root(owner).join(folder_dir_name(folder));
        let sources: Vec<PathBuf> = slides.iter().map(|slide| slide.path().to_path_buf()).collect();
        Box::pin(async move {
            let deck_dir = create_deck_dir(&folder_dir).await?;
            let mut archived = Vec::with_capacity(sources.len());
            for (ordinal, from) in sources.iter().enumerate() {
                let to = deck_dir.join(format!("slide_{ordinal}.svg"));
                tokio::fs::copy(from, &to).await.with_context(|| {
                    format!("failed to copy {} to {}", from.display(), to.display())
                })?;
                archived.push(SlideRef::from(to));
            }
            Ok(archived)
        })
    }

    fn discard(&self, slides: Vec<SlideRef>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut dirs = Vec::new();
            for slide in &slides {
                let path = slide.path();
                if !self.is_archived(path) {
                    continue;
                }
                match tokio::fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        return Err(err)
                            .with_context(|| format!("failed to remove {}", path.display()));
                    }
                }
                if let Some(parent) = path.parent()
                    && !dirs.iter().any(|dir: &PathBuf| dir == parent)
                {
                    dirs.push(parent.to_path_buf());
                }
            }
            // Only empty deck directories go; anything else stays on disk.
            for dir in dirs {
                let _ = tokio::fs::remove_dir(&dir).await;
            }
            Ok(())
        })
    }
}

/// Creates a new, empty directory for one saved copy of a deck.
async fn create_deck_dir(folder_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(folder_dir)
        .await
        .with_context(|| format!("failed to create {}", folder_dir.display()))?;
    let mut stamp = Utc::now().timestamp_micros();
    loop {
        let dir = folder_dir.join(stamp.to_string());
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => return Ok(dir),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => stamp += 1,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to create {}", dir.display()));
            }
        }
    }
}

async fn write_slide(path: PathBuf, rendered: Result<String>) -> Result<SlideRef> {
    let svg = rendered?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&path, svg)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "rendered slide");
    Ok(SlideRef::from(path))
}

/// Encodes a folder name as one path component. Lowercase ASCII letters,
/// digits and `-` are kept; every other byte becomes `_XX`. Distinct names
/// always get distinct directories, even on case-insensitive filesystems.
fn folder_dir_name(folder: &str) -> String {
    let mut encoded = String::with_capacity(folder.len());
    for byte in folder.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "_{byte:02X}");
        }
    }
    if encoded.is_empty() {
        "_".to_string()
    } else {
        encoded
    }
}

/// Greedy word wrap, truncated to `max_lines` with a trailing ellipsis.
pub fn wrap_text(text: &str, columns: usize, max_lines: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > columns && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            last.push_str(" …");
        }
    }
    lines
}
