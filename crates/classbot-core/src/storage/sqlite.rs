use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::oneshot;
use tracing::{error, info};

use super::migrations::run_migrations;
use super::{
    FolderSummary, GeneratedHomework, Homework, Material, NewHomework, NewMaterial, Quiz, Storage,
};
use crate::outline::Outline;
use crate::{SlideRef, UserId};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct Worker {
    sender: mpsc::Sender<DbCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let mut guard = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// SQLite storage owned by a dedicated thread; every query is shipped to
/// that thread as a closure.
#[derive(Clone)]
pub struct SqliteStorage {
    worker: Arc<Worker>,
    path: Option<Arc<PathBuf>>,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database file and runs migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let owned = path.to_path_buf();
        let storage = Self::spawn(move || Connection::open(&owned), Some(path.to_path_buf()))?;
        info!("Database initialized at {}", path.display());
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::spawn(Connection::open_in_memory, None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    fn spawn<F>(open: F, path: Option<PathBuf>) -> Result<Self>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let handle = thread::Builder::new()
            .name("classbot-db".into())
            .spawn(move || {
                let mut conn = match open() {
                    Ok(conn) => conn,
                    Err(err) => {
                        let err = anyhow::Error::new(err).context("failed to open SQLite database");
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init = run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init).is_err() {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }
                info!("Database thread shutting down");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        Ok(Self {
            worker: Arc::new(Worker {
                sender: command_tx,
                handle: Mutex::new(Some(handle)),
            }),
            path: path.map(Arc::new),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = DbCommand::Execute(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));
        self.worker
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;
        reply_rx
            .await
            .context("database thread terminated unexpectedly")?
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("value {value} exceeds SQLite INTEGER range"))
}

fn row_to_outline(row: &Row<'_>, saved: bool) -> Result<Outline> {
    let stamp: String = row.get(4)?;
    Ok(Outline {
        id: row.get(0)?,
        name: row.get(1)?,
        text: row.get(2)?,
        source: row.get(3)?,
        created_at: parse_datetime(&stamp)?,
        saved,
    })
}

impl Storage for SqliteStorage {
    fn save_material(&self, material: NewMaterial) -> BoxFuture<'_, Result<Material>> {
        Box::pin(self.execute(move |conn| {
            let uploaded_at = Utc::now();
            conn.execute(
                "INSERT INTO uploads (file_name, file_path, extracted_text, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    material.file_name,
                    material.file_path,
                    material.text,
                    uploaded_at.to_rfc3339(),
                ],
            )
            .context("failed to insert upload")?;
            Ok(Material {
                id: conn.last_insert_rowid(),
                file_name: material.file_name,
                file_path: material.file_path,
                text: material.text,
                uploaded_at,
            })
        }))
    }

    fn list_materials(&self) -> BoxFuture<'_, Result<Vec<Material>>> {
        Box::pin(self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_name, file_path, extracted_text, uploaded_at
                 FROM uploads ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut materials = Vec::new();
            while let Some(row) = rows.next()? {
                materials.push(Material {
                    id: row.get(0)?,
                    file_name: row.get(1)?,
                    file_path: row.get(2)?,
                    text: row.get(3)?,
                    uploaded_at: parse_datetime(&row.get::<_, String>(4)?)?,
                });
            }
            Ok(materials)
        }))
    }

    fn record_generated_outline(
        &self,
        name: String,
        text: String,
        source: Option<String>,
    ) -> BoxFuture<'_, Result<Outline>> {
        Box::pin(self.execute(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO generated_outlines (name, outline, source, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, text, source, created_at.to_rfc3339()],
            )
            .context("failed to insert generated outline")?;
            Ok(Outline {
                id: conn.last_insert_rowid(),
                name,
                text,
                source,
                created_at,
                saved: false,
            })
        }))
    }

    fn commit_outline(&self, id: i64, name: String) -> BoxFuture<'_, Result<Outline>> {
        Box::pin(self.execute(move |conn| {
            let tx = conn.transaction()?;
            let pending = tx
                .query_row(
                    "SELECT id, name, outline, source, created_at
                     FROM generated_outlines WHERE id = ?1",
                    params![id],
                    |row| Ok(row_to_outline(row, false)),
                )
                .optional()?
                .ok_or_else(|| anyhow!("pending outline {id} not found"))??;

            let saved_at = Utc::now();
            tx.execute(
                "INSERT INTO saved_outlines (name, outline, source, saved_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, pending.text, pending.source, saved_at.to_rfc3339()],
            )
            .context("failed to insert saved outline")?;
            let saved_id = tx.last_insert_rowid();
            tx.execute("DELETE FROM generated_outlines WHERE id = ?1", params![id])
                .context("failed to delete pending outline")?;
            tx.commit().context("failed to commit outline")?;

            Ok(Outline {
                id: saved_id,
                name,
                text: pending.text,
                source: pending.source,
                created_at: saved_at,
                saved: true,
            })
        }))
    }

    fn save_outline(
        &self,
        name: String,
        text: String,
        source: Option<String>,
    ) -> BoxFuture<'_, Result<Outline>> {
        Box::pin(self.execute(move |conn| {
            let saved_at = Utc::now();
            conn.execute(
                "INSERT INTO saved_outlines (name, outline, source, saved_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, text, source, saved_at.to_rfc3339()],
            )
            .context("failed to insert saved outline")?;
            Ok(Outline {
                id: conn.last_insert_rowid(),
                name,
                text,
                source,
                created_at: saved_at,
                saved: true,
            })
        }))
    }

    fn latest_outline(&self) -> BoxFuture<'_, Result<Option<Outline>>> {
        Box::pin(self.execute(|conn| {
            conn.query_row(
                "SELECT id, name, outline, source, saved_at
                 FROM saved_outlines ORDER BY saved_at DESC, id DESC LIMIT 1",
                [],
                |row| Ok(row_to_outline(row, true)),
            )
            .optional()?
            .transpose()
        }))
    }

    fn save_slide(
        &self,
        owner: UserId,
        folder: String,
        ordinal: usize,
        slide: SlideRef,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.execute(move |conn| {
            conn.execute(
                "INSERT INTO saved_slides (owner, folder, ordinal, slide_path, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (owner, folder, ordinal)
                 DO UPDATE SET slide_path = excluded.slide_path, saved_at = excluded.saved_at",
                params![
                    owner,
                    folder,
                    to_i64(ordinal)?,
                    slide.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to save slide {ordinal} in folder {folder}"))?;
            Ok(())
        }))
    }

    fn replace_folder(
        &self,
        owner: UserId,
        folder: String,
        slides: Vec<SlideRef>,
    ) -> BoxFuture<'_, Result<Vec<SlideRef>>> {
        Box::pin(self.execute(move |conn| {
            let tx = conn.transaction()?;
            let previous = {
                let mut stmt = tx.prepare(
                    "SELECT slide_path FROM saved_slides
                     WHERE owner = ?1 AND folder = ?2
                     ORDER BY ordinal ASC",
                )?;
                stmt.query_map(params![owner, folder], |row| row.get::<_, String>(0))?
                    .map(|path| path.map(SlideRef::new))
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.execute(
                "DELETE FROM saved_slides WHERE owner = ?1 AND folder = ?2",
                params![owner, folder],
            )
            .context("failed to clear folder")?;

            let saved_at = Utc::now().to_rfc3339();
            for (ordinal, slide) in slides.iter().enumerate() {
                tx.execute(
                    "INSERT INTO saved_slides (owner, folder, ordinal, slide_path, saved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![owner, folder, to_i64(ordinal)?, slide.as_str(), saved_at],
                )
                .with_context(|| format!("failed to save slide {ordinal} in folder {folder}"))?;
            }
            tx.commit().context("failed to commit folder")?;
            Ok(previous)
        }))
    }

    fn list_slides(&self, owner: UserId, folder: String) -> BoxFuture<'_, Result<Vec<SlideRef>>> {
        Box::pin(self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT slide_path FROM saved_slides
                 WHERE owner = ?1 AND folder = ?2
                 ORDER BY ordinal ASC",
            )?;
            let slides = stmt
                .query_map(params![owner, folder], |row| row.get::<_, String>(0))?
                .map(|path| path.map(SlideRef::new))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(slides)
        }))
    }

    fn list_folders(&self, owner: UserId) -> BoxFuture<'_, Result<Vec<FolderSummary>>> {
        Box::pin(self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT folder, COUNT(*), MAX(saved_at) FROM saved_slides
                 WHERE owner = ?1
                 GROUP BY folder
                 ORDER BY folder ASC",
            )?;
            let mut rows = stmt.query(params![owner])?;
            let mut folders = Vec::new();
            while let Some(row) = rows.next()? {
                let count: i64 = row.get(1)?;
                folders.push(FolderSummary {
                    name: row.get(0)?,
                    slide_count: usize::try_from(count).unwrap_or_default(),
                    saved_at: parse_datetime(&row.get::<_, String>(2)?)?,
                });
            }
            Ok(folders)
        }))
    }

    fn save_poll_text(&self, name: String, content: String) -> BoxFuture<'_, Result<i64>> {
        Box::pin(self.execute(move |conn| {
            conn.execute(
                "INSERT INTO generated_polls (name, content, created_at) VALUES (?1, ?2, ?3)",
                params![name, content, Utc::now().to_rfc3339()],
            )
            .context("failed to insert generated poll")?;
            Ok(conn.last_insert_rowid())
        }))
    }

    fn save_quiz(&self, name: String, text: String) -> BoxFuture<'_, Result<Quiz>> {
        Box::pin(self.execute(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO generated_quizzes (name, quiz, created_at) VALUES (?1, ?2, ?3)",
                params![name, text, created_at.to_rfc3339()],
            )
            .context("failed to insert generated quiz")?;
            Ok(Quiz {
                id: conn.last_insert_rowid(),
                name,
                text,
                created_at,
            })
        }))
    }

    fn find_quiz(&self, name: String) -> BoxFuture<'_, Result<Option<Quiz>>> {
        Box::pin(self.execute(move |conn| {
            conn.query_row(
                "SELECT id, name, quiz, created_at FROM generated_quizzes
                 WHERE name = ?1 ORDER BY id DESC LIMIT 1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .map(|(id, name, text, stamp)| {
                Ok(Quiz {
                    id,
                    name,
                    text,
                    created_at: parse_datetime(&stamp)?,
                })
            })
            .transpose()
        }))
    }

    fn save_homework(&self, homework: NewHomework) -> BoxFuture<'_, Result<Homework>> {
        Box::pin(self.execute(move |conn| {
            let uploaded_at = Utc::now();
            conn.execute(
                "INSERT INTO homework
                     (title, description, file_path, due_date, uploaded_by, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    homework.title,
                    homework.description,
                    homework.file_path,
                    homework.due_date,
                    homework.uploaded_by,
                    uploaded_at.to_rfc3339(),
                ],
            )
            .context("failed to insert homework")?;
            Ok(Homework {
                id: conn.last_insert_rowid(),
                title: homework.title,
                description: homework.description,
                file_path: homework.file_path,
                due_date: homework.due_date,
                uploaded_by: homework.uploaded_by,
                uploaded_at,
            })
        }))
    }

    fn list_homework(&self) -> BoxFuture<'_, Result<Vec<Homework>>> {
        Box::pin(self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, file_path, due_date, uploaded_by, uploaded_at
                 FROM homework ORDER BY uploaded_at DESC, id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut assignments = Vec::new();
            while let Some(row) = rows.next()? {
                assignments.push(Homework {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    file_path: row.get(3)?,
                    due_date: row.get(4)?,
                    uploaded_by: row.get(5)?,
                    uploaded_at: parse_datetime(&row.get::<_, String>(6)?)?,
                });
            }
            Ok(assignments)
        }))
    }

    fn save_generated_homework(
        &self,
        name: String,
        content: String,
        due_date: String,
    ) -> BoxFuture<'_, Result<GeneratedHomework>> {
        Box::pin(self.execute(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO generated_homework (name, content, due_date, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, content, due_date, created_at.to_rfc3339()],
            )
            .context("failed to insert generated homework")?;
            Ok(GeneratedHomework {
                id: conn.last_insert_rowid(),
                name,
                content,
                due_date,
                created_at,
            })
        }))
    }

    fn find_generated_homework(
        &self,
        name: String,
    ) -> BoxFuture<'_, Result<Option<GeneratedHomework>>> {
        Box::pin(self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, content, due_date, created_at FROM generated_homework
                 WHERE name = ?1 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![name])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(GeneratedHomework {
                id: row.get(0)?,
                name: row.get(1)?,
                content: row.get(2)?,
                due_date: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?)?,
            }))
        }))
    }
}
