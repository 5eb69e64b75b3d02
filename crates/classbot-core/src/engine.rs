//! Command-level entry points shared by every front end.
//!
//! [`Engine`] wires the deck resolver, navigator and poll manager to the
//! storage, generation and rendering collaborators. Every method returns
//! an [`EngineError`] the caller can turn into a reply.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::{SlideRef, UserId};
use crate::config::Config;
use crate::coursework::{HomeworkUpload, ReleasedHomework, stored_file_name};
use crate::deck::{ClassInfo, DeckResolver, DeckSource};
use crate::error::{EngineError, EngineResult};
use crate::generation::{ChatCompletionsGenerator, Generator};
use crate::navigator::{Navigator, SlideView};
use crate::outline::Outline;
use crate::poll::{PollManager, QuestionView, ReactionOutcome, TallyView, parse_questions};
use crate::render::{SlideRenderer, SvgSlideRenderer};
use crate::storage::{
    FolderSummary, GeneratedHomework, Homework, Material, NewHomework, NewMaterial, Quiz,
    SqliteStorage, Storage,
};
use crate::symbols::Reaction;

const PENDING_OUTLINE_NAME: &str = "Outline";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub class: ClassInfo,
    pub outline_minutes: u32,
    pub poll_count: u32,
    pub quiz_count: u32,
    pub generation_timeout: Duration,
    pub poll_window: Option<Duration>,
    /// Where uploaded homework files are written.
    pub homework_dir: PathBuf,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            class: ClassInfo {
                class_name: config.slides.class_name.clone(),
                instructor: config.slides.instructor.clone(),
            },
            outline_minutes: config.generation.outline_minutes,
            poll_count: config.generation.poll_count,
            quiz_count: config.generation.quiz_count,
            generation_timeout: config.generation.timeout(),
            poll_window: config.poll.window(),
            homework_dir: config.homework_dir(),
        }
    }
}

pub struct Engine {
    storage: Arc<dyn Storage>,
    generator: Arc<dyn Generator>,
    renderer: Arc<dyn SlideRenderer>,
    resolver: DeckResolver,
    navigator: Navigator,
    polls: PollManager,
    /// Most recently generated outline that has not been saved yet.
    pending_outline: Mutex<Option<Outline>>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        storage: Arc<dyn Storage>,
        generator: Arc<dyn Generator>,
        renderer: Arc<dyn SlideRenderer>,
        settings: EngineSettings,
    ) -> Self {
        let resolver = DeckResolver::new(
            Arc::clone(&storage),
            Arc::clone(&renderer),
            settings.class.clone(),
        );
        Self {
            storage,
            generator,
            renderer,
            resolver,
            navigator: Navigator::new(),
            polls: PollManager::new(settings.poll_window),
            pending_outline: Mutex::new(None),
            settings,
        }
    }

    /// Builds the production engine. Fails when the database cannot be
    /// opened or the generation endpoint is not configured.
    pub fn open(config: &Config) -> Result<Self> {
        let storage = SqliteStorage::open(&config.database_path())
            .context("failed to open classbot database")?;
        let generator = ChatCompletionsGenerator::new(config.generation.resolve()?)?;
        let renderer = SvgSlideRenderer::new(config.slides_dir())?;
        Ok(Self::new(
            Arc::new(storage),
            Arc::new(generator),
            Arc::new(renderer),
            EngineSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // Materials and outlines

    pub async fn add_material(
        &self,
        file_name: &str,
        file_path: Option<String>,
        text: String,
    ) -> EngineResult<Material> {
        let material = self
            .storage
            .save_material(NewMaterial {
                file_name: file_name.to_string(),
                file_path,
                text,
            })
            .await
            .map_err(EngineError::Storage)?;
        info!(id = material.id, file = %material.file_name, "stored lecture material");
        Ok(material)
    }

    /// Generates an outline from every uploaded material and makes it the
    /// pending outline.
    pub async fn generate_outline(&self, minutes: Option<u32>) -> EngineResult<Outline> {
        let materials = self
            .storage
            .list_materials()
            .await
            .map_err(EngineError::Storage)?;
        if materials.is_empty() {
            return Err(EngineError::NotFound("uploaded lecture materials".to_string()));
        }

        let minutes = minutes.unwrap_or(self.settings.outline_minutes);
        let source = materials
            .iter()
            .map(|material| material.file_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let texts = materials.into_iter().map(|material| material.text).collect();
        let text = self
            .generate(self.generator.generate_outline(texts, minutes))
            .await?;

        let outline = self
            .storage
            .record_generated_outline(PENDING_OUTLINE_NAME.to_string(), text, Some(source))
            .await
            .map_err(EngineError::Storage)?;
        info!(id = outline.id, minutes, "generated outline");
        *self.pending() = Some(outline.clone());
        Ok(outline)
    }

    /// Commits the pending outline under `name`.
    pub async fn save_outline(&self, name: &str) -> EngineResult<Outline> {
        let pending = self.pending().clone().ok_or(EngineError::NoOutline)?;
        let saved = self
            .storage
            .commit_outline(pending.id, name.to_string())
            .await
            .map_err(EngineError::Storage)?;
        let mut slot = self.pending();
        if slot.as_ref().is_some_and(|current| current.id == pending.id) {
            *slot = None;
        }
        Ok(saved)
    }

    /// The pending outline if there is one, else the latest saved outline.
    pub async fn current_outline(&self) -> EngineResult<Option<Outline>> {
        let pending = self.pending().clone();
        if pending.is_some() {
            return Ok(pending);
        }
        self.storage
            .latest_outline()
            .await
            .map_err(EngineError::Storage)
    }

    // Presentation

    /// Starts a presentation: LIVE from the current outline without a
    /// folder, SAVED from the folder otherwise.
    pub async fn start_presentation(
        &self,
        user: UserId,
        folder: Option<&str>,
    ) -> EngineResult<SlideView> {
        let source = match folder {
            Some(folder) => DeckSource::Saved {
                folder: folder.to_string(),
            },
            None => DeckSource::Live,
        };
        let outline = match source {
            DeckSource::Live => self.current_outline().await?,
            DeckSource::Saved { .. } => None,
        };
        let deck = self.resolver.resolve(user, &source, outline.as_ref()).await?;
        let view = self.navigator.start(user, deck)?;
        info!(user, slides = view.total, ?source, "presentation started");
        Ok(view)
    }

    pub fn next_slide(&self, user: UserId) -> EngineResult<SlideView> {
        self.navigator.next(user)
    }

    pub fn previous_slide(&self, user: UserId) -> EngineResult<SlideView> {
        self.navigator.previous(user)
    }

    pub fn current_slide(&self, user: UserId) -> EngineResult<SlideView> {
        self.navigator.current(user)
    }

    pub fn end_presentation(&self, user: UserId) -> EngineResult<()> {
        self.navigator.end(user).map(|_| ())
    }

    /// Archives the slides of the running presentation into `folder`,
    /// replacing whatever the folder held. Returns the slide count.
    pub async fn save_slides(&self, user: UserId, folder: &str) -> EngineResult<usize> {
        let session = self
            .navigator
            .session(user)
            .ok_or(EngineError::NoActiveSession)?;
        if let DeckSource::Saved { folder: current } = session.source()
            && current == folder
        {
            return Ok(session.len());
        }

        let archived = self
            .renderer
            .archive_deck(user, folder, session.slides())
            .await
            .map_err(EngineError::Render)?;
        let replaced = match self
            .storage
            .replace_folder(user, folder.to_string(), archived.clone())
            .await
        {
            Ok(replaced) => replaced,
            Err(err) => {
                self.discard_slides(archived).await;
                return Err(EngineError::Storage(err));
            }
        };
        self.discard_slides(replaced).await;
        info!(user, folder, slides = session.len(), "saved slides");
        Ok(session.len())
    }

    pub async fn list_folders(&self, user: UserId) -> EngineResult<Vec<FolderSummary>> {
        self.storage
            .list_folders(user)
            .await
            .map_err(EngineError::Storage)
    }

    // Polls

    /// Generates questions from the current outline and opens a poll for
    /// `owner`. The raw poll text is stored before parsing.
    pub async fn create_poll(
        &self,
        owner: UserId,
        count: Option<u32>,
    ) -> EngineResult<QuestionView> {
        let outline = self.current_outline().await?.ok_or(EngineError::NoOutline)?;
        let count = count.unwrap_or(self.settings.poll_count);
        let text = self
            .generate(
                self.generator
                    .generate_poll_questions(outline.text.clone(), count),
            )
            .await?;

        let name = format!("{} quiz", outline.name);
        self.storage
            .save_poll_text(name.clone(), text.clone())
            .await
            .map_err(EngineError::Storage)?;

        let questions = parse_questions(&text)?;
        let view = self.polls.start_poll(owner, &name, questions)?;
        info!(owner, questions = view.total, "poll started");
        Ok(view)
    }

    pub fn poll_react(
        &self,
        owner: UserId,
        voter: UserId,
        reaction: Reaction,
    ) -> EngineResult<ReactionOutcome> {
        self.polls.react(owner, voter, reaction)
    }

    pub fn current_question(&self, owner: UserId) -> EngineResult<QuestionView> {
        self.polls.current(owner)
    }

    /// Results for one question (0-based) or for all of them.
    pub fn poll_results(
        &self,
        owner: UserId,
        question: Option<usize>,
    ) -> EngineResult<Vec<TallyView>> {
        match question {
            Some(index) => self.polls.tally(owner, index).map(|view| vec![view]),
            None => self.polls.tally_all(owner),
        }
    }

    /// Ends the poll, returning its final results.
    pub fn end_poll(&self, owner: UserId) -> EngineResult<Vec<TallyView>> {
        let results = self.polls.tally_all(owner)?;
        self.polls.end_poll(owner)?;
        info!(owner, "poll ended");
        Ok(results)
    }

    pub fn has_poll(&self, owner: UserId) -> bool {
        self.polls.is_running(owner)
    }

    // Quizzes and homework

    /// Generates a quiz with answers from the current outline and stores
    /// it under `name`.
    pub async fn create_quiz(&self, name: &str, count: Option<u32>) -> EngineResult<Quiz> {
        let outline = self.current_outline().await?.ok_or(EngineError::NoOutline)?;
        let count = count.unwrap_or(self.settings.quiz_count);
        let text = self
            .generate(self.generator.generate_quiz(outline.text, count))
            .await?;
        let quiz = self
            .storage
            .save_quiz(name.to_string(), text)
            .await
            .map_err(EngineError::Storage)?;
        info!(id = quiz.id, name, count, "generated quiz");
        Ok(quiz)
    }

    /// Returns the stored quiz `name` with its answers hidden.
    pub async fn release_quiz(&self, name: &str) -> EngineResult<String> {
        let quiz = self
            .storage
            .find_quiz(name.to_string())
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::NotFound(format!("quiz \"{name}\"")))?;
        self.generate(self.generator.hide_quiz_answers(quiz.text))
            .await
    }

    /// Records an uploaded assignment, writing its file first.
    pub async fn add_homework(
        &self,
        user: UserId,
        upload: HomeworkUpload,
    ) -> EngineResult<Homework> {
        let file_path = match upload.attachment {
            Some(attachment) => {
                let dir = &self.settings.homework_dir;
                let path = dir.join(stored_file_name(Utc::now(), &attachment.file_name));
                write_attachment(&path, &attachment.bytes)
                    .await
                    .map_err(EngineError::Storage)?;
                Some(path.to_string_lossy().into_owned())
            }
            None => None,
        };
        let homework = self
            .storage
            .save_homework(NewHomework {
                title: upload.title,
                description: upload.description,
                file_path,
                due_date: upload.due_date,
                uploaded_by: user,
            })
            .await
            .map_err(EngineError::Storage)?;
        info!(id = homework.id, user, title = %homework.title, "stored homework");
        Ok(homework)
    }

    pub async fn list_homework(&self) -> EngineResult<Vec<Homework>> {
        self.storage
            .list_homework()
            .await
            .map_err(EngineError::Storage)
    }

    /// Generates an assignment with solutions from the current outline.
    pub async fn create_homework(
        &self,
        name: &str,
        due_date: &str,
    ) -> EngineResult<GeneratedHomework> {
        let outline = self.current_outline().await?.ok_or(EngineError::NoOutline)?;
        let content = self
            .generate(self.generator.generate_homework(outline.text))
            .await?;
        let homework = self
            .storage
            .save_generated_homework(name.to_string(), content, due_date.to_string())
            .await
            .map_err(EngineError::Storage)?;
        info!(id = homework.id, name, "generated homework");
        Ok(homework)
    }

    /// Returns the stored assignment `name` with its solutions removed.
    pub async fn release_homework(&self, name: &str) -> EngineResult<ReleasedHomework> {
        let homework = self
            .storage
            .find_generated_homework(name.to_string())
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::NotFound(format!("homework \"{name}\"")))?;
        let text = self
            .generate(self.generator.strip_homework_solutions(homework.content))
            .await?;
        Ok(ReleasedHomework {
            name: homework.name,
            due_date: homework.due_date,
            text,
        })
    }

    /// Removes archived slide files nothing points to any more.
    async fn discard_slides(&self, slides: Vec<SlideRef>) {
        if slides.is_empty() {
            return;
        }
        if let Err(err) = self.renderer.discard(slides).await {
            warn!("failed to remove unreferenced slides: {err:#}");
        }
    }

    async fn generate(
        &self,
        request: impl Future<Output = Result<String>>,
    ) -> EngineResult<String> {
        let limit = self.settings.generation_timeout;
        match tokio::time::timeout(limit, request).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(EngineError::Generation(err)),
            Err(_) => {
                warn!(seconds = limit.as_secs(), "generation request timed out");
                Err(EngineError::GenerationTimeout(limit))
            }
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Option<Outline>> {
        self.pending_outline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn write_attachment(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::anyhow;
    use futures_util::future::BoxFuture;
    use tempfile::TempDir;

    use super::*;
    use crate::coursework::Attachment;

    const INSTRUCTOR: UserId = 1;
    const POLL_TEXT: &str = "\
Question 1: What is the powerhouse of the cell?
A) Nucleus
B) Mitochondrion
C) Ribosome
D) Lysosome
Correct: B
Question 2: Plants make food by?
A) Photosynthesis
B) Respiration
Correct: A
";

    struct ScriptedGenerator {
        outline: Mutex<String>,
        poll: String,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(outline: &str, poll: &str) -> Self {
            Self {
                outline: Mutex::new(outline.to_string()),
                poll: poll.to_string(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn set_outline(&self, outline: &str) {
            *self.outline.lock().unwrap() = outline.to_string();
        }

        fn reply(&self, text: String) -> BoxFuture<'_, Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Ok(text)
            })
        }
    }

    impl Generator for ScriptedGenerator {
        fn generate_outline(
            &self,
            materials: Vec<String>,
            _minutes: u32,
        ) -> BoxFuture<'_, Result<String>> {
            assert!(!materials.is_empty());
            let outline = self.outline.lock().unwrap().clone();
            self.reply(outline)
        }

        fn generate_poll_questions(
            &self,
            _outline: String,
            _count: u32,
        ) -> BoxFuture<'_, Result<String>> {
            self.reply(self.poll.clone())
        }

        fn generate_quiz(&self, outline: String, count: u32) -> BoxFuture<'_, Result<String>> {
            self.reply(format!("{count} questions on {outline}\nAnswer: B"))
        }

        fn hide_quiz_answers(&self, quiz: String) -> BoxFuture<'_, Result<String>> {
            self.reply(quiz.replace("Answer: B", "Answer: ___"))
        }

        fn generate_homework(&self, outline: String) -> BoxFuture<'_, Result<String>> {
            self.reply(format!("1. Explain {outline}\nSolution: cells"))
        }

        fn strip_homework_solutions(&self, homework: String) -> BoxFuture<'_, Result<String>> {
            let questions = homework
                .lines()
                .filter(|line| !line.starts_with("Solution"))
                .collect::<Vec<_>>()
                .join("\n");
            self.reply(questions)
        }
    }

    /// SQLite storage whose folder and poll-text writes can be made to fail.
    struct FlakyStorage {
        inner: SqliteStorage,
        fail_folders: AtomicBool,
        fail_poll_text: AtomicBool,
    }

    impl FlakyStorage {
        fn new() -> Self {
            Self {
                inner: SqliteStorage::open_in_memory().unwrap(),
                fail_folders: AtomicBool::new(false),
                fail_poll_text: AtomicBool::new(false),
            }
        }
    }

    impl Storage for FlakyStorage {
        fn save_material(&self, material: NewMaterial) -> BoxFuture<'_, Result<Material>> {
            self.inner.save_material(material)
        }

        fn list_materials(&self) -> BoxFuture<'_, Result<Vec<Material>>> {
            self.inner.list_materials()
        }

        fn record_generated_outline(
            &self,
            name: String,
            text: String,
            source: Option<String>,
        ) -> BoxFuture<'_, Result<Outline>> {
            self.inner.record_generated_outline(name, text, source)
        }

        fn commit_outline(&self, id: i64, name: String) -> BoxFuture<'_, Result<Outline>> {
            self.inner.commit_outline(id, name)
        }

        fn save_outline(
            &self,
            name: String,
            text: String,
            source: Option<String>,
        ) -> BoxFuture<'_, Result<Outline>> {
            self.inner.save_outline(name, text, source)
        }

        fn latest_outline(&self) -> BoxFuture<'_, Result<Option<Outline>>> {
            self.inner.latest_outline()
        }

        fn save_slide(
            &self,
            owner: UserId,
            folder: String,
            ordinal: usize,
            slide: SlideRef,
        ) -> BoxFuture<'_, Result<()>> {
            self.inner.save_slide(owner, folder, ordinal, slide)
        }

        fn replace_folder(
            &self,
            owner: UserId,
            folder: String,
            slides: Vec<SlideRef>,
        ) -> BoxFuture<'_, Result<Vec<SlideRef>>> {
            if self.fail_folders.load(Ordering::SeqCst) {
                return Box::pin(async { Err(anyhow!("disk full")) });
            }
            self.inner.replace_folder(owner, folder, slides)
        }

        fn list_slides(
            &self,
            owner: UserId,
            folder: String,
        ) -> BoxFuture<'_, Result<Vec<SlideRef>>> {
            self.inner.list_slides(owner, folder)
        }

        fn list_folders(&self, owner: UserId) -> BoxFuture<'_, Result<Vec<FolderSummary>>> {
            self.inner.list_folders(owner)
        }

        fn save_poll_text(&self, name: String, content: String) -> BoxFuture<'_, Result<i64>> {
            if self.fail_poll_text.load(Ordering::SeqCst) {
                return Box::pin(async { Err(anyhow!("disk full")) });
            }
            self.inner.save_poll_text(name, content)
        }

        fn save_quiz(&self, name: String, text: String) -> BoxFuture<'_, Result<Quiz>> {
            self.inner.save_quiz(name, text)
        }

        fn find_quiz(&self, name: String) -> BoxFuture<'_, Result<Option<Quiz>>> {
            self.inner.find_quiz(name)
        }

        fn save_homework(&self, homework: NewHomework) -> BoxFuture<'_, Result<Homework>> {
            self.inner.save_homework(homework)
        }

        fn list_homework(&self) -> BoxFuture<'_, Result<Vec<Homework>>> {
            self.inner.list_homework()
        }

        fn save_generated_homework(
            &self,
            name: String,
            content: String,
            due_date: String,
        ) -> BoxFuture<'_, Result<GeneratedHomework>> {
            self.inner.save_generated_homework(name, content, due_date)
        }

        fn find_generated_homework(
            &self,
            name: String,
        ) -> BoxFuture<'_, Result<Option<GeneratedHomework>>> {
            self.inner.find_generated_homework(name)
        }
    }

    struct Fixture {
        engine: Engine,
        generator: Arc<ScriptedGenerator>,
        storage: Arc<FlakyStorage>,
        dir: TempDir,
    }

    fn fixture(generator: ScriptedGenerator) -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FlakyStorage::new());
        let generator = Arc::new(generator);
        let renderer = Arc::new(SvgSlideRenderer::new(dir.path().join("slides")).unwrap());
        let settings = EngineSettings {
            class: ClassInfo {
                class_name: "BIO 101".into(),
                instructor: "Dr. Rivera".into(),
            },
            outline_minutes: 45,
            poll_count: 2,
            quiz_count: 10,
            generation_timeout: Duration::from_secs(5),
            poll_window: None,
            homework_dir: dir.path().join("homework"),
        };
        let engine = Engine::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&generator) as Arc<dyn Generator>,
            renderer,
            settings,
        );
        Fixture {
            engine,
            generator,
            storage,
            dir,
        }
    }

    async fn with_outline(fixture: &Fixture) {
        fixture
            .engine
            .add_material("cells.txt", None, "Cells are the unit of life.".into())
            .await
            .unwrap();
        fixture.engine.generate_outline(None).await.unwrap();
    }

    fn read_slide(slide: &SlideRef) -> String {
        std::fs::read_to_string(slide.path()).unwrap()
    }

    #[tokio::test]
    async fn outline_requires_materials() {
        let fixture = fixture(ScriptedGenerator::new("I. A", POLL_TEXT));
        assert!(matches!(
            fixture.engine.generate_outline(None).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn live_presentation_wraps_over_title_and_sections() {
        let fixture = fixture(ScriptedGenerator::new("I. Cells\nbasics\nII. Energy", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        let first = engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        assert_eq!((first.index, first.total), (0, 3));
        assert_eq!(engine.next_slide(INSTRUCTOR).unwrap().index, 1);
        assert_eq!(engine.next_slide(INSTRUCTOR).unwrap().index, 2);
        assert_eq!(engine.next_slide(INSTRUCTOR).unwrap().index, 0);
        assert_eq!(engine.previous_slide(INSTRUCTOR).unwrap().index, 2);

        engine.end_presentation(INSTRUCTOR).unwrap();
        assert!(matches!(
            engine.current_slide(INSTRUCTOR),
            Err(EngineError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn presentation_without_outline_reports_no_outline() {
        let fixture = fixture(ScriptedGenerator::new("I. A", POLL_TEXT));
        assert!(matches!(
            fixture.engine.start_presentation(INSTRUCTOR, None).await,
            Err(EngineError::NoOutline)
        ));
    }

    #[tokio::test]
    async fn saved_outline_becomes_current_after_commit() {
        let fixture = fixture(ScriptedGenerator::new("I. Saved", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        let saved = engine.save_outline("Week 1").await.unwrap();
        assert!(saved.saved);
        assert!(matches!(
            engine.save_outline("again").await,
            Err(EngineError::NoOutline)
        ));
        let current = engine.current_outline().await.unwrap().unwrap();
        assert_eq!(current.name, "Week 1");
        assert_eq!(current.source.as_deref(), Some("cells.txt"));
    }

    #[tokio::test]
    async fn saved_folder_replays_archived_slides() {
        let fixture = fixture(ScriptedGenerator::new("I. One\nII. Two", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        assert_eq!(engine.save_slides(INSTRUCTOR, "week1").await.unwrap(), 3);
        engine.end_presentation(INSTRUCTOR).unwrap();

        let folders = engine.list_folders(INSTRUCTOR).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].slide_count, 3);

        let view = engine.start_presentation(INSTRUCTOR, Some("week1")).await.unwrap();
        assert_eq!(view.total, 3);
        assert!(view.slide.as_str().contains("week1"));
        assert!(view.slide.path().exists());

        // Saving a saved deck onto its own folder is a no-op.
        assert_eq!(engine.save_slides(INSTRUCTOR, "week1").await.unwrap(), 3);
        assert!(view.slide.path().exists());
        assert!(matches!(
            engine.start_presentation(INSTRUCTOR, Some("missing")).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn similar_folder_names_keep_their_own_decks() {
        let fixture = fixture(ScriptedGenerator::new("I. Alpha", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        engine.save_slides(INSTRUCTOR, "week 1").await.unwrap();

        fixture.generator.set_outline("I. Beta");
        engine.generate_outline(None).await.unwrap();
        engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        engine.save_slides(INSTRUCTOR, "week_1").await.unwrap();

        engine.start_presentation(INSTRUCTOR, Some("week 1")).await.unwrap();
        let alpha = engine.next_slide(INSTRUCTOR).unwrap();
        assert!(read_slide(&alpha.slide).contains("Alpha"));
        assert!(!read_slide(&alpha.slide).contains("Beta"));

        engine.start_presentation(INSTRUCTOR, Some("week_1")).await.unwrap();
        let beta = engine.next_slide(INSTRUCTOR).unwrap();
        assert!(read_slide(&beta.slide).contains("Beta"));
    }

    #[tokio::test]
    async fn resaving_a_folder_replaces_it_and_drops_old_copies() {
        let fixture = fixture(ScriptedGenerator::new("I. Alpha", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        engine.save_slides(INSTRUCTOR, "week1").await.unwrap();
        let old = fixture
            .storage
            .list_slides(INSTRUCTOR, "week1".into())
            .await
            .unwrap();

        fixture.generator.set_outline("I. Beta\nII. Gamma");
        engine.generate_outline(None).await.unwrap();
        engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        assert_eq!(engine.save_slides(INSTRUCTOR, "week1").await.unwrap(), 3);

        let new = fixture
            .storage
            .list_slides(INSTRUCTOR, "week1".into())
            .await
            .unwrap();
        assert_eq!(new.len(), 3);
        assert!(new.iter().all(|slide| slide.path().exists()));
        assert!(old.iter().all(|slide| !slide.path().exists()));
        assert!(read_slide(&new[1]).contains("Beta"));
    }

    #[tokio::test]
    async fn failed_folder_save_keeps_the_previous_deck() {
        let fixture = fixture(ScriptedGenerator::new("I. Alpha\nII. More\nIII. Most", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        assert_eq!(engine.save_slides(INSTRUCTOR, "week1").await.unwrap(), 4);
        let before = fixture
            .storage
            .list_slides(INSTRUCTOR, "week1".into())
            .await
            .unwrap();

        fixture.generator.set_outline("I. Beta");
        engine.generate_outline(None).await.unwrap();
        engine.start_presentation(INSTRUCTOR, None).await.unwrap();
        fixture.storage.fail_folders.store(true, Ordering::SeqCst);

        let err = engine.save_slides(INSTRUCTOR, "week1").await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
        assert!(err.user_message().contains("disk full"));

        let after = fixture
            .storage
            .list_slides(INSTRUCTOR, "week1".into())
            .await
            .unwrap();
        assert_eq!(after, before);
        assert!(after.iter().all(|slide| slide.path().exists()));
        assert!(read_slide(&after[1]).contains("Alpha"));
    }

    #[tokio::test]
    async fn save_slides_without_session_fails() {
        let fixture = fixture(ScriptedGenerator::new("I. A", POLL_TEXT));
        assert!(matches!(
            fixture.engine.save_slides(INSTRUCTOR, "x").await,
            Err(EngineError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn poll_round_trip_through_reactions() {
        let fixture = fixture(ScriptedGenerator::new("I. A", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        let first = engine.create_poll(INSTRUCTOR, None).await.unwrap();
        assert_eq!((first.index, first.total), (0, 2));

        engine.poll_react(INSTRUCTOR, 10, Reaction::Option(0)).unwrap();
        engine.poll_react(INSTRUCTOR, 11, Reaction::Option(1)).unwrap();
        engine.poll_react(INSTRUCTOR, 11, Reaction::Option(1)).unwrap();

        let results = engine.poll_results(INSTRUCTOR, Some(0)).unwrap();
        assert_eq!(results[0].tally.counts, vec![1, 1, 0, 0]);
        assert_eq!(results[0].correct, 'B');

        let moved = engine
            .poll_react(INSTRUCTOR, INSTRUCTOR, Reaction::Forward)
            .unwrap();
        assert!(matches!(moved, ReactionOutcome::Navigated { moved: true, .. }));
        assert!(matches!(
            engine.poll_react(INSTRUCTOR, 10, Reaction::Option(2)),
            Err(EngineError::InvalidOption { .. })
        ));

        let final_results = engine.end_poll(INSTRUCTOR).unwrap();
        assert_eq!(final_results.len(), 2);
        assert!(!engine.has_poll(INSTRUCTOR));
    }

    #[tokio::test]
    async fn poll_text_that_cannot_be_stored_starts_nothing() {
        let fixture = fixture(ScriptedGenerator::new("I. A", POLL_TEXT));
        with_outline(&fixture).await;
        fixture.storage.fail_poll_text.store(true, Ordering::SeqCst);

        let err = fixture.engine.create_poll(INSTRUCTOR, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
        assert!(err.user_message().contains("disk full"));
        assert!(!fixture.engine.has_poll(INSTRUCTOR));
    }

    #[tokio::test]
    async fn malformed_poll_text_starts_nothing() {
        let fixture = fixture(ScriptedGenerator::new("I. A", "Sure! Here are questions."));
        with_outline(&fixture).await;
        assert!(matches!(
            fixture.engine.create_poll(INSTRUCTOR, None).await,
            Err(EngineError::MalformedPollText { line: 1, .. })
        ));
        assert!(!fixture.engine.has_poll(INSTRUCTOR));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generation_times_out() {
        let mut generator = ScriptedGenerator::new("I. A", POLL_TEXT);
        generator.delay = Duration::from_secs(60);
        let fixture = fixture(generator);
        fixture
            .engine
            .add_material("a.txt", None, "text".into())
            .await
            .unwrap();

        let err = fixture.engine.generate_outline(None).await.unwrap_err();
        assert!(
            matches!(err, EngineError::GenerationTimeout(limit) if limit == Duration::from_secs(5))
        );
        assert!(fixture.engine.current_outline().await.unwrap().is_none());
        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quiz_is_stored_and_released_without_answers() {
        let fixture = fixture(ScriptedGenerator::new("I. Cells", POLL_TEXT));
        let engine = &fixture.engine;
        assert!(matches!(
            engine.create_quiz("midterm", None).await,
            Err(EngineError::NoOutline)
        ));

        with_outline(&fixture).await;
        let quiz = engine.create_quiz("midterm", Some(3)).await.unwrap();
        assert_eq!(quiz.text, "3 questions on I. Cells\nAnswer: B");

        let released = engine.release_quiz("midterm").await.unwrap();
        assert!(released.contains("Answer: ___"));
        assert!(!released.contains("Answer: B"));

        let missing = engine.release_quiz("final").await.unwrap_err();
        assert_eq!(missing.user_message(), "Not found: quiz \"final\".");
    }

    #[tokio::test]
    async fn quiz_length_defaults_from_settings() {
        let fixture = fixture(ScriptedGenerator::new("I. Cells", POLL_TEXT));
        with_outline(&fixture).await;
        let quiz = fixture.engine.create_quiz("weekly", None).await.unwrap();
        assert!(quiz.text.starts_with("10 questions"));
    }

    #[tokio::test]
    async fn homework_upload_writes_the_attachment() {
        let fixture = fixture(ScriptedGenerator::new("I. Cells", POLL_TEXT));
        let engine = &fixture.engine;

        let stored = engine
            .add_homework(
                INSTRUCTOR,
                HomeworkUpload {
                    title: "Lab 1".into(),
                    due_date: Some("Friday".into()),
                    description: None,
                    attachment: Some(Attachment {
                        file_name: "../lab1.txt".into(),
                        bytes: b"Measure a cell.".to_vec(),
                    }),
                },
            )
            .await
            .unwrap();
        let path = PathBuf::from(stored.file_path.as_deref().unwrap());
        assert!(path.starts_with(fixture.dir.path().join("homework")));
        assert!(path.to_string_lossy().ends_with("-lab1.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"Measure a cell.");

        engine
            .add_homework(
                INSTRUCTOR,
                HomeworkUpload {
                    title: "Reading".into(),
                    ..HomeworkUpload::default()
                },
            )
            .await
            .unwrap();
        let titles: Vec<_> = engine
            .list_homework()
            .await
            .unwrap()
            .into_iter()
            .map(|homework| homework.title)
            .collect();
        assert_eq!(titles, ["Reading", "Lab 1"]);
    }

    #[tokio::test]
    async fn generated_homework_is_released_without_solutions() {
        let fixture = fixture(ScriptedGenerator::new("I. Cells", POLL_TEXT));
        with_outline(&fixture).await;
        let engine = &fixture.engine;

        let generated = engine.create_homework("hw1", "Monday").await.unwrap();
        assert!(generated.content.contains("Solution: cells"));

        let released = engine.release_homework("hw1").await.unwrap();
        assert_eq!(released.due_date, "Monday");
        assert_eq!(released.text, "1. Explain I. Cells");
        assert!(matches!(
            engine.release_homework("hw2").await,
            Err(EngineError::NotFound(_))
        ));
    }
}
