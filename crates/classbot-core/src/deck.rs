//! Deck resolution: turns the current outline (LIVE) or a saved folder
//! (SAVED) into the ordered slides a user pages through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{EngineError, EngineResult};
use crate::outline::{Outline, segment};
use crate::render::{SlideMetadata, SlideRenderer};
use crate::storage::Storage;
use crate::{SlideRef, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckSource {
    /// Derived on the fly from the current outline.
    Live,
    /// Loaded from a named folder in the slide store.
    Saved { folder: String },
}

#[derive(Debug, Clone)]
pub struct Deck {
    pub slides: Vec<SlideRef>,
    pub source: DeckSource,
}

/// Class-wide details placed on the title slide.
#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub class_name: String,
    pub instructor: String,
}

/// Rendered content fingerprint and the slide it produced.
type CacheEntry = (String, SlideRef);

pub struct DeckResolver {
    storage: Arc<dyn Storage>,
    renderer: Arc<dyn SlideRenderer>,
    class: ClassInfo,
    cache: Mutex<HashMap<(UserId, usize), CacheEntry>>,
}

impl DeckResolver {
    pub fn new(
        storage: Arc<dyn Storage>,
        renderer: Arc<dyn SlideRenderer>,
        class: ClassInfo,
    ) -> Self {
        Self {
            storage,
            renderer,
            class,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the deck for `source`. LIVE decks are built from
    /// `outline`, which is `None` when nothing has been generated or saved.
    pub async fn resolve(
        &self,
        user: UserId,
        source: &DeckSource,
        outline: Option<&Outline>,
    ) -> EngineResult<Deck> {
        match source {
            DeckSource::Live => {
                let outline = outline.ok_or(EngineError::NoOutline)?;
                self.resolve_live(user, outline).await
            }
            DeckSource::Saved { folder } => self.resolve_saved(user, folder).await,
        }
    }

    async fn resolve_live(&self, user: UserId, outline: &Outline) -> EngineResult<Deck> {
        let metadata = self.metadata(outline);
        let sections = segment(&outline.text);
        let mut slides = Vec::with_capacity(sections.len() + 1);

        let title_key = format!(
            "title\0{}\0{}\0{}\0{}\0{}",
            metadata.title,
            metadata.class_name,
            metadata.instructor,
            metadata.source.as_deref().unwrap_or_default(),
            metadata.date
        );
        let title = match self.cached(user, 0, &title_key) {
            Some(slide) => slide,
            None => {
                let slide = self
                    .renderer
                    .render_title_slide(user, &metadata)
                    .await
                    .map_err(EngineError::Render)?;
                self.remember(user, 0, title_key, slide.clone());
                slide
            }
        };
        slides.push(title);

        for (offset, section) in sections.iter().enumerate() {
            let index = offset + 1;
            let key = format!("{}\0{}\0{}", section.header, section.body, metadata.class_name);
            let slide = match self.cached(user, index, &key) {
                Some(slide) => slide,
                None => {
                    let slide = self
                        .renderer
                        .render_slide(user, index, section, &metadata)
                        .await
                        .map_err(EngineError::Render)?;
                    self.remember(user, index, key, slide.clone());
                    slide
                }
            };
            slides.push(slide);
        }

        self.forget_beyond(user, slides.len());
        tracing::debug!(user, slides = slides.len(), outline = outline.id, "resolved live deck");
        Ok(Deck {
            slides,
            source: DeckSource::Live,
        })
    }

    async fn resolve_saved(&self, user: UserId, folder: &str) -> EngineResult<Deck> {
        let slides = self
            .storage
            .list_slides(user, folder.to_string())
            .await
            .map_err(EngineError::Storage)?;
        if slides.is_empty() {
            return Err(EngineError::NotFound(format!("folder \"{folder}\"")));
        }
        Ok(Deck {
            slides,
            source: DeckSource::Saved {
                folder: folder.to_string(),
            },
        })
    }

    fn metadata(&self, outline: &Outline) -> SlideMetadata {
        SlideMetadata {
            class_name: self.class.class_name.clone(),
            instructor: self.class.instructor.clone(),
            title: outline.name.clone(),
            source: outline.source.clone(),
            date: outline.created_at.format("%B %-d, %Y").to_string(),
        }
    }

    fn cached(&self, user: UserId, index: usize, key: &str) -> Option<SlideRef> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&(user, index))
            .filter(|(fingerprint, _)| fingerprint == key)
            .map(|(_, slide)| slide.clone())
    }

    fn remember(&self, user: UserId, index: usize, key: String, slide: SlideRef) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert((user, index), (key, slide));
    }

    fn forget_beyond(&self, user: UserId, len: usize) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|(owner, index), _| *owner != user || *index < len);
    }
}
