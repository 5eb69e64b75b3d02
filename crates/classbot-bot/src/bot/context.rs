use std::collections::HashSet;

use classbot_core::{Engine, UserId};

use crate::telegram::TelegramClient;

pub(crate) struct BotContext {
    client: TelegramClient,
    engine: Engine,
    allowlist_user_ids: HashSet<UserId>,
    allowlist_chat_ids: HashSet<i64>,
}

impl BotContext {
    pub(crate) fn new(
        client: TelegramClient,
        engine: Engine,
        allowlist_user_ids: HashSet<UserId>,
        allowlist_chat_ids: HashSet<i64>,
    ) -> Self {
        Self {
            client,
            engine,
            allowlist_user_ids,
            allowlist_chat_ids,
        }
    }

    pub(crate) fn client(&self) -> &TelegramClient {
        &self.client
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn is_allowed_user(&self, user: UserId) -> bool {
        self.allowlist_user_ids.contains(&user)
    }

    pub(crate) fn is_allowed_chat(&self, chat: i64) -> bool {
        self.allowlist_chat_ids.contains(&chat)
    }
}

#[cfg(test)]
pub(crate) struct TestBot {
    pub context: BotContext,
    pub storage: std::sync::Arc<classbot_core::storage::SqliteStorage>,
    pub dir: tempfile::TempDir,
}

/// Allowlists user 1 and chat -100; Telegram and the generation endpoint
/// both live at `base_url`.
#[cfg(test)]
pub(crate) fn test_context(base_url: &str) -> TestBot {
    use std::sync::Arc;
    use std::time::Duration;

    use classbot_core::deck::ClassInfo;
    use classbot_core::engine::EngineSettings;
    use classbot_core::generation::{ChatCompletionsConfig, ChatCompletionsGenerator};
    use classbot_core::render::SvgSlideRenderer;
    use classbot_core::storage::SqliteStorage;

    let dir = tempfile::TempDir::new().unwrap();
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let generator = ChatCompletionsGenerator::new(ChatCompletionsConfig {
        api_key: "test-key".into(),
        base_url: base_url.into(),
        model: "gpt-4".into(),
    })
    .unwrap();
    let engine = Engine::new(
        Arc::clone(&storage) as Arc<dyn classbot_core::storage::Storage>,
        Arc::new(generator),
        Arc::new(SvgSlideRenderer::new(dir.path().join("slides")).unwrap()),
        EngineSettings {
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
        },
    );
    let context = BotContext::new(
        TelegramClient::with_base_url("TOKEN".into(), base_url),
        engine,
        HashSet::from([1]),
        HashSet::from([-100]),
    );
    TestBot {
        context,
        storage,
        dir,
    }
}
