pub(crate) mod callback;
pub(crate) mod message;

use anyhow::Result;
use classbot_core::navigator::SlideView;
use classbot_core::poll::QuestionView;
use classbot_core::{EngineError, UserId};
use tracing::{debug, warn};

use crate::bot::BotContext;
use crate::reactions::{poll_keyboard, slide_keyboard};
use crate::replies::{question_text, slide_caption, split_message};

/// Where a reply goes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReplyTarget {
    pub chat: i64,
    pub reply_to: Option<i64>,
}

#[derive(Debug)]
pub(crate) enum Reply {
    Text(String),
    Slide { presenter: UserId, view: SlideView },
    Question { owner: UserId, view: QuestionView },
}

pub(crate) async fn send_reply(
    context: &BotContext,
    target: ReplyTarget,
    reply: Reply,
) -> Result<()> {
    match reply {
        Reply::Text(text) => send_text(context, target, &text).await,
        Reply::Slide { presenter, view } => {
            let caption = slide_caption(&view);
            context
                .client()
                .send_document(
                    target.chat,
                    view.slide.path(),
                    Some(&caption),
                    Some(&slide_keyboard(presenter)),
                )
                .await?;
            Ok(())
        }
        Reply::Question { owner, view } => {
            let keyboard = poll_keyboard(owner, view.options.len());
            context
                .client()
                .send_message(
                    target.chat,
                    &question_text(&view),
                    target.reply_to,
                    Some(&keyboard),
                )
                .await?;
            Ok(())
        }
    }
}

/// Sends `text` in as many messages as it takes; only the first one replies.
pub(crate) async fn send_text(
    context: &BotContext,
    target: ReplyTarget,
    text: &str,
) -> Result<()> {
    let mut reply_to = target.reply_to;
    for chunk in split_message(text) {
        context
            .client()
            .send_message(target.chat, &chunk, reply_to.take(), None)
            .await?;
    }
    Ok(())
}

/// Collaborator failures are worth a warning; the rest are user mistakes.
pub(crate) fn log_engine_error(err: &EngineError) {
    match err {
        EngineError::Storage(_) | EngineError::Generation(_) | EngineError::Render(_) => {
            warn!(error = ?err, "command failed");
        }
        _ => debug!("command rejected: {err}"),
    }
}
