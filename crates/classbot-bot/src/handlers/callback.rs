use anyhow::Result;
use classbot_core::UserId;
use classbot_core::poll::{ReactionOutcome, VoteReceipt};
use classbot_core::symbols::{Reaction, option_label};

use crate::bot::BotContext;
use crate::handlers::{Reply, ReplyTarget, log_engine_error, send_reply};
use crate::reactions::{self, ReactionTarget};
use crate::telegram::CallbackQuery;

/// Toast text shown to the tapping user, and an optional message for the chat.
type ReactionResult = (Option<String>, Option<Reply>);

pub(crate) async fn handle_callback(context: &BotContext, query: CallbackQuery) -> Result<()> {
    let Some((target, reaction)) = query.data.as_deref().and_then(reactions::decode) else {
        return context
            .client()
            .answer_callback_query(&query.id, Some("Unknown action."))
            .await;
    };

    let user = query.from.id;
    let (notice, reply) = match target {
        ReactionTarget::Poll { owner } => poll_reaction(context, owner, user, reaction),
        ReactionTarget::Slides { presenter } => slide_reaction(context, presenter, user, reaction),
    };

    context
        .client()
        .answer_callback_query(&query.id, notice.as_deref())
        .await?;
    if let (Some(reply), Some(message)) = (reply, query.message.as_ref()) {
        let target = ReplyTarget {
            chat: message.chat.id,
            reply_to: None,
        };
        send_reply(context, target, reply).await?;
    }
    Ok(())
}

fn poll_reaction(
    context: &BotContext,
    owner: UserId,
    user: UserId,
    reaction: Reaction,
) -> ReactionResult {
    if !matches!(reaction, Reaction::Option(_)) && user != owner {
        return (Some("Only the poll owner can change questions.".to_string()), None);
    }
    match context.engine().poll_react(owner, user, reaction) {
        Ok(ReactionOutcome::Navigated { view, moved: true }) => {
            (None, Some(Reply::Question { owner, view }))
        }
        Ok(ReactionOutcome::Navigated { moved: false, .. }) => {
            (Some("No more questions that way.".to_string()), None)
        }
        Ok(ReactionOutcome::Voted(receipt)) => (Some(vote_notice(&receipt)), None),
        Err(err) => {
            log_engine_error(&err);
            (Some(err.user_message()), None)
        }
    }
}

fn slide_reaction(
    context: &BotContext,
    presenter: UserId,
    user: UserId,
    reaction: Reaction,
) -> ReactionResult {
    if user != presenter {
        return (Some("Only the presenter can change slides.".to_string()), None);
    }
    let engine = context.engine();
    let result = match reaction {
        Reaction::Forward => engine.next_slide(presenter),
        Reaction::Backward => engine.previous_slide(presenter),
        Reaction::Option(_) => return (None, None),
    };
    match result {
        Ok(view) => (None, Some(Reply::Slide { presenter, view })),
        Err(err) => {
            log_engine_error(&err);
            (Some(err.user_message()), None)
        }
    }
}

fn vote_notice(receipt: &VoteReceipt) -> String {
    let label = option_label(receipt.option).unwrap_or('?');
    match receipt.replaced {
        Some(previous) if previous != receipt.option => format!("Vote changed to {label}."),
        _ => format!("Vote recorded: {label}."),
    }
}
