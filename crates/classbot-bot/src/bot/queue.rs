use std::collections::HashMap;
use std::sync::Arc;

use classbot_core::UserId;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bot::context::BotContext;
use crate::handlers::callback::handle_callback;
use crate::handlers::message::handle_message;
use crate::reactions;
use crate::telegram::{CallbackQuery, Message};

/// An update the gateway acts on.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(Message),
    Callback(CallbackQuery),
}

/// Queue key: the user whose session the event touches. Commands are keyed
/// by their sender, reactions by the owner of the poll or presentation, so
/// every event for one session is handled in arrival order.
type QueueKey = UserId;

pub(crate) type UserQueueMap = Arc<Mutex<HashMap<QueueKey, mpsc::UnboundedSender<Inbound>>>>;

pub(crate) fn new_user_queues() -> UserQueueMap {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Drops updates the bot must ignore and enqueues the rest on their
/// session's queue.
pub(crate) async fn dispatch(
    queues: &UserQueueMap,
    context: &Arc<BotContext>,
    shutdown: &CancellationToken,
    inbound: Inbound,
) {
    let key = match &inbound {
        Inbound::Message(message) => {
            if !should_process_message(context, message) {
                return;
            }
            message.from.as_ref().map(|user| user.id)
        }
        Inbound::Callback(query) => {
            if !should_process_callback(context, query) {
                return;
            }
            Some(callback_key(query))
        }
    };
    let Some(key) = key else {
        return;
    };
    enqueue(queues, context, shutdown, key, inbound).await;
}

/// Commands need an allowlisted sender, and in groups an allowlisted chat.
pub(crate) fn should_process_message(context: &BotContext, message: &Message) -> bool {
    if message.chat.is_group() && !context.is_allowed_chat(message.chat.id) {
        debug!(chat = message.chat.id, "ignoring non-allowlisted group chat");
        return false;
    }

    let Some(user) = message.from.as_ref() else {
        debug!(chat = message.chat.id, "ignoring message without sender");
        return false;
    };

    if user.is_bot {
        return false;
    }

    if !context.is_allowed_user(user.id) {
        warn!(user = user.id, chat = message.chat.id, "denied user");
        return false;
    }

    true
}

/// Anyone in an allowlisted chat may react; elsewhere only allowlisted users.
pub(crate) fn should_process_callback(context: &BotContext, query: &CallbackQuery) -> bool {
    if query.from.is_bot {
        return false;
    }
    let in_allowed_chat = query
        .message
        .as_ref()
        .is_some_and(|message| context.is_allowed_chat(message.chat.id));
    if in_allowed_chat || context.is_allowed_user(query.from.id) {
        return true;
    }
    debug!(user = query.from.id, "ignoring reaction from outside the allowlist");
    false
}

fn callback_key(query: &CallbackQuery) -> QueueKey {
    query
        .data
        .as_deref()
        .and_then(reactions::decode)
        .map_or(query.from.id, |(target, _)| target.owner())
}

async fn enqueue(
    queues: &UserQueueMap,
    context: &Arc<BotContext>,
    shutdown: &CancellationToken,
    key: QueueKey,
    inbound: Inbound,
) {
    let sender = {
        let mut queues = queues.lock().await;
        if let Some(sender) = queues.get(&key) {
            sender.clone()
        } else {
            let (sender, receiver) = mpsc::unbounded_channel();
            spawn_queue_worker(key, receiver, Arc::clone(context), shutdown.clone());
            queues.insert(key, sender.clone());
            sender
        }
    };

    if let Err(err) = sender.send(inbound) {
        let inbound = err.0;
        let (sender, receiver) = mpsc::unbounded_channel();
        spawn_queue_worker(key, receiver, Arc::clone(context), shutdown.clone());
        {
            let mut queues = queues.lock().await;
            queues.insert(key, sender.clone());
        }
        let _ = sender.send(inbound);
    }
}

fn spawn_queue_worker(
    key: QueueKey,
    mut receiver: mpsc::UnboundedReceiver<Inbound>,
    context: Arc<BotContext>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let inbound = tokio::select! {
                () = shutdown.cancelled() => break,
                inbound = receiver.recv() => match inbound {
                    Some(inbound) => inbound,
                    None => break,
                },
            };
            let result = match inbound {
                Inbound::Message(message) => handle_message(context.as_ref(), message).await,
                Inbound::Callback(query) => handle_callback(context.as_ref(), query).await,
            };
            if let Err(err) = result {
                warn!(user = key, "update handling failed: {err:#}");
            }
        }
    });
}
