pub(crate) mod context;
pub(crate) mod queue;

pub(crate) use context::BotContext;
pub(crate) use queue::{Inbound, dispatch, new_user_queues};
