//! Inline-keyboard buttons standing in for message reactions.
//!
//! Callback data is `<scope>:<owner>:<symbol>`, where scope `p` targets the
//! owner's poll and `s` the owner's presentation.

use classbot_core::UserId;
use classbot_core::symbols::Reaction;

use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

const POLL_SCOPE: &str = "p";
const SLIDES_SCOPE: &str = "s";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReactionTarget {
    Poll { owner: UserId },
    Slides { presenter: UserId },
}

impl ReactionTarget {
    pub(crate) fn owner(self) -> UserId {
        match self {
            Self::Poll { owner } => owner,
            Self::Slides { presenter } => presenter,
        }
    }
}

pub(crate) fn encode(target: ReactionTarget, reaction: Reaction) -> String {
    let scope = match target {
        ReactionTarget::Poll { .. } => POLL_SCOPE,
        ReactionTarget::Slides { .. } => SLIDES_SCOPE,
    };
    format!("{scope}:{}:{}", target.owner(), reaction.symbol())
}

pub(crate) fn decode(data: &str) -> Option<(ReactionTarget, Reaction)> {
    let mut parts = data.splitn(3, ':');
    let scope = parts.next()?;
    let owner = parts.next()?.parse::<UserId>().ok()?;
    let reaction = Reaction::from_symbol(parts.next()?)?;
    let target = match scope {
        POLL_SCOPE => ReactionTarget::Poll { owner },
        SLIDES_SCOPE => ReactionTarget::Slides { presenter: owner },
        _ => return None,
    };
    Some((target, reaction))
}

/// Option buttons on the first row, navigation on the second.
pub(crate) fn poll_keyboard(owner: UserId, option_count: usize) -> InlineKeyboardMarkup {
    let target = ReactionTarget::Poll { owner };
    let options = (0..option_count)
        .map(|index| button(target, Reaction::Option(index)))
        .collect();
    InlineKeyboardMarkup {
        inline_keyboard: vec![options, navigation_row(target)],
    }
}

pub(crate) fn slide_keyboard(presenter: UserId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![navigation_row(ReactionTarget::Slides { presenter })],
    }
}

fn navigation_row(target: ReactionTarget) -> Vec<InlineKeyboardButton> {
    vec![
        button(target, Reaction::Backward),
        button(target, Reaction::Forward),
    ]
}

fn button(target: ReactionTarget, reaction: Reaction) -> InlineKeyboardButton {
    InlineKeyboardButton {
        text: reaction.symbol().to_string(),
        callback_data: encode(target, reaction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_data_round_trips_for_every_button() {
        let keyboard = poll_keyboard(-42, 4);
        for button in keyboard.inline_keyboard.iter().flatten() {
            let (target, reaction) = decode(&button.callback_data).unwrap();
            assert_eq!(target, ReactionTarget::Poll { owner: -42 });
            assert_eq!(reaction.symbol(), button.text);
        }
    }

    #[test]
    fn callback_data_fits_telegram_limit() {
        let data = encode(ReactionTarget::Poll { owner: i64::MIN }, Reaction::Option(3));
        assert!(data.len() <= 64);
    }

    #[test]
    fn poll_keyboard_offers_only_existing_options() {
        let keyboard = poll_keyboard(1, 2);
        let labels: Vec<_> = keyboard.inline_keyboard[0]
            .iter()
            .map(|button| button.text.as_str())
            .collect();
        assert_eq!(labels, ["🇦", "🇧"]);
        assert_eq!(keyboard.inline_keyboard[1].len(), 2);
    }

    #[test]
    fn rejects_foreign_callback_data() {
        assert_eq!(decode("x:1:➡️"), None);
        assert_eq!(decode("p:abc:➡️"), None);
        assert_eq!(decode("p:1:👍"), None);
        assert_eq!(decode("p:1"), None);
        assert_eq!(
            decode("s:9:⬅️"),
            Some((ReactionTarget::Slides { presenter: 9 }, Reaction::Backward))
        );
    }
}
