//! Reaction symbols shared by the gateway and the engine.

pub const FORWARD: &str = "➡️";
pub const BACKWARD: &str = "⬅️";

/// Option symbols in list order; index `i` selects option `i`.
pub const OPTION_SYMBOLS: [&str; 4] = ["🇦", "🇧", "🇨", "🇩"];

/// Option labels matching [`OPTION_SYMBOLS`].
pub const OPTION_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Forward,
    Backward,
    Option(usize),
}

impl Reaction {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            FORWARD => Some(Self::Forward),
            BACKWARD => Some(Self::Backward),
            _ => OPTION_SYMBOLS
                .iter()
                .position(|candidate| *candidate == symbol)
                .map(Self::Option),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Forward => FORWARD,
            Self::Backward => BACKWARD,
            Self::Option(index) => OPTION_SYMBOLS.get(index).copied().unwrap_or("?"),
        }
    }
}

pub fn option_label(index: usize) -> Option<char> {
    OPTION_LABELS.get(index).copied()
}

pub fn option_index(label: char) -> Option<usize> {
    OPTION_LABELS
        .iter()
        .position(|candidate| *candidate == label.to_ascii_uppercase())
}
