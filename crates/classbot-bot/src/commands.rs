use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BotCommand {
    Help,
    Outline { minutes: Option<u32> },
    SaveOutline { name: String },
    Present { folder: Option<String> },
    Next,
    Back,
    Current,
    End,
    SaveSlides { folder: String },
    Folders,
    Poll { count: Option<u32> },
    Results { question: Option<usize> },
    EndPoll,
    Quiz { count: Option<u32>, name: String },
    ReleaseQuiz { name: String },
    /// Sent as the caption of the assignment file, or alone for an
    /// assignment without one.
    HomeworkUpload {
        title: String,
        due_date: Option<String>,
        description: Option<String>,
    },
    HomeworkList,
    MakeHomework { name: String, due_date: String },
    ReleaseHomework { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParsedCommand {
    Command(BotCommand),
    /// A known command with arguments that do not fit; carries the usage line.
    Usage(&'static str),
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelegramCommandSpec {
    pub command: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Help,
    Outline,
    SaveOutline,
    Present,
    Next,
    Back,
    Current,
    End,
    SaveSlides,
    Folders,
    Poll,
    Results,
    EndPoll,
    Quiz,
    ReleaseQuiz,
    Homework,
    MakeHomework,
    ReleaseHomework,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommandDef {
    kind: CommandKind,
    patterns: &'static [&'static str],
    usage: &'static str,
    telegram_spec: TelegramCommandSpec,
}

const COMMAND_DEFS: &[CommandDef] = &[
    CommandDef {
        kind: CommandKind::Help,
        patterns: &["/help", "/start"],
        usage: "/help",
        telegram_spec: TelegramCommandSpec {
            command: "help",
            description: "List the available commands",
        },
    },
    CommandDef {
        kind: CommandKind::Outline,
        patterns: &["/outline"],
        usage: "/outline [minutes]",
        telegram_spec: TelegramCommandSpec {
            command: "outline",
            description: "Generate a lecture outline from uploaded materials",
        },
    },
    CommandDef {
        kind: CommandKind::SaveOutline,
        patterns: &["/save"],
        usage: "/save <name>",
        telegram_spec: TelegramCommandSpec {
            command: "save",
            description: "Save the generated outline under a name",
        },
    },
    CommandDef {
        kind: CommandKind::Present,
        patterns: &["/present"],
        usage: "/present [folder]",
        telegram_spec: TelegramCommandSpec {
            command: "present",
            description: "Present the current outline or a saved folder",
        },
    },
    CommandDef {
        kind: CommandKind::Next,
        patterns: &["/next"],
        usage: "/next",
        telegram_spec: TelegramCommandSpec {
            command: "next",
            description: "Show the next slide",
        },
    },
    CommandDef {
        kind: CommandKind::Back,
        patterns: &["/back", "/previous"],
        usage: "/back",
        telegram_spec: TelegramCommandSpec {
            command: "back",
            description: "Show the previous slide",
        },
    },
    CommandDef {
        kind: CommandKind::Current,
        patterns: &["/current"],
        usage: "/current",
        telegram_spec: TelegramCommandSpec {
            command: "current",
            description: "Show the current slide again",
        },
    },
    CommandDef {
        kind: CommandKind::End,
        patterns: &["/end"],
        usage: "/end",
        telegram_spec: TelegramCommandSpec {
            command: "end",
            description: "End the presentation",
        },
    },
    CommandDef {
        kind: CommandKind::SaveSlides,
        patterns: &["/saveslides"],
        usage: "/saveslides <folder>",
        telegram_spec: TelegramCommandSpec {
            command: "saveslides",
            description: "Save the presented slides into a folder",
        },
    },
    CommandDef {
        kind: CommandKind::Folders,
        patterns: &["/folders"],
        usage: "/folders",
        telegram_spec: TelegramCommandSpec {
            command: "folders",
            description: "List saved slide folders",
        },
    },
    CommandDef {
        kind: CommandKind::Poll,
        patterns: &["/poll"],
        usage: "/poll [questions]",
        telegram_spec: TelegramCommandSpec {
            command: "poll",
            description: "Start a live poll about the current outline",
        },
    },
    CommandDef {
        kind: CommandKind::Results,
        patterns: &["/results"],
        usage: "/results [question number]",
        telegram_spec: TelegramCommandSpec {
            command: "results",
            description: "Show poll results",
        },
    },
    CommandDef {
        kind: CommandKind::EndPoll,
        patterns: &["/endpoll"],
        usage: "/endpoll",
        telegram_spec: TelegramCommandSpec {
            command: "endpoll",
            description: "Close the poll and post final results",
        },
    },
    CommandDef {
        kind: CommandKind::Quiz,
        patterns: &["/quiz"],
        usage: "/quiz [questions] <name>",
        telegram_spec: TelegramCommandSpec {
            command: "quiz",
            description: "Generate and store a quiz about the current outline",
        },
    },
    CommandDef {
        kind: CommandKind::ReleaseQuiz,
        patterns: &["/releasequiz"],
        usage: "/releasequiz <name>",
        telegram_spec: TelegramCommandSpec {
            command: "releasequiz",
            description: "Post a stored quiz without its answers",
        },
    },
    CommandDef {
        kind: CommandKind::Homework,
        patterns: &["/homework"],
        usage: "/homework upload <title> | [due date] | [description], or /homework list",
        telegram_spec: TelegramCommandSpec {
            command: "homework",
            description: "Upload an assignment (as a file caption) or list assignments",
        },
    },
    CommandDef {
        kind: CommandKind::MakeHomework,
        patterns: &["/makehomework"],
        usage: "/makehomework <name> | <due date>",
        telegram_spec: TelegramCommandSpec {
            command: "makehomework",
            description: "Generate and store an assignment about the current outline",
        },
    },
    CommandDef {
        kind: CommandKind::ReleaseHomework,
        patterns: &["/releasehomework"],
        usage: "/releasehomework <name>",
        telegram_spec: TelegramCommandSpec {
            command: "releasehomework",
            description: "Post a stored assignment without its solutions",
        },
    },
];

pub(crate) fn telegram_command_specs() -> Vec<TelegramCommandSpec> {
    COMMAND_DEFS.iter().map(|def| def.telegram_spec).collect()
}

pub(crate) fn usage_lines() -> impl Iterator<Item = (&'static str, &'static str)> {
    COMMAND_DEFS
        .iter()
        .map(|def| (def.usage, def.telegram_spec.description))
}

/// Parses a chat message. `None` means the text is not a command at all.
pub(crate) fn parse_command(text: &str) -> Option<ParsedCommand> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (head, args) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(head, rest)| (head, rest.trim()));

    let Some(def) = COMMAND_DEFS.iter().find(|def| {
        def.patterns
            .iter()
            .any(|pattern| command_matches(head, pattern))
    }) else {
        return Some(ParsedCommand::Unknown);
    };

    let parsed = build_command(def.kind, args)
        .map_or(ParsedCommand::Usage(def.usage), ParsedCommand::Command);
    Some(parsed)
}

fn build_command(kind: CommandKind, args: &str) -> Option<BotCommand> {
    let command = match kind {
        CommandKind::Help => no_args(args, BotCommand::Help)?,
        CommandKind::Outline => BotCommand::Outline {
            minutes: optional_positive(args)?,
        },
        CommandKind::SaveOutline => BotCommand::SaveOutline {
            name: required_text(args)?,
        },
        CommandKind::Present => BotCommand::Present {
            folder: (!args.is_empty()).then(|| args.to_string()),
        },
        CommandKind::Next => no_args(args, BotCommand::Next)?,
        CommandKind::Back => no_args(args, BotCommand::Back)?,
        CommandKind::Current => no_args(args, BotCommand::Current)?,
        CommandKind::End => no_args(args, BotCommand::End)?,
        CommandKind::SaveSlides => BotCommand::SaveSlides {
            folder: required_text(args)?,
        },
        CommandKind::Folders => no_args(args, BotCommand::Folders)?,
        CommandKind::Poll => BotCommand::Poll {
            count: optional_positive(args)?,
        },
        CommandKind::Results => BotCommand::Results {
            // Users count questions from 1.
            question: optional_positive(args)?.map(|n: u32| n as usize - 1),
        },
        CommandKind::EndPoll => no_args(args, BotCommand::EndPoll)?,
        CommandKind::Quiz => quiz_command(args)?,
        CommandKind::ReleaseQuiz => BotCommand::ReleaseQuiz {
            name: required_text(args)?,
        },
        CommandKind::Homework => homework_command(args)?,
        CommandKind::MakeHomework => {
            let (name, due_date) = args.split_once('|')?;
            BotCommand::MakeHomework {
                name: required_text(name.trim())?,
                due_date: required_text(due_date.trim())?,
            }
        }
        CommandKind::ReleaseHomework => BotCommand::ReleaseHomework {
            name: required_text(args)?,
        },
    };
    Some(command)
}

/// `/quiz 5 midterm` or `/quiz midterm`; a leading number is the length.
fn quiz_command(args: &str) -> Option<BotCommand> {
    let (count, name) = match args.split_once(char::is_whitespace) {
        Some((first, rest)) if first.bytes().all(|byte| byte.is_ascii_digit()) => {
            let count = first.parse::<u32>().ok().filter(|value| *value > 0)?;
            (Some(count), rest.trim())
        }
        _ => (None, args),
    };
    Some(BotCommand::Quiz {
        count,
        name: required_text(name)?,
    })
}

fn homework_command(args: &str) -> Option<BotCommand> {
    let (action, rest) = args
        .split_once(char::is_whitespace)
        .map_or((args, ""), |(action, rest)| (action, rest.trim()));
    match action {
        "list" => no_args(rest, BotCommand::HomeworkList),
        "upload" => {
            let mut fields = rest.splitn(3, '|').map(str::trim);
            let title = required_text(fields.next()?)?;
            let mut optional = || fields.next().and_then(required_text);
            Some(BotCommand::HomeworkUpload {
                title,
                due_date: optional(),
                description: optional(),
            })
        }
        _ => None,
    }
}

fn no_args(args: &str, command: BotCommand) -> Option<BotCommand> {
    args.is_empty().then_some(command)
}

/// `Some(None)` for no argument, `None` when the argument is not a positive number.
#[allow(clippy::option_option)]
fn optional_positive(args: &str) -> Option<Option<u32>> {
    if args.is_empty() {
        return Some(None);
    }
    args.parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .map(Some)
}

fn required_text(args: &str) -> Option<String> {
    (!args.is_empty()).then(|| args.to_string())
}

fn command_matches(head: &str, command: &str) -> bool {
    if head == command {
        return true;
    }

    head.strip_prefix(command)
        .is_some_and(|stripped| stripped.starts_with('@'))
}
