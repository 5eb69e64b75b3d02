use anyhow::{Result, bail};
use classbot_core::coursework::{Attachment, HomeworkUpload};
use classbot_core::{EngineResult, UserId};
use tracing::info;

use crate::bot::BotContext;
use crate::commands::{BotCommand, ParsedCommand, parse_command};
use crate::handlers::{Reply, ReplyTarget, log_engine_error, send_reply, send_text};
use crate::replies::{
    folders_text, help_text, homework_list_text, homework_stored_text, released_homework_text,
    results_text,
};
use crate::telegram::{Document, Message};

// Telegram refuses bot downloads above 20MB.
const MAX_DOCUMENT_BYTES: u64 = 20 * 1024 * 1024;
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

pub(crate) async fn handle_message(context: &BotContext, message: Message) -> Result<()> {
    let Some(user) = message.from.as_ref().map(|user| user.id) else {
        return Ok(());
    };
    let target = ReplyTarget {
        chat: message.chat.id,
        reply_to: Some(message.message_id),
    };

    if let Some(document) = message.document.as_ref() {
        if let Some(ParsedCommand::Command(BotCommand::HomeworkUpload {
            title,
            due_date,
            description,
        })) = message.caption.as_deref().and_then(parse_command)
        {
            let upload = HomeworkUpload {
                title,
                due_date,
                description,
                attachment: None,
            };
            return handle_homework_document(context, target, user, document, upload).await;
        }
        return handle_document(context, target, document).await;
    }

    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };
    let command = match parse_command(text) {
        None => return Ok(()),
        Some(ParsedCommand::Unknown) => {
            return send_text(context, target, "Unknown command. Send /help for the list.").await;
        }
        Some(ParsedCommand::Usage(usage)) => {
            return send_text(context, target, &format!("Usage: {usage}")).await;
        }
        Some(ParsedCommand::Command(command)) => command,
    };

    info!(user, chat = target.chat, ?command, "accepted command");
    let outcome = run_command(context, target, user, command).await?;
    deliver(context, target, outcome).await
}

async fn deliver(
    context: &BotContext,
    target: ReplyTarget,
    outcome: EngineResult<Reply>,
) -> Result<()> {
    match outcome {
        Ok(reply) => send_reply(context, target, reply).await,
        Err(err) => {
            log_engine_error(&err);
            send_text(context, target, &err.user_message()).await
        }
    }
}

/// The outer error is a delivery failure; the inner one becomes the reply.
async fn run_command(
    context: &BotContext,
    target: ReplyTarget,
    user: UserId,
    command: BotCommand,
) -> Result<EngineResult<Reply>> {
    let engine = context.engine();
    let outcome = match command {
        BotCommand::Help => Ok(Reply::Text(help_text())),
        BotCommand::Outline { minutes } => {
            send_text(context, target, "Generating the outline...").await?;
            engine
                .generate_outline(minutes)
                .await
                .map(|outline| Reply::Text(outline.text))
        }
        BotCommand::SaveOutline { name } => engine
            .save_outline(&name)
            .await
            .map(|outline| Reply::Text(format!("Saved outline \"{}\".", outline.name))),
        BotCommand::Present { folder } => engine
            .start_presentation(user, folder.as_deref())
            .await
            .map(|view| Reply::Slide {
                presenter: user,
                view,
            }),
        BotCommand::Next => engine.next_slide(user).map(|view| Reply::Slide {
            presenter: user,
            view,
        }),
        BotCommand::Back => engine.previous_slide(user).map(|view| Reply::Slide {
            presenter: user,
            view,
        }),
        BotCommand::Current => engine.current_slide(user).map(|view| Reply::Slide {
            presenter: user,
            view,
        }),
        BotCommand::End => engine
            .end_presentation(user)
            .map(|()| Reply::Text("Presentation ended.".to_string())),
        BotCommand::SaveSlides { folder } => engine
            .save_slides(user, &folder)
            .await
            .map(|count| Reply::Text(format!("Saved {count} slide(s) to \"{folder}\"."))),
        BotCommand::Folders => engine
            .list_folders(user)
            .await
            .map(|folders| Reply::Text(folders_text(&folders))),
        BotCommand::Poll { count } => {
            send_text(context, target, "Generating poll questions...").await?;
            engine
                .create_poll(user, count)
                .await
                .map(|view| Reply::Question { owner: user, view })
        }
        BotCommand::Results { question } => engine
            .poll_results(user, question)
            .map(|views| Reply::Text(results_text(&views))),
        BotCommand::EndPoll => engine.end_poll(user).map(|views| {
            Reply::Text(format!(
                "Poll closed. Final results:\n\n{}",
                results_text(&views)
            ))
        }),
        BotCommand::Quiz { count, name } => {
            send_text(context, target, "Generating the quiz...").await?;
            engine.create_quiz(&name, count).await.map(|quiz| {
                Reply::Text(format!(
                    "Saved quiz \"{name}\". Post it without answers with \
                     /releasequiz {name}\n\n{}",
                    quiz.text
                ))
            })
        }
        BotCommand::ReleaseQuiz { name } => {
            send_text(context, target, "Preparing the quiz...").await?;
            engine
                .release_quiz(&name)
                .await
                .map(|text| Reply::Text(format!("Quiz: {name}\n\n{text}")))
        }
        BotCommand::HomeworkUpload {
            title,
            due_date,
            description,
        } => {
            let upload = HomeworkUpload {
                title,
                due_date,
                description,
                attachment: None,
            };
            engine
                .add_homework(user, upload)
                .await
                .map(|homework| Reply::Text(homework_stored_text(&homework)))
        }
        BotCommand::HomeworkList => engine
            .list_homework()
            .await
            .map(|homework| Reply::Text(homework_list_text(&homework))),
        BotCommand::MakeHomework { name, due_date } => {
            send_text(context, target, "Generating the assignment...").await?;
            engine.create_homework(&name, &due_date).await.map(|homework| {
                Reply::Text(format!(
                    "Saved homework \"{name}\" (due {}). Post it without solutions with \
                     /releasehomework {name}\n\n{}",
                    homework.due_date, homework.content
                ))
            })
        }
        BotCommand::ReleaseHomework { name } => {
            send_text(context, target, "Preparing the assignment...").await?;
            engine
                .release_homework(&name)
                .await
                .map(|homework| Reply::Text(released_homework_text(&homework)))
        }
    };
    Ok(outcome)
}

/// Stores an uploaded plain-text file as lecture material.
async fn handle_document(
    context: &BotContext,
    target: ReplyTarget,
    document: &Document,
) -> Result<()> {
    let file_name = document
        .file_name
        .clone()
        .unwrap_or_else(|| "upload.txt".to_string());
    if !is_text_document(document) {
        return send_text(
            context,
            target,
            "Only plain-text lecture materials (.txt, .md) are supported.",
        )
        .await;
    }
    let Some((file_path, bytes)) = download_document(context, target, document).await? else {
        return Ok(());
    };
    let Ok(text) = String::from_utf8(bytes) else {
        return send_text(context, target, "That file is not valid UTF-8 text.").await;
    };
    if text.trim().is_empty() {
        return send_text(context, target, "That file is empty.").await;
    }

    let chars = text.chars().count();
    match context
        .engine()
        .add_material(&file_name, Some(file_path), text)
        .await
    {
        Ok(material) => {
            let reply = format!(
                "Stored {} ({chars} characters). Send /outline to generate an outline.",
                material.file_name
            );
            send_text(context, target, &reply).await
        }
        Err(err) => {
            log_engine_error(&err);
            send_text(context, target, &err.user_message()).await
        }
    }
}

/// Stores an assignment file sent with a `/homework upload` caption.
async fn handle_homework_document(
    context: &BotContext,
    target: ReplyTarget,
    user: UserId,
    document: &Document,
    mut upload: HomeworkUpload,
) -> Result<()> {
    let Some((_, bytes)) = download_document(context, target, document).await? else {
        return Ok(());
    };
    upload.attachment = Some(Attachment {
        file_name: document
            .file_name
            .clone()
            .unwrap_or_else(|| "homework".to_string()),
        bytes,
    });
    let outcome = context
        .engine()
        .add_homework(user, upload)
        .await
        .map(|homework| Reply::Text(homework_stored_text(&homework)));
    deliver(context, target, outcome).await
}

/// Fetches the document's Telegram path and bytes, or replies and returns
/// `None` when it is too large to download.
async fn download_document(
    context: &BotContext,
    target: ReplyTarget,
    document: &Document,
) -> Result<Option<(String, Vec<u8>)>> {
    if document
        .file_size
        .is_some_and(|size| size > MAX_DOCUMENT_BYTES)
    {
        send_text(context, target, "That file is too large to download (20MB limit).").await?;
        return Ok(None);
    }
    let file = context.client().get_file(&document.file_id).await?;
    let Some(file_path) = file.file_path else {
        bail!("Telegram returned no file path for {}", document.file_id);
    };
    let bytes = context.client().download_file(&file_path).await?;
    Ok(Some((file_path, bytes)))
}

fn is_text_document(document: &Document) -> bool {
    if document
        .mime_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with("text/"))
    {
        return true;
    }
    document
        .file_name
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(_, extension)| {
            TEXT_EXTENSIONS
                .iter()
                .any(|known| extension.eq_ignore_ascii_case(known))
        })
}
