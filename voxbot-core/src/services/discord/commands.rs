// File: src/services/discord/commands.rs
//
// Prefix-command parsing. A message addresses the bot when it starts with
// the configured prefix character or with a mention of the bot.

use thiserror::Error as ThisError;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;
use url::Url;

pub const ALLOWED_COMMANDS: [&str; 6] = ["ping", "join", "leave", "play", "skip", "help"];

/// Answer to both the `ping` prefix command and `/ping`.
pub const PING_REPLY: &str = "pong";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Ping,
    Help,
    Join,
    Leave,
    Play(Url),
    Skip,
}

/// Problems with an addressed message. The display text is the reply.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CommandError {
    #[error("Please specify a url")]
    MissingUrl,
    #[error("Please specify only one url")]
    TooManyUrls,
    #[error("Please specify a valid url")]
    InvalidUrl,
    #[error("Unknown command: {0}")]
    Unknown(String),
}

/// Returns the text after the prefix or bot mention, or `None` when the
/// message is not meant for the bot.
pub fn strip_invocation(prefix: char, bot_id: Option<Id<UserMarker>>, content: &str) -> Option<&str> {
    if let Some(rest) = content.strip_prefix(prefix) {
        return Some(rest);
    }

    let bot_id = bot_id?;
    [format!("<@{bot_id}>"), format!("<@!{bot_id}>")]
        .iter()
        .find_map(|mention| content.strip_prefix(mention.as_str()))
        .map(str::trim_start)
}

/// `None` when the message does not address the bot at all.
pub fn parse_command(
    prefix: char,
    bot_id: Option<Id<UserMarker>>,
    content: &str,
) -> Option<Result<BotCommand, CommandError>> {
    let body = strip_invocation(prefix, bot_id, content)?;
    let mut tokens = body.split_whitespace();
    let name = tokens.next()?.to_ascii_lowercase();

    let command = match name.as_str() {
        "ping" => Ok(BotCommand::Ping),
        "help" => Ok(BotCommand::Help),
        "join" => Ok(BotCommand::Join),
        "leave" => Ok(BotCommand::Leave),
        "skip" => Ok(BotCommand::Skip),
        "play" => parse_play(tokens.collect()),
        _ => Err(CommandError::Unknown(name)),
    };
    Some(command)
}

fn parse_play(args: Vec<&str>) -> Result<BotCommand, CommandError> {
    let url = match args.as_slice() {
        [] => return Err(CommandError::MissingUrl),
        [url] => *url,
        _ => return Err(CommandError::TooManyUrls),
    };

    let url = Url::parse(url).map_err(|_| CommandError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CommandError::InvalidUrl);
    }
    Ok(BotCommand::Play(url))
}

pub fn help_text() -> String {
    format!("Allowed: {}", ALLOWED_COMMANDS.join(","))
}
