pub mod command_handler;
pub mod commands;
pub mod slashcommands;

pub use command_handler::DiscordCommandHandler;
pub use commands::{parse_command, BotCommand, CommandError};
