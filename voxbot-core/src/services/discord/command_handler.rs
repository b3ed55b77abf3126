// File: src/services/discord/command_handler.rs

use std::sync::Arc;

use tracing::{debug, info, warn};
use twilight_cache_inmemory::InMemoryCache;
use twilight_http::Client as HttpClient;
use twilight_model::gateway::payload::incoming::MessageCreate;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};
use twilight_model::id::Id;

use crate::audio::{AudioService, ConnectOutcome, LeaveOutcome, PlayOutcome, SkipOutcome};
use crate::platforms::discord::DiscordEvent;
use crate::services::discord::commands::{help_text, parse_command, BotCommand, CommandError, PING_REPLY};
use crate::services::discord::slashcommands::handle_interaction_create;
use crate::{Error, GuildContext};

pub const JOIN_VOICE_FIRST: &str = "Please join a voice channel first";
pub const GUILD_ONLY: &str = "Audio commands only work inside a server";

pub fn connect_reply(outcome: ConnectOutcome) -> Option<&'static str> {
    match outcome {
        ConnectOutcome::Connected => None,
        ConnectOutcome::AlreadyConnected => Some("Already connected to a voice channel"),
        ConnectOutcome::Failed => Some("Unable to join the voice channel"),
    }
}

pub fn leave_reply(outcome: LeaveOutcome) -> Option<&'static str> {
    match outcome {
        LeaveOutcome::Disconnected => None,
        LeaveOutcome::NotConnected => Some("Not in a voice channel"),
    }
}

pub fn play_reply(outcome: PlayOutcome) -> Option<&'static str> {
    match outcome {
        PlayOutcome::Finished | PlayOutcome::Cancelled => None,
        PlayOutcome::Busy => Some("Already playing something, skip it first"),
        PlayOutcome::NotConnected => Some("Not in a voice channel, use join first"),
        PlayOutcome::DownloadFailed => Some("Unable to download that url"),
        PlayOutcome::TranscoderFailed | PlayOutcome::PcmStreamFailed => Some("Unable to start playback"),
        PlayOutcome::Interrupted => Some("Playback was interrupted"),
    }
}

pub fn skip_reply(outcome: SkipOutcome) -> Option<&'static str> {
    match outcome {
        SkipOutcome::Skipped => None,
        SkipOutcome::NothingPlaying => Some("Nothing is playing"),
    }
}

/// Turns inbound Discord events into bot actions and chat replies.
pub struct DiscordCommandHandler {
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    audio: Arc<AudioService>,
    prefix: char,
}

impl DiscordCommandHandler {
    pub fn new(http: Arc<HttpClient>, cache: Arc<InMemoryCache>, audio: Arc<AudioService>, prefix: char) -> Self {
        Self { http, cache, audio, prefix }
    }

    pub async fn handle_event(&self, event: DiscordEvent) -> Result<(), Error> {
        match event {
            DiscordEvent::Message(msg) => self.handle_message(&msg).await,
            DiscordEvent::Interaction(interaction) => {
                handle_interaction_create(self.http.clone(), &interaction).await
            }
        }
    }

    pub async fn handle_message(&self, msg: &MessageCreate) -> Result<(), Error> {
        if msg.author.bot {
            return Ok(());
        }

        let bot_id = self.cache.current_user().map(|user| user.id);
        let Some(parsed) = parse_command(self.prefix, bot_id, &msg.content) else {
            return Ok(());
        };

        let command = match parsed {
            Ok(command) => command,
            Err(CommandError::Unknown(name)) => {
                debug!("Ignoring unknown command '{name}' from {}", msg.author.name);
                return Ok(());
            }
            Err(e) => return self.reply(msg, &e.to_string()).await,
        };

        info!("{} invoked {command:?}", msg.author.name);
        match command {
            BotCommand::Ping => self.reply(msg, PING_REPLY).await,
            BotCommand::Help => self.reply(msg, &help_text()).await,
            audio_command => {
                let Some(guild_id) = msg.guild_id else {
                    return self.reply(msg, GUILD_ONLY).await;
                };
                self.handle_audio_command(msg, guild_id, audio_command).await
            }
        }
    }

    async fn handle_audio_command(
        &self,
        msg: &MessageCreate,
        guild_id: Id<GuildMarker>,
        command: BotCommand,
    ) -> Result<(), Error> {
        let guild = self.guild_context(guild_id);

        let reply = match command {
            BotCommand::Join => {
                let Some(channel_id) = self.voice_channel_of(msg.author.id, guild_id) else {
                    return self.reply(msg, JOIN_VOICE_FIRST).await;
                };
                connect_reply(self.audio.join(&guild, channel_id).await)
            }
            BotCommand::Leave => leave_reply(self.audio.leave(&guild).await),
            BotCommand::Play(url) => play_reply(self.audio.play(&guild, &url).await),
            BotCommand::Skip => skip_reply(self.audio.skip(&guild).await),
            BotCommand::Ping | BotCommand::Help => None,
        };

        match reply {
            Some(text) => self.reply(msg, text).await,
            None => Ok(()),
        }
    }

    fn guild_context(&self, guild_id: Id<GuildMarker>) -> GuildContext {
        let name = self
            .cache
            .guild(guild_id)
            .map(|guild| guild.name().to_string())
            .unwrap_or_else(|| guild_id.to_string());
        GuildContext::new(guild_id, name)
    }

    fn voice_channel_of(&self, user_id: Id<UserMarker>, guild_id: Id<GuildMarker>) -> Option<Id<ChannelMarker>> {
        self.cache
            .voice_state(user_id, guild_id)
            .map(|state| state.channel_id())
    }

    async fn reply(&self, msg: &MessageCreate, text: &str) -> Result<(), Error> {
        if let Err(e) = self
            .http
            .create_message(msg.channel_id)
            .content(text)
            .reply(msg.id)
            .await
        {
            warn!("Error sending Discord reply in {}: {e:?}", msg.channel_id);
            return Err(Error::Platform(format!("Error sending Discord message: {e}")));
        }
        Ok(())
    }
}
