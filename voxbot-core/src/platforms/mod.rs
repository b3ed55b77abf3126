// File: src/platforms/mod.rs

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

use crate::{Error, GuildContext};
use voxbot_common::models::AudioApplication;

/// Write half of an outbound voice stream. Accepts interleaved s16le PCM.
pub type PcmWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// The part of the chat platform that can put the bot into a voice channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        guild: &GuildContext,
        channel_id: Id<ChannelMarker>,
    ) -> Result<Arc<dyn VoiceClient>, Error>;

    /// Clears the bot's own voice channel in `guild`.
    async fn clear_own_voice_channel(&self, guild: &GuildContext) -> Result<(), Error>;
}

/// An open connection to exactly one voice channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceClient: Send + Sync {
    fn channel_id(&self) -> Id<ChannelMarker>;

    async fn create_outbound_stream(&self, application: AudioApplication) -> Result<PcmWriter, Error>;

    async fn stop(&self) -> Result<(), Error>;

    fn dispose(&self);
}

pub mod discord;
