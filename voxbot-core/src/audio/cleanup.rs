//! src/audio/cleanup.rs
//!
//! Named teardown procedures for each way a playback pipeline can end.
//! Steps always run in the order
//! voice stream -> transcoder stream -> transcoder process -> local file -> voice client,
//! and a failing step never prevents the next one from running.

use std::sync::Arc;

use tracing::info;

use crate::audio::disposer::AudioDisposer;
use crate::audio::media::MediaFetcher;
use crate::audio::store::AudioStore;
use crate::GuildContext;

pub struct AudioCleanupOrganizer {
    store: Arc<AudioStore>,
    disposer: Arc<AudioDisposer>,
    fetcher: Arc<dyn MediaFetcher>,
}

impl AudioCleanupOrganizer {
    pub fn new(store: Arc<AudioStore>, disposer: Arc<AudioDisposer>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self { store, disposer, fetcher }
    }

    /// Everything, including the voice client. No-op when the bot is not
    /// connected in `guild`. Returns whether a teardown happened.
    pub async fn full_disconnect(&self, guild: &GuildContext) -> bool {
        info!("{guild} Checking if bot is connected to a channel in guild {}", guild.name);
        if !self.store.contains_voice_client(guild.id) {
            info!("{guild} Bot is not in a channel for guild {}", guild.name);
            return false;
        }

        self.disposer.cleanup_voice_stream(guild).await;
        self.disposer.cleanup_transcoder_stream(guild).await;
        self.disposer.cleanup_transcoder_process(guild).await;
        self.fetcher.delete_local_file(guild).await;
        self.disposer.cleanup_voice_client(guild).await;

        info!(
            "{guild} Disconnected from voice on {}, disposed of all stream(s)/process(es)/client(s), and deleted music file",
            guild.name
        );
        true
    }

    pub async fn download_failure(&self, guild: &GuildContext) {
        self.fetcher.delete_local_file(guild).await;
    }

    pub async fn transcoder_setup_failure(&self, guild: &GuildContext) {
        self.disposer.cleanup_transcoder_stream(guild).await;
        self.disposer.cleanup_transcoder_process(guild).await;
        self.fetcher.delete_local_file(guild).await;
    }

    pub async fn pcm_stream_setup_failure(&self, guild: &GuildContext) {
        self.disposer.cleanup_voice_stream(guild).await;
        self.disposer.cleanup_transcoder_stream(guild).await;
        self.disposer.cleanup_transcoder_process(guild).await;
        self.fetcher.delete_local_file(guild).await;
    }

    /// Natural end of a track or skip. The local file is deleted by the
    /// session service once the pipeline unwinds.
    pub async fn post_track(&self, guild: &GuildContext) {
        self.disposer.cleanup_voice_stream(guild).await;
        self.disposer.cleanup_transcoder_stream(guild).await;
        self.disposer.cleanup_transcoder_process(guild).await;
    }
}
