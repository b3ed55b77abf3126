//! src/audio/disposer.rs
//!
//! Remove-then-release for each resource kind. Every method is best-effort:
//! absence is a no-op and failures are logged, never returned.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::audio::store::{AudioStore, SharedVoiceClient};
use crate::config::AudioSettings;
use crate::platforms::VoiceGateway;
use crate::GuildContext;

pub struct AudioDisposer {
    store: Arc<AudioStore>,
    gateway: Arc<dyn VoiceGateway>,
    settings: Arc<AudioSettings>,
}

impl AudioDisposer {
    pub fn new(store: Arc<AudioStore>, gateway: Arc<dyn VoiceGateway>, settings: Arc<AudioSettings>) -> Self {
        Self { store, gateway, settings }
    }

    pub async fn cleanup_voice_stream(&self, guild: &GuildContext) {
        let Some(stream) = self.store.remove_voice_stream(guild.id) else {
            return;
        };

        info!("{guild} Disposing of pcm stream");
        match tokio::time::timeout(self.settings.dispose_timeout, async {
            let mut writer = stream.lock().await;
            writer.shutdown().await
        })
        .await
        {
            Ok(Ok(())) => {}
            // A closed voice connection makes shutdown fail; nothing left to release.
            Ok(Err(e)) => debug!("{guild} pcm stream shutdown: {e}"),
            Err(_) => warn!("{guild} Timed out closing pcm stream; dropping it"),
        }
    }

    pub async fn cleanup_transcoder_stream(&self, guild: &GuildContext) {
        let Some(stream) = self.store.remove_transcoder_stream(guild.id) else {
            return;
        };

        info!("{guild} Disposing of transcoder stream");
        if Arc::strong_count(&stream) > 1 {
            debug!("{guild} Transcoder stream still borrowed; it closes when the reader lets go");
        }
        drop(stream);
    }

    pub async fn cleanup_transcoder_process(&self, guild: &GuildContext) {
        let Some(process) = self.store.remove_transcoder_process(guild.id) else {
            return;
        };

        info!("{guild} Disposing of transcoder process");
        let grace = self.settings.process_exit_timeout;
        match tokio::time::timeout(self.settings.dispose_timeout, async {
            let mut handle = process.lock().await;
            handle.terminate(grace).await
        })
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{guild} Failed to terminate transcoder: {e}"),
            Err(_) => warn!("{guild} Timed out waiting for the transcoder process lock"),
        }
    }

    /// Full teardown of the stored client: stop, clear the bot's channel,
    /// dispose.
    pub async fn cleanup_voice_client(&self, guild: &GuildContext) {
        let Some(client) = self.store.remove_voice_client(guild.id) else {
            return;
        };

        self.stop_voice_client(guild, &client).await;

        info!("{guild} Setting voice channel to none for current user");
        if let Err(e) = self.gateway.clear_own_voice_channel(guild).await {
            warn!("{guild} Failed to clear own voice channel: {e}");
        }

        info!("{guild} Disposing of audio client");
        client.dispose();
    }

    /// Releases a client that never made it into the store. The bot's channel
    /// is left alone since a concurrently stored client may own it.
    pub async fn dispose_unstored_client(&self, guild: &GuildContext, client: SharedVoiceClient) {
        self.stop_voice_client(guild, &client).await;
        info!("{guild} Disposing of unstored audio client");
        client.dispose();
    }

    async fn stop_voice_client(&self, guild: &GuildContext, client: &SharedVoiceClient) {
        info!("{guild} Stopping audio client");
        if let Err(e) = client.stop().await {
            warn!("{guild} Failed to stop audio client: {e}");
        }
    }
}
