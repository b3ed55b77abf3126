//! src/audio/service.rs
//!
//! Per-guild audio sessions: join, leave, play and skip. Every failure is
//! turned into an outcome value; nothing here returns an error to the
//! command layer.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;
use url::Url;

use crate::audio::cleanup::AudioCleanupOrganizer;
use crate::audio::connector::{AudioConnector, ConnectOutcome};
use crate::audio::disposer::AudioDisposer;
use crate::audio::media::MediaFetcher;
use crate::audio::pcm::{CopyOutcome, PcmStreamHandler};
use crate::audio::playback::PlaybackTicket;
use crate::audio::store::{AudioStore, SharedReader, SharedVoiceClient};
use crate::audio::transcoder::{check_and_store, TranscoderLauncher};
use crate::config::AudioSettings;
use crate::platforms::VoiceGateway;
use crate::GuildContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The whole track reached the voice stream.
    Finished,
    /// Skip or leave stopped the pipeline.
    Cancelled,
    /// Streaming broke off part way; resources were still released.
    Interrupted,
    /// Another track is already playing in this guild.
    Busy,
    NotConnected,
    DownloadFailed,
    TranscoderFailed,
    PcmStreamFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotConnected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    NothingPlaying,
    Skipped,
}

/// What a cancel-and-wait found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineStop {
    NotRunning,
    Stopped,
    /// Cancelled but still unwinding; its ticket keeps the gate.
    StillRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Preparing,
    Streaming,
}

pub struct AudioService {
    store: Arc<AudioStore>,
    connector: AudioConnector,
    fetcher: Arc<dyn MediaFetcher>,
    launcher: Arc<dyn TranscoderLauncher>,
    pcm: PcmStreamHandler,
    cleanup: AudioCleanupOrganizer,
    settings: Arc<AudioSettings>,
}

impl AudioService {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        fetcher: Arc<dyn MediaFetcher>,
        launcher: Arc<dyn TranscoderLauncher>,
        settings: Arc<AudioSettings>,
    ) -> Self {
        let store = Arc::new(AudioStore::new());
        let disposer = Arc::new(AudioDisposer::new(store.clone(), gateway.clone(), settings.clone()));
        let connector = AudioConnector::new(store.clone(), disposer.clone(), gateway, settings.clone());
        let cleanup = AudioCleanupOrganizer::new(store.clone(), disposer, fetcher.clone());

        Self {
            pcm: PcmStreamHandler::new(store.clone()),
            store,
            connector,
            fetcher,
            launcher,
            cleanup,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<AudioStore> {
        &self.store
    }

    pub fn is_playing(&self, guild: &GuildContext) -> bool {
        self.store.playback().is_playing(guild.id)
    }

    pub fn state(&self, guild: &GuildContext) -> SessionState {
        if !self.store.contains_voice_client(guild.id) {
            SessionState::Disconnected
        } else if self.store.contains_voice_stream(guild.id) {
            SessionState::Streaming
        } else if self.is_playing(guild) {
            SessionState::Preparing
        } else {
            SessionState::Connected
        }
    }

    pub async fn join(&self, guild: &GuildContext, channel_id: Id<ChannelMarker>) -> ConnectOutcome {
        self.connector.connect(guild, channel_id).await
    }

    pub async fn leave(&self, guild: &GuildContext) -> LeaveOutcome {
        let stop = self.stop_running_pipeline(guild).await;
        let disconnected = self.cleanup.full_disconnect(guild).await;
        if stop != PipelineStop::StillRunning {
            self.store.playback().force_reset(guild.id);
        }

        if disconnected {
            LeaveOutcome::Disconnected
        } else {
            LeaveOutcome::NotConnected
        }
    }

    pub async fn skip(&self, guild: &GuildContext) -> SkipOutcome {
        match self.stop_running_pipeline(guild).await {
            PipelineStop::NotRunning => {
                info!("{guild} Nothing is playing; skip ignored");
                return SkipOutcome::NothingPlaying;
            }
            PipelineStop::Stopped => {
                self.cleanup.post_track(guild).await;
                self.store.playback().force_reset(guild.id);
            }
            // The pipeline's own exit path cleans up and releases the gate.
            PipelineStop::StillRunning => {}
        }
        info!("{guild} Skipped current track");
        SkipOutcome::Skipped
    }

    pub async fn play(&self, guild: &GuildContext, url: &Url) -> PlayOutcome {
        let Some(ticket) = self.store.playback().try_begin(guild.id) else {
            info!("{guild} Already playing in {}; rejecting {url}", guild.name);
            return PlayOutcome::Busy;
        };

        let outcome = self.run_pipeline(guild, url, &ticket).await;
        info!("{guild} Playback of {url} ended: {outcome:?}");
        drop(ticket);
        outcome
    }

    async fn run_pipeline(&self, guild: &GuildContext, url: &Url, ticket: &PlaybackTicket) -> PlayOutcome {
        let Some(client) = self.store.get_voice_client(guild.id) else {
            warn!("{guild} No audio client for {}; join a channel first", guild.name);
            return PlayOutcome::NotConnected;
        };

        let path = match self.download(guild, url, ticket).await {
            Ok(path) => path,
            Err(outcome) => {
                self.cleanup.download_failure(guild).await;
                return outcome;
            }
        };

        let Some(source) = self.start_transcoder(guild, &path).await else {
            self.cleanup.transcoder_setup_failure(guild).await;
            return PlayOutcome::TranscoderFailed;
        };

        if ticket.is_cancelled() {
            drop(source);
            self.finish_track(guild).await;
            return PlayOutcome::Cancelled;
        }

        self.stream(guild, url, &client, source, ticket).await
    }

    async fn download(
        &self,
        guild: &GuildContext,
        url: &Url,
        ticket: &PlaybackTicket,
    ) -> Result<PathBuf, PlayOutcome> {
        tokio::select! {
            biased;
            _ = ticket.cancellation().cancelled() => {
                info!("{guild} Download of {url} cancelled");
                Err(PlayOutcome::Cancelled)
            }
            downloaded = self.fetcher.download(guild, url) => downloaded.map_err(|e| {
                error!("{guild} Unable to download {url}: {e}");
                PlayOutcome::DownloadFailed
            }),
        }
    }

    async fn start_transcoder(&self, guild: &GuildContext, path: &std::path::Path) -> Option<SharedReader> {
        let handles = match self.launcher.launch(guild, path) {
            Ok(handles) => handles,
            Err(e) => {
                error!("{guild} Unable to start transcoder: {e}");
                return None;
            }
        };

        if let Err(e) = check_and_store(&self.store, guild, handles, self.settings.process_exit_timeout).await {
            error!("{guild} Unable to store transcoder handles: {e}");
            return None;
        }

        self.store.get_transcoder_stream(guild.id)
    }

    async fn stream(
        &self,
        guild: &GuildContext,
        url: &Url,
        client: &SharedVoiceClient,
        source: SharedReader,
        ticket: &PlaybackTicket,
    ) -> PlayOutcome {
        let Some(dest) = self.pcm.create_pcm_stream(guild, url, client).await else {
            drop(source);
            self.cleanup.pcm_stream_setup_failure(guild).await;
            return PlayOutcome::PcmStreamFailed;
        };

        let outcome = match self.pcm.copy(guild, &source, &dest, ticket.cancellation()).await {
            CopyOutcome::Completed(_) => {
                self.pcm.flush(guild, &dest).await;
                PlayOutcome::Finished
            }
            CopyOutcome::Failed => {
                self.pcm.flush(guild, &dest).await;
                PlayOutcome::Interrupted
            }
            CopyOutcome::Cancelled => PlayOutcome::Cancelled,
        };

        drop(source);
        drop(dest);
        self.finish_track(guild).await;
        outcome
    }

    async fn finish_track(&self, guild: &GuildContext) {
        self.cleanup.post_track(guild).await;
        self.fetcher.delete_local_file(guild).await;
    }

    /// Cancels the guild's running pipeline and waits (bounded) for it to
    /// unwind.
    async fn stop_running_pipeline(&self, guild: &GuildContext) -> PipelineStop {
        let Some(finished) = self.store.playback().cancel(guild.id) else {
            return PipelineStop::NotRunning;
        };

        info!("{guild} Waiting for the running pipeline to stop");
        match tokio::time::timeout(self.settings.cancel_wait_timeout, finished.cancelled()).await {
            Ok(()) => PipelineStop::Stopped,
            Err(_) => {
                warn!(
                    "{guild} Pipeline did not stop within {:?}; it keeps the playback gate until it exits",
                    self.settings.cancel_wait_timeout
                );
                PipelineStop::StillRunning
            }
        }
    }
}

impl std::fmt::Debug for AudioService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioService").field("store", &self.store).finish()
    }
}
