//! src/audio/pcm.rs
//!
//! Bridges the transcoder output into the voice client's outbound stream.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::audio::store::{share_writer, AudioStore, SharedReader, SharedVoiceClient, SharedWriter};
use crate::GuildContext;
use voxbot_common::models::audio::FRAME_SIZE_BYTES;
use voxbot_common::models::AudioApplication;

/// How a copy ended. Byte counts are what reached the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed(u64),
    Cancelled,
    Failed,
}

pub struct PcmStreamHandler {
    store: Arc<AudioStore>,
}

impl PcmStreamHandler {
    pub fn new(store: Arc<AudioStore>) -> Self {
        Self { store }
    }

    /// Opens a mixed-mode outbound stream on `client` and registers it.
    pub async fn create_pcm_stream(
        &self,
        guild: &GuildContext,
        url: &Url,
        client: &SharedVoiceClient,
    ) -> Option<SharedWriter> {
        info!("{guild} Creating pcm stream for {url}");
        let writer = match client.create_outbound_stream(AudioApplication::Mixed).await {
            Ok(writer) => share_writer(writer),
            Err(e) => {
                error!("{guild} Unable to create pcm stream: {e}");
                return None;
            }
        };

        if let Err(rejected) = self.store.add_voice_stream(guild.id, writer.clone()) {
            warn!("{guild} A pcm stream is already stored; closing the new one");
            if let Err(e) = rejected.lock().await.shutdown().await {
                warn!("{guild} Failed to close rejected pcm stream: {e}");
            }
            return None;
        }

        Some(writer)
    }

    /// Pumps `source` into `dest` until the source is exhausted or `cancel`
    /// fires. Never returns an error.
    pub async fn copy(
        &self,
        guild: &GuildContext,
        source: &SharedReader,
        dest: &SharedWriter,
        cancel: &CancellationToken,
    ) -> CopyOutcome {
        let mut reader = source.lock().await;
        let mut writer = dest.lock().await;
        let mut buffered = BufReader::with_capacity(FRAME_SIZE_BYTES * 8, &mut *reader);

        info!("{guild} Copying music bytes to pcm stream");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("{guild} Playback cancelled");
                CopyOutcome::Cancelled
            }
            copied = tokio::io::copy_buf(&mut buffered, &mut *writer) => match copied {
                Ok(n) => {
                    info!("{guild} Copied {n} bytes to pcm stream");
                    CopyOutcome::Completed(n)
                }
                Err(e) => {
                    error!("{guild} Error copying to pcm stream: {e}");
                    CopyOutcome::Failed
                }
            },
        }
    }

    /// Pushes any trailing partial frame and closes the writing half.
    pub async fn flush(&self, guild: &GuildContext, stream: &SharedWriter) {
        info!("{guild} Flushing pcm stream");
        let mut writer = stream.lock().await;
        if let Err(e) = writer.shutdown().await {
            warn!("{guild} Error flushing pcm stream: {e}");
        }
    }
}
