//! voice.rs
//!
//! Voice channels through songbird. Songbird runs the voice gateway
//! handshake and the UDP/Opus side; this module adapts its `Call` to the
//! `VoiceGateway` and `VoiceClient` seams the audio pipeline uses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use songbird::error::JoinError;
use songbird::input::{Input, RawAdapter};
use songbird::tracks::TrackHandle;
use songbird::{Call, Songbird};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

use crate::platforms::discord::pcm_sink::PcmFrameSink;
use crate::platforms::discord::pcm_source::PcmFrameSource;
use crate::platforms::{PcmWriter, VoiceClient, VoiceGateway};
use crate::{Error, GuildContext};
use voxbot_common::models::audio::{CHANNEL_COUNT, SAMPLE_RATE};
use voxbot_common::models::AudioApplication;

/// Frames buffered between a sink and songbird's mixer (one second of audio).
const FRAME_BUFFER: usize = 50;

pub struct SongbirdVoiceGateway {
    songbird: Arc<Songbird>,
}

impl SongbirdVoiceGateway {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }

    pub fn songbird(&self) -> Arc<Songbird> {
        self.songbird.clone()
    }
}

#[async_trait]
impl VoiceGateway for SongbirdVoiceGateway {
    async fn connect(
        &self,
        guild: &GuildContext,
        channel_id: Id<ChannelMarker>,
    ) -> Result<Arc<dyn VoiceClient>, Error> {
        let call = self
            .songbird
            .join(guild.id, channel_id)
            .await
            .map_err(|e| Error::Voice(format!("{guild} voice join failed: {e}")))?;
        info!("{guild} Voice session established in channel {channel_id}");

        Ok(Arc::new(SongbirdVoiceClient::new(channel_id, call)))
    }

    /// Leaves the channel and drops songbird's call for the guild, including
    /// one whose join never completed.
    async fn clear_own_voice_channel(&self, guild: &GuildContext) -> Result<(), Error> {
        match self.songbird.remove(guild.id).await {
            Ok(()) => Ok(()),
            Err(JoinError::NoCall) => {
                debug!("{guild} No songbird call to remove");
                Ok(())
            }
            Err(e) => Err(Error::Voice(format!("{guild} leaving voice failed: {e}"))),
        }
    }
}

pub struct SongbirdVoiceClient {
    channel_id: Id<ChannelMarker>,
    call: Arc<Mutex<Call>>,
    track: StdMutex<Option<TrackHandle>>,
    disposed: AtomicBool,
}

impl SongbirdVoiceClient {
    pub fn new(channel_id: Id<ChannelMarker>, call: Arc<Mutex<Call>>) -> Self {
        Self {
            channel_id,
            call,
            track: StdMutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    fn stop_current_track(&self) {
        let previous = match self.track.lock() {
            Ok(mut track) => track.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(track) = previous {
            if let Err(e) = track.stop() {
                debug!("(Voice) track already gone: {e}");
            }
        }
    }
}

#[async_trait]
impl VoiceClient for SongbirdVoiceClient {
    fn channel_id(&self) -> Id<ChannelMarker> {
        self.channel_id
    }

    /// Starts a live raw-PCM track on the call and returns its writing end.
    async fn create_outbound_stream(&self, application: AudioApplication) -> Result<PcmWriter, Error> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Voice("voice client has been disposed".into()));
        }

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let source = RawAdapter::new(PcmFrameSource::new(rx), SAMPLE_RATE, u32::from(CHANNEL_COUNT));
        let input: Input = source.into();

        let handle = self.call.lock().await.play_input(input);
        debug!("(Voice) channel {} => {application:?} track started", self.channel_id);

        self.stop_current_track();
        match self.track.lock() {
            Ok(mut track) => *track = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }

        Ok(Box::new(PcmFrameSink::new(tx)))
    }

    async fn stop(&self) -> Result<(), Error> {
        self.call.lock().await.stop();
        self.stop_current_track();
        Ok(())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_current_track();
        if let Ok(mut call) = self.call.try_lock() {
            call.stop();
        } else {
            warn!("(Voice) channel {} => call busy while disposing", self.channel_id);
        }
    }
}
