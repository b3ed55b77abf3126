//! src/audio/transcoder.rs
//!
//! Launches the external transcoder that turns the downloaded file into raw
//! 48kHz stereo s16le PCM on its stdout.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::audio::store::{share_process, share_reader, AudioStore};
use crate::config::AudioSettings;
use crate::{Error, GuildContext};
use voxbot_common::models::audio::{CHANNEL_COUNT, SAMPLE_RATE};

/// Read half of the transcoder's output pipe.
pub type PcmReader = Box<dyn AsyncRead + Send + Unpin>;

/// A child process the pipeline owns and must reap.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Kills the process if it is still running and waits up to `grace` for
    /// it to be reaped.
    async fn terminate(&mut self, grace: Duration) -> Result<(), Error>;
}

#[async_trait]
impl ProcessHandle for Child {
    async fn terminate(&mut self, grace: Duration) -> Result<(), Error> {
        if let Some(status) = self.try_wait()? {
            debug!("process already exited with {status}");
            return Ok(());
        }
        self.start_kill()?;
        tokio::time::timeout(grace, self.wait()).await??;
        Ok(())
    }
}

/// Both handles of a freshly spawned transcoder. Either you get both or an
/// error, never half of them.
pub struct TranscoderHandles {
    pub process: Box<dyn ProcessHandle>,
    pub output: PcmReader,
}

#[cfg_attr(test, mockall::automock)]
pub trait TranscoderLauncher: Send + Sync {
    fn launch(&self, guild: &GuildContext, input: &Path) -> Result<TranscoderHandles, Error>;
}

/// Arguments selecting quiet logging, the input file, 2 channels,
/// s16le samples at 48kHz, written to stdout.
pub fn transcode_args(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "panic".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-ac".into(),
        CHANNEL_COUNT.to_string(),
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "pipe:1".into(),
    ]
}

pub struct FfmpegLauncher {
    settings: Arc<AudioSettings>,
}

impl FfmpegLauncher {
    pub fn new(settings: Arc<AudioSettings>) -> Self {
        Self { settings }
    }
}

impl TranscoderLauncher for FfmpegLauncher {
    fn launch(&self, guild: &GuildContext, input: &Path) -> Result<TranscoderHandles, Error> {
        info!("{guild} Creating {} process", self.settings.transcoder_program);

        let mut child = Command::new(&self.settings.transcoder_program)
            .args(transcode_args(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Process(format!("failed to spawn {}: {e}", self.settings.transcoder_program))
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Err(Error::Process("transcoder stdout was not captured".into()));
        };

        debug!("{guild} Transcoder running as pid {:?}", child.id());
        Ok(TranscoderHandles {
            process: Box::new(child),
            output: Box::new(stdout),
        })
    }
}

/// Registers freshly launched handles for `guild`.
///
/// On conflict the handles that did not make it into the store are released
/// here; anything that did get stored is left for the transcoder-failure
/// cleanup to remove.
pub async fn check_and_store(
    store: &AudioStore,
    guild: &GuildContext,
    handles: TranscoderHandles,
    grace: Duration,
) -> Result<(), Error> {
    let TranscoderHandles { process, output } = handles;

    if let Err(rejected) = store.add_transcoder_process(guild.id, share_process(process)) {
        warn!("{guild} A transcoder process is already stored; terminating the new one");
        if let Err(e) = rejected.lock().await.terminate(grace).await {
            warn!("{guild} Failed to terminate rejected transcoder: {e}");
        }
        return Err(Error::Conflict(format!("{guild} transcoder process slot occupied")));
    }

    if store.add_transcoder_stream(guild.id, share_reader(output)).is_err() {
        warn!("{guild} A transcoder stream is already stored");
        return Err(Error::Conflict(format!("{guild} transcoder stream slot occupied")));
    }

    Ok(())
}
