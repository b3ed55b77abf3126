// src/config.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::Error;

/// Everything the audio pipeline needs to know about its environment.
#[derive(Debug, Clone)]
pub struct AudioSettings {
    /// Directory the per-guild media files are downloaded into.
    pub media_dir: PathBuf,
    /// Program used to fetch remote media (`yt-dlp` compatible CLI).
    pub downloader_program: String,
    /// Program used to turn the local file into raw PCM (`ffmpeg` compatible CLI).
    pub transcoder_program: String,
    pub download_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long a killed child process gets to be reaped.
    pub process_exit_timeout: Duration,
    /// Upper bound for locking and closing a stream during disposal.
    pub dispose_timeout: Duration,
    /// How long `skip`/`leave` wait for a cancelled pipeline to unwind.
    pub cancel_wait_timeout: Duration,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("."),
            downloader_program: "yt-dlp".to_string(),
            transcoder_program: "ffmpeg".to_string(),
            download_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(15),
            process_exit_timeout: Duration::from_secs(5),
            dispose_timeout: Duration::from_secs(5),
            cancel_wait_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotSettings {
    pub token: String,
    pub prefix: char,
    pub audio: AudioSettings,
}

impl BotSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.token.trim().is_empty() {
            return Err(Error::Config("Discord token is empty".into()));
        }
        if self.prefix.is_whitespace() {
            return Err(Error::Config("Command prefix cannot be whitespace".into()));
        }
        if self.audio.downloader_program.is_empty() || self.audio.transcoder_program.is_empty() {
            return Err(Error::Config("Downloader and transcoder programs must be set".into()));
        }
        Ok(())
    }
}
