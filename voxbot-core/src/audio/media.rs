//! src/audio/media.rs
//!
//! Downloads the audio of a remote URL into a guild-scoped local file through
//! an external downloader, and removes that file again.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::audio::store::GuildId;
use crate::config::AudioSettings;
use crate::{Error, GuildContext};

const FILE_STEM: &str = "music_file";
const FILE_EXTENSION: &str = "wav";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetches `url` and returns the path of the local audio file.
    async fn download(&self, guild: &GuildContext, url: &Url) -> Result<PathBuf, Error>;

    /// Removes the guild's local file. Never fails; problems are logged.
    async fn delete_local_file(&self, guild: &GuildContext);
}

/// `<media_dir>/music_file_<guild id>` without extension. The downloader
/// appends the container extension itself.
pub fn output_base(media_dir: &Path, guild: GuildId) -> PathBuf {
    media_dir.join(format!("{FILE_STEM}_{guild}"))
}

pub fn local_file_path(media_dir: &Path, guild: GuildId) -> PathBuf {
    output_base(media_dir, guild).with_extension(FILE_EXTENSION)
}

/// Audio-only extraction into a wav container at `base`.
pub fn download_args(url: &Url, base: &Path) -> Vec<String> {
    vec![
        "--extract-audio".into(),
        "--audio-format".into(),
        FILE_EXTENSION.into(),
        url.as_str().into(),
        "-o".into(),
        format!("{}.%(ext)s", base.to_string_lossy()),
    ]
}

pub struct YtDlpFetcher {
    settings: Arc<AudioSettings>,
}

impl YtDlpFetcher {
    pub fn new(settings: Arc<AudioSettings>) -> Self {
        Self { settings }
    }

    fn command(&self, url: &Url, base: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.downloader_program);
        cmd.args(download_args(url, base))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        cmd
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn download(&self, guild: &GuildContext, url: &Url) -> Result<PathBuf, Error> {
        let base = output_base(&self.settings.media_dir, guild.id);
        let target = local_file_path(&self.settings.media_dir, guild.id);

        info!("{guild} Starting {} process", self.settings.downloader_program);
        let mut child = self.command(url, &base).spawn().map_err(|e| {
            Error::Process(format!("failed to spawn {}: {e}", self.settings.downloader_program))
        })?;

        info!("{guild} Waiting for {} to finish download", self.settings.downloader_program);
        let status = match tokio::time::timeout(self.settings.download_timeout, child.wait()).await {
            Ok(status) => status?,
            Err(elapsed) => {
                warn!("{guild} Download exceeded {:?}; killing downloader", self.settings.download_timeout);
                if let Err(e) = child.kill().await {
                    warn!("{guild} Failed to kill downloader: {e}");
                }
                return Err(Error::Timeout(elapsed));
            }
        };

        if !status.success() {
            return Err(Error::Process(format!(
                "{} exited with {status}",
                self.settings.downloader_program
            )));
        }

        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("downloaded file {}", target.display())));
        }

        debug!("{guild} Downloaded {url} to {}", target.display());
        Ok(target)
    }

    async fn delete_local_file(&self, guild: &GuildContext) {
        let path = local_file_path(&self.settings.media_dir, guild.id);
        info!("{guild} Deleting music file");
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{guild} No music file at {}", path.display());
            }
            Err(e) => warn!("{guild} Unable to delete {}: {e}", path.display()),
        }
    }
}
