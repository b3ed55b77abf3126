use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use voxbot_core::config::{AudioSettings, BotSettings};

mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "voxbot")]
#[command(author, version, about = "VoxBot - Discord bot that plays audio from a url into voice channels")]
pub struct Args {
    /// Discord bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: String,

    /// Character that starts a text command.
    #[arg(long, env = "VOXBOT_PREFIX", default_value = "!")]
    prefix: char,

    /// Directory the per-guild media files are downloaded into.
    #[arg(long, env = "VOXBOT_MEDIA_DIR", default_value = ".")]
    media_dir: PathBuf,

    /// Downloader executable (yt-dlp compatible).
    #[arg(long, env = "VOXBOT_DOWNLOADER", default_value = "yt-dlp")]
    downloader: String,

    /// Transcoder executable (ffmpeg compatible).
    #[arg(long, env = "VOXBOT_TRANSCODER", default_value = "ffmpeg")]
    transcoder: String,

    #[arg(long, env = "VOXBOT_DOWNLOAD_TIMEOUT_SECS", default_value_t = 300)]
    download_timeout_secs: u64,

    #[arg(long, env = "VOXBOT_CONNECT_TIMEOUT_SECS", default_value_t = 15)]
    connect_timeout_secs: u64,
}

impl Args {
    fn into_settings(self) -> BotSettings {
        BotSettings {
            token: self.token,
            prefix: self.prefix,
            audio: AudioSettings {
                media_dir: self.media_dir,
                downloader_program: self.downloader,
                transcoder_program: self.transcoder,
                download_timeout: Duration::from_secs(self.download_timeout_secs),
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                ..AudioSettings::default()
            },
        }
    }
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive("voxbot=info".parse()?);
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let settings = Args::parse().into_settings();
    settings.validate()?;
    info!(
        "VoxBot starting. prefix='{}', media_dir={}",
        settings.prefix,
        settings.audio.media_dir.display()
    );

    if let Err(e) = server::run_server(settings).await {
        error!("Server error: {e}");
        return Err(e.into());
    }

    info!("VoxBot stopped.");
    Ok(())
}
