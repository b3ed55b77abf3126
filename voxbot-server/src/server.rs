//! voxbot-server/src/server.rs
//!
//! Wires the Discord platform, the audio service and the command handler
//! together and runs the event loop until Ctrl-C.

use std::sync::Arc;

use tracing::{error, info, warn};

use voxbot_core::audio::{AudioService, FfmpegLauncher, YtDlpFetcher};
use voxbot_core::config::BotSettings;
use voxbot_core::platforms::discord::DiscordPlatform;
use voxbot_core::services::discord::DiscordCommandHandler;
use voxbot_core::Error;

pub async fn run_server(settings: BotSettings) -> Result<(), Error> {
    tokio::fs::create_dir_all(&settings.audio.media_dir).await?;
    let audio_settings = Arc::new(settings.audio.clone());

    let mut platform = DiscordPlatform::new(settings.token.clone());
    platform.connect().await?;
    info!("Connected to the Discord gateway.");

    let audio = Arc::new(AudioService::new(
        platform.voice_gateway()?,
        Arc::new(YtDlpFetcher::new(audio_settings.clone())),
        Arc::new(FfmpegLauncher::new(audio_settings)),
        Arc::new(settings.audio.clone()),
    ));
    let handler = Arc::new(DiscordCommandHandler::new(
        platform.http()?,
        platform.cache()?,
        audio,
        settings.prefix,
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received; shutting down.");
                break;
            }
            event = platform.next_event() => {
                let Some(event) = event else {
                    warn!("Discord event stream closed.");
                    break;
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler.handle_event(event).await {
                        error!("Command failed: {e}");
                    }
                });
            }
        }
    }

    platform.disconnect().await
}
