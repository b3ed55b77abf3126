use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use songbird::shards::TwilightMap;
use songbird::Songbird;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway,
    CloseFrame,
    Config,
    Event,
    EventTypeFlags,
    Intents,
    MessageSender,
    Shard,
    StreamExt,
};
use twilight_http::client::ClientBuilder;
use twilight_http::Client as HttpClient;
use twilight_model::gateway::payload::incoming::{InteractionCreate, MessageCreate, Ready as ReadyPayload};

use crate::platforms::discord::voice::SongbirdVoiceGateway;
use crate::platforms::ConnectionStatus;
use crate::services::discord::slashcommands::register_global_slash_commands;
use crate::Error;

/// Inbound events the command layer cares about.
#[derive(Debug, Clone)]
pub enum DiscordEvent {
    Message(Box<MessageCreate>),
    Interaction(Box<InteractionCreate>),
}

/// Per-shard loop:
///   - updates the in-memory cache
///   - hands voice events to songbird
///   - forwards user messages and interactions to `tx`.
async fn shard_runner(
    mut shard: Shard,
    tx: UnboundedSender<DiscordEvent>,
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    songbird: Arc<Songbird>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
                continue;
            }
        };

        cache.update(&event);
        songbird.process(&event).await;

        match event {
            Event::Ready(ready) => {
                let data: &ReadyPayload = ready.as_ref();
                info!(
                    "Shard {shard_id} => READY as {}#{} (ID={})",
                    data.user.name, data.user.discriminator, data.user.id
                );
                if let Err(e) = register_global_slash_commands(&http, data.application.id).await {
                    error!("Shard {shard_id} => {e}");
                }
            }
            Event::MessageCreate(msg) => {
                if msg.author.bot {
                    debug!("Ignoring bot message from {}", msg.author.name);
                    continue;
                }
                let _ = tx.send(DiscordEvent::Message(msg));
            }
            Event::InteractionCreate(interaction) => {
                let _ = tx.send(DiscordEvent::Interaction(interaction));
            }
            other => {
                trace!("Shard {shard_id} => unhandled event: {:?}", other.kind());
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

pub struct DiscordPlatform {
    pub token: String,
    pub connection_status: ConnectionStatus,

    pub rx: Mutex<Option<UnboundedReceiver<DiscordEvent>>>,

    pub shard_tasks: Vec<JoinHandle<()>>,
    pub shard_senders: Vec<MessageSender>,

    pub http: Option<Arc<HttpClient>>,
    pub cache: Option<Arc<InMemoryCache>>,
    pub voice: Option<Arc<SongbirdVoiceGateway>>,
}

impl DiscordPlatform {
    pub fn new(token: String) -> Self {
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            rx: Mutex::new(None),
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
            voice: None,
        }
    }

    /// Waits for the next inbound event. `None` once disconnected.
    pub async fn next_event(&self) -> Option<DiscordEvent> {
        let mut guard = self.rx.lock().await;
        match guard.as_mut() {
            Some(r) => r.recv().await,
            None => None,
        }
    }

    pub fn http(&self) -> Result<Arc<HttpClient>, Error> {
        self.http
            .clone()
            .ok_or_else(|| Error::Platform("Discord HTTP client not ready; connect first".into()))
    }

    pub fn cache(&self) -> Result<Arc<InMemoryCache>, Error> {
        self.cache
            .clone()
            .ok_or_else(|| Error::Platform("Discord cache not ready; connect first".into()))
    }

    pub fn voice_gateway(&self) -> Result<Arc<SongbirdVoiceGateway>, Error> {
        self.voice
            .clone()
            .ok_or_else(|| Error::Platform("Discord voice gateway not ready; connect first".into()))
    }

    pub async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }
        if self.token.is_empty() {
            return Err(Error::Config("Discord token is empty".into()));
        }

        let (tx, rx) = unbounded_channel::<DiscordEvent>();
        {
            let mut guard = self.rx.lock().await;
            *guard = Some(rx);
        }

        let http_client = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        self.http = Some(http_client.clone());

        // Voice states back the "which channel is the caller in" lookup for join.
        let cache = InMemoryCache::builder()
            .resource_types(
                ResourceType::GUILD | ResourceType::CHANNEL | ResourceType::VOICE_STATE | ResourceType::USER_CURRENT,
            )
            .build();
        let cache = Arc::new(cache);
        self.cache = Some(cache.clone());

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT | Intents::GUILD_VOICE_STATES,
        );

        let shards: Vec<Shard> = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?
            .collect();

        // Songbird joins voice channels through the shards' senders, and it
        // needs the bot's user id before READY arrives.
        let bot_user = http_client
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("current_user request failed: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("current_user body invalid: {e}")))?;
        let senders: HashMap<_, _> = shards
            .iter()
            .map(|shard| (shard.id().number().into(), shard.sender()))
            .collect();
        let songbird = Arc::new(Songbird::twilight(Arc::new(TwilightMap::new(senders)), bot_user.id));

        self.shard_senders = shards.iter().map(Shard::sender).collect();
        self.voice = Some(Arc::new(SongbirdVoiceGateway::new(songbird.clone())));

        for shard in shards {
            let handle = tokio::spawn(shard_runner(
                shard,
                tx.clone(),
                http_client.clone(),
                cache.clone(),
                songbird.clone(),
            ));
            self.shard_tasks.push(handle);
        }

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }

        self.shard_senders.clear();
        self.shard_tasks.clear();

        {
            let mut guard = self.rx.lock().await;
            *guard = None;
        }

        Ok(())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_fail_before_connect() {
        let platform = DiscordPlatform::new("token".into());
        assert!(platform.http().is_err());
        assert!(platform.cache().is_err());
        assert!(platform.voice_gateway().is_err());
        assert_eq!(platform.connection_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn empty_token_is_rejected_before_any_network_call() {
        let mut platform = DiscordPlatform::new(String::new());
        assert!(matches!(platform.connect().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn next_event_is_none_when_not_connected() {
        let platform = DiscordPlatform::new("token".into());
        assert!(platform.next_event().await.is_none());
    }
}
