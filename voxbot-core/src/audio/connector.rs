//! src/audio/connector.rs

use std::sync::Arc;

use tracing::{error, info, warn};
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

use crate::audio::disposer::AudioDisposer;
use crate::audio::store::AudioStore;
use crate::config::AudioSettings;
use crate::platforms::VoiceGateway;
use crate::GuildContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    AlreadyConnected,
    Connected,
    Failed,
}

pub struct AudioConnector {
    store: Arc<AudioStore>,
    disposer: Arc<AudioDisposer>,
    gateway: Arc<dyn VoiceGateway>,
    settings: Arc<AudioSettings>,
}

impl AudioConnector {
    pub fn new(
        store: Arc<AudioStore>,
        disposer: Arc<AudioDisposer>,
        gateway: Arc<dyn VoiceGateway>,
        settings: Arc<AudioSettings>,
    ) -> Self {
        Self { store, disposer, gateway, settings }
    }

    pub async fn connect(&self, guild: &GuildContext, channel_id: Id<ChannelMarker>) -> ConnectOutcome {
        if self.store.contains_voice_client(guild.id) {
            info!("{guild} Bot already connected to voice channel in {}", guild.name);
            return ConnectOutcome::AlreadyConnected;
        }

        info!("{guild} Connecting to voice channel {channel_id}");
        let client = match tokio::time::timeout(
            self.settings.connect_timeout,
            self.gateway.connect(guild, channel_id),
        )
        .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                error!("{guild} Unable to create audio client: {e}");
                self.withdraw_join(guild).await;
                return ConnectOutcome::Failed;
            }
            Err(_) => {
                error!(
                    "{guild} Voice connect did not complete within {:?}",
                    self.settings.connect_timeout
                );
                self.withdraw_join(guild).await;
                return ConnectOutcome::Failed;
            }
        };

        match self.store.add_voice_client(guild.id, client) {
            Ok(()) => {
                info!("{guild} Connected to voice channel {channel_id}");
                ConnectOutcome::Connected
            }
            Err(rejected) => {
                warn!("{guild} Another join stored its audio client first; releasing this one");
                self.disposer.dispose_unstored_client(guild, rejected).await;
                ConnectOutcome::AlreadyConnected
            }
        }
    }

    /// A join the platform may still complete later would leave the bot in a
    /// channel with no stored client, out of reach of `leave`.
    async fn withdraw_join(&self, guild: &GuildContext) {
        if let Err(e) = self.gateway.clear_own_voice_channel(guild).await {
            warn!("{guild} Unable to withdraw the failed voice join: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::{MockVoiceGateway, VoiceClient};
    use crate::test_utils::FakeVoiceClient;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn guild() -> GuildContext {
        GuildContext::new(Id::new(31), "connect guild")
    }

    fn connector(store: Arc<AudioStore>, gateway: MockVoiceGateway) -> AudioConnector {
        let gateway: Arc<dyn VoiceGateway> = Arc::new(gateway);
        let settings = Arc::new(AudioSettings::default());
        let disposer = Arc::new(AudioDisposer::new(store.clone(), gateway.clone(), settings.clone()));
        AudioConnector::new(store, disposer, gateway, settings)
    }

    #[tokio::test]
    async fn join_twice_connects_once() {
        let store = Arc::new(AudioStore::new());
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_connect().times(1).returning(|_, channel| {
            let client: Arc<dyn VoiceClient> = Arc::new(FakeVoiceClient::new(channel));
            Ok(client)
        });

        let connector = connector(store.clone(), gateway);
        assert_eq!(connector.connect(&guild(), Id::new(5)).await, ConnectOutcome::Connected);
        assert_eq!(connector.connect(&guild(), Id::new(5)).await, ConnectOutcome::AlreadyConnected);
        assert_eq!(store.get_voice_client(guild().id).unwrap().channel_id(), Id::new(5));
    }

    #[tokio::test]
    async fn failed_connect_leaves_the_store_empty() {
        let store = Arc::new(AudioStore::new());
        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_connect()
            .times(1)
            .returning(|_, _| Err(Error::Voice("no endpoint".into())));
        gateway.expect_clear_own_voice_channel().times(1).returning(|_| Ok(()));

        let connector = connector(store.clone(), gateway);
        assert_eq!(connector.connect(&guild(), Id::new(5)).await, ConnectOutcome::Failed);
        assert!(!store.contains_voice_client(guild().id));
    }

    #[tokio::test]
    async fn losing_a_join_race_disposes_only_the_new_client() {
        let store = Arc::new(AudioStore::new());
        let winner = Arc::new(FakeVoiceClient::new(Id::new(1)));
        let loser = Arc::new(FakeVoiceClient::new(Id::new(2)));

        let mut gateway = MockVoiceGateway::new();
        {
            let store = store.clone();
            let winner = winner.clone();
            let loser = loser.clone();
            // The concurrent join lands while this one is still connecting.
            gateway.expect_connect().times(1).returning(move |g, _| {
                let _ = store.add_voice_client(g.id, winner.clone());
                let client: Arc<dyn VoiceClient> = loser.clone();
                Ok(client)
            });
        }
        gateway.expect_clear_own_voice_channel().never();

        let connector = connector(store.clone(), gateway);
        assert_eq!(connector.connect(&guild(), Id::new(2)).await, ConnectOutcome::AlreadyConnected);

        assert!(loser.disposed.load(Ordering::SeqCst));
        assert!(!winner.disposed.load(Ordering::SeqCst));
        assert_eq!(store.get_voice_client(guild().id).unwrap().channel_id(), Id::new(1));
    }

    /// Never hears back from the voice server.
    #[derive(Default)]
    struct SilentGateway {
        clears: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VoiceGateway for SilentGateway {
        async fn connect(&self, _guild: &GuildContext, _channel_id: Id<ChannelMarker>) -> Result<Arc<dyn VoiceClient>, Error> {
            std::future::pending().await
        }

        async fn clear_own_voice_channel(&self, _guild: &GuildContext) -> Result<(), Error> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn timed_out_connect_is_withdrawn() {
        let store = Arc::new(AudioStore::new());
        let silent = Arc::new(SilentGateway::default());
        let gateway: Arc<dyn VoiceGateway> = silent.clone();
        let settings = Arc::new(AudioSettings {
            connect_timeout: Duration::from_millis(50),
            ..AudioSettings::default()
        });
        let disposer = Arc::new(AudioDisposer::new(store.clone(), gateway.clone(), settings.clone()));
        let connector = AudioConnector::new(store.clone(), disposer, gateway, settings);

        assert_eq!(connector.connect(&guild(), Id::new(5)).await, ConnectOutcome::Failed);
        assert_eq!(silent.clears.load(Ordering::SeqCst), 1);
        assert!(!store.contains_voice_client(guild().id));
    }
}
