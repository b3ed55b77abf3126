// File: voxbot-core/tests/audio_service_tests.rs

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use twilight_model::id::Id;
use url::Url;

use voxbot_core::audio::{
    AudioService, ConnectOutcome, LeaveOutcome, PlayOutcome, SessionState, SkipOutcome,
};
use voxbot_core::config::AudioSettings;
use voxbot_core::test_utils::{FakeFetcher, FakeLauncher, FakeVoiceGateway};
use voxbot_core::GuildContext;

struct Harness {
    gateway: Arc<FakeVoiceGateway>,
    fetcher: Arc<FakeFetcher>,
    launcher: Arc<FakeLauncher>,
    service: Arc<AudioService>,
}

fn harness(fetcher: FakeFetcher, launcher: FakeLauncher) -> Harness {
    harness_with_cancel_wait(fetcher, launcher, Duration::from_secs(5))
}

fn harness_with_cancel_wait(fetcher: FakeFetcher, launcher: FakeLauncher, cancel_wait: Duration) -> Harness {
    let gateway = Arc::new(FakeVoiceGateway::new());
    let fetcher = Arc::new(fetcher);
    let launcher = Arc::new(launcher);
    let settings = AudioSettings {
        cancel_wait_timeout: cancel_wait,
        ..AudioSettings::default()
    };
    let service = Arc::new(AudioService::new(
        gateway.clone(),
        fetcher.clone(),
        launcher.clone(),
        Arc::new(settings),
    ));
    Harness { gateway, fetcher, launcher, service }
}

fn alpha() -> GuildContext {
    GuildContext::new(Id::new(1), "alpha")
}

fn beta() -> GuildContext {
    GuildContext::new(Id::new(2), "beta")
}

fn track() -> Url {
    Url::parse("https://example.com/watch?v=track").unwrap()
}

async fn wait_for_state(service: &AudioService, guild: &GuildContext, state: SessionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.state(guild) != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never reached the expected state");
}

#[tokio::test]
async fn join_twice_makes_one_network_connect() {
    let h = harness(FakeFetcher::new(), FakeLauncher::default());

    assert_eq!(h.service.join(&alpha(), Id::new(10)).await, ConnectOutcome::Connected);
    assert_eq!(h.service.join(&alpha(), Id::new(10)).await, ConnectOutcome::AlreadyConnected);
    assert_eq!(h.gateway.connect_count(), 1);
    assert_eq!(h.service.state(&alpha()), SessionState::Connected);
}

#[tokio::test]
async fn failed_join_leaves_the_guild_disconnected() {
    let h = harness(FakeFetcher::new(), FakeLauncher::default());
    h.gateway.set_failing(true);

    assert_eq!(h.service.join(&alpha(), Id::new(10)).await, ConnectOutcome::Failed);
    assert_eq!(h.service.state(&alpha()), SessionState::Disconnected);
    assert_eq!(h.gateway.clear_count(), 1, "the failed join is withdrawn");
    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::NotConnected);
    assert_eq!(h.fetcher.download_count(), 0);
}

#[tokio::test]
async fn join_play_play_again_streams_both_tracks() {
    let payload = vec![3u8; 9_000];
    let h = harness(FakeFetcher::new(), FakeLauncher::with_payload(payload.clone()));
    h.service.join(&alpha(), Id::new(10)).await;

    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Finished);
    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Finished);

    let client = h.gateway.last_client().unwrap();
    assert_eq!(client.captured().len(), payload.len() * 2);
    assert_eq!(h.fetcher.download_count(), 2);
    assert_eq!(h.fetcher.delete_count(), 2, "local file is deleted after every track");
    assert!(h.launcher.all_terminated());

    let store = h.service.store();
    assert!(!store.contains_transcoder_process(alpha().id));
    assert!(!store.contains_transcoder_stream(alpha().id));
    assert!(!store.contains_voice_stream(alpha().id));
    assert!(!h.service.is_playing(&alpha()));
}

#[tokio::test]
async fn concurrent_play_is_rejected_without_touching_the_downloader() {
    let h = harness(FakeFetcher::holding(), FakeLauncher::with_payload(vec![1u8; 100]));
    h.service.join(&alpha(), Id::new(10)).await;

    let first = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&alpha(), &track()).await })
    };
    h.fetcher.started().await;

    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Busy);
    assert_eq!(h.fetcher.download_count(), 1);

    h.fetcher.release();
    assert_eq!(first.await.unwrap(), PlayOutcome::Finished);
    assert_eq!(h.launcher.launch_count(), 1);
}

#[tokio::test]
async fn gate_resets_after_download_failure() {
    let h = harness(FakeFetcher::new(), FakeLauncher::with_payload(vec![1u8; 10]));
    h.service.join(&alpha(), Id::new(10)).await;
    h.fetcher.set_failing(true);

    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::DownloadFailed);
    assert_eq!(h.launcher.launch_count(), 0);
    assert_eq!(h.fetcher.delete_count(), 1);

    h.fetcher.set_failing(false);
    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Finished);
}

#[tokio::test]
async fn gate_resets_after_transcoder_failure() {
    let h = harness(FakeFetcher::new(), FakeLauncher::with_payload(vec![1u8; 10]));
    h.service.join(&alpha(), Id::new(10)).await;
    h.launcher.set_failing(true);

    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::TranscoderFailed);
    assert!(!h.service.store().contains_transcoder_process(alpha().id));

    h.launcher.set_failing(false);
    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Finished);
}

#[tokio::test]
async fn pcm_failure_releases_transcoder_but_keeps_the_client() {
    let h = harness(FakeFetcher::new(), FakeLauncher::with_payload(vec![1u8; 10]));
    h.service.join(&alpha(), Id::new(10)).await;
    h.gateway.last_client().unwrap().fail_streams();

    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::PcmStreamFailed);

    let store = h.service.store();
    assert!(store.contains_voice_client(alpha().id));
    assert!(!store.contains_voice_stream(alpha().id));
    assert!(!store.contains_transcoder_stream(alpha().id));
    assert!(!store.contains_transcoder_process(alpha().id));
    assert!(h.launcher.all_terminated());
    assert_eq!(h.fetcher.delete_count(), 1);
    assert!(!h.service.is_playing(&alpha()));
}

#[tokio::test]
async fn gate_resets_after_copy_failure() {
    let h = harness(FakeFetcher::new(), FakeLauncher::with_payload(vec![1u8; 10_000]));
    h.service.join(&alpha(), Id::new(10)).await;
    h.gateway.last_client().unwrap().close_outbound();

    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Interrupted);
    assert!(!h.service.is_playing(&alpha()));
    assert!(!h.service.store().contains_voice_stream(alpha().id));

    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Interrupted, "accepted again");
}

#[tokio::test]
async fn leave_when_not_connected_is_a_no_op() {
    let h = harness(FakeFetcher::new(), FakeLauncher::default());
    assert_eq!(h.service.leave(&alpha()).await, LeaveOutcome::NotConnected);
    assert_eq!(h.gateway.clear_count(), 0);
    assert_eq!(h.fetcher.delete_count(), 0);
}

#[tokio::test]
async fn playback_in_one_guild_does_not_block_another() {
    let h = harness(FakeFetcher::holding(), FakeLauncher::with_payload(vec![1u8; 100]));
    h.service.join(&alpha(), Id::new(10)).await;
    h.service.join(&beta(), Id::new(20)).await;

    let a = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&alpha(), &track()).await })
    };
    h.fetcher.started().await;

    let b = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&beta(), &track()).await })
    };
    h.fetcher.started().await;
    assert_eq!(h.fetcher.download_count(), 2);

    h.fetcher.release();
    h.fetcher.release();
    assert_eq!(a.await.unwrap(), PlayOutcome::Finished);
    assert_eq!(b.await.unwrap(), PlayOutcome::Finished);
}

#[tokio::test]
async fn skip_during_playback_cancels_the_copy_and_resets_the_gate() {
    let h = harness(FakeFetcher::new(), FakeLauncher::stalled());
    h.service.join(&alpha(), Id::new(10)).await;

    let playing = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&alpha(), &track()).await })
    };
    wait_for_state(&h.service, &alpha(), SessionState::Streaming).await;

    assert_eq!(h.service.skip(&alpha()).await, SkipOutcome::Skipped);
    assert_eq!(playing.await.unwrap(), PlayOutcome::Cancelled);

    assert!(!h.service.is_playing(&alpha()));
    assert!(h.launcher.all_terminated());
    assert_eq!(h.service.state(&alpha()), SessionState::Connected);
    assert_eq!(h.fetcher.delete_count(), 1);
}

#[tokio::test]
async fn skip_during_download_never_starts_the_transcoder() {
    let h = harness(FakeFetcher::holding(), FakeLauncher::with_payload(vec![1u8; 10]));
    h.service.join(&alpha(), Id::new(10)).await;

    let playing = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&alpha(), &track()).await })
    };
    h.fetcher.started().await;
    assert_eq!(h.service.state(&alpha()), SessionState::Preparing);

    assert_eq!(h.service.skip(&alpha()).await, SkipOutcome::Skipped);
    assert_eq!(playing.await.unwrap(), PlayOutcome::Cancelled);
    assert_eq!(h.launcher.launch_count(), 0);
}

#[tokio::test]
async fn skip_while_idle_is_a_no_op() {
    let h = harness(FakeFetcher::new(), FakeLauncher::default());
    h.service.join(&alpha(), Id::new(10)).await;
    assert_eq!(h.service.skip(&alpha()).await, SkipOutcome::NothingPlaying);
    assert_eq!(h.service.state(&alpha()), SessionState::Connected);
}

#[tokio::test]
async fn leave_during_playback_tears_everything_down() {
    let h = harness(FakeFetcher::new(), FakeLauncher::stalled());
    h.service.join(&alpha(), Id::new(10)).await;
    let client = h.gateway.last_client().unwrap();

    let playing = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&alpha(), &track()).await })
    };
    wait_for_state(&h.service, &alpha(), SessionState::Streaming).await;

    assert_eq!(h.service.leave(&alpha()).await, LeaveOutcome::Disconnected);
    assert_eq!(playing.await.unwrap(), PlayOutcome::Cancelled);

    assert_eq!(h.service.state(&alpha()), SessionState::Disconnected);
    assert!(client.stopped.load(Ordering::SeqCst));
    assert!(client.disposed.load(Ordering::SeqCst));
    assert_eq!(h.gateway.clear_count(), 1);
    assert!(h.launcher.all_terminated());
    assert!(!h.service.is_playing(&alpha()));
}

#[tokio::test]
async fn skip_outlasting_the_wait_keeps_the_gate_until_the_pipeline_exits() {
    let fetcher = FakeFetcher::new();
    fetcher.set_delete_delay(Duration::from_millis(300));
    let h = harness_with_cancel_wait(fetcher, FakeLauncher::stalled(), Duration::from_millis(50));
    h.service.join(&alpha(), Id::new(10)).await;

    let playing = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&alpha(), &track()).await })
    };
    wait_for_state(&h.service, &alpha(), SessionState::Streaming).await;

    assert_eq!(h.service.skip(&alpha()).await, SkipOutcome::Skipped);
    assert!(h.service.is_playing(&alpha()), "the unwinding pipeline still owns the gate");
    assert_eq!(h.service.play(&alpha(), &track()).await, PlayOutcome::Busy);
    assert_eq!(h.fetcher.download_count(), 1);

    assert_eq!(playing.await.unwrap(), PlayOutcome::Cancelled);
    assert!(!h.service.is_playing(&alpha()));
    assert_eq!(h.fetcher.delete_count(), 1);
}

#[tokio::test]
async fn leave_outlasting_the_wait_still_disconnects() {
    let fetcher = FakeFetcher::new();
    fetcher.set_delete_delay(Duration::from_millis(300));
    let h = harness_with_cancel_wait(fetcher, FakeLauncher::stalled(), Duration::from_millis(50));
    h.service.join(&alpha(), Id::new(10)).await;

    let playing = {
        let service = h.service.clone();
        tokio::spawn(async move { service.play(&alpha(), &track()).await })
    };
    wait_for_state(&h.service, &alpha(), SessionState::Streaming).await;

    assert_eq!(h.service.leave(&alpha()).await, LeaveOutcome::Disconnected);
    assert_eq!(h.service.state(&alpha()), SessionState::Disconnected);
    assert_eq!(h.gateway.clear_count(), 1);

    assert_eq!(playing.await.unwrap(), PlayOutcome::Cancelled);
    assert!(!h.service.is_playing(&alpha()));
}
