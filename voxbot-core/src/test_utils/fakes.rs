// File: voxbot-core/src/test_utils/fakes.rs
//
// In-memory stand-ins for the voice platform, the downloader and the
// transcoder. Shared by unit tests and the integration suite.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, DuplexStream};
use tokio::sync::{Notify, Semaphore};
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

use crate::audio::media::MediaFetcher;
use crate::audio::transcoder::{ProcessHandle, TranscoderHandles, TranscoderLauncher};
use crate::platforms::{PcmWriter, VoiceClient, VoiceGateway};
use crate::{Error, GuildContext};
use voxbot_common::models::AudioApplication;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------
// Voice
// ---------------------------------------------------------------

/// Records every byte written to its outbound streams.
pub struct FakeVoiceClient {
    channel_id: Id<ChannelMarker>,
    pub stopped: AtomicBool,
    pub disposed: AtomicBool,
    pub streams_opened: AtomicUsize,
    fail_streams: AtomicBool,
    outbound_closed: Arc<AtomicBool>,
    captured: Arc<Mutex<Vec<u8>>>,
}

impl FakeVoiceClient {
    pub fn new(channel_id: Id<ChannelMarker>) -> Self {
        Self {
            channel_id,
            stopped: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            streams_opened: AtomicUsize::new(0),
            fail_streams: AtomicBool::new(false),
            outbound_closed: Arc::new(AtomicBool::new(false)),
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Makes every later `create_outbound_stream` fail.
    pub fn fail_streams(&self) {
        self.fail_streams.store(true, Ordering::SeqCst);
    }

    /// Simulates the voice connection dropping: writes, flushes and
    /// shutdowns on existing streams start failing.
    pub fn close_outbound(&self) {
        self.outbound_closed.store(true, Ordering::SeqCst);
    }

    pub fn captured(&self) -> Vec<u8> {
        locked(&self.captured).clone()
    }
}

#[async_trait]
impl VoiceClient for FakeVoiceClient {
    fn channel_id(&self) -> Id<ChannelMarker> {
        self.channel_id
    }

    async fn create_outbound_stream(&self, _application: AudioApplication) -> Result<PcmWriter, Error> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Voice("client disposed".into()));
        }
        if self.fail_streams.load(Ordering::SeqCst) {
            return Err(Error::Voice("outbound stream refused".into()));
        }
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CaptureWriter {
            captured: self.captured.clone(),
            closed: self.outbound_closed.clone(),
        }))
    }

    async fn stop(&self) -> Result<(), Error> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

struct CaptureWriter {
    captured: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl CaptureWriter {
    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "voice connection closed"))
        } else {
            Ok(())
        }
    }
}

impl AsyncWrite for CaptureWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if let Err(e) = self.check_open() {
            return Poll::Ready(Err(e));
        }
        locked(&self.captured).extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.check_open())
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.check_open())
    }
}

/// Hands out a fresh `FakeVoiceClient` per connect and counts calls.
#[derive(Default)]
pub struct FakeVoiceGateway {
    connects: AtomicUsize,
    clears: AtomicUsize,
    fail: AtomicBool,
    clients: Mutex<Vec<Arc<FakeVoiceClient>>>,
}

impl FakeVoiceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn last_client(&self) -> Option<Arc<FakeVoiceClient>> {
        locked(&self.clients).last().cloned()
    }
}

#[async_trait]
impl VoiceGateway for FakeVoiceGateway {
    async fn connect(&self, _guild: &GuildContext, channel_id: Id<ChannelMarker>) -> Result<Arc<dyn VoiceClient>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Voice("voice server never answered".into()));
        }
        let client = Arc::new(FakeVoiceClient::new(channel_id));
        locked(&self.clients).push(client.clone());
        Ok(client)
    }

    async fn clear_own_voice_channel(&self, _guild: &GuildContext) -> Result<(), Error> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------
// Processes
// ---------------------------------------------------------------

#[derive(Default)]
pub struct FakeProcess {
    terminated: Arc<AtomicBool>,
    fail: bool,
}

impl FakeProcess {
    /// A process whose termination reports an error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn terminated_flag(&self) -> Arc<AtomicBool> {
        self.terminated.clone()
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    async fn terminate(&mut self, _grace: Duration) -> Result<(), Error> {
        self.terminated.store(true, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Process("kill refused".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------

/// Pretends to download. Optionally holds every download until
/// [`FakeFetcher::release`] is called.
#[derive(Default)]
pub struct FakeFetcher {
    downloads: AtomicUsize,
    deletes: AtomicUsize,
    fail: AtomicBool,
    hold: Option<Semaphore>,
    started: Notify,
    delete_delay_ms: AtomicU64,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding() -> Self {
        Self {
            hold: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Makes `delete_local_file` take `delay` before it returns.
    pub fn set_delete_delay(&self, delay: Duration) {
        self.delete_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Lets one held download continue.
    pub fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.add_permits(1);
        }
    }

    /// Resolves once a download has started.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn download(&self, guild: &GuildContext, _url: &url::Url) -> Result<PathBuf, Error> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if let Some(hold) = &self.hold {
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Process("downloader exited with 1".into()));
        }
        Ok(PathBuf::from(format!("music_file_{}.wav", guild.id)))
    }

    async fn delete_local_file(&self, _guild: &GuildContext) {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let delay = self.delete_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

// ---------------------------------------------------------------
// Transcoder
// ---------------------------------------------------------------

/// Launches fake transcoders that emit a fixed payload, or that never
/// finish when built with [`FakeLauncher::stalled`].
#[derive(Default)]
pub struct FakeLauncher {
    launches: AtomicUsize,
    fail: AtomicBool,
    payload: Vec<u8>,
    stall: bool,
    feeds: Mutex<Vec<DuplexStream>>,
    processes: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeLauncher {
    pub fn with_payload(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Output streams stay open and empty until [`FakeLauncher::close_outputs`].
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn close_outputs(&self) {
        locked(&self.feeds).clear();
    }

    /// True when every launched process has been terminated.
    pub fn all_terminated(&self) -> bool {
        locked(&self.processes).iter().all(|flag| flag.load(Ordering::SeqCst))
    }
}

impl TranscoderLauncher for FakeLauncher {
    fn launch(&self, _guild: &GuildContext, _input: &Path) -> Result<TranscoderHandles, Error> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Process("transcoder failed to start".into()));
        }

        let process = FakeProcess::default();
        locked(&self.processes).push(process.terminated_flag());

        let output: crate::audio::transcoder::PcmReader = if self.stall {
            let (feed, output) = tokio::io::duplex(64);
            locked(&self.feeds).push(feed);
            Box::new(output)
        } else {
            Box::new(io::Cursor::new(self.payload.clone()))
        };

        Ok(TranscoderHandles {
            process: Box::new(process),
            output,
        })
    }
}
