//! src/audio/store.rs
//!
//! Guild-keyed registry for every resource the audio pipeline acquires.
//! Each guild holds at most one of each kind. `add_*` never overwrites: the
//! rejected value is handed back so the caller can release it.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

use crate::audio::playback::PlaybackGate;
use crate::audio::transcoder::{PcmReader, ProcessHandle};
use crate::platforms::{PcmWriter, VoiceClient};

pub type GuildId = Id<GuildMarker>;

pub type SharedVoiceClient = Arc<dyn VoiceClient>;
pub type SharedProcess = Arc<Mutex<Box<dyn ProcessHandle>>>;
pub type SharedReader = Arc<Mutex<PcmReader>>;
pub type SharedWriter = Arc<Mutex<PcmWriter>>;

#[derive(Default)]
pub struct AudioStore {
    voice_clients: DashMap<GuildId, SharedVoiceClient>,
    transcoder_processes: DashMap<GuildId, SharedProcess>,
    transcoder_streams: DashMap<GuildId, SharedReader>,
    voice_streams: DashMap<GuildId, SharedWriter>,
    playback: PlaybackGate,
}

pub fn share_process(process: Box<dyn ProcessHandle>) -> SharedProcess {
    Arc::new(Mutex::new(process))
}

pub fn share_reader(reader: PcmReader) -> SharedReader {
    Arc::new(Mutex::new(reader))
}

pub fn share_writer(writer: PcmWriter) -> SharedWriter {
    Arc::new(Mutex::new(writer))
}

fn try_insert<V>(map: &DashMap<GuildId, V>, guild: GuildId, value: V) -> Result<(), V> {
    match map.entry(guild) {
        Entry::Occupied(_) => Err(value),
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}

fn get_cloned<V: Clone>(map: &DashMap<GuildId, V>, guild: GuildId) -> Option<V> {
    map.get(&guild).map(|entry| entry.value().clone())
}

impl AudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playback(&self) -> &PlaybackGate {
        &self.playback
    }

    // ---------------------------------------------------------------
    // Voice client
    // ---------------------------------------------------------------

    pub fn contains_voice_client(&self, guild: GuildId) -> bool {
        self.voice_clients.contains_key(&guild)
    }

    pub fn get_voice_client(&self, guild: GuildId) -> Option<SharedVoiceClient> {
        get_cloned(&self.voice_clients, guild)
    }

    pub fn add_voice_client(&self, guild: GuildId, client: SharedVoiceClient) -> Result<(), SharedVoiceClient> {
        try_insert(&self.voice_clients, guild, client)
    }

    pub fn remove_voice_client(&self, guild: GuildId) -> Option<SharedVoiceClient> {
        self.voice_clients.remove(&guild).map(|(_, v)| v)
    }

    // ---------------------------------------------------------------
    // Transcoder process
    // ---------------------------------------------------------------

    pub fn contains_transcoder_process(&self, guild: GuildId) -> bool {
        self.transcoder_processes.contains_key(&guild)
    }

    pub fn get_transcoder_process(&self, guild: GuildId) -> Option<SharedProcess> {
        get_cloned(&self.transcoder_processes, guild)
    }

    pub fn add_transcoder_process(&self, guild: GuildId, process: SharedProcess) -> Result<(), SharedProcess> {
        try_insert(&self.transcoder_processes, guild, process)
    }

    pub fn remove_transcoder_process(&self, guild: GuildId) -> Option<SharedProcess> {
        self.transcoder_processes.remove(&guild).map(|(_, v)| v)
    }

    // ---------------------------------------------------------------
    // Transcoder output stream
    // ---------------------------------------------------------------

    pub fn contains_transcoder_stream(&self, guild: GuildId) -> bool {
        self.transcoder_streams.contains_key(&guild)
    }

    pub fn get_transcoder_stream(&self, guild: GuildId) -> Option<SharedReader> {
        get_cloned(&self.transcoder_streams, guild)
    }

    pub fn add_transcoder_stream(&self, guild: GuildId, stream: SharedReader) -> Result<(), SharedReader> {
        try_insert(&self.transcoder_streams, guild, stream)
    }

    pub fn remove_transcoder_stream(&self, guild: GuildId) -> Option<SharedReader> {
        self.transcoder_streams.remove(&guild).map(|(_, v)| v)
    }

    // ---------------------------------------------------------------
    // Voice (PCM) stream
    // ---------------------------------------------------------------

    pub fn contains_voice_stream(&self, guild: GuildId) -> bool {
        self.voice_streams.contains_key(&guild)
    }

    pub fn get_voice_stream(&self, guild: GuildId) -> Option<SharedWriter> {
        get_cloned(&self.voice_streams, guild)
    }

    pub fn add_voice_stream(&self, guild: GuildId, stream: SharedWriter) -> Result<(), SharedWriter> {
        try_insert(&self.voice_streams, guild, stream)
    }

    pub fn remove_voice_stream(&self, guild: GuildId) -> Option<SharedWriter> {
        self.voice_streams.remove(&guild).map(|(_, v)| v)
    }
}

impl std::fmt::Debug for AudioStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStore")
            .field("voice_clients", &self.voice_clients.len())
            .field("transcoder_processes", &self.transcoder_processes.len())
            .field("transcoder_streams", &self.transcoder_streams.len())
            .field("voice_streams", &self.voice_streams.len())
            .finish()
    }
}
