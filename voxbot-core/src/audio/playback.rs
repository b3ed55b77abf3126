//! src/audio/playback.rs
//!
//! Per-guild "playing" gate. At most one playback session per guild holds a
//! ticket; the ticket clears the gate when dropped, so every exit path of a
//! pipeline resets it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::audio::store::GuildId;

#[derive(Debug, Clone)]
struct ActivePlayback {
    session: u64,
    cancel: CancellationToken,
    finished: CancellationToken,
}

#[derive(Debug, Default)]
pub struct PlaybackGate {
    active: Arc<DashMap<GuildId, ActivePlayback>>,
    next_session: AtomicU64,
}

impl PlaybackGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims the gate for `guild`. Returns `None` when a session
    /// is already running there.
    pub fn try_begin(&self, guild: GuildId) -> Option<PlaybackTicket> {
        match self.active.entry(guild) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let session = self.next_session.fetch_add(1, Ordering::Relaxed);
                let active = ActivePlayback {
                    session,
                    cancel: CancellationToken::new(),
                    finished: CancellationToken::new(),
                };
                slot.insert(active.clone());
                Some(PlaybackTicket {
                    guild,
                    session,
                    cancel: active.cancel,
                    finished: active.finished,
                    active: Arc::clone(&self.active),
                })
            }
        }
    }

    pub fn is_playing(&self, guild: GuildId) -> bool {
        self.active.contains_key(&guild)
    }

    /// Signals the running session (if any) to stop. The returned token is
    /// cancelled once that session's ticket is dropped.
    pub fn cancel(&self, guild: GuildId) -> Option<CancellationToken> {
        self.active.get(&guild).map(|entry| {
            entry.cancel.cancel();
            entry.finished.clone()
        })
    }

    /// Clears the gate regardless of who holds it. Only for a session known
    /// to have exited; a live ticket would otherwise share the guild with
    /// the next one.
    pub fn force_reset(&self, guild: GuildId) -> bool {
        self.active.remove(&guild).is_some()
    }
}

/// Proof that the holder owns the playback gate of one guild.
#[derive(Debug)]
pub struct PlaybackTicket {
    guild: GuildId,
    session: u64,
    cancel: CancellationToken,
    finished: CancellationToken,
    active: Arc<DashMap<GuildId, ActivePlayback>>,
}

impl PlaybackTicket {
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PlaybackTicket {
    fn drop(&mut self) {
        // A forced reset followed by a new session must not be undone here.
        let session = self.session;
        self.active.remove_if(&self.guild, |_, active| active.session == session);
        self.finished.cancel();
    }
}
