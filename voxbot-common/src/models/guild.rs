use std::fmt;

use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

/// Identifies the guild a piece of audio work belongs to.
///
/// The name is only carried for log lines; every lookup is keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildContext {
    pub id: Id<GuildMarker>,
    pub name: String,
}

impl GuildContext {
    pub fn new(id: Id<GuildMarker>, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

impl fmt::Display for GuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.name, self.id)
    }
}
