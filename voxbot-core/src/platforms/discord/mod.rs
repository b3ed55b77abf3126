pub mod pcm_sink;
pub mod pcm_source;
pub mod runtime;
pub mod voice;

pub use runtime::{DiscordEvent, DiscordPlatform};
pub use voice::{SongbirdVoiceClient, SongbirdVoiceGateway};
