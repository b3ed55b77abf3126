pub mod audio;
pub mod guild;

pub use audio::AudioApplication;
pub use guild::GuildContext;
