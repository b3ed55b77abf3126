// File: voxbot-core/src/audio/mod.rs

pub mod cleanup;
pub mod connector;
pub mod disposer;
pub mod media;
pub mod pcm;
pub mod playback;
pub mod service;
pub mod store;
pub mod transcoder;

pub use connector::ConnectOutcome;
pub use media::{MediaFetcher, YtDlpFetcher};
pub use service::{AudioService, LeaveOutcome, PlayOutcome, SessionState, SkipOutcome};
pub use store::AudioStore;
pub use transcoder::{FfmpegLauncher, TranscoderLauncher};
