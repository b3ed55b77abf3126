// File: voxbot-core/src/test_utils/mod.rs

pub mod fakes;

pub use fakes::{FakeFetcher, FakeLauncher, FakeProcess, FakeVoiceClient, FakeVoiceGateway};
