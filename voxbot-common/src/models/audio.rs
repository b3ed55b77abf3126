//! Audio format constants shared by the transcoder and the voice sink.

/// Sample rate the transcoder is asked to produce and the voice sink expects.
pub const SAMPLE_RATE: u32 = 48_000;

/// Interleaved stereo.
pub const CHANNEL_COUNT: u16 = 2;

/// Signed 16-bit little endian samples.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Voice frames are 20ms long.
pub const FRAME_DURATION_MS: u64 = 20;

/// 48000 Hz * 0.020 s * 2 channels * 2 bytes = 3840 bytes per frame.
pub const FRAME_SIZE_BYTES: usize =
    (SAMPLE_RATE as usize / 1000) * FRAME_DURATION_MS as usize * CHANNEL_COUNT as usize * BYTES_PER_SAMPLE;

/// The kind of content an outbound voice stream will carry. Mirrors the
/// application hints voice encoders accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioApplication {
    Voice,
    Music,
    #[default]
    Mixed,
}
