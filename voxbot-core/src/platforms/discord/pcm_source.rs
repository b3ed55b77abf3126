//! pcm_source.rs
//!
//! Read half of an outbound voice stream. Songbird's mixer pulls from this
//! on its own thread, so reads block until the next frame from the
//! `PcmFrameSink` arrives. Frames come in as s16le and leave as the
//! interleaved f32le samples `RawAdapter` expects. A closed channel is
//! end of track.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Mutex;

use bytes::Bytes;
use symphonia::core::io::MediaSource;
use tokio::sync::mpsc::Receiver;

use voxbot_common::models::audio::BYTES_PER_SAMPLE;

pub struct PcmFrameSource {
    frames: Mutex<Receiver<Bytes>>,
    decoded: Vec<u8>,
    position: usize,
}

impl PcmFrameSource {
    pub fn new(frames: Receiver<Bytes>) -> Self {
        Self {
            frames: Mutex::new(frames),
            decoded: Vec::new(),
            position: 0,
        }
    }

    /// Blocks for the next frame. `false` once the sink side is gone.
    fn refill(&mut self) -> io::Result<bool> {
        let frames = self
            .frames
            .get_mut()
            .map_err(|_| io::Error::other("pcm frame receiver poisoned"))?;
        match frames.blocking_recv() {
            Some(frame) => {
                self.decoded = s16le_to_f32le(&frame);
                self.position = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub fn s16le_to_f32le(frame: &[u8]) -> Vec<u8> {
    frame
        .chunks_exact(BYTES_PER_SAMPLE)
        .flat_map(|sample| {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            (f32::from(value) / 32768.0).to_le_bytes()
        })
        .collect()
}

impl Read for PcmFrameSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.position >= self.decoded.len() {
            if !self.refill()? {
                return Ok(0);
            }
        }

        let available = &self.decoded[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Seek for PcmFrameSource {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "live pcm stream cannot seek"))
    }
}

impl MediaSource for PcmFrameSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn samples_are_scaled_into_unit_range() {
        let frame: Vec<u8> = [i16::MIN, 0, 16384, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let floats: Vec<f32> = s16le_to_f32le(&frame)
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        assert_eq!(floats[0], -1.0);
        assert_eq!(floats[1], 0.0);
        assert_eq!(floats[2], 0.5);
        assert!(floats[3] < 1.0 && floats[3] > 0.999);
    }

    #[test]
    fn reads_span_frames_and_end_when_the_sink_closes() {
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(Bytes::from(vec![0u8; 8])).unwrap();
        tx.blocking_send(Bytes::from(vec![0u8; 4])).unwrap();
        drop(tx);

        let mut source = PcmFrameSource::new(rx);
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();

        // 6 samples of 2 bytes each become 6 floats of 4 bytes.
        assert_eq!(out.len(), 24);
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn read_blocks_until_a_frame_arrives() {
        let (tx, rx) = mpsc::channel(1);
        let reader = std::thread::spawn(move || {
            let mut source = PcmFrameSource::new(rx);
            let mut buf = [0u8; 64];
            source.read(&mut buf).unwrap()
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        tx.blocking_send(Bytes::from(1000i16.to_le_bytes().to_vec())).unwrap();
        assert_eq!(reader.join().unwrap(), 4);
    }

    #[test]
    fn seeking_is_refused() {
        let (_tx, rx) = mpsc::channel::<Bytes>(1);
        let mut source = PcmFrameSource::new(rx);
        assert!(source.seek(SeekFrom::Start(0)).is_err());
        assert!(!source.is_seekable());
    }
}
