//! pcm_sink.rs
//!
//! Write half of an outbound voice stream. Bytes are cut into fixed 20ms
//! frames before they are handed to the track's `PcmFrameSource`, so the
//! mixer never sees a partial frame.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::PollSender;

use voxbot_common::models::audio::FRAME_SIZE_BYTES;

pub struct PcmFrameSink {
    sender: PollSender<Bytes>,
    pending: BytesMut,
    closed: bool,
}

fn track_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "voice track is gone")
}

impl PcmFrameSink {
    pub fn new(sender: Sender<Bytes>) -> Self {
        Self {
            sender: PollSender::new(sender),
            pending: BytesMut::with_capacity(FRAME_SIZE_BYTES),
            closed: false,
        }
    }

    /// Sends `pending` once it holds a whole frame.
    fn poll_send_full_frame(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.pending.len() < FRAME_SIZE_BYTES {
            return Poll::Ready(Ok(()));
        }
        ready!(self.sender.poll_reserve(cx)).map_err(|_| track_gone())?;
        let frame = self.pending.split_to(FRAME_SIZE_BYTES).freeze();
        self.sender.send_item(frame).map_err(|_| track_gone())?;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for PcmFrameSink {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(track_gone()));
        }
        ready!(this.poll_send_full_frame(cx))?;

        let room = FRAME_SIZE_BYTES - this.pending.len();
        let accepted = room.min(buf.len());
        this.pending.extend_from_slice(&buf[..accepted]);
        Poll::Ready(Ok(accepted))
    }

    /// Only whole frames leave on flush; a trailing partial frame waits for
    /// more bytes or for shutdown.
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }
        this.poll_send_full_frame(cx)
    }

    /// Pads the trailing partial frame with silence, sends it and closes the
    /// channel. Repeated shutdowns are no-ops.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }
        ready!(this.poll_send_full_frame(cx))?;

        if !this.pending.is_empty() {
            this.pending.resize(FRAME_SIZE_BYTES, 0);
            ready!(this.poll_send_full_frame(cx))?;
        }

        this.sender.close();
        this.closed = true;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn flush_emits_only_whole_frames() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = PcmFrameSink::new(tx);

        sink.write_all(&vec![1u8; FRAME_SIZE_BYTES + 100]).await.unwrap();
        sink.flush().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), FRAME_SIZE_BYTES);
        assert!(rx.try_recv().is_err(), "the 100 trailing bytes must wait");
    }

    #[tokio::test]
    async fn shutdown_pads_the_last_frame_with_silence() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = PcmFrameSink::new(tx);

        sink.write_all(&[9u8; 10]).await.unwrap();
        sink.shutdown().await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.len(), FRAME_SIZE_BYTES);
        assert!(frame[..10].iter().all(|b| *b == 9));
        assert!(frame[10..].iter().all(|b| *b == 0));
        assert!(rx.recv().await.is_none(), "shutdown closes the channel");

        sink.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn writes_fail_once_the_track_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let mut sink = PcmFrameSink::new(tx);
        drop(rx);

        let err = sink
            .write_all(&vec![0u8; FRAME_SIZE_BYTES * 2])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn writes_after_shutdown_are_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = PcmFrameSink::new(tx);
        sink.shutdown().await.unwrap();
        assert!(sink.write_all(b"late").await.is_err());
    }
}
