//! Output sequencer - the only writer of the output stream.
//!
//! ```text
//! handler 1 ─┐
//! handler 2 ─┼─► mpsc::UnboundedSender<OutgoingPacket> ─► writer task ─► stream
//! proxy N  ──┘
//! ```
//!
//! The writer task writes one whole frame at a time, in submission order, and
//! drops a final packet's in-flight guard only after the frame was flushed.

use std::io;

use futures::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;
use tokio_util::codec::FramedWrite;

use crate::bridge::FrameCodec;
use crate::inflight::InFlightGuard;

/// One frame payload waiting to be written.
#[derive(Debug)]
pub struct OutgoingPacket {
    payload: Bytes,
    completion: Option<InFlightGuard>,
}

impl OutgoingPacket {
    /// A packet that does not finish any tracked work (e.g. a reverse call).
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            completion: None,
        }
    }

    /// The terminal response of a request; `guard` is released once written.
    pub fn final_response(payload: Bytes, guard: InFlightGuard) -> Self {
        Self {
            payload,
            completion: Some(guard),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_final(&self) -> bool {
        self.completion.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("output stream writer has shut down")]
pub struct OutputClosed;

pub type OutgoingReceiver = mpsc::UnboundedReceiver<OutgoingPacket>;

/// Cloneable submission handle.
#[derive(Debug, Clone)]
pub struct OutgoingSender {
    tx: mpsc::UnboundedSender<OutgoingPacket>,
}

impl OutgoingSender {
    /// Queue a packet. Never blocks, so it is usable from async tasks and
    /// blocking handler threads alike.
    pub fn send(&self, packet: OutgoingPacket) -> Result<(), OutputClosed> {
        // On failure the packet, and with it any guard, is dropped here.
        self.tx.send(packet).map_err(|_| OutputClosed)
    }
}

/// Submission handle plus the receiving end, for callers that drain the queue
/// themselves.
pub fn channel() -> (OutgoingSender, OutgoingReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutgoingSender { tx }, rx)
}

/// Spawn the writer task. `preamble` is written raw before any frame.
///
/// The task finishes once every `OutgoingSender` is dropped and the queue is
/// drained, returning the writer.
pub fn spawn_writer<W>(writer: W, preamble: Bytes) -> (OutgoingSender, JoinHandle<io::Result<W>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, rx) = channel();
    let task = tokio::spawn(run_writer(writer, preamble, rx));
    (sender, task)
}

async fn run_writer<W>(writer: W, preamble: Bytes, mut rx: OutgoingReceiver) -> io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    let mut framed = FramedWrite::new(writer, FrameCodec::new());
    framed.get_mut().write_all(&preamble).await?;
    framed.get_mut().flush().await?;
    tracing::debug!(bytes = preamble.len(), "Wrote handshake preamble");

    let mut broken = false;
    while let Some(packet) = rx.recv().await {
        let OutgoingPacket {
            payload,
            completion,
        } = packet;

        if !broken {
            let len = payload.len();
            match framed.send(payload).await {
                Ok(()) => tracing::trace!(bytes = len, is_final = completion.is_some(), "Wrote frame"),
                Err(e) => {
                    // Keep draining so in-flight guards are still released and
                    // shutdown does not hang on a dead peer.
                    tracing::error!(error = %e, "Output stream write failed, discarding further output");
                    broken = true;
                }
            }
        }

        drop(completion);
    }

    tracing::debug!("Output sequencer exiting");
    Ok(framed.into_inner())
}
