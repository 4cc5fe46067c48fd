//! Input loop: frames in, one task per frame, drain on EOF.
//!
//! ```text
//! reader ─► FramedRead<FrameCodec> ─► tokio::spawn(handle_frame) per frame
//!                                         │
//!                       response ─────────┼──► registry.resolve (inline)
//!                       request ──────────┴──► spawn_blocking(router) ─► outgoing
//! ```
//!
//! Responses from the host are resolved on the async task rather than the
//! blocking pool, so a pool full of handlers waiting on plugin round trips
//! can always be woken.

use std::io;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::bytes::Bytes;
use tokio_util::codec::FramedRead;

use crate::bridge::protocol::{error_response, handshake_preamble};
use crate::bridge::{FrameCodec, Packet, decode_packet, encode_packet};
use crate::engine::Engine;
use crate::inflight::{InFlight, InFlightGuard};
use crate::outgoing::{OutgoingPacket, spawn_writer};
use crate::router;
use crate::service::{Service, ServiceConfig};

/// Serve requests from `reader`, writing responses to `writer`, until the
/// reader reaches EOF and every started response has been written.
///
/// Returns the writer once the output sequencer has finished with it.
pub async fn run_service<R, W>(
    config: ServiceConfig,
    engine: Arc<dyn Engine>,
    reader: R,
    writer: W,
) -> io::Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outgoing, writer_task) = spawn_writer(writer, handshake_preamble(&config.version));
    let in_flight = InFlight::new();
    let service = Service::new(engine, outgoing, in_flight.clone());
    tracing::info!(version = %config.version, "Service started");

    let codec = FrameCodec::with_max_frame_length(config.max_frame_length);
    let mut frames = FramedRead::with_capacity(reader, codec, config.read_buffer_capacity);
    let mut read_error = None;
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(payload) => {
                let guard = in_flight.begin();
                tokio::spawn(handle_frame(service.clone(), payload, guard));
            }
            Err(e) => {
                tracing::error!(error = %e, "Input stream read failed");
                read_error = Some(e);
                break;
            }
        }
    }
    drop(frames);

    tracing::debug!(in_flight = in_flight.count(), "Input closed, waiting for in-flight work");
    in_flight.wait_idle().await;

    // The writer task ends once the last sender (held by the service) is gone.
    drop(service);
    let writer = writer_task.await.map_err(io::Error::other)??;
    tracing::info!("Service stopped");

    match read_error {
        Some(e) => Err(e),
        None => Ok(writer),
    }
}

async fn handle_frame(service: Service, payload: Bytes, guard: InFlightGuard) {
    let Some(packet) = decode_packet(&payload) else {
        tracing::trace!(bytes = payload.len(), "Dropping malformed packet");
        return;
    };

    if !packet.is_request {
        service.registry().resolve(packet.id, packet.value);
        return;
    }

    let id = packet.id;
    let response = tokio::task::spawn_blocking({
        let service = service.clone();
        move || router::handle_request(&service, id, packet.value)
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!(id, error = %e, "Request task failed");
        error_response(format!("request task failed: {e}"))
    });

    let payload = encode_packet(&Packet::response(id, response));
    if service
        .outgoing()
        .send(OutgoingPacket::final_response(payload, guard))
        .is_err()
    {
        tracing::warn!(id, "Output stream closed, dropping response");
    }
}
