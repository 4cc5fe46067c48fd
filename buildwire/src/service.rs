//! Service instance shared by every handler.
//!
//! One `Service` owns the correlation registry, the output sequencer's
//! submission handle and the in-flight counter for one stream pair. Nothing
//! here is global, so several services can run side by side (as the tests do).

use std::sync::Arc;

use crate::bridge::frame::DEFAULT_MAX_FRAME_LENGTH;
use crate::bridge::{Packet, Value, encode_packet};
use crate::engine::Engine;
use crate::inflight::InFlight;
use crate::outgoing::{OutgoingPacket, OutgoingSender, OutputClosed};
use crate::registry::CorrelationRegistry;
use crate::version::BUILDWIRE_VERSION;

/// Default read chunk size for the input stream.
pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Sent as the handshake preamble.
    pub version: String,
    pub read_buffer_capacity: usize,
    /// Input frames declaring a longer payload end the input stream.
    pub max_frame_length: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new(BUILDWIRE_VERSION)
    }
}

impl ServiceConfig {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    pub fn with_read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity.max(1);
        self
    }

    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }
}

/// Failure of a reverse call into the host.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    OutputClosed(#[from] OutputClosed),

    /// The pending call was dropped before a response arrived.
    #[error("request {id} was abandoned before a response arrived")]
    Abandoned { id: u32 },
}

struct Inner {
    engine: Arc<dyn Engine>,
    registry: CorrelationRegistry,
    outgoing: OutgoingSender,
    in_flight: InFlight,
}

#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

impl Service {
    pub fn new(engine: Arc<dyn Engine>, outgoing: OutgoingSender, in_flight: InFlight) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                registry: CorrelationRegistry::new(),
                outgoing,
                in_flight,
            }),
        }
    }

    pub fn engine(&self) -> &dyn Engine {
        self.inner.engine.as_ref()
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.inner.registry
    }

    pub fn outgoing(&self) -> &OutgoingSender {
        &self.inner.outgoing
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.inner.in_flight
    }

    /// Send `request` to the host and block until its response arrives.
    ///
    /// Must be called from a blocking thread (handlers run on
    /// `spawn_blocking`); it parks the thread, not the runtime. There is no
    /// timeout: if the host never answers, the call never returns.
    pub fn send_request(&self, request: Value) -> Result<Value, ServiceError> {
        let _round_trip = self.inner.in_flight.begin();
        let (id, rx) = self.inner.registry.register_oneshot();

        let payload = encode_packet(&Packet::request(id, request));
        if let Err(e) = self.inner.outgoing.send(OutgoingPacket::new(payload)) {
            self.inner.registry.cancel(id);
            return Err(e.into());
        }
        tracing::debug!(id, "Sent request to host");

        let response = rx.blocking_recv().map_err(|_| ServiceError::Abandoned { id })?;
        tracing::debug!(id, "Received response from host");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::decode_packet;
    use crate::engine::{BuildResult, TransformResult};
    use crate::options::{BuildOptions, TransformOptions};
    use crate::outgoing;

    struct NullEngine;

    impl Engine for NullEngine {
        fn build(&self, _: BuildOptions) -> BuildResult {
            BuildResult::default()
        }

        fn transform(&self, _: String, _: TransformOptions) -> TransformResult {
            TransformResult::default()
        }
    }

    #[test]
    fn config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.version, BUILDWIRE_VERSION);
        assert_eq!(config.read_buffer_capacity, 16 * 1024);
        assert_eq!(config.max_frame_length, 64 * 1024 * 1024);
        assert_eq!(ServiceConfig::new("1.2.3").with_max_frame_length(10).max_frame_length, 10);
        assert_eq!(ServiceConfig::new("1.2.3").with_read_buffer_capacity(0).read_buffer_capacity, 1);
    }

    #[test]
    fn send_request_round_trip() {
        let (sender, mut rx) = outgoing::channel();
        let in_flight = InFlight::new();
        let service = Service::new(Arc::new(NullEngine), sender, in_flight.clone());

        let host = std::thread::spawn({
            let service = service.clone();
            move || {
                let packet = rx.blocking_recv().unwrap();
                assert!(!packet.is_final());
                let request = decode_packet(packet.payload()).unwrap();
                assert!(request.is_request);
                assert_eq!(request.value, Value::from("ping"));
                service.registry().resolve(request.id, Value::from("pong"));
            }
        });

        assert_eq!(service.send_request(Value::from("ping")).unwrap(), Value::from("pong"));
        host.join().unwrap();
        assert_eq!(in_flight.count(), 0);
        assert_eq!(service.registry().pending(), 0);
    }

    #[test]
    fn send_request_fails_when_writer_is_gone() {
        let (sender, rx) = outgoing::channel();
        drop(rx);
        let service = Service::new(Arc::new(NullEngine), sender, InFlight::new());

        assert!(matches!(
            service.send_request(Value::Null),
            Err(ServiceError::OutputClosed(_))
        ));
        assert_eq!(service.registry().pending(), 0);
    }
}
