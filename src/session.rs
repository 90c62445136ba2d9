//! The device session: connect, stream, terminate.

use std::convert::Infallible;

use thiserror::Error;

use crate::{
    config::DeviceConfig,
    midi::{self, DecodeError},
    sink::EventSink,
    usb::{self, ConnectError, InEndpoint, ReadError, UsbHost},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Terminated,
}

/// Why a session ended. Every variant is fatal for the process.
#[derive(Debug, Error)]
pub enum Termination {
    #[error("could not connect: {0}")]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("could not decode MIDI data: {0}")]
    Decode(#[from] DecodeError),
}

/// Owns the device selection and the event sink of a single session.
///
/// There is no reconnect: once [`Session::run`] returns, the session is
/// [`SessionState::Terminated`] and all device resources have been released.
#[derive(Debug)]
pub struct Session<H, S> {
    host: H,
    sink: S,
    config: DeviceConfig,
    state: SessionState,
}

impl<H, S> Session<H, S>
where
    H: UsbHost,
    S: EventSink,
{
    pub fn new(host: H, sink: S, config: DeviceConfig) -> Self {
        Self {
            host,
            sink,
            config,
            state: SessionState::Connecting,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Blocks until the session fails and returns the reason.
    pub fn run(&mut self) -> Termination {
        debug_assert_eq!(SessionState::Connecting, self.state);
        let reason = match usb::connect(&self.host, &self.config) {
            Ok(endpoint) => {
                self.set_state(SessionState::Streaming);
                // The endpoint and everything it owns is dropped before `stream` returns.
                let Err(reason) = self.stream(endpoint);
                reason
            }
            Err(err) => err.into(),
        };
        self.set_state(SessionState::Terminated);
        reason
    }

    fn stream(&mut self, mut endpoint: H::Endpoint) -> Result<Infallible, Termination> {
        // Reused for every read. Decoding completes before the next read.
        let mut buf = vec![0; self.config.buffer_len(endpoint.max_packet_size())];
        log::debug!(
            "Reading {} byte transfers from endpoint {:#04x}",
            buf.len(),
            endpoint.address()
        );
        log::info!("Waiting for MIDI data...");
        loop {
            let len = endpoint.read(&mut buf)?;
            let chunk = &buf[..len];
            if len > 0 && !midi::is_realtime_only(chunk) {
                log::debug!("Read {len} bytes: {chunk:02x?}");
            }
            for event in midi::decode(chunk)? {
                self.sink.observe(event);
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        log::debug!("Session state: {:?} -> {state:?}", self.state);
        self.state = state;
    }
}
