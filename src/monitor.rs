//! Runs the device session on a dedicated reader thread and hands its single
//! terminal failure back to the supervisor.
use anyhow::{Context as _, Result, anyhow};
use std::{
    sync::mpsc::{Receiver, sync_channel},
    thread,
};

use crate::{
    config::DeviceConfig,
    session::{Session, Termination},
    sink::EventSink,
    usb::UsbHost,
};

const READER_THREAD_NAME: &str = "usb-midi-reader";

/// Background reader that owns all device resources for the session's lifetime.
pub struct SessionMonitor {
    failure: Receiver<Termination>,
    handle: thread::JoinHandle<()>,
}

impl SessionMonitor {
    pub fn start<H, S>(host: H, sink: S, config: DeviceConfig) -> Result<Self>
    where
        H: UsbHost + Send + 'static,
        S: EventSink + Send + 'static,
    {
        // Single slot: the reader reports at most once and then exits.
        let (tx, rx) = sync_channel(1);
        let handle = thread::Builder::new()
            .name(READER_THREAD_NAME.to_owned())
            .spawn(move || {
                let mut session = Session::new(host, sink, config);
                let reason = session.run();
                log::debug!("Reader stopped in state {:?}", session.state());
                // The supervisor may already be gone during process exit.
                tx.send(reason).ok();
            })
            .context("failed to spawn USB reader thread")?;

        Ok(Self {
            failure: rx,
            handle,
        })
    }

    /// Blocks until the reader reports why the session ended.
    pub fn wait(self) -> Result<Termination> {
        let received = self.failure.recv();
        if self.handle.join().is_err() {
            return Err(anyhow!("USB reader thread panicked"));
        }
        received.map_err(|_| anyhow!("USB reader thread exited without reporting"))
    }
}
