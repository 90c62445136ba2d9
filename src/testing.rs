//! In-memory [`UsbHost`] that journals every acquisition and release.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::usb::{ConnectError, InEndpoint, ReadError, UsbHost};

pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

fn record(journal: &Journal, entry: String) {
    journal.lock().unwrap().push(entry);
}

/// One acquired stage. Owns its parent, so the parent is released after it.
pub(crate) struct Stage<P> {
    name: &'static str,
    journal: Journal,
    _parent: P,
}

impl<P> Stage<P> {
    fn acquire(name: &'static str, journal: &Journal, parent: P) -> Self {
        record(journal, format!("acquire {name}"));
        Self {
            name,
            journal: Arc::clone(journal),
            _parent: parent,
        }
    }
}

impl<P> Drop for Stage<P> {
    fn drop(&mut self) {
        record(&self.journal, format!("release {}", self.name));
    }
}

pub(crate) type Context = Stage<()>;
pub(crate) type Device = Stage<Context>;
pub(crate) type Configuration = Stage<Device>;
pub(crate) type Interface = Stage<Configuration>;

pub(crate) struct Endpoint {
    reads: VecDeque<Vec<u8>>,
    _interface: Interface,
}

impl InEndpoint for Endpoint {
    fn address(&self) -> u8 {
        0x81
    }

    fn max_packet_size(&self) -> usize {
        64
    }

    /// Replays the scripted chunks, then fails as if the device was unplugged.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let Some(chunk) = self.reads.pop_front() else {
            return Err(ReadError {
                endpoint: self.address(),
                source: rusb::Error::NoDevice,
            });
        };
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Context,
    Device,
    AutoDetach,
    Configuration,
    Interface,
    Endpoint,
}

#[derive(Default)]
pub(crate) struct MockHost {
    pub(crate) journal: Journal,
    pub(crate) fail_at: Option<Step>,
    reads: Mutex<VecDeque<Vec<u8>>>,
}

impl MockHost {
    pub(crate) fn with_reads<I>(reads: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            reads: Mutex::new(reads.into_iter().collect()),
            ..Default::default()
        }
    }

    pub(crate) fn failing_at(step: Step) -> Self {
        Self {
            fail_at: Some(step),
            ..Default::default()
        }
    }

    fn fails(&self, step: Step) -> bool {
        self.fail_at == Some(step)
    }
}

impl UsbHost for MockHost {
    type Context = Context;
    type Device = Device;
    type Configuration = Configuration;
    type Interface = Interface;
    type Endpoint = Endpoint;

    fn init_context(&self) -> Result<Self::Context, ConnectError> {
        if self.fails(Step::Context) {
            return Err(ConnectError::Context(rusb::Error::Other));
        }
        Ok(Stage::acquire("context", &self.journal, ()))
    }

    fn open_device(
        &self,
        context: Self::Context,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Self::Device, ConnectError> {
        if self.fails(Step::Device) {
            return Err(ConnectError::NotFound {
                vendor_id,
                product_id,
            });
        }
        Ok(Stage::acquire("device", &self.journal, context))
    }

    fn set_auto_detach(&self, _device: &mut Self::Device) -> Result<(), ConnectError> {
        if self.fails(Step::AutoDetach) {
            return Err(ConnectError::AutoDetach(rusb::Error::NotSupported));
        }
        record(&self.journal, "auto-detach".to_owned());
        Ok(())
    }

    fn select_configuration(
        &self,
        device: Self::Device,
        index: u8,
    ) -> Result<Self::Configuration, ConnectError> {
        if self.fails(Step::Configuration) {
            return Err(ConnectError::Configuration {
                index,
                source: rusb::Error::Busy,
            });
        }
        Ok(Stage::acquire("configuration", &self.journal, device))
    }

    fn claim_interface(
        &self,
        configuration: Self::Configuration,
        number: u8,
        alternate_setting: u8,
    ) -> Result<Self::Interface, ConnectError> {
        if self.fails(Step::Interface) {
            return Err(ConnectError::Interface {
                number,
                alternate_setting,
                source: rusb::Error::Access,
            });
        }
        Ok(Stage::acquire("interface", &self.journal, configuration))
    }

    fn open_in_endpoint(
        &self,
        interface: Self::Interface,
        number: u8,
    ) -> Result<Self::Endpoint, ConnectError> {
        if self.fails(Step::Endpoint) {
            return Err(ConnectError::Endpoint {
                number,
                reason: "no such IN endpoint on the interface".to_owned(),
            });
        }
        record(&self.journal, "open endpoint".to_owned());
        let reads = std::mem::take(&mut *self.reads.lock().unwrap());
        Ok(Endpoint {
            reads,
            _interface: interface,
        })
    }
}
