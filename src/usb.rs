//! Acquisition of the USB-MIDI input endpoint.
//!
//! Every stage of the acquisition takes ownership of the previous stage, so
//! the endpoint transitively owns interface, configuration, device and
//! context. Dropping it (or any intermediate stage after a failed step)
//! releases them in reverse acquisition order.

use std::time::Duration;

use rusb::{Direction, TransferType, UsbContext as _};
use thiserror::Error;

use crate::config::DeviceConfig;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not initialize USB context: {0}")]
    Context(#[source] rusb::Error),

    #[error("could not enumerate USB devices: {0}")]
    Enumerate(#[source] rusb::Error),

    #[error("no device found with VID:PID {vendor_id:04x}:{product_id:04x}")]
    NotFound { vendor_id: u16, product_id: u16 },

    #[error("could not open USB device: {0}")]
    Open(#[source] rusb::Error),

    #[error("error turning on auto detach: {0}")]
    AutoDetach(#[source] rusb::Error),

    #[error("error setting config {index}: {source}")]
    Configuration { index: u8, source: rusb::Error },

    #[error("error claiming interface {number} (alt {alternate_setting}): {source}")]
    Interface {
        number: u8,
        alternate_setting: u8,
        source: rusb::Error,
    },

    #[error("error opening IN endpoint {number}: {reason}")]
    Endpoint { number: u8, reason: String },
}

#[derive(Debug, Error)]
#[error("error reading from USB endpoint {endpoint:#04x}: {source}")]
pub struct ReadError {
    pub endpoint: u8,
    pub source: rusb::Error,
}

/// A readable byte endpoint that yields transfer-sized chunks or fails.
pub trait InEndpoint {
    /// Endpoint address including the direction bit.
    fn address(&self) -> u8;

    fn max_packet_size(&self) -> usize;

    /// Blocks until one transfer completes and returns the number of bytes
    /// written into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError>;
}

/// The steps needed to get from nothing to an open IN endpoint.
///
/// Each stage type is expected to release itself on drop.
pub trait UsbHost {
    type Context;
    type Device;
    type Configuration;
    type Interface;
    type Endpoint: InEndpoint;

    fn init_context(&self) -> Result<Self::Context, ConnectError>;

    fn open_device(
        &self,
        context: Self::Context,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Self::Device, ConnectError>;

    fn set_auto_detach(&self, device: &mut Self::Device) -> Result<(), ConnectError>;

    fn select_configuration(
        &self,
        device: Self::Device,
        index: u8,
    ) -> Result<Self::Configuration, ConnectError>;

    fn claim_interface(
        &self,
        configuration: Self::Configuration,
        number: u8,
        alternate_setting: u8,
    ) -> Result<Self::Interface, ConnectError>;

    fn open_in_endpoint(
        &self,
        interface: Self::Interface,
        number: u8,
    ) -> Result<Self::Endpoint, ConnectError>;
}

/// Runs all acquisition steps in order. Fails on the first step that fails.
pub fn connect<H: UsbHost>(host: &H, config: &DeviceConfig) -> Result<H::Endpoint, ConnectError> {
    log::info!("Initializing USB context");
    let context = host.init_context()?;

    let mut device = host.open_device(context, config.vendor_id, config.product_id)?;
    log::info!(
        "🎹 Opened device {:04x}:{:04x}",
        config.vendor_id,
        config.product_id
    );

    host.set_auto_detach(&mut device)?;
    let configuration = host.select_configuration(device, config.configuration)?;
    let interface =
        host.claim_interface(configuration, config.interface, config.alternate_setting)?;
    host.open_in_endpoint(interface, config.endpoint)
}

// ───────────────────────────── libusb backend ───────────────────────────── //

/// [`UsbHost`] backed by libusb.
#[derive(Debug, Default)]
pub struct RusbHost {
    read_timeout: Duration,
}

impl RusbHost {
    #[must_use]
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            read_timeout: config.read_timeout,
        }
    }
}

pub struct LibusbContext {
    context: rusb::Context,
}

impl Drop for LibusbContext {
    fn drop(&mut self) {
        log::debug!("Closing USB context");
    }
}

pub struct LibusbDevice {
    // The handle must be closed before the context is released.
    handle: rusb::DeviceHandle<rusb::Context>,
    _context: LibusbContext,
}

impl Drop for LibusbDevice {
    fn drop(&mut self) {
        log::debug!("Closing USB device");
    }
}

pub struct LibusbConfiguration {
    device: LibusbDevice,
    index: u8,
}

impl Drop for LibusbConfiguration {
    fn drop(&mut self) {
        // libusb keeps the configuration active, there is nothing to undo.
        log::debug!("Releasing configuration {}", self.index);
    }
}

pub struct LibusbInterface {
    configuration: LibusbConfiguration,
    number: u8,
    alternate_setting: u8,
}

impl LibusbInterface {
    fn handle(&self) -> &rusb::DeviceHandle<rusb::Context> {
        &self.configuration.device.handle
    }
}

impl Drop for LibusbInterface {
    fn drop(&mut self) {
        log::debug!("Releasing interface {}", self.number);
        if let Err(err) = self
            .configuration
            .device
            .handle
            .release_interface(self.number)
        {
            log::warn!("Failed to release interface {}: {err}", self.number);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Bulk,
    Interrupt,
}

pub struct LibusbEndpoint {
    interface: LibusbInterface,
    address: u8,
    kind: TransferKind,
    max_packet_size: usize,
    timeout: Duration,
}

impl InEndpoint for LibusbEndpoint {
    fn address(&self) -> u8 {
        self.address
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let handle = self.interface.handle();
        let result = match self.kind {
            TransferKind::Bulk => handle.read_bulk(self.address, buf, self.timeout),
            TransferKind::Interrupt => handle.read_interrupt(self.address, buf, self.timeout),
        };
        result.map_err(|source| ReadError {
            endpoint: self.address,
            source,
        })
    }
}

impl UsbHost for RusbHost {
    type Context = LibusbContext;
    type Device = LibusbDevice;
    type Configuration = LibusbConfiguration;
    type Interface = LibusbInterface;
    type Endpoint = LibusbEndpoint;

    fn init_context(&self) -> Result<Self::Context, ConnectError> {
        let context = rusb::Context::new().map_err(ConnectError::Context)?;
        Ok(LibusbContext { context })
    }

    fn open_device(
        &self,
        context: Self::Context,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Self::Device, ConnectError> {
        let devices = context
            .context
            .devices()
            .map_err(ConnectError::Enumerate)?;
        let device = devices
            .iter()
            .find(|device| {
                device.device_descriptor().is_ok_and(|descriptor| {
                    descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id
                })
            })
            .ok_or(ConnectError::NotFound {
                vendor_id,
                product_id,
            })?;
        log::debug!(
            "Bus {:03} Device {:03} ID {vendor_id:04x}:{product_id:04x}",
            device.bus_number(),
            device.address(),
        );
        let handle = device.open().map_err(ConnectError::Open)?;
        Ok(LibusbDevice {
            handle,
            _context: context,
        })
    }

    fn set_auto_detach(&self, device: &mut Self::Device) -> Result<(), ConnectError> {
        device
            .handle
            .set_auto_detach_kernel_driver(true)
            .map_err(ConnectError::AutoDetach)
    }

    fn select_configuration(
        &self,
        mut device: Self::Device,
        index: u8,
    ) -> Result<Self::Configuration, ConnectError> {
        let to_error = |source| ConnectError::Configuration { index, source };
        let active = device.handle.active_configuration().map_err(to_error)?;
        if active != index {
            log::debug!("Switching configuration {active} -> {index}");
            device
                .handle
                .set_active_configuration(index)
                .map_err(to_error)?;
        }
        Ok(LibusbConfiguration { device, index })
    }

    fn claim_interface(
        &self,
        mut configuration: Self::Configuration,
        number: u8,
        alternate_setting: u8,
    ) -> Result<Self::Interface, ConnectError> {
        let to_error = |source| ConnectError::Interface {
            number,
            alternate_setting,
            source,
        };
        configuration
            .device
            .handle
            .claim_interface(number)
            .map_err(to_error)?;
        // From here on the claim is released on drop, including the error path below.
        let mut interface = LibusbInterface {
            configuration,
            number,
            alternate_setting,
        };
        interface
            .configuration
            .device
            .handle
            .set_alternate_setting(number, alternate_setting)
            .map_err(to_error)?;
        Ok(interface)
    }

    fn open_in_endpoint(
        &self,
        interface: Self::Interface,
        number: u8,
    ) -> Result<Self::Endpoint, ConnectError> {
        let to_error = |reason: String| ConnectError::Endpoint { number, reason };
        let descriptor = interface
            .handle()
            .device()
            .active_config_descriptor()
            .map_err(|err| to_error(err.to_string()))?;
        let mut found = None;
        for iface in descriptor.interfaces() {
            if iface.number() != interface.number {
                continue;
            }
            for setting in iface.descriptors() {
                if setting.setting_number() != interface.alternate_setting {
                    continue;
                }
                for endpoint in setting.endpoint_descriptors() {
                    if endpoint.number() == number && endpoint.direction() == Direction::In {
                        found = Some((
                            endpoint.address(),
                            endpoint.transfer_type(),
                            endpoint.max_packet_size(),
                        ));
                    }
                }
            }
        }
        let Some((address, transfer_type, max_packet_size)) = found else {
            return Err(to_error("no such IN endpoint on the interface".to_owned()));
        };
        let kind = match transfer_type {
            TransferType::Bulk => TransferKind::Bulk,
            TransferType::Interrupt => TransferKind::Interrupt,
            other => return Err(to_error(format!("unsupported transfer type {other:?}"))),
        };
        log::debug!(
            "Opened IN endpoint {address:#04x} ({kind:?}, max packet size {max_packet_size})"
        );
        Ok(LibusbEndpoint {
            interface,
            address,
            kind,
            max_packet_size: max_packet_size.into(),
            timeout: self.read_timeout,
        })
    }
}
