//! Fixed selection of the USB-MIDI peripheral and its input endpoint.

use std::time::Duration;

/// Vendor/product of the keyboard this monitor talks to.
pub const VENDOR_ID: u16 = 0x0A67;
pub const PRODUCT_ID: u16 = 0x2114;

/// Full-speed bulk/interrupt endpoints never exceed 64 bytes per transfer.
pub const TRANSFER_SIZE: usize = 64;

/// Immutable device selection, handed to the session when it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub configuration: u8,
    pub interface: u8,
    pub alternate_setting: u8,
    /// Endpoint number without the direction bit.
    pub endpoint: u8,
    pub transfer_size: usize,
    /// `Duration::ZERO` blocks until data arrives.
    pub read_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            configuration: 1,
            interface: 1,
            alternate_setting: 0,
            endpoint: 1,
            transfer_size: TRANSFER_SIZE,
            read_timeout: Duration::ZERO,
        }
    }
}

impl DeviceConfig {
    /// Size of the reusable transfer buffer, never below the endpoint's packet size.
    #[must_use]
    pub fn buffer_len(&self, max_packet_size: usize) -> usize {
        self.transfer_size.max(max_packet_size)
    }
}
