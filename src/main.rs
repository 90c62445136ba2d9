mod config;
mod midi;
mod monitor;
mod session;
mod sink;
mod usb;

#[cfg(test)]
mod testing;

use anyhow::Result;
use env_logger::Env;

use crate::{config::DeviceConfig, sink::LogSink, usb::RusbHost};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = DeviceConfig::default();
    let host = RusbHost::new(&config);

    // pipeline: USB endpoint → decoder → log
    let monitor = monitor::SessionMonitor::start(host, LogSink, config)?;

    // The session never ends on its own terms, every reason is fatal.
    let reason = monitor.wait()?;
    log::error!("Error in reader: {reason}");
    Err(anyhow::Error::new(reason).context("USB-MIDI session terminated"))
}
