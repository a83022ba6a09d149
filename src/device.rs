// src/device.rs

use crate::error::TransportError;
use crate::protocol::{DATA_INTERFACE, PID, VID};
use crate::transport::BulkTransport;
use nusb::{Interface, transfer::RequestBuffer};
use std::future::Future;
use std::mem;
use std::time::Duration;
use tracing::info;

/// Which attached device to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSelector {
    pub vid: u16,
    pub pid: u16,
    /// Position among the devices matching `vid`/`pid`, in enumeration order.
    pub index: usize,
    pub interface: u8,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self {
            vid: VID,
            pid: PID,
            index: 0,
            interface: DATA_INTERFACE,
        }
    }
}

/// Logs every USB device on the system. Purely informational.
pub fn log_devices() -> Result<usize, TransportError> {
    info!("Listing connected USB devices...");
    let mut count = 0;
    for device_info in nusb::list_devices()? {
        info!(
            "Device[{}]: VID: {:#06x}, PID: {:#06x}, Bus: {:03}, Address: {:03}, Speed: {:?}",
            count,
            device_info.vendor_id(),
            device_info.product_id(),
            device_info.bus_number(),
            device_info.device_address(),
            device_info.speed()
        );
        info!(
            "  Manufacturer: {}",
            device_info.manufacturer_string().unwrap_or("<Not available>")
        );
        info!("  Product: {}", device_info.product_string().unwrap_or("<Not available>"));
        info!("  Serial: {}", device_info.serial_number().unwrap_or("<Not available>"));
        count += 1;
    }
    if count == 0 {
        info!("No USB devices found.");
    }
    Ok(count)
}

/// The radio's FT60x bridge, opened through `nusb`. Dropping it releases the interface.
pub struct UsbTransport {
    interface: Interface,
}

impl UsbTransport {
    pub fn open_by_index(selector: DeviceSelector) -> Result<Self, TransportError> {
        info!(
            "Opening device #{} with VID {:#06x} / PID {:#06x}",
            selector.index, selector.vid, selector.pid
        );
        let device_info = nusb::list_devices()?
            .filter(|d| d.vendor_id() == selector.vid && d.product_id() == selector.pid)
            .nth(selector.index)
            .ok_or(TransportError::DeviceNotFound {
                vid: selector.vid,
                pid: selector.pid,
                index: selector.index,
            })?;

        info!(
            "Found device on bus {} addr {}",
            device_info.bus_number(),
            device_info.device_address()
        );

        let device = device_info.open()?;
        let interface = device.detach_and_claim_interface(selector.interface)?;
        info!("Interface {} claimed successfully.", selector.interface);

        Ok(Self { interface })
    }
}

async fn with_timeout<F: Future>(endpoint: u8, timeout: Option<Duration>, transfer: F) -> Result<F::Output, TransportError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, transfer)
            .await
            .map_err(|_| TransportError::Timeout { endpoint }),
        None => Ok(transfer.await),
    }
}

impl BulkTransport for UsbTransport {
    async fn write(&self, endpoint: u8, data: &[u8], timeout: Option<Duration>) -> Result<usize, TransportError> {
        let transfer = self.interface.bulk_out(endpoint, data.to_vec());
        let completion = with_timeout(endpoint, timeout, transfer).await?;
        let response = completion
            .into_result()
            .map_err(|source| TransportError::Transfer { endpoint, source })?;
        Ok(response.actual_length())
    }

    async fn read(
        &self,
        endpoint: u8,
        buf: &mut Vec<u8>,
        max_len: usize,
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let request = RequestBuffer::reuse(mem::take(buf), max_len);
        let transfer = self.interface.bulk_in(endpoint, request);
        let completion = with_timeout(endpoint, timeout, transfer).await?;
        *buf = completion.data;
        completion
            .status
            .map_err(|source| TransportError::Transfer { endpoint, source })?;
        Ok(buf.len())
    }

    async fn abort(&self, endpoint: u8) -> Result<(), TransportError> {
        self.interface.clear_halt(endpoint)?;
        Ok(())
    }
}
