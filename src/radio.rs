//! Radio and GATT transport seam.
//!
//! The peripheral configures the radio through [`Radio`] and learns about
//! everything the radio does through [`Event`]s fed into
//! [`PeripheralLifecycle::handle_event`](crate::peripheral::PeripheralLifecycle::handle_event).
//! Commands return as soon as they are issued; completion is reported by a
//! later event.
use bt_hci::param::{BdAddr, ConnHandle};

use crate::advertise::{AdvertisingParameters, AdvertisingPayload};
use crate::attribute::AttributeValue;
use crate::registry::ServiceEntry;

/// Commands the peripheral issues to the BLE stack.
pub trait Radio {
    type Error: core::fmt::Debug;

    /// Begin bringing up the stack. Completion arrives as [`Event::InitComplete`].
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Add a service and its characteristics to the stack's GATT server.
    fn add_service(&mut self, service: &ServiceEntry) -> Result<(), Self::Error>;

    /// Mirror a characteristic value into the stack's GATT server.
    fn write_value(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error>;

    fn start_advertising(
        &mut self,
        payload: &AdvertisingPayload,
        params: &AdvertisingParameters,
    ) -> Result<(), Self::Error>;

    fn stop_advertising(&mut self) -> Result<(), Self::Error>;

    /// Notify the connected central of a new value.
    fn notify(&mut self, conn: ConnHandle, handle: u16, value: &[u8]) -> Result<(), Self::Error>;

    /// Ask the central to disconnect. Completion arrives as [`Event::CentralDisconnected`].
    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), Self::Error>;

    /// Power the stack down.
    fn shutdown(&mut self) -> Result<(), Self::Error>;
}

/// Things the radio reports back.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Result of [`Radio::init`].
    InitComplete { success: bool },
    CentralConnected { handle: ConnHandle, peer: BdAddr },
    CentralDisconnected { handle: ConnHandle, reason: u8 },
    /// A central wrote a characteristic value.
    WriteRequest { handle: u16, data: AttributeValue },
    /// The application or platform asked for the radio to go down.
    ShutdownRequested,
}
