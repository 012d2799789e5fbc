//! GATT registry and connection lifecycle for a single-central BLE peripheral.
//!
//! The crate models the event-driven side of a peripheral: a table of services
//! and characteristics backed by fixed-capacity value buffers, the advertising
//! payload built from it, and the state machine that brings the radio up,
//! advertises, accepts one central and goes back to advertising when that
//! central leaves. The radio itself, the heartbeat and the diagnostic output
//! are collaborators supplied by the application.
#![no_std]
#![allow(async_fn_in_trait)]

mod fmt;

mod codec;
mod cursor;

pub mod advertise;
pub mod attribute;
pub mod config;
pub mod diagnostics;
pub mod notify;
pub mod peripheral;
pub mod radio;
pub mod registry;
pub mod runner;
pub mod uuid;

pub use codec::Error as CodecError;

/// ATT MTU used by the peripheral. No MTU exchange is performed.
pub const ATT_MTU: usize = 23;

/// Largest characteristic value that fits a single notification at [`ATT_MTU`].
pub const ATT_VALUE_MAX: usize = ATT_MTU - 3;

/// Legacy advertising and scan response data limit.
pub const ADV_DATA_MAX: usize = 31;

/// Errors raised by the peripheral core.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Value longer than the characteristic capacity.
    CapacityExceeded,
    /// Handle was never registered.
    UnknownHandle,
    /// A service with the same UUID is already registered.
    DuplicateServiceUuid,
    /// Two characteristics of one service share a UUID.
    DuplicateCharacteristicUuid,
    /// The GATT table is frozen once advertising has started.
    AlreadyAdvertising,
    /// No characteristic with that UUID in the service.
    NotFound,
    /// Advertising or scan response data would exceed [`ADV_DATA_MAX`].
    PayloadTooLarge,
    /// The radio reported a failed initialization.
    RadioInitFailure,
    /// The event or request has no transition from the current state.
    InvalidStateTransition,
    /// Remote write to a characteristic without a write property.
    WriteNotPermitted,
    /// A fixed-capacity table is full.
    TableFull,
    /// A radio command failed after initialization.
    Radio,
    /// Encoding ran out of space.
    Codec(codec::Error),
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Self::Codec(error)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::CapacityExceeded => f.write_str("value exceeds characteristic capacity"),
            Error::UnknownHandle => f.write_str("unknown attribute handle"),
            Error::DuplicateServiceUuid => f.write_str("service UUID already registered"),
            Error::DuplicateCharacteristicUuid => f.write_str("characteristic UUID repeated within service"),
            Error::AlreadyAdvertising => f.write_str("GATT table frozen: advertising already started"),
            Error::NotFound => f.write_str("characteristic not found"),
            Error::PayloadTooLarge => f.write_str("advertising payload exceeds 31 bytes"),
            Error::RadioInitFailure => f.write_str("radio initialization failed"),
            Error::InvalidStateTransition => f.write_str("invalid state transition"),
            Error::WriteNotPermitted => f.write_str("write not permitted"),
            Error::TableFull => f.write_str("table full"),
            Error::Radio => f.write_str("radio command failed"),
            Error::Codec(e) => write!(f, "codec error: {:?}", e),
        }
    }
}
