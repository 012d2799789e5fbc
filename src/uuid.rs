//! UUID types.

use crate::codec::{Encode, Error, Type};

/// Bluetooth Base UUID `00000000-0000-1000-8000-00805F9B34FB` in little endian byte order.
///
/// SIG-assigned 16-bit UUIDs live in bytes 12 and 13.
pub const BLUETOOTH_BASE_UUID: [u8; 16] = [
    0xfb, 0x34, 0x9b, 0x5f, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// A 16-bit or 128-bit UUID.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Uuid {
    /// 16-bit UUID
    Uuid16([u8; 2]),
    /// 128-bit UUID
    Uuid128([u8; 16]),
}

impl From<u16> for Uuid {
    fn from(data: u16) -> Self {
        Uuid::Uuid16(data.to_le_bytes())
    }
}

impl From<[u8; 2]> for Uuid {
    fn from(data: [u8; 2]) -> Self {
        Uuid::Uuid16(data)
    }
}

impl From<u128> for Uuid {
    fn from(data: u128) -> Self {
        Uuid::Uuid128(data.to_le_bytes())
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(data: [u8; 16]) -> Self {
        Uuid::Uuid128(data)
    }
}

impl Uuid {
    /// Create a new 16-bit UUID.
    pub const fn new_short(val: u16) -> Self {
        Self::Uuid16(val.to_le_bytes())
    }

    /// Create a new 128-bit UUID from little endian bytes.
    pub const fn new_long(val: [u8; 16]) -> Self {
        Self::Uuid128(val)
    }

    /// The SIG-assigned 16-bit value, if this UUID has one.
    ///
    /// A 128-bit UUID built on the Bluetooth Base UUID is folded to its 16-bit alias.
    pub fn as_short(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(data) => Some(u16::from_le_bytes(*data)),
            Uuid::Uuid128(data) => {
                let base = data[..12] == BLUETOOTH_BASE_UUID[..12] && data[14..] == BLUETOOTH_BASE_UUID[14..];
                base.then(|| u16::from_le_bytes([data[12], data[13]]))
            }
        }
    }

    /// Reduce to the most compact form advertised on air.
    pub fn compact(&self) -> Uuid {
        match self.as_short() {
            Some(short) => Uuid::new_short(short),
            None => *self,
        }
    }

    /// Raw little endian bytes.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Uuid::Uuid16(uuid) => uuid,
            Uuid::Uuid128(uuid) => uuid,
        }
    }
}

impl Type for Uuid {
    fn size(&self) -> usize {
        self.as_raw().len()
    }
}

impl Encode for Uuid {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let raw = self.as_raw();
        if dest.len() < raw.len() {
            return Err(Error::InsufficientSpace);
        }
        dest[..raw.len()].copy_from_slice(raw);
        Ok(())
    }
}
