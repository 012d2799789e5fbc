//! Advertising payload.
//!
//! Legacy advertising carries at most [`ADV_DATA_MAX`] bytes of advertising data
//! and the same again in the scan response. The payload is built once, before
//! the radio becomes discoverable, and never truncated: anything that does not
//! fit is an error.
use embassy_time::Duration;
use heapless::Vec;

use crate::config::PeripheralConfig;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::uuid::Uuid;
use crate::{codec, Error, ADV_DATA_MAX};

pub const LE_LIMITED_DISCOVERABLE: u8 = 0b00000001;
pub const LE_GENERAL_DISCOVERABLE: u8 = 0b00000010;
pub const BR_EDR_NOT_SUPPORTED: u8 = 0b00000100;

const AD_FLAGS: u8 = 0x01;
const AD_INCOMPLETE_UUIDS16: u8 = 0x02;
const AD_COMPLETE_UUIDS16: u8 = 0x03;
const AD_INCOMPLETE_UUIDS128: u8 = 0x06;
const AD_COMPLETE_UUIDS128: u8 = 0x07;
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// Most UUIDs of one width that a single payload can list.
const MAX_LISTED_UUIDS: usize = ADV_DATA_MAX / 2;

/// Service UUIDs of an AD structure, either as typed values or as received on air.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UuidList<'a> {
    Uuids(&'a [Uuid]),
    /// Little endian UUIDs of `width` bytes each.
    Raw { width: usize, data: &'a [u8] },
}

impl<'a> UuidList<'a> {
    fn encode(&self, width: usize, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        match self {
            UuidList::Uuids(uuids) => {
                for uuid in uuids.iter() {
                    if uuid.as_raw().len() != width {
                        return Err(codec::Error::InvalidValue);
                    }
                    w.write(*uuid)?;
                }
                Ok(())
            }
            UuidList::Raw { width: raw_width, data } if *raw_width == width => w.append(data),
            UuidList::Raw { .. } => Err(codec::Error::InvalidValue),
        }
    }

    fn byte_len(&self, width: usize) -> usize {
        match self {
            UuidList::Uuids(uuids) => uuids.len() * width,
            UuidList::Raw { data, .. } => data.len(),
        }
    }

    pub fn iter(&self) -> UuidIter<'a> {
        UuidIter { list: *self, pos: 0 }
    }
}

pub struct UuidIter<'a> {
    list: UuidList<'a>,
    pos: usize,
}

impl<'a> Iterator for UuidIter<'a> {
    type Item = Uuid;
    fn next(&mut self) -> Option<Uuid> {
        let uuid = match self.list {
            UuidList::Uuids(uuids) => uuids.get(self.pos).copied()?,
            UuidList::Raw { width, data } => {
                let chunk = data.get(self.pos * width..(self.pos + 1) * width)?;
                match width {
                    2 => Uuid::Uuid16([chunk[0], chunk[1]]),
                    16 => {
                        let mut raw = [0u8; 16];
                        raw.copy_from_slice(chunk);
                        Uuid::Uuid128(raw)
                    }
                    _ => return None,
                }
            }
        };
        self.pos += 1;
        Some(uuid)
    }
}

#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdStructure<'a> {
    /// Device flags and baseband capabilities.
    ///
    /// Must not be used in scan response data.
    Flags(u8),

    /// 16-bit service UUIDs, `complete` when no other 16-bit UUID is offered.
    ServiceUuids16 { complete: bool, uuids: UuidList<'a> },

    /// 128-bit service UUIDs, `complete` when the list is not split.
    ServiceUuids128 { complete: bool, uuids: UuidList<'a> },

    /// Sets the full (unabbreviated) device name.
    CompleteLocalName(&'a [u8]),

    /// Sets the shortened device name.
    ShortenedLocalName(&'a [u8]),

    /// An unknown or unimplemented AD structure stored as raw bytes.
    Unknown {
        /// Type byte.
        ty: u8,
        /// Raw data transmitted after the type.
        data: &'a [u8],
    },
}

impl<'d> AdStructure<'d> {
    pub fn encode_slice(data: &[AdStructure<'_>], dest: &mut [u8]) -> Result<usize, codec::Error> {
        let mut w = WriteCursor::new(dest);
        for item in data.iter() {
            item.encode(&mut w)?;
        }
        Ok(w.len())
    }

    /// Encoded length including the length and type bytes.
    pub fn size(&self) -> usize {
        2 + match self {
            AdStructure::Flags(_) => 1,
            AdStructure::ServiceUuids16 { uuids, .. } => uuids.byte_len(2),
            AdStructure::ServiceUuids128 { uuids, .. } => uuids.byte_len(16),
            AdStructure::CompleteLocalName(name) | AdStructure::ShortenedLocalName(name) => name.len(),
            AdStructure::Unknown { data, .. } => data.len(),
        }
    }

    pub fn encode(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        // The length byte excludes itself and must fit in a u8.
        let len = u8::try_from(self.size() - 1).map_err(|_| codec::Error::InsufficientSpace)?;
        if w.available() < self.size() {
            return Err(codec::Error::InsufficientSpace);
        }
        match self {
            AdStructure::Flags(flags) => {
                w.append(&[len, AD_FLAGS, *flags])?;
            }
            AdStructure::ServiceUuids16 { complete, uuids } => {
                let ty = if *complete { AD_COMPLETE_UUIDS16 } else { AD_INCOMPLETE_UUIDS16 };
                w.append(&[len, ty])?;
                uuids.encode(2, w)?;
            }
            AdStructure::ServiceUuids128 { complete, uuids } => {
                let ty = if *complete { AD_COMPLETE_UUIDS128 } else { AD_INCOMPLETE_UUIDS128 };
                w.append(&[len, ty])?;
                uuids.encode(16, w)?;
            }
            AdStructure::ShortenedLocalName(name) => {
                w.append(&[len, AD_SHORTENED_LOCAL_NAME])?;
                w.append(name)?;
            }
            AdStructure::CompleteLocalName(name) => {
                w.append(&[len, AD_COMPLETE_LOCAL_NAME])?;
                w.append(name)?;
            }
            AdStructure::Unknown { ty, data } => {
                w.append(&[len, *ty])?;
                w.append(data)?;
            }
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> impl Iterator<Item = Result<AdStructure<'_>, codec::Error>> {
        AdStructureIter {
            cursor: ReadCursor::new(data),
        }
    }
}

pub struct AdStructureIter<'d> {
    cursor: ReadCursor<'d>,
}

impl<'d> AdStructureIter<'d> {
    fn read(&mut self) -> Result<AdStructure<'d>, codec::Error> {
        let len: u8 = self.cursor.read()?;
        if len == 0 {
            return Err(codec::Error::InvalidValue);
        }
        let code: u8 = self.cursor.read()?;
        let data = self.cursor.slice(len as usize - 1)?;
        match code {
            AD_FLAGS => data.first().map(|f| AdStructure::Flags(*f)).ok_or(codec::Error::InvalidValue),
            AD_INCOMPLETE_UUIDS16 | AD_COMPLETE_UUIDS16 if data.len() % 2 == 0 => Ok(AdStructure::ServiceUuids16 {
                complete: code == AD_COMPLETE_UUIDS16,
                uuids: UuidList::Raw { width: 2, data },
            }),
            AD_INCOMPLETE_UUIDS128 | AD_COMPLETE_UUIDS128 if data.len() % 16 == 0 => {
                Ok(AdStructure::ServiceUuids128 {
                    complete: code == AD_COMPLETE_UUIDS128,
                    uuids: UuidList::Raw { width: 16, data },
                })
            }
            AD_INCOMPLETE_UUIDS16 | AD_COMPLETE_UUIDS16 | AD_INCOMPLETE_UUIDS128 | AD_COMPLETE_UUIDS128 => {
                Err(codec::Error::InvalidValue)
            }
            AD_SHORTENED_LOCAL_NAME => Ok(AdStructure::ShortenedLocalName(data)),
            AD_COMPLETE_LOCAL_NAME => Ok(AdStructure::CompleteLocalName(data)),
            ty => Ok(AdStructure::Unknown { ty, data }),
        }
    }
}

impl<'d> Iterator for AdStructureIter<'d> {
    type Item = Result<AdStructure<'d>, codec::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.available() == 0 {
            return None;
        }
        Some(self.read())
    }
}

/// Advertising data and scan response, each at most [`ADV_DATA_MAX`] bytes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisingPayload {
    adv_data: Vec<u8, ADV_DATA_MAX>,
    scan_data: Vec<u8, ADV_DATA_MAX>,
}

impl AdvertisingPayload {
    /// Assemble flags, complete local name and service UUID list.
    ///
    /// UUIDs on the Bluetooth base are listed in their 16-bit form. Flags, name and
    /// 16-bit list must fit the advertising data. 128-bit UUIDs go into the
    /// advertising data while there is room and into the scan response after that;
    /// a split list is marked incomplete in both places.
    pub fn build(flags: u8, name: &str, service_uuids: &[Uuid]) -> Result<Self, Error> {
        let mut short: Vec<Uuid, MAX_LISTED_UUIDS> = Vec::new();
        let mut long: Vec<Uuid, MAX_LISTED_UUIDS> = Vec::new();
        for uuid in service_uuids.iter().map(Uuid::compact) {
            let list = match uuid {
                Uuid::Uuid16(_) => &mut short,
                Uuid::Uuid128(_) => &mut long,
            };
            if !list.contains(&uuid) {
                list.push(uuid).map_err(|_| Error::PayloadTooLarge)?;
            }
        }

        let mut adv = [0u8; ADV_DATA_MAX];
        let mut w = WriteCursor::new(&mut adv);
        if flags != 0 {
            AdStructure::Flags(flags).encode(&mut w).map_err(too_large)?;
        }
        AdStructure::CompleteLocalName(name.as_bytes())
            .encode(&mut w)
            .map_err(too_large)?;
        if !short.is_empty() {
            AdStructure::ServiceUuids16 {
                complete: true,
                uuids: UuidList::Uuids(&short),
            }
            .encode(&mut w)
            .map_err(too_large)?;
        }

        let in_adv = if w.available() >= 2 {
            ((w.available() - 2) / 16).min(long.len())
        } else {
            0
        };
        let complete = in_adv == 0 || in_adv == long.len();
        if in_adv > 0 {
            AdStructure::ServiceUuids128 {
                complete,
                uuids: UuidList::Uuids(&long[..in_adv]),
            }
            .encode(&mut w)
            .map_err(too_large)?;
        }
        let adv_data = Vec::from_slice(w.finish()).map_err(|_| Error::PayloadTooLarge)?;

        let mut scan = [0u8; ADV_DATA_MAX];
        let mut w = WriteCursor::new(&mut scan);
        if in_adv < long.len() {
            debug!("[adv] {} 128-bit uuids moved to scan response", long.len() - in_adv);
            AdStructure::ServiceUuids128 {
                complete,
                uuids: UuidList::Uuids(&long[in_adv..]),
            }
            .encode(&mut w)
            .map_err(too_large)?;
        }
        let scan_data = Vec::from_slice(w.finish()).map_err(|_| Error::PayloadTooLarge)?;

        trace!("[adv] payload {} + {} bytes", adv_data.len(), scan_data.len());
        Ok(Self { adv_data, scan_data })
    }

    pub fn adv_data(&self) -> &[u8] {
        &self.adv_data
    }

    pub fn scan_data(&self) -> &[u8] {
        &self.scan_data
    }
}

fn too_large(_: codec::Error) -> Error {
    Error::PayloadTooLarge
}

/// Connectable undirected advertising parameters.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParameters {
    /// Advertising interval
    pub interval: Duration,
    pub connectable: bool,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self::from(&PeripheralConfig::default())
    }
}

impl From<&PeripheralConfig> for AdvertisingParameters {
    fn from(config: &PeripheralConfig) -> Self {
        Self {
            interval: config.adv_interval,
            connectable: config.connectable,
        }
    }
}
