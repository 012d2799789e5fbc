//! Opinionated BLE codec
//!
//! Assumes little endian for all types

pub trait FixedSize: Sized {
    const SIZE: usize;
}

pub trait Type: Sized {
    fn size(&self) -> usize;
}

pub trait Encode: Type {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error>;
}

pub trait Decode<'d>: Type {
    fn decode(src: &'d [u8]) -> Result<Self, Error>;
}

impl<T: FixedSize> Type for T {
    fn size(&self) -> usize {
        Self::SIZE
    }
}

/// Encoding and decoding failures.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InsufficientSpace,
    InvalidValue,
}

impl FixedSize for u8 {
    const SIZE: usize = 1;
}

impl Encode for u8 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let Some(slot) = dest.first_mut() else {
            return Err(Error::InsufficientSpace);
        };
        *slot = *self;
        Ok(())
    }
}

impl Decode<'_> for u8 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        src.first().copied().ok_or(Error::InsufficientSpace)
    }
}
