//! Characteristic value storage.
use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

pub use crate::uuid::Uuid;
use crate::{Error, ATT_VALUE_MAX};

/// Characteristic value bytes, bounded by [`ATT_VALUE_MAX`].
pub type AttributeValue = Vec<u8, ATT_VALUE_MAX>;

/// Characteristic properties
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CharacteristicProp {
    /// Read
    Read = 0x02,
    /// Write without response
    WriteWithoutResponse = 0x04,
    /// Write
    Write = 0x08,
    /// Notify
    Notify = 0x10,
    /// Indicate
    Indicate = 0x20,
}

/// Properties of a characteristic.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProps(u8);

impl<'a> From<&'a [CharacteristicProp]> for CharacteristicProps {
    fn from(props: &'a [CharacteristicProp]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= *prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl<const T: usize> From<[CharacteristicProp; T]> for CharacteristicProps {
    fn from(props: [CharacteristicProp; T]) -> Self {
        props[..].into()
    }
}

impl CharacteristicProps {
    /// Check if any of the properties are set.
    pub fn any(&self, props: &[CharacteristicProp]) -> bool {
        props.iter().any(|p| (*p as u8) & self.0 != 0)
    }

    /// Readable by a central.
    pub fn readable(&self) -> bool {
        self.any(&[CharacteristicProp::Read])
    }

    /// Writable by a central.
    pub fn writable(&self) -> bool {
        self.any(&[CharacteristicProp::Write, CharacteristicProp::WriteWithoutResponse])
    }

    /// Value changes are pushed to a connected central.
    pub fn notifiable(&self) -> bool {
        self.any(&[CharacteristicProp::Notify, CharacteristicProp::Indicate])
    }

    /// Raw property bits as they appear in the characteristic declaration.
    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl fmt::Debug for CharacteristicProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharacteristicProps({:#04x})", self.0)
    }
}

/// A value buffer with a capacity fixed when the characteristic is registered.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct ValueSlot {
    pub(crate) handle: u16,
    pub(crate) props: CharacteristicProps,
    capacity: usize,
    value: AttributeValue,
}

impl ValueSlot {
    pub(crate) fn new(handle: u16, props: CharacteristicProps, capacity: usize, initial: &[u8]) -> Result<Self, Error> {
        if capacity > ATT_VALUE_MAX || initial.len() > capacity {
            return Err(Error::CapacityExceeded);
        }
        let value = Vec::from_slice(initial).map_err(|_| Error::CapacityExceeded)?;
        Ok(Self {
            handle,
            props,
            capacity,
            value,
        })
    }

    fn replace(&mut self, input: &[u8]) -> Result<(), Error> {
        if input.len() > self.capacity {
            return Err(Error::CapacityExceeded);
        }
        // Length checked against capacity, which never exceeds the buffer bound.
        self.value = Vec::from_slice(input).map_err(|_| Error::CapacityExceeded)?;
        Ok(())
    }
}

impl fmt::Debug for ValueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSlot")
            .field("handle", &self.handle)
            .field("props", &self.props)
            .field("capacity", &self.capacity)
            .field("len", &self.value.len())
            .finish()
    }
}

/// Outcome of a successful [`AttributeStore::write`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Written {
    /// Value handle that was written.
    pub handle: u16,
    /// The characteristic pushes changes to a connected central.
    pub notify: bool,
}

/// Value storage for every registered characteristic.
///
/// The store is a view shared between event dispatch and application code. All
/// mutation goes through [`AttributeStore::write`], which replaces a whole value under
/// the mutex so a reader never sees a partially written buffer. With a single dispatch
/// context `NoopRawMutex` is enough; use `CriticalSectionRawMutex` when interrupts
/// touch the store.
pub struct AttributeStore<M: RawMutex, const MAX: usize> {
    inner: Mutex<M, RefCell<Vec<ValueSlot, MAX>>>,
}

impl<M: RawMutex, const MAX: usize> Default for AttributeStore<M, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const MAX: usize> AttributeStore<M, MAX> {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    fn with_slot<F: FnOnce(&mut ValueSlot) -> R, R>(&self, handle: u16, f: F) -> Result<R, Error> {
        self.inner.lock(|inner| {
            let mut slots = inner.borrow_mut();
            match slots.iter_mut().find(|s| s.handle == handle) {
                Some(slot) => Ok(f(slot)),
                None => Err(Error::UnknownHandle),
            }
        })
    }

    pub(crate) fn insert(&self, slot: ValueSlot) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let mut slots = inner.borrow_mut();
            debug_assert!(slots.iter().all(|s| s.handle != slot.handle));
            slots.push(slot).map_err(|_| Error::TableFull)
        })
    }

    pub(crate) fn available(&self) -> usize {
        self.inner.lock(|inner| MAX - inner.borrow().len())
    }

    /// Copy out the current value of a characteristic.
    pub fn read(&self, handle: u16) -> Result<AttributeValue, Error> {
        self.with_slot(handle, |slot| slot.value.clone())
    }

    /// Read the value of the characteristic and pass the value to the provided closure.
    ///
    /// The return value of the closure is returned in this function and is assumed to be infallible.
    pub fn get<F: FnOnce(&[u8]) -> T, T>(&self, handle: u16, f: F) -> Result<T, Error> {
        self.with_slot(handle, |slot| f(&slot.value))
    }

    /// Replace the value of a characteristic.
    ///
    /// Fails with [`Error::CapacityExceeded`] if `input` is longer than the capacity the
    /// characteristic was registered with; the stored value is left untouched.
    /// Applications write through [`PeripheralLifecycle::write`](crate::peripheral::PeripheralLifecycle::write),
    /// which keeps the radio and the central in sync.
    pub(crate) fn write(&self, handle: u16, input: &[u8]) -> Result<Written, Error> {
        self.with_slot(handle, |slot| {
            slot.replace(input)?;
            trace!("[gatt] handle {} <- {} bytes", handle, input.len());
            Ok(Written {
                handle,
                notify: slot.props.notifiable(),
            })
        })?
    }

    /// Properties registered for a value handle.
    pub fn props(&self, handle: u16) -> Result<CharacteristicProps, Error> {
        self.with_slot(handle, |slot| slot.props)
    }

    /// Capacity registered for a value handle.
    pub fn capacity(&self, handle: u16) -> Result<usize, Error> {
        self.with_slot(handle, |slot| slot.capacity)
    }

    /// Visit every stored value in registration order.
    pub fn for_each<F: FnMut(u16, &[u8])>(&self, mut f: F) {
        self.inner.lock(|inner| {
            for slot in inner.borrow().iter() {
                f(slot.handle, &slot.value);
            }
        })
    }
}
