//! GATT service registry.
//!
//! Services are registered once at startup, before the radio becomes
//! discoverable. Registration assigns attribute handles in GATT table order:
//! a declaration handle for the service, then for every characteristic a
//! declaration handle, its value handle and, when it notifies, a CCCD handle.
//! Handles start at 1 and are contiguous, so a fixed registration order always
//! produces the same numbering.
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::attribute::{AttributeStore, CharacteristicProp, CharacteristicProps, ValueSlot};
use crate::config::PeripheralConfig;
use crate::uuid::Uuid;
use crate::Error;

/// Maximum number of services in the table.
pub const MAX_SERVICES: usize = 4;

/// Maximum number of characteristics per service.
pub const MAX_CHARACTERISTICS: usize = 4;

/// UUID for the device information service
pub const DEVICE_INFORMATION_SERVICE_UUID16: Uuid = Uuid::new_short(0x180a);

/// UUID for the battery service
pub const BATTERY_SERVICE_UUID16: Uuid = Uuid::new_short(0x180f);

/// UUID for device name characteristic
pub const CHARACTERISTIC_DEVICE_NAME_UUID16: Uuid = Uuid::new_short(0x2a00);

/// UUID for model number string characteristic
pub const CHARACTERISTIC_MODEL_NUMBER_UUID16: Uuid = Uuid::new_short(0x2a24);

/// UUID for serial number string characteristic
pub const CHARACTERISTIC_SERIAL_NUMBER_UUID16: Uuid = Uuid::new_short(0x2a25);

/// UUID for battery level characteristic
pub const CHARACTERISTIC_BATTERY_LEVEL_UUID16: Uuid = Uuid::new_short(0x2a19);

/// UUID for the application service (`7a1c0001-5c2e-4d1f-9b3a-2f6d8e4c1b00`).
pub const CUSTOM_SERVICE_UUID128: Uuid = Uuid::new_long(0x7a1c0001_5c2e_4d1f_9b3a_2f6d8e4c1b00u128.to_le_bytes());

/// UUID for the application value characteristic (`7a1c0002-5c2e-4d1f-9b3a-2f6d8e4c1b00`).
pub const CUSTOM_VALUE_UUID128: Uuid = Uuid::new_long(0x7a1c0002_5c2e_4d1f_9b3a_2f6d8e4c1b00u128.to_le_bytes());

/// A GATT service.
#[derive(Debug, Clone, Copy)]
pub struct Service {
    /// UUID of the service.
    pub uuid: Uuid,
}

impl Service {
    /// Create a new service with a uuid.
    pub fn new<U: Into<Uuid>>(uuid: U) -> Self {
        Self { uuid: uuid.into() }
    }
}

/// Definition of a characteristic passed to [`ServiceRegistry::register_service`].
#[derive(Debug, Clone, Copy)]
pub struct CharacteristicDef<'a> {
    pub uuid: Uuid,
    pub props: CharacteristicProps,
    /// Fixed capacity of the value buffer.
    pub capacity: usize,
    /// Value stored at registration.
    pub initial: &'a [u8],
}

impl<'a> CharacteristicDef<'a> {
    pub fn new<U: Into<Uuid>>(uuid: U, props: &[CharacteristicProp], capacity: usize, initial: &'a [u8]) -> Self {
        Self {
            uuid: uuid.into(),
            props: props.into(),
            capacity,
            initial,
        }
    }

    /// Read-only characteristic.
    pub fn read_only<U: Into<Uuid>>(uuid: U, capacity: usize, initial: &'a [u8]) -> Self {
        Self::new(uuid, &[CharacteristicProp::Read], capacity, initial)
    }
}

/// Handle to a registered service.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceHandle {
    pub(crate) handle: u16,
}

impl ServiceHandle {
    /// Handle of the service declaration.
    pub fn handle(&self) -> u16 {
        self.handle
    }
}

/// A characteristic in the attribute table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub(crate) handle: u16,
    pub(crate) cccd_handle: Option<u16>,
    pub(crate) service: ServiceHandle,
}

impl CharacteristicHandle {
    /// Value handle, used for reads, writes and notifications.
    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Client characteristic configuration descriptor, present for notifiable characteristics.
    pub fn cccd_handle(&self) -> Option<u16> {
        self.cccd_handle
    }

    /// Service owning this characteristic.
    pub fn service(&self) -> ServiceHandle {
        self.service
    }
}

/// Registered characteristic metadata. The value lives in the [`AttributeStore`].
#[derive(Debug, Clone)]
pub struct CharacteristicEntry {
    uuid: Uuid,
    props: CharacteristicProps,
    declaration: u16,
    handle: CharacteristicHandle,
}

impl CharacteristicEntry {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn props(&self) -> CharacteristicProps {
        self.props
    }

    /// Handle of the characteristic declaration attribute.
    pub fn declaration_handle(&self) -> u16 {
        self.declaration
    }

    pub fn handle(&self) -> CharacteristicHandle {
        self.handle
    }
}

/// Registered service with its characteristics in insertion order.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    uuid: Uuid,
    handle: ServiceHandle,
    last_handle_in_group: u16,
    characteristics: Vec<CharacteristicEntry, MAX_CHARACTERISTICS>,
}

impl ServiceEntry {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle
    }

    /// Last attribute handle belonging to this service.
    pub fn last_handle_in_group(&self) -> u16 {
        self.last_handle_in_group
    }

    pub fn characteristics(&self) -> &[CharacteristicEntry] {
        &self.characteristics
    }
}

/// Owner of all services and characteristics of the peripheral.
pub struct ServiceRegistry<M: RawMutex, const MAX: usize> {
    services: Vec<ServiceEntry, MAX_SERVICES>,
    store: AttributeStore<M, MAX>,
    next_handle: u16,
    frozen: bool,
}

impl<M: RawMutex, const MAX: usize> Default for ServiceRegistry<M, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const MAX: usize> ServiceRegistry<M, MAX> {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            services: Vec::new(),
            store: AttributeStore::new(),
            next_handle: 1,
            frozen: false,
        }
    }

    /// Create a registry holding the device information, battery and application services.
    pub fn with_standard_services(config: &PeripheralConfig) -> Result<(Self, StandardServices), Error> {
        let mut registry = Self::new();
        let handles = standard_services(&mut registry, config)?;
        Ok((registry, handles))
    }

    /// Register a service and its characteristics.
    ///
    /// Either the whole service is added or nothing is: all characteristics are
    /// validated before any handle is consumed.
    pub fn register_service(
        &mut self,
        service: Service,
        characteristics: &[CharacteristicDef<'_>],
    ) -> Result<ServiceHandle, Error> {
        if self.frozen {
            return Err(Error::AlreadyAdvertising);
        }
        let uuid = service.uuid.compact();
        if self.services.iter().any(|s| s.uuid.compact() == uuid) {
            return Err(Error::DuplicateServiceUuid);
        }
        if self.services.is_full() || characteristics.len() > MAX_CHARACTERISTICS {
            return Err(Error::TableFull);
        }
        if characteristics.len() > self.store.available() {
            return Err(Error::TableFull);
        }
        for (i, c) in characteristics.iter().enumerate() {
            if characteristics[..i].iter().any(|o| o.uuid.compact() == c.uuid.compact()) {
                return Err(Error::DuplicateCharacteristicUuid);
            }
        }

        let handle = ServiceHandle {
            handle: self.next_handle,
        };
        let mut next = self.next_handle;
        let mut entries: Vec<CharacteristicEntry, MAX_CHARACTERISTICS> = Vec::new();
        let mut slots: Vec<ValueSlot, MAX_CHARACTERISTICS> = Vec::new();
        for c in characteristics {
            let declaration = next.checked_add(1).ok_or(Error::TableFull)?;
            let value = declaration.checked_add(1).ok_or(Error::TableFull)?;
            next = value;
            let cccd_handle = if c.props.notifiable() {
                next = next.checked_add(1).ok_or(Error::TableFull)?;
                Some(next)
            } else {
                None
            };
            slots
                .push(ValueSlot::new(value, c.props, c.capacity, c.initial)?)
                .map_err(|_| Error::TableFull)?;
            entries
                .push(CharacteristicEntry {
                    uuid: c.uuid,
                    props: c.props,
                    declaration,
                    handle: CharacteristicHandle {
                        handle: value,
                        cccd_handle,
                        service: handle,
                    },
                })
                .map_err(|_| Error::TableFull)?;
        }
        let next_handle = next.checked_add(1).ok_or(Error::TableFull)?;

        for slot in slots {
            self.store.insert(slot)?;
        }
        self.services
            .push(ServiceEntry {
                uuid: service.uuid,
                handle,
                last_handle_in_group: next,
                characteristics: entries,
            })
            .map_err(|_| Error::TableFull)?;
        self.next_handle = next_handle;

        info!(
            "[gatt] service {:?} registered: handles {}..={}",
            service.uuid,
            handle.handle,
            next
        );
        Ok(handle)
    }

    /// Resolve a characteristic UUID within a service to its handle.
    pub fn characteristic_handle<U: Into<Uuid>>(
        &self,
        service: ServiceHandle,
        uuid: U,
    ) -> Result<CharacteristicHandle, Error> {
        let uuid = uuid.into().compact();
        self.service(service)
            .and_then(|s| s.characteristics.iter().find(|c| c.uuid.compact() == uuid))
            .map(|c| c.handle)
            .ok_or(Error::NotFound)
    }

    /// Find a characteristic by its value handle.
    pub fn find_characteristic(&self, value_handle: u16) -> Option<&CharacteristicEntry> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.handle.handle == value_handle)
    }

    pub fn service(&self, handle: ServiceHandle) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.handle == handle)
    }

    /// Services in registration order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceEntry> + '_ {
        self.services.iter()
    }

    /// UUIDs of all services in registration order.
    pub fn service_uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.services.iter().map(|s| s.uuid)
    }

    /// Value storage backing the registered characteristics. Read-only outside the crate.
    pub fn store(&self) -> &AttributeStore<M, MAX> {
        &self.store
    }

    /// Close the table to further registration.
    pub(crate) fn freeze(&mut self) {
        if !self.frozen {
            debug!("[gatt] table frozen with {} services", self.services.len());
        }
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Handles of the services every peripheral exposes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardServices {
    pub device_information: ServiceHandle,
    pub device_name: CharacteristicHandle,
    pub model_number: CharacteristicHandle,
    pub serial_number: CharacteristicHandle,
    pub battery: ServiceHandle,
    pub battery_level: CharacteristicHandle,
    pub custom: ServiceHandle,
    pub custom_value: CharacteristicHandle,
}

/// Register device information, battery and application services, in that order.
pub fn standard_services<M: RawMutex, const MAX: usize>(
    registry: &mut ServiceRegistry<M, MAX>,
    config: &PeripheralConfig,
) -> Result<StandardServices, Error> {
    let capacity = config.value_capacity;
    let device_information = registry.register_service(
        Service::new(DEVICE_INFORMATION_SERVICE_UUID16),
        &[
            CharacteristicDef::read_only(CHARACTERISTIC_DEVICE_NAME_UUID16, capacity, config.name.as_bytes()),
            CharacteristicDef::read_only(
                CHARACTERISTIC_MODEL_NUMBER_UUID16,
                capacity,
                config.model_number.as_bytes(),
            ),
            CharacteristicDef::read_only(
                CHARACTERISTIC_SERIAL_NUMBER_UUID16,
                capacity,
                config.serial_number.as_bytes(),
            ),
        ],
    )?;

    let battery = registry.register_service(
        Service::new(BATTERY_SERVICE_UUID16),
        &[CharacteristicDef::new(
            CHARACTERISTIC_BATTERY_LEVEL_UUID16,
            &[CharacteristicProp::Read, CharacteristicProp::Notify],
            1,
            &[config.battery_level],
        )],
    )?;

    let custom = registry.register_service(
        Service::new(CUSTOM_SERVICE_UUID128),
        &[CharacteristicDef::new(
            CUSTOM_VALUE_UUID128,
            &[CharacteristicProp::Read, CharacteristicProp::Write, CharacteristicProp::Notify],
            capacity,
            &[],
        )],
    )?;

    Ok(StandardServices {
        device_information,
        device_name: registry.characteristic_handle(device_information, CHARACTERISTIC_DEVICE_NAME_UUID16)?,
        model_number: registry.characteristic_handle(device_information, CHARACTERISTIC_MODEL_NUMBER_UUID16)?,
        serial_number: registry.characteristic_handle(device_information, CHARACTERISTIC_SERIAL_NUMBER_UUID16)?,
        battery,
        battery_level: registry.characteristic_handle(battery, CHARACTERISTIC_BATTERY_LEVEL_UUID16)?,
        custom,
        custom_value: registry.characteristic_handle(custom, CUSTOM_VALUE_UUID128)?,
    })
}
