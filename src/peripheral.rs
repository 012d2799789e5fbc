//! Peripheral lifecycle.
//!
//! ```text
//! Uninitialized --init ok--------------> Advertising
//! Advertising   --central connects-----> Connected
//! Connected     --central disconnects--> Advertising
//! Connected     --disconnect()---------> Disconnecting --central disconnects--> Advertising
//! any           --shutdown-------------> Uninitialized
//! ```
//!
//! A failed radio initialization ends the run; a failure reported once the
//! radio is already up is ignored like any other stray event. Events with no transition from
//! the current state are reported to the diagnostic sink and dropped.
use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::advertise::{AdvertisingParameters, AdvertisingPayload, BR_EDR_NOT_SUPPORTED, LE_GENERAL_DISCOVERABLE};
use crate::attribute::{AttributeValue, Written};
use crate::config::PeripheralConfig;
use crate::diagnostics::{format_line, DiagnosticSink};
use crate::notify::{Delivery, NotificationDispatcher};
use crate::radio::{Event, Radio};
use crate::registry::{CharacteristicDef, Service, ServiceHandle, ServiceRegistry, StandardServices, MAX_SERVICES};
use crate::uuid::Uuid;
use crate::Error;

/// Advertising flags used for the payload.
pub const ADV_FLAGS: u8 = LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED;

/// Link state of the single connection slot.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Advertising,
    Connected,
    Disconnecting,
}

/// Owner of the registry, the radio and the diagnostic sink.
///
/// All radio events go through [`PeripheralLifecycle::handle_event`], one at a
/// time. `MAX` bounds the number of characteristics.
pub struct PeripheralLifecycle<M: RawMutex, R: Radio, S: DiagnosticSink, const MAX: usize> {
    registry: ServiceRegistry<M, MAX>,
    radio: R,
    sink: S,
    dispatcher: NotificationDispatcher<MAX>,
    config: PeripheralConfig,
    state: ConnectionState,
    conn: Option<ConnHandle>,
    payload: Option<AdvertisingPayload>,
    radio_ready: bool,
    init_failed: bool,
}

impl<M: RawMutex, R: Radio, S: DiagnosticSink, const MAX: usize> PeripheralLifecycle<M, R, S, MAX> {
    pub fn new(registry: ServiceRegistry<M, MAX>, radio: R, sink: S, config: PeripheralConfig) -> Self {
        Self {
            registry,
            radio,
            sink,
            dispatcher: NotificationDispatcher::new(),
            config,
            state: ConnectionState::Uninitialized,
            conn: None,
            payload: None,
            radio_ready: false,
            init_failed: false,
        }
    }

    /// Create a lifecycle whose registry holds the standard services.
    pub fn with_standard_services(
        config: PeripheralConfig,
        radio: R,
        sink: S,
    ) -> Result<(Self, StandardServices), Error> {
        let (registry, handles) = ServiceRegistry::with_standard_services(&config)?;
        Ok((Self::new(registry, radio, sink, config), handles))
    }

    /// Register an additional service. Only possible before advertising first starts.
    pub fn register_service(
        &mut self,
        service: Service,
        characteristics: &[CharacteristicDef<'_>],
    ) -> Result<ServiceHandle, Error> {
        self.registry.register_service(service, characteristics).inspect_err(|e| {
            self.line(format_args!("Service registration failed: {}", e));
        })
    }

    /// Bring up the radio. The outcome arrives as [`Event::InitComplete`].
    pub fn start(&mut self) -> Result<(), Error> {
        if self.init_failed {
            return Err(Error::RadioInitFailure);
        }
        if self.state != ConnectionState::Uninitialized || self.radio_ready {
            return Err(self.reject("start"));
        }
        self.sink.write_line("Starting Peripheral");
        info!("[link] starting radio");
        if self.radio.init().is_err() {
            return Err(self.init_failure());
        }
        Ok(())
    }

    /// Dispatch one radio event.
    ///
    /// Failures are reported to the diagnostic sink before being returned. Only
    /// [`Error::RadioInitFailure`] ends the run.
    pub fn handle_event(&mut self, event: Event) -> Result<(), Error> {
        trace!("[link] {:?} in {:?}", event, self.state);
        match event {
            Event::InitComplete { success: true } => {
                if self.state != ConnectionState::Uninitialized || self.radio_ready {
                    self.ignore("init complete");
                    return Ok(());
                }
                self.radio_ready = true;
                self.bring_up()
            }
            Event::InitComplete { success: false } => {
                if self.state != ConnectionState::Uninitialized || self.radio_ready {
                    self.ignore("init failure");
                    return Ok(());
                }
                Err(self.init_failure())
            }
            Event::CentralConnected { handle, peer } => {
                if self.state != ConnectionState::Advertising {
                    self.ignore("connect");
                    return Ok(());
                }
                info!("[link] connected {:?} to {:?}", handle, peer);
                self.conn = Some(handle);
                self.state = ConnectionState::Connected;
                self.sink.write_line("Central connected");
                if self.dispatcher.flush(&mut self.radio, handle).is_err() {
                    self.line(format_args!("Notification flush failed"));
                }
                Ok(())
            }
            Event::CentralDisconnected { handle, reason } => {
                let linked = matches!(self.state, ConnectionState::Connected | ConnectionState::Disconnecting);
                if !linked || self.conn != Some(handle) {
                    self.ignore("disconnect");
                    return Ok(());
                }
                info!("[link] disconnected {:?} reason {:#x}", handle, reason);
                self.conn = None;
                self.sink.write_line("Central disconnected");
                self.advertise()
            }
            Event::WriteRequest { handle, data } => self.remote_write(handle, &data),
            Event::ShutdownRequested => {
                self.shutdown();
                Ok(())
            }
        }
    }

    /// Start advertising the frozen payload.
    ///
    /// Advertising starts by itself once the radio is up and again after every
    /// disconnect, so this is a no-op while advertising and an
    /// [`Error::InvalidStateTransition`] otherwise.
    pub fn start_advertising(&mut self) -> Result<(), Error> {
        match self.state {
            ConnectionState::Advertising => {
                debug!("[adv] already advertising");
                Ok(())
            }
            _ => Err(self.reject("start advertising")),
        }
    }

    /// Disconnect the connected central. Advertising resumes once the link is gone.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        let conn = match (self.state, self.conn) {
            (ConnectionState::Connected, Some(conn)) => conn,
            _ => return Err(self.reject("disconnect")),
        };
        if self.radio.disconnect(conn).is_err() {
            self.line(format_args!("Disconnect request failed"));
            return Err(Error::Radio);
        }
        self.state = ConnectionState::Disconnecting;
        Ok(())
    }

    /// Store a new characteristic value.
    ///
    /// Once the radio is up the value is mirrored to it first; if the radio
    /// refuses it the stored value is left as it was. Notifiable characteristics
    /// then notify the central, or queue while none is connected. A failed
    /// notification is reported to the diagnostic sink and does not undo the write.
    pub fn write(&mut self, handle: u16, value: &[u8]) -> Result<Written, Error> {
        if let Err(e) = self.registry.store().capacity(handle).and_then(|capacity| {
            if value.len() > capacity {
                Err(Error::CapacityExceeded)
            } else {
                Ok(())
            }
        }) {
            self.line(format_args!("Write to handle {} failed: {}", handle, e));
            return Err(e);
        }
        if self.radio_ready && self.radio.write_value(handle, value).is_err() {
            self.line(format_args!("Radio update of handle {} failed", handle));
            return Err(Error::Radio);
        }
        let written = self.registry.store().write(handle, value)?;
        if written.notify {
            let _ = self.notify(handle, value);
        }
        Ok(written)
    }

    pub fn read(&self, handle: u16) -> Result<AttributeValue, Error> {
        self.registry.store().read(handle)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handle of the connected central.
    pub fn connection(&self) -> Option<ConnHandle> {
        self.conn
    }

    pub fn registry(&self) -> &ServiceRegistry<M, MAX> {
        &self.registry
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    /// Payload frozen at the first advertising start.
    pub fn payload(&self) -> Option<&AdvertisingPayload> {
        self.payload.as_ref()
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher<MAX> {
        &self.dispatcher
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn bring_up(&mut self) -> Result<(), Error> {
        self.sink.write_line("Describing Peripheral...");
        if let Err(e) = self.describe() {
            self.line(format_args!("Describing Peripheral failed: {}", e));
            return Err(e);
        }
        self.advertise()?;
        self.sink.write_line("done");
        Ok(())
    }

    /// Hand services and values to the radio and freeze table and payload.
    fn describe(&mut self) -> Result<(), Error> {
        if self.payload.is_none() {
            let uuids: Vec<Uuid, MAX_SERVICES> = self.registry.service_uuids().collect();
            self.payload = Some(AdvertisingPayload::build(ADV_FLAGS, self.config.name, &uuids)?);
        }
        for service in self.registry.services() {
            self.radio.add_service(service).map_err(|_| Error::Radio)?;
        }
        let mut mirrored = Ok(());
        self.registry.store().for_each(|handle, value| {
            if mirrored.is_ok() {
                mirrored = self.radio.write_value(handle, value).map_err(|_| Error::Radio);
            }
        });
        mirrored?;
        self.registry.freeze();
        Ok(())
    }

    fn advertise(&mut self) -> Result<(), Error> {
        let params = AdvertisingParameters::from(&self.config);
        let started = match &self.payload {
            Some(payload) => self.radio.start_advertising(payload, &params).is_ok(),
            None => false,
        };
        if !started {
            self.line(format_args!("Advertising start failed"));
            self.state = ConnectionState::Uninitialized;
            return Err(Error::Radio);
        }
        debug!("[adv] advertising every {} ms", params.interval.as_millis());
        self.state = ConnectionState::Advertising;
        Ok(())
    }

    fn remote_write(&mut self, handle: u16, data: &[u8]) -> Result<(), Error> {
        if self.state != ConnectionState::Connected {
            return Err(self.reject("write request"));
        }
        let result = self.registry.store().props(handle).and_then(|props| {
            if props.writable() {
                self.registry.store().write(handle, data)
            } else {
                Err(Error::WriteNotPermitted)
            }
        });
        match result {
            Ok(written) => {
                debug!("[gatt] central wrote {} bytes to handle {}", data.len(), handle);
                if written.notify {
                    self.notify(handle, data)?;
                }
                Ok(())
            }
            Err(e) => {
                self.line(format_args!("Write request to handle {} rejected: {}", handle, e));
                Err(e)
            }
        }
    }

    fn notify(&mut self, handle: u16, value: &[u8]) -> Result<Delivery, Error> {
        let conn = match self.state {
            ConnectionState::Connected => self.conn,
            _ => None,
        };
        self.dispatcher.notify(&mut self.radio, conn, handle, value).inspect_err(|e| {
            self.line(format_args!("Notification on handle {} failed: {}", handle, e));
        })
    }

    fn shutdown(&mut self) {
        info!("[link] shutdown from {:?}", self.state);
        if self.state == ConnectionState::Advertising && self.radio.stop_advertising().is_err() {
            self.line(format_args!("Advertising stop failed"));
        }
        if (self.radio_ready || self.state != ConnectionState::Uninitialized) && self.radio.shutdown().is_err() {
            self.line(format_args!("Radio shutdown failed"));
        }
        self.state = ConnectionState::Uninitialized;
        self.conn = None;
        self.radio_ready = false;
        self.dispatcher.clear();
        self.sink.write_line("Peripheral shut down");
    }

    fn init_failure(&mut self) -> Error {
        error!("[link] radio initialization failed");
        self.init_failed = true;
        self.sink.write_line("Radio initialization failed");
        Error::RadioInitFailure
    }

    fn ignore(&mut self, what: &str) {
        warn!("[link] ignoring {} in {:?}", what, self.state);
        let state = self.state;
        self.line(format_args!("Ignored {} while {:?}", what, state));
    }

    fn reject(&mut self, what: &str) -> Error {
        let state = self.state;
        self.line(format_args!("Cannot {} while {:?}", what, state));
        Error::InvalidStateTransition
    }

    fn line(&mut self, args: core::fmt::Arguments<'_>) {
        self.sink.write_line(&format_line(args));
    }
}
