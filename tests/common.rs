use std::cell::RefCell;
use std::rc::Rc;

use ble_peripheral::advertise::{AdvertisingParameters, AdvertisingPayload};
use ble_peripheral::config::PeripheralConfig;
use ble_peripheral::diagnostics::DiagnosticSink;
use ble_peripheral::peripheral::PeripheralLifecycle;
use ble_peripheral::radio::{Event, Radio};
use ble_peripheral::registry::{ServiceEntry, StandardServices};
use ble_peripheral::uuid::Uuid;
use bt_hci::param::{BdAddr, ConnHandle};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;

pub const MAX_ATTRIBUTES: usize = 8;

pub type Lifecycle = PeripheralLifecycle<NoopRawMutex, MockRadio, RecordingSink, MAX_ATTRIBUTES>;

pub const PEER: [u8; 6] = [0xff, 0x9f, 0x1a, 0x05, 0xe4, 0xff];

/// Everything the lifecycle asked the radio to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init,
    AddService(Uuid),
    WriteValue(u16, Vec<u8>),
    StartAdvertising {
        adv_data: Vec<u8>,
        scan_data: Vec<u8>,
        params: AdvertisingParameters,
    },
    StopAdvertising,
    Notify(ConnHandle, u16, Vec<u8>),
    Disconnect(ConnHandle),
    Shutdown,
}

#[derive(Default)]
pub struct MockRadio {
    pub commands: Vec<Command>,
    pub fail_init: bool,
    pub fail_advertising: bool,
    pub fail_write_value: bool,
    pub fail_notify: bool,
}

#[allow(unused)]
impl MockRadio {
    pub fn count(&self, f: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| f(c)).count()
    }

    pub fn advertising_starts(&self) -> usize {
        self.count(|c| matches!(c, Command::StartAdvertising { .. }))
    }

    pub fn notifications(&self) -> Vec<(u16, Vec<u8>)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Notify(_, handle, value) => Some((*handle, value.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Radio for MockRadio {
    type Error = ();

    fn init(&mut self) -> Result<(), ()> {
        self.commands.push(Command::Init);
        if self.fail_init {
            Err(())
        } else {
            Ok(())
        }
    }

    fn add_service(&mut self, service: &ServiceEntry) -> Result<(), ()> {
        self.commands.push(Command::AddService(service.uuid()));
        Ok(())
    }

    fn write_value(&mut self, handle: u16, value: &[u8]) -> Result<(), ()> {
        if self.fail_write_value {
            return Err(());
        }
        self.commands.push(Command::WriteValue(handle, value.to_vec()));
        Ok(())
    }

    fn start_advertising(&mut self, payload: &AdvertisingPayload, params: &AdvertisingParameters) -> Result<(), ()> {
        if self.fail_advertising {
            return Err(());
        }
        self.commands.push(Command::StartAdvertising {
            adv_data: payload.adv_data().to_vec(),
            scan_data: payload.scan_data().to_vec(),
            params: *params,
        });
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), ()> {
        self.commands.push(Command::StopAdvertising);
        Ok(())
    }

    fn notify(&mut self, conn: ConnHandle, handle: u16, value: &[u8]) -> Result<(), ()> {
        if self.fail_notify {
            return Err(());
        }
        self.commands.push(Command::Notify(conn, handle, value.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), ()> {
        self.commands.push(Command::Disconnect(conn));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ()> {
        self.commands.push(Command::Shutdown);
        Ok(())
    }
}

/// Diagnostic sink keeping every line, shareable with the test body.
#[derive(Default, Clone)]
pub struct RecordingSink {
    pub lines: Rc<RefCell<Vec<String>>>,
}

#[allow(unused)]
impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.borrow().iter().any(|l| l == line)
    }
}

impl DiagnosticSink for RecordingSink {
    fn write_line(&mut self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }
}

#[allow(unused)]
pub fn lifecycle() -> (Lifecycle, StandardServices, RecordingSink) {
    lifecycle_with(MockRadio::default())
}

#[allow(unused)]
pub fn lifecycle_with(radio: MockRadio) -> (Lifecycle, StandardServices, RecordingSink) {
    let sink = RecordingSink::default();
    let (lifecycle, handles) =
        Lifecycle::with_standard_services(PeripheralConfig::default(), radio, sink.clone()).unwrap();
    (lifecycle, handles, sink)
}

/// Lifecycle already advertising.
#[allow(unused)]
pub fn advertising() -> (Lifecycle, StandardServices, RecordingSink) {
    let (mut lifecycle, handles, sink) = lifecycle();
    lifecycle.start().unwrap();
    lifecycle.handle_event(Event::InitComplete { success: true }).unwrap();
    (lifecycle, handles, sink)
}

#[allow(unused)]
pub fn connect(handle: u16) -> Event {
    Event::CentralConnected {
        handle: ConnHandle::new(handle),
        peer: BdAddr::new(PEER),
    }
}

#[allow(unused)]
pub fn disconnect(handle: u16) -> Event {
    Event::CentralDisconnected {
        handle: ConnHandle::new(handle),
        reason: 0x13,
    }
}
