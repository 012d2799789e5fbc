use ble_peripheral::advertise::AdvertisingParameters;
use ble_peripheral::config::PeripheralConfig;
use ble_peripheral::peripheral::ConnectionState;
use ble_peripheral::radio::Event;
use ble_peripheral::registry::{CharacteristicDef, Service};
use ble_peripheral::Error;
use bt_hci::param::ConnHandle;
use embassy_time::Duration;

mod common;

use common::{advertising, connect, disconnect, lifecycle, lifecycle_with, Command, Lifecycle, MockRadio};

#[test]
fn bring_up_describes_then_advertises() {
    let _ = env_logger::try_init();
    let (lifecycle, handles, sink) = advertising();

    assert_eq!(lifecycle.state(), ConnectionState::Advertising);
    assert_eq!(
        sink.lines(),
        vec!["Starting Peripheral", "Describing Peripheral...", "done"]
    );

    let commands = &lifecycle.radio().commands;
    assert_eq!(commands[0], Command::Init);
    assert_eq!(commands[1], Command::AddService(handles_uuid(0x180a)));
    assert_eq!(commands[2], Command::AddService(handles_uuid(0x180f)));
    assert!(commands.contains(&Command::WriteValue(handles.device_name.handle(), b"MyDevice".to_vec())));
    assert!(commands.contains(&Command::WriteValue(handles.model_number.handle(), b"1AB2".to_vec())));
    assert!(commands.contains(&Command::WriteValue(handles.serial_number.handle(), b"1234".to_vec())));
    assert!(commands.contains(&Command::WriteValue(handles.battery_level.handle(), vec![100])));

    // Every value is mirrored before the radio becomes discoverable.
    let last = commands.last().unwrap();
    match last {
        Command::StartAdvertising {
            adv_data,
            scan_data,
            params,
        } => {
            assert!(adv_data.len() <= 31);
            assert_eq!(&adv_data[..3], &[0x02, 0x01, 0x06]);
            assert_eq!(&adv_data[3..13], b"\x09\x09MyDevice");
            assert_eq!(&adv_data[13..], &[0x05, 0x03, 0x0a, 0x18, 0x0f, 0x18]);
            assert_eq!(scan_data.len(), 18);
            assert_eq!(
                *params,
                AdvertisingParameters {
                    interval: Duration::from_millis(1000),
                    connectable: true,
                }
            );
        }
        other => panic!("expected advertising start, got {:?}", other),
    }
    assert_eq!(lifecycle.radio().advertising_starts(), 1);
    assert!(lifecycle.registry().is_frozen());
}

fn handles_uuid(short: u16) -> ble_peripheral::uuid::Uuid {
    ble_peripheral::uuid::Uuid::new_short(short)
}

#[test]
fn reconnect_cycle_readvertises() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, sink) = advertising();

    lifecycle.handle_event(connect(1)).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Connected);
    assert_eq!(lifecycle.connection(), Some(ConnHandle::new(1)));

    lifecycle.handle_event(disconnect(1)).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Advertising);
    assert_eq!(lifecycle.connection(), None);
    assert_eq!(lifecycle.radio().advertising_starts(), 2);
    assert!(sink.contains("Central disconnected"));

    // and again
    lifecycle.handle_event(connect(2)).unwrap();
    lifecycle.handle_event(disconnect(2)).unwrap();
    assert_eq!(lifecycle.radio().advertising_starts(), 3);
}

#[test]
fn battery_notifies_only_while_connected() {
    let _ = env_logger::try_init();
    let (mut lifecycle, handles, _) = advertising();
    let battery = handles.battery_level.handle();

    lifecycle.write(battery, &[57]).unwrap();
    assert!(lifecycle.radio().notifications().is_empty());
    assert_eq!(&lifecycle.read(battery).unwrap()[..], &[57]);
    assert!(lifecycle
        .radio()
        .commands
        .contains(&Command::WriteValue(battery, vec![57])));

    let (mut lifecycle, handles, _) = advertising();
    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.write(battery, &[57]).unwrap();
    assert_eq!(lifecycle.radio().notifications(), vec![(handles.battery_level.handle(), vec![57])]);
    assert_eq!(&lifecycle.read(battery).unwrap()[..], &[57]);
}

#[test]
fn held_notifications_flush_on_connect() {
    let _ = env_logger::try_init();
    let (mut lifecycle, handles, _) = advertising();
    let battery = handles.battery_level.handle();

    lifecycle.write(battery, &[90]).unwrap();
    lifecycle.write(battery, &[57]).unwrap();
    assert_eq!(lifecycle.dispatcher().len(), 1);

    lifecycle.handle_event(connect(1)).unwrap();
    assert_eq!(lifecycle.radio().notifications(), vec![(battery, vec![57])]);
    assert!(lifecycle.dispatcher().is_empty());
}

#[test]
fn start_advertising_is_idempotent() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, _) = advertising();
    lifecycle.start_advertising().unwrap();
    lifecycle.start_advertising().unwrap();
    assert_eq!(lifecycle.radio().advertising_starts(), 1);

    lifecycle.handle_event(connect(1)).unwrap();
    assert_eq!(lifecycle.start_advertising(), Err(Error::InvalidStateTransition));
    assert_eq!(lifecycle.radio().advertising_starts(), 1);
}

#[test]
fn start_advertising_before_init_is_rejected() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, sink) = lifecycle();
    assert_eq!(lifecycle.start_advertising(), Err(Error::InvalidStateTransition));
    assert_eq!(lifecycle.state(), ConnectionState::Uninitialized);
    assert!(sink.contains("Cannot start advertising while Uninitialized"));
}

#[test]
fn stray_disconnect_is_ignored() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, sink) = advertising();
    lifecycle.handle_event(disconnect(1)).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Advertising);
    assert_eq!(lifecycle.radio().advertising_starts(), 1);
    assert!(sink.contains("Ignored disconnect while Advertising"));

    // Disconnect of a link that is not ours.
    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.handle_event(disconnect(7)).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Connected);
}

#[test]
fn second_central_is_ignored() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, sink) = advertising();
    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.handle_event(connect(2)).unwrap();
    assert_eq!(lifecycle.connection(), Some(ConnHandle::new(1)));
    assert!(sink.contains("Ignored connect while Connected"));
}

#[test]
fn local_disconnect_goes_through_disconnecting() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, _) = advertising();
    assert_eq!(lifecycle.disconnect(), Err(Error::InvalidStateTransition));

    lifecycle.handle_event(connect(3)).unwrap();
    lifecycle.disconnect().unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Disconnecting);
    assert_eq!(
        lifecycle.radio().commands.last(),
        Some(&Command::Disconnect(ConnHandle::new(3)))
    );

    lifecycle.handle_event(disconnect(3)).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Advertising);
    assert_eq!(lifecycle.radio().advertising_starts(), 2);
}

#[test]
fn shutdown_from_any_state() {
    let _ = env_logger::try_init();
    let (mut lifecycle, handles, sink) = advertising();
    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.handle_event(Event::ShutdownRequested).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Uninitialized);
    assert_eq!(lifecycle.connection(), None);
    assert_eq!(lifecycle.radio().commands.last(), Some(&Command::Shutdown));
    assert!(sink.contains("Peripheral shut down"));

    // Values survive and the peripheral comes back with the frozen table.
    lifecycle.start().unwrap();
    lifecycle.handle_event(Event::InitComplete { success: true }).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Advertising);
    assert_eq!(lifecycle.radio().advertising_starts(), 2);
    assert_eq!(&lifecycle.read(handles.device_name.handle()).unwrap()[..], b"MyDevice");

    // Shutdown while already down is harmless.
    let (mut idle, _, _) = common::lifecycle();
    idle.handle_event(Event::ShutdownRequested).unwrap();
    assert_eq!(idle.state(), ConnectionState::Uninitialized);
    assert!(!idle.radio().commands.contains(&Command::Shutdown));
}

#[test]
fn registration_closes_once_advertising() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, _) = lifecycle();
    lifecycle
        .register_service(
            Service::new(0x181cu16),
            &[CharacteristicDef::read_only(0x2a8au16, 8, b"Ada")],
        )
        .unwrap();
    lifecycle.start().unwrap();
    lifecycle.handle_event(Event::InitComplete { success: true }).unwrap();
    assert_eq!(
        lifecycle.radio().count(|c| matches!(c, Command::AddService(_))),
        4
    );

    assert_eq!(
        lifecycle.register_service(Service::new(0x181du16), &[]),
        Err(Error::AlreadyAdvertising)
    );
}

#[test]
fn remote_write_requests() {
    let _ = env_logger::try_init();
    let (mut lifecycle, handles, sink) = advertising();
    let custom = handles.custom_value.handle();

    let request = |handle: u16, data: &[u8]| Event::WriteRequest {
        handle,
        data: heapless::Vec::from_slice(data).unwrap(),
    };

    assert_eq!(
        lifecycle.handle_event(request(custom, b"early")),
        Err(Error::InvalidStateTransition)
    );

    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.handle_event(request(custom, b"hello")).unwrap();
    assert_eq!(&lifecycle.read(custom).unwrap()[..], b"hello");
    assert_eq!(lifecycle.radio().notifications(), vec![(custom, b"hello".to_vec())]);

    let name = handles.device_name.handle();
    assert_eq!(
        lifecycle.handle_event(request(name, b"Mallory")),
        Err(Error::WriteNotPermitted)
    );
    assert_eq!(&lifecycle.read(name).unwrap()[..], b"MyDevice");
    assert!(sink
        .lines()
        .iter()
        .any(|l| l.starts_with("Write request to handle 3 rejected")));

    assert_eq!(lifecycle.handle_event(request(99, b"x")), Err(Error::UnknownHandle));
    assert_eq!(lifecycle.state(), ConnectionState::Connected);
}

#[test]
fn capacity_boundary_through_lifecycle() {
    let _ = env_logger::try_init();
    let (mut lifecycle, handles, _) = advertising();
    let model = handles.model_number.handle();
    assert_eq!(lifecycle.write(model, &[b'x'; 21]), Err(Error::CapacityExceeded));
    assert_eq!(&lifecycle.read(model).unwrap()[..], b"1AB2");
    lifecycle.write(model, &[b'x'; 20]).unwrap();
    assert_eq!(lifecycle.read(model).unwrap().len(), 20);
    assert_eq!(lifecycle.write(99, b"x"), Err(Error::UnknownHandle));
}

#[test]
fn init_failure_is_terminal() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, sink) = lifecycle_with(MockRadio {
        fail_init: true,
        ..Default::default()
    });
    assert_eq!(lifecycle.start(), Err(Error::RadioInitFailure));
    assert!(sink.contains("Radio initialization failed"));
    assert_eq!(lifecycle.start(), Err(Error::RadioInitFailure));
    assert_eq!(lifecycle.radio().count(|c| *c == Command::Init), 1);

    let (mut lifecycle, _, _) = common::lifecycle();
    lifecycle.start().unwrap();
    assert_eq!(
        lifecycle.handle_event(Event::InitComplete { success: false }),
        Err(Error::RadioInitFailure)
    );
    assert_eq!(lifecycle.state(), ConnectionState::Uninitialized);
    assert_eq!(lifecycle.radio().advertising_starts(), 0);
    assert_eq!(lifecycle.start(), Err(Error::RadioInitFailure));
}

#[test]
fn failed_readvertise_drops_to_uninitialized() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, sink) = advertising();
    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.radio_mut().fail_advertising = true;
    assert_eq!(lifecycle.handle_event(disconnect(1)), Err(Error::Radio));
    assert_eq!(lifecycle.state(), ConnectionState::Uninitialized);
    assert!(sink.contains("Advertising start failed"));
}

#[test]
fn late_init_failure_is_ignored() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, sink) = advertising();
    lifecycle.handle_event(connect(1)).unwrap();

    lifecycle.handle_event(Event::InitComplete { success: false }).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Connected);
    assert!(sink.contains("Ignored init failure while Connected"));
    assert!(!sink.contains("Radio initialization failed"));

    // Still fully operational afterwards.
    lifecycle.handle_event(disconnect(1)).unwrap();
    assert_eq!(lifecycle.state(), ConnectionState::Advertising);
    lifecycle.handle_event(Event::ShutdownRequested).unwrap();
    lifecycle.start().unwrap();
}

#[test]
fn refused_radio_update_keeps_previous_value() {
    let _ = env_logger::try_init();
    let (mut lifecycle, handles, sink) = advertising();
    let battery = handles.battery_level.handle();
    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.radio_mut().fail_write_value = true;

    assert_eq!(lifecycle.write(battery, &[57]), Err(Error::Radio));
    assert_eq!(&lifecycle.read(battery).unwrap()[..], &[100]);
    assert!(lifecycle.radio().notifications().is_empty());
    assert!(sink.contains("Radio update of handle 10 failed"));

    lifecycle.radio_mut().fail_write_value = false;
    lifecycle.write(battery, &[57]).unwrap();
    assert_eq!(lifecycle.radio().notifications(), vec![(battery, vec![57])]);
}

#[test]
fn failed_notification_keeps_the_write() {
    let _ = env_logger::try_init();
    let (mut lifecycle, handles, sink) = advertising();
    let battery = handles.battery_level.handle();
    lifecycle.handle_event(connect(1)).unwrap();
    lifecycle.radio_mut().fail_notify = true;

    assert!(lifecycle.write(battery, &[57]).unwrap().notify);
    assert_eq!(&lifecycle.read(battery).unwrap()[..], &[57]);
    assert!(lifecycle
        .radio()
        .commands
        .contains(&Command::WriteValue(battery, vec![57])));
    assert!(sink.contains("Notification on handle 10 failed: radio command failed"));
}

#[test]
fn oversized_payload_fails_before_touching_the_radio() {
    let _ = env_logger::try_init();
    // A 20 byte name leaves room for two 16-bit service uuids only.
    let config = PeripheralConfig {
        name: "Peripheral-012345678",
        ..Default::default()
    };
    let sink = common::RecordingSink::default();
    let (mut lifecycle, _) = Lifecycle::with_standard_services(config, MockRadio::default(), sink.clone()).unwrap();
    lifecycle
        .register_service(
            Service::new(0x181cu16),
            &[CharacteristicDef::read_only(0x2a8au16, 8, b"Ada")],
        )
        .unwrap();
    lifecycle.start().unwrap();
    assert_eq!(
        lifecycle.handle_event(Event::InitComplete { success: true }),
        Err(Error::PayloadTooLarge)
    );
    assert_eq!(lifecycle.radio().commands, vec![Command::Init]);
    assert_eq!(lifecycle.state(), ConnectionState::Uninitialized);
    assert!(sink
        .lines()
        .iter()
        .any(|l| l.starts_with("Describing Peripheral failed")));
    assert!(!lifecycle.registry().is_frozen());
}

#[test]
fn shutdown_while_advertising_stops_advertising_first() {
    let _ = env_logger::try_init();
    let (mut lifecycle, _, _) = advertising();
    lifecycle.handle_event(Event::ShutdownRequested).unwrap();
    let commands = &lifecycle.radio().commands;
    assert_eq!(
        &commands[commands.len() - 2..],
        &[Command::StopAdvertising, Command::Shutdown]
    );
}
