use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use uuid::Uuid;

use gatt_dispatch::{
    CharacteristicAddress, CharacteristicSubscription, DescriptorAddress, DiscoveredAttribute,
    DiscoveryState, DispatchError, Dispatcher, ErrorKind, GattTransport, Handle, OperationError,
    OperationKind, Peripheral, PeripheralEvent, PeripheralId, PeripheralSubscription,
    ServiceSubscription, TransportError, TransportEvent, WriteMode,
};

const SERVICE_A: Uuid = Uuid::from_u128(0x0000aaa0_0000_1000_8000_00805f9b34fb);
const SERVICE_B: Uuid = Uuid::from_u128(0x0000bbb0_0000_1000_8000_00805f9b34fb);
const SERVICE_X: Uuid = Uuid::from_u128(0x0000eee0_0000_1000_8000_00805f9b34fb);
const CHAR_A1: Uuid = Uuid::from_u128(0x0000aaa1_0000_1000_8000_00805f9b34fb);
const CHAR_A2: Uuid = Uuid::from_u128(0x0000aaa2_0000_1000_8000_00805f9b34fb);
const CHAR_B1: Uuid = Uuid::from_u128(0x0000bbb1_0000_1000_8000_00805f9b34fb);
const DESC_CCCD: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

const HANDLE_A: Handle = Handle::new(1);
const HANDLE_B: Handle = Handle::new(2);
const HANDLE_A1: Handle = Handle::new(10);
const HANDLE_A2: Handle = Handle::new(11);
const HANDLE_B1: Handle = Handle::new(10);
const HANDLE_D1: Handle = Handle::new(20);

const ADDRESS_A1: CharacteristicAddress = CharacteristicAddress {
    service: HANDLE_A,
    characteristic: HANDLE_A1,
};
const ADDRESS_B1: CharacteristicAddress = CharacteristicAddress {
    service: HANDLE_B,
    characteristic: HANDLE_B1,
};

#[derive(Debug, Clone, Eq, PartialEq)]
enum Request {
    DiscoverServices(Option<Vec<Uuid>>),
    DiscoverCharacteristics(Handle, Option<Vec<Uuid>>),
    DiscoverDescriptors(CharacteristicAddress),
    Read(CharacteristicAddress),
    Write(CharacteristicAddress, Vec<u8>, WriteMode),
    SetNotify(CharacteristicAddress, bool),
    ReadDescriptor(DescriptorAddress),
    WriteDescriptor(DescriptorAddress, Vec<u8>),
}

#[derive(Debug, Default)]
struct RecordingTransport {
    requests: Vec<Request>,
}

impl RecordingTransport {
    fn take(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }
}

impl GattTransport for RecordingTransport {
    fn discover_services(&mut self, uuids: Option<Vec<Uuid>>) {
        self.requests.push(Request::DiscoverServices(uuids));
    }

    fn discover_characteristics(&mut self, service: Handle, uuids: Option<Vec<Uuid>>) {
        self.requests
            .push(Request::DiscoverCharacteristics(service, uuids));
    }

    fn discover_descriptors(&mut self, characteristic: CharacteristicAddress) {
        self.requests
            .push(Request::DiscoverDescriptors(characteristic));
    }

    fn read_characteristic(&mut self, characteristic: CharacteristicAddress) {
        self.requests.push(Request::Read(characteristic));
    }

    fn write_characteristic(
        &mut self,
        characteristic: CharacteristicAddress,
        value: Vec<u8>,
        mode: WriteMode,
    ) {
        self.requests
            .push(Request::Write(characteristic, value, mode));
    }

    fn set_notify(&mut self, characteristic: CharacteristicAddress, enabled: bool) {
        self.requests
            .push(Request::SetNotify(characteristic, enabled));
    }

    fn read_descriptor(&mut self, descriptor: DescriptorAddress) {
        self.requests.push(Request::ReadDescriptor(descriptor));
    }

    fn write_descriptor(&mut self, descriptor: DescriptorAddress, value: Vec<u8>) {
        self.requests
            .push(Request::WriteDescriptor(descriptor, value));
    }
}

type Harness = (
    Dispatcher<RecordingTransport>,
    mpsc::UnboundedReceiver<PeripheralEvent>,
);

fn subscription() -> PeripheralSubscription {
    let service_a = ServiceSubscription::builder()
        .uuid(SERVICE_A)
        .name("Alpha")
        .characteristics(vec![
            CharacteristicSubscription::builder()
                .uuid(CHAR_A1)
                .name("Alpha One")
                .discover_descriptors(true)
                .build(),
            CharacteristicSubscription::builder().uuid(CHAR_A2).build(),
        ])
        .build()
        .expect("service A has distinct characteristics");
    let service_b = ServiceSubscription::builder()
        .uuid(SERVICE_B)
        .characteristics(vec![
            CharacteristicSubscription::builder().uuid(CHAR_B1).build(),
        ])
        .build()
        .expect("service B has distinct characteristics");

    PeripheralSubscription::new(vec![service_a, service_b])
        .expect("subscription has distinct services")
}

fn harness() -> Harness {
    Dispatcher::new(
        Peripheral::new(PeripheralId::new("fake"), "Sensor"),
        Arc::new(subscription()),
        RecordingTransport::default(),
    )
}

fn attributes(entries: &[(Handle, Uuid)]) -> Vec<DiscoveredAttribute> {
    entries
        .iter()
        .map(|(handle, uuid)| DiscoveredAttribute::new(*handle, *uuid))
        .collect()
}

fn drain(events: &mut mpsc::UnboundedReceiver<PeripheralEvent>) -> Vec<PeripheralEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn error_kinds(events: &[PeripheralEvent]) -> Vec<ErrorKind> {
    events
        .iter()
        .filter_map(|event| match event {
            PeripheralEvent::Error(error) => Some(error.kind()),
            PeripheralEvent::Ready { .. } => None,
        })
        .collect()
}

fn ready_count(events: &[PeripheralEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, PeripheralEvent::Ready { .. }))
        .count()
}

/// Drives the harness to the ready state.
fn discover_all(dispatcher: &mut Dispatcher<RecordingTransport>) {
    dispatcher.start_discovery();
    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(attributes(&[
        (HANDLE_A, SERVICE_A),
        (HANDLE_B, SERVICE_B),
    ]))));
    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_A,
        result: Ok(attributes(&[(HANDLE_A1, CHAR_A1), (HANDLE_A2, CHAR_A2)])),
    });
    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_B,
        result: Ok(attributes(&[(HANDLE_B1, CHAR_B1)])),
    });
    dispatcher.handle(TransportEvent::DescriptorsDiscovered {
        characteristic: ADDRESS_A1,
        result: Ok(attributes(&[(HANDLE_D1, DESC_CCCD)])),
    });
    dispatcher.transport_mut().take();
}

#[test]
fn end_to_end_discovery_signals_ready_once() {
    let (mut dispatcher, mut events) = harness();

    dispatcher.start_discovery();
    assert_eq!(
        vec![Request::DiscoverServices(Some(vec![SERVICE_A, SERVICE_B]))],
        dispatcher.transport_mut().take()
    );
    assert_eq!(DiscoveryState::AwaitingServices, dispatcher.state());

    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(attributes(&[
        (HANDLE_A, SERVICE_A),
        (HANDLE_B, SERVICE_B),
    ]))));
    assert_eq!(
        vec![
            Request::DiscoverCharacteristics(HANDLE_A, Some(vec![CHAR_A1, CHAR_A2])),
            Request::DiscoverCharacteristics(HANDLE_B, Some(vec![CHAR_B1])),
        ],
        dispatcher.transport_mut().take()
    );

    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_A,
        result: Ok(attributes(&[(HANDLE_A1, CHAR_A1), (HANDLE_A2, CHAR_A2)])),
    });
    assert_eq!(
        vec![Request::DiscoverDescriptors(ADDRESS_A1)],
        dispatcher.transport_mut().take()
    );

    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_B,
        result: Ok(attributes(&[(HANDLE_B1, CHAR_B1)])),
    });
    assert_eq!(Vec::<Request>::new(), dispatcher.transport_mut().take());
    assert_eq!(Vec::<PeripheralEvent>::new(), drain(&mut events));
    assert_matches!(dispatcher.state(), DiscoveryState::Discovering { .. });

    dispatcher.handle(TransportEvent::DescriptorsDiscovered {
        characteristic: ADDRESS_A1,
        result: Ok(attributes(&[(HANDLE_D1, DESC_CCCD)])),
    });

    assert_eq!(
        vec![PeripheralEvent::Ready {
            peripheral: "Sensor".to_string()
        }],
        drain(&mut events)
    );
    assert_eq!(DiscoveryState::Ready, dispatcher.state());

    let peripheral = dispatcher.peripheral();
    assert_eq!(2, peripheral.services().len());
    let alpha = &peripheral.services()[0];
    assert_eq!(Some("Alpha"), alpha.id().name());
    assert_eq!(Some("Alpha One"), alpha.characteristics()[0].id().name());
    assert_eq!(1, alpha.characteristics()[0].descriptors().len());
    assert_eq!(true, alpha.characteristics()[1].descriptors_discovered());
    assert_eq!(true, peripheral.discovery_completed());
}

#[test]
fn rediscovery_reports_error_without_mutating_tree() {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);

    dispatcher.handle(TransportEvent::DescriptorsDiscovered {
        characteristic: ADDRESS_A1,
        result: Ok(attributes(&[(Handle::new(21), DESC_CCCD)])),
    });
    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(attributes(&[(
        Handle::new(3),
        SERVICE_A,
    )]))));

    let drained = drain(&mut events);
    assert_eq!(
        vec![ErrorKind::Rediscovery, ErrorKind::Rediscovery],
        error_kinds(&drained)
    );
    assert_eq!(0, ready_count(&drained));
    assert_eq!(2, dispatcher.peripheral().services().len());
    assert_eq!(
        1,
        dispatcher.peripheral().services()[0].characteristics()[0]
            .descriptors()
            .len()
    );
    assert_eq!(Vec::<Request>::new(), dispatcher.transport_mut().take());
}

#[test]
fn rediscovery_is_reported_even_when_the_repeat_fails() {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);

    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_B,
        result: Err(TransportError::Disconnected),
    });

    assert_matches!(
        drain(&mut events).as_slice(),
        [PeripheralEvent::Error(DispatchError::Rediscovered { .. })]
    );
}

#[test]
fn service_discovery_failure_reports_error_and_leaves_flag_unset() {
    let (mut dispatcher, mut events) = harness();
    dispatcher.start_discovery();

    dispatcher.handle(TransportEvent::ServicesDiscovered(Err(
        TransportError::Platform {
            message: "GATT error 0x85".to_string(),
        },
    )));

    assert_matches!(
        drain(&mut events).as_slice(),
        [PeripheralEvent::Error(DispatchError::PeripheralDiscovery { .. })]
    );
    assert_eq!(false, dispatcher.peripheral().services_discovered());
    assert_eq!(DiscoveryState::AwaitingServices, dispatcher.state());
}

#[test]
fn characteristic_discovery_failure_blocks_ready() {
    let (mut dispatcher, mut events) = harness();
    dispatcher.start_discovery();
    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(attributes(&[
        (HANDLE_A, SERVICE_A),
        (HANDLE_B, SERVICE_B),
    ]))));
    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_B,
        result: Err(TransportError::Disconnected),
    });

    let drained = drain(&mut events);
    assert_eq!(vec![ErrorKind::Transport], error_kinds(&drained));
    assert_eq!(
        false,
        dispatcher.peripheral().services()[1].characteristics_discovered()
    );
    assert_matches!(dispatcher.state(), DiscoveryState::Discovering { .. });
}

#[test]
fn unrecognized_service_is_reported_and_skipped() {
    let (mut dispatcher, mut events) = harness();
    dispatcher.start_discovery();
    dispatcher.transport_mut().take();

    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(attributes(&[
        (HANDLE_A, SERVICE_A),
        (Handle::new(9), SERVICE_X),
    ]))));

    assert_matches!(
        drain(&mut events).as_slice(),
        [PeripheralEvent::Error(DispatchError::UnrecognizedService { uuid })] if *uuid == SERVICE_X
    );
    assert_eq!(1, dispatcher.peripheral().services().len());
    assert_eq!(true, dispatcher.peripheral().services_discovered());
    assert_eq!(
        vec![Request::DiscoverCharacteristics(
            HANDLE_A,
            Some(vec![CHAR_A1, CHAR_A2])
        )],
        dispatcher.transport_mut().take()
    );
}

#[test]
fn empty_service_discovery_is_an_anomaly_but_completes() {
    let (mut dispatcher, mut events) = harness();
    dispatcher.start_discovery();

    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(Vec::new())));

    let drained = drain(&mut events);
    assert_matches!(
        drained.first(),
        Some(PeripheralEvent::Error(DispatchError::MissingServices))
    );
    assert_eq!(true, dispatcher.peripheral().services_discovered());
    assert_eq!(1, ready_count(&drained));
}

#[test]
fn sibling_completions_may_arrive_in_any_order() {
    let (mut dispatcher, mut events) = harness();
    dispatcher.start_discovery();
    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(attributes(&[
        (HANDLE_A, SERVICE_A),
        (HANDLE_B, SERVICE_B),
    ]))));
    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_B,
        result: Ok(attributes(&[(HANDLE_B1, CHAR_B1)])),
    });
    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_A,
        result: Ok(attributes(&[(HANDLE_A2, CHAR_A2), (HANDLE_A1, CHAR_A1)])),
    });
    assert_eq!(0, ready_count(&drain(&mut events)));

    dispatcher.handle(TransportEvent::DescriptorsDiscovered {
        characteristic: ADDRESS_A1,
        result: Ok(Vec::new()),
    });

    let drained = drain(&mut events);
    assert_eq!(Vec::<ErrorKind>::new(), error_kinds(&drained));
    assert_eq!(1, ready_count(&drained));
    let alpha = &dispatcher.peripheral().services()[0];
    assert_eq!(CHAR_A2, alpha.characteristics()[0].id().uuid());
    assert_eq!(CHAR_A1, alpha.characteristics()[1].id().uuid());
}

#[test]
fn handles_are_scoped_to_their_parent() {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);

    // A1 and B1 share a raw handle under different services.
    dispatcher.handle(TransportEvent::CharacteristicValueUpdated {
        characteristic: ADDRESS_B1,
        result: Ok(vec![0x42]),
    });

    let services = dispatcher.peripheral().services();
    assert_eq!(Some([0x42].as_slice()), services[1].characteristics()[0].value());
    assert_eq!(None, services[0].characteristics()[0].value());
    assert_eq!(Vec::<PeripheralEvent>::new(), drain(&mut events));
}

#[test]
fn unknown_handles_report_lookup_miss_without_mutation() {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);

    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: Handle::new(99),
        result: Ok(attributes(&[(Handle::new(98), CHAR_B1)])),
    });
    dispatcher.handle(TransportEvent::CharacteristicValueUpdated {
        characteristic: CharacteristicAddress {
            service: HANDLE_B,
            characteristic: HANDLE_A2,
        },
        result: Ok(vec![0x01]),
    });
    dispatcher.handle(TransportEvent::DescriptorWritten {
        descriptor: DescriptorAddress {
            characteristic: ADDRESS_A1,
            descriptor: Handle::new(77),
        },
        result: Ok(()),
    });

    let drained = drain(&mut events);
    assert_eq!(
        vec![
            ErrorKind::LookupMiss,
            ErrorKind::LookupMiss,
            ErrorKind::LookupMiss
        ],
        error_kinds(&drained)
    );
    assert_eq!(2, dispatcher.peripheral().services().len());
    assert_eq!(1, dispatcher.peripheral().services()[1].characteristics().len());
}

#[test]
fn unrecognized_characteristic_is_reported_and_skipped() {
    let (mut dispatcher, mut events) = harness();
    dispatcher.start_discovery();
    dispatcher.handle(TransportEvent::ServicesDiscovered(Ok(attributes(&[(
        HANDLE_B, SERVICE_B,
    )]))));
    drain(&mut events);

    dispatcher.handle(TransportEvent::CharacteristicsDiscovered {
        service: HANDLE_B,
        result: Ok(attributes(&[(HANDLE_B1, CHAR_B1), (Handle::new(12), CHAR_A1)])),
    });

    let drained = drain(&mut events);
    assert_matches!(
        drained.first(),
        Some(PeripheralEvent::Error(DispatchError::UnrecognizedCharacteristic { uuid, .. })) if *uuid == CHAR_A1
    );
    assert_eq!(1, dispatcher.peripheral().services()[0].characteristics().len());
    assert_eq!(1, ready_count(&drained));
}

#[tokio::test]
async fn read_completion_is_routed_to_pending_future() -> anyhow::Result<()> {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);
    let path = dispatcher
        .peripheral()
        .characteristic_by_uuid(SERVICE_A, CHAR_A2)
        .expect("A2 was discovered");

    let pending = dispatcher.read_characteristic(path)?;
    assert_eq!(
        vec![Request::Read(CharacteristicAddress {
            service: HANDLE_A,
            characteristic: HANDLE_A2,
        })],
        dispatcher.transport_mut().take()
    );
    dispatcher.handle(TransportEvent::CharacteristicValueUpdated {
        characteristic: CharacteristicAddress {
            service: HANDLE_A,
            characteristic: HANDLE_A2,
        },
        result: Ok(vec![0x64]),
    });

    assert_eq!(vec![0x64], pending.await?);
    assert_eq!(
        Some([0x64].as_slice()),
        dispatcher.peripheral().characteristic(path).and_then(|c| c.value())
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_operation_of_same_kind_is_busy() -> anyhow::Result<()> {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);
    let path = dispatcher
        .peripheral()
        .characteristic_by_uuid(SERVICE_B, CHAR_B1)
        .expect("B1 was discovered");

    let first = dispatcher.write_characteristic(path, vec![0x01], WriteMode::WithResponse)?;
    let second = dispatcher.write_characteristic(path, vec![0x02], WriteMode::WithResponse);
    assert_matches!(
        second,
        Err(OperationError::Busy {
            operation: OperationKind::Write,
            ..
        })
    );
    let read = dispatcher.read_characteristic(path)?;

    dispatcher.handle(TransportEvent::CharacteristicWritten {
        characteristic: ADDRESS_B1,
        result: Err(TransportError::Disconnected),
    });
    dispatcher.handle(TransportEvent::CharacteristicValueUpdated {
        characteristic: ADDRESS_B1,
        result: Ok(vec![0x07]),
    });

    assert_matches!(
        first.await,
        Err(OperationError::Transport {
            operation: OperationKind::Write,
            source: TransportError::Disconnected,
        })
    );
    assert_eq!(vec![0x07], read.await?);
    Ok(())
}

#[tokio::test]
async fn notifications_flow_once_enabled() -> anyhow::Result<()> {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);
    let path = dispatcher
        .peripheral()
        .characteristic_by_uuid(SERVICE_A, CHAR_A1)
        .expect("A1 was discovered");
    let mut stream = dispatcher.notifications(path)?;

    let enabled = dispatcher.set_notify(path, true)?;
    assert_eq!(
        vec![Request::SetNotify(ADDRESS_A1, true)],
        dispatcher.transport_mut().take()
    );
    dispatcher.handle(TransportEvent::NotificationStateUpdated {
        characteristic: ADDRESS_A1,
        result: Ok(true),
    });
    assert_eq!(true, enabled.await?);

    dispatcher.handle(TransportEvent::CharacteristicValueUpdated {
        characteristic: ADDRESS_A1,
        result: Ok(vec![0x10]),
    });
    dispatcher.handle(TransportEvent::CharacteristicValueUpdated {
        characteristic: ADDRESS_A1,
        result: Ok(vec![0x11]),
    });

    assert_eq!(Some(vec![0x10]), stream.next().await);
    assert_eq!(Some(vec![0x11]), stream.next().await);
    Ok(())
}

#[tokio::test]
async fn descriptor_write_completes_through_scoped_lookup() -> anyhow::Result<()> {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);
    let path = dispatcher
        .peripheral()
        .find_descriptor(HANDLE_A, HANDLE_A1, HANDLE_D1)
        .expect("D1 was discovered");
    let address = DescriptorAddress {
        characteristic: ADDRESS_A1,
        descriptor: HANDLE_D1,
    };

    let pending = dispatcher.write_descriptor(path, vec![0x01, 0x00])?;
    assert_eq!(
        vec![Request::WriteDescriptor(address, vec![0x01, 0x00])],
        dispatcher.transport_mut().take()
    );
    dispatcher.handle(TransportEvent::DescriptorWritten {
        descriptor: address,
        result: Ok(()),
    });
    pending.await?;

    let read = dispatcher.read_descriptor(path)?;
    dispatcher.handle(TransportEvent::DescriptorValueUpdated {
        descriptor: address,
        result: Ok(vec![0x01, 0x00]),
    });
    assert_eq!(vec![0x01, 0x00], read.await?);
    assert_eq!(
        vec![Request::ReadDescriptor(address)],
        dispatcher.transport_mut().take()
    );
    Ok(())
}

#[tokio::test]
async fn dropping_the_dispatcher_abandons_pending_operations() -> anyhow::Result<()> {
    let (mut dispatcher, mut events) = harness();
    discover_all(&mut dispatcher);
    drain(&mut events);
    let path = dispatcher
        .peripheral()
        .characteristic_by_uuid(SERVICE_B, CHAR_B1)
        .expect("B1 was discovered");

    let pending = dispatcher.read_characteristic(path)?;
    drop(dispatcher);

    assert_matches!(
        pending.await,
        Err(OperationError::Abandoned {
            operation: OperationKind::Read
        })
    );
    Ok(())
}
