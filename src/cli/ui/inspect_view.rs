use std::fmt::{self, Display, Formatter};

use crate::dispatch::DiscoveryState;
use crate::hw::{DiscoveryReport, FoundDevice};
use crate::identifier::Identifier;
use crate::utils::format_rssi;

use super::painter::Painter;
use super::table::Table;

/// Renders a discovery report as device, tree, and error tables.
pub(crate) struct DiscoveryReportView<'a> {
    report: &'a DiscoveryReport,
    painter: &'a Painter,
}

impl<'a> DiscoveryReportView<'a> {
    pub(crate) fn new(report: &'a DiscoveryReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }

    fn device_table(&self, device: &FoundDevice) -> Table {
        Table::key_value(
            self.painter,
            vec![
                ("adapter", self.painter.value(device.adapter_name())),
                ("device_id", self.painter.value(device.device_id())),
                (
                    "name",
                    self.painter.value(device.local_name().unwrap_or("<unknown>")),
                ),
                ("rssi", self.painter.value(format_rssi(device.rssi()))),
                ("discovery", self.discovery_state()),
            ],
        )
    }

    fn discovery_state(&self) -> String {
        let state = self.report.discovery();
        match state {
            DiscoveryState::Ready => self.painter.success(state.to_string()),
            DiscoveryState::AwaitingServices | DiscoveryState::Discovering { .. } => {
                self.painter.warning(state.to_string())
            }
        }
    }

    fn entity_label(&self, uuid: uuid::Uuid, name: Option<&str>) -> String {
        let label = Identifier::new(uuid, name.map(str::to_string)).to_string();
        if name.is_some() {
            self.painter.value(label)
        } else {
            self.painter.muted(label)
        }
    }

    fn tree_table(&self) -> Table {
        let mut rows = Vec::new();
        for service in self.report.services() {
            rows.push((
                0,
                vec![
                    self.painter.muted(service.handle().to_string()),
                    "service".to_string(),
                    self.entity_label(service.uuid(), service.name()),
                ],
            ));
            for characteristic in service.characteristics() {
                let mut label = self.entity_label(characteristic.uuid(), characteristic.name());
                if characteristic.notifying() {
                    label = format!("{label} {}", self.painter.success("[notifying]"));
                }
                rows.push((
                    1,
                    vec![
                        self.painter.muted(characteristic.handle().to_string()),
                        "characteristic".to_string(),
                        label,
                    ],
                ));
                for descriptor in characteristic.descriptors() {
                    rows.push((
                        2,
                        vec![
                            self.painter.muted(descriptor.handle().to_string()),
                            "descriptor".to_string(),
                            self.entity_label(descriptor.uuid(), None),
                        ],
                    ));
                }
            }
        }
        Table::tree(["handle", "level", "entity"], 1, rows).align_right(0)
    }

    fn errors_table(&self) -> Table {
        let rows = self
            .report
            .errors()
            .iter()
            .map(|error| {
                vec![
                    self.painter.error_kind(error.kind()),
                    error.message().to_string(),
                ]
            })
            .collect();
        Table::grid(["kind", "message"], rows)
    }
}

impl Display for DiscoveryReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.painter.heading("Connected device:"))?;
        write!(f, "\n{}", self.device_table(self.report.device()))?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Entity tree:"))?;
        let tree = self.tree_table();
        if tree.is_empty() {
            write!(f, "\n{}", self.painter.warning("<no subscribed services>"))?;
        } else {
            write!(f, "\n{tree}")?;
        }
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Reported errors:"))?;
        let errors = self.errors_table();
        if errors.is_empty() {
            write!(f, "\n{}", self.painter.success("none"))
        } else {
            write!(f, "\n{errors}")
        }
    }
}

#[cfg(test)]
mod tests {
    use btleplug::api::bleuuid::uuid_from_u16;
    use insta::assert_snapshot;

    use crate::dispatch::Handle;
    use crate::error::DispatchError;
    use crate::gatt::{DefaultEntityFactory, EntityFactory, Peripheral, PeripheralId};

    use super::*;

    fn device() -> FoundDevice {
        FoundDevice::new(
            "fake".to_string(),
            "FA:KE:00:00:00:01".to_string(),
            Some("Sensor".to_string()),
            Some(-52),
        )
    }

    /// Battery service with a named level characteristic (one descriptor) and an unnamed one.
    fn battery_peripheral() -> Peripheral {
        let factory = DefaultEntityFactory;
        let mut peripheral = Peripheral::new(PeripheralId::new("fake"), "Sensor");
        let battery = Identifier::new(uuid_from_u16(0x180f), Some("Battery".to_string()));
        let service = factory.make_service(Handle::new(1), battery, peripheral.id());
        let service = peripheral.push_service(service);

        let node = peripheral.service_mut(service).expect("service was just pushed");
        node.push_characteristic(factory.make_characteristic(
            Handle::new(2),
            Identifier::new(uuid_from_u16(0x2a19), Some("Level".to_string())),
            service,
        ));
        node.push_characteristic(factory.make_characteristic(
            Handle::new(4),
            Identifier::unnamed(uuid_from_u16(0x2a1a)),
            service,
        ));
        node.set_characteristics_discovered();

        let level = peripheral
            .find_characteristic(Handle::new(1), Handle::new(2))
            .expect("level was just pushed");
        let node = peripheral.characteristic_mut(level).expect("level path resolves");
        node.push_descriptor(factory.make_descriptor(
            Handle::new(3),
            Identifier::unnamed(uuid_from_u16(0x2902)),
            level,
        ));
        node.set_descriptors_discovered();

        let unnamed = peripheral
            .find_characteristic(Handle::new(1), Handle::new(4))
            .expect("unnamed characteristic was just pushed");
        peripheral
            .characteristic_mut(unnamed)
            .expect("unnamed path resolves")
            .set_descriptors_discovered();
        peripheral.set_services_discovered();
        peripheral
    }

    #[test]
    fn discovered_tree_renders_every_level() {
        let errors = [DispatchError::UnrecognizedService {
            uuid: uuid_from_u16(0x1812),
        }];
        let report = DiscoveryReport::new(device(), &battery_peripheral(), &errors);
        let painter = Painter::new(false);

        assert_snapshot!(
            "discovery_report_ready",
            DiscoveryReportView::new(&report, &painter).to_string()
        );
    }

    #[test]
    fn empty_tree_and_errors_are_called_out() {
        let peripheral = Peripheral::new(PeripheralId::new("fake"), "Sensor");
        let report = DiscoveryReport::new(device(), &peripheral, &[]);
        let painter = Painter::new(false);

        assert_snapshot!(
            "discovery_report_awaiting_services",
            DiscoveryReportView::new(&report, &painter).to_string()
        );
    }
}
