use std::sync::Arc;
use std::time::Duration;

use gatt_dispatch_macros::progress;
use owo_colors::OwoColorize;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use uuid::Uuid;

use super::hardware::{ConnectedDevice, SessionTransport};
use super::model::{DiscoveryReport, FoundDevice};
use crate::dispatch::{Dispatcher, PeripheralEvent, TransportEvent, WriteMode};
use crate::error::{DispatchError, InteractionError};
use crate::gatt::{CharacteristicPath, Pending, Peripheral, PeripheralId};
use crate::subscription::PeripheralSubscription;

/// Connected peripheral session that feeds transport completions into a [`Dispatcher`].
///
/// Transport events are only processed while one of the async methods is being awaited.
#[derive(Debug)]
pub struct DeviceSession {
    device: FoundDevice,
    dispatcher: Dispatcher<SessionTransport>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    peripheral_events: mpsc::UnboundedReceiver<PeripheralEvent>,
    errors: Vec<DispatchError>,
    ready: bool,
}

impl DeviceSession {
    /// Wraps a connected device with a dispatcher for the given subscription.
    #[must_use]
    pub fn new(connected: ConnectedDevice, subscription: Arc<PeripheralSubscription>) -> Self {
        let ConnectedDevice {
            device,
            transport,
            events,
        } = connected;
        let peripheral = Peripheral::new(
            PeripheralId::new(device.device_id()),
            device.display_name(),
        );
        let (dispatcher, peripheral_events) = Dispatcher::new(peripheral, subscription, transport);

        Self {
            device,
            dispatcher,
            transport_events: events,
            peripheral_events,
            errors: Vec::new(),
            ready: false,
        }
    }

    /// Returns details for the connected device.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        &self.device
    }

    /// Returns the entity tree built so far.
    #[must_use]
    pub fn peripheral(&self) -> &Peripheral {
        self.dispatcher.peripheral()
    }

    /// Returns every error reported by the dispatcher so far.
    #[must_use]
    pub fn errors(&self) -> &[DispatchError] {
        &self.errors
    }

    /// Returns whether the ready event has been observed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Snapshots the entity tree and collected errors.
    #[must_use]
    pub fn report(&self) -> DiscoveryReport {
        DiscoveryReport::new(self.device.clone(), self.peripheral(), &self.errors)
    }

    /// Starts discovery and processes transport events until the peripheral is ready.
    ///
    /// # Errors
    ///
    /// Returns an error when the timeout elapses, the token is cancelled, or the transport
    /// closes first. Dispatch errors do not end discovery; they are collected in the report.
    #[progress(
        message = "Discovering subscribed services",
        finished = format!("{} Discovery complete", "✓".green()),
    )]
    #[instrument(skip(self, cancel), level = "info", fields(peripheral = %self.peripheral().name()))]
    pub async fn discover(
        &mut self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryReport, InteractionError> {
        self.dispatcher.start_discovery();
        let result = self.process_until_ready(timeout, cancel).await;
        if let Err(error) = &result {
            let finish_message = format!("{} Discovery stopped: {error}", "✗".red());
            tracing::Span::current().pb_set_finish_message(&finish_message);
        }
        result
    }

    async fn process_until_ready(
        &mut self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryReport, InteractionError> {
        let deadline = timeout.map(|timeout| (Instant::now() + timeout, timeout));

        loop {
            self.drain_peripheral_events();
            if self.ready {
                info!(
                    error_count = self.errors.len(),
                    "discovery completed"
                );
                return Ok(self.report());
            }

            let event = tokio::select! {
                () = cancel.cancelled() => return Err(InteractionError::DiscoveryCancelled),
                timeout = deadline_elapsed(deadline) => {
                    return Err(InteractionError::DiscoveryTimedOut { timeout });
                }
                event = self.transport_events.recv() => event,
            };
            self.dispatch(event)?;
        }
    }

    /// Reads a characteristic addressed by service and characteristic UUID.
    ///
    /// # Errors
    ///
    /// Returns an error when discovery has not completed, the characteristic is not in the
    /// tree, the read is rejected or fails, or the transport closes.
    #[instrument(skip(self), level = "debug")]
    pub async fn read(&mut self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, InteractionError> {
        let path = self.characteristic_path(service, characteristic)?;
        let pending = self.dispatcher.read_characteristic(path)?;
        self.wait_for(pending).await
    }

    /// Writes a characteristic addressed by service and characteristic UUID.
    ///
    /// # Errors
    ///
    /// Returns an error when discovery has not completed, the characteristic is not in the
    /// tree, the write is rejected or fails, or the transport closes.
    #[instrument(skip(self, value), level = "debug", fields(len = value.len()))]
    pub async fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let path = self.characteristic_path(service, characteristic)?;
        let pending = self.dispatcher.write_characteristic(path, value, mode)?;
        self.wait_for(pending).await
    }

    /// Enables or disables notifications and returns the confirmed state.
    ///
    /// # Errors
    ///
    /// Returns an error when discovery has not completed, the characteristic is not in the
    /// tree, the change is rejected or fails, or the transport closes.
    #[instrument(skip(self), level = "debug")]
    pub async fn set_notify(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<bool, InteractionError> {
        let path = self.characteristic_path(service, characteristic)?;
        let pending = self.dispatcher.set_notify(path, enabled)?;
        self.wait_for(pending).await
    }

    /// Opens the notification stream of a characteristic.
    ///
    /// Values arrive while [`Self::process_events`] or another async method runs.
    ///
    /// # Errors
    ///
    /// Returns an error when discovery has not completed or the characteristic is unknown.
    pub fn notifications(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<UnboundedReceiverStream<Vec<u8>>, InteractionError> {
        let path = self.characteristic_path(service, characteristic)?;
        Ok(self.dispatcher.notifications(path)?)
    }

    /// Processes transport events until the token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport closes.
    pub async fn process_events(&mut self, cancel: &CancellationToken) -> Result<(), InteractionError> {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                event = self.transport_events.recv() => event,
            };
            self.dispatch(event)?;
            self.drain_peripheral_events();
        }
    }

    /// Releases the transport and disconnects real peripherals.
    ///
    /// # Errors
    ///
    /// Returns an error when the BLE disconnect fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn close(self) -> Result<(), InteractionError> {
        self.dispatcher.into_transport().close().await
    }

    async fn wait_for<T>(&mut self, mut pending: Pending<T>) -> Result<T, InteractionError> {
        loop {
            let event = tokio::select! {
                outcome = &mut pending => {
                    self.drain_peripheral_events();
                    return Ok(outcome?);
                }
                event = self.transport_events.recv() => event,
            };
            self.dispatch(event)?;
        }
    }

    fn dispatch(&mut self, event: Option<TransportEvent>) -> Result<(), InteractionError> {
        let Some(event) = event else {
            return Err(InteractionError::TransportClosed);
        };
        self.dispatcher.handle(event);
        Ok(())
    }

    fn drain_peripheral_events(&mut self) {
        while let Ok(event) = self.peripheral_events.try_recv() {
            match event {
                PeripheralEvent::Ready { peripheral } => {
                    debug!(%peripheral, "peripheral ready");
                    self.ready = true;
                }
                PeripheralEvent::Error(error) => self.errors.push(error),
            }
        }
    }

    fn characteristic_path(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicPath, InteractionError> {
        if !self.ready {
            return Err(InteractionError::NotReady);
        }
        self.peripheral()
            .characteristic_by_uuid(service, characteristic)
            .ok_or(InteractionError::UnknownCharacteristic {
                service,
                characteristic,
            })
    }
}

async fn deadline_elapsed(deadline: Option<(Instant, Duration)>) -> Duration {
    match deadline {
        Some((instant, timeout)) => {
            sleep_until(instant).await;
            timeout
        }
        None => std::future::pending().await,
    }
}
