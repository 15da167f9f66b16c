//! The engine session: discovery, connections, and characteristic I/O.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::{Bus, Signal};
use crate::characteristic::{discover_characteristics, Characteristic};
use crate::clock::{Clock, SystemClock};
use crate::connection::{establish, ConnectionState, PollPolicy};
use crate::convention::Naming;
use crate::device::{Device, DeviceRegistry};
use crate::error::ErrorKind;
use crate::filter::ServiceFilter;
use crate::tree::ObjectTree;
use crate::value::Value;
use crate::{Error, Result};

/// Timing of the scan loop: pump the bus for one slice, run discovery, then
/// idle before the next iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCadence {
    /// How long each iteration pumps the message loop.
    pub pump_slice: Duration,
    /// Sleep between iterations.
    pub idle: Duration,
}

impl Default for ScanCadence {
    fn default() -> Self {
        ScanCadence {
            pump_slice: Duration::from_secs(1),
            idle: Duration::from_millis(500),
        }
    }
}

/// Callback invoked with `(characteristic path, value)` for each delivered
/// notification.
pub type NotificationHandler = Box<dyn FnMut(&str, &[u8])>;

/// One engine instance bound to one bus session and one adapter.
///
/// The session owns the device registry, the active service filter, and the
/// notification subscription set. All operations are blocking round trips on
/// the caller's thread; the only scheduling is time-based polling through the
/// injected [`Clock`].
pub struct Session<B: Bus> {
    bus: B,
    naming: Naming,
    adapter_path: String,
    registry: DeviceRegistry,
    filter: ServiceFilter,
    subscriptions: HashSet<String>,
    handler: Option<NotificationHandler>,
    policy: PollPolicy,
    cadence: ScanCadence,
    clock: Box<dyn Clock>,
}

impl<B: Bus> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("naming", &self.naming)
            .field("adapter_path", &self.adapter_path)
            .field("filter", &self.filter)
            .field("subscriptions", &self.subscriptions)
            .field("policy", &self.policy)
            .field("cadence", &self.cadence)
            .finish_non_exhaustive()
    }
}

impl<B: Bus> Session<B> {
    /// Opens a session with the default (BlueZ) naming scheme.
    pub fn new(bus: B) -> Result<Self> {
        Session::with_naming(bus, Naming::default())
    }

    /// Opens a session against a remote service described by `naming`.
    ///
    /// Fails with [`ErrorKind::BusUnavailable`] if the bus session cannot be
    /// established and [`ErrorKind::AdapterNotFound`] if no object carries
    /// the adapter interface. Neither is retried.
    pub fn with_naming(mut bus: B, naming: Naming) -> Result<Self> {
        if !bus.connect() {
            return Err(ErrorKind::BusUnavailable.into());
        }
        let adapter_path = find_adapter(&mut bus, &naming).ok_or(ErrorKind::AdapterNotFound)?;
        let rule = format!("type='signal',sender='{}'", naming.service);
        if !bus.add_signal_match(&rule) {
            warn!(rule = rule.as_str(), "signal match not installed");
        }
        info!(adapter = adapter_path.as_str(), "session initialized");
        Ok(Session {
            bus,
            naming,
            adapter_path,
            registry: DeviceRegistry::new(),
            filter: ServiceFilter::match_all(),
            subscriptions: HashSet::new(),
            handler: None,
            policy: PollPolicy::default(),
            cadence: ScanCadence::default(),
            clock: Box::new(SystemClock),
        })
    }

    /// Path of the adapter this session operates on.
    pub fn adapter_path(&self) -> &str {
        &self.adapter_path
    }

    /// Replaces the connect confirmation budget.
    pub fn set_poll_policy(&mut self, policy: PollPolicy) {
        self.policy = policy;
    }

    /// Replaces the scan loop timing.
    pub fn set_scan_cadence(&mut self, cadence: ScanCadence) {
        self.cadence = cadence;
    }

    /// Replaces the time source. Tests substitute a manual clock here.
    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    /// Asks the adapter to start scanning for advertisements.
    pub fn start_discovery(&mut self) -> Result<()> {
        self.adapter_action("StartDiscovery")
    }

    /// Asks the adapter to stop scanning.
    pub fn stop_discovery(&mut self) -> Result<()> {
        self.adapter_action("StopDiscovery")
    }

    fn adapter_action(&mut self, method: &str) -> Result<()> {
        match self.bus.call(
            &self.naming.service,
            &self.adapter_path,
            &self.naming.adapter_interface,
            method,
            &[],
        ) {
            Some(_) => Ok(()),
            None => Err(Error::new(
                ErrorKind::ActionRejected,
                None,
                format!("{method} rejected by {}", self.adapter_path),
            )),
        }
    }

    /// Performs one discovery pass: a single managed-objects round trip,
    /// decoded and folded into the registry. Returns the newly seen device
    /// paths; a rejected query returns nothing.
    pub fn discover_once(&mut self) -> Vec<String> {
        let Some(tree) = self.managed_objects() else {
            return Vec::new();
        };
        self.registry.discover(&tree, &self.adapter_path, &self.naming)
    }

    /// Scans for `duration`: alternately pumps the message loop for one
    /// cadence slice, dispatches any delivered notifications, and runs a
    /// discovery pass, idling between iterations. Returns every device path
    /// first seen during the scan.
    pub fn scan_for(&mut self, duration: Duration) -> Vec<String> {
        let deadline = self.clock.now() + duration;
        let mut found = Vec::new();
        while self.clock.now() < deadline {
            let signals = self.bus.pump_once(self.cadence.pump_slice);
            self.dispatch(signals);
            found.extend(self.discover_once());
            self.clock.sleep(self.cadence.idle);
        }
        debug!(new = found.len(), total = self.registry.len(), "scan finished");
        found
    }

    /// All devices discovered so far.
    pub fn devices(&self) -> Vec<&Device> {
        self.registry.all()
    }

    /// Devices passing an ad-hoc filter.
    pub fn devices_matching(&self, filter: &ServiceFilter) -> Vec<&Device> {
        self.registry.matching(filter)
    }

    /// Looks up one discovered device.
    pub fn device(&self, path: &str) -> Option<&Device> {
        self.registry.get(path)
    }

    /// Replaces the session's service filter.
    pub fn set_filter(&mut self, filter: ServiceFilter) {
        self.filter = filter;
    }

    /// The session's current service filter.
    pub fn filter(&self) -> &ServiceFilter {
        &self.filter
    }

    /// Devices passing the session's filter.
    pub fn filtered_devices(&self) -> Vec<&Device> {
        self.registry.matching(&self.filter)
    }

    /// Re-reads every discovered device's properties from the live service.
    pub fn refresh_devices(&mut self) {
        self.registry.refresh_all(&mut self.bus, &self.naming);
    }

    /// Connects to a device and waits for confirmation.
    ///
    /// The accepted action is confirmed by polling the device's live
    /// connected state under the session's [`PollPolicy`]; only a confirmed
    /// connection marks the registry. Rejection and an exhausted budget are
    /// indistinguishable [`ErrorKind::ConnectionFailed`] outcomes.
    pub fn connect(&mut self, device_path: &str) -> Result<()> {
        match establish(
            &mut self.bus,
            &self.naming,
            device_path,
            &self.policy,
            self.clock.as_mut(),
        ) {
            ConnectionState::Connected => {
                self.registry.mark_connected(device_path, true);
                Ok(())
            }
            _ => Err(Error::new(
                ErrorKind::ConnectionFailed,
                None,
                format!("connection to {device_path} was rejected or not confirmed"),
            )),
        }
    }

    /// Disconnects from a device.
    ///
    /// An accepted action clears the registry's connected flag immediately.
    /// Disconnection is a fire-and-forget revocation from the local
    /// perspective, with no confirmation loop. A rejected action changes
    /// nothing.
    pub fn disconnect(&mut self, device_path: &str) -> Result<()> {
        if self
            .bus
            .call(&self.naming.service, device_path, &self.naming.device_interface, "Disconnect", &[])
            .is_none()
        {
            return Err(Error::new(
                ErrorKind::ActionRejected,
                None,
                format!("disconnect rejected by {device_path}"),
            ));
        }
        self.registry.mark_connected(device_path, false);
        debug!(path = device_path, "disconnected");
        Ok(())
    }

    /// Discovers the characteristics under a device's object subtree.
    ///
    /// Each call re-queries and re-decodes the tree; nothing is cached.
    pub fn characteristics(&mut self, device_path: &str) -> Vec<Characteristic> {
        let Some(tree) = self.managed_objects() else {
            return Vec::new();
        };
        discover_characteristics(&tree, &mut self.bus, &self.naming, device_path)
    }

    /// Reads a characteristic's value.
    ///
    /// An absent or malformed reply yields an empty buffer, not an error.
    pub fn read(&mut self, characteristic_path: &str) -> Vec<u8> {
        self.bus
            .call(
                &self.naming.service,
                characteristic_path,
                &self.naming.characteristic_interface,
                "ReadValue",
                &[Value::Dict(Default::default())],
            )
            .map(Value::into_bytes)
            .unwrap_or_default()
    }

    /// Writes a characteristic's value. Success means a reply was received;
    /// the remote service is treated as atomic per call.
    pub fn write(&mut self, characteristic_path: &str, value: &[u8]) -> Result<()> {
        self.bus
            .call(
                &self.naming.service,
                characteristic_path,
                &self.naming.characteristic_interface,
                "WriteValue",
                &[Value::Bytes(value.to_vec()), Value::Dict(Default::default())],
            )
            .map(|_| ())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::ActionRejected,
                    None,
                    format!("write rejected by {characteristic_path}"),
                )
            })
    }

    /// Subscribes to a characteristic's notifications.
    ///
    /// The subscription set only changes on success; re-subscribing an
    /// already-subscribed path is a no-op.
    pub fn start_notify(&mut self, characteristic_path: &str) -> Result<()> {
        self.notify_action(characteristic_path, "StartNotify")?;
        self.subscriptions.insert(characteristic_path.to_owned());
        Ok(())
    }

    /// Unsubscribes from a characteristic's notifications. Stopping a
    /// never-subscribed path is harmless.
    pub fn stop_notify(&mut self, characteristic_path: &str) -> Result<()> {
        self.notify_action(characteristic_path, "StopNotify")?;
        self.subscriptions.remove(characteristic_path);
        Ok(())
    }

    fn notify_action(&mut self, characteristic_path: &str, method: &str) -> Result<()> {
        match self.bus.call(
            &self.naming.service,
            characteristic_path,
            &self.naming.characteristic_interface,
            method,
            &[],
        ) {
            Some(_) => Ok(()),
            None => Err(Error::new(
                ErrorKind::ActionRejected,
                None,
                format!("{method} rejected by {characteristic_path}"),
            )),
        }
    }

    /// Paths currently subscribed for notifications.
    pub fn subscriptions(&self) -> &HashSet<String> {
        &self.subscriptions
    }

    /// Registers the notification handler. One handler per session; a later
    /// registration replaces the earlier one.
    pub fn set_notification_handler(&mut self, handler: impl FnMut(&str, &[u8]) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Pumps the message loop for up to `budget`, dispatching delivered
    /// value-change notifications to the registered handler. Returns how
    /// many notifications were dispatched.
    pub fn pump(&mut self, budget: Duration) -> usize {
        let signals = self.bus.pump_once(budget);
        self.dispatch(signals)
    }

    /// Routes value-change signals for subscribed characteristics to the
    /// handler. Signals for other interfaces, unsubscribed paths, or bags
    /// without a byte-array `Value` are ignored.
    fn dispatch(&mut self, signals: Vec<Signal>) -> usize {
        let Some(handler) = self.handler.as_mut() else {
            return 0;
        };
        let mut dispatched = 0;
        for signal in signals {
            if signal.interface != self.naming.characteristic_interface {
                continue;
            }
            if !self.subscriptions.contains(&signal.path) {
                continue;
            }
            let Some(value) = signal.changed.get("Value") else {
                continue;
            };
            match value.peeled() {
                Value::Bytes(bytes) => {
                    handler(&signal.path, bytes);
                    dispatched += 1;
                }
                _ => debug!(path = signal.path.as_str(), "ignoring non-buffer value change"),
            }
        }
        dispatched
    }

    fn managed_objects(&mut self) -> Option<ObjectTree> {
        let reply = self.bus.call(
            &self.naming.service,
            &self.naming.object_root,
            &self.naming.object_manager_interface,
            "GetManagedObjects",
            &[],
        )?;
        Some(ObjectTree::decode(reply))
    }
}

/// Locates the adapter: the lexically first object carrying the adapter
/// interface.
fn find_adapter(bus: &mut dyn Bus, naming: &Naming) -> Option<String> {
    let reply = bus.call(
        &naming.service,
        &naming.object_root,
        &naming.object_manager_interface,
        "GetManagedObjects",
        &[],
    )?;
    let tree = ObjectTree::decode(reply);
    tree.paths_with_interface(&naming.adapter_interface)
        .min()
        .map(str::to_owned)
}
