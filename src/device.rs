//! Discovered devices and the device registry.

use std::collections::HashMap;

use tracing::debug;

use crate::bus::Bus;
use crate::convention::Naming;
use crate::filter::ServiceFilter;
use crate::tree::ObjectTree;
use crate::value::{PropertyBag, Value};

/// A remote Bluetooth LE device discovered under the active adapter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    /// Object path identifying the device. Unique per run.
    pub path: String,
    /// Hardware address, `""` if the service did not report one.
    pub address: String,
    /// Display name, possibly empty.
    pub name: String,
    /// Whether the device is currently connected.
    pub connected: bool,
    /// Advertised service identifiers. May contain duplicates accumulated
    /// across re-queries; consumers must tolerate them.
    pub services: Vec<String>,
}

impl Device {
    fn from_bag(path: &str, bag: &PropertyBag) -> Self {
        Device {
            path: path.to_owned(),
            address: bag.get_str("Address"),
            name: bag.get_str("Name"),
            connected: bag.get_bool("Connected"),
            services: bag.get_strings("UUIDs"),
        }
    }
}

/// The set of devices discovered during this run.
///
/// Discovery polls a service with no ordering or completeness guarantee per
/// call, so the registry is monotonic-additive: a device record exists iff
/// its path was sighted under the adapter with the device interface at least
/// once, fields are refreshed in place, and nothing is deleted within a run.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        DeviceRegistry::default()
    }

    /// Folds one decoded tree into the registry.
    ///
    /// Paths under `adapter_path` that carry the device marker and the device
    /// interface are inserted on first sighting, built from the interface's
    /// property bag. Already-registered paths are left untouched; re-running
    /// with an identical tree adds nothing. Returns the newly added paths.
    pub fn discover(&mut self, tree: &ObjectTree, adapter_path: &str, naming: &Naming) -> Vec<String> {
        let mut added = Vec::new();
        for (path, interfaces) in tree.iter() {
            if !naming.is_device_path(path, adapter_path) {
                continue;
            }
            let Some(bag) = interfaces.get(&naming.device_interface) else {
                continue;
            };
            if self.devices.contains_key(path) {
                continue;
            }
            let device = Device::from_bag(path, bag);
            debug!(
                path,
                address = device.address.as_str(),
                name = device.name.as_str(),
                "discovered device"
            );
            self.devices.insert(path.to_owned(), device);
            added.push(path.to_owned());
        }
        added
    }

    /// Re-reads every registered device's properties from the live service,
    /// overwriting in place. Picks up state mutated out-of-band, e.g. another
    /// process connecting to a device.
    pub fn refresh_all(&mut self, bus: &mut dyn Bus, naming: &Naming) {
        for device in self.devices.values_mut() {
            device.address =
                bus.get_string_property(&naming.service, &device.path, &naming.device_interface, "Address");
            device.name = bus.get_string_property(&naming.service, &device.path, &naming.device_interface, "Name");
            device.connected =
                bus.get_bool_property(&naming.service, &device.path, &naming.device_interface, "Connected");
            // A malformed reply keeps the previous service list.
            if let Some(value) = bus.get_property(&naming.service, &device.path, &naming.device_interface, "UUIDs") {
                if let Value::Strings(services) = value.unwrap_variant() {
                    device.services = services;
                }
            }
        }
    }

    /// All registered devices, in registry iteration order.
    pub fn all(&self) -> Vec<&Device> {
        self.devices.values().collect()
    }

    /// Registered devices whose advertised services pass `filter`.
    pub fn matching(&self, filter: &ServiceFilter) -> Vec<&Device> {
        self.devices.values().filter(|device| filter.matches(device)).collect()
    }

    /// Looks up one device by path.
    pub fn get(&self, path: &str) -> Option<&Device> {
        self.devices.get(path)
    }

    /// Sets a device's connected flag. Unknown paths are a silent no-op.
    pub fn mark_connected(&mut self, path: &str, connected: bool) {
        if let Some(device) = self.devices.get_mut(path) {
            device.connected = connected;
        }
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry holds no devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
