//! Remote-service naming conventions.
//!
//! Object classification relies on the naming scheme of the remote service,
//! not on structural guarantees: device objects live under the adapter path
//! and carry a `/dev_` segment, characteristic objects live under a device
//! path and carry a `/char` segment. [`Naming`] keeps the scheme pluggable so
//! an alternate backend can supply different conventions.

/// Names and path markers of the remote Bluetooth service's object model.
#[derive(Debug, Clone)]
pub struct Naming {
    /// Well-known bus name of the Bluetooth service.
    pub service: String,
    /// Object path the managed-object query is addressed to.
    pub object_root: String,
    /// Interface marking an object as a Bluetooth adapter.
    pub adapter_interface: String,
    /// Interface marking an object as a remote device.
    pub device_interface: String,
    /// Interface marking an object as a GATT characteristic.
    pub characteristic_interface: String,
    /// Interface exposing the managed-object query.
    pub object_manager_interface: String,
    /// Path segment identifying device objects.
    pub device_marker: String,
    /// Path segment identifying characteristic objects.
    pub characteristic_marker: String,
}

impl Default for Naming {
    /// The BlueZ scheme.
    fn default() -> Self {
        Naming {
            service: "org.bluez".to_owned(),
            object_root: "/".to_owned(),
            adapter_interface: "org.bluez.Adapter1".to_owned(),
            device_interface: "org.bluez.Device1".to_owned(),
            characteristic_interface: "org.bluez.GattCharacteristic1".to_owned(),
            object_manager_interface: "org.freedesktop.DBus.ObjectManager".to_owned(),
            device_marker: "/dev_".to_owned(),
            characteristic_marker: "/char".to_owned(),
        }
    }
}

impl Naming {
    /// Whether `path` names a device object under `adapter_path`.
    pub fn is_device_path(&self, path: &str, adapter_path: &str) -> bool {
        path.starts_with(adapter_path) && path.contains(&self.device_marker)
    }

    /// Whether `path` names a characteristic object under `device_path`.
    pub fn is_characteristic_path(&self, path: &str, device_path: &str) -> bool {
        path.starts_with(device_path) && path.contains(&self.characteristic_marker)
    }
}
