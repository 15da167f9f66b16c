//! GATT characteristics and per-device catalog discovery.

use crate::bus::Bus;
use crate::convention::Naming;
use crate::tree::ObjectTree;

/// A readable/writable/notifiable data point exposed by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Characteristic {
    /// Object path identifying the characteristic.
    pub path: String,
    /// UUID identifying the characteristic's type.
    pub uuid: String,
    /// Path of the parent GATT service, `""` if unresolved.
    pub service_path: String,
    /// Access capability tokens, e.g. `read`, `write`, `notify`.
    pub flags: Vec<String>,
}

/// Collects the characteristics under one device's object subtree.
///
/// An object qualifies when its path is a lexical descendant of
/// `device_path`, carries the characteristic marker segment, and implements
/// the GATT characteristic interface. `UUID` and `Service` come from the
/// interface's property bag; `Flags` through a scoped property query.
///
/// The result is a fresh sequence on every call; there is no catalog cache,
/// and callers needing stability must snapshot it. Entries are ordered by
/// path.
pub fn discover_characteristics(
    tree: &ObjectTree,
    bus: &mut dyn Bus,
    naming: &Naming,
    device_path: &str,
) -> Vec<Characteristic> {
    let mut found = Vec::new();
    for (path, interfaces) in tree.iter() {
        if !naming.is_characteristic_path(path, device_path) {
            continue;
        }
        let Some(bag) = interfaces.get(&naming.characteristic_interface) else {
            continue;
        };
        let flags = bus.get_strings_property(&naming.service, path, &naming.characteristic_interface, "Flags");
        found.push(Characteristic {
            path: path.to_owned(),
            uuid: bag.get_str("UUID"),
            service_path: bag.get_str("Service"),
            flags,
        });
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}
