//! The bus client contract consumed by the engine.
//!
//! The engine drives everything through [`Bus`]: synchronous method calls,
//! signal-match registration, and a bounded message pump. An absent reply
//! uniformly means "the operation did not succeed". The engine does not
//! distinguish a timeout from a remote rejection or a transport error; that
//! distinction stays in the transport.

mod system;

use std::time::Duration;

use crate::value::{PropertyBag, Value};

pub use system::SystemBus;

/// Generic property interface used by scoped property reads.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// A property-change notification delivered during a pump.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Path of the object whose properties changed.
    pub path: String,
    /// Interface the changed properties belong to.
    pub interface: String,
    /// The changed properties.
    pub changed: PropertyBag,
}

/// Synchronous request/reply and message-pump primitives over a message bus.
///
/// One engine instance assumes unshared ownership of its bus session; two
/// engines must not share a session without external coordination.
pub trait Bus {
    /// Establishes the bus session. Returns `false` if the bus is
    /// unreachable.
    fn connect(&mut self) -> bool;

    /// Performs one blocking method call.
    ///
    /// Returns the decoded reply body, [`Value::Unit`] for a reply the engine
    /// has no use for, or `None` if no reply arrived.
    fn call(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        method: &str,
        args: &[Value],
    ) -> Option<Value>;

    /// Subscribes the session to signals matching `rule`.
    fn add_signal_match(&mut self, rule: &str) -> bool;

    /// Drives the message loop for up to `timeout`, returning the
    /// property-change signals delivered meanwhile.
    fn pump_once(&mut self, timeout: Duration) -> Vec<Signal>;

    /// Reads one property through the scoped property interface.
    fn get_property(&mut self, service: &str, path: &str, interface: &str, property: &str) -> Option<Value> {
        self.call(
            service,
            path,
            PROPERTIES_INTERFACE,
            "Get",
            &[Value::Str(interface.to_owned()), Value::Str(property.to_owned())],
        )
    }

    /// Reads a string property, `""` when absent or mis-shaped.
    fn get_string_property(&mut self, service: &str, path: &str, interface: &str, property: &str) -> String {
        self.get_property(service, path, interface, property)
            .map(|v| v.as_str().to_owned())
            .unwrap_or_default()
    }

    /// Reads a boolean property, `false` when absent or mis-shaped.
    fn get_bool_property(&mut self, service: &str, path: &str, interface: &str, property: &str) -> bool {
        self.get_property(service, path, interface, property)
            .map(|v| v.as_bool())
            .unwrap_or_default()
    }

    /// Reads a string-array property, empty when absent or mis-shaped.
    fn get_strings_property(&mut self, service: &str, path: &str, interface: &str, property: &str) -> Vec<String> {
        self.get_property(service, path, interface, property)
            .map(|v| v.as_strings().to_vec())
            .unwrap_or_default()
    }
}
