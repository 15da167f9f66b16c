#![warn(missing_docs)]

//! Bluebus is a [Bluetooth Low Energy] (BLE) central library for [Rust] built on the [BlueZ]
//! D-Bus API. It speaks to the `org.bluez` service over the system bus and exposes device
//! discovery, connection management, and GATT client operations through a small synchronous
//! API.
//!
//! The goal of Bluebus is to stay a *thin* layer over the BlueZ object model: objects on the
//! bus are decoded into plain maps of [`Value`]s, the BlueZ naming conventions live in one
//! configurable [`Naming`] table, and every operation is a method call or property read that
//! maps one-to-one onto the D-Bus surface. The crate currently supports the GAP Central and
//! GATT Client roles. Peripheral and Server roles are not supported.
//!
//! [Rust]: https://www.rust-lang.org/
//! [Bluetooth Low Energy]: https://www.bluetooth.com/specifications/specs/
//! [BlueZ]: http://www.bluez.org/
//!
//! # Usage
//!
//! ```rust,no_run
//!# use std::time::Duration;
//!# fn main() -> Result<(), Box<dyn std::error::Error>> {
//!let mut session = open_session()?;
//!session.start_discovery()?;
//!session.scan_for(Duration::from_secs(10));
//!session.stop_discovery()?;
//!
//!for device in session.devices() {
//!    let name = if device.name.is_empty() { "(unknown)" } else { device.name.as_str() };
//!    println!("{} {}: {:?}", device.address, name, device.services);
//!}
//!#    Ok(())
//!# }
//!# fn open_session() -> bluebus::Result<bluebus::Session<bluebus::SystemBus>> {
//!#     bluebus::Session::new(bluebus::SystemBus::new())
//!# }
//! ```
//!
//! # Overview
//!
//! The primary functions provided by Bluebus are:
//!
//! - Device discovery:
//!   - [Scanning][Session::scan_for] for devices while BlueZ discovery is active
//!   - Listing [known devices][Session::devices] and [filtering][Session::filtered_devices]
//!     them by advertised service UUID
//!   - [Connecting][Session::connect] to discovered devices with connection confirmation
//! - Accessing remote GATT services:
//!   - Discovering device [characteristics][Session::characteristics]
//!   - [Read][Session::read] and [write][Session::write] operations on remote
//!     characteristics
//!   - [Subscribing][Session::start_notify] to characteristic notifications and
//!     [pumping][Session::pump] them to a handler
//!
//! # Blocking model
//!
//! All calls block on the system bus. Notification delivery is pull-based: nothing is
//! delivered until [`Session::pump`] (or a scan) drains the signal queue, so callers control
//! exactly when their handler runs. The [`Bus`] and [`Clock`] traits are the seams for
//! substituting the transport and the passage of time in tests.
//!
//! # Feature flags
//!
//! The `serde` feature is available to enable serializing/deserializing [`Device`] and
//! [`Characteristic`] snapshots.
//!
//! # Examples
//!
//! Examples demonstrating basic usage are available in the [demos folder].
//!
//! [demos folder]: https://github.com/bluebus/bluebus/tree/master/demos

pub mod bus;
pub mod error;

mod characteristic;
mod clock;
mod connection;
mod convention;
mod device;
mod filter;
mod session;
mod tree;
mod value;

pub use bus::{Bus, Signal, SystemBus};
pub use characteristic::{discover_characteristics, Characteristic};
pub use clock::{Clock, SystemClock};
pub use connection::{establish, ConnectionState, PollPolicy};
pub use convention::Naming;
pub use device::{Device, DeviceRegistry};
pub use error::Error;
pub use filter::ServiceFilter;
pub use session::{NotificationHandler, ScanCadence, Session};
pub use tree::ObjectTree;
pub use value::{PropertyBag, Value};

/// Convenience alias for a result with [`Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;
