use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures_lite::future::{block_on, poll_once};
use futures_lite::StreamExt;
use tracing::{debug, warn};
use zbus::zvariant::{self, OwnedObjectPath, OwnedValue, Signature};
use zbus::{blocking, MatchRule, Message, MessageStream, MessageType};

use super::{Bus, Signal};
use crate::value::{PropertyBag, Value};

/// Wire shape of a managed-objects reply.
type RawObjects = HashMap<OwnedObjectPath, HashMap<String, HashMap<String, OwnedValue>>>;

/// How long the pump naps between drain passes over the signal queue.
const DRAIN_IDLE: Duration = Duration::from_millis(20);

/// How many undelivered signal messages the session buffers.
const SIGNAL_QUEUE: usize = 64;

/// A [`Bus`] backed by the system D-Bus through [`zbus`].
///
/// The session is created lazily by [`Bus::connect`]. Incoming
/// `PropertiesChanged` signals are buffered on a message stream and drained
/// by [`Bus::pump_once`]; everything else is a blocking round trip on the
/// caller's thread.
#[derive(Default)]
pub struct SystemBus {
    connection: Option<blocking::Connection>,
    signals: Option<MessageStream>,
}

impl SystemBus {
    /// Creates an unconnected system-bus client.
    pub fn new() -> Self {
        SystemBus::default()
    }

    fn change_stream(connection: &blocking::Connection) -> zbus::Result<MessageStream> {
        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .interface("org.freedesktop.DBus.Properties")?
            .member("PropertiesChanged")?
            .build();
        block_on(MessageStream::for_match_rule(
            rule,
            connection.inner(),
            Some(SIGNAL_QUEUE),
        ))
    }
}

impl Bus for SystemBus {
    fn connect(&mut self) -> bool {
        if self.connection.is_some() {
            return true;
        }
        let connection = match blocking::Connection::system() {
            Ok(connection) => connection,
            Err(err) => {
                warn!("system bus connection failed: {err}");
                return false;
            }
        };
        match Self::change_stream(&connection) {
            Ok(stream) => self.signals = Some(stream),
            // Calls still work without the stream; pumping delivers nothing.
            Err(err) => warn!("property-change stream unavailable: {err}"),
        }
        self.connection = Some(connection);
        true
    }

    fn call(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        method: &str,
        args: &[Value],
    ) -> Option<Value> {
        let connection = self.connection.as_ref()?;
        let destination = Some(service);
        let interface = Some(interface);
        // A Structure body serializes each argument with its own signature;
        // bare values would go out wrapped as variants.
        let result = if args.is_empty() {
            connection.call_method(destination, path, interface, method, &())
        } else {
            let mut body = zvariant::StructureBuilder::new();
            for arg in args {
                body = body.append_field(to_wire(arg));
            }
            connection.call_method(destination, path, interface, method, &body.build())
        };
        match result {
            Ok(reply) => Some(decode_reply(&reply)),
            Err(err) => {
                debug!(method, path, "call failed: {err}");
                None
            }
        }
    }

    fn add_signal_match(&mut self, rule: &str) -> bool {
        let Some(connection) = self.connection.as_ref() else {
            return false;
        };
        let Ok(rule) = MatchRule::try_from(rule) else {
            warn!(rule, "invalid signal match rule");
            return false;
        };
        match blocking::fdo::DBusProxy::new(connection) {
            Ok(proxy) => proxy.add_match_rule(rule).is_ok(),
            Err(_) => false,
        }
    }

    fn pump_once(&mut self, timeout: Duration) -> Vec<Signal> {
        let Some(stream) = self.signals.as_mut() else {
            std::thread::sleep(timeout);
            return Vec::new();
        };
        let deadline = Instant::now() + timeout;
        let mut delivered = Vec::new();
        loop {
            while let Some(Some(next)) = block_on(poll_once(stream.next())) {
                if let Ok(message) = next {
                    delivered.extend(change_signal(&message));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return delivered;
            }
            std::thread::sleep(DRAIN_IDLE.min(deadline - now));
        }
    }
}

/// Converts one engine value into its wire form.
fn to_wire(value: &Value) -> zvariant::Value<'static> {
    match value {
        Value::Unit => zvariant::Value::U8(0),
        Value::Bool(b) => zvariant::Value::Bool(*b),
        Value::Byte(b) => zvariant::Value::U8(*b),
        Value::Str(s) => zvariant::Value::Str(s.clone().into()),
        Value::Bytes(bytes) => zvariant::Value::from(bytes.clone()),
        Value::Strings(strings) => zvariant::Value::from(strings.clone()),
        Value::Dict(map) => {
            let mut dict = zvariant::Dict::new(
                Signature::from_str_unchecked("s"),
                Signature::from_str_unchecked("v"),
            );
            for (key, entry) in map {
                let wrapped = zvariant::Value::Value(Box::new(to_wire(entry)));
                if let Err(err) = dict.add(zvariant::Str::from(key.clone()), wrapped) {
                    warn!(key, "dropped malformed option: {err}");
                }
            }
            zvariant::Value::Dict(dict)
        }
        Value::Variant(inner) => zvariant::Value::Value(Box::new(to_wire(inner))),
    }
}

/// Decodes a reply body into an engine value.
///
/// Managed-object replies are decoded through their full typed shape; any
/// other single-argument body is converted generically. Bodies the engine has
/// no use for collapse to [`Value::Unit`], which still records that a reply
/// arrived.
fn decode_reply(reply: &Message) -> Value {
    if let Ok(raw) = reply.body::<RawObjects>() {
        return objects_value(raw);
    }
    if let Ok(value) = reply.body::<zvariant::Value>() {
        return from_wire(value).unwrap_or_default();
    }
    Value::Unit
}

fn objects_value(raw: RawObjects) -> Value {
    Value::Dict(
        raw.into_iter()
            .map(|(path, interfaces)| {
                let interfaces = interfaces
                    .into_iter()
                    .map(|(interface, properties)| (interface, Value::Dict(bag_values(properties))))
                    .collect();
                (path.to_string(), Value::Dict(interfaces))
            })
            .collect(),
    )
}

fn bag_values(properties: HashMap<String, OwnedValue>) -> HashMap<String, Value> {
    properties
        .into_iter()
        .filter_map(|(name, value)| from_wire(value.into()).map(|value| (name, value)))
        .collect()
}

/// Converts a wire value into an engine value.
///
/// Only the shapes the engine models survive; anything else (numbers wider
/// than a byte, dictionaries, structures, file descriptors) is dropped,
/// consistent with the decode-mismatch policy.
fn from_wire(value: zvariant::Value<'_>) -> Option<Value> {
    match value {
        zvariant::Value::U8(b) => Some(Value::Byte(b)),
        zvariant::Value::Bool(b) => Some(Value::Bool(b)),
        zvariant::Value::Str(s) => Some(Value::Str(s.as_str().to_owned())),
        zvariant::Value::ObjectPath(p) => Some(Value::Str(p.as_str().to_owned())),
        zvariant::Value::Value(inner) => from_wire(*inner).map(|v| Value::Variant(Box::new(v))),
        zvariant::Value::Array(array) => {
            let elements = array.get();
            if elements.is_empty() {
                return match array.element_signature().as_str() {
                    "y" => Some(Value::Bytes(Vec::new())),
                    "s" | "o" => Some(Value::Strings(Vec::new())),
                    _ => None,
                };
            }
            let bytes: Vec<u8> = elements
                .iter()
                .filter_map(|e| match e {
                    zvariant::Value::U8(b) => Some(*b),
                    _ => None,
                })
                .collect();
            if bytes.len() == elements.len() {
                return Some(Value::Bytes(bytes));
            }
            let strings: Vec<String> = elements
                .iter()
                .filter_map(|e| match e {
                    zvariant::Value::Str(s) => Some(s.as_str().to_owned()),
                    zvariant::Value::ObjectPath(p) => Some(p.as_str().to_owned()),
                    _ => None,
                })
                .collect();
            if strings.len() == elements.len() {
                return Some(Value::Strings(strings));
            }
            None
        }
        _ => None,
    }
}

/// Renders a `PropertiesChanged` message as a [`Signal`].
fn change_signal(message: &Message) -> Option<Signal> {
    if message.member()?.as_str() != "PropertiesChanged" {
        return None;
    }
    let path = message.path()?.as_str().to_owned();
    let (interface, changed, _invalidated): (String, HashMap<String, OwnedValue>, Vec<String>) =
        message.body().ok()?;
    Some(Signal {
        path,
        interface,
        changed: PropertyBag::from(bag_values(changed)),
    })
}
