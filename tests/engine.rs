use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use bluebus::error::ErrorKind;
use bluebus::{
    establish, Bus, Clock, ConnectionState, Naming, PollPolicy, PropertyBag, ScanCadence, ServiceFilter, Session,
    Signal, Value,
};

const ADAPTER: &str = "/org/bluez/hci0";
const DEVICE: &str = "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF";
const OTHER_DEVICE: &str = "/org/bluez/hci0/dev_11_22_33_44_55_66";
const SERVICE: &str = "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000a";
const CHARACTERISTIC: &str = "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000a/char000b";
const OTHER_CHARACTERISTIC: &str = "/org/bluez/hci0/dev_11_22_33_44_55_66/service000a/char000c";

const ADAPTER_IFACE: &str = "org.bluez.Adapter1";
const DEVICE_IFACE: &str = "org.bluez.Device1";
const GATT_IFACE: &str = "org.bluez.GattCharacteristic1";

const BATTERY: &str = "0000180f-0000-1000-8000-00805f9b34fb";
const HEART_RATE: &str = "0000180d-0000-1000-8000-00805f9b34fb";

struct StubState {
    objects: Value,
    props: HashMap<(String, String, String), Value>,
    reject: HashSet<String>,
    written: HashMap<String, Vec<u8>>,
    signals: VecDeque<Vec<Signal>>,
    calls: Vec<String>,
    rules: Vec<String>,
    bus_available: bool,
    confirm_after: HashMap<String, u32>,
}

impl Default for StubState {
    fn default() -> Self {
        StubState {
            objects: Value::Unit,
            props: HashMap::new(),
            reject: HashSet::new(),
            written: HashMap::new(),
            signals: VecDeque::new(),
            calls: Vec::new(),
            rules: Vec::new(),
            bus_available: true,
            confirm_after: HashMap::new(),
        }
    }
}

impl StubState {
    fn set_prop(&mut self, path: &str, interface: &str, property: &str, value: Value) {
        self.props
            .insert((path.to_owned(), interface.to_owned(), property.to_owned()), value);
    }
}

/// A scripted in-memory bus.
struct StubBus {
    state: Rc<RefCell<StubState>>,
}

impl StubBus {
    fn new() -> (Self, Rc<RefCell<StubState>>) {
        let state = Rc::new(RefCell::new(StubState::default()));
        (StubBus { state: state.clone() }, state)
    }
}

impl Bus for StubBus {
    fn connect(&mut self) -> bool {
        self.state.borrow().bus_available
    }

    fn call(&mut self, _service: &str, path: &str, _interface: &str, method: &str, args: &[Value]) -> Option<Value> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("{path} {method}"));
        if state.reject.contains(method) {
            return None;
        }
        match method {
            "GetManagedObjects" => Some(state.objects.clone()),
            "Get" => {
                let interface = args.first().map(|v| v.as_str().to_owned()).unwrap_or_default();
                let property = args.get(1).map(|v| v.as_str().to_owned()).unwrap_or_default();
                if property == "Connected" {
                    if let Some(remaining) = state.confirm_after.get_mut(path) {
                        if *remaining == 0 {
                            return Some(Value::Variant(Box::new(Value::Bool(true))));
                        }
                        *remaining -= 1;
                        return Some(Value::Variant(Box::new(Value::Bool(false))));
                    }
                }
                state
                    .props
                    .get(&(path.to_owned(), interface, property))
                    .cloned()
                    .map(|value| Value::Variant(Box::new(value)))
            }
            "ReadValue" => Some(Value::Bytes(state.written.get(path).cloned().unwrap_or_default())),
            "WriteValue" => {
                let payload = args.first().map(|v| v.as_bytes().to_vec()).unwrap_or_default();
                state.written.insert(path.to_owned(), payload);
                Some(Value::Unit)
            }
            _ => Some(Value::Unit),
        }
    }

    fn add_signal_match(&mut self, rule: &str) -> bool {
        self.state.borrow_mut().rules.push(rule.to_owned());
        true
    }

    fn pump_once(&mut self, _timeout: Duration) -> Vec<Signal> {
        self.state.borrow_mut().signals.pop_front().unwrap_or_default()
    }
}

/// A clock driven only by its own sleeps.
struct ManualClock {
    now: Instant,
    slept: Rc<RefCell<Vec<Duration>>>,
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
        self.slept.borrow_mut().push(duration);
    }
}

fn dict(entries: Vec<(&str, Value)>) -> Value {
    Value::Dict(entries.into_iter().map(|(name, value)| (name.to_string(), value)).collect())
}

fn device_bag(address: &str, name: &str, services: Vec<&str>) -> Value {
    dict(vec![
        ("Address", Value::Str(address.to_owned())),
        ("Name", Value::Str(name.to_owned())),
        ("Connected", Value::Bool(false)),
        ("UUIDs", Value::Strings(services.into_iter().map(str::to_owned).collect())),
    ])
}

fn fixture_objects() -> Value {
    dict(vec![
        (ADAPTER, dict(vec![(ADAPTER_IFACE, dict(vec![("Powered", Value::Bool(true))]))])),
        ("/org/bluez/hci1", dict(vec![(ADAPTER_IFACE, dict(vec![]))])),
        (
            DEVICE,
            dict(vec![(DEVICE_IFACE, device_bag("AA:BB:CC:DD:EE:FF", "thermometer", vec![BATTERY]))]),
        ),
        (
            OTHER_DEVICE,
            dict(vec![(DEVICE_IFACE, device_bag("11:22:33:44:55:66", "", vec![HEART_RATE]))]),
        ),
        (SERVICE, dict(vec![("org.bluez.GattService1", dict(vec![]))])),
        (
            CHARACTERISTIC,
            dict(vec![(
                GATT_IFACE,
                dict(vec![
                    ("UUID", Value::Str("00002a19-0000-1000-8000-00805f9b34fb".to_owned())),
                    ("Service", Value::Str(SERVICE.to_owned())),
                ]),
            )]),
        ),
        (
            OTHER_CHARACTERISTIC,
            dict(vec![(
                GATT_IFACE,
                dict(vec![("UUID", Value::Str("00002a37-0000-1000-8000-00805f9b34fb".to_owned()))]),
            )]),
        ),
    ])
}

fn fixture_session() -> (Session<StubBus>, Rc<RefCell<StubState>>) {
    let (bus, state) = StubBus::new();
    {
        let mut state = state.borrow_mut();
        state.objects = fixture_objects();
        state.set_prop(
            CHARACTERISTIC,
            GATT_IFACE,
            "Flags",
            Value::Strings(vec!["read".to_owned(), "write".to_owned(), "notify".to_owned()]),
        );
    }
    let session = Session::new(bus).expect("session against fixture bus");
    (session, state)
}

fn install_manual_clock(session: &mut Session<StubBus>) -> Rc<RefCell<Vec<Duration>>> {
    let slept = Rc::new(RefCell::new(Vec::new()));
    session.set_clock(Box::new(ManualClock {
        now: Instant::now(),
        slept: slept.clone(),
    }));
    slept
}

#[test]
fn session_fails_when_bus_unreachable() {
    let (bus, state) = StubBus::new();
    state.borrow_mut().bus_available = false;
    let err = Session::new(bus).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BusUnavailable);
}

#[test]
fn session_fails_without_adapter() {
    let (bus, _state) = StubBus::new();
    let err = Session::new(bus).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AdapterNotFound);
}

#[test]
fn session_picks_first_adapter_and_installs_signal_match() {
    let (session, state) = fixture_session();
    assert_eq!(session.adapter_path(), ADAPTER);
    assert_eq!(state.borrow().rules, vec!["type='signal',sender='org.bluez'".to_owned()]);
}

#[test]
fn discovery_is_monotonic() {
    let (mut session, _state) = fixture_session();
    let mut added = session.discover_once();
    added.sort();
    assert_eq!(added, vec![OTHER_DEVICE.to_owned(), DEVICE.to_owned()]);
    assert!(session.discover_once().is_empty());
    assert_eq!(session.devices().len(), 2);

    let device = session.device(DEVICE).unwrap();
    assert_eq!(device.address, "AA:BB:CC:DD:EE:FF");
    assert_eq!(device.name, "thermometer");
    assert!(!device.connected);
    assert_eq!(device.services, vec![BATTERY.to_owned()]);
}

#[test]
fn rejected_discovery_query_adds_nothing() {
    let (mut session, state) = fixture_session();
    state.borrow_mut().reject.insert("GetManagedObjects".to_owned());
    assert!(session.discover_once().is_empty());
    assert!(session.devices().is_empty());
}

#[test]
fn scan_iterates_until_deadline() {
    let (mut session, _state) = fixture_session();
    let slept = install_manual_clock(&mut session);
    session.set_scan_cadence(ScanCadence {
        pump_slice: Duration::from_millis(10),
        idle: Duration::from_millis(500),
    });

    let found = session.scan_for(Duration::from_secs(2));
    assert_eq!(found.len(), 2);
    assert_eq!(slept.borrow().len(), 4);
    assert_eq!(session.devices().len(), 2);
}

#[test]
fn adapter_discovery_actions() {
    let (mut session, state) = fixture_session();
    session.start_discovery().unwrap();
    session.stop_discovery().unwrap();
    {
        let state = state.borrow();
        assert!(state.calls.contains(&format!("{ADAPTER} StartDiscovery")));
        assert!(state.calls.contains(&format!("{ADAPTER} StopDiscovery")));
    }

    state.borrow_mut().reject.insert("StartDiscovery".to_owned());
    let err = session.start_discovery().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActionRejected);
}

#[test]
fn session_filter_selects_by_service_substring() {
    let (mut session, _state) = fixture_session();
    session.discover_once();

    assert_eq!(session.filtered_devices().len(), 2);
    session.set_filter(ServiceFilter::new(["180F"]));
    let matching = session.filtered_devices();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].path, DEVICE);

    session.set_filter(ServiceFilter::new(["ffff"]));
    assert!(session.filtered_devices().is_empty());
}

#[test]
fn connect_confirms_by_polling() {
    let (mut session, state) = fixture_session();
    let slept = install_manual_clock(&mut session);
    session.discover_once();
    state.borrow_mut().confirm_after.insert(DEVICE.to_owned(), 1);

    session.connect(DEVICE).unwrap();
    assert!(session.device(DEVICE).unwrap().connected);
    assert_eq!(slept.borrow().len(), 2);
}

#[test]
fn unconfirmed_connect_is_an_error() {
    let (mut session, _state) = fixture_session();
    let slept = install_manual_clock(&mut session);
    session.set_poll_policy(PollPolicy {
        attempts: 3,
        interval: Duration::from_millis(250),
    });
    session.discover_once();

    let err = session.connect(DEVICE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(!session.device(DEVICE).unwrap().connected);
    assert_eq!(slept.borrow().len(), 3);
}

#[test]
fn rejected_connect_skips_polling() {
    let (mut session, state) = fixture_session();
    let slept = install_manual_clock(&mut session);
    session.discover_once();
    state.borrow_mut().reject.insert("Connect".to_owned());

    let err = session.connect(DEVICE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(slept.borrow().is_empty());
}

#[test]
fn disconnect_clears_flag_without_waiting() {
    let (mut session, state) = fixture_session();
    let slept = install_manual_clock(&mut session);
    session.discover_once();
    state.borrow_mut().confirm_after.insert(DEVICE.to_owned(), 0);
    session.connect(DEVICE).unwrap();
    let sleeps_after_connect = slept.borrow().len();

    session.disconnect(DEVICE).unwrap();
    assert!(!session.device(DEVICE).unwrap().connected);
    assert_eq!(slept.borrow().len(), sleeps_after_connect);
}

#[test]
fn connect_to_unregistered_path_skips_registry() {
    let (mut session, state) = fixture_session();
    let _slept = install_manual_clock(&mut session);
    let stranger = "/org/bluez/hci0/dev_DE_AD_BE_EF_00_01";
    state.borrow_mut().confirm_after.insert(stranger.to_owned(), 0);

    session.connect(stranger).unwrap();
    assert!(session.device(stranger).is_none());
}

#[test]
fn rejected_disconnect_keeps_flag() {
    let (mut session, state) = fixture_session();
    let _slept = install_manual_clock(&mut session);
    session.discover_once();
    state.borrow_mut().confirm_after.insert(DEVICE.to_owned(), 0);
    session.connect(DEVICE).unwrap();
    state.borrow_mut().reject.insert("Disconnect".to_owned());

    let err = session.disconnect(DEVICE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActionRejected);
    assert!(session.device(DEVICE).unwrap().connected);
}

#[test]
fn characteristics_are_scoped_to_the_device() {
    let (mut session, _state) = fixture_session();
    let found = session.characteristics(DEVICE);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, CHARACTERISTIC);
    assert_eq!(found[0].uuid, "00002a19-0000-1000-8000-00805f9b34fb");
    assert_eq!(found[0].service_path, SERVICE);
    assert_eq!(found[0].flags, vec!["read".to_owned(), "write".to_owned(), "notify".to_owned()]);
}

#[test]
fn write_then_read_is_byte_exact() {
    let (mut session, _state) = fixture_session();

    session.write(CHARACTERISTIC, &[]).unwrap();
    assert!(session.read(CHARACTERISTIC).is_empty());

    let payload: Vec<u8> = (0..255).collect();
    session.write(CHARACTERISTIC, &payload).unwrap();
    assert_eq!(session.read(CHARACTERISTIC), payload);
}

#[test]
fn rejected_write_is_an_error() {
    let (mut session, state) = fixture_session();
    state.borrow_mut().reject.insert("WriteValue".to_owned());
    let err = session.write(CHARACTERISTIC, &[1, 2, 3]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActionRejected);
}

#[test]
fn rejected_read_yields_empty_buffer() {
    let (mut session, state) = fixture_session();
    state.borrow_mut().reject.insert("ReadValue".to_owned());
    assert!(session.read(CHARACTERISTIC).is_empty());
}

#[test]
fn subscription_set_tracks_notify_lifecycle() {
    let (mut session, _state) = fixture_session();

    session.start_notify(CHARACTERISTIC).unwrap();
    session.start_notify(CHARACTERISTIC).unwrap();
    assert_eq!(session.subscriptions().len(), 1);

    session.stop_notify(CHARACTERISTIC).unwrap();
    assert!(session.subscriptions().is_empty());

    session.stop_notify(OTHER_CHARACTERISTIC).unwrap();
    assert!(session.subscriptions().is_empty());
}

#[test]
fn rejected_subscription_leaves_set_unchanged() {
    let (mut session, state) = fixture_session();
    state.borrow_mut().reject.insert("StartNotify".to_owned());
    let err = session.start_notify(CHARACTERISTIC).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActionRejected);
    assert!(session.subscriptions().is_empty());
}

#[test]
fn pump_dispatches_subscribed_value_changes_only() {
    let (mut session, state) = fixture_session();
    session.start_notify(CHARACTERISTIC).unwrap();

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    session.set_notification_handler(move |path, value| {
        sink.borrow_mut().push((path.to_owned(), value.to_vec()));
    });

    let mut value_change = PropertyBag::new();
    value_change.insert("Value", Value::Variant(Box::new(Value::Bytes(vec![0x10, 0x20]))));

    let mut no_value = PropertyBag::new();
    no_value.insert("Notifying", Value::Bool(true));

    let mut wrong_shape = PropertyBag::new();
    wrong_shape.insert("Value", Value::Str("not bytes".to_owned()));

    state.borrow_mut().signals.push_back(vec![
        Signal {
            path: CHARACTERISTIC.to_owned(),
            interface: GATT_IFACE.to_owned(),
            changed: value_change.clone(),
        },
        Signal {
            path: OTHER_CHARACTERISTIC.to_owned(),
            interface: GATT_IFACE.to_owned(),
            changed: value_change.clone(),
        },
        Signal {
            path: DEVICE.to_owned(),
            interface: DEVICE_IFACE.to_owned(),
            changed: value_change,
        },
        Signal {
            path: CHARACTERISTIC.to_owned(),
            interface: GATT_IFACE.to_owned(),
            changed: no_value,
        },
        Signal {
            path: CHARACTERISTIC.to_owned(),
            interface: GATT_IFACE.to_owned(),
            changed: wrong_shape,
        },
    ]);

    assert_eq!(session.pump(Duration::from_millis(10)), 1);
    assert_eq!(*received.borrow(), vec![(CHARACTERISTIC.to_owned(), vec![0x10, 0x20])]);
}

#[test]
fn pump_without_handler_dispatches_nothing() {
    let (mut session, state) = fixture_session();
    session.start_notify(CHARACTERISTIC).unwrap();

    let mut value_change = PropertyBag::new();
    value_change.insert("Value", Value::Bytes(vec![1]));
    state.borrow_mut().signals.push_back(vec![Signal {
        path: CHARACTERISTIC.to_owned(),
        interface: GATT_IFACE.to_owned(),
        changed: value_change,
    }]);

    assert_eq!(session.pump(Duration::from_millis(10)), 0);
}

#[test]
fn refresh_overwrites_device_state() {
    let (mut session, state) = fixture_session();
    session.discover_once();
    {
        let mut state = state.borrow_mut();
        state.set_prop(DEVICE, DEVICE_IFACE, "Address", Value::Str("AA:BB:CC:DD:EE:FF".to_owned()));
        state.set_prop(DEVICE, DEVICE_IFACE, "Name", Value::Str("renamed".to_owned()));
        state.set_prop(DEVICE, DEVICE_IFACE, "Connected", Value::Bool(true));
        state.set_prop(DEVICE, DEVICE_IFACE, "UUIDs", Value::Strings(vec![HEART_RATE.to_owned()]));
        state.set_prop(OTHER_DEVICE, DEVICE_IFACE, "Address", Value::Str("11:22:33:44:55:66".to_owned()));
        state.set_prop(OTHER_DEVICE, DEVICE_IFACE, "Name", Value::Str("strap".to_owned()));
        state.set_prop(OTHER_DEVICE, DEVICE_IFACE, "Connected", Value::Bool(false));
        state.set_prop(OTHER_DEVICE, DEVICE_IFACE, "UUIDs", Value::Str("bogus".to_owned()));
    }

    session.refresh_devices();

    let device = session.device(DEVICE).unwrap();
    assert_eq!(device.name, "renamed");
    assert!(device.connected);
    assert_eq!(device.services, vec![HEART_RATE.to_owned()]);

    // A mis-shaped service list keeps the previous one.
    let other = session.device(OTHER_DEVICE).unwrap();
    assert_eq!(other.name, "strap");
    assert_eq!(other.services, vec![HEART_RATE.to_owned()]);
}

#[test]
fn establish_walks_the_state_machine() {
    let (mut bus, state) = StubBus::new();
    let slept = Rc::new(RefCell::new(Vec::new()));
    let mut clock = ManualClock {
        now: Instant::now(),
        slept: slept.clone(),
    };
    let naming = Naming::default();
    let policy = PollPolicy {
        attempts: 2,
        interval: Duration::from_millis(100),
    };

    state.borrow_mut().confirm_after.insert(DEVICE.to_owned(), 0);
    assert_eq!(
        establish(&mut bus, &naming, DEVICE, &policy, &mut clock),
        ConnectionState::Connected
    );

    state.borrow_mut().reject.insert("Connect".to_owned());
    assert_eq!(
        establish(&mut bus, &naming, DEVICE, &policy, &mut clock),
        ConnectionState::Failed
    );
}
