use std::sync::Arc;

use calculator::*;
use sdbus_vtable::arg::MessageItem;
use sdbus_vtable::{Bus, IfaceDesc, LocalBus, Message, MessageType, PropMap, Server, SignalArgs, WireEnum};

const PATH: &str = "/calc";

fn setup() -> (Arc<LocalBus>, Server<SimpleCalculator>) {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer().try_init();
    let bus = LocalBus::new();
    let desc = Arc::new(register_net_poettering_calculator::<SimpleCalculator>());
    let server = new_net_poettering_calculator(bus.clone(), PATH.into(), desc,
        vec!(("Status".to_string(), PropertiesVariant::State(State::Success))), SimpleCalculator::new).unwrap();
    (bus, server)
}

fn call(member: &str) -> Message {
    Message::new_method_call("net.poettering.Calculator", PATH, INTERFACE, member).unwrap()
}

fn properties_changed(msgs: &[Message]) -> Vec<PropMap> {
    msgs.iter()
        .filter(|m| m.msg_type() == MessageType::Signal && m.member().as_deref() == Some("PropertiesChanged"))
        .map(|m| {
            let (iface, changed, _): (String, PropMap, Vec<String>) = m.read_all().unwrap();
            assert_eq!(iface, INTERFACE);
            changed
        })
        .collect()
}

#[test]
fn end_to_end() {
    let (bus, server) = setup();
    assert_eq!(server.with(|c| c.status()), State::Success);
    bus.take_sent();

    let err = bus.call(call("Divide").append2(10i64, 0i64)).unwrap_err();
    assert_eq!(err.name(), Some("net.poettering.Calculator.Error.DivisionByZero"));
    match err {
        sdbus_vtable::Error::Dbus(e) => assert_eq!(e.description(), "An attempt to divide by zero was attempted."),
        e => panic!("unexpected {:?}", e),
    }
    assert_eq!(server.with(|c| c.status()), State::Error);
    bus.take_sent();

    let reply = bus.call(call("Multiply").append2(6i64, 7i64)).unwrap();
    assert_eq!(reply.read1::<i64>(), Ok(42));
    bus.take_sent();

    bus.call(call("Clear")).unwrap();
    let sent = bus.take_sent();
    let cleared: Vec<_> = sent.iter().filter_map(NetPoetteringCalculatorCleared::from_message).collect();
    assert_eq!(cleared, vec!(NetPoetteringCalculatorCleared { unnamed: 42 }));
    let changed = properties_changed(&sent);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].get("LastResult"), Some(&MessageItem::Int64(0)));

    assert_eq!(server.get_property_by_name("LastResult").unwrap(), MessageItem::Int64(0));
}

#[test]
fn signature_table() {
    let desc: IfaceDesc<SimpleCalculator> = register_net_poettering_calculator();
    let methods: Vec<_> = desc.methods()
        .map(|m| (m.name().to_string(), m.input_signature().to_string(), m.output_signature().to_string()))
        .collect();
    assert_eq!(methods, vec!(
        ("Multiply".to_string(), "xx".to_string(), "x".to_string()),
        ("Divide".to_string(), "xx".to_string(), "x".to_string()),
        ("Clear".to_string(), "".to_string(), "".to_string()),
    ));
    let signals: Vec<_> = desc.signals().map(|s| (s.name().to_string(), s.signature().to_string())).collect();
    assert_eq!(signals, vec!(("Cleared".to_string(), "x".to_string())));
    let props: Vec<_> = desc.properties()
        .map(|p| (p.name().to_string(), p.signature().to_string(), p.access(), p.emits_changed()))
        .collect();
    use sdbus_vtable::{Access, EmitsChangedSignal};
    assert_eq!(props, vec!(
        ("LastResult".to_string(), "x".to_string(), Access::ReadWrite, EmitsChangedSignal::True),
        ("Status".to_string(), "s".to_string(), Access::ReadWrite, EmitsChangedSignal::True),
    ));
}

#[test]
fn divide_truncates() {
    let (bus, _server) = setup();
    for &(x, y, z) in &[(7i64, 2i64, 3i64), (-7, 2, -3), (7, -2, -3), (0, 5, 0), (i64::MIN, -1, i64::MIN)] {
        let reply = bus.call(call("Divide").append2(x, y)).unwrap();
        assert_eq!(reply.read1::<i64>(), Ok(z), "{} / {}", x, y);
    }
    assert!(bus.take_sent().iter().all(|m| m.msg_type() != MessageType::Error));
}

#[test]
fn multiply_wraps() {
    let (bus, _server) = setup();
    let reply = bus.call(call("Multiply").append2(i64::MAX, 2i64)).unwrap();
    assert_eq!(reply.read1::<i64>(), Ok(-2));
}

#[test]
fn clear_at_zero_does_not_announce_last_result() {
    let (bus, _server) = setup();
    bus.take_sent();
    bus.call(call("Clear")).unwrap();
    let sent = bus.take_sent();
    assert!(properties_changed(&sent).is_empty());
    let cleared: Vec<_> = sent.iter().filter_map(NetPoetteringCalculatorCleared::from_message).collect();
    assert_eq!(cleared, vec!(NetPoetteringCalculatorCleared { unnamed: 0 }));
}

#[test]
fn writes_announce_only_changes() {
    let (bus, server) = setup();
    bus.take_sent();

    assert_eq!(server.with_mut(|c| c.base_mut().set_last_result(5)), 5);
    assert_eq!(properties_changed(&bus.take_sent()).len(), 1);
    assert_eq!(server.with_mut(|c| c.base_mut().set_last_result(5)), 5);
    assert!(properties_changed(&bus.take_sent()).is_empty());

    // The bus writes through the same setter.
    let set = Message::new_method_call("net.poettering.Calculator", PATH, "org.freedesktop.DBus.Properties", "Set")
        .unwrap().append3(INTERFACE, "Status", sdbus_vtable::arg::Variant(State::Error.to_wire_str()));
    bus.call(set.clone()).unwrap();
    let changed = properties_changed(&bus.take_sent());
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].get("Status"), Some(&MessageItem::Str("net.poettering.Calculator.State.Error".into())));
    bus.call(set).unwrap();
    assert!(properties_changed(&bus.take_sent()).is_empty());
}

#[test]
fn invalid_enum_string_is_rejected() {
    let (bus, server) = setup();
    let set = Message::new_method_call("net.poettering.Calculator", PATH, "org.freedesktop.DBus.Properties", "Set")
        .unwrap().append3(INTERFACE, "Status", sdbus_vtable::arg::Variant("net.poettering.Calculator.State.Maybe"));
    let err = bus.call(set).unwrap_err();
    assert_eq!(err.name(), Some(sdbus_vtable::INVALID_ENUM_STRING));
    assert_eq!(server.with(|c| c.status()), State::Success);

    for &(s, v) in State::TABLE {
        assert_eq!(State::from_wire_str(s), Ok(v));
        assert_eq!(State::from_wire_str(v.to_wire_str()), Ok(v));
    }
    assert!(State::from_wire_str("Success").is_err());
}

#[test]
fn malformed_calls_get_error_replies() {
    let (bus, server) = setup();
    for msg in vec!(call("Multiply").append1(6i64), call("Multiply").append2(6i32, 7i32),
        call("Multiply").append3(1i64, 2i64, 3i64), call("Clear").append1("x")) {
        let err = bus.call(msg).unwrap_err();
        assert_eq!(err.name(), Some("org.freedesktop.DBus.Error.InvalidArgs"));
    }
    let err = bus.call(call("Add").append2(1i64, 2i64)).unwrap_err();
    assert_eq!(err.name(), Some("org.freedesktop.DBus.Error.UnknownMethod"));
    assert_eq!(server.with(|c| c.last_result()), 0);
}

#[test]
fn get_all_and_introspect() {
    let (bus, _server) = setup();
    let get_all = Message::new_method_call("net.poettering.Calculator", PATH, "org.freedesktop.DBus.Properties", "GetAll")
        .unwrap().append1(INTERFACE);
    let props: PropMap = bus.call(get_all).unwrap().read1().unwrap();
    assert_eq!(props, PropMap(vec!(
        ("LastResult".into(), MessageItem::Int64(0)),
        ("Status".into(), MessageItem::Str("net.poettering.Calculator.State.Success".into())),
    )));

    let intro = Message::new_method_call("net.poettering.Calculator", PATH, "org.freedesktop.DBus.Introspectable", "Introspect")
        .unwrap();
    let xml: String = bus.call(intro).unwrap().read1().unwrap();
    assert!(xml.contains(r#"<interface name="net.poettering.Calculator">"#));
    assert!(xml.contains(r#"<property name="LastResult" type="x" access="readwrite"/>"#));
    assert!(xml.contains(r#"<signal name="Cleared">"#));
}

#[test]
fn initial_values_apply_in_order() {
    let bus = LocalBus::new();
    let desc = Arc::new(register_net_poettering_calculator::<SimpleCalculator>());
    let vals = vec!(
        ("LastResult".to_string(), PropertiesVariant::Int64(3)),
        ("LastResult".to_string(), PropertiesVariant::Int64(9)),
    );
    let server = new_net_poettering_calculator(bus.clone(), PATH.into(), desc.clone(), vals, SimpleCalculator::new).unwrap();
    assert_eq!(server.with(|c| c.last_result()), 9);
    let changed = properties_changed(&bus.take_sent());
    assert_eq!(changed.iter().map(|c| c.get("LastResult").cloned()).collect::<Vec<_>>(),
        vec!(Some(MessageItem::Int64(3)), Some(MessageItem::Int64(9))));
    drop(server);

    let bad = vec!(("Bogus".to_string(), PropertiesVariant::Int64(1)));
    assert!(new_net_poettering_calculator(bus.clone(), PATH.into(), desc.clone(), bad, SimpleCalculator::new).is_err());
    // The failed object was unregistered again, so the path is free.
    assert!(new_net_poettering_calculator(bus.clone(), PATH.into(), desc, vec!(), SimpleCalculator::new).is_ok());
}

#[test]
fn emitting_through_bus_trait() {
    let (bus, _server) = setup();
    bus.take_sent();
    let b: &dyn Bus = &*bus;
    b.emit_signal(NetPoetteringCalculatorCleared { unnamed: 1 }.to_emit_message(&PATH.into())).unwrap();
    let sent = bus.take_sent();
    assert_eq!(NetPoetteringCalculatorCleared::from_message(&sent[0]), Some(NetPoetteringCalculatorCleared { unnamed: 1 }));
}

#[test]
fn divide_by_zero_fails_for_any_dividend() {
    let (bus, server) = setup();
    for &x in &[0i64, -1, 10, i64::MIN, i64::MAX] {
        match bus.call(call("Divide").append2(x, 0i64)) {
            Err(sdbus_vtable::Error::Dbus(e)) => {
                assert_eq!(&**e.errorname(), "net.poettering.Calculator.Error.DivisionByZero", "{} / 0", x);
                assert_eq!(e.description(), "An attempt to divide by zero was attempted.");
            }
            r => panic!("{} / 0 gave {:?}", x, r),
        }
        assert_eq!(server.with(|c| c.status()), State::Error);
        assert_eq!(server.with(|c| c.last_result()), 0);
    }
}

#[test]
fn announced_to_object_manager() {
    let bus = LocalBus::new();
    let _manager = sdbus_vtable::ObjectManager::new(bus.clone(), "/".into()).unwrap();
    let desc = Arc::new(register_net_poettering_calculator::<SimpleCalculator>());
    let vals = vec!(("LastResult".to_string(), PropertiesVariant::Int64(12)));
    let server = new_net_poettering_calculator(bus.clone(), PATH.into(), desc, vals, SimpleCalculator::new).unwrap();

    let sent = bus.take_sent();
    let added = sent.iter().find(|m| m.member().as_deref() == Some("InterfacesAdded")).unwrap();
    assert_eq!(added.path().as_deref(), Some("/"));
    let (path, ifaces): (sdbus_vtable::Path, sdbus_vtable::IfaceMap) = added.read_all().unwrap();
    assert_eq!(&*path, PATH);
    assert_eq!(ifaces.get(INTERFACE).and_then(|p| p.get("LastResult")), Some(&MessageItem::Int64(12)));

    let get = Message::new_method_call("net.poettering.Calculator", "/", "org.freedesktop.DBus.ObjectManager",
        "GetManagedObjects").unwrap();
    let objs: sdbus_vtable::ManagedObjects = bus.call(get).unwrap().read1().unwrap();
    let props = objs.get(PATH).and_then(|i| i.get(INTERFACE)).unwrap();
    assert_eq!(props.get("Status"), Some(&MessageItem::Str("net.poettering.Calculator.State.Success".into())));

    bus.take_sent();
    drop(server);
    let sent = bus.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].member().as_deref(), Some("InterfacesRemoved"));
}
