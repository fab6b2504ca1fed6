use std::sync::Arc;

use sdbus_vtable::arg::{MessageItem, Variant};
use sdbus_vtable::{EmitsChangedSignal, Emitter, Error, IfaceBuilder, IfaceDesc, IfaceMap, LocalBus, ManagedObjects,
    Message, MessageType, MethodErr, ObjectManager, PropMap, PropertyCell, Server};

#[derive(Debug)]
struct Counter {
    count: PropertyCell<u32>,
    label: PropertyCell<String>,
    version: u32,
    emitter: Emitter,
}

fn counter_iface() -> IfaceDesc<Counter> {
    IfaceDesc::new("org.example.Counter", |b: &mut IfaceBuilder<Counter>| {
        b.method("Add", ("n",), ("total",), |_, c: &mut Counter, (n,): (u32,)| {
            let total = c.count.get().checked_add(n).ok_or_else(|| MethodErr::invalid_arg(&n))?;
            c.count.set(total, &c.emitter);
            Ok((total,))
        });
        b.method("Boom", (), (), |_, _: &mut Counter, ()| -> Result<(), MethodErr> { panic!("secret detail") });
        b.signal::<(u32,), _>("Overflow", ("n",));
        b.property::<u32, _>("Count").get(|c: &Counter| Ok(*c.count.get()));
        b.property::<String, _>("Label")
            .get(|c: &Counter| Ok(c.label.get().clone()))
            .set(|c: &mut Counter, v: String| {
                if v.is_empty() { return Err(MethodErr::invalid_arg("empty label")) }
                c.label.set(v, &c.emitter);
                Ok(())
            })
            .emits_changed_signal(EmitsChangedSignal::Invalidates);
        b.property::<u32, _>("Version").get(|c: &Counter| Ok(c.version))
            .emits_changed_signal(EmitsChangedSignal::Const);
    })
}

fn new_counter(e: Emitter) -> Counter {
    Counter { count: PropertyCell::new("Count", 0), label: PropertyCell::new("Label", "".into()), version: 2, emitter: e }
}

fn new_bus() -> Arc<LocalBus> {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer().try_init();
    LocalBus::new()
}

fn call(path: &str, iface: &str, member: &str) -> Message {
    Message::new_method_call("org.example", path, iface, member).unwrap()
}

fn signals(bus: &LocalBus) -> Vec<Message> {
    bus.take_sent().into_iter().filter(|m| m.msg_type() == MessageType::Signal).collect()
}

#[test]
fn method_and_properties() {
    let bus = new_bus();
    let s = Server::new(bus.clone(), "/counter".into(), Arc::new(counter_iface()), new_counter).unwrap();

    let r = bus.call(call("/counter", "org.example.Counter", "Add").append1(5u32)).unwrap();
    assert_eq!(r.read1::<u32>(), Ok(5));
    let sig = signals(&bus);
    assert_eq!(sig.len(), 1);
    let (iface, changed, invalidated): (String, PropMap, Vec<String>) = sig[0].read_all().unwrap();
    assert_eq!(iface, "org.example.Counter");
    assert_eq!(changed.get("Count"), Some(&MessageItem::UInt32(5)));
    assert!(invalidated.is_empty());

    let get = call("/counter", "org.freedesktop.DBus.Properties", "Get").append2("org.example.Counter", "Count");
    let r = bus.call(get).unwrap();
    assert_eq!(r.read1::<Variant<u32>>(), Ok(Variant(5)));
    assert_eq!(s.get_property_by_name("Version").unwrap(), MessageItem::UInt32(2));
}

#[test]
fn read_only_is_distinct_from_invalid() {
    let bus = new_bus();
    let _s = Server::new(bus.clone(), "/counter".into(), Arc::new(counter_iface()), new_counter).unwrap();
    let set = |prop: &str, v: MessageItem| call("/counter", "org.freedesktop.DBus.Properties", "Set")
        .append3("org.example.Counter", prop, Variant(v));

    let e = bus.call(set("Count", MessageItem::UInt32(1))).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.PropertyReadOnly"));
    let e = bus.call(set("Label", MessageItem::Str("".into()))).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.InvalidArgs"));
    let e = bus.call(set("Label", MessageItem::UInt32(1))).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.InvalidArgs"));
    let e = bus.call(set("Nope", MessageItem::UInt32(1))).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.UnknownProperty"));
    bus.take_sent();

    bus.call(set("Label", MessageItem::Str("kitchen".into()))).unwrap();
    let sig = signals(&bus);
    let (_, changed, invalidated): (String, PropMap, Vec<String>) = sig[0].read_all().unwrap();
    assert!(changed.0.is_empty());
    assert_eq!(invalidated, vec!("Label".to_string()));
}

#[test]
fn panic_becomes_generic_error() {
    let bus = new_bus();
    let s = Server::new(bus.clone(), "/counter".into(), Arc::new(counter_iface()), new_counter).unwrap();
    match bus.call(call("/counter", "org.example.Counter", "Boom")) {
        Err(Error::Dbus(e)) => {
            assert_eq!(&**e.errorname(), "org.freedesktop.DBus.Error.Failed");
            assert!(!e.description().contains("secret"));
        }
        x => panic!("unexpected {:?}", x),
    }
    // The object is still usable.
    assert_eq!(s.with(|c| *c.count.get()), 0);
    assert!(bus.call(call("/counter", "org.example.Counter", "Add").append1(1u32)).is_ok());
}

#[test]
fn routing_errors() {
    let bus = new_bus();
    let _s = Server::new(bus.clone(), "/a/counter".into(), Arc::new(counter_iface()), new_counter).unwrap();

    let e = bus.call(call("/b", "org.example.Counter", "Add").append1(1u32)).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.UnknownObject"));
    let e = bus.call(call("/a/counter", "org.example.Other", "Add").append1(1u32)).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.UnknownInterface"));

    let mut no_iface = Message::from_parts(MessageType::MethodCall, Some("/a/counter".into()), None,
        Some("Add".into()), vec!(MessageItem::UInt32(3)));
    no_iface.set_destination(Some("org.example".into()));
    assert_eq!(bus.call(no_iface).unwrap().read1::<u32>(), Ok(3));

    let ping = call("/a/counter", "org.freedesktop.DBus.Peer", "Ping");
    assert!(bus.call(ping).unwrap().items().is_empty());

    let intro = call("/", "org.freedesktop.DBus.Introspectable", "Introspect");
    let xml: String = bus.call(intro).unwrap().read1().unwrap();
    assert!(xml.contains("<node name=\"a\"/>"));
    assert!(!xml.contains("org.example.Counter"));
}

#[test]
fn registration_lifetime() {
    let bus = new_bus();
    let desc = Arc::new(counter_iface());
    let s = Server::new(bus.clone(), "/counter".into(), desc.clone(), new_counter).unwrap();
    match Server::new(bus.clone(), "/counter".into(), desc.clone(), new_counter) {
        Err(Error::AlreadyRegistered { path, interface }) => {
            assert_eq!(path, "/counter");
            assert_eq!(interface, "org.example.Counter");
        }
        x => panic!("unexpected {:?}", x),
    }
    drop(s);
    let e = bus.call(call("/counter", "org.example.Counter", "Add").append1(1u32)).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.UnknownObject"));
    assert!(Server::new(bus.clone(), "/counter".into(), desc, new_counter).is_ok());
}

#[test]
fn no_reply_requested() {
    let bus = new_bus();
    let s = Server::new(bus.clone(), "/counter".into(), Arc::new(counter_iface()), new_counter).unwrap();
    let mut m = call("/counter", "org.example.Counter", "Add").append1(4u32);
    m.set_no_reply(true);
    bus.process(m).unwrap();
    assert!(bus.take_sent().iter().all(|m| m.msg_type() == MessageType::Signal));
    assert_eq!(s.with(|c| *c.count.get()), 4);
}

#[test]
fn emitter_signals() {
    let bus = new_bus();
    let s = Server::new(bus.clone(), "/counter".into(), Arc::new(counter_iface()), new_counter).unwrap();
    s.with(|c| {
        c.emitter.emit_signal("Overflow", &(7u32,));
        c.emitter.property_changed("Version", &3u32);
    });
    let sig = signals(&bus);
    assert_eq!(sig.len(), 1);
    assert_eq!(sig[0].member().as_deref(), Some("Overflow"));
    assert_eq!(sig[0].path().as_deref(), Some("/counter"));
    assert_eq!(sig[0].read1::<u32>(), Ok(7));
}

#[test]
fn object_manager_announces_objects() {
    let bus = new_bus();
    let desc = Arc::new(counter_iface());
    let outside = Server::new(bus.clone(), "/other".into(), desc.clone(), new_counter).unwrap();
    let m = ObjectManager::new(bus.clone(), "/counters".into()).unwrap();
    assert!(matches!(ObjectManager::new(bus.clone(), "/counters".into()), Err(Error::AlreadyRegistered { .. })));
    bus.take_sent();

    let vals = vec!(("Label".to_string(), MessageItem::Str("first".into())));
    let s = Server::with_props(bus.clone(), "/counters/1".into(), desc.clone(), vals, new_counter).unwrap();
    let sig = signals(&bus);
    assert_eq!(sig.len(), 2);
    assert_eq!(sig[0].member().as_deref(), Some("PropertiesChanged"));
    assert_eq!(sig[1].path().as_deref(), Some("/counters"));
    assert_eq!(sig[1].interface().as_deref(), Some("org.freedesktop.DBus.ObjectManager"));
    assert_eq!(sig[1].member().as_deref(), Some("InterfacesAdded"));
    let (path, ifaces): (sdbus_vtable::Path, IfaceMap) = sig[1].read_all().unwrap();
    assert_eq!(&*path, "/counters/1");
    let props = ifaces.get("org.example.Counter").unwrap();
    assert_eq!(props.get("Label"), Some(&MessageItem::Str("first".into())));
    assert_eq!(props.get("Count"), Some(&MessageItem::UInt32(0)));

    let _s2 = Server::new(bus.clone(), "/counters/2".into(), desc.clone(), new_counter).unwrap();
    let get = call("/counters", "org.freedesktop.DBus.ObjectManager", "GetManagedObjects");
    let objs: ManagedObjects = bus.call(get).unwrap().read1().unwrap();
    let paths: Vec<&str> = objs.0.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, vec!("/counters/1", "/counters/2"));
    assert!(objs.get("/other").is_none());
    assert!(objs.get("/counters/1").and_then(|i| i.get("org.example.Counter")).is_some());

    let intro = call("/counters", "org.freedesktop.DBus.Introspectable", "Introspect");
    let xml: String = bus.call(intro).unwrap().read1().unwrap();
    assert!(xml.contains(r#"<interface name="org.freedesktop.DBus.ObjectManager">"#));

    bus.take_sent();
    drop(s);
    let sig = signals(&bus);
    assert_eq!(sig.len(), 1);
    assert_eq!(sig[0].member().as_deref(), Some("InterfacesRemoved"));
    let (path, removed): (sdbus_vtable::Path, Vec<String>) = sig[0].read_all().unwrap();
    assert_eq!((&*path, removed), ("/counters/1", vec!("org.example.Counter".to_string())));

    // Objects outside the managed subtree, and failed initializations, are never announced.
    drop(outside);
    let bad = vec!(("Label".to_string(), MessageItem::Str("".into())));
    assert!(Server::with_props(bus.clone(), "/counters/3".into(), desc, bad, new_counter).is_err());
    assert!(signals(&bus).is_empty());

    drop(m);
    let e = bus.call(call("/counters", "org.freedesktop.DBus.ObjectManager", "GetManagedObjects")).unwrap_err();
    assert_eq!(e.name(), Some("org.freedesktop.DBus.Error.UnknownInterface"));
}
