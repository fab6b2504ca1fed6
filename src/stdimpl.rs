//! The standard interfaces every object path gets: Properties, Introspectable and Peer,
//! ObjectManager on paths registered as object managers, and routing of incoming
//! method calls to the objects at a path.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::arg::{Append, Arg, ArgError, ArgType, Get, Iter, IterAppend, MessageItem, Variant};
use crate::bus::{Lookup, ObjectEntry};
use crate::strings::{Path, Signature};
use crate::vtable::{IfaceBuilder, IfaceDesc};
use crate::{Message, MessageType, MethodErr};

pub const PROPERTIES: &str = "org.freedesktop.DBus.Properties";
pub const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";
pub const PEER: &str = "org.freedesktop.DBus.Peer";
pub const OBJECT_MANAGER: &str = "org.freedesktop.DBus.ObjectManager";

/// Property name to value, in a fixed order. Travels as `a{sv}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropMap(pub Vec<(String, MessageItem)>);

impl Arg for PropMap {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> { Signature::from_static("a{sv}") }
}

impl Append for PropMap {
    fn append_by_ref(&self, ia: &mut IterAppend) {
        let items = self.0.iter()
            .map(|(k, v)| (MessageItem::Str(k.clone()), MessageItem::Variant(Box::new(v.clone()))))
            .collect();
        ia.push(MessageItem::Dict { key_sig: Signature::from_static("s"), value_sig: Signature::from_static("v"), items });
    }
}

impl<'a> Get<'a> for PropMap {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        dict_items(i, "s", "v")?.iter().map(|(k, v)| -> Result<_, ArgError> {
            let Variant(v): Variant<MessageItem> = v.inner()?;
            Ok((k.inner::<String>()?, v))
        }).collect::<Result<Vec<_>, _>>().map(PropMap)
    }
}

impl PropMap {
    /// Looks up a property value by name.
    pub fn get(&self, name: &str) -> Option<&MessageItem> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

fn dict_items<'a>(i: &mut Iter<'a>, key: &str, value: &str) -> Result<&'a [(MessageItem, MessageItem)], ArgError> {
    match i.current() {
        Some(MessageItem::Dict { key_sig, value_sig, items }) if &**key_sig == key && &**value_sig == value => Ok(items.as_slice()),
        _ => Err(i.mismatch(ArgType::Array)),
    }
}

/// Interface name to its properties. Travels as `a{sa{sv}}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IfaceMap(pub Vec<(String, PropMap)>);

impl Arg for IfaceMap {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> { Signature::from_static("a{sa{sv}}") }
}

impl Append for IfaceMap {
    fn append_by_ref(&self, ia: &mut IterAppend) {
        let items = self.0.iter().map(|(k, v)| (MessageItem::Str(k.clone()), MessageItem::from_arg(v))).collect();
        ia.push(MessageItem::Dict { key_sig: Signature::from_static("s"), value_sig: PropMap::signature(), items });
    }
}

impl<'a> Get<'a> for IfaceMap {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        dict_items(i, "s", "a{sv}")?.iter()
            .map(|(k, v)| -> Result<_, ArgError> { Ok((k.inner::<String>()?, v.inner::<PropMap>()?)) })
            .collect::<Result<Vec<_>, ArgError>>().map(IfaceMap)
    }
}

impl IfaceMap {
    /// Looks up the properties of an interface.
    pub fn get(&self, interface: &str) -> Option<&PropMap> {
        self.0.iter().find(|(k, _)| k == interface).map(|(_, v)| v)
    }
}

/// The reply of `GetManagedObjects`: object path to its interfaces. Travels as `a{oa{sa{sv}}}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManagedObjects(pub Vec<(Path<'static>, IfaceMap)>);

impl Arg for ManagedObjects {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> { Signature::from_static("a{oa{sa{sv}}}") }
}

impl Append for ManagedObjects {
    fn append_by_ref(&self, ia: &mut IterAppend) {
        let items = self.0.iter().map(|(k, v)| (MessageItem::ObjectPath(k.clone()), MessageItem::from_arg(v))).collect();
        ia.push(MessageItem::Dict { key_sig: Signature::from_static("o"), value_sig: IfaceMap::signature(), items });
    }
}

impl<'a> Get<'a> for ManagedObjects {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        dict_items(i, "o", "a{sa{sv}}")?.iter()
            .map(|(k, v)| -> Result<_, ArgError> { Ok((k.inner::<Path>()?.into_static(), v.inner::<IfaceMap>()?)) })
            .collect::<Result<Vec<_>, ArgError>>().map(ManagedObjects)
    }
}

impl ManagedObjects {
    /// Looks up the interfaces of an object.
    pub fn get(&self, path: &str) -> Option<&IfaceMap> {
        self.0.iter().find(|(k, _)| k.as_str() == path).map(|(_, v)| v)
    }
}

/// The interfaces and properties of `entries`, as announced by an object manager.
pub(crate) fn iface_map(entries: &[Arc<dyn ObjectEntry>]) -> Result<IfaceMap, MethodErr> {
    entries.iter()
        .map(|e| -> Result<_, MethodErr> { Ok((e.interface().to_string(), PropMap(e.get_all()?))) })
        .collect::<Result<_, _>>().map(IfaceMap)
}

/// Everything registered at one object path, for the duration of one dispatch.
pub(crate) struct PathCtx {
    path: Path<'static>,
    entries: Vec<Arc<dyn ObjectEntry>>,
    children: Vec<String>,
    managed: Option<Vec<(Path<'static>, Vec<Arc<dyn ObjectEntry>>)>>,
}

impl PathCtx {
    fn entry(&self, iface: &str) -> Result<&Arc<dyn ObjectEntry>, MethodErr> {
        self.entries.iter().find(|e| e.interface().as_str() == iface).ok_or_else(|| MethodErr::no_interface(iface))
    }

    fn managed_objects(&self) -> Result<ManagedObjects, MethodErr> {
        let managed = self.managed.as_ref().ok_or_else(|| MethodErr::no_interface(OBJECT_MANAGER))?;
        managed.iter()
            .map(|(p, entries)| -> Result<_, MethodErr> { Ok((p.clone(), iface_map(entries)?)) })
            .collect::<Result<_, _>>().map(ManagedObjects)
    }

    /// The standard interfaces served at this path.
    fn std_list(&self) -> Vec<&'static IfaceDesc<PathCtx>> {
        let si = std_ifaces();
        let mut v = if self.entries.is_empty() { vec!(&si.introspectable) }
            else { vec!(&si.properties, &si.introspectable, &si.peer) };
        if self.managed.is_some() { v.push(&si.object_manager) }
        v
    }

    fn introspect(&self) -> String {
        let mut ifaces: Vec<(&str, String)> = self.entries.iter()
            .map(|e| (e.interface().as_str(), e.introspect("  ")))
            .collect();
        for d in self.std_list() {
            ifaces.push((d.name().as_str(), d.introspect("  ")));
        }
        ifaces.sort_by(|a, b| a.0.cmp(b.0));
        let ifacestr: String = ifaces.into_iter().map(|(_, x)| x).collect();
        let childstr = self.children.iter().fold(String::new(), |na, n| format!("{}  <node name=\"{}\"/>\n", na, n));
        format!(r##"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN" "http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">
<node name="{}">
{}{}</node>"##, self.path, ifacestr, childstr)
    }
}

struct StdIfaces {
    properties: IfaceDesc<PathCtx>,
    introspectable: IfaceDesc<PathCtx>,
    peer: IfaceDesc<PathCtx>,
    object_manager: IfaceDesc<PathCtx>,
}

fn std_ifaces() -> &'static StdIfaces {
    static STD: OnceLock<StdIfaces> = OnceLock::new();
    STD.get_or_init(|| StdIfaces {
        properties: IfaceDesc::new(PROPERTIES, |b: &mut IfaceBuilder<PathCtx>| {
            b.method("Get", ("interface_name", "property_name"), ("value",),
                |_, p: &mut PathCtx, (iface, prop): (String, String)| {
                Ok((Variant(p.entry(&iface)?.get_property(&prop)?),))
            });
            b.method("GetAll", ("interface_name",), ("props",), |_, p: &mut PathCtx, (iface,): (String,)| {
                Ok((PropMap(p.entry(&iface)?.get_all()?),))
            });
            b.method("Set", ("interface_name", "property_name", "value"), (),
                |_, p: &mut PathCtx, (iface, prop, Variant(value)): (String, String, Variant<MessageItem>)| {
                p.entry(&iface)?.set_property(&prop, &value)
            });
            b.signal::<(String, PropMap, Vec<String>), _>("PropertiesChanged",
                ("interface_name", "changed_properties", "invalidated_properties"));
        }),
        introspectable: IfaceDesc::new(INTROSPECTABLE, |b: &mut IfaceBuilder<PathCtx>| {
            b.method("Introspect", (), ("xml_data",), |_, p: &mut PathCtx, _: ()| Ok((p.introspect(),)));
        }),
        peer: IfaceDesc::new(PEER, |b: &mut IfaceBuilder<PathCtx>| {
            b.method("Ping", (), (), |_, _: &mut PathCtx, _: ()| Ok(()));
            b.method("GetMachineId", (), ("machine_uuid",), |_, _: &mut PathCtx, _: ()| {
                let id = std::fs::read_to_string("/etc/machine-id").map_err(|e| MethodErr::failed(&e))?;
                Ok((id.trim().to_string(),))
            });
        }),
        object_manager: IfaceDesc::new(OBJECT_MANAGER, |b: &mut IfaceBuilder<PathCtx>| {
            b.method("GetManagedObjects", (), ("object_paths_interfaces_and_properties",),
                |_, p: &mut PathCtx, _: ()| Ok((p.managed_objects()?,)));
            b.signal::<(Path<'static>, IfaceMap), _>("InterfacesAdded", ("object_path", "interfaces_and_properties"));
            b.signal::<(Path<'static>, Vec<String>), _>("InterfacesRemoved", ("object_path", "interfaces"));
        }),
    })
}

/// Routes a method call to the objects registered at its path, and returns the reply
/// to send (an error reply if the call failed), or None if the caller asked for no reply.
///
/// `found` is what the bus has registered at the path of `msg`.
pub fn dispatch(msg: &Message, found: Lookup) -> Option<Message> {
    if msg.msg_type() != MessageType::MethodCall { return None }
    let r = route(msg, found);
    if msg.get_no_reply() { return None }
    Some(r.unwrap_or_else(|e| e.to_message(msg)))
}

fn route(msg: &Message, found: Lookup) -> Result<Message, MethodErr> {
    let path = msg.path().ok_or_else(|| MethodErr::no_path(""))?.into_static();
    let member = msg.member().ok_or_else(|| MethodErr::no_method(""))?;
    if found.is_empty() { return Err(MethodErr::no_path(&path)) }
    debug!(path = %path, interface = ?msg.interface().as_deref(), member = %member, "routing method call");

    let Lookup { entries, children, managed } = found;
    let mut ctx = PathCtx { path, entries, children, managed };
    let std_list = ctx.std_list();

    match msg.interface() {
        Some(iface) => {
            if let Some(d) = std_list.iter().find(|d| d.name().as_str() == iface.as_str()) {
                return d.call_method(&mut ctx, msg);
            }
            ctx.entry(&iface)?.call_method(msg)
        }
        None => {
            if let Some(e) = ctx.entries.iter().find(|e| e.has_method(&member)) {
                return e.call_method(msg);
            }
            match std_list.iter().find(|d| d.method(&member).is_some()) {
                Some(d) => d.call_method(&mut ctx, msg),
                None => Err(MethodErr::no_method(&member)),
            }
        }
    }
}

#[test]
fn propmap_signature() {
    let p = PropMap(vec!(("LastResult".into(), MessageItem::Int64(0)), ("Status".into(), MessageItem::Str("x".into()))));
    let item = MessageItem::from_arg(&p);
    assert_eq!(&*item.signature(), "a{sv}");
    assert_eq!(item.inner::<PropMap>(), Ok(p));
}

#[test]
fn std_signature_tables() {
    let s = std_ifaces();
    let get = s.properties.method("Get").unwrap();
    assert_eq!((&*get.input_signature(), &*get.output_signature()), ("ss", "v"));
    let set = s.properties.method("Set").unwrap();
    assert_eq!((&*set.input_signature(), &*set.output_signature()), ("ssv", ""));
    assert_eq!(&*s.properties.signal("PropertiesChanged").unwrap().signature(), "sa{sv}as");
    assert_eq!(&*s.introspectable.method("Introspect").unwrap().output_signature(), "s");
    let gmo = s.object_manager.method("GetManagedObjects").unwrap();
    assert_eq!(&*gmo.output_signature(), "a{oa{sa{sv}}}");
    assert_eq!(&*s.object_manager.signal("InterfacesAdded").unwrap().signature(), "oa{sa{sv}}");
    assert_eq!(&*s.object_manager.signal("InterfacesRemoved").unwrap().signature(), "oas");
}

#[test]
fn managed_objects_nest() {
    let props = PropMap(vec!(("LastResult".into(), MessageItem::Int64(7))));
    let m = ManagedObjects(vec!(("/calc".into(), IfaceMap(vec!(("net.poettering.Calculator".into(), props.clone()))))));
    let item = MessageItem::from_arg(&m);
    assert_eq!(&*item.signature(), "a{oa{sa{sv}}}");
    let back: ManagedObjects = item.inner().unwrap();
    assert_eq!(back.get("/calc").and_then(|i| i.get("net.poettering.Calculator")), Some(&props));
    assert!(MessageItem::from_arg(&props).inner::<IfaceMap>().is_err());
}
