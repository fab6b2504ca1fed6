//! What the binding layer needs from a bus connection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use crate::arg::MessageItem;
use crate::stdimpl::{IfaceMap, PropMap, OBJECT_MANAGER};
use crate::strings::{Interface, Member, Path};
use crate::{Error, Message, MethodErr};

/// Handle for one registration, returned by `Bus::add_object`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

/// A registered object, as seen by the bus: one interface implemented at one path.
///
/// The bus only holds a `Weak` reference, so it never keeps an object alive, and a
/// dispatch that races with deregistration finds nothing instead of a dangling object.
pub trait ObjectEntry: Send + Sync {
    /// The interface this object implements.
    fn interface(&self) -> &Interface<'static>;
    /// True if the interface has a method of this name.
    fn has_method(&self, name: &str) -> bool;
    /// Runs a method call and returns the reply.
    fn call_method(&self, msg: &Message) -> Result<Message, MethodErr>;
    /// Reads a property.
    fn get_property(&self, name: &str) -> Result<MessageItem, MethodErr>;
    /// Writes a property; `value` is not wrapped in a variant.
    fn set_property(&self, name: &str, value: &MessageItem) -> Result<(), MethodErr>;
    /// Reads all readable properties.
    fn get_all(&self) -> Result<Vec<(String, MessageItem)>, MethodErr>;
    /// Introspection XML of the interface.
    fn introspect(&self, indent: &str) -> String;
}

/// A bus connection that objects can be registered on.
///
/// Incoming traffic is dispatched by the implementation; one message is handled to
/// completion before the next one on the same connection.
pub trait Bus: Send + Sync {
    /// Registers `entry` at `path`. Fails if something already implements the same
    /// interface there.
    fn add_object(&self, path: &Path<'static>, entry: Weak<dyn ObjectEntry>) -> Result<SlotId, Error>;

    /// Revokes a registration. Unknown slots are ignored.
    fn remove_object(&self, slot: SlotId);

    /// Makes `path` an `org.freedesktop.DBus.ObjectManager` for the objects below it.
    fn add_object_manager(&self, path: &Path<'static>) -> Result<(), Error>;

    /// Stops serving the object manager at `path`. Unknown paths are ignored.
    fn remove_object_manager(&self, path: &Path<'static>);

    /// The closest object manager above `path`, if any.
    fn object_manager_for(&self, path: &Path) -> Option<Path<'static>>;

    /// Sends a message (reply, error or signal) and returns its serial.
    fn send(&self, msg: Message) -> Result<u32, Error>;

    /// Broadcasts a signal.
    fn emit_signal(&self, msg: Message) -> Result<u32, Error> { self.send(msg) }

    /// Broadcasts `org.freedesktop.DBus.Properties.PropertiesChanged`.
    fn emit_properties_changed(&self, path: &Path, interface: &Interface, changed: Vec<(String, MessageItem)>,
        invalidated: Vec<String>) -> Result<u32, Error> {
        let msg = Message::signal(path, &Interface::from("org.freedesktop.DBus.Properties"), &Member::from("PropertiesChanged"))
            .append3(interface.as_str(), PropMap(changed), invalidated);
        self.emit_signal(msg)
    }

    /// Broadcasts `InterfacesAdded` from the object manager at `manager`.
    fn emit_interfaces_added(&self, manager: &Path, path: &Path, interfaces: IfaceMap) -> Result<u32, Error> {
        let msg = Message::signal(manager, &Interface::from(OBJECT_MANAGER), &Member::from("InterfacesAdded"))
            .append2(path.clone(), interfaces);
        self.emit_signal(msg)
    }

    /// Broadcasts `InterfacesRemoved` from the object manager at `manager`.
    fn emit_interfaces_removed(&self, manager: &Path, path: &Path, interfaces: Vec<String>) -> Result<u32, Error> {
        let msg = Message::signal(manager, &Interface::from(OBJECT_MANAGER), &Member::from("InterfacesRemoved"))
            .append2(path.clone(), interfaces);
        self.emit_signal(msg)
    }
}

/// Everything registered at one object path, collected for one dispatch.
#[derive(Default)]
pub struct Lookup {
    /// The live objects at the path, in registration order.
    pub entries: Vec<Arc<dyn ObjectEntry>>,
    /// Names of the nodes directly below the path.
    pub children: Vec<String>,
    /// If the path is an object manager: the objects it manages, by path.
    pub managed: Option<Vec<(Path<'static>, Vec<Arc<dyn ObjectEntry>>)>>,
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Lookup").field("entries", &self.entries.len()).field("children", &self.children)
            .field("managed", &self.managed.as_ref().map(|m| m.len())).finish()
    }
}

impl Lookup {
    /// True if nothing at all is served at the path.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.children.is_empty() && self.managed.is_none()
    }
}

/// True if `path` is strictly below `parent`.
fn is_below(path: &str, parent: &str) -> bool {
    if parent == "/" { return path != "/" }
    path.strip_prefix(parent).map_or(false, |rest| rest.starts_with('/'))
}

/// Bookkeeping of registrations, shared by the bus implementations.
#[derive(Default)]
pub(crate) struct Registry {
    next_slot: u64,
    objects: BTreeMap<SlotId, (Path<'static>, Weak<dyn ObjectEntry>)>,
    managers: BTreeSet<Path<'static>>,
}

impl Registry {
    pub fn add(&mut self, path: &Path<'static>, entry: Weak<dyn ObjectEntry>) -> Result<SlotId, Error> {
        let new = entry.upgrade().ok_or(Error::Bus { call: "add_object", message: "object already dropped".into() })?;
        self.objects.retain(|_, (_, w)| w.strong_count() > 0);
        let taken = self.lookup_entries(path).iter().any(|e| e.interface() == new.interface());
        if taken {
            return Err(Error::AlreadyRegistered { path: path.to_string(), interface: new.interface().to_string() });
        }
        self.next_slot += 1;
        let slot = SlotId(self.next_slot);
        self.objects.insert(slot, (path.clone(), entry));
        Ok(slot)
    }

    /// Returns the path the slot was registered at.
    pub fn remove(&mut self, slot: SlotId) -> Option<Path<'static>> {
        self.objects.remove(&slot).map(|(p, _)| p)
    }

    pub fn len(&self) -> usize { self.objects.len() }

    pub fn add_manager(&mut self, path: &Path<'static>) -> Result<(), Error> {
        if !self.managers.insert(path.clone()) {
            return Err(Error::AlreadyRegistered { path: path.to_string(), interface: OBJECT_MANAGER.into() });
        }
        Ok(())
    }

    pub fn remove_manager(&mut self, path: &str) -> bool {
        let before = self.managers.len();
        self.managers.retain(|m| m.as_str() != path);
        self.managers.len() != before
    }

    pub fn manager_for(&self, path: &str) -> Option<Path<'static>> {
        self.managers.iter().filter(|m| is_below(path, m)).max_by_key(|m| m.len()).cloned()
    }

    /// True if anything (an object or an object manager) is served at `path`.
    #[cfg_attr(not(feature = "sd-bus"), allow(dead_code))]
    pub fn contains_path(&self, path: &str) -> bool {
        self.objects.values().any(|(p, _)| p.as_str() == path) || self.managers.iter().any(|m| m.as_str() == path)
    }

    fn lookup_entries(&self, path: &str) -> Vec<Arc<dyn ObjectEntry>> {
        self.objects.values()
            .filter(|(p, _)| p.as_str() == path)
            .filter_map(|(_, w)| w.upgrade())
            .collect()
    }

    /// The live objects at `path`, the names of the nodes directly below it, and the
    /// managed objects if `path` is an object manager.
    pub fn lookup(&self, path: &str) -> Lookup {
        let prefix = if path == "/" { String::from("/") } else { format!("{}/", path) };
        let mut children: Vec<String> = self.objects.values()
            .filter(|(_, w)| w.strong_count() > 0)
            .filter_map(|(p, _)| p.as_str().strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        children.sort();
        children.dedup();
        let managed = if self.managers.iter().any(|m| m.as_str() == path) {
            let mut by_path: BTreeMap<Path<'static>, Vec<Arc<dyn ObjectEntry>>> = BTreeMap::new();
            for (p, w) in self.objects.values() {
                if self.manager_for(p).as_deref() != Some(path) { continue }
                if let Some(e) = w.upgrade() { by_path.entry(p.clone()).or_default().push(e) }
            }
            Some(by_path.into_iter().collect())
        } else { None };
        Lookup { entries: self.lookup_entries(path), children, managed }
    }
}

#[test]
fn managers_cover_paths_below() {
    let mut r = Registry::default();
    r.add_manager(&"/".into()).unwrap();
    r.add_manager(&"/net/calc".into()).unwrap();
    assert!(r.add_manager(&"/net/calc".into()).is_err());
    assert_eq!(r.manager_for("/"), None);
    assert_eq!(r.manager_for("/net").as_deref(), Some("/"));
    assert_eq!(r.manager_for("/net/calc").as_deref(), Some("/"));
    assert_eq!(r.manager_for("/net/calc/1").as_deref(), Some("/net/calc"));
    assert_eq!(r.manager_for("/net/calculator").as_deref(), Some("/"));
    assert!(r.contains_path("/net/calc"));
    assert!(r.remove_manager("/net/calc"));
    assert!(!r.remove_manager("/net/calc"));
    assert_eq!(r.manager_for("/net/calc/1").as_deref(), Some("/"));
}
