//! Live objects: one instance of `T` exported at one path, for one interface.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, trace, warn};

use crate::arg::{Append, AppendAll, MessageItem};
use crate::stdimpl::iface_map;
use crate::bus::{Bus, ObjectEntry, SlotId};
use crate::strings::{Interface, Member, Path};
use crate::vtable::{EmitsChangedSignal, IfaceDesc};
use crate::{Error, Message, MethodErr, SignalArgs};

/// The notification channel of one live object.
///
/// Handed to the object when it is created, so that its own code (property setters,
/// method handlers, timers) can broadcast signals and property changes.
#[derive(Clone)]
pub struct Emitter {
    bus: Arc<dyn Bus>,
    path: Path<'static>,
    interface: Interface<'static>,
    flags: Arc<Vec<(Member<'static>, EmitsChangedSignal)>>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Emitter").field("path", &self.path).field("interface", &self.interface).finish()
    }
}

impl Emitter {
    fn new<T>(bus: Arc<dyn Bus>, path: Path<'static>, desc: &IfaceDesc<T>) -> Emitter {
        let flags = desc.properties().map(|p| (p.name().clone(), p.emits_changed())).collect();
        Emitter { bus, path, interface: desc.name().clone(), flags: Arc::new(flags) }
    }

    pub fn path(&self) -> &Path<'static> { &self.path }

    pub fn interface(&self) -> &Interface<'static> { &self.interface }

    /// Announces that property `name` now has `value`.
    ///
    /// Depending on how the property was declared, this sends the value, only the name
    /// (invalidation), or nothing at all. Send failures are logged, not returned.
    pub fn property_changed<V: Append + ?Sized>(&self, name: &str, value: &V) {
        let emits = match self.flags.iter().find(|(n, _)| n.as_str() == name) {
            Some((_, e)) => *e,
            None => {
                warn!(path = %self.path, interface = %self.interface, property = name, "change notification for undeclared property");
                return;
            }
        };
        let (changed, invalidated) = match emits {
            EmitsChangedSignal::True => (vec!((name.to_string(), MessageItem::from_arg(value))), vec!()),
            EmitsChangedSignal::Invalidates => (vec!(), vec!(name.to_string())),
            EmitsChangedSignal::Const | EmitsChangedSignal::False => return,
        };
        trace!(path = %self.path, interface = %self.interface, property = name, "property changed");
        if let Err(e) = self.bus.emit_properties_changed(&self.path, &self.interface, changed, invalidated) {
            warn!(path = %self.path, property = name, error = %e, "could not emit PropertiesChanged");
        }
    }

    /// Broadcasts a signal of this object's interface.
    pub fn emit_signal<A: AppendAll>(&self, name: &str, args: &A) {
        let member = match Member::new(name) {
            Ok(m) => m,
            Err(e) => { warn!(signal = name, error = %e, "not emitting signal"); return }
        };
        let mut msg = Message::signal(&self.path, &self.interface, &member);
        msg.append_all(args);
        self.send(msg, name);
    }

    /// Broadcasts a typed signal, such as one declared next to a generated interface.
    pub fn emit<S: SignalArgs + AppendAll>(&self, s: &S) {
        self.send(s.to_emit_message(&self.path), S::NAME);
    }

    fn send(&self, msg: Message, name: &str) {
        trace!(path = %self.path, interface = %self.interface, signal = name, "emitting signal");
        if let Err(e) = self.bus.emit_signal(msg) {
            warn!(path = %self.path, signal = name, error = %e, "could not emit signal");
        }
    }
}

/// Storage for one property value, with change detection.
#[derive(Debug, Clone)]
pub struct PropertyCell<V> {
    name: &'static str,
    value: V,
}

impl<V: PartialEq + Append> PropertyCell<V> {
    pub fn new(name: &'static str, value: V) -> Self { PropertyCell { name, value } }

    pub fn get(&self) -> &V { &self.value }

    /// Stores `v`. If it differs from the current value, emits exactly one change
    /// notification and returns true; a write of the current value emits nothing.
    pub fn set(&mut self, v: V, emitter: &Emitter) -> bool {
        if self.value == v { return false }
        self.value = v;
        emitter.property_changed(self.name, &self.value);
        true
    }
}

struct Entry<T> {
    desc: Arc<IfaceDesc<T>>,
    path: Path<'static>,
    data: Mutex<T>,
}

impl<T> Entry<T> {
    fn lock(&self) -> MutexGuard<'_, T> {
        // A panicking handler is already turned into an error reply; the data stays usable.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Send + 'static> ObjectEntry for Entry<T> {
    fn interface(&self) -> &Interface<'static> { self.desc.name() }

    fn has_method(&self, name: &str) -> bool { self.desc.method(name).is_some() }

    fn call_method(&self, msg: &Message) -> Result<Message, MethodErr> {
        self.desc.call_method(&mut *self.lock(), msg)
    }

    fn get_property(&self, name: &str) -> Result<MessageItem, MethodErr> {
        self.desc.get_property(&*self.lock(), name)
    }

    fn set_property(&self, name: &str, value: &MessageItem) -> Result<(), MethodErr> {
        self.desc.set_property(&mut *self.lock(), name, value)
    }

    fn get_all(&self) -> Result<Vec<(String, MessageItem)>, MethodErr> {
        self.desc.get_all(&*self.lock())
    }

    fn introspect(&self, indent: &str) -> String { self.desc.introspect(indent) }
}

/// An instance of `T` exported on a bus.
///
/// `T` lives in a heap allocation that does not move for as long as the `Server` exists;
/// the bus only holds a weak handle to it. Dropping the `Server` removes the object
/// from the bus.
///
/// If an object manager is registered above the path, the object is announced with
/// `InterfacesAdded` once it is fully initialized, and with `InterfacesRemoved` when
/// it goes away.
pub struct Server<T: Send + 'static> {
    bus: Arc<dyn Bus>,
    entry: Arc<Entry<T>>,
    slot: SlotId,
    announced: bool,
}

impl<T: Send + 'static> fmt::Debug for Server<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Server").field("path", &self.entry.path).field("interface", self.entry.desc.name())
            .field("slot", &self.slot).finish()
    }
}

impl<T: Send + 'static> Server<T> {
    fn register<F>(bus: Arc<dyn Bus>, path: Path<'static>, desc: Arc<IfaceDesc<T>>, make: F) -> Result<Self, Error>
    where F: FnOnce(Emitter) -> T {
        let emitter = Emitter::new(bus.clone(), path.clone(), &desc);
        let entry = Arc::new(Entry { data: Mutex::new(make(emitter)), desc, path });
        let weak = Arc::downgrade(&entry) as Weak<dyn ObjectEntry>;
        let slot = bus.add_object(&entry.path, weak)?;
        debug!(path = %entry.path, interface = %entry.desc.name(), slot = slot.0, "object registered");
        Ok(Server { bus, entry, slot, announced: false })
    }

    fn announce(&mut self) {
        let manager = match self.bus.object_manager_for(&self.entry.path) { Some(m) => m, None => return };
        self.announced = true;
        let entry = self.entry.clone() as Arc<dyn ObjectEntry>;
        let r = iface_map(&[entry]).map_err(Error::from)
            .and_then(|ifaces| self.bus.emit_interfaces_added(&manager, &self.entry.path, ifaces));
        if let Err(e) = r {
            warn!(path = %self.entry.path, manager = %manager, error = %e, "could not emit InterfacesAdded");
        }
    }

    /// Creates the object with `make` and registers it at `path`.
    pub fn new<F>(bus: Arc<dyn Bus>, path: Path<'static>, desc: Arc<IfaceDesc<T>>, make: F) -> Result<Self, Error>
    where F: FnOnce(Emitter) -> T {
        let mut s = Server::register(bus, path, desc, make)?;
        s.announce();
        Ok(s)
    }

    /// Like `new`, then writes each (property name, value) of `vals` through the property
    /// setters, in the order the iterator yields them. The object is announced to an
    /// object manager only after all of them were applied.
    pub fn with_props<F, I>(bus: Arc<dyn Bus>, path: Path<'static>, desc: Arc<IfaceDesc<T>>, vals: I, make: F) -> Result<Self, Error>
    where F: FnOnce(Emitter) -> T, I: IntoIterator<Item=(String, MessageItem)> {
        let mut s = Server::register(bus, path, desc, make)?;
        for (name, value) in vals {
            s.set_property_by_name(&name, &value)?;
        }
        s.announce();
        Ok(s)
    }

    pub fn path(&self) -> &Path<'static> { &self.entry.path }

    pub fn desc(&self) -> &Arc<IfaceDesc<T>> { &self.entry.desc }

    /// Reads a property the same way a remote `Get` does.
    pub fn get_property_by_name(&self, name: &str) -> Result<MessageItem, Error> {
        Ok(self.entry.get_property(name)?)
    }

    /// Writes a property the same way a remote `Set` does, change notification included.
    pub fn set_property_by_name(&self, name: &str, value: &MessageItem) -> Result<(), Error> {
        Ok(self.entry.set_property(name, value)?)
    }

    /// Runs `f` with shared access to the object.
    pub fn with<R, F: FnOnce(&T) -> R>(&self, f: F) -> R { f(&*self.entry.lock()) }

    /// Runs `f` with exclusive access to the object. Bus dispatch to this object waits
    /// until `f` returns.
    pub fn with_mut<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R { f(&mut *self.entry.lock()) }
}

impl<T: Send + 'static> Drop for Server<T> {
    fn drop(&mut self) {
        self.bus.remove_object(self.slot);
        debug!(path = %self.entry.path, interface = %self.entry.desc.name(), slot = self.slot.0, "object unregistered");
        if !self.announced { return }
        if let Some(manager) = self.bus.object_manager_for(&self.entry.path) {
            let ifaces = vec!(self.entry.desc.name().to_string());
            if let Err(e) = self.bus.emit_interfaces_removed(&manager, &self.entry.path, ifaces) {
                warn!(path = %self.entry.path, manager = %manager, error = %e, "could not emit InterfacesRemoved");
            }
        }
    }
}

/// An `org.freedesktop.DBus.ObjectManager` at a path. Objects registered below it are
/// listed by `GetManagedObjects` and announced with `InterfacesAdded` and
/// `InterfacesRemoved`. Dropping it removes the manager from the bus.
pub struct ObjectManager {
    bus: Arc<dyn Bus>,
    path: Path<'static>,
}

impl fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ObjectManager").field("path", &self.path).finish()
    }
}

impl ObjectManager {
    pub fn new(bus: Arc<dyn Bus>, path: Path<'static>) -> Result<Self, Error> {
        bus.add_object_manager(&path)?;
        debug!(path = %path, "object manager registered");
        Ok(ObjectManager { bus, path })
    }

    pub fn path(&self) -> &Path<'static> { &self.path }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        self.bus.remove_object_manager(&self.path);
        debug!(path = %self.path, "object manager unregistered");
    }
}
