//! A `Bus` backed by a libsystemd sd-bus connection.
//!
//! sd-bus connections are not thread-safe. All calls into an `SdBus`, including signal
//! emission and property writes of objects registered on it, must happen on one thread
//! at a time (usually the thread running `run`).

use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::{io, ptr, time::Duration};

use libc::{c_char, c_int, c_void};
use sdbus_sys as ffi;
use tracing::{debug, warn};

use crate::arg::MessageItem;
use crate::bus::{Bus, ObjectEntry, Registry, SlotId};
use crate::strings::{BusName, Interface, Member, Path, Signature};
use crate::{stdimpl, Error, Message, MessageType, MethodErr};

fn check(call: &'static str, r: c_int) -> Result<c_int, Error> {
    if r < 0 { Err(Error::Bus { call, message: io::Error::from_raw_os_error(-r).to_string() }) } else { Ok(r) }
}

fn cstring(call: &'static str, s: &str) -> Result<CString, Error> {
    CString::new(s).map_err(|e| Error::Bus { call, message: e.to_string() })
}

unsafe fn opt_string(p: *const c_char) -> Option<String> {
    if p.is_null() { None } else { Some(CStr::from_ptr(p).to_string_lossy().into_owned()) }
}

fn registry(r: &Mutex<Registry>) -> MutexGuard<'_, Registry> { r.lock().unwrap_or_else(|e| e.into_inner()) }

/// Userdata of one `sd_bus_add_object` registration. Boxed, and never moved until the
/// slot is released.
struct Node {
    path: Path<'static>,
    registry: Arc<Mutex<Registry>>,
}

struct Slot {
    slot: *mut ffi::sd_bus_slot,
    _node: Box<Node>,
}

/// A connection to the session or system bus through sd-bus.
pub struct SdBus {
    conn: *mut ffi::sd_bus,
    registry: Arc<Mutex<Registry>>,
    slots: Mutex<BTreeMap<Path<'static>, Slot>>,
}

// The connection is only touched by whoever drives it, see the module documentation.
unsafe impl Send for SdBus {}
unsafe impl Sync for SdBus {}

impl std::fmt::Debug for SdBus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SdBus").field("conn", &self.conn).finish()
    }
}

impl SdBus {
    fn open(call: &'static str, f: unsafe extern "C" fn(*mut *mut ffi::sd_bus) -> c_int) -> Result<Arc<SdBus>, Error> {
        let mut conn = ptr::null_mut();
        check(call, unsafe { f(&mut conn) })?;
        Ok(Arc::new(SdBus { conn, registry: Default::default(), slots: Default::default() }))
    }

    /// Connects to the session bus of the current user.
    pub fn open_user() -> Result<Arc<SdBus>, Error> { SdBus::open("sd_bus_open_user", ffi::sd_bus_open_user) }

    /// Connects to the system bus.
    pub fn open_system() -> Result<Arc<SdBus>, Error> { SdBus::open("sd_bus_open_system", ffi::sd_bus_open_system) }

    /// The unique name of this connection, e g `:1.54`.
    pub fn unique_name(&self) -> Result<BusName<'static>, Error> {
        let mut p = ptr::null();
        check("sd_bus_get_unique_name", unsafe { ffi::sd_bus_get_unique_name(self.conn, &mut p) })?;
        let s = unsafe { opt_string(p) }.unwrap_or_default();
        BusName::new(s).map_err(Error::InvalidName)
    }

    /// Requests a well-known name. Fails if someone else already owns it.
    pub fn request_name(&self, name: &BusName) -> Result<(), Error> {
        let n = cstring("sd_bus_request_name", name)?;
        check("sd_bus_request_name", unsafe { ffi::sd_bus_request_name(self.conn, n.as_ptr(), 0) })?;
        debug!(name = %name, "acquired bus name");
        Ok(())
    }

    /// Processes one pending message, if any. Returns false when there was nothing to do.
    pub fn process(&self) -> Result<bool, Error> {
        let r = check("sd_bus_process", unsafe { ffi::sd_bus_process(self.conn, ptr::null_mut()) })?;
        Ok(r > 0)
    }

    /// Waits for the connection to become readable, or until `timeout` passes.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let usec = timeout.map(|t| t.as_micros().min(u64::MAX as u128) as u64).unwrap_or(u64::MAX);
        check("sd_bus_wait", unsafe { ffi::sd_bus_wait(self.conn, usec) })?;
        Ok(())
    }

    /// Makes sure sd-bus hands the messages for `path` to `object_cb`.
    fn ensure_node(&self, path: &Path<'static>) -> Result<(), Error> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.contains_key(path) { return Ok(()) }

        let node = Box::new(Node { path: path.clone(), registry: self.registry.clone() });
        let cpath = cstring("sd_bus_add_object", path)?;
        let mut raw = ptr::null_mut();
        let userdata = &*node as *const Node as *mut c_void;
        check("sd_bus_add_object",
            unsafe { ffi::sd_bus_add_object(self.conn, &mut raw, cpath.as_ptr(), Some(object_cb), userdata) })?;
        slots.insert(path.clone(), Slot { slot: raw, _node: node });
        Ok(())
    }

    /// Drops the sd-bus registration of `path` once nothing is served there any more.
    fn release_node(&self, path: &Path<'static>) {
        if registry(&self.registry).contains_path(path) { return }
        if let Some(s) = self.slots.lock().unwrap_or_else(|e| e.into_inner()).remove(path) {
            unsafe { ffi::sd_bus_slot_unref(s.slot) };
        }
    }

    /// Processes messages forever, or until the connection fails.
    pub fn run(&self) -> Result<(), Error> {
        loop {
            if !self.process()? { self.wait(None)?; }
        }
    }
}

impl Drop for SdBus {
    fn drop(&mut self) {
        let slots = std::mem::take(&mut *self.slots.lock().unwrap_or_else(|e| e.into_inner()));
        for (_, s) in slots { unsafe { ffi::sd_bus_slot_unref(s.slot) }; }
        unsafe { ffi::sd_bus_flush_close_unref(self.conn) };
    }
}

impl Bus for SdBus {
    fn add_object(&self, path: &Path<'static>, entry: Weak<dyn ObjectEntry>) -> Result<SlotId, Error> {
        let slot = registry(&self.registry).add(path, entry)?;
        if let Err(e) = self.ensure_node(path) {
            registry(&self.registry).remove(slot);
            return Err(e);
        }
        Ok(slot)
    }

    fn remove_object(&self, slot: SlotId) {
        let path = registry(&self.registry).remove(slot);
        if let Some(path) = path { self.release_node(&path) }
    }

    fn add_object_manager(&self, path: &Path<'static>) -> Result<(), Error> {
        registry(&self.registry).add_manager(path)?;
        if let Err(e) = self.ensure_node(path) {
            registry(&self.registry).remove_manager(path);
            return Err(e);
        }
        Ok(())
    }

    fn remove_object_manager(&self, path: &Path<'static>) {
        let removed = registry(&self.registry).remove_manager(path);
        if removed { self.release_node(path) }
    }

    fn object_manager_for(&self, path: &Path) -> Option<Path<'static>> {
        registry(&self.registry).manager_for(path)
    }

    fn send(&self, msg: Message) -> Result<u32, Error> {
        unsafe {
            let m = new_message(self.conn, &msg)?;
            send_and_unref(self.conn, m)
        }
    }
}

/// The error reply for an incoming message whose body could not be read. Only method
/// calls get one; anything else is left to sd-bus.
fn unreadable(msg_type: MessageType, e: &Error) -> Option<MethodErr> {
    match msg_type {
        MessageType::MethodCall => Some(MethodErr::new("org.freedesktop.DBus.Error.InvalidArgs", e.to_string())),
        _ => None,
    }
}

unsafe extern "C" fn object_cb(m: *mut ffi::sd_bus_message, userdata: *mut c_void, _: *mut ffi::sd_bus_error) -> c_int {
    let node = &*(userdata as *const Node);
    let msg_type = match message_type(m) {
        Ok(t) => t,
        Err(e) => { warn!(path = %node.path, error = %e, "could not read incoming message"); return 0 }
    };
    if msg_type != MessageType::MethodCall { return 0 }
    let found = registry(&node.registry).lookup(&node.path);
    if found.entries.is_empty() && found.managed.is_none() { return 0 }

    let msg = match read_message(m) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(path = %node.path, error = %e, "could not read incoming method call");
            let err = match unreadable(msg_type, &e) { Some(err) => err, None => return 0 };
            if ffi::sd_bus_message_get_expect_reply(m) != 0 {
                let bus = ffi::sd_bus_message_get_bus(m);
                let r = error_message(m, &err).and_then(|out| send_and_unref(bus, out));
                if let Err(e) = r { warn!(path = %node.path, error = %e, "could not send error reply") }
            }
            return 1;
        }
    };

    let reply = match stdimpl::dispatch(&msg, found) {
        Some(reply) => reply,
        None => return 1,
    };
    let bus = ffi::sd_bus_message_get_bus(m);
    let r = match reply_message(m, &reply) {
        Ok(out) => send_and_unref(bus, out),
        Err(e) => Err(e),
    };
    if let Err(e) = r { warn!(path = %node.path, error = %e, "could not send reply") }
    1
}

unsafe fn send_and_unref(bus: *mut ffi::sd_bus, m: *mut ffi::sd_bus_message) -> Result<u32, Error> {
    let mut cookie = 0u64;
    let r = ffi::sd_bus_send(bus, m, &mut cookie);
    ffi::sd_bus_message_unref(m);
    check("sd_bus_send", r)?;
    Ok(cookie as u32)
}

/// Builds a signal or method call. Replies need the call they answer, see `reply_message`.
unsafe fn new_message(bus: *mut ffi::sd_bus, msg: &Message) -> Result<*mut ffi::sd_bus_message, Error> {
    let missing = |what: &str| Error::Bus { call: "send", message: format!("message has no {}", what) };
    let path = cstring("send", &msg.path().ok_or_else(|| missing("path"))?)?;
    let iface = cstring("send", &msg.interface().ok_or_else(|| missing("interface"))?)?;
    let member = cstring("send", &msg.member().ok_or_else(|| missing("member"))?)?;
    let mut m = ptr::null_mut();
    match msg.msg_type() {
        MessageType::Signal => {
            check("sd_bus_message_new_signal",
                ffi::sd_bus_message_new_signal(bus, &mut m, path.as_ptr(), iface.as_ptr(), member.as_ptr()))?;
        }
        MessageType::MethodCall => {
            let dest = msg.destination().map(|d| cstring("send", &d)).transpose()?;
            check("sd_bus_message_new_method_call", ffi::sd_bus_message_new_method_call(bus, &mut m,
                dest.as_ref().map(|d| d.as_ptr()).unwrap_or(ptr::null()), path.as_ptr(), iface.as_ptr(), member.as_ptr()))?;
        }
        t => return Err(Error::Bus { call: "send", message: format!("cannot send a {:?} outside of a method call", t) }),
    }
    finish(m, msg)
}

unsafe fn reply_message(call: *mut ffi::sd_bus_message, msg: &Message) -> Result<*mut ffi::sd_bus_message, Error> {
    let mut m = ptr::null_mut();
    match msg.error_name() {
        Some(name) => error_message(call, &MethodErr::new(name.into_static(), msg.read1::<&str>().unwrap_or(""))),
        None => {
            check("sd_bus_message_new_method_return", ffi::sd_bus_message_new_method_return(call, &mut m))?;
            finish(m, msg)
        }
    }
}

unsafe fn error_message(call: *mut ffi::sd_bus_message, err: &MethodErr) -> Result<*mut ffi::sd_bus_message, Error> {
    let name = cstring("reply", err.errorname())?;
    let desc = cstring("reply", err.description())?;
    let e = ffi::sd_bus_error { name: name.as_ptr(), message: desc.as_ptr(), _need_free: 0 };
    let mut m = ptr::null_mut();
    check("sd_bus_message_new_method_error", ffi::sd_bus_message_new_method_error(call, &mut m, &e))?;
    Ok(m)
}

unsafe fn finish(m: *mut ffi::sd_bus_message, msg: &Message) -> Result<*mut ffi::sd_bus_message, Error> {
    for item in msg.items() {
        if let Err(e) = append_item(m, item) {
            ffi::sd_bus_message_unref(m);
            return Err(e);
        }
    }
    Ok(m)
}

unsafe fn append_basic<T>(m: *mut ffi::sd_bus_message, t: c_char, v: &T) -> Result<(), Error> {
    check("sd_bus_message_append_basic", ffi::sd_bus_message_append_basic(m, t, v as *const T as *const c_void))?;
    Ok(())
}

unsafe fn append_str(m: *mut ffi::sd_bus_message, t: c_char, s: &str) -> Result<(), Error> {
    let s = cstring("sd_bus_message_append_basic", s)?;
    check("sd_bus_message_append_basic", ffi::sd_bus_message_append_basic(m, t, s.as_ptr() as *const c_void))?;
    Ok(())
}

unsafe fn in_container<F>(m: *mut ffi::sd_bus_message, t: c_char, contents: &str, f: F) -> Result<(), Error>
where F: FnOnce() -> Result<(), Error> {
    let c = cstring("sd_bus_message_open_container", contents)?;
    check("sd_bus_message_open_container", ffi::sd_bus_message_open_container(m, t, c.as_ptr()))?;
    f()?;
    check("sd_bus_message_close_container", ffi::sd_bus_message_close_container(m))?;
    Ok(())
}

unsafe fn append_item(m: *mut ffi::sd_bus_message, item: &MessageItem) -> Result<(), Error> {
    use MessageItem as MI;
    match item {
        MI::Bool(b) => append_basic(m, ffi::SD_BUS_TYPE_BOOLEAN, &(*b as c_int)),
        MI::Byte(v) => append_basic(m, ffi::SD_BUS_TYPE_BYTE, v),
        MI::Int16(v) => append_basic(m, ffi::SD_BUS_TYPE_INT16, v),
        MI::UInt16(v) => append_basic(m, ffi::SD_BUS_TYPE_UINT16, v),
        MI::Int32(v) => append_basic(m, ffi::SD_BUS_TYPE_INT32, v),
        MI::UInt32(v) => append_basic(m, ffi::SD_BUS_TYPE_UINT32, v),
        MI::Int64(v) => append_basic(m, ffi::SD_BUS_TYPE_INT64, v),
        MI::UInt64(v) => append_basic(m, ffi::SD_BUS_TYPE_UINT64, v),
        MI::Double(v) => append_basic(m, ffi::SD_BUS_TYPE_DOUBLE, v),
        MI::Str(s) => append_str(m, ffi::SD_BUS_TYPE_STRING, s),
        MI::ObjectPath(p) => append_str(m, ffi::SD_BUS_TYPE_OBJECT_PATH, p),
        MI::Signature(s) => append_str(m, ffi::SD_BUS_TYPE_SIGNATURE, s),
        MI::Variant(inner) => in_container(m, ffi::SD_BUS_TYPE_VARIANT, &inner.signature(), || append_item(m, inner)),
        MI::Struct(items) => {
            let sig = item.signature();
            in_container(m, ffi::SD_BUS_TYPE_STRUCT, &sig[1..sig.len() - 1], || {
                items.iter().try_for_each(|i| append_item(m, i))
            })
        }
        MI::Array { sig, items } => in_container(m, ffi::SD_BUS_TYPE_ARRAY, sig, || {
            items.iter().try_for_each(|i| append_item(m, i))
        }),
        MI::Dict { key_sig, value_sig, items } => {
            let entry_sig = format!("{}{}", key_sig, value_sig);
            in_container(m, ffi::SD_BUS_TYPE_ARRAY, &format!("{{{}}}", entry_sig), || {
                items.iter().try_for_each(|(k, v)| in_container(m, ffi::SD_BUS_TYPE_DICT_ENTRY, &entry_sig, || {
                    append_item(m, k)?;
                    append_item(m, v)
                }))
            })
        }
    }
}

unsafe fn message_type(m: *mut ffi::sd_bus_message) -> Result<MessageType, Error> {
    let mut t = 0u8;
    check("sd_bus_message_get_type", ffi::sd_bus_message_get_type(m, &mut t))?;
    match t {
        ffi::SD_BUS_MESSAGE_METHOD_CALL => Ok(MessageType::MethodCall),
        ffi::SD_BUS_MESSAGE_METHOD_RETURN => Ok(MessageType::MethodReturn),
        ffi::SD_BUS_MESSAGE_METHOD_ERROR => Ok(MessageType::Error),
        ffi::SD_BUS_MESSAGE_SIGNAL => Ok(MessageType::Signal),
        _ => Err(Error::Bus { call: "sd_bus_message_get_type", message: format!("unknown message type {}", t) }),
    }
}

unsafe fn read_message(m: *mut ffi::sd_bus_message) -> Result<Message, Error> {
    let msg_type = message_type(m)?;
    let path = opt_string(ffi::sd_bus_message_get_path(m)).map(Path::new).transpose().map_err(Error::InvalidName)?;
    let iface = opt_string(ffi::sd_bus_message_get_interface(m)).map(Interface::new).transpose().map_err(Error::InvalidName)?;
    let member = opt_string(ffi::sd_bus_message_get_member(m)).map(Member::new).transpose().map_err(Error::InvalidName)?;
    let sender = opt_string(ffi::sd_bus_message_get_sender(m)).map(BusName::new).transpose().map_err(Error::InvalidName)?;
    let dest = opt_string(ffi::sd_bus_message_get_destination(m)).map(BusName::new).transpose().map_err(Error::InvalidName)?;
    let mut cookie = 0u64;
    // Only fails for messages that were never sealed, which incoming messages always are.
    let _ = ffi::sd_bus_message_get_cookie(m, &mut cookie);

    let mut msg = Message::from_parts(msg_type, path, iface, member, read_items(m)?);
    msg.set_serial(cookie as u32);
    msg.set_sender(sender);
    msg.set_destination(dest);
    msg.set_no_reply(msg_type == MessageType::MethodCall && ffi::sd_bus_message_get_expect_reply(m) == 0);
    Ok(msg)
}

/// Reads items until the end of the current container.
unsafe fn read_items(m: *mut ffi::sd_bus_message) -> Result<Vec<MessageItem>, Error> {
    let mut v = vec!();
    while let Some(item) = read_item(m)? { v.push(item) }
    Ok(v)
}

unsafe fn read_basic<T: Default>(m: *mut ffi::sd_bus_message, t: c_char) -> Result<T, Error> {
    let mut v = T::default();
    check("sd_bus_message_read_basic", ffi::sd_bus_message_read_basic(m, t, &mut v as *mut T as *mut c_void))?;
    Ok(v)
}

unsafe fn read_str(m: *mut ffi::sd_bus_message, t: c_char) -> Result<String, Error> {
    let mut p: *const c_char = ptr::null();
    check("sd_bus_message_read_basic", ffi::sd_bus_message_read_basic(m, t, &mut p as *mut *const c_char as *mut c_void))?;
    Ok(opt_string(p).unwrap_or_default())
}

unsafe fn entered<R, F>(m: *mut ffi::sd_bus_message, t: c_char, contents: *const c_char, f: F) -> Result<R, Error>
where F: FnOnce() -> Result<R, Error> {
    check("sd_bus_message_enter_container", ffi::sd_bus_message_enter_container(m, t, contents))?;
    let r = f()?;
    check("sd_bus_message_exit_container", ffi::sd_bus_message_exit_container(m))?;
    Ok(r)
}

unsafe fn read_item(m: *mut ffi::sd_bus_message) -> Result<Option<MessageItem>, Error> {
    let mut t: c_char = 0;
    let mut contents: *const c_char = ptr::null();
    if check("sd_bus_message_peek_type", ffi::sd_bus_message_peek_type(m, &mut t, &mut contents))? == 0 {
        return Ok(None);
    }
    let contents_str = opt_string(contents).unwrap_or_default();
    let bad_sig = |s: String| Error::Bus { call: "sd_bus_message_peek_type", message: s };
    let item = match t {
        ffi::SD_BUS_TYPE_BOOLEAN => MessageItem::Bool(read_basic::<c_int>(m, t)? != 0),
        ffi::SD_BUS_TYPE_BYTE => MessageItem::Byte(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_INT16 => MessageItem::Int16(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_UINT16 => MessageItem::UInt16(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_INT32 => MessageItem::Int32(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_UINT32 => MessageItem::UInt32(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_INT64 => MessageItem::Int64(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_UINT64 => MessageItem::UInt64(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_DOUBLE => MessageItem::Double(read_basic(m, t)?),
        ffi::SD_BUS_TYPE_STRING => MessageItem::Str(read_str(m, t)?),
        ffi::SD_BUS_TYPE_OBJECT_PATH => MessageItem::ObjectPath(Path::new(read_str(m, t)?).map_err(Error::InvalidName)?),
        ffi::SD_BUS_TYPE_SIGNATURE => MessageItem::Signature(Signature::new(read_str(m, t)?).map_err(bad_sig)?),
        ffi::SD_BUS_TYPE_VARIANT => entered(m, t, contents, || {
            let inner = read_item(m)?.ok_or_else(|| bad_sig("empty variant".into()))?;
            Ok(MessageItem::Variant(Box::new(inner)))
        })?,
        ffi::SD_BUS_TYPE_STRUCT => MessageItem::Struct(entered(m, t, contents, || read_items(m))?),
        ffi::SD_BUS_TYPE_ARRAY if contents_str.starts_with('{') => {
            let entry_sig = &contents_str[1..contents_str.len() - 1];
            let key_sig = Signature::new(entry_sig[..1].to_string()).map_err(bad_sig)?;
            let value_sig = Signature::new(entry_sig[1..].to_string()).map_err(bad_sig)?;
            let centry = cstring("sd_bus_message_enter_container", entry_sig)?;
            let items = entered(m, t, contents, || {
                let mut items = vec!();
                loop {
                    let mut et: c_char = 0;
                    let mut ec: *const c_char = ptr::null();
                    if check("sd_bus_message_peek_type", ffi::sd_bus_message_peek_type(m, &mut et, &mut ec))? == 0 { break }
                    let kv = entered(m, ffi::SD_BUS_TYPE_DICT_ENTRY, centry.as_ptr(), || read_items(m))?;
                    let mut kv = kv.into_iter();
                    match (kv.next(), kv.next()) {
                        (Some(k), Some(v)) => items.push((k, v)),
                        _ => return Err(bad_sig("incomplete dict entry".into())),
                    }
                }
                Ok(items)
            })?;
            MessageItem::Dict { key_sig, value_sig, items }
        }
        ffi::SD_BUS_TYPE_ARRAY => {
            let sig = Signature::new(contents_str.clone()).map_err(bad_sig)?;
            MessageItem::Array { sig, items: entered(m, t, contents, || read_items(m))? }
        }
        _ => return Err(Error::Bus { call: "sd_bus_message_peek_type",
            message: format!("unsupported type '{}'", t as u8 as char) }),
    };
    Ok(Some(item))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn errno_is_reported() {
        match check("sd_bus_open_user", -libc::ENOENT) {
            Err(Error::Bus { call, message }) => {
                assert_eq!(call, "sd_bus_open_user");
                assert_eq!(message, io::Error::from_raw_os_error(libc::ENOENT).to_string());
            }
            x => panic!("unexpected {:?}", x),
        }
        assert_eq!(check("sd_bus_process", 1).unwrap(), 1);
    }

    #[test]
    fn unreadable_call_is_answered() {
        let e = Error::Bus { call: "sd_bus_message_peek_type", message: "unsupported type 'h'".into() };
        let err = unreadable(MessageType::MethodCall, &e).unwrap();
        assert_eq!(&**err.errorname(), "org.freedesktop.DBus.Error.InvalidArgs");
        assert!(err.description().contains("unsupported type 'h'"));
        assert!(unreadable(MessageType::Signal, &e).is_none());
        assert!(unreadable(MessageType::MethodReturn, &e).is_none());
    }
}
