//! A bus that lives inside the process: no daemon, no sockets.
//!
//! Incoming messages are handed to `process` (or `call`), and everything the objects
//! send ends up in a queue that can be drained with `take_sent`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::trace;

use crate::bus::{Bus, Lookup, ObjectEntry, Registry, SlotId};
use crate::strings::Path;
use crate::{stdimpl, Error, Message, MessageType};

#[derive(Default)]
struct Inner {
    next_serial: u32,
    registry: Registry,
    outbox: VecDeque<Message>,
}

impl Inner {
    fn serial(&mut self) -> u32 {
        self.next_serial = self.next_serial.wrapping_add(1).max(1);
        self.next_serial
    }
}

/// An in-process implementation of `Bus`.
///
/// Messages are dispatched one at a time, to completion, on the thread that calls
/// `process`.
#[derive(Default)]
pub struct LocalBus {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let i = self.lock();
        f.debug_struct("LocalBus").field("objects", &i.registry.len()).field("queued", &i.outbox.len()).finish()
    }
}

impl LocalBus {
    pub fn new() -> Arc<LocalBus> { Arc::new(LocalBus::default()) }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delivers an incoming message and dispatches it, queueing the reply (if any).
    /// Returns the serial assigned to `msg`.
    pub fn process(&self, mut msg: Message) -> Result<u32, Error> {
        let found = {
            let mut i = self.lock();
            if msg.get_serial() == 0 {
                let s = i.serial();
                msg.set_serial(s);
            }
            match msg.path() {
                Some(p) => i.registry.lookup(&p),
                None => Lookup::default(),
            }
        };
        let serial = msg.get_serial();
        trace!(serial, msg_type = ?msg.msg_type(), member = ?msg.member().as_deref(), "processing message");
        if let Some(reply) = stdimpl::dispatch(&msg, found) {
            self.send(reply)?;
        }
        Ok(serial)
    }

    /// Processes a method call and returns its reply. An error reply becomes `Err`.
    pub fn call(&self, msg: Message) -> Result<Message, Error> {
        let serial = self.process(msg)?;
        let reply = {
            let mut i = self.lock();
            let pos = i.outbox.iter().position(|m| m.get_reply_serial() == Some(serial)
                && matches!(m.msg_type(), MessageType::MethodReturn | MessageType::Error));
            pos.and_then(|pos| i.outbox.remove(pos))
        };
        let reply = reply.ok_or(Error::Bus { call: "call", message: format!("no reply to message {}", serial) })?;
        reply.as_result()?;
        Ok(reply)
    }

    /// Drains everything sent so far (replies, errors and signals), oldest first.
    pub fn take_sent(&self) -> Vec<Message> {
        self.lock().outbox.drain(..).collect()
    }
}

impl Bus for LocalBus {
    fn add_object(&self, path: &Path<'static>, entry: Weak<dyn ObjectEntry>) -> Result<SlotId, Error> {
        self.lock().registry.add(path, entry)
    }

    fn remove_object(&self, slot: SlotId) {
        self.lock().registry.remove(slot);
    }

    fn add_object_manager(&self, path: &Path<'static>) -> Result<(), Error> {
        self.lock().registry.add_manager(path)
    }

    fn remove_object_manager(&self, path: &Path<'static>) {
        self.lock().registry.remove_manager(path);
    }

    fn object_manager_for(&self, path: &Path) -> Option<Path<'static>> {
        self.lock().registry.manager_for(path)
    }

    fn send(&self, mut msg: Message) -> Result<u32, Error> {
        let mut i = self.lock();
        let serial = i.serial();
        msg.set_serial(serial);
        trace!(serial, msg_type = ?msg.msg_type(), member = ?msg.member().as_deref(), "sending message");
        i.outbox.push_back(msg);
        Ok(serial)
    }
}
