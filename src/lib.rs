//! Typed objects on D-Bus, exported through a vtable.
//!
//! [D-Bus](http://dbus.freedesktop.org/) is a message bus, and is mainly used in Linux
//! for communication between processes. This crate is the binding layer between an
//! interface description and the bus: an `IfaceDesc` is the dispatch table for one
//! interface (methods, properties and signals, with their signatures), built once and
//! shared by every object implementing it. A `Server` exports one object at one path;
//! incoming method calls go through the table's trampolines, which decode the arguments,
//! call your handler and encode the reply, or turn a `MethodErr` into an error reply.
//!
//! The bus itself is behind the `Bus` trait. `LocalBus` runs everything in-process and is
//! what the tests use; with the `sd-bus` feature, `sdbus::SdBus` talks to a real bus
//! through libsystemd.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use sdbus_vtable::{IfaceBuilder, IfaceDesc, LocalBus, Message, Server};
//!
//! struct Hello;
//! let desc = Arc::new(IfaceDesc::new("com.example.Hello", |b: &mut IfaceBuilder<Hello>| {
//!     b.method("Hello", ("name",), ("reply",), |_, _: &mut Hello, (name,): (String,)| {
//!         Ok((format!("Hello {}!", name),))
//!     });
//! }));
//!
//! let bus = LocalBus::new();
//! let _server = Server::new(bus.clone(), "/hello".into(), desc, |_| Hello).unwrap();
//! let call = Message::new_method_call("com.example.Hello", "/hello", "com.example.Hello", "Hello")
//!     .unwrap().append1("world");
//! let reply = bus.call(call).unwrap();
//! assert_eq!(reply.read1::<&str>().unwrap(), "Hello world!");
//! ```

#![warn(missing_debug_implementations)]

mod strings;
pub use crate::strings::{Signature, Path, Interface, Member, ErrorName, BusName};

pub mod arg;

mod message;
pub use crate::message::{Message, MessageType, SignalArgs};

mod error;
pub use crate::error::{MethodErr, Error, DbusError, INVALID_ENUM_STRING};

mod enums;
pub use crate::enums::WireEnum;

pub mod vtable;
pub use crate::vtable::{IfaceDesc, IfaceBuilder, Context, Access, EmitsChangedSignal};

mod bus;
pub use crate::bus::{Bus, Lookup, ObjectEntry, SlotId};

mod object;
pub use crate::object::{Server, Emitter, ObjectManager, PropertyCell};

pub mod stdimpl;
pub use crate::stdimpl::{IfaceMap, ManagedObjects, PropMap};

mod local;
pub use crate::local::LocalBus;

#[cfg(feature = "sd-bus")]
pub mod sdbus;
